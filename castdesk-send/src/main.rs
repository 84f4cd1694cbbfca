//! castdesk-send - Publish one post to a set of connected social accounts
//!
//! Reads a post and its target accounts from JSON files, dispatches the
//! post through every enabled publisher, prints the dispatch report and
//! exits with a code derived from the overall status.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, ValueEnum};
use libcastdesk::logging::{LogFormat, LoggingConfig};
use libcastdesk::{
    Account, AccountRecord, CastdeskError, Config, DispatchOptions, DispatchReport, Dispatcher,
    Post, PublisherRegistry, Result,
};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Human-readable summary
    Text,
    /// The full dispatch report as JSON
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "castdesk-send")]
#[command(version)]
#[command(about = "Publish one post to a set of connected social accounts")]
#[command(long_about = "\
castdesk-send - Publish one post to a set of connected social accounts

DESCRIPTION:
    Reads a post and the accounts to publish it to, routes every account
    to the publisher enabled for its platform, refreshes expired tokens,
    publishes concurrently and prints one result per account.

USAGE:
    castdesk-send --post post.json --accounts accounts.json
    cat post.json | castdesk-send --post - --accounts accounts.json --format json
    castdesk-send --post post.json --accounts accounts.json --timeout 30s

INPUT:
    post.json      {\"content\": \"Hello\", \"link_url\": \"https://...\",
                    \"media\": [{\"url\": \"https://...\", \"kind\": \"image\"}]}
    accounts.json  [{\"id\": \"acc-1\", \"platform\": \"facebook\",
                     \"platform_user_id\": \"1234\", \"access_token\": \"...\"}]

CONFIGURATION:
    Configuration file: ~/.config/castdesk/config.toml
    Override with --config or the CASTDESK_CONFIG environment variable.

EXIT CODES:
    0 - Published to every account
    1 - Published to some accounts
    2 - Published to no account
    3 - Invalid input (unreadable or malformed post/accounts)
    4 - Configuration error
    5 - Platform error outside a dispatch
")]
struct Cli {
    /// Configuration file (defaults to ~/.config/castdesk/config.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Post JSON file, or - to read from stdin
    #[arg(short, long, value_name = "PATH")]
    post: PathBuf,

    /// Accounts JSON file (array of accounts)
    #[arg(short, long, value_name = "PATH")]
    accounts: PathBuf,

    /// Deadline for the whole dispatch (e.g. 30s, 2m); overrides config
    #[arg(short, long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Maximum accounts published at once; overrides config
    #[arg(long, value_name = "N")]
    max_in_flight: Option<usize>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Log format on stderr: text, json or pretty
    #[arg(long, env = "CASTDESK_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = std::env::var("CASTDESK_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let _ = LoggingConfig::new(cli.log_format, level)
        .verbose(cli.verbose)
        .init();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load_or_default()?,
    };

    let post = read_post(&cli.post)?;
    let accounts = read_accounts(&cli.accounts)?;
    debug!(post_id = %post.id, accounts = accounts.len(), "loaded dispatch input");

    let mut options = DispatchOptions::from(&config.dispatch);
    if let Some(max) = cli.max_in_flight {
        if max == 0 {
            return Err(CastdeskError::InvalidInput(
                "--max-in-flight must be at least 1".to_string(),
            ));
        }
        options = options.with_max_in_flight(max);
    }
    if let Some(timeout) = cli.timeout {
        options = options.with_timeout(Some(timeout));
    }

    let registry = PublisherRegistry::from_config(&config)?;
    if registry.is_empty() {
        info!("no publishers enabled; every account will be reported as unsupported");
    }

    let dispatcher = Dispatcher::new(registry, options);
    let report = dispatcher.dispatch(&post, accounts).await;

    match cli.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&report).map_err(|e| {
                CastdeskError::InvalidInput(format!("Failed to serialize report: {}", e))
            })?;
            println!("{}", json);
        }
        OutputFormat::Text => print_text(&report),
    }

    Ok(report.status.exit_code())
}

fn read_input(path: &Path, what: &str) -> Result<String> {
    if path == Path::new("-") {
        let mut buffer = String::new();
        std::io::Read::read_to_string(&mut std::io::stdin(), &mut buffer).map_err(|e| {
            CastdeskError::InvalidInput(format!("Failed to read {} from stdin: {}", what, e))
        })?;
        return Ok(buffer);
    }

    std::fs::read_to_string(path).map_err(|e| {
        CastdeskError::InvalidInput(format!(
            "Failed to read {} file {}: {}",
            what,
            path.display(),
            e
        ))
    })
}

fn read_post(path: &Path) -> Result<Post> {
    let raw = read_input(path, "post")?;
    serde_json::from_str(&raw)
        .map_err(|e| CastdeskError::InvalidInput(format!("Malformed post JSON: {}", e)))
}

fn read_accounts(path: &Path) -> Result<Vec<Account>> {
    let raw = read_input(path, "accounts")?;
    let records: Vec<AccountRecord> = serde_json::from_str(&raw)
        .map_err(|e| CastdeskError::InvalidInput(format!("Malformed accounts JSON: {}", e)))?;
    Ok(records.into_iter().map(Account::from).collect())
}

fn print_text(report: &DispatchReport) {
    println!(
        "post {}: {} ({}/{} published in {}ms)",
        report.post_id,
        report.status,
        report.success_count(),
        report.len(),
        report.elapsed_ms
    );

    for result in &report.results {
        if result.success {
            let remote = result.remote_post_id.as_deref().unwrap_or("-");
            match result.remote_url.as_deref() {
                Some(url) => println!("  ok      {} [{}] {} {}", result.account_id, result.platform, remote, url),
                None => println!("  ok      {} [{}] {}", result.account_id, result.platform, remote),
            }
        } else {
            let kind = result
                .error_kind
                .map(|k| k.as_str().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            println!(
                "  failed  {} [{}] {}: {}",
                result.account_id,
                result.platform,
                kind,
                result.error_message.as_deref().unwrap_or("")
            );
            if let Some(reset_at) = result.rate_limit_reset_at {
                println!("          rate limit resets at {}", reset_at);
            }
        }
    }
}
