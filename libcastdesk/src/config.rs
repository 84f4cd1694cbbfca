//! Configuration management for Castdesk
//!
//! Configuration is a TOML file. Durations are written as human-readable
//! strings (`"30s"`, `"500ms"`, `"2m"`).
//!
//! ```toml
//! [dispatch]
//! max_in_flight = 4
//! timeout = "60s"
//! max_attempts = 3
//! retry_base_delay = "1s"
//!
//! [meta]
//! enabled = true
//! client_id = "1234"
//! client_secret_file = "~/.config/castdesk/meta.secret"
//!
//! [webhook]
//! enabled = true
//! url = "https://hooks.example.com/publish"
//! platforms = ["tiktok", "pinterest"]
//!
//! [ayrshare]
//! enabled = true
//! api_key_file = "~/.config/castdesk/ayrshare.key"
//! platforms = ["youtube", "threads"]
//!
//! [manual]
//! enabled = true
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub http: HttpConfig,
    pub meta: Option<MetaConfig>,
    pub linkedin: Option<LinkedInConfig>,
    pub x: Option<XConfig>,
    pub webhook: Option<WebhookConfig>,
    pub ayrshare: Option<AyrshareConfig>,
    #[serde(default)]
    pub manual: ManualConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Maximum concurrent per-account publish operations
    pub max_in_flight: usize,
    /// Deadline for a whole dispatch
    #[serde(with = "duration_str")]
    pub timeout: Duration,
    /// Publish attempts per account (1 = no retries)
    pub max_attempts: u32,
    /// First retry delay; doubles on each further attempt
    #[serde(with = "duration_str")]
    pub retry_base_delay: Duration,
    /// Tokens expiring within this window are refreshed before publishing
    #[serde(with = "duration_str")]
    pub refresh_skew: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 4,
            timeout: Duration::from_secs(60),
            max_attempts: 3,
            retry_base_delay: Duration::from_secs(1),
            refresh_skew: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    #[serde(with = "duration_str")]
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            user_agent: format!("castdesk/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub enabled: bool,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub client_secret_file: Option<String>,
    #[serde(default = "default_graph_version")]
    pub graph_version: String,
    #[serde(default = "default_graph_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedInConfig {
    pub enabled: bool,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub client_secret_file: Option<String>,
    #[serde(default = "default_linkedin_api_url")]
    pub api_base_url: String,
    #[serde(default = "default_linkedin_oauth_url")]
    pub oauth_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XConfig {
    pub enabled: bool,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub client_secret_file: Option<String>,
    #[serde(default = "default_x_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub enabled: bool,
    pub url: String,
    /// Platforms this webhook publishes for
    pub platforms: Vec<String>,
    /// Forward the account's access token in the payload
    #[serde(default)]
    pub include_access_token: bool,
}

/// Aggregator account that posts through one API key on behalf of many profiles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AyrshareConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub api_key_file: Option<String>,
    /// Used for accounts without an `ayrshare_profile_key` of their own
    #[serde(default)]
    pub profile_key: Option<String>,
    #[serde(default = "default_ayrshare_url")]
    pub base_url: String,
    /// Platforms routed through the aggregator
    #[serde(default = "default_ayrshare_platforms")]
    pub platforms: Vec<String>,
}

/// Fallback that answers unsupported platforms with manual posting steps
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManualConfig {
    #[serde(default)]
    pub enabled: bool,
}

fn default_ayrshare_url() -> String {
    "https://app.ayrshare.com/api".to_string()
}

fn default_ayrshare_platforms() -> Vec<String> {
    [
        "facebook",
        "instagram",
        "twitter",
        "linkedin",
        "tiktok",
        "youtube",
        "pinterest",
        "threads",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_graph_version() -> String {
    "v18.0".to_string()
}

fn default_graph_url() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_linkedin_api_url() -> String {
    "https://api.linkedin.com".to_string()
}

fn default_linkedin_oauth_url() -> String {
    "https://www.linkedin.com".to_string()
}

fn default_x_url() -> String {
    "https://api.twitter.com".to_string()
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load from the default location, falling back to defaults when no file exists
    pub fn load_or_default() -> Result<Self> {
        let config_path = resolve_config_path()?;
        if !config_path.exists() {
            tracing::warn!(
                path = %config_path.display(),
                "no configuration file found, using defaults (no publishers enabled)"
            );
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and required fields of enabled publishers
    pub fn validate(&self) -> Result<()> {
        if self.dispatch.max_in_flight == 0 {
            return Err(invalid("dispatch.max_in_flight", "must be at least 1"));
        }
        if self.dispatch.max_attempts == 0 {
            return Err(invalid("dispatch.max_attempts", "must be at least 1"));
        }
        if self.dispatch.timeout.is_zero() {
            return Err(invalid("dispatch.timeout", "must be greater than zero"));
        }

        if let Some(meta) = self.meta.as_ref().filter(|c| c.enabled) {
            require("meta.client_id", &meta.client_id)?;
            require_secret("meta", &meta.client_secret, &meta.client_secret_file)?;
        }
        if let Some(linkedin) = self.linkedin.as_ref().filter(|c| c.enabled) {
            require("linkedin.client_id", &linkedin.client_id)?;
            require_secret("linkedin", &linkedin.client_secret, &linkedin.client_secret_file)?;
        }
        if let Some(x) = self.x.as_ref().filter(|c| c.enabled) {
            require("x.client_id", &x.client_id)?;
            require_secret("x", &x.client_secret, &x.client_secret_file)?;
        }
        if let Some(webhook) = self.webhook.as_ref().filter(|c| c.enabled) {
            require("webhook.url", &webhook.url)?;
            if webhook.platforms.is_empty() {
                return Err(invalid("webhook.platforms", "must list at least one platform"));
            }
        }
        if let Some(ayrshare) = self.ayrshare.as_ref().filter(|c| c.enabled) {
            require_secret_field("ayrshare.api_key", &ayrshare.api_key, &ayrshare.api_key_file)?;
            if ayrshare.platforms.is_empty() {
                return Err(invalid("ayrshare.platforms", "must list at least one platform"));
            }
        }

        Ok(())
    }
}

/// Resolve a client secret given inline or as a file path
///
/// An inline value wins over a file. File contents are trimmed.
pub fn resolve_secret(
    section: &str,
    inline: &Option<String>,
    file: &Option<String>,
) -> Result<SecretString> {
    resolve_secret_field(&format!("{}.client_secret", section), inline, file)
}

/// Resolve the secret named `field`, read inline or from `{field}_file`
pub fn resolve_secret_field(
    field: &str,
    inline: &Option<String>,
    file: &Option<String>,
) -> Result<SecretString> {
    if let Some(secret) = inline.as_ref().filter(|s| !s.is_empty()) {
        return Ok(SecretString::from(secret.clone()));
    }

    let file = file
        .as_ref()
        .ok_or_else(|| ConfigError::MissingField(field.to_string()))?;

    let path = shellexpand::full(file).map_err(|e| {
        invalid_field(
            &format!("{}_file", field),
            &format!("cannot expand path: {}", e),
        )
    })?;

    let secret = std::fs::read_to_string(path.as_ref())
        .map_err(ConfigError::ReadError)?
        .trim()
        .to_string();

    if secret.is_empty() {
        return Err(invalid(&format!("{}_file", field), "file is empty"));
    }

    Ok(SecretString::from(secret))
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField(field.to_string()).into());
    }
    Ok(())
}

fn require_secret(section: &str, inline: &Option<String>, file: &Option<String>) -> Result<()> {
    require_secret_field(&format!("{}.client_secret", section), inline, file)
}

fn require_secret_field(field: &str, inline: &Option<String>, file: &Option<String>) -> Result<()> {
    let has_inline = inline.as_ref().is_some_and(|s| !s.is_empty());
    if !has_inline && file.is_none() {
        return Err(ConfigError::MissingField(field.to_string()).into());
    }
    Ok(())
}

fn invalid_field(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn invalid(field: &str, reason: &str) -> crate::error::CastdeskError {
    invalid_field(field, reason).into()
}

/// Resolve the configuration file path (`CASTDESK_CONFIG`, then the XDG config dir)
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CASTDESK_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("castdesk").join("config.toml"))
}

/// Serde adapter for humantime duration strings
mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
