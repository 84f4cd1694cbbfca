//! Mock publisher for testing
//!
//! Configurable stand-in for a real platform adapter. It can succeed, fail
//! permanently, fail transiently a number of times before succeeding, stall,
//! and refresh tokens (or refuse to). Every call is counted and appended to
//! a shared call log so tests can assert ordering, e.g. that a refresh
//! happened before the publish for the same account.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{PlatformError, PlatformResult};
use crate::platforms::{token_is_well_formed, Publisher, RemotePost};
use crate::types::{Account, Post};

/// Configuration for mock publisher behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Publisher name
    pub name: String,

    /// Platform identifiers the publisher claims
    pub platforms: Vec<String>,

    /// Error returned by every publish call (None = publish succeeds)
    pub publish_error: Option<PlatformError>,

    /// Transient network failures to return before publishing succeeds
    pub transient_failures: usize,

    /// Whether token refresh succeeds
    pub refresh_succeeds: bool,

    /// Whether `validate_account` accepts well-formed tokens
    pub accept_credentials: bool,

    /// Delay before completing publish (simulates network latency)
    pub delay: Duration,

    /// Accounts whose publish stalls for `delay` (empty = all accounts)
    pub slow_accounts: Vec<String>,

    /// Number of refresh calls
    pub refresh_call_count: Arc<AtomicUsize>,

    /// Number of publish calls
    pub publish_call_count: Arc<AtomicUsize>,

    /// Ordered call log entries like "refresh:acc-1" / "publish:acc-1"
    pub call_log: Arc<Mutex<Vec<String>>>,

    /// Access token presented on each publish call, in call order
    pub tokens_used: Arc<Mutex<Vec<String>>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            platforms: vec!["mock".to_string()],
            publish_error: None,
            transient_failures: 0,
            refresh_succeeds: true,
            accept_credentials: true,
            delay: Duration::from_millis(0),
            slow_accounts: Vec::new(),
            refresh_call_count: Arc::new(AtomicUsize::new(0)),
            publish_call_count: Arc::new(AtomicUsize::new(0)),
            call_log: Arc::new(Mutex::new(Vec::new())),
            tokens_used: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Mock publisher for testing
///
/// Cloning shares the counters and call log, so a test can keep one handle
/// while the registry owns another.
#[derive(Debug, Clone)]
pub struct MockPublisher {
    config: MockConfig,
}

impl MockPublisher {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    fn base(name: &str, platforms: &[&str]) -> MockConfig {
        MockConfig {
            name: name.to_string(),
            platforms: platforms.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Publisher that always succeeds
    pub fn success(name: &str, platforms: &[&str]) -> Self {
        Self::new(Self::base(name, platforms))
    }

    /// Publisher whose publish calls always fail with `error`
    pub fn publish_failure(name: &str, platforms: &[&str], error: PlatformError) -> Self {
        Self::new(MockConfig {
            publish_error: Some(error),
            ..Self::base(name, platforms)
        })
    }

    /// Publisher that fails with transient network errors `failures` times, then succeeds
    pub fn failing_then_success(name: &str, platforms: &[&str], failures: usize) -> Self {
        Self::new(MockConfig {
            transient_failures: failures,
            ..Self::base(name, platforms)
        })
    }

    /// Publisher whose token refresh always fails
    pub fn refresh_failure(name: &str, platforms: &[&str]) -> Self {
        Self::new(MockConfig {
            refresh_succeeds: false,
            ..Self::base(name, platforms)
        })
    }

    /// Publisher that rejects every credential
    pub fn rejecting_credentials(name: &str, platforms: &[&str]) -> Self {
        Self::new(MockConfig {
            accept_credentials: false,
            ..Self::base(name, platforms)
        })
    }

    /// Publisher that waits `delay` before each publish completes
    pub fn with_delay(name: &str, platforms: &[&str], delay: Duration) -> Self {
        Self::new(MockConfig {
            delay,
            ..Self::base(name, platforms)
        })
    }

    /// Publisher that stalls only for the given accounts
    pub fn slow_for(name: &str, platforms: &[&str], delay: Duration, accounts: &[&str]) -> Self {
        Self::new(MockConfig {
            delay,
            slow_accounts: accounts.iter().map(|a| a.to_string()).collect(),
            ..Self::base(name, platforms)
        })
    }

    pub fn refresh_call_count(&self) -> usize {
        self.config.refresh_call_count.load(Ordering::SeqCst)
    }

    pub fn publish_call_count(&self) -> usize {
        self.config.publish_call_count.load(Ordering::SeqCst)
    }

    /// Snapshot of the call log
    pub fn calls(&self) -> Vec<String> {
        self.config
            .call_log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// Access tokens publish calls were made with
    pub fn tokens_used(&self) -> Vec<String> {
        self.config
            .tokens_used
            .lock()
            .map(|tokens| tokens.clone())
            .unwrap_or_default()
    }

    fn log(&self, entry: String) {
        if let Ok(mut log) = self.config.call_log.lock() {
            log.push(entry);
        }
    }

    fn stalls_for(&self, account: &Account) -> bool {
        !self.config.delay.is_zero()
            && (self.config.slow_accounts.is_empty()
                || self.config.slow_accounts.contains(&account.id))
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn platforms(&self) -> Vec<String> {
        self.config.platforms.clone()
    }

    fn validate_account(&self, account: &Account) -> bool {
        self.config.accept_credentials && token_is_well_formed(account.access_token())
    }

    async fn refresh_token(&self, account: &mut Account) -> PlatformResult<()> {
        self.config.refresh_call_count.fetch_add(1, Ordering::SeqCst);
        self.log(format!("refresh:{}", account.id));

        if !self.config.refresh_succeeds {
            return Err(PlatformError::Authentication(
                "Mock token endpoint refused the refresh credential".to_string(),
            ));
        }

        if account.refresh_token().is_none() {
            return Err(PlatformError::Authentication(format!(
                "Account {} has no refresh credential",
                account.id
            )));
        }

        let expires_at = chrono::Utc::now().timestamp() + 3600;
        account.install_tokens(format!("refreshed-{}", account.id), None, Some(expires_at));
        Ok(())
    }

    async fn publish_to_account(&self, post: &Post, account: &Account) -> PlatformResult<RemotePost> {
        let call = self.config.publish_call_count.fetch_add(1, Ordering::SeqCst);
        self.log(format!("publish:{}", account.id));
        if let Ok(mut tokens) = self.config.tokens_used.lock() {
            tokens.push(account.access_token().to_string());
        }

        self.validate_content(post)?;

        if self.stalls_for(account) {
            sleep(self.config.delay).await;
        }

        if call < self.config.transient_failures {
            return Err(PlatformError::Network(format!(
                "Mock transient failure {} of {}",
                call + 1,
                self.config.transient_failures
            )));
        }

        if let Some(error) = &self.config.publish_error {
            return Err(error.clone());
        }

        let id = format!("{}:mock-{}", account.platform, uuid::Uuid::new_v4());
        Ok(RemotePost::new(id))
    }
}
