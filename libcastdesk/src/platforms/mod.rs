//! Publisher abstraction and platform adapters
//!
//! Every social network (or aggregator) is reached through one
//! [`Publisher`]. A publisher declares which platform identifiers it owns,
//! checks whether an account's stored credential is usable, refreshes
//! expired tokens, and submits posts. The [`PublisherRegistry`] routes each
//! account to the publisher that claims its platform.
//!
//! [`PublisherRegistry`]: crate::registry::PublisherRegistry
//!
//! # Examples
//!
//! ```no_run
//! use libcastdesk::platforms::{mock::MockPublisher, Publisher};
//! use libcastdesk::{Account, Post};
//!
//! # async fn example() {
//! let publisher = MockPublisher::success("meta", &["facebook", "instagram"]);
//! assert!(publisher.supports_platform("instagram"));
//!
//! let account = Account::new("acc-1", "facebook", "page-1", "token");
//! let post = Post::new("Hello from the back office");
//!
//! let report = publisher.publish(&post, &[account]).await;
//! assert_eq!(report.len(), 1);
//! # }
//! ```

use std::time::Instant;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::error::{PlatformError, PlatformResult};
use crate::report::{DispatchReport, PublishResult};
use crate::types::{Account, Post};

pub mod ayrshare;
pub mod http;
pub mod linkedin;
pub mod manual;
pub mod meta;
pub mod webhook;
pub mod x;

// Mock publisher is available for all builds (not just tests) to support integration tests
pub mod mock;

/// Identifier of a post created on a remote platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePost {
    pub id: String,
    pub url: Option<String>,
}

impl RemotePost {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// Unified publishing contract implemented by every platform adapter
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publisher identifier (e.g. "meta", "linkedin", "webhook")
    fn name(&self) -> &str;

    /// Platform identifiers this publisher claims
    fn platforms(&self) -> Vec<String>;

    /// Exact match against the claimed platform identifiers
    fn supports_platform(&self, platform: &str) -> bool {
        self.platforms().iter().any(|p| p == platform)
    }

    /// Structural credential check
    ///
    /// Confirms the stored token is usable (non-empty, not obviously
    /// malformed) and that any platform data the publisher needs is present.
    /// It does not guarantee the remote API will accept the token.
    fn validate_account(&self, account: &Account) -> bool;

    /// Check content against platform rules before submitting
    ///
    /// The default accepts anything with text or media.
    fn validate_content(&self, post: &Post) -> PlatformResult<()> {
        if post.content.trim().is_empty() && post.media.is_empty() {
            return Err(PlatformError::Rejected(
                "Post has neither text nor media".to_string(),
            ));
        }
        Ok(())
    }

    /// Exchange the account's refresh credential for a new access token
    ///
    /// On success the account's tokens and expiry are updated in place.
    ///
    /// # Errors
    ///
    /// Returns an error when the account has no refresh credential, the
    /// token endpoint rejects it, or the platform is unreachable.
    async fn refresh_token(&self, account: &mut Account) -> PlatformResult<()>;

    /// Submit the post on behalf of one account
    ///
    /// # Errors
    ///
    /// - `PlatformError::Authentication` when the platform refuses the token
    /// - `PlatformError::Rejected` when the platform refuses the content
    /// - `PlatformError::RateLimit` / `PlatformError::Network` for transient failures
    /// - `PlatformError::Unconfirmed` when the request was sent but never answered
    async fn publish_to_account(&self, post: &Post, account: &Account) -> PlatformResult<RemotePost>;

    /// Publish to this publisher's own subset of accounts
    ///
    /// Produces exactly one result per account. Routing accounts to the
    /// right publisher is the caller's job; accounts on platforms this
    /// publisher does not claim are reported as rejected.
    async fn publish(&self, post: &Post, accounts: &[Account]) -> DispatchReport {
        let started_at = chrono::Utc::now().timestamp();
        let clock = Instant::now();

        let futures = accounts.iter().map(|account| async move {
            if !self.supports_platform(&account.platform) {
                let error = PlatformError::NotSupported(format!(
                    "{} does not publish to {}",
                    self.name(),
                    account.platform
                ));
                return PublishResult::failed_for(account, error.kind(), error.to_string(), 0);
            }

            match self.publish_to_account(post, account).await {
                Ok(remote) => PublishResult::succeeded(account, remote, 1),
                Err(e) => PublishResult::failed_for(account, e.kind(), e.to_string(), 1),
            }
        });

        let results = join_all(futures).await;
        DispatchReport::new(post.id.clone(), results, started_at, clock.elapsed())
    }
}

/// Structural token check shared by the HTTP publishers
///
/// Bearer tokens are opaque, but they never contain whitespace or control
/// characters; a token that does was pasted or stored incorrectly.
pub fn token_is_well_formed(token: &str) -> bool {
    !token.is_empty() && !token.chars().any(|c| c.is_whitespace() || c.is_control())
}
