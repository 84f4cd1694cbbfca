//! Dispatch engine
//!
//! Fans one post out to a set of accounts. Accounts are grouped by
//! platform, each group is routed to the publisher the registry resolves
//! for it, and every account is then processed on its own: inactive and
//! rate-limited checks, token refresh when expired, credential validation,
//! and publishing with retries on transient errors.
//!
//! Per-account work runs concurrently up to `max_in_flight`. The whole
//! dispatch may be bounded by a timeout, after which every account still
//! without a result is reported as timed out. The report always contains
//! exactly one result per account, in the order the accounts were given.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::DispatchConfig;
use crate::error::{ErrorKind, PlatformResult};
use crate::platforms::{Publisher, RemotePost};
use crate::registry::PublisherRegistry;
use crate::report::{DispatchReport, PublishResult};
use crate::types::{Account, Post};

/// Retry behaviour for transient publish failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total publish attempts per account (1 = no retries)
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each further attempt
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Backoff before the attempt following `attempt` (1-based): 1x, 2x, 4x ... the base delay
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(2_u32.pow(exponent))
    }

    /// Backoff plus up to 25% random jitter so retries across accounts spread out
    fn delay_with_jitter(&self, attempt: u32) -> Duration {
        let backoff = self.backoff(attempt);
        let max_jitter = u64::try_from(backoff.as_millis() / 4).unwrap_or(u64::MAX);
        if max_jitter == 0 {
            return backoff;
        }
        backoff.saturating_add(Duration::from_millis(
            rand::thread_rng().gen_range(0..=max_jitter),
        ))
    }
}

#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Maximum accounts processed at once
    pub max_in_flight: usize,
    /// Deadline for the whole dispatch (None = unbounded)
    pub timeout: Option<Duration>,
    pub retry: RetryPolicy,
    /// Tokens expiring within this window count as expired
    pub refresh_skew: Duration,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self::from(&DispatchConfig::default())
    }
}

impl From<&DispatchConfig> for DispatchOptions {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            max_in_flight: config.max_in_flight,
            timeout: Some(config.timeout),
            retry: RetryPolicy {
                max_attempts: config.max_attempts,
                base_delay: config.retry_base_delay,
            },
            refresh_skew: config.refresh_skew,
        }
    }
}

impl DispatchOptions {
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_refresh_skew(mut self, refresh_skew: Duration) -> Self {
        self.refresh_skew = refresh_skew;
        self
    }
}

/// One account routed to its publisher, owned by the task processing it
struct AccountJob {
    index: usize,
    publisher: Arc<dyn Publisher>,
    account: Account,
}

pub struct Dispatcher {
    registry: PublisherRegistry,
    options: DispatchOptions,
}

impl Dispatcher {
    pub fn new(registry: PublisherRegistry, options: DispatchOptions) -> Self {
        Self { registry, options }
    }

    pub fn registry(&self) -> &PublisherRegistry {
        &self.registry
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    /// Publish `post` to every account, using the configured timeout
    pub async fn dispatch(&self, post: &Post, accounts: Vec<Account>) -> DispatchReport {
        self.run(post, accounts, self.options.timeout).await
    }

    /// Publish `post` to every account with an explicit deadline
    pub async fn dispatch_with_timeout(
        &self,
        post: &Post,
        accounts: Vec<Account>,
        timeout: Duration,
    ) -> DispatchReport {
        self.run(post, accounts, Some(timeout)).await
    }

    async fn run(&self, post: &Post, accounts: Vec<Account>, timeout: Option<Duration>) -> DispatchReport {
        let started_at = chrono::Utc::now().timestamp();
        let clock = Instant::now();
        let total = accounts.len();

        info!(post_id = %post.id, accounts = total, "dispatching post");

        // Remember identities up front so timed-out accounts can still be reported
        let identities: Vec<(String, String)> = accounts
            .iter()
            .map(|a| (a.id.clone(), a.platform.clone()))
            .collect();

        let mut slots: Vec<Option<PublishResult>> = vec![None; total];
        let jobs = self.route(accounts, &mut slots);

        let max_in_flight = self.options.max_in_flight.max(1);
        let work = stream::iter(jobs)
            .map(|job| self.process_account(post, job))
            .buffer_unordered(max_in_flight)
            .for_each(|(index, result)| {
                slots[index] = Some(result);
                futures::future::ready(())
            });

        let timed_out = match timeout {
            Some(limit) => tokio::time::timeout(limit, work).await.is_err(),
            None => {
                work.await;
                false
            }
        };

        if timed_out {
            let pending = slots.iter().filter(|s| s.is_none()).count();
            warn!(
                post_id = %post.id,
                pending,
                "dispatch timed out, marking unfinished accounts"
            );
        }

        let limit = timeout.unwrap_or_default();
        let results: Vec<PublishResult> = slots
            .into_iter()
            .zip(identities)
            .map(|(slot, (account_id, platform))| {
                slot.unwrap_or_else(|| {
                    PublishResult::failed(
                        account_id,
                        platform,
                        ErrorKind::Timeout,
                        format!(
                            "Dispatch timed out after {} before this account finished",
                            humantime::format_duration(limit)
                        ),
                        0,
                    )
                })
            })
            .collect();

        let report = DispatchReport::new(post.id.clone(), results, started_at, clock.elapsed());
        info!(
            post_id = %post.id,
            status = %report.status,
            succeeded = report.success_count(),
            failed = report.failure_count(),
            elapsed_ms = report.elapsed_ms,
            "dispatch finished"
        );
        report
    }

    /// Group accounts by platform and resolve one publisher per group
    ///
    /// Accounts whose platform has no publisher get their result immediately.
    fn route(&self, accounts: Vec<Account>, slots: &mut [Option<PublishResult>]) -> Vec<AccountJob> {
        let mut groups: BTreeMap<String, Vec<(usize, Account)>> = BTreeMap::new();
        for (index, account) in accounts.into_iter().enumerate() {
            groups
                .entry(account.platform.clone())
                .or_default()
                .push((index, account));
        }

        let mut jobs = Vec::new();
        for (platform, members) in groups {
            match self.registry.resolve(&platform) {
                Ok(publisher) => {
                    debug!(platform = %platform, publisher = publisher.name(), accounts = members.len(), "routing platform group");
                    jobs.extend(members.into_iter().map(|(index, account)| AccountJob {
                        index,
                        publisher: Arc::clone(&publisher),
                        account,
                    }));
                }
                Err(e) => {
                    warn!(platform = %platform, accounts = members.len(), "no publisher registered for platform");
                    for (index, account) in members {
                        slots[index] = Some(PublishResult::failed_for(
                            &account,
                            ErrorKind::UnsupportedPlatform,
                            e.to_string(),
                            0,
                        ));
                    }
                }
            }
        }

        // Process in input order; completion order is still arbitrary
        jobs.sort_by_key(|job| job.index);
        jobs
    }

    async fn process_account(&self, post: &Post, job: AccountJob) -> (usize, PublishResult) {
        let AccountJob {
            index,
            publisher,
            mut account,
        } = job;
        let now = chrono::Utc::now().timestamp();

        if !account.active {
            debug!(account = %account.id, "skipping inactive account");
            return (
                index,
                PublishResult::failed_for(
                    &account,
                    ErrorKind::AccountInactive,
                    format!("Account {} is not active", account.id),
                    0,
                ),
            );
        }

        if account.is_rate_limited(now) {
            let reset_at = account.rate_limit_reset_at.unwrap_or(now);
            return (
                index,
                PublishResult::failed_for(
                    &account,
                    ErrorKind::RateLimited,
                    format!(
                        "Account {} is rate limited for another {}s",
                        account.id,
                        reset_at - now
                    ),
                    0,
                )
                .with_rate_limit_reset(Some(reset_at)),
            );
        }

        let skew = i64::try_from(self.options.refresh_skew.as_secs()).unwrap_or(i64::MAX);
        if account.is_token_expired(now.saturating_add(skew)) {
            debug!(account = %account.id, platform = %account.platform, "access token expired, refreshing");
            if let Err(e) = publisher.refresh_token(&mut account).await {
                warn!(account = %account.id, platform = %account.platform, error = %e, "token refresh failed");
                return (
                    index,
                    PublishResult::failed_for(&account, ErrorKind::TokenRefreshFailed, e.to_string(), 0),
                );
            }
        }

        if !publisher.validate_account(&account) {
            return (
                index,
                PublishResult::failed_for(
                    &account,
                    ErrorKind::InvalidCredential,
                    format!("Stored credential for account {} is not usable", account.id),
                    0,
                ),
            );
        }

        let (outcome, attempts) =
            publish_with_retry(publisher.as_ref(), post, &account, &self.options.retry).await;

        let result = match outcome {
            Ok(remote) => {
                info!(account = %account.id, platform = %account.platform, remote_id = %remote.id, "published");
                PublishResult::succeeded(&account, remote, attempts)
            }
            Err(e) => {
                warn!(account = %account.id, platform = %account.platform, error = %e, "publish failed");
                PublishResult::failed_for(&account, e.kind(), e.to_string(), attempts)
                    .with_rate_limit_reset(e.rate_limit_reset_at())
            }
        };
        (index, result)
    }
}

/// Publish with exponential backoff on transient errors
///
/// Returns the final outcome and how many attempts were made. Permanent
/// errors are returned immediately, and so is a rate limit whose reset lies
/// beyond the next backoff. Tokens are never refreshed here.
pub(crate) async fn publish_with_retry(
    publisher: &dyn Publisher,
    post: &Post,
    account: &Account,
    policy: &RetryPolicy,
) -> (PlatformResult<RemotePost>, u32) {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match publisher.publish_to_account(post, account).await {
            Ok(remote) => {
                if attempt > 1 {
                    info!(account = %account.id, attempt, "published after retry");
                }
                return (Ok(remote), attempt);
            }
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_with_jitter(attempt);
                if let Some(reset_at) = e.rate_limit_reset_at() {
                    let now = chrono::Utc::now().timestamp();
                    let delay_secs = i64::try_from(delay.as_secs()).unwrap_or(i64::MAX);
                    if reset_at > now.saturating_add(delay_secs) {
                        debug!(
                            account = %account.id,
                            attempt,
                            reset_in_secs = reset_at - now,
                            "rate limit outlasts backoff, not retrying"
                        );
                        return (Err(e), attempt);
                    }
                }
                warn!(
                    account = %account.id,
                    attempt,
                    max_attempts,
                    error = %e,
                    "transient publish error, retrying in {}",
                    humantime::format_duration(delay)
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return (Err(e), attempt),
        }
    }
}
