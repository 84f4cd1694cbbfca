//! Per-account results and the aggregate dispatch report

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::platforms::RemotePost;
use crate::types::Account;

/// Terminal outcome for one account within a dispatch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublishResult {
    pub account_id: String,
    pub platform: String,
    pub success: bool,
    pub remote_post_id: Option<String>,
    pub remote_url: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    /// Publish attempts made (0 when the account never reached the platform)
    pub attempts: u32,
    pub completed_at: i64,
    /// When a rate-limited account may publish again (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_reset_at: Option<i64>,
}

impl PublishResult {
    pub fn succeeded(account: &Account, remote: RemotePost, attempts: u32) -> Self {
        Self {
            account_id: account.id.clone(),
            platform: account.platform.clone(),
            success: true,
            remote_post_id: Some(remote.id),
            remote_url: remote.url,
            error_kind: None,
            error_message: None,
            attempts,
            completed_at: chrono::Utc::now().timestamp(),
            rate_limit_reset_at: None,
        }
    }

    pub fn failed(
        account_id: impl Into<String>,
        platform: impl Into<String>,
        kind: ErrorKind,
        message: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            platform: platform.into(),
            success: false,
            remote_post_id: None,
            remote_url: None,
            error_kind: Some(kind),
            error_message: Some(message.into()),
            attempts,
            completed_at: chrono::Utc::now().timestamp(),
            rate_limit_reset_at: None,
        }
    }

    pub fn failed_for(account: &Account, kind: ErrorKind, message: impl Into<String>, attempts: u32) -> Self {
        Self::failed(account.id.clone(), account.platform.clone(), kind, message, attempts)
    }

    pub fn with_rate_limit_reset(mut self, reset_at: Option<i64>) -> Self {
        self.rate_limit_reset_at = reset_at;
        self
    }
}

/// Overall outcome of a dispatch
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    AllSucceeded,
    PartialFailure,
    AllFailed,
}

impl DispatchStatus {
    /// An empty result set counts as a failure: nothing was published
    pub fn from_results(results: &[PublishResult]) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        if succeeded == 0 {
            DispatchStatus::AllFailed
        } else if succeeded == results.len() {
            DispatchStatus::AllSucceeded
        } else {
            DispatchStatus::PartialFailure
        }
    }

    /// Status string used by the back-office post records
    pub fn as_post_status(&self) -> &'static str {
        match self {
            DispatchStatus::AllSucceeded => "published",
            DispatchStatus::PartialFailure => "partially_published",
            DispatchStatus::AllFailed => "failed",
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            DispatchStatus::AllSucceeded => 0,
            DispatchStatus::PartialFailure => 1,
            DispatchStatus::AllFailed => 2,
        }
    }
}

impl std::fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchStatus::AllSucceeded => write!(f, "all_succeeded"),
            DispatchStatus::PartialFailure => write!(f, "partial_failure"),
            DispatchStatus::AllFailed => write!(f, "all_failed"),
        }
    }
}

/// Aggregate of every [`PublishResult`] for one post
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchReport {
    pub post_id: String,
    pub status: DispatchStatus,
    pub results: Vec<PublishResult>,
    pub started_at: i64,
    pub finished_at: i64,
    pub elapsed_ms: u64,
}

impl DispatchReport {
    pub fn new(
        post_id: impl Into<String>,
        results: Vec<PublishResult>,
        started_at: i64,
        elapsed: Duration,
    ) -> Self {
        Self {
            post_id: post_id.into(),
            status: DispatchStatus::from_results(&results),
            results,
            started_at,
            finished_at: chrono::Utc::now().timestamp(),
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &PublishResult> {
        self.results.iter().filter(|r| r.success)
    }

    pub fn failed(&self) -> impl Iterator<Item = &PublishResult> {
        self.results.iter().filter(|r| !r.success)
    }

    pub fn success_count(&self) -> usize {
        self.succeeded().count()
    }

    pub fn failure_count(&self) -> usize {
        self.failed().count()
    }

    pub fn result_for(&self, account_id: &str) -> Option<&PublishResult> {
        self.results.iter().find(|r| r.account_id == account_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(id: &str) -> PublishResult {
        let account = Account::new(id, "facebook", "page", "tok");
        PublishResult::succeeded(
            &account,
            RemotePost {
                id: format!("remote-{}", id),
                url: None,
            },
            1,
        )
    }

    fn err(id: &str) -> PublishResult {
        PublishResult::failed(id, "facebook", ErrorKind::NetworkError, "reset", 3)
    }

    #[test]
    fn test_status_all_succeeded() {
        assert_eq!(
            DispatchStatus::from_results(&[ok("a"), ok("b")]),
            DispatchStatus::AllSucceeded
        );
    }

    #[test]
    fn test_status_all_failed() {
        assert_eq!(
            DispatchStatus::from_results(&[err("a"), err("b")]),
            DispatchStatus::AllFailed
        );
    }

    #[test]
    fn test_status_partial_failure() {
        assert_eq!(
            DispatchStatus::from_results(&[ok("a"), err("b")]),
            DispatchStatus::PartialFailure
        );
    }

    #[test]
    fn test_status_empty_is_failure() {
        assert_eq!(DispatchStatus::from_results(&[]), DispatchStatus::AllFailed);
    }

    #[test]
    fn test_status_vocabulary() {
        assert_eq!(DispatchStatus::AllSucceeded.as_post_status(), "published");
        assert_eq!(
            DispatchStatus::PartialFailure.as_post_status(),
            "partially_published"
        );
        assert_eq!(DispatchStatus::AllFailed.as_post_status(), "failed");
        assert_eq!(DispatchStatus::PartialFailure.to_string(), "partial_failure");
    }

    #[test]
    fn test_report_accessors() {
        let report = DispatchReport::new(
            "post-1",
            vec![ok("a"), err("b"), ok("c")],
            0,
            Duration::from_millis(12),
        );

        assert_eq!(report.len(), 3);
        assert_eq!(report.success_count(), 2);
        assert_eq!(report.failure_count(), 1);
        assert_eq!(report.status, DispatchStatus::PartialFailure);
        assert_eq!(report.elapsed_ms, 12);
        assert_eq!(
            report.result_for("b").and_then(|r| r.error_kind),
            Some(ErrorKind::NetworkError)
        );
        assert!(report.result_for("zzz").is_none());
    }

    #[test]
    fn test_report_serializes_for_persistence_layer() {
        let report = DispatchReport::new("post-1", vec![err("a")], 0, Duration::ZERO);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "all_failed");
        assert_eq!(json["results"][0]["error_kind"], "network_error");
        assert_eq!(json["results"][0]["attempts"], 3);
        assert!(json["results"][0].get("rate_limit_reset_at").is_none());
    }

    #[test]
    fn test_rate_limit_reset_is_reported() {
        let result = PublishResult::failed("a", "twitter", ErrorKind::RateLimited, "429", 1)
            .with_rate_limit_reset(Some(1_700_000_900));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["rate_limit_reset_at"], 1_700_000_900);
    }
}
