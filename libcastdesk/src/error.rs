//! Error types for Castdesk

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CastdeskError>;

/// Result type returned by publisher adapters
pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

#[derive(Error, Debug)]
pub enum CastdeskError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CastdeskError {
    /// Returns the process exit code for this error
    ///
    /// Codes 0-2 are reserved for dispatch outcomes (see
    /// [`DispatchStatus::exit_code`](crate::report::DispatchStatus::exit_code)).
    /// A platform error escaping a dispatch gets 5 so it never reads as a
    /// partial failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            CastdeskError::InvalidInput(_) => 3,
            CastdeskError::Config(_) => 4,
            CastdeskError::Registry(_) => 4,
            CastdeskError::Platform(_) => 5,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Errors raised while assembling or querying the publisher registry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Platform '{platform}' is already handled by publisher '{existing}'; refusing to register '{rejected}'")]
    DuplicatePlatform {
        platform: String,
        existing: String,
        rejected: String,
    },

    #[error("No publisher registered for platform '{0}'")]
    UnsupportedPlatform(String),
}

/// Failure reported by a publisher adapter for a single account
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rejected by platform: {0}")]
    Rejected(String),

    /// No connection or a 5xx: the platform did not take the post
    #[error("Network error: {0}")]
    Network(String),

    /// The request went out but no answer came back, so the post may exist
    #[error("Delivery unconfirmed: {0}")]
    Unconfirmed(String),

    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        /// Unix timestamp at which the platform accepts requests again
        reset_at: Option<i64>,
    },

    #[error("Not supported: {0}")]
    NotSupported(String),
}

impl PlatformError {
    /// Map the adapter error onto the per-account error taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlatformError::Authentication(_) => ErrorKind::InvalidCredential,
            PlatformError::Rejected(_) | PlatformError::NotSupported(_) => {
                ErrorKind::PlatformRejected
            }
            PlatformError::Network(_) | PlatformError::Unconfirmed(_) => ErrorKind::NetworkError,
            PlatformError::RateLimit { .. } => ErrorKind::RateLimited,
        }
    }

    /// Transient errors are worth another attempt; everything else is final
    ///
    /// `Unconfirmed` is final: sending the request again could publish twice.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PlatformError::Network(_) | PlatformError::RateLimit { .. }
        )
    }

    /// Rate limit without a known reset time
    pub fn rate_limited(message: impl Into<String>) -> Self {
        PlatformError::RateLimit {
            message: message.into(),
            reset_at: None,
        }
    }

    /// When the platform said it will accept requests again, if it did
    pub fn rate_limit_reset_at(&self) -> Option<i64> {
        match self {
            PlatformError::RateLimit { reset_at, .. } => *reset_at,
            _ => None,
        }
    }
}

/// Terminal failure category recorded on a [`PublishResult`](crate::report::PublishResult)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedPlatform,
    InvalidCredential,
    TokenRefreshFailed,
    NetworkError,
    PlatformRejected,
    Timeout,
    RateLimited,
    AccountInactive,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedPlatform => "unsupported_platform",
            ErrorKind::InvalidCredential => "invalid_credential",
            ErrorKind::TokenRefreshFailed => "token_refresh_failed",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::PlatformRejected => "platform_rejected",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::AccountInactive => "account_inactive",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = CastdeskError::InvalidInput("accounts file is empty".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_platform_is_distinct_from_dispatch_outcomes() {
        let error = CastdeskError::Platform(PlatformError::Rejected("policy".to_string()));
        let code = error.exit_code();
        assert_eq!(code, 5);
        for outcome in 0..=2 {
            assert_ne!(code, outcome);
        }
    }

    #[test]
    fn test_exit_code_config_and_registry() {
        let config = CastdeskError::Config(ConfigError::MissingField("meta.client_id".to_string()));
        assert_eq!(config.exit_code(), 4);

        let registry = CastdeskError::Registry(RegistryError::DuplicatePlatform {
            platform: "facebook".to_string(),
            existing: "meta".to_string(),
            rejected: "webhook".to_string(),
        });
        assert_eq!(registry.exit_code(), 4);
    }

    #[test]
    fn test_error_message_formatting_platform() {
        let error = CastdeskError::Platform(PlatformError::Rejected(
            "Content exceeds 280 characters".to_string(),
        ));
        assert_eq!(
            error.to_string(),
            "Platform error: Rejected by platform: Content exceeds 280 characters"
        );
    }

    #[test]
    fn test_error_message_formatting_config() {
        let error = CastdeskError::Config(ConfigError::InvalidValue {
            field: "dispatch.max_in_flight".to_string(),
            reason: "must be at least 1".to_string(),
        });
        assert_eq!(
            error.to_string(),
            "Configuration error: Invalid value for dispatch.max_in_flight: must be at least 1"
        );
    }

    #[test]
    fn test_duplicate_platform_message_names_both_publishers() {
        let error = RegistryError::DuplicatePlatform {
            platform: "x".to_string(),
            existing: "first".to_string(),
            rejected: "second".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("'x'"));
        assert!(message.contains("first"));
        assert!(message.contains("second"));
    }

    #[test]
    fn test_error_conversion_from_registry_error() {
        let error: CastdeskError = RegistryError::UnsupportedPlatform("mystery".to_string()).into();
        match error {
            CastdeskError::Registry(RegistryError::UnsupportedPlatform(platform)) => {
                assert_eq!(platform, "mystery");
            }
            _ => panic!("Expected CastdeskError::Registry"),
        }
    }

    #[test]
    fn test_platform_error_kinds() {
        assert_eq!(
            PlatformError::Authentication("expired".to_string()).kind(),
            ErrorKind::InvalidCredential
        );
        assert_eq!(
            PlatformError::Rejected("policy".to_string()).kind(),
            ErrorKind::PlatformRejected
        );
        assert_eq!(
            PlatformError::NotSupported("no media".to_string()).kind(),
            ErrorKind::PlatformRejected
        );
        assert_eq!(
            PlatformError::Network("reset".to_string()).kind(),
            ErrorKind::NetworkError
        );
        assert_eq!(
            PlatformError::Unconfirmed("timed out".to_string()).kind(),
            ErrorKind::NetworkError
        );
        assert_eq!(
            PlatformError::rate_limited("429").kind(),
            ErrorKind::RateLimited
        );
    }

    #[test]
    fn test_transient_errors() {
        assert!(PlatformError::Network("timeout".to_string()).is_transient());
        assert!(PlatformError::rate_limited("slow down").is_transient());
        assert!(!PlatformError::Unconfirmed("timed out".to_string()).is_transient());
        assert!(!PlatformError::Authentication("bad token".to_string()).is_transient());
        assert!(!PlatformError::Rejected("policy".to_string()).is_transient());
        assert!(!PlatformError::NotSupported("refresh".to_string()).is_transient());
    }

    #[test]
    fn test_rate_limit_reset_at() {
        let error = PlatformError::RateLimit {
            message: "slow down".to_string(),
            reset_at: Some(1_700_000_060),
        };
        assert_eq!(error.rate_limit_reset_at(), Some(1_700_000_060));
        assert_eq!(error.to_string(), "Rate limit exceeded: slow down");
        assert_eq!(PlatformError::rate_limited("x").rate_limit_reset_at(), None);
        assert_eq!(PlatformError::Network("x".to_string()).rate_limit_reset_at(), None);
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::TokenRefreshFailed).unwrap();
        assert_eq!(json, "\"token_refresh_failed\"");

        let parsed: ErrorKind = serde_json::from_str("\"unsupported_platform\"").unwrap();
        assert_eq!(parsed, ErrorKind::UnsupportedPlatform);
    }

    #[test]
    fn test_error_kind_display_matches_serde_name() {
        for kind in [
            ErrorKind::UnsupportedPlatform,
            ErrorKind::InvalidCredential,
            ErrorKind::TokenRefreshFailed,
            ErrorKind::NetworkError,
            ErrorKind::PlatformRejected,
            ErrorKind::Timeout,
            ErrorKind::RateLimited,
            ErrorKind::AccountInactive,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json.trim_matches('"'), kind.to_string());
        }
    }

    #[test]
    fn test_platform_error_clone() {
        // Retry loop keeps the last error around between attempts
        let original = PlatformError::Network("Connection failed".to_string());
        let cloned = original.clone();
        assert_eq!(original, cloned);
    }
}
