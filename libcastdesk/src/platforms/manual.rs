//! Manual publishing fallback
//!
//! Used for platforms no other publisher claims. It never contacts a
//! platform: every publish fails with the steps an operator needs to post
//! the content by hand, so the report carries them for the back office.

use async_trait::async_trait;

use crate::error::{PlatformError, PlatformResult};
use crate::platforms::{Publisher, RemotePost};
use crate::types::{Account, Post};

/// Where to go and what to do to post by hand on one platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualInstructions {
    pub url: String,
    pub steps: Vec<&'static str>,
}

const FACEBOOK_STEPS: &[&str] = &[
    "Log in to Facebook",
    "Click \"What's on your mind?\"",
    "Paste the content",
    "Attach the media",
    "Click \"Post\"",
];

const INSTAGRAM_STEPS: &[&str] = &[
    "Open Instagram",
    "Click the \"+\" icon",
    "Select the media",
    "Paste the content as the caption",
    "Share",
];

const X_STEPS: &[&str] = &[
    "Log in to X",
    "Click \"What's happening?\"",
    "Paste the content",
    "Attach the media",
    "Click \"Post\"",
];

const LINKEDIN_STEPS: &[&str] = &[
    "Log in to LinkedIn",
    "Click \"Start a post\"",
    "Paste the content",
    "Attach the media",
    "Click \"Post\"",
];

const GENERIC_STEPS: &[&str] = &[
    "Visit the platform",
    "Create a new post",
    "Paste the content",
    "Publish",
];

impl ManualInstructions {
    pub fn for_platform(platform: &str) -> Self {
        let (url, steps) = match platform {
            "facebook" => ("https://facebook.com".to_string(), FACEBOOK_STEPS),
            "instagram" => ("https://instagram.com".to_string(), INSTAGRAM_STEPS),
            "twitter" | "x" => ("https://x.com".to_string(), X_STEPS),
            "linkedin" => ("https://linkedin.com".to_string(), LINKEDIN_STEPS),
            other => (format!("https://{}.com", other), GENERIC_STEPS),
        };

        Self {
            url,
            steps: steps.to_vec(),
        }
    }

    /// Single-line rendering for a result's error message
    pub fn render(&self) -> String {
        let steps: Vec<String> = self
            .steps
            .iter()
            .enumerate()
            .map(|(i, step)| format!("{}. {}", i + 1, step))
            .collect();
        format!("{}: {}", self.url, steps.join("; "))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ManualPublisher;

impl ManualPublisher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Publisher for ManualPublisher {
    fn name(&self) -> &str {
        "manual"
    }

    /// Claims nothing, so it never collides with a registered publisher
    fn platforms(&self) -> Vec<String> {
        Vec::new()
    }

    fn supports_platform(&self, _platform: &str) -> bool {
        true
    }

    fn validate_account(&self, _account: &Account) -> bool {
        true
    }

    async fn refresh_token(&self, _account: &mut Account) -> PlatformResult<()> {
        Ok(())
    }

    async fn publish_to_account(&self, post: &Post, account: &Account) -> PlatformResult<RemotePost> {
        self.validate_content(post)?;

        let instructions = ManualInstructions::for_platform(&account.platform);
        Err(PlatformError::NotSupported(format!(
            "manual publishing required on {} for account {}: {}",
            account.platform,
            account.username.as_deref().unwrap_or(&account.platform_user_id),
            instructions.render()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_known_platform_instructions() {
        let instructions = ManualInstructions::for_platform("linkedin");
        assert_eq!(instructions.url, "https://linkedin.com");
        assert_eq!(instructions.steps[1], "Click \"Start a post\"");
        assert!(instructions.render().starts_with("https://linkedin.com: 1. Log in to LinkedIn; 2."));
    }

    #[test]
    fn test_unknown_platform_gets_generic_steps() {
        let instructions = ManualInstructions::for_platform("mastodon");
        assert_eq!(instructions.url, "https://mastodon.com");
        assert_eq!(instructions.steps.len(), 4);
    }

    #[tokio::test]
    async fn test_publish_returns_instructions() {
        let publisher = ManualPublisher::new();
        let account = Account::new("acc-1", "facebook", "page-1", "").with_username("shop");

        assert!(publisher.supports_platform("anything"));
        assert!(publisher.platforms().is_empty());
        assert!(publisher.validate_account(&account));

        let err = publisher
            .publish_to_account(&Post::new("Do it by hand"), &account)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PlatformRejected);
        let message = err.to_string();
        assert!(message.contains("manual publishing required on facebook for account shop"));
        assert!(message.contains("https://facebook.com"));
    }
}
