//! Webhook publisher
//!
//! Hands posts to an external automation endpoint (an aggregator, a Zapier
//! style flow) for the platforms listed in its configuration. Each publish
//! is one JSON POST carrying a `social_post_publish` event.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::WebhookConfig;
use crate::error::{PlatformError, PlatformResult};
use crate::platforms::http::{error_from_response, map_transport_error};
use crate::platforms::{Publisher, RemotePost};
use crate::types::{Account, Post};

const PLATFORM_LABEL: &str = "Webhook";
pub const PUBLISH_EVENT: &str = "social_post_publish";

#[derive(Debug, Serialize)]
struct WebhookEvent<'a> {
    event: &'static str,
    post: &'a Post,
    account: WebhookAccount<'a>,
    timestamp: i64,
}

#[derive(Debug, Serialize)]
struct WebhookAccount<'a> {
    id: &'a str,
    platform: &'a str,
    platform_user_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    access_token: Option<&'a str>,
}

/// Optional acknowledgement body returned by the endpoint
#[derive(Debug, Default, Deserialize)]
struct WebhookAck {
    #[serde(default)]
    post_id: Option<String>,
    #[serde(default)]
    post_url: Option<String>,
}

pub struct WebhookPublisher {
    client: Client,
    url: String,
    platforms: Vec<String>,
    include_access_token: bool,
}

impl WebhookPublisher {
    pub fn new(config: &WebhookConfig, client: Client) -> Self {
        Self {
            client,
            url: config.url.clone(),
            platforms: config.platforms.clone(),
            include_access_token: config.include_access_token,
        }
    }

    fn event<'a>(&self, post: &'a Post, account: &'a Account) -> WebhookEvent<'a> {
        WebhookEvent {
            event: PUBLISH_EVENT,
            post,
            account: WebhookAccount {
                id: &account.id,
                platform: &account.platform,
                platform_user_id: &account.platform_user_id,
                username: account.username.as_deref(),
                access_token: self
                    .include_access_token
                    .then(|| account.access_token()),
            },
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

#[async_trait]
impl Publisher for WebhookPublisher {
    fn name(&self) -> &str {
        "webhook"
    }

    fn platforms(&self) -> Vec<String> {
        self.platforms.clone()
    }

    /// The endpoint holds its own credentials
    fn validate_account(&self, _account: &Account) -> bool {
        true
    }

    async fn refresh_token(&self, account: &mut Account) -> PlatformResult<()> {
        Err(PlatformError::NotSupported(format!(
            "webhook publisher cannot refresh tokens for account {}",
            account.id
        )))
    }

    async fn publish_to_account(&self, post: &Post, account: &Account) -> PlatformResult<RemotePost> {
        self.validate_content(post)?;

        let response = self
            .client
            .post(&self.url)
            .json(&self.event(post, account))
            .send()
            .await
            .map_err(|e| map_transport_error(e, PLATFORM_LABEL, "publish"))?;

        if !response.status().is_success() {
            return Err(error_from_response(response, PLATFORM_LABEL, "publish").await);
        }

        // Endpoints are free to answer with an empty or non-JSON body
        let body = response.text().await.unwrap_or_default();
        let ack: WebhookAck = serde_json::from_str(&body).unwrap_or_default();

        let id = ack
            .post_id
            .unwrap_or_else(|| format!("webhook-{}", uuid::Uuid::new_v4()));
        tracing::debug!(account = %account.id, platform = %account.platform, post_id = %id, "webhook accepted post");

        let mut remote = RemotePost::new(id);
        remote.url = ack.post_url;
        Ok(remote)
    }
}
