//! LinkedIn publisher using the UGC Posts API

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::LinkedInConfig;
use crate::error::{PlatformError, PlatformResult};
use crate::platforms::http::{
    apply_token_response, error_from_response, map_transport_error, normalize_base_url,
};
use crate::platforms::{token_is_well_formed, Publisher, RemotePost};
use crate::types::{Account, Post};

const PLATFORM_LABEL: &str = "LinkedIn";
const RESTLI_PROTOCOL_VERSION: &str = "2.0.0";
const COMMENTARY_LIMIT: usize = 3000;

#[derive(Debug, Deserialize)]
struct CreatedPost {
    id: Option<String>,
}

pub struct LinkedInPublisher {
    client: Client,
    api_base_url: String,
    oauth_base_url: String,
    client_id: String,
    client_secret: SecretString,
}

impl LinkedInPublisher {
    pub fn new(config: &LinkedInConfig, client_secret: SecretString, client: Client) -> Self {
        Self {
            client,
            api_base_url: normalize_base_url(&config.api_base_url),
            oauth_base_url: normalize_base_url(&config.oauth_base_url),
            client_id: config.client_id.clone(),
            client_secret,
        }
    }
}

/// Author URN for the account: an explicit `author_urn` (e.g. an
/// organization page) wins over the member's person URN.
fn author_urn(account: &Account) -> String {
    account
        .platform_data
        .get("author_urn")
        .cloned()
        .unwrap_or_else(|| format!("urn:li:person:{}", account.platform_user_id))
}

fn ugc_payload(post: &Post, author: &str) -> Value {
    let mut share_content = json!({
        "shareCommentary": { "text": post.content },
        "shareMediaCategory": "NONE",
    });

    if let Some(link) = post.link_url.as_deref() {
        let mut media = json!({
            "status": "READY",
            "originalUrl": link,
        });
        if let Some(title) = post.title.as_deref() {
            media["title"] = json!({ "text": title });
        }
        share_content["shareMediaCategory"] = json!("ARTICLE");
        share_content["media"] = json!([media]);
    }

    json!({
        "author": author,
        "lifecycleState": "PUBLISHED",
        "specificContent": {
            "com.linkedin.ugc.ShareContent": share_content,
        },
        "visibility": {
            "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC",
        },
    })
}

#[async_trait]
impl Publisher for LinkedInPublisher {
    fn name(&self) -> &str {
        "linkedin"
    }

    fn platforms(&self) -> Vec<String> {
        vec!["linkedin".to_string()]
    }

    fn validate_account(&self, account: &Account) -> bool {
        token_is_well_formed(account.access_token())
            && (!account.platform_user_id.trim().is_empty()
                || account.platform_data.contains_key("author_urn"))
    }

    fn validate_content(&self, post: &Post) -> PlatformResult<()> {
        if post.content.trim().is_empty() {
            return Err(PlatformError::Rejected(
                "LinkedIn posts require commentary text".to_string(),
            ));
        }
        if post.content.chars().count() > COMMENTARY_LIMIT {
            return Err(PlatformError::Rejected(format!(
                "LinkedIn commentary is limited to {} characters",
                COMMENTARY_LIMIT
            )));
        }
        Ok(())
    }

    async fn refresh_token(&self, account: &mut Account) -> PlatformResult<()> {
        let refresh = account.refresh_token().ok_or_else(|| {
            PlatformError::Authentication(format!(
                "Account {} has no LinkedIn refresh token",
                account.id
            ))
        })?;

        let url = format!("{}/oauth/v2/accessToken", self.oauth_base_url);
        let response = self
            .client
            .post(&url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret()),
            ])
            .send()
            .await
            .map_err(|e| map_transport_error(e, PLATFORM_LABEL, "refresh token"))?;

        apply_token_response(response, account, PLATFORM_LABEL).await?;
        tracing::info!(account = %account.id, "refreshed LinkedIn access token");
        Ok(())
    }

    async fn publish_to_account(&self, post: &Post, account: &Account) -> PlatformResult<RemotePost> {
        self.validate_content(post)?;

        let author = author_urn(account);
        let url = format!("{}/v2/ugcPosts", self.api_base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(account.access_token())
            .header("X-Restli-Protocol-Version", RESTLI_PROTOCOL_VERSION)
            .json(&ugc_payload(post, &author))
            .send()
            .await
            .map_err(|e| map_transport_error(e, PLATFORM_LABEL, "publish"))?;

        if !response.status().is_success() {
            return Err(error_from_response(response, PLATFORM_LABEL, "publish").await);
        }

        let header_id = response
            .headers()
            .get("x-restli-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let id = match header_id {
            Some(id) => id,
            None => response
                .json::<CreatedPost>()
                .await
                .ok()
                .and_then(|created| created.id)
                .ok_or_else(|| {
                    PlatformError::Rejected(
                        "LinkedIn accepted the post but returned no post id".to_string(),
                    )
                })?,
        };

        tracing::debug!(account = %account.id, post_id = %id, "published LinkedIn post");
        let url = format!("https://www.linkedin.com/feed/update/{}", id);
        Ok(RemotePost::new(id).with_url(url))
    }
}
