//! Ayrshare aggregator publisher
//!
//! One API key posts to many networks on behalf of Ayrshare user profiles.
//! The profile an account publishes through comes from its
//! `ayrshare_profile_key` platform data, or the configured default profile.
//! Ayrshare keeps the network tokens itself, so the account's own access
//! token is never sent.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::AyrshareConfig;
use crate::error::{PlatformError, PlatformResult};
use crate::platforms::http::{error_from_response, map_transport_error, normalize_base_url};
use crate::platforms::{token_is_well_formed, Publisher, RemotePost};
use crate::types::{Account, Post};

const PLATFORM_LABEL: &str = "Ayrshare";

/// Platform data key holding the account's Ayrshare profile key
pub const PROFILE_KEY: &str = "ayrshare_profile_key";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PostRequest<'a> {
    post: String,
    platforms: [&'a str; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    media_urls: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    video_url: Option<&'a str>,
    #[serde(rename = "shorten_links", skip_serializing_if = "std::ops::Not::not")]
    shorten_links: bool,
    profile_keys: [&'a str; 1],
}

pub struct AyrsharePublisher {
    client: Client,
    base_url: String,
    api_key: SecretString,
    default_profile_key: Option<String>,
    platforms: Vec<String>,
}

impl AyrsharePublisher {
    pub fn new(config: &AyrshareConfig, api_key: SecretString, client: Client) -> Self {
        Self {
            client,
            base_url: normalize_base_url(&config.base_url),
            api_key,
            default_profile_key: config.profile_key.clone().filter(|k| !k.is_empty()),
            platforms: config.platforms.clone(),
        }
    }

    fn profile_key<'a>(&'a self, account: &'a Account) -> Option<&'a str> {
        account
            .platform_data
            .get(PROFILE_KEY)
            .map(String::as_str)
            .or(self.default_profile_key.as_deref())
    }

    fn request<'a>(&self, post: &'a Post, account: &'a Account, profile_key: &'a str) -> PostRequest<'a> {
        // Ayrshare has no link field; the link travels in the text
        let text = match post.link_url.as_deref() {
            Some(link) if !post.content.contains(link) => format!("{}\n\n{}", post.content, link),
            _ => post.content.clone(),
        };

        let video_url = post.first_video().map(|m| m.url.as_str());
        let media_urls = if video_url.is_some() {
            Vec::new()
        } else {
            post.media.iter().map(|m| m.url.as_str()).collect()
        };

        PostRequest {
            post: text,
            platforms: [account.platform.as_str()],
            title: post.title.as_deref(),
            media_urls,
            video_url,
            shorten_links: post.link_url.is_some(),
            profile_keys: [profile_key],
        }
    }
}

/// Pick this platform's post out of an Ayrshare `/post` response
///
/// Current responses list `postIds` entries per platform; older ones carry
/// flat `{platform}Id` / `{platform}Url` fields. Per-platform entries in
/// `errors` win over both.
fn parse_post_response(body: &Value, platform: &str) -> PlatformResult<RemotePost> {
    let platform_error = body
        .get("errors")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .find(|e| e.get("platform").and_then(Value::as_str) == Some(platform))
        .map(|e| {
            e.get("message")
                .and_then(Value::as_str)
                .unwrap_or("no reason given")
                .to_string()
        });
    if let Some(message) = platform_error {
        return Err(PlatformError::Rejected(format!(
            "{} could not post to {}: {}",
            PLATFORM_LABEL, platform, message
        )));
    }

    let entry = body
        .get("postIds")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .find(|e| e.get("platform").and_then(Value::as_str) == Some(platform));

    let id = entry
        .and_then(|e| e.get("id"))
        .or_else(|| body.get(format!("{}Id", platform)))
        .or_else(|| body.get("id"))
        .and_then(Value::as_str);
    let url = entry
        .and_then(|e| e.get("postUrl"))
        .or_else(|| body.get(format!("{}Url", platform)))
        .and_then(Value::as_str);

    match id {
        Some(id) => {
            let remote = RemotePost::new(id);
            Ok(match url {
                Some(url) => remote.with_url(url),
                None => remote,
            })
        }
        None => Err(PlatformError::Rejected(format!(
            "{} accepted the request but returned no post id for {}",
            PLATFORM_LABEL, platform
        ))),
    }
}

#[async_trait]
impl Publisher for AyrsharePublisher {
    fn name(&self) -> &str {
        "ayrshare"
    }

    fn platforms(&self) -> Vec<String> {
        self.platforms.clone()
    }

    /// A profile key is required so a post never lands on the wrong profile
    fn validate_account(&self, account: &Account) -> bool {
        self.profile_key(account).is_some_and(token_is_well_formed)
    }

    /// Ayrshare refreshes network tokens on its side
    async fn refresh_token(&self, account: &mut Account) -> PlatformResult<()> {
        debug!(account = %account.id, "token refresh is handled by Ayrshare");
        Ok(())
    }

    async fn publish_to_account(&self, post: &Post, account: &Account) -> PlatformResult<RemotePost> {
        self.validate_content(post)?;

        let profile_key = self.profile_key(account).ok_or_else(|| {
            PlatformError::Authentication(format!(
                "account {} has no {} and no default profile is configured",
                account.id, PROFILE_KEY
            ))
        })?;

        let response = self
            .client
            .post(format!("{}/post", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&self.request(post, account, profile_key))
            .send()
            .await
            .map_err(|e| map_transport_error(e, PLATFORM_LABEL, "publish"))?;

        if !response.status().is_success() {
            return Err(error_from_response(response, PLATFORM_LABEL, "publish").await);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| map_transport_error(e, PLATFORM_LABEL, "parse post response"))?;

        parse_post_response(&body, &account.platform)
    }
}
