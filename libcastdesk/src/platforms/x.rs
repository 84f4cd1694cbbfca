//! X (formerly Twitter) publisher using the v2 API

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::config::XConfig;
use crate::error::{PlatformError, PlatformResult};
use crate::platforms::http::{
    apply_token_response, error_from_response, map_transport_error, normalize_base_url,
};
use crate::platforms::{token_is_well_formed, Publisher, RemotePost};
use crate::types::{Account, Post};

const PLATFORM_LABEL: &str = "X";
const TWEET_LIMIT: usize = 280;
/// Every link is shortened to a t.co URL of this length
const SHORTENED_LINK_LENGTH: usize = 23;

#[derive(Debug, Deserialize)]
struct TweetResponse {
    data: TweetData,
}

#[derive(Debug, Deserialize)]
struct TweetData {
    id: String,
}

pub struct XPublisher {
    client: Client,
    base_url: String,
    client_id: String,
    client_secret: SecretString,
}

impl XPublisher {
    pub fn new(config: &XConfig, client_secret: SecretString, client: Client) -> Self {
        Self {
            client,
            base_url: normalize_base_url(&config.base_url),
            client_id: config.client_id.clone(),
            client_secret,
        }
    }
}

fn tweet_text(post: &Post) -> String {
    match post.link_url.as_deref() {
        Some(link) if !post.content.contains(link) => {
            if post.content.is_empty() {
                link.to_string()
            } else {
                format!("{} {}", post.content, link)
            }
        }
        _ => post.content.clone(),
    }
}

/// Length as X counts it: characters, with each http(s) link weighted as a t.co URL
fn weighted_length(text: &str) -> usize {
    text.split_whitespace()
        .map(|word| {
            if word.starts_with("http://") || word.starts_with("https://") {
                SHORTENED_LINK_LENGTH
            } else {
                word.chars().count()
            }
        })
        .sum::<usize>()
        + text.chars().filter(|c| c.is_whitespace()).count()
}

#[async_trait]
impl Publisher for XPublisher {
    fn name(&self) -> &str {
        "x"
    }

    fn platforms(&self) -> Vec<String> {
        vec!["twitter".to_string(), "x".to_string()]
    }

    fn validate_account(&self, account: &Account) -> bool {
        token_is_well_formed(account.access_token())
    }

    fn validate_content(&self, post: &Post) -> PlatformResult<()> {
        let text = tweet_text(post);
        if text.trim().is_empty() {
            return Err(PlatformError::Rejected("Tweets require text".to_string()));
        }
        let length = weighted_length(&text);
        if length > TWEET_LIMIT {
            return Err(PlatformError::Rejected(format!(
                "Tweet is {} characters, limit is {}",
                length, TWEET_LIMIT
            )));
        }
        Ok(())
    }

    async fn refresh_token(&self, account: &mut Account) -> PlatformResult<()> {
        let refresh = account.refresh_token().ok_or_else(|| {
            PlatformError::Authentication(format!(
                "Account {} has no X refresh token (offline.access scope missing?)",
                account.id
            ))
        })?;

        let url = format!("{}/2/oauth2/token", self.base_url);
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.client_id, Some(self.client_secret.expose_secret()))
            .form(&[
                ("refresh_token", refresh),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| map_transport_error(e, PLATFORM_LABEL, "refresh token"))?;

        apply_token_response(response, account, PLATFORM_LABEL).await?;
        tracing::info!(account = %account.id, "refreshed X access token");
        Ok(())
    }

    async fn publish_to_account(&self, post: &Post, account: &Account) -> PlatformResult<RemotePost> {
        self.validate_content(post)?;

        let url = format!("{}/2/tweets", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(account.access_token())
            .json(&serde_json::json!({ "text": tweet_text(post) }))
            .send()
            .await
            .map_err(|e| map_transport_error(e, PLATFORM_LABEL, "publish"))?;

        if !response.status().is_success() {
            return Err(error_from_response(response, PLATFORM_LABEL, "publish").await);
        }

        let tweet: TweetResponse = response
            .json()
            .await
            .map_err(|e| map_transport_error(e, PLATFORM_LABEL, "parse tweet response"))?;

        let id = tweet.data.id;
        tracing::debug!(account = %account.id, post_id = %id, "published tweet");
        let url = format!("https://x.com/i/web/status/{}", id);
        Ok(RemotePost::new(id).with_url(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;
    use crate::platforms::http::build_client;
    use wiremock::matchers::{body_json, body_string_contains, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn publisher(base_url: &str) -> XPublisher {
        let config = XConfig {
            enabled: true,
            client_id: "x-client".to_string(),
            client_secret: None,
            client_secret_file: None,
            base_url: base_url.to_string(),
        };
        let client = build_client(&HttpConfig::default()).unwrap();
        XPublisher::new(&config, SecretString::from("x-secret".to_string()), client)
    }

    #[test]
    fn test_claims_both_identifiers() {
        let publisher = publisher("https://api.example.com");
        assert!(publisher.supports_platform("twitter"));
        assert!(publisher.supports_platform("x"));
    }

    #[test]
    fn test_tweet_text_appends_link() {
        let post = Post::new("Launch day").with_link("https://example.com/launch");
        assert_eq!(tweet_text(&post), "Launch day https://example.com/launch");
        assert_eq!(tweet_text(&Post::new("plain")), "plain");
    }

    #[test]
    fn test_weighted_length_counts_links_as_shortened() {
        let long_link = format!("https://example.com/{}", "a".repeat(200));
        assert_eq!(weighted_length(&format!("hi {}", long_link)), 3 + SHORTENED_LINK_LENGTH);
    }

    #[test]
    fn test_validate_content_length() {
        let publisher = publisher("https://api.example.com");
        assert!(publisher.validate_content(&Post::new("a".repeat(280))).is_ok());

        let err = publisher
            .validate_content(&Post::new("a".repeat(281)))
            .unwrap_err();
        assert!(err.to_string().contains("281 characters"));

        // A long URL still fits because it is shortened
        let post = Post::new("a".repeat(250)).with_link(format!("https://example.com/{}", "p".repeat(100)));
        assert!(publisher.validate_content(&post).is_ok());
    }

    #[tokio::test]
    async fn test_publish_tweet() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/tweets"))
            .and(header("authorization", "Bearer x-token"))
            .and(body_json(serde_json::json!({ "text": "Hello X" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "data": { "id": "1790000000000000001", "text": "Hello X" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let publisher = publisher(&server.uri());
        let account = Account::new("acc-1", "twitter", "user-1", "x-token");

        let remote = publisher
            .publish_to_account(&Post::new("Hello X"), &account)
            .await
            .unwrap();
        assert_eq!(remote.id, "1790000000000000001");
        assert_eq!(
            remote.url.as_deref(),
            Some("https://x.com/i/web/status/1790000000000000001")
        );
    }

    #[tokio::test]
    async fn test_duplicate_tweet_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/tweets"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "detail": "You are not allowed to create a Tweet with duplicate content.",
                "status": 403
            })))
            .mount(&server)
            .await;

        let publisher = publisher(&server.uri());
        let account = Account::new("acc-1", "x", "user-1", "x-token");

        let err = publisher
            .publish_to_account(&Post::new("again"), &account)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("duplicate content"));
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/tweets"))
            .respond_with(ResponseTemplate::new(429).insert_header("x-rate-limit-reset", "4102444800"))
            .mount(&server)
            .await;

        let publisher = publisher(&server.uri());
        let account = Account::new("acc-1", "x", "user-1", "x-token");

        let err = publisher
            .publish_to_account(&Post::new("busy"), &account)
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::RateLimit { .. }));
        assert_eq!(err.rate_limit_reset_at(), Some(4_102_444_800));
    }

    #[tokio::test]
    async fn test_slow_answer_is_unconfirmed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/tweets"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(serde_json::json!({"data": {"id": "late"}}))
                    .set_delay(std::time::Duration::from_millis(400)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = build_client(&HttpConfig {
            request_timeout: std::time::Duration::from_millis(150),
            ..HttpConfig::default()
        })
        .unwrap();
        let config = XConfig {
            enabled: true,
            client_id: "x-client".to_string(),
            client_secret: None,
            client_secret_file: None,
            base_url: server.uri(),
        };
        let publisher = XPublisher::new(&config, SecretString::from("x-secret".to_string()), client);
        let account = Account::new("acc-1", "x", "user-1", "x-token");

        let err = publisher
            .publish_to_account(&Post::new("slow"), &account)
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::Unconfirmed(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_refresh_uses_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/oauth2/token"))
            .and(header_exists("authorization"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=x-refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token_type": "bearer",
                "access_token": "x-new",
                "refresh_token": "x-refresh-2",
                "expires_in": 7200,
                "scope": "tweet.write users.read offline.access"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let publisher = publisher(&server.uri());
        let mut account = Account::new("acc-1", "twitter", "user-1", "x-old")
            .with_refresh_token("x-refresh")
            .with_token_expiry(0);

        publisher.refresh_token(&mut account).await.unwrap();

        assert_eq!(account.access_token(), "x-new");
        assert_eq!(account.refresh_token(), Some("x-refresh-2"));
    }
}
