//! Meta Graph API publisher (Facebook pages and Instagram business accounts)
//!
//! Facebook posts go to `/{page_id}/feed`. Instagram publishing is two-step:
//! a media container is created under `/{ig_user_id}/media` and then
//! published through `/{ig_user_id}/media_publish`.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::config::MetaConfig;
use crate::error::{PlatformError, PlatformResult};
use crate::platforms::http::{
    apply_token_response, error_from_response, map_transport_error, normalize_base_url,
};
use crate::platforms::{token_is_well_formed, Publisher, RemotePost};
use crate::types::{Account, MediaKind, Post};

const PLATFORM_LABEL: &str = "Meta";
const INSTAGRAM_CAPTION_LIMIT: usize = 2200;

#[derive(Debug, Deserialize)]
struct GraphId {
    id: String,
}

pub struct MetaPublisher {
    client: Client,
    base_url: String,
    client_id: String,
    client_secret: SecretString,
}

impl MetaPublisher {
    pub fn new(config: &MetaConfig, client_secret: SecretString, client: Client) -> Self {
        let base_url = format!(
            "{}/{}",
            normalize_base_url(&config.base_url),
            config.graph_version.trim_matches('/')
        );
        Self {
            client,
            base_url,
            client_id: config.client_id.clone(),
            client_secret,
        }
    }

    async fn post_form(
        &self,
        path: &str,
        params: &[(&str, &str)],
        context: &str,
    ) -> PlatformResult<GraphId> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .form(params)
            .send()
            .await
            .map_err(|e| map_transport_error(e, PLATFORM_LABEL, context))?;

        if !response.status().is_success() {
            return Err(error_from_response(response, PLATFORM_LABEL, context).await);
        }

        response
            .json::<GraphId>()
            .await
            .map_err(|e| map_transport_error(e, PLATFORM_LABEL, context))
    }

    async fn publish_facebook(&self, post: &Post, account: &Account) -> PlatformResult<RemotePost> {
        let mut params = vec![
            ("message", post.content.as_str()),
            ("access_token", account.access_token()),
        ];
        if let Some(link) = post.link_url.as_deref() {
            params.push(("link", link));
        }

        let path = format!("{}/feed", account.platform_user_id);
        let created = self.post_form(&path, &params, "publish page post").await?;

        tracing::debug!(account = %account.id, post_id = %created.id, "published Facebook page post");
        let url = format!("https://www.facebook.com/{}", created.id);
        Ok(RemotePost::new(created.id).with_url(url))
    }

    async fn publish_instagram(&self, post: &Post, account: &Account) -> PlatformResult<RemotePost> {
        let media = post
            .first_video()
            .or_else(|| post.first_image())
            .ok_or_else(|| {
                PlatformError::Rejected("Instagram posts require an image or video".to_string())
            })?;

        let caption = instagram_caption(post);
        let mut params = vec![
            ("caption", caption.as_str()),
            ("access_token", account.access_token()),
        ];
        match media.kind {
            MediaKind::Video => {
                params.push(("media_type", "REELS"));
                params.push(("video_url", media.url.as_str()));
            }
            MediaKind::Image => params.push(("image_url", media.url.as_str())),
        }

        let ig_user = &account.platform_user_id;
        let container = self
            .post_form(&format!("{}/media", ig_user), &params, "create media container")
            .await?;

        tracing::debug!(account = %account.id, container = %container.id, "created Instagram media container");

        let published = self
            .post_form(
                &format!("{}/media_publish", ig_user),
                &[
                    ("creation_id", container.id.as_str()),
                    ("access_token", account.access_token()),
                ],
                "publish media container",
            )
            .await?;

        Ok(RemotePost::new(published.id))
    }
}

/// Caption text with the link appended, since Instagram captions carry no link field
fn instagram_caption(post: &Post) -> String {
    match post.link_url.as_deref() {
        Some(link) if !post.content.contains(link) => format!("{}\n\n{}", post.content, link),
        _ => post.content.clone(),
    }
}

#[async_trait]
impl Publisher for MetaPublisher {
    fn name(&self) -> &str {
        "meta"
    }

    fn platforms(&self) -> Vec<String> {
        vec!["facebook".to_string(), "instagram".to_string()]
    }

    fn validate_account(&self, account: &Account) -> bool {
        token_is_well_formed(account.access_token()) && !account.platform_user_id.trim().is_empty()
    }

    async fn refresh_token(&self, account: &mut Account) -> PlatformResult<()> {
        let current = account.refresh_token().ok_or_else(|| {
            PlatformError::Authentication(format!(
                "Account {} has no long-lived token to exchange",
                account.id
            ))
        })?;

        let url = format!("{}/oauth/access_token", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("grant_type", "fb_exchange_token"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret()),
                ("fb_exchange_token", current),
            ])
            .send()
            .await
            .map_err(|e| map_transport_error(e, PLATFORM_LABEL, "refresh token"))?;

        apply_token_response(response, account, PLATFORM_LABEL).await?;
        tracing::info!(account = %account.id, "exchanged Meta access token");
        Ok(())
    }

    async fn publish_to_account(&self, post: &Post, account: &Account) -> PlatformResult<RemotePost> {
        self.validate_content(post)?;

        match account.platform.as_str() {
            "facebook" => self.publish_facebook(post, account).await,
            "instagram" => {
                if post.content.chars().count() > INSTAGRAM_CAPTION_LIMIT {
                    return Err(PlatformError::Rejected(format!(
                        "Instagram captions are limited to {} characters",
                        INSTAGRAM_CAPTION_LIMIT
                    )));
                }
                self.publish_instagram(post, account).await
            }
            other => Err(PlatformError::NotSupported(format!(
                "meta does not publish to {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;
    use crate::platforms::http::build_client;
    use crate::types::MediaRef;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn publisher(base_url: &str) -> MetaPublisher {
        let config = MetaConfig {
            enabled: true,
            client_id: "app-id".to_string(),
            client_secret: None,
            client_secret_file: None,
            graph_version: "v18.0".to_string(),
            base_url: base_url.to_string(),
        };
        let client = build_client(&HttpConfig::default()).unwrap();
        MetaPublisher::new(&config, SecretString::from("app-secret".to_string()), client)
    }

    #[test]
    fn test_claims_facebook_and_instagram() {
        let publisher = publisher("https://graph.example.com/");
        assert!(publisher.supports_platform("facebook"));
        assert!(publisher.supports_platform("instagram"));
        assert!(!publisher.supports_platform("threads"));
        assert_eq!(publisher.base_url, "https://graph.example.com/v18.0");
    }

    #[test]
    fn test_validate_account_requires_page_id() {
        let publisher = publisher("https://graph.example.com");
        assert!(publisher.validate_account(&Account::new("a", "facebook", "123", "EAAB")));
        assert!(!publisher.validate_account(&Account::new("a", "facebook", " ", "EAAB")));
        assert!(!publisher.validate_account(&Account::new("a", "facebook", "123", "")));
    }

    #[test]
    fn test_instagram_caption_appends_link_once() {
        let post = Post::new("New menu").with_link("https://example.com/menu");
        assert_eq!(instagram_caption(&post), "New menu\n\nhttps://example.com/menu");

        let post = Post::new("See https://example.com/menu").with_link("https://example.com/menu");
        assert_eq!(instagram_caption(&post), "See https://example.com/menu");
    }

    #[tokio::test]
    async fn test_publish_facebook_page_post() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v18.0/page-1/feed"))
            .and(body_string_contains("message=Grand+opening"))
            .and(body_string_contains("link=https%3A%2F%2Fexample.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "page-1_987"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let publisher = publisher(&server.uri());
        let post = Post::new("Grand opening").with_link("https://example.com");
        let account = Account::new("acc-1", "facebook", "page-1", "page-token");

        let remote = publisher.publish_to_account(&post, &account).await.unwrap();
        assert_eq!(remote.id, "page-1_987");
        assert_eq!(remote.url.as_deref(), Some("https://www.facebook.com/page-1_987"));
    }

    #[tokio::test]
    async fn test_publish_instagram_two_step() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v18.0/ig-1/media"))
            .and(body_string_contains("image_url=https%3A%2F%2Fcdn.example.com%2Fa.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "container-1"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v18.0/ig-1/media_publish"))
            .and(body_string_contains("creation_id=container-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "ig-media-42"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let publisher = publisher(&server.uri());
        let post = Post::new("Fresh batch").with_media(MediaRef::image("https://cdn.example.com/a.jpg"));
        let account = Account::new("acc-2", "instagram", "ig-1", "ig-token");

        let remote = publisher.publish_to_account(&post, &account).await.unwrap();
        assert_eq!(remote.id, "ig-media-42");
    }

    #[tokio::test]
    async fn test_publish_instagram_without_media_is_rejected() {
        let publisher = publisher("http://127.0.0.1:9");
        let account = Account::new("acc-2", "instagram", "ig-1", "ig-token");

        let err = publisher
            .publish_to_account(&Post::new("text only"), &account)
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_graph_error_message_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v18.0/page-1/feed"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"message": "(#200) Requires pages_manage_posts permission", "code": 200}
            })))
            .mount(&server)
            .await;

        let publisher = publisher(&server.uri());
        let account = Account::new("acc-1", "facebook", "page-1", "page-token");

        let err = publisher
            .publish_to_account(&Post::new("hello"), &account)
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::Rejected(_)));
        assert!(err.to_string().contains("pages_manage_posts"));
    }

    #[tokio::test]
    async fn test_refresh_exchanges_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v18.0/oauth/access_token"))
            .and(query_param("grant_type", "fb_exchange_token"))
            .and(query_param("client_id", "app-id"))
            .and(query_param("fb_exchange_token", "long-lived"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh-token",
                "token_type": "bearer",
                "expires_in": 5183944
            })))
            .expect(1)
            .mount(&server)
            .await;

        let publisher = publisher(&server.uri());
        let mut account = Account::new("acc-1", "facebook", "page-1", "stale")
            .with_refresh_token("long-lived")
            .with_token_expiry(0);

        publisher.refresh_token(&mut account).await.unwrap();

        assert_eq!(account.access_token(), "fresh-token");
        assert!(!account.is_token_expired(chrono::Utc::now().timestamp()));
    }

    #[tokio::test]
    async fn test_refresh_without_credential_fails() {
        let publisher = publisher("http://127.0.0.1:9");
        let mut account = Account::new("acc-1", "facebook", "page-1", "stale");

        let err = publisher.refresh_token(&mut account).await.unwrap_err();
        assert!(matches!(err, PlatformError::Authentication(_)));
    }
}
