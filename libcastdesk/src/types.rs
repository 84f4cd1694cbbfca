//! Core types for Castdesk

use std::collections::HashMap;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Content to publish. The dispatcher only ever borrows it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    #[serde(default = "new_id")]
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub link_url: Option<String>,
    #[serde(default)]
    pub media: Vec<MediaRef>,
    /// Platform identifiers the post targets (informational; routing is per account)
    #[serde(default)]
    pub platforms: Vec<String>,
    #[serde(default = "now")]
    pub created_at: i64,
}

impl Post {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            content: content.into(),
            title: None,
            link_url: None,
            media: Vec::new(),
            platforms: Vec::new(),
            created_at: now(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_link(mut self, url: impl Into<String>) -> Self {
        self.link_url = Some(url.into());
        self
    }

    pub fn with_media(mut self, media: MediaRef) -> Self {
        self.media.push(media);
        self
    }

    pub fn with_platforms<I, S>(mut self, platforms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.platforms = platforms.into_iter().map(Into::into).collect();
        self
    }

    /// First attached video, if any
    pub fn first_video(&self) -> Option<&MediaRef> {
        self.media.iter().find(|m| m.kind == MediaKind::Video)
    }

    /// First attached image, if any
    pub fn first_image(&self) -> Option<&MediaRef> {
        self.media.iter().find(|m| m.kind == MediaKind::Image)
    }
}

/// Reference to media hosted elsewhere (platforms fetch it by URL)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaRef {
    pub url: String,
    pub kind: MediaKind,
}

impl MediaRef {
    pub fn image(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: MediaKind::Image,
        }
    }

    pub fn video(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: MediaKind::Video,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// One connected destination for a dispatch
///
/// Tokens are held as [`SecretString`] so they never show up in `Debug`
/// output or logs. Only the publisher that owns the account's platform
/// reads them.
#[derive(Debug)]
pub struct Account {
    pub id: String,
    pub platform: String,
    /// Remote author id (page id, person id, user id)
    pub platform_user_id: String,
    pub username: Option<String>,
    pub active: bool,
    /// Unix timestamp after which the access token is no longer valid
    pub token_expires_at: Option<i64>,
    /// Unix timestamp when the platform's rate limit window resets
    pub rate_limit_reset_at: Option<i64>,
    /// Platform-specific extras (e.g. `author_urn` for LinkedIn)
    pub platform_data: HashMap<String, String>,
    access_token: SecretString,
    refresh_token: Option<SecretString>,
}

impl Account {
    pub fn new(
        id: impl Into<String>,
        platform: impl Into<String>,
        platform_user_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            platform: platform.into(),
            platform_user_id: platform_user_id.into(),
            username: None,
            active: true,
            token_expires_at: None,
            rate_limit_reset_at: None,
            platform_data: HashMap::new(),
            access_token: SecretString::from(access_token.into()),
            refresh_token: None,
        }
    }

    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(SecretString::from(token.into()));
        self
    }

    pub fn with_token_expiry(mut self, expires_at: i64) -> Self {
        self.token_expires_at = Some(expires_at);
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_platform_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.platform_data.insert(key.into(), value.into());
        self
    }

    pub fn with_rate_limit_reset(mut self, reset_at: i64) -> Self {
        self.rate_limit_reset_at = Some(reset_at);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn access_token(&self) -> &str {
        self.access_token.expose_secret()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_ref().map(|t| t.expose_secret())
    }

    /// Whether the token is expired at `at` (accounts without an expiry never expire)
    pub fn is_token_expired(&self, at: i64) -> bool {
        matches!(self.token_expires_at, Some(expires_at) if expires_at <= at)
    }

    pub fn is_rate_limited(&self, at: i64) -> bool {
        matches!(self.rate_limit_reset_at, Some(reset_at) if reset_at > at)
    }

    /// Install credentials obtained from a token endpoint
    ///
    /// The refresh token is only replaced when the platform rotated it.
    pub fn install_tokens(
        &mut self,
        access_token: String,
        refresh_token: Option<String>,
        expires_at: Option<i64>,
    ) {
        self.access_token = SecretString::from(access_token);
        if let Some(refresh) = refresh_token {
            self.refresh_token = Some(SecretString::from(refresh));
        }
        self.token_expires_at = expires_at;
    }
}

impl Clone for Account {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            platform: self.platform.clone(),
            platform_user_id: self.platform_user_id.clone(),
            username: self.username.clone(),
            active: self.active,
            token_expires_at: self.token_expires_at,
            rate_limit_reset_at: self.rate_limit_reset_at,
            platform_data: self.platform_data.clone(),
            access_token: SecretString::from(self.access_token().to_owned()),
            refresh_token: self
                .refresh_token()
                .map(|t| SecretString::from(t.to_owned())),
        }
    }
}

/// Serialized form of an [`Account`] as handed over by a credential store
#[derive(Debug, Clone, Deserialize)]
pub struct AccountRecord {
    pub id: String,
    pub platform: String,
    #[serde(default)]
    pub platform_user_id: String,
    #[serde(default)]
    pub username: Option<String>,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub token_expires_at: Option<i64>,
    #[serde(default)]
    pub rate_limit_reset_at: Option<i64>,
    #[serde(default)]
    pub platform_data: HashMap<String, String>,
}

impl From<AccountRecord> for Account {
    fn from(record: AccountRecord) -> Self {
        let mut account = Account::new(
            record.id,
            record.platform,
            record.platform_user_id,
            record.access_token,
        );
        account.username = record.username;
        account.active = record.active;
        account.token_expires_at = record.token_expires_at;
        account.rate_limit_reset_at = record.rate_limit_reset_at;
        account.platform_data = record.platform_data;
        account.refresh_token = record.refresh_token.map(SecretString::from);
        account
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn default_active() -> bool {
    true
}
