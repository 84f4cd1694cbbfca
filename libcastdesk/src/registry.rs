//! Publisher registry
//!
//! Maps platform identifiers to the publisher that owns them. Publishers are
//! polymorphic, so the registry never keeps its own platform table: it asks
//! each registered publisher whether it supports an identifier. An optional
//! fallback publisher answers for identifiers nobody claims.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{resolve_secret, resolve_secret_field, Config};
use crate::error::{RegistryError, Result};
use crate::platforms::ayrshare::AyrsharePublisher;
use crate::platforms::http::build_client;
use crate::platforms::linkedin::LinkedInPublisher;
use crate::platforms::manual::ManualPublisher;
use crate::platforms::meta::MetaPublisher;
use crate::platforms::webhook::WebhookPublisher;
use crate::platforms::x::XPublisher;
use crate::platforms::Publisher;

#[derive(Default)]
pub struct PublisherRegistry {
    publishers: Vec<Arc<dyn Publisher>>,
    fallback: Option<Arc<dyn Publisher>>,
}

impl PublisherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a publisher
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::DuplicatePlatform` if any platform the new
    /// publisher claims is already supported by a registered publisher. The
    /// new publisher is not added in that case.
    pub fn register<P>(&mut self, publisher: P) -> std::result::Result<(), RegistryError>
    where
        P: Publisher + 'static,
    {
        self.register_shared(Arc::new(publisher))
    }

    /// Register a publisher that is already shared
    pub fn register_shared(
        &mut self,
        publisher: Arc<dyn Publisher>,
    ) -> std::result::Result<(), RegistryError> {
        let claimed = publisher.platforms();

        for platform in &claimed {
            if let Some(existing) = self.publishers.iter().find(|p| p.supports_platform(platform)) {
                return Err(RegistryError::DuplicatePlatform {
                    platform: platform.clone(),
                    existing: existing.name().to_string(),
                    rejected: publisher.name().to_string(),
                });
            }
        }

        debug!(publisher = publisher.name(), platforms = ?claimed, "registered publisher");
        self.publishers.push(publisher);
        Ok(())
    }

    /// Publisher used for platforms no registered publisher claims
    pub fn set_fallback<P>(&mut self, publisher: P)
    where
        P: Publisher + 'static,
    {
        debug!(publisher = publisher.name(), "registered fallback publisher");
        self.fallback = Some(Arc::new(publisher));
    }

    pub fn fallback_name(&self) -> Option<&str> {
        self.fallback.as_ref().map(|p| p.name())
    }

    /// Find the publisher for a platform identifier
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::UnsupportedPlatform` if no publisher claims it
    /// and no fallback is set.
    pub fn resolve(&self, platform: &str) -> std::result::Result<Arc<dyn Publisher>, RegistryError> {
        self.publishers
            .iter()
            .find(|p| p.supports_platform(platform))
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| RegistryError::UnsupportedPlatform(platform.to_string()))
    }

    /// All claimed platform identifiers, sorted
    pub fn platforms(&self) -> Vec<String> {
        let mut platforms: Vec<String> = self
            .publishers
            .iter()
            .flat_map(|p| p.platforms())
            .collect();
        platforms.sort();
        platforms
    }

    /// Publisher names in registration order
    pub fn publisher_names(&self) -> Vec<&str> {
        self.publishers.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.publishers.len()
    }

    /// True when nothing claims a platform and there is no fallback
    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty() && self.fallback.is_none()
    }

    /// Build a registry with every publisher enabled in the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a client secret cannot be resolved, the HTTP
    /// client cannot be built, or two enabled publishers claim the same
    /// platform (e.g. a webhook listing `facebook` while Meta is enabled).
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut registry = Self::new();
        let client = build_client(&config.http)?;

        if let Some(meta) = config.meta.as_ref().filter(|c| c.enabled) {
            let secret = resolve_secret("meta", &meta.client_secret, &meta.client_secret_file)?;
            registry.register(MetaPublisher::new(meta, secret, client.clone()))?;
        }

        if let Some(linkedin) = config.linkedin.as_ref().filter(|c| c.enabled) {
            let secret = resolve_secret(
                "linkedin",
                &linkedin.client_secret,
                &linkedin.client_secret_file,
            )?;
            registry.register(LinkedInPublisher::new(linkedin, secret, client.clone()))?;
        }

        if let Some(x) = config.x.as_ref().filter(|c| c.enabled) {
            let secret = resolve_secret("x", &x.client_secret, &x.client_secret_file)?;
            registry.register(XPublisher::new(x, secret, client.clone()))?;
        }

        if let Some(webhook) = config.webhook.as_ref().filter(|c| c.enabled) {
            registry.register(WebhookPublisher::new(webhook, client.clone()))?;
        }

        if let Some(ayrshare) = config.ayrshare.as_ref().filter(|c| c.enabled) {
            let api_key =
                resolve_secret_field("ayrshare.api_key", &ayrshare.api_key, &ayrshare.api_key_file)?;
            registry.register(AyrsharePublisher::new(ayrshare, api_key, client.clone()))?;
        }

        if config.manual.enabled {
            registry.set_fallback(ManualPublisher::new());
        }

        info!(
            publishers = ?registry.publisher_names(),
            platforms = ?registry.platforms(),
            fallback = ?registry.fallback_name(),
            "publisher registry ready"
        );

        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WebhookConfig;
    use crate::error::CastdeskError;
    use crate::platforms::mock::MockPublisher;

    #[test]
    fn test_register_and_resolve() {
        let mut registry = PublisherRegistry::new();
        registry
            .register(MockPublisher::success("meta", &["facebook", "instagram"]))
            .unwrap();
        registry
            .register(MockPublisher::success("linkedin", &["linkedin"]))
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.resolve("instagram").unwrap().name(), "meta");
        assert_eq!(registry.resolve("linkedin").unwrap().name(), "linkedin");
        assert_eq!(
            registry.platforms(),
            vec!["facebook".to_string(), "instagram".to_string(), "linkedin".to_string()]
        );
    }

    #[test]
    fn test_duplicate_platform_rejected_and_not_added() {
        let mut registry = PublisherRegistry::new();
        registry.register(MockPublisher::success("first", &["x"])).unwrap();

        let err = registry
            .register(MockPublisher::success("second", &["y", "x"]))
            .unwrap_err();

        assert_eq!(
            err,
            RegistryError::DuplicatePlatform {
                platform: "x".to_string(),
                existing: "first".to_string(),
                rejected: "second".to_string(),
            }
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.publisher_names(), vec!["first"]);
        // "y" must not have leaked in through the rejected publisher
        assert!(registry.resolve("y").is_err());
        assert_eq!(registry.resolve("x").unwrap().name(), "first");
    }

    #[test]
    fn test_resolve_unregistered_platform() {
        let registry = PublisherRegistry::new();
        assert!(registry.is_empty());

        let err = registry.resolve("mystery").err().unwrap();
        assert_eq!(err, RegistryError::UnsupportedPlatform("mystery".to_string()));
    }

    #[test]
    fn test_resolution_is_exact_match() {
        let mut registry = PublisherRegistry::new();
        registry.register(MockPublisher::success("meta", &["facebook"])).unwrap();

        assert!(registry.resolve("Facebook").is_err());
        assert!(registry.resolve("facebook ").is_err());
    }

    #[test]
    fn test_from_empty_config() {
        let registry = PublisherRegistry::from_config(&Config::default()).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_from_config_registers_enabled_publishers() {
        let config = Config::from_toml(
            r#"
[meta]
enabled = true
client_id = "app"
client_secret = "secret"

[x]
enabled = false
client_id = "client"

[webhook]
enabled = true
url = "https://hooks.example.com/publish"
platforms = ["tiktok", "pinterest"]
"#,
        )
        .unwrap();

        let registry = PublisherRegistry::from_config(&config).unwrap();

        assert_eq!(registry.publisher_names(), vec!["meta", "webhook"]);
        assert_eq!(registry.resolve("tiktok").unwrap().name(), "webhook");
        assert_eq!(registry.resolve("instagram").unwrap().name(), "meta");
        assert!(registry.resolve("twitter").is_err());
    }

    #[test]
    fn test_fallback_answers_unclaimed_platforms() {
        let mut registry = PublisherRegistry::new();
        registry.register(MockPublisher::success("meta", &["facebook"])).unwrap();
        registry.set_fallback(ManualPublisher::new());

        assert_eq!(registry.resolve("facebook").unwrap().name(), "meta");
        assert_eq!(registry.resolve("mastodon").unwrap().name(), "manual");
        assert_eq!(registry.publisher_names(), vec!["meta"]);
        assert_eq!(registry.fallback_name(), Some("manual"));

        // The fallback claims nothing, so later registrations still succeed
        registry.register(MockPublisher::success("x", &["twitter"])).unwrap();
        assert_eq!(registry.resolve("twitter").unwrap().name(), "x");
    }

    #[test]
    fn test_from_config_ayrshare_and_manual() {
        let config = Config::from_toml(
            r#"
[linkedin]
enabled = true
client_id = "li"
client_secret = "secret"

[ayrshare]
enabled = true
api_key = "key"
platforms = ["youtube", "threads"]

[manual]
enabled = true
"#,
        )
        .unwrap();

        let registry = PublisherRegistry::from_config(&config).unwrap();

        assert_eq!(registry.publisher_names(), vec!["linkedin", "ayrshare"]);
        assert_eq!(registry.resolve("youtube").unwrap().name(), "ayrshare");
        assert_eq!(registry.resolve("linkedin").unwrap().name(), "linkedin");
        assert_eq!(registry.resolve("reddit").unwrap().name(), "manual");
    }

    #[test]
    fn test_from_config_ayrshare_defaults_overlap_direct_publishers() {
        let config = Config::from_toml(
            r#"
[x]
enabled = true
client_id = "client"
client_secret = "secret"

[ayrshare]
enabled = true
api_key = "key"
"#,
        )
        .unwrap();

        match PublisherRegistry::from_config(&config) {
            Err(CastdeskError::Registry(RegistryError::DuplicatePlatform { existing, rejected, .. })) => {
                assert_eq!(existing, "x");
                assert_eq!(rejected, "ayrshare");
            }
            Err(other) => panic!("Expected DuplicatePlatform, got {}", other),
            Ok(_) => panic!("Expected DuplicatePlatform, registry was built"),
        }
    }

    #[test]
    fn test_from_config_overlapping_webhook_is_duplicate() {
        let mut config = Config::from_toml(
            r#"
[meta]
enabled = true
client_id = "app"
client_secret = "secret"
"#,
        )
        .unwrap();
        config.webhook = Some(WebhookConfig {
            enabled: true,
            url: "https://hooks.example.com".to_string(),
            platforms: vec!["facebook".to_string()],
            include_access_token: false,
        });

        match PublisherRegistry::from_config(&config) {
            Err(CastdeskError::Registry(RegistryError::DuplicatePlatform { platform, .. })) => {
                assert_eq!(platform, "facebook");
            }
            Err(other) => panic!("Expected DuplicatePlatform, got {}", other),
            Ok(_) => panic!("Expected DuplicatePlatform, registry was built"),
        }
    }
}
