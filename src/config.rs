use std::time::Duration;

use serde::Deserialize;

use crate::dispatcher::DispatcherConfig;
use crate::error::ConfigError;
use crate::scheduler::SchedulerConfig;
use crate::subscriber::{validate, Subscriber};

/// Complete dispatcher process configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub dispatch: DispatchSection,
    #[serde(default)]
    pub delivery: DeliverySection,
    #[serde(default)]
    pub ingest: IngestSection,
    #[serde(default)]
    pub subscribers: Vec<Subscriber>,
}

/// Tick cadence and duplicate suppression.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchSection {
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    #[serde(default = "default_shutdown_grace_seconds")]
    pub shutdown_grace_seconds: u64,
    /// 0 disables the sent-event memo.
    #[serde(default)]
    pub sent_memo_ttl_seconds: u64,
    #[serde(default = "default_sent_memo_capacity")]
    pub sent_memo_capacity: usize,
    /// 0 disables periodic subscriber reloads.
    #[serde(default)]
    pub reload_interval_seconds: u64,
}

fn default_interval_seconds() -> u64 {
    5
}

fn default_shutdown_grace_seconds() -> u64 {
    10
}

fn default_sent_memo_capacity() -> usize {
    100_000
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            shutdown_grace_seconds: default_shutdown_grace_seconds(),
            sent_memo_ttl_seconds: 0,
            sent_memo_capacity: default_sent_memo_capacity(),
            reload_interval_seconds: 0,
        }
    }
}

/// HTTP delivery settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliverySection {
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
    #[serde(default = "default_retry_jitter_ms")]
    pub retry_jitter_ms: u64,
}

fn default_timeout_seconds() -> u64 {
    15
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_ms() -> u64 {
    500
}

fn default_retry_max_ms() -> u64 {
    5_000
}

fn default_retry_jitter_ms() -> u64 {
    100
}

impl Default for DeliverySection {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
            retry_max_ms: default_retry_max_ms(),
            retry_jitter_ms: default_retry_jitter_ms(),
        }
    }
}

/// Where changes come from.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestSection {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Redis pub/sub source, used when the `redis` feature is enabled.
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default = "default_redis_channel")]
    pub redis_channel: String,
}

fn default_channel_capacity() -> usize {
    10_000
}

fn default_redis_channel() -> String {
    "webhooks".to_string()
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            redis_url: None,
            redis_channel: default_redis_channel(),
        }
    }
}

impl WebhookConfig {
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: WebhookConfig = toml::from_str(contents)?;
        validate(&config.subscribers)?;
        Ok(config)
    }

    /// Override selected settings from `WEBHOOK_*` environment variables.
    pub fn apply_env_overrides(&mut self) {
        if let Some(n) = env_parse::<u64>("WEBHOOK_INTERVAL_SECONDS") {
            self.dispatch.interval_seconds = n;
        }
        if let Some(n) = env_parse::<u32>("WEBHOOK_MAX_RETRIES") {
            self.delivery.max_retries = n;
        }
        if let Some(n) = env_parse::<u64>("WEBHOOK_TIMEOUT_SECONDS") {
            self.delivery.timeout_seconds = n;
        }
        if let Ok(url) = std::env::var("WEBHOOK_REDIS_URL") {
            if !url.is_empty() {
                self.ingest.redis_url = Some(url);
            }
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval: Duration::from_secs(self.dispatch.interval_seconds.max(1)),
            shutdown_grace: Duration::from_secs(self.dispatch.shutdown_grace_seconds),
            sent_memo_ttl: Duration::from_secs(self.dispatch.sent_memo_ttl_seconds),
            sent_memo_capacity: self.dispatch.sent_memo_capacity,
        }
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            timeout: Duration::from_secs(self.delivery.timeout_seconds.max(1)),
            max_retries: self.delivery.max_retries,
            retry_base_ms: self.delivery.retry_base_ms,
            retry_max_ms: self.delivery.retry_max_ms,
            retry_jitter_ms: self.delivery.retry_jitter_ms,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.parse().ok()
}

/// Load configuration from a TOML file.
pub fn load_config(path: &str) -> Result<WebhookConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_string(),
        source,
    })?;
    WebhookConfig::parse(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;
    use crate::types::EntityKind;

    #[test]
    fn test_default_config() {
        let config = WebhookConfig::default();
        assert_eq!(config.dispatch.interval_seconds, 5);
        assert_eq!(config.delivery.timeout_seconds, 15);
        assert_eq!(config.delivery.max_retries, 3);
        assert_eq!(config.ingest.redis_channel, "webhooks");
        assert!(config.subscribers.is_empty());
        assert!(config.scheduler_config().sent_memo_ttl.is_zero());
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [dispatch]
            interval_seconds = 2
            sent_memo_ttl_seconds = 300

            [delivery]
            max_retries = 5
            retry_base_ms = 50

            [[subscribers]]
            name = "discord-relay"
            url = "http://relay:8080/hook"
            types = ["pokemon", "raid", "egg"]
            geofences = [[[0.0, 0.0], [0.0, 2.0], [2.0, 2.0], [2.0, 0.0]]]
            pokemon_ids = ["150"]
            egg_levels = [1, 2]

            [[subscribers]]
            name = "archive"
            url = "http://archive/ingest"
            enabled = false
            types = ["account"]
        "#;

        let config = WebhookConfig::parse(toml).unwrap();
        assert_eq!(config.dispatch.interval_seconds, 2);
        assert_eq!(config.scheduler_config().sent_memo_ttl, Duration::from_secs(300));
        assert_eq!(config.dispatcher_config().max_retries, 5);
        assert_eq!(config.dispatcher_config().retry_max_ms, 5_000);
        assert_eq!(config.subscribers.len(), 2);

        let relay = &config.subscribers[0];
        assert!(relay.consumes(EntityKind::Egg));
        assert_eq!(relay.geofences[0].points().len(), 4);
        assert!(relay.egg_levels.contains(&2));
        assert!(!config.subscribers[1].enabled);
    }

    #[test]
    fn test_duplicate_subscribers_rejected() {
        let toml = r#"
            [[subscribers]]
            name = "a"
            url = "http://a"

            [[subscribers]]
            name = "a"
            url = "http://b"
        "#;
        let err = WebhookConfig::parse(toml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(RegistryError::DuplicateName(_))));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let toml = r#"
            [[subscribers]]
            name = "a"
            url = "http://a"
            types = ["dragon"]
        "#;
        assert!(matches!(WebhookConfig::parse(toml), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_config("/nonexistent/webhooks.toml"),
            Err(ConfigError::Read { .. })
        ));
    }
}
