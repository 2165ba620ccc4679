use std::{fmt::Display, fs, path::Path};

use serde::Deserialize;

use crate::IngressPolicy;

/// Largest accepted `inbound.max_in_flight`.
pub const MAX_IN_FLIGHT: u32 = 65_536;

/// Top-level configuration for the Mailgate validator.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub inbound: InboundConfig,

    #[serde(default)]
    pub publisher: PublisherConfig,

    /// Validators run over every record, in order.
    #[serde(default)]
    pub validators: Vec<ValidatorConfig>,

    #[serde(default)]
    pub ingress: IngressConfig,
}

/// Log output configuration.
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Queue the validator consumes from.
#[derive(Debug, Deserialize)]
pub struct InboundConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,

    #[serde(default = "default_inbound_queue")]
    pub queue: String,

    /// Maximum number of records dispatched concurrently.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Seconds each blocking pop waits before checking for shutdown.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout: f64,
}

impl Default for InboundConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            queue: default_inbound_queue(),
            max_in_flight: default_max_in_flight(),
            poll_timeout: default_poll_timeout(),
        }
    }
}

/// Destination that validated records are forwarded to.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum PublisherConfig {
    /// Redis list publisher.
    #[serde(rename = "redis")]
    Redis {
        #[serde(default = "default_redis_url")]
        url: String,
        #[serde(default = "default_topic")]
        topic: String,
        #[serde(default = "default_ordering_key")]
        ordering_key: String,
    },

    /// Spool directory publisher, one file per record.
    #[serde(rename = "spool")]
    Spool {
        #[serde(default = "default_spool_path")]
        path: String,
        #[serde(default = "default_ordering_key")]
        ordering_key: String,
    },
}

impl Default for PublisherConfig {
    fn default() -> Self {
        PublisherConfig::Redis {
            url: default_redis_url(),
            topic: default_topic(),
            ordering_key: default_ordering_key(),
        }
    }
}

impl PublisherConfig {
    /// Returns the ordering key attached to every forwarded record.
    pub fn ordering_key(&self) -> &str {
        match self {
            PublisherConfig::Redis { ordering_key, .. }
            | PublisherConfig::Spool { ordering_key, .. } => ordering_key,
        }
    }
}

/// Configuration for one validator of the pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ValidatorConfig {
    /// DKIM signature with full header coverage.
    #[serde(rename = "dkim")]
    Dkim {
        #[serde(default)]
        resolver: DnsResolver,
    },
}

/// DNS resolver used for DKIM public key lookups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DnsResolver {
    /// System resolver configuration, falling back to Cloudflare
    /// DNS-over-TLS if it is unavailable.
    #[default]
    System,
    /// Cloudflare plain DNS.
    Cloudflare,
    /// Cloudflare DNS-over-TLS.
    CloudflareTls,
}

impl Display for DnsResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DnsResolver::System => write!(f, "system"),
            DnsResolver::Cloudflare => write!(f, "cloudflare"),
            DnsResolver::CloudflareTls => write!(f, "cloudflare-tls"),
        }
    }
}

/// Envelope filters applied when records are produced from local files.
#[derive(Debug, Deserialize)]
pub struct IngressConfig {
    /// Pattern the envelope sender must match, any sender when absent.
    pub senders: Option<String>,

    /// Pattern at least one recipient must match, any recipient when absent.
    pub recipients: Option<String>,

    #[serde(default = "default_ordering_key")]
    pub ordering_key: String,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            senders: None,
            recipients: None,
            ordering_key: default_ordering_key(),
        }
    }
}

impl Config {
    /// Checks the values serde cannot (empty names, bounds, patterns).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.inbound.queue.trim().is_empty() {
            return Err(ConfigError::Invalid("inbound.queue must not be empty".into()));
        }
        if self.inbound.max_in_flight == 0 {
            return Err(ConfigError::Invalid(
                "inbound.max_in_flight must be at least 1".into(),
            ));
        }
        if self.inbound.max_in_flight > MAX_IN_FLIGHT as usize {
            return Err(ConfigError::Invalid(format!(
                "inbound.max_in_flight must be at most {MAX_IN_FLIGHT}"
            )));
        }
        if !(self.inbound.poll_timeout > 0.0) {
            return Err(ConfigError::Invalid(
                "inbound.poll_timeout must be positive".into(),
            ));
        }

        match &self.publisher {
            PublisherConfig::Redis { topic, .. } if topic.trim().is_empty() => {
                return Err(ConfigError::Invalid("publisher.topic must not be empty".into()));
            }
            PublisherConfig::Spool { path, .. } if path.trim().is_empty() => {
                return Err(ConfigError::Invalid("publisher.path must not be empty".into()));
            }
            _ => {}
        }
        if self.publisher.ordering_key().trim().is_empty() {
            return Err(ConfigError::Invalid(
                "publisher.ordering_key must not be empty".into(),
            ));
        }

        if self.ingress.ordering_key.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "ingress.ordering_key must not be empty".into(),
            ));
        }
        IngressPolicy::from_config(&self.ingress)?;

        Ok(())
    }
}

/// Loads configuration from a TOML file and validates it.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config: Config = toml::from_str(&content).map_err(ConfigError::Parse)?;
    config.validate()?;
    Ok(config)
}

/// Errors that can occur while loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// An I/O error occurred reading the file.
    Io(std::io::Error),
    /// A parse error occurred deserializing TOML.
    Parse(toml::de::Error),
    /// The configuration parsed but holds an unusable value.
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Config I/O error: {e}"),
            ConfigError::Parse(e) => write!(f, "Config parse error: {e}"),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_inbound_queue() -> String {
    "email".to_string()
}

fn default_max_in_flight() -> usize {
    16
}

fn default_poll_timeout() -> f64 {
    1.0
}

fn default_topic() -> String {
    "email-validated".to_string()
}

fn default_ordering_key() -> String {
    "email".to_string()
}

fn default_spool_path() -> String {
    "spool".to_string()
}
