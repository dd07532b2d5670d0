//! Client configuration and URL construction.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::Error;

pub(crate) const DEFAULT_HOST: &str = "localhost";
pub(crate) const DEFAULT_PORT: u16 = 4020;
pub(crate) const DEFAULT_PROTOCOL: &str = "http";
pub(crate) const DEFAULT_PREFIX: &str = "comet/";
pub(crate) const DEFAULT_CONNECT_URL: &str = "/server/connect/{uid}";
pub(crate) const DEFAULT_DISCONNECT_URL: &str = "/server/disconnect/{uid}";
pub(crate) const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
pub(crate) const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 30_000;
pub(crate) const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 64;

/// Placeholder replaced by the session identity in connect/disconnect templates.
pub const UID_PLACEHOLDER: &str = "{uid}";

/// Configuration for [`CometClient`](crate::CometClient).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CometConfig {
    /// Host of the comet server. An empty host makes every URL origin-relative.
    pub host: String,
    pub port: u16,
    /// Scheme, e.g. `"http"` or `"https"`.
    pub protocol: String,
    /// Prefix for poll URLs; the continuation token is appended to it.
    pub prefix: String,
    /// Connect call template. `{uid}` is replaced by the session identity.
    pub connect_url: String,
    /// Disconnect call template. `{uid}` is replaced by the session identity.
    pub disconnect_url: String,
    /// Let the transport talk to other ports on the same host.
    #[serde(alias = "cross_port")]
    pub relax_origin: bool,
    pub retry_delay_ms: u64,
    pub connect_timeout_ms: u64,
    pub event_channel_capacity: usize,
}

impl Default for CometConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            protocol: DEFAULT_PROTOCOL.to_string(),
            prefix: DEFAULT_PREFIX.to_string(),
            connect_url: DEFAULT_CONNECT_URL.to_string(),
            disconnect_url: DEFAULT_DISCONNECT_URL.to_string(),
            relax_origin: true,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl CometConfig {
    /// Config for `host:port` with every other field at its default.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.retry_delay_ms == 0 {
            return Err(Error::Config("retry_delay_ms must be greater than 0".into()));
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::Config(
                "event_channel_capacity must be greater than 0".into(),
            ));
        }
        if self.protocol.is_empty() {
            return Err(Error::Config("protocol must not be empty".into()));
        }
        for (name, template) in [
            ("connect_url", &self.connect_url),
            ("disconnect_url", &self.disconnect_url),
        ] {
            if !template.contains(UID_PLACEHOLDER) {
                return Err(Error::Config(format!(
                    "{name} must contain the {UID_PLACEHOLDER} placeholder"
                )));
            }
        }
        Ok(())
    }

    /// Parse and validate a YAML config document.
    pub fn from_yaml_str(content: &str) -> Result<Self, Error> {
        let config: CometConfig = serde_yaml_ng::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}

/// Load and validate a client config from a YAML file.
pub async fn load(path: &Path) -> Result<CometConfig, Error> {
    let content = tokio::fs::read_to_string(path).await?;
    CometConfig::from_yaml_str(&content)
}

/// URLs for the poll, connect and disconnect endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    origin: String,
    prefix: String,
    connect_template: String,
    disconnect_template: String,
}

impl Endpoints {
    pub fn from_config(config: &CometConfig) -> Self {
        let origin = if config.host.is_empty() {
            String::new()
        } else {
            format!("{}://{}:{}", config.protocol, config.host, config.port)
        };
        Self {
            origin,
            prefix: config.prefix.clone(),
            connect_template: config.connect_url.clone(),
            disconnect_template: config.disconnect_url.clone(),
        }
    }

    /// `{protocol}://{host}:{port}`, or empty for origin-relative URLs.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// The token is appended verbatim: its `/` separators are part of the path.
    pub fn poll_url(&self, token: &str) -> String {
        format!("{}/{}{}", self.origin, self.prefix, token)
    }

    pub fn connect_url(&self, identity: &str) -> String {
        self.expand(&self.connect_template, identity)
    }

    pub fn disconnect_url(&self, identity: &str) -> String {
        self.expand(&self.disconnect_template, identity)
    }

    fn expand(&self, template: &str, identity: &str) -> String {
        let path = template.replace(UID_PLACEHOLDER, identity);
        if path.starts_with('/') {
            format!("{}{}", self.origin, path)
        } else {
            path
        }
    }
}
