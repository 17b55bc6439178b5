use crate::errors::{ClientError, ClientResult, TransportError};
use crate::transport::Tier;
use indexmap::IndexMap;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;
use tether_protocol::Params;

/// Client configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Page URL of the view; event requests of the polling tier go here
    #[serde(default = "default_url")]
    pub url: String,

    /// View to mount
    #[serde(default)]
    pub view: String,

    /// Mount parameters
    #[serde(default)]
    pub params: Params,

    #[serde(default = "default_socket_path")]
    pub socket_path: String,

    #[serde(default = "default_stream_path")]
    pub stream_path: String,

    #[serde(default)]
    pub tiers: TierConfig,

    #[serde(default)]
    pub reconnect: ReconnectConfig,

    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    #[serde(default)]
    pub cache: CacheSettings,

    /// How long a full-state request may stay unanswered before a hard reload
    #[serde(default = "default_recovery_timeout_ms")]
    pub recovery_timeout_ms: u64,

    /// Debounce window in milliseconds per event name
    #[serde(default)]
    pub debounce: IndexMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierConfig {
    #[serde(default = "enabled")]
    pub socket: bool,
    #[serde(default = "enabled")]
    pub push_stream: bool,
    #[serde(default = "enabled")]
    pub polling: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSettings {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Lifetime of a request still waiting for its reply
    #[serde(default = "default_pending_ttl_ms")]
    pub pending_ttl_ms: u64,
}

fn default_url() -> String {
    "http://127.0.0.1:8000/".to_string()
}

fn default_socket_path() -> String {
    "/ws/live/".to_string()
}

fn default_stream_path() -> String {
    "/djust/sse/".to_string()
}

fn enabled() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_capacity() -> usize {
    100
}

fn default_pending_ttl_ms() -> u64 {
    30_000
}

fn default_recovery_timeout_ms() -> u64 {
    5_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            view: String::new(),
            params: Params::new(),
            socket_path: default_socket_path(),
            stream_path: default_stream_path(),
            tiers: TierConfig::default(),
            reconnect: ReconnectConfig::default(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            cache: CacheSettings::default(),
            recovery_timeout_ms: default_recovery_timeout_ms(),
            debounce: IndexMap::new(),
        }
    }
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            socket: true,
            push_stream: true,
            polling: true,
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            pending_ttl_ms: default_pending_ttl_ms(),
        }
    }
}

impl ClientConfig {
    pub fn from_json(json: &str) -> ClientResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> ClientResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ClientError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Enabled tiers in preference order.
    pub fn enabled_tiers(&self) -> Vec<Tier> {
        Tier::ALL
            .iter()
            .copied()
            .filter(|tier| match tier {
                Tier::Socket => self.tiers.socket,
                Tier::PushStream => self.tiers.push_stream,
                Tier::Polling => self.tiers.polling,
            })
            .collect()
    }

    pub fn page_url(&self) -> Result<Url, TransportError> {
        Url::parse(&self.url).map_err(|e| TransportError::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })
    }

    pub fn socket_url(&self) -> Result<Url, TransportError> {
        let mut url = self.join(&self.socket_path)?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme).map_err(|_| TransportError::InvalidUrl {
            url: url.to_string(),
            reason: format!("cannot switch scheme to {}", scheme),
        })?;
        Ok(url)
    }

    /// Push-stream endpoint for `session_id`.
    pub fn stream_url(&self, session_id: &str) -> Result<Url, TransportError> {
        let mut url = self.join(&format!("{}{}/", self.stream_path, session_id))?;
        url.query_pairs_mut().append_pair("view", &self.view);
        for (key, value) in &self.params {
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            url.query_pairs_mut().append_pair(key, &value);
        }
        Ok(url)
    }

    /// Event endpoint paired with the push stream of `session_id`.
    pub fn stream_event_url(&self, session_id: &str) -> Result<Url, TransportError> {
        self.join(&format!("{}{}/event/", self.stream_path, session_id))
    }

    fn join(&self, path: &str) -> Result<Url, TransportError> {
        self.page_url()?.join(path).map_err(|e| TransportError::InvalidUrl {
            url: format!("{}{}", self.url, path),
            reason: e.to_string(),
        })
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }

    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }

    pub fn pending_ttl(&self) -> Duration {
        Duration::from_millis(self.cache.pending_ttl_ms)
    }

    pub fn cache_capacity(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.cache.capacity).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn debounce_window(&self, event: &str) -> Option<Duration> {
        self.debounce
            .get(event)
            .filter(|ms| **ms > 0)
            .map(|ms| Duration::from_millis(*ms))
    }
}
