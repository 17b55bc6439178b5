//! Inbound and outbound message records.
//!
//! Every record is a JSON object tagged by its `"type"` field. State-changing
//! inbound records (`mount`, `patch`, `html_recovery`, `html_update`) carry
//! the server's render version.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tether_vdom::{Patch, VNode};

/// Event and mount parameters.
pub type Params = serde_json::Map<String, Value>;

/// Per-event cache policies keyed by handler name.
pub type CacheConfig = IndexMap<String, CachePolicy>;

/// Client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Mount {
        view: String,
        #[serde(default)]
        params: Params,
    },
    Event {
        event: String,
        #[serde(default)]
        params: Params,
    },
    Ping,
    /// Ask the server for the full tree after a failed patch or desync
    RequestHtml,
}

impl ClientMessage {
    pub fn mount(view: impl Into<String>, params: Params) -> Self {
        Self::Mount {
            view: view.into(),
            params,
        }
    }

    pub fn event(event: impl Into<String>, params: Params) -> Self {
        Self::Event {
            event: event.into(),
            params,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Mount { .. } => "mount",
            Self::Event { .. } => "event",
            Self::Ping => "ping",
            Self::RequestHtml => "request_html",
        }
    }
}

/// Server-declared caching for one event handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    /// Entry lifetime in seconds
    #[serde(default = "default_ttl")]
    pub ttl: u64,
    /// Parameters that make up the cache key; empty means all public ones
    #[serde(default)]
    pub key_params: Vec<String>,
}

fn default_ttl() -> u64 {
    60
}

/// Server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Session established
    #[serde(alias = "sse_connect")]
    Connect {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },

    /// View mounted. `tree` is absent when the page was pre-rendered.
    Mount {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        view: String,
        version: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tree: Option<VNode>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_config: Option<CacheConfig>,
    },

    Patch {
        version: u64,
        #[serde(default)]
        patches: Vec<Patch>,
        #[serde(default, skip_serializing_if = "is_false")]
        broadcast: bool,
        /// Development reload; exempt from version contiguity
        #[serde(default, skip_serializing_if = "is_false")]
        hotreload: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_request_id: Option<String>,
    },

    /// Reply to `request_html`. Like `mount` and `html_update`, it may carry
    /// `html` markup in place of `tree`; the codec parses it.
    HtmlRecovery { version: u64, tree: VNode },

    /// Full-tree update sent instead of patches
    HtmlUpdate {
        version: u64,
        tree: VNode,
        #[serde(default, skip_serializing_if = "is_false")]
        broadcast: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_request_id: Option<String>,
    },

    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(flatten)]
        detail: Params,
    },

    Pong,

    /// Hot-reload signal without patches
    Hotreload {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file: Option<String>,
    },

    /// Server asks for a hard reload
    Reload {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file: Option<String>,
    },

    Noop,

    /// Application event pushed by the server
    PushEvent {
        event: String,
        #[serde(default)]
        payload: Value,
    },

    RateLimitExceeded {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Wire tags accepted by [`ServerMessage`].
pub const SERVER_MESSAGE_TYPES: &[&str] = &[
    "connect",
    "sse_connect",
    "mount",
    "patch",
    "html_recovery",
    "html_update",
    "error",
    "pong",
    "hotreload",
    "reload",
    "noop",
    "push_event",
    "rate_limit_exceeded",
];

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Mount { .. } => "mount",
            Self::Patch { .. } => "patch",
            Self::HtmlRecovery { .. } => "html_recovery",
            Self::HtmlUpdate { .. } => "html_update",
            Self::Error { .. } => "error",
            Self::Pong => "pong",
            Self::Hotreload { .. } => "hotreload",
            Self::Reload { .. } => "reload",
            Self::Noop => "noop",
            Self::PushEvent { .. } => "push_event",
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
        }
    }

    /// Render version carried by state-changing messages.
    pub fn version(&self) -> Option<u64> {
        match self {
            Self::Mount { version, .. }
            | Self::Patch { version, .. }
            | Self::HtmlRecovery { version, .. }
            | Self::HtmlUpdate { version, .. } => Some(*version),
            _ => None,
        }
    }

    pub fn cache_request_id(&self) -> Option<&str> {
        match self {
            Self::Patch {
                cache_request_id, ..
            }
            | Self::HtmlUpdate {
                cache_request_id, ..
            } => cache_request_id.as_deref(),
            _ => None,
        }
    }

    /// Human-readable text of an `error` message.
    pub fn error_text(&self) -> Option<&str> {
        match self {
            Self::Error { error, message, .. } => error
                .as_deref()
                .or(message.as_deref())
                .or(Some("unknown server error")),
            _ => None,
        }
    }

    pub fn patch(version: u64, patches: Vec<Patch>) -> Self {
        Self::Patch {
            version,
            patches,
            broadcast: false,
            hotreload: false,
            file: None,
            cache_request_id: None,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::Error {
            error: Some(text.into()),
            message: None,
            detail: Params::new(),
        }
    }
}
