use crate::transport::Tier;
use std::path::PathBuf;
use tether_protocol::ProtocolError;
use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

/// Failure inside a single transport adapter.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("{0} transport is not connected")]
    NotConnected(Tier),

    #[error("{tier} transport does not support {what}")]
    Unsupported { tier: Tier, what: &'static str },

    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("server replied with status {0}")]
    Status(u16),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl TransportError {
    pub fn connect(reason: impl Into<String>) -> Self {
        Self::Connect(reason.into())
    }

    /// Whether the failure means the connection itself is gone, as opposed
    /// to one request going wrong.
    pub fn is_connection_lost(&self) -> bool {
        match self {
            Self::Connect(_) | Self::NotConnected(_) | Self::Socket(_) => true,
            Self::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

/// Failure surfaced by the client as a whole.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("no transport tier is enabled")]
    NoTierEnabled,

    #[error("all transport tiers exhausted, last tier was {0}")]
    ConnectionExhausted(Tier),

    #[error("client runtime has stopped")]
    Stopped,

    #[error(transparent)]
    Transport(#[from] TransportError),
}
