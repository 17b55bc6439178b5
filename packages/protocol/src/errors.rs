use tether_vdom::MarkupError;
use thiserror::Error;

pub type ProtocolResult<T> = Result<T, ProtocolError>;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("message has no \"type\" field")]
    MissingType,

    #[error("unknown message type {0:?}")]
    UnknownType(String),

    #[error("unrecognised reply: {0}")]
    UnrecognisedReply(String),

    #[error("full-state markup: {0}")]
    Markup(#[from] MarkupError),
}

impl ProtocolError {
    pub fn unrecognised_reply(detail: impl Into<String>) -> Self {
        Self::UnrecognisedReply(detail.into())
    }
}
