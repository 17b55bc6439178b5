//! Shared handling of HTTP replies for the push-stream and polling tiers.

use crate::errors::TransportError;
use serde_json::Value;
use tether_protocol::{decode_http_reply, ProtocolError, ServerMessage};

/// Read an event reply. Error statuses with a JSON body still decode, so the
/// server's error message reaches the session.
pub(crate) async fn read_reply(response: reqwest::Response) -> Result<Option<ServerMessage>, TransportError> {
    let status = response.status();
    let body = response.bytes().await?;

    match serde_json::from_slice::<Value>(&body) {
        Ok(value) => Ok(decode_http_reply(value)?),
        Err(_) if !status.is_success() => Err(TransportError::Status(status.as_u16())),
        Err(e) => Err(ProtocolError::Malformed(e).into()),
    }
}

pub(crate) fn client() -> Result<reqwest::Client, TransportError> {
    Ok(reqwest::Client::builder()
        .user_agent(concat!("tether/", env!("CARGO_PKG_VERSION")))
        .build()?)
}
