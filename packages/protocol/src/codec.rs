//! JSON wire codec.
//!
//! Socket and push-stream frames carry tagged records. Replies to plain HTTP
//! event requests are untyped objects (`{patches, version}`, `{tree, version}`,
//! `{error}` or `{ok: true}`) and are normalised into [`ServerMessage`]s here
//! so the rest of the client sees a single message model.
//!
//! Full view state may arrive as a serialised `tree` or as rendered `html`;
//! markup is parsed here so every decoded message carries a tree.

use crate::errors::{ProtocolError, ProtocolResult};
use crate::messages::{ClientMessage, Params, ServerMessage, SERVER_MESSAGE_TYPES};
use serde_json::Value;
use serde_json::Map;
use tether_vdom::{parse_markup, Patch, VNode};

/// Header carrying the event name on HTTP event requests.
pub const EVENT_HEADER: &str = "X-Djust-Event";

/// Tagged records that may carry the view as markup.
const STATE_MESSAGE_TYPES: &[&str] = &["mount", "html_recovery", "html_update"];

pub fn encode_client(message: &ClientMessage) -> ProtocolResult<String> {
    Ok(serde_json::to_string(message)?)
}

pub fn encode_server(message: &ServerMessage) -> ProtocolResult<String> {
    Ok(serde_json::to_string(message)?)
}

pub fn decode_server(text: &str) -> ProtocolResult<ServerMessage> {
    let value: Value = serde_json::from_str(text)?;
    decode_server_value(value)
}

pub fn decode_server_value(mut value: Value) -> ProtocolResult<ServerMessage> {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?;
    if !SERVER_MESSAGE_TYPES.contains(&kind) {
        return Err(ProtocolError::UnknownType(kind.to_string()));
    }
    let carries_state = STATE_MESSAGE_TYPES.contains(&kind);
    if carries_state {
        if let Value::Object(object) = &mut value {
            inline_markup(object)?;
        }
    }
    Ok(serde_json::from_value(value)?)
}

/// Parse an `html` field into `tree`. A tree sent alongside wins.
fn inline_markup(object: &mut Map<String, Value>) -> ProtocolResult<()> {
    if object.contains_key("tree") {
        return Ok(());
    }
    let tree = match object.get("html") {
        Some(Value::String(markup)) => parse_markup(markup)?,
        _ => return Ok(()),
    };
    object.insert("tree".to_string(), serde_json::to_value(tree)?);
    Ok(())
}

/// Normalise the reply to an HTTP event request. `Ok(None)` is a bare
/// acknowledgement whose real update arrives on the push stream.
pub fn decode_http_reply(value: Value) -> ProtocolResult<Option<ServerMessage>> {
    if value.get("type").is_some() {
        return decode_server_value(value).map(Some);
    }

    let object = match value {
        Value::Object(object) => object,
        other => return Err(ProtocolError::unrecognised_reply(format!("not an object: {}", other))),
    };

    if let Some(error) = object.get("error") {
        let text = error
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        let mut detail = object.clone();
        detail.remove("error");
        return Ok(Some(ServerMessage::Error {
            error: Some(text),
            message: None,
            detail,
        }));
    }

    let cache_request_id = object
        .get("cache_request_id")
        .and_then(Value::as_str)
        .map(str::to_string);
    let version = object.get("version").and_then(Value::as_u64);

    if let Some(patches) = object.get("patches") {
        let patches: Vec<Patch> = serde_json::from_value(patches.clone())?;
        let version = version.ok_or_else(|| ProtocolError::unrecognised_reply("patches without version"))?;
        return Ok(Some(ServerMessage::Patch {
            version,
            patches,
            broadcast: false,
            hotreload: false,
            file: None,
            cache_request_id,
        }));
    }

    if let Some(tree) = object.get("tree") {
        let tree: VNode = serde_json::from_value(tree.clone())?;
        let version = version.ok_or_else(|| ProtocolError::unrecognised_reply("tree without version"))?;
        return Ok(Some(ServerMessage::HtmlUpdate {
            version,
            tree,
            broadcast: false,
            cache_request_id,
        }));
    }

    if let Some(Value::String(markup)) = object.get("html") {
        let tree = parse_markup(markup)?;
        let version = version.ok_or_else(|| ProtocolError::unrecognised_reply("html without version"))?;
        return Ok(Some(ServerMessage::HtmlUpdate {
            version,
            tree,
            broadcast: false,
            cache_request_id,
        }));
    }

    if object.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(None);
    }

    Err(ProtocolError::unrecognised_reply(Value::Object(object).to_string()))
}

/// Body of a polling-tier event request: the parameters flattened into one
/// object, with the event name travelling in [`EVENT_HEADER`].
pub fn http_event_body(params: &Params) -> Value {
    Value::Object(params.clone())
}

/// Body of a push-stream event request.
pub fn stream_event_body(event: &str, params: &Params) -> Value {
    serde_json::json!({ "event": event, "params": params })
}
