pub mod codec;
pub mod errors;
pub mod event_stream;
pub mod messages;

pub use codec::{
    decode_http_reply, decode_server, decode_server_value, encode_client, encode_server,
    http_event_body, stream_event_body, EVENT_HEADER,
};
pub use errors::{ProtocolError, ProtocolResult};
pub use event_stream::{EventStreamParser, StreamFrame};
pub use messages::{CacheConfig, CachePolicy, ClientMessage, Params, ServerMessage};
