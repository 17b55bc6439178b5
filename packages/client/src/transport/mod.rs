//! Transport tiers and the contract every adapter implements.
//!
//! Adapters push what they receive into an unbounded channel handed to
//! [`Transport::connect`]; the runtime owns the receiving end and creates a
//! fresh channel per connection attempt, so a superseded adapter can never
//! deliver into the current session.

pub mod connection;
mod http;
#[cfg(test)]
pub mod loopback;
pub mod manager;
pub mod polling;
pub mod push_stream;
pub mod socket;

use crate::config::ClientConfig;
use crate::errors::TransportError;
use async_trait::async_trait;
use std::fmt;
use tether_protocol::{ClientMessage, ProtocolError, ServerMessage};
use tokio::sync::mpsc::UnboundedSender;

pub use connection::{CloseOutcome, Connection, ConnectionState};
pub use manager::{CloseDecision, TransportManager};
pub use polling::PollingTransport;
pub use push_stream::PushStreamTransport;
pub use socket::SocketTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Persistent bidirectional socket
    Socket,
    /// Server-push stream plus discrete requests
    PushStream,
    /// Plain request/response
    Polling,
}

impl Tier {
    /// Preference order.
    pub const ALL: [Tier; 3] = [Tier::Socket, Tier::PushStream, Tier::Polling];

    pub fn supports_binary(self) -> bool {
        matches!(self, Tier::Socket)
    }

    /// Whether the tier can carry a `request_html` message.
    pub fn supports_full_state(self) -> bool {
        matches!(self, Tier::Socket)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::Socket => "socket",
            Tier::PushStream => "push-stream",
            Tier::Polling => "polling",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub enum TransportEvent {
    Message(Result<ServerMessage, ProtocolError>),
    /// The connection went away without being asked to
    Closed { reason: String },
}

#[async_trait]
pub trait Transport: Send {
    fn tier(&self) -> Tier;

    /// Open the connection. Inbound messages and closure are reported on
    /// `events` from then on.
    async fn connect(&mut self, events: UnboundedSender<TransportEvent>) -> Result<(), TransportError>;

    async fn send(&mut self, message: &ClientMessage) -> Result<(), TransportError>;

    async fn send_binary(&mut self, _data: Vec<u8>) -> Result<(), TransportError> {
        Err(TransportError::Unsupported {
            tier: self.tier(),
            what: "binary frames",
        })
    }

    /// Close intentionally. No `Closed` event follows.
    async fn disconnect(&mut self);
}

/// Builds the adapter for a tier.
pub trait TransportFactory: Send + Sync {
    fn create(&self, tier: Tier, config: &ClientConfig) -> Box<dyn Transport>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTransportFactory;

impl TransportFactory for DefaultTransportFactory {
    fn create(&self, tier: Tier, config: &ClientConfig) -> Box<dyn Transport> {
        match tier {
            Tier::Socket => Box::new(SocketTransport::new(config.clone())),
            Tier::PushStream => Box::new(PushStreamTransport::new(config.clone())),
            Tier::Polling => Box::new(PollingTransport::new(config.clone())),
        }
    }
}
