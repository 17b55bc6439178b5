//! In-memory transport for runtime tests. A [`LoopbackNetwork`] plays the
//! server: it can refuse connections per tier, records everything sent and
//! answers through a responder closure.

use super::{Tier, Transport, TransportEvent, TransportFactory};
use crate::config::ClientConfig;
use crate::errors::TransportError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tether_protocol::{ClientMessage, ServerMessage};
use tokio::sync::mpsc::UnboundedSender;

type Responder = Box<dyn FnMut(&ClientMessage) -> Vec<ServerMessage> + Send>;

#[derive(Default)]
struct State {
    refused: HashMap<Tier, bool>,
    /// Events whose delivery fails with a server error
    rejected: HashSet<String>,
    attempts: HashMap<Tier, usize>,
    sent: Vec<(Tier, ClientMessage)>,
    binary: Vec<Vec<u8>>,
    responder: Option<Responder>,
    current: Option<UnboundedSender<TransportEvent>>,
}

#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    state: Arc<Mutex<State>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refuse(&self, tier: Tier) {
        self.state.lock().unwrap().refused.insert(tier, true);
    }

    /// Fail every send of `event` with a 500 status, keeping the connection.
    pub fn reject_event(&self, event: &str) {
        self.state.lock().unwrap().rejected.insert(event.to_string());
    }

    pub fn respond_with(&self, responder: impl FnMut(&ClientMessage) -> Vec<ServerMessage> + Send + 'static) {
        self.state.lock().unwrap().responder = Some(Box::new(responder));
    }

    pub fn attempts(&self, tier: Tier) -> usize {
        self.state.lock().unwrap().attempts.get(&tier).copied().unwrap_or(0)
    }

    pub fn sent(&self) -> Vec<(Tier, ClientMessage)> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn binary(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().binary.clone()
    }

    /// Deliver a server message on the open connection.
    pub fn push(&self, message: ServerMessage) -> bool {
        match &self.state.lock().unwrap().current {
            Some(events) => events.send(TransportEvent::Message(Ok(message))).is_ok(),
            None => false,
        }
    }

    /// Drop the open connection as if the network failed.
    pub fn sever(&self, reason: &str) {
        if let Some(events) = self.state.lock().unwrap().current.take() {
            let _ = events.send(TransportEvent::Closed {
                reason: reason.to_string(),
            });
        }
    }
}

impl TransportFactory for LoopbackNetwork {
    fn create(&self, tier: Tier, _config: &ClientConfig) -> Box<dyn Transport> {
        Box::new(LoopbackTransport {
            tier,
            network: self.clone(),
            open: false,
        })
    }
}

pub struct LoopbackTransport {
    tier: Tier,
    network: LoopbackNetwork,
    open: bool,
}

#[async_trait]
impl Transport for LoopbackTransport {
    fn tier(&self) -> Tier {
        self.tier
    }

    async fn connect(&mut self, events: UnboundedSender<TransportEvent>) -> Result<(), TransportError> {
        let mut state = self.network.state.lock().unwrap();
        *state.attempts.entry(self.tier).or_default() += 1;
        if state.refused.get(&self.tier).copied().unwrap_or(false) {
            return Err(TransportError::connect("connection refused"));
        }
        state.current = Some(events);
        self.open = true;
        Ok(())
    }

    async fn send(&mut self, message: &ClientMessage) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::NotConnected(self.tier));
        }
        let mut state = self.network.state.lock().unwrap();
        if let ClientMessage::Event { event, .. } = message {
            if state.rejected.contains(event) {
                return Err(TransportError::Status(500));
            }
        }
        state.sent.push((self.tier, message.clone()));
        let replies = match state.responder.as_mut() {
            Some(responder) => responder(message),
            None => Vec::new(),
        };
        if let Some(events) = &state.current {
            for reply in replies {
                let _ = events.send(TransportEvent::Message(Ok(reply)));
            }
        }
        Ok(())
    }

    async fn send_binary(&mut self, data: Vec<u8>) -> Result<(), TransportError> {
        if !self.tier.supports_binary() {
            return Err(TransportError::Unsupported {
                tier: self.tier,
                what: "binary frames",
            });
        }
        self.network.state.lock().unwrap().binary.push(data);
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.open = false;
        self.network.state.lock().unwrap().current = None;
    }
}
