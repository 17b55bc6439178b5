use super::http::{client, read_reply};
use super::{Tier, Transport, TransportEvent};
use crate::config::ClientConfig;
use crate::errors::TransportError;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use tether_protocol::{decode_server, stream_event_body, ClientMessage, EventStreamParser, ServerMessage};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// Secondary tier: a server-push event stream for inbound records, one
/// HTTP request per outbound event. The stream request itself mounts the
/// view. No binary frames, no full-state requests.
pub struct PushStreamTransport {
    config: ClientConfig,
    session_id: String,
    http: Option<reqwest::Client>,
    events: Option<UnboundedSender<TransportEvent>>,
    reader: Option<JoinHandle<()>>,
}

impl PushStreamTransport {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            session_id: uuid::Uuid::new_v4().to_string(),
            http: None,
            events: None,
            reader: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn emit(&self, message: ServerMessage) {
        if let Some(events) = &self.events {
            let _ = events.send(TransportEvent::Message(Ok(message)));
        }
    }
}

#[async_trait]
impl Transport for PushStreamTransport {
    fn tier(&self) -> Tier {
        Tier::PushStream
    }

    async fn connect(&mut self, events: UnboundedSender<TransportEvent>) -> Result<(), TransportError> {
        let url = self.config.stream_url(&self.session_id)?;
        let http = client()?;
        tracing::debug!(url = %url, "opening push stream");

        let response = http
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| TransportError::connect(e.to_string()))?;
        if !response.status().is_success() {
            return Err(TransportError::Status(response.status().as_u16()));
        }

        let mut body = response.bytes_stream();
        let stream_events = events.clone();
        let reader = tokio::spawn(async move {
            let mut parser = EventStreamParser::new();
            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = stream_events.send(TransportEvent::Closed { reason: e.to_string() });
                        return;
                    }
                };
                for frame in parser.feed(&chunk) {
                    if frame.data.trim().is_empty() {
                        continue;
                    }
                    if stream_events
                        .send(TransportEvent::Message(decode_server(&frame.data)))
                        .is_err()
                    {
                        return;
                    }
                }
            }
            let _ = stream_events.send(TransportEvent::Closed {
                reason: "push stream ended".to_string(),
            });
        });

        self.http = Some(http);
        self.events = Some(events);
        self.reader = Some(reader);
        Ok(())
    }

    async fn send(&mut self, message: &ClientMessage) -> Result<(), TransportError> {
        let http = self.http.clone().ok_or(TransportError::NotConnected(Tier::PushStream))?;
        match message {
            // Mounted by the stream request
            ClientMessage::Mount { .. } => Ok(()),
            ClientMessage::Ping => {
                self.emit(ServerMessage::Pong);
                Ok(())
            }
            ClientMessage::RequestHtml => Err(TransportError::Unsupported {
                tier: Tier::PushStream,
                what: "full-state requests",
            }),
            ClientMessage::Event { event, params } => {
                let url = self.config.stream_event_url(&self.session_id)?;
                let response = http.post(url).json(&stream_event_body(event, params)).send().await?;
                if let Some(reply) = read_reply(response).await? {
                    self.emit(reply);
                }
                Ok(())
            }
        }
    }

    async fn disconnect(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.events = None;
        self.http = None;
    }
}
