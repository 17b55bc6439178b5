use super::http::{client, read_reply};
use super::{Tier, Transport, TransportEvent};
use crate::config::ClientConfig;
use crate::errors::TransportError;
use async_trait::async_trait;
use reqwest::Url;
use tether_protocol::{http_event_body, ClientMessage, ServerMessage, EVENT_HEADER};
use tokio::sync::mpsc::UnboundedSender;

/// Last-resort tier: every event is a `POST` to the page URL and its reply
/// is the only inbound traffic. The session id is generated locally.
pub struct PollingTransport {
    config: ClientConfig,
    http: Option<reqwest::Client>,
    page: Option<Url>,
    events: Option<UnboundedSender<TransportEvent>>,
}

impl PollingTransport {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            http: None,
            page: None,
            events: None,
        }
    }

    fn emit(&self, message: ServerMessage) {
        if let Some(events) = &self.events {
            let _ = events.send(TransportEvent::Message(Ok(message)));
        }
    }
}

#[async_trait]
impl Transport for PollingTransport {
    fn tier(&self) -> Tier {
        Tier::Polling
    }

    async fn connect(&mut self, events: UnboundedSender<TransportEvent>) -> Result<(), TransportError> {
        self.page = Some(self.config.page_url()?);
        self.http = Some(client()?);
        self.events = Some(events);
        self.emit(ServerMessage::Connect {
            session_id: Some(uuid::Uuid::new_v4().to_string()),
        });
        Ok(())
    }

    async fn send(&mut self, message: &ClientMessage) -> Result<(), TransportError> {
        let (http, page) = match (&self.http, &self.page) {
            (Some(http), Some(page)) => (http.clone(), page.clone()),
            _ => return Err(TransportError::NotConnected(Tier::Polling)),
        };
        match message {
            // The page is already rendered; the first reply's version is the baseline
            ClientMessage::Mount { .. } => Ok(()),
            ClientMessage::Ping => {
                self.emit(ServerMessage::Pong);
                Ok(())
            }
            ClientMessage::RequestHtml => Err(TransportError::Unsupported {
                tier: Tier::Polling,
                what: "full-state requests",
            }),
            ClientMessage::Event { event, params } => {
                let response = http
                    .post(page)
                    .header(EVENT_HEADER, event.as_str())
                    .json(&http_event_body(params))
                    .send()
                    .await
                    .map_err(|e| {
                        if e.is_connect() {
                            TransportError::connect(e.to_string())
                        } else {
                            TransportError::Http(e)
                        }
                    })?;
                if let Some(reply) = read_reply(response).await? {
                    self.emit(reply);
                }
                Ok(())
            }
        }
    }

    async fn disconnect(&mut self) {
        self.events = None;
        self.http = None;
        self.page = None;
    }
}
