use super::{Tier, Transport, TransportEvent};
use crate::config::ClientConfig;
use crate::errors::TransportError;
use async_trait::async_trait;
use futures_util::stream::{SplitSink, StreamExt};
use futures_util::SinkExt;
use tether_protocol::{decode_server, encode_client, ClientMessage};
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Sink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Primary tier: one persistent socket carrying JSON text frames, plus
/// binary frames for uploads.
pub struct SocketTransport {
    config: ClientConfig,
    sink: Option<Sink>,
    reader: Option<JoinHandle<()>>,
}

impl SocketTransport {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            sink: None,
            reader: None,
        }
    }

    fn sink(&mut self) -> Result<&mut Sink, TransportError> {
        self.sink.as_mut().ok_or(TransportError::NotConnected(Tier::Socket))
    }
}

#[async_trait]
impl Transport for SocketTransport {
    fn tier(&self) -> Tier {
        Tier::Socket
    }

    async fn connect(&mut self, events: UnboundedSender<TransportEvent>) -> Result<(), TransportError> {
        let url = self.config.socket_url()?;
        tracing::debug!(url = %url, "opening socket");

        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::connect(e.to_string()))?;
        let (sink, mut stream) = stream.split();

        let reader = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if events.send(TransportEvent::Message(decode_server(&text))).is_err() {
                            return;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        let reason = frame
                            .map(|f| format!("closed by server ({})", f.code))
                            .unwrap_or_else(|| "closed by server".to_string());
                        let _ = events.send(TransportEvent::Closed { reason });
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = events.send(TransportEvent::Closed { reason: e.to_string() });
                        return;
                    }
                }
            }
            let _ = events.send(TransportEvent::Closed {
                reason: "socket stream ended".to_string(),
            });
        });

        self.sink = Some(sink);
        self.reader = Some(reader);
        Ok(())
    }

    async fn send(&mut self, message: &ClientMessage) -> Result<(), TransportError> {
        let text = encode_client(message)?;
        self.sink()?.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn send_binary(&mut self, data: Vec<u8>) -> Result<(), TransportError> {
        self.sink()?.send(Message::Binary(data)).await?;
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.close().await {
                tracing::debug!(error = %e, "socket close failed");
            }
        }
    }
}
