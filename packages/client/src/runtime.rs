//! # Client Runtime
//!
//! Async driver around a [`SessionController`]. One task owns the session
//! and the transport; transport events, host commands, the heartbeat and
//! the session's own deadlines are funnelled through a single `select!`
//! loop, so they are handled strictly one at a time.

use crate::config::ClientConfig;
use crate::errors::{ClientError, ClientResult};
use crate::hooks::{UploadLink, ViewHooks};
use crate::session::{Effect, Heartbeat, SessionController};
use crate::transport::{
    CloseDecision, DefaultTransportFactory, Transport, TransportEvent, TransportFactory, TransportManager,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tether_protocol::{ClientMessage, Params};
use tether_vdom::NodeId;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

#[derive(Debug)]
pub enum Command {
    Dispatch { event: String, params: Params },
    Fire { node: NodeId, kind: String },
    Focus(Option<NodeId>),
    SendBinary(Vec<u8>),
    Shutdown,
}

/// Cheap, cloneable handle for talking to a running client.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    commands: UnboundedSender<Command>,
    open: Arc<AtomicBool>,
}

impl ClientHandle {
    fn submit(&self, command: Command) -> ClientResult<()> {
        self.commands.send(command).map_err(|_| ClientError::Stopped)
    }

    pub fn dispatch(&self, event: impl Into<String>, params: Params) -> ClientResult<()> {
        self.submit(Command::Dispatch {
            event: event.into(),
            params,
        })
    }

    pub fn fire(&self, node: NodeId, kind: impl Into<String>) -> ClientResult<()> {
        self.submit(Command::Fire {
            node,
            kind: kind.into(),
        })
    }

    pub fn focus(&self, node: Option<NodeId>) -> ClientResult<()> {
        self.submit(Command::Focus(node))
    }

    /// Leave the view. Closing is intentional and never reconnects.
    pub fn shutdown(&self) -> ClientResult<()> {
        self.submit(Command::Shutdown)
    }
}

impl UploadLink for ClientHandle {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn send_binary(&self, data: Vec<u8>) -> bool {
        self.is_open() && self.submit(Command::SendBinary(data)).is_ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Shut down on request
    Closed,
    /// The view must be reloaded from scratch
    Reload { reason: String },
}

#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub failovers: usize,
    pub session: SessionController,
}

struct Link {
    transport: Box<dyn Transport>,
    events: UnboundedReceiver<TransportEvent>,
}

enum Exit {
    Lost(String),
    Finished(RunOutcome),
}

enum Turn {
    Inbound(Option<TransportEvent>),
    Command(Option<Command>),
    Heartbeat,
    Deadline,
}

pub struct ClientRuntime {
    config: ClientConfig,
    factory: Box<dyn TransportFactory>,
    session: SessionController,
    commands: UnboundedReceiver<Command>,
    open: Arc<AtomicBool>,
}

impl ClientRuntime {
    pub fn new(config: ClientConfig, hooks: Box<dyn ViewHooks>) -> (Self, ClientHandle) {
        Self::with_factory(config, hooks, Box::new(DefaultTransportFactory))
    }

    pub fn with_factory(
        config: ClientConfig,
        hooks: Box<dyn ViewHooks>,
        factory: Box<dyn TransportFactory>,
    ) -> (Self, ClientHandle) {
        let session = SessionController::new(&config, hooks);
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));
        let handle = ClientHandle {
            commands: commands_tx,
            open: open.clone(),
        };
        let runtime = Self {
            config,
            factory,
            session,
            commands,
            open,
        };
        (runtime, handle)
    }

    /// Run until shutdown, a hard reload or connection exhaustion.
    pub async fn run(mut self) -> ClientResult<RunReport> {
        let mut manager = TransportManager::new(&self.config)?;
        let mut backoff: Option<Duration> = None;

        loop {
            if let Some(delay) = backoff.take() {
                if !self.wait(delay).await {
                    manager.teardown();
                    return Ok(self.report(RunOutcome::Closed, &manager));
                }
            }

            let tier = manager.begin_connect();
            let mut transport = self.factory.create(tier, &self.config);
            let (events_tx, events) = mpsc::unbounded_channel();

            if let Err(e) = transport.connect(events_tx).await {
                tracing::warn!(%tier, error = %e, "connect failed");
                backoff = Some(self.decide(&mut manager)?);
                continue;
            }

            manager.on_open();
            self.open.store(tier.supports_binary(), Ordering::SeqCst);
            let effects = self.session.connection_opened(tier.supports_full_state());

            let mut link = Link { transport, events };
            let exit = self.drive(&mut link, effects).await;
            self.open.store(false, Ordering::SeqCst);

            match exit {
                Exit::Finished(outcome) => {
                    manager.teardown();
                    link.transport.disconnect().await;
                    return Ok(self.report(outcome, &manager));
                }
                Exit::Lost(reason) => {
                    tracing::warn!(%tier, reason = %reason, "connection lost");
                    link.transport.disconnect().await;
                    self.session.connection_lost();
                    backoff = Some(self.decide(&mut manager)?);
                }
            }
        }
    }

    /// Delay before the next connect attempt, or the terminal error.
    fn decide(&mut self, manager: &mut TransportManager) -> ClientResult<Duration> {
        match manager.on_unexpected_close() {
            CloseDecision::Reconnect { delay, .. } => Ok(delay),
            CloseDecision::Failover { .. } | CloseDecision::Ignored => Ok(Duration::ZERO),
            CloseDecision::Terminal { tier } => {
                self.session.teardown();
                Err(ClientError::ConnectionExhausted(tier))
            }
        }
    }

    fn report(self, outcome: RunOutcome, manager: &TransportManager) -> RunReport {
        RunReport {
            outcome,
            failovers: manager.failover_count(),
            session: self.session,
        }
    }

    /// Sleep out a backoff delay while still serving commands. Returns false
    /// when asked to shut down.
    async fn wait(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => {
                        self.session.teardown();
                        return false;
                    }
                    Some(command) => {
                        let dropped = self.apply_command(command);
                        if !dropped.is_empty() {
                            tracing::debug!(effects = dropped.len(), "offline, effects dropped");
                        }
                    }
                },
            }
        }
    }

    async fn drive(&mut self, link: &mut Link, initial: Vec<Effect>) -> Exit {
        if let Some(exit) = self.perform(link, initial).await {
            return exit;
        }

        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval());
        heartbeat.tick().await;

        loop {
            let deadline = self.session.next_deadline();
            let turn = tokio::select! {
                event = link.events.recv() => Turn::Inbound(event),
                command = self.commands.recv() => Turn::Command(command),
                _ = heartbeat.tick() => Turn::Heartbeat,
                _ = sleep_until(deadline) => Turn::Deadline,
            };

            let effects = match turn {
                Turn::Inbound(Some(TransportEvent::Message(message))) => {
                    self.session.handle_inbound(message, Instant::now())
                }
                Turn::Inbound(Some(TransportEvent::Closed { reason })) => return Exit::Lost(reason),
                Turn::Inbound(None) => return Exit::Lost("transport went away".to_string()),
                Turn::Command(Some(Command::Shutdown)) | Turn::Command(None) => {
                    self.session.teardown();
                    return Exit::Finished(RunOutcome::Closed);
                }
                Turn::Command(Some(Command::SendBinary(data))) => {
                    if let Err(e) = link.transport.send_binary(data).await {
                        tracing::warn!(error = %e, "binary frame not sent");
                    }
                    Vec::new()
                }
                Turn::Command(Some(command)) => self.apply_command(command),
                Turn::Heartbeat => match self.session.heartbeat() {
                    Heartbeat::Ping => vec![Effect::Send(ClientMessage::Ping)],
                    Heartbeat::Stale => return Exit::Lost("heartbeat timed out".to_string()),
                },
                Turn::Deadline => self.session.check_timeouts(Instant::now()),
            };

            if let Some(exit) = self.perform(link, effects).await {
                return exit;
            }
        }
    }

    fn apply_command(&mut self, command: Command) -> Vec<Effect> {
        let now = Instant::now();
        match command {
            Command::Dispatch { event, params } => self.session.dispatch(&event, params, now),
            Command::Fire { node, kind } => self.session.fire(node, &kind, now),
            Command::Focus(node) => {
                self.session.set_focus(node);
                Vec::new()
            }
            Command::SendBinary(_) => {
                tracing::warn!("binary frame dropped, no open connection");
                Vec::new()
            }
            Command::Shutdown => Vec::new(),
        }
    }

    async fn perform(&mut self, link: &mut Link, effects: Vec<Effect>) -> Option<Exit> {
        for effect in effects {
            match effect {
                Effect::SendEvent { request, message } => {
                    if let Err(e) = link.transport.send(&message).await {
                        if e.is_connection_lost() {
                            return Some(Exit::Lost(e.to_string()));
                        }
                        self.session.event_not_sent(request, &e.to_string(), Instant::now());
                    }
                }
                Effect::Send(message) => {
                    if let Err(e) = link.transport.send(&message).await {
                        if e.is_connection_lost() {
                            return Some(Exit::Lost(e.to_string()));
                        }
                        tracing::warn!(kind = message.kind(), error = %e, "send failed");
                        if matches!(message, ClientMessage::RequestHtml) {
                            return Some(Exit::Finished(RunOutcome::Reload { reason: e.to_string() }));
                        }
                    }
                }
                Effect::HardReload { reason } => {
                    tracing::warn!(reason = %reason, "hard reload");
                    self.session.teardown();
                    return Some(Exit::Finished(RunOutcome::Reload { reason }));
                }
            }
        }
        None
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}
