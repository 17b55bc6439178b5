//! # Transport Manager
//!
//! Owns the current [`Connection`] and walks down the enabled tiers when a
//! tier's reconnect budget is spent.

use super::connection::{CloseOutcome, Connection, ConnectionState};
use super::Tier;
use crate::config::{ClientConfig, ReconnectConfig};
use crate::errors::{ClientError, ClientResult};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDecision {
    Reconnect { tier: Tier, attempt: u32, delay: Duration },
    /// Continue on the next tier; the session must be mounted again
    Failover { from: Tier, to: Tier },
    /// No tier left
    Terminal { tier: Tier },
    Ignored,
}

#[derive(Debug)]
pub struct TransportManager {
    tiers: Vec<Tier>,
    position: usize,
    connection: Connection,
    policy: ReconnectConfig,
    failovers: usize,
}

impl TransportManager {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let tiers = config.enabled_tiers();
        let first = *tiers.first().ok_or(ClientError::NoTierEnabled)?;
        Ok(Self {
            tiers,
            position: 0,
            connection: Connection::new(first, config.reconnect.clone()),
            policy: config.reconnect.clone(),
            failovers: 0,
        })
    }

    pub fn tier(&self) -> Tier {
        self.connection.tier()
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn failover_count(&self) -> usize {
        self.failovers
    }

    pub fn begin_connect(&mut self) -> Tier {
        self.connection.begin_connect();
        self.tier()
    }

    pub fn on_open(&mut self) {
        tracing::info!(tier = %self.tier(), "connected");
        self.connection.opened();
    }

    pub fn on_unexpected_close(&mut self) -> CloseDecision {
        let tier = self.tier();
        match self.connection.on_close() {
            CloseOutcome::Ignored => CloseDecision::Ignored,
            CloseOutcome::Reconnect { attempt, delay } => {
                tracing::info!(%tier, attempt, delay_ms = delay.as_millis() as u64, "reconnecting");
                CloseDecision::Reconnect {
                    tier,
                    attempt,
                    delay,
                }
            }
            CloseOutcome::Exhausted => match self.tiers.get(self.position + 1).copied() {
                Some(next) => {
                    self.position += 1;
                    self.failovers += 1;
                    self.connection = Connection::new(next, self.policy.clone());
                    tracing::warn!(from = %tier, to = %next, "failing over to next transport tier");
                    CloseDecision::Failover { from: tier, to: next }
                }
                None => {
                    tracing::error!(%tier, "all transport tiers exhausted");
                    CloseDecision::Terminal { tier }
                }
            },
        }
    }

    pub fn teardown(&mut self) {
        self.connection.close_intentionally();
    }

    pub fn is_torn_down(&self) -> bool {
        self.connection.state() == ConnectionState::IntentionallyClosed
    }
}
