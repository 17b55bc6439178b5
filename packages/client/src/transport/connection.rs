//! Lifecycle of one connection on one tier.
//!
//! `Idle -> Connecting -> Open -> (Reconnecting -> Connecting -> Open)* -> Failed | IntentionallyClosed`

use super::Tier;
use crate::config::ReconnectConfig;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Reconnecting { attempt: u32 },
    /// Reconnect attempts exhausted
    Failed,
    IntentionallyClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    Reconnect { attempt: u32, delay: Duration },
    Exhausted,
    /// Closed on purpose; nothing to do
    Ignored,
}

#[derive(Debug, Clone)]
pub struct Connection {
    tier: Tier,
    state: ConnectionState,
    attempts: u32,
    policy: ReconnectConfig,
}

impl Connection {
    pub fn new(tier: Tier, policy: ReconnectConfig) -> Self {
        Self {
            tier,
            state: ConnectionState::Idle,
            attempts: 0,
            policy,
        }
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive reconnect attempts since the connection was last open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn begin_connect(&mut self) {
        self.transition(ConnectionState::Connecting);
    }

    pub fn opened(&mut self) {
        self.attempts = 0;
        self.transition(ConnectionState::Open);
    }

    /// The connection closed, or a connect attempt failed, without being asked to.
    pub fn on_close(&mut self) -> CloseOutcome {
        if self.state == ConnectionState::IntentionallyClosed {
            return CloseOutcome::Ignored;
        }
        if self.attempts < self.policy.max_attempts {
            self.attempts += 1;
            let attempt = self.attempts;
            self.transition(ConnectionState::Reconnecting { attempt });
            CloseOutcome::Reconnect {
                attempt,
                delay: self.backoff_delay(attempt),
            }
        } else {
            self.transition(ConnectionState::Failed);
            CloseOutcome::Exhausted
        }
    }

    pub fn close_intentionally(&mut self) {
        self.transition(ConnectionState::IntentionallyClosed);
    }

    /// `base * 2^(attempt-1)`, capped at the configured maximum.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let delay = self
            .policy
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.policy.max_delay_ms);
        Duration::from_millis(delay)
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state != next {
            tracing::debug!(tier = %self.tier, from = ?self.state, to = ?next, "connection state");
            self.state = next;
        }
    }
}
