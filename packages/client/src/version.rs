//! # Version Tracker
//!
//! The client's belief about which server render it mirrors. Incremental
//! updates are only trusted when they are contiguous; a gap puts the tracker
//! in recovery and every further update is refused until a full-state
//! payload re-establishes the baseline.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Uninitialized,
    Tracking { current: u64 },
    /// Desynced; waiting for a full-state payload
    AwaitingRecovery { last: u64 },
}

/// Verdict on an incremental update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionCheck {
    /// First version seen; becomes the baseline
    Baseline(u64),
    Accepted(u64),
    /// Development reload, accepted regardless of the jump
    HotReload { from: u64, to: u64 },
    /// `expected` is `None` when the current version has no successor
    Desync { expected: Option<u64>, got: u64 },
    /// Update arrived while recovering
    Refused { got: u64 },
}

impl VersionCheck {
    /// Whether the update may be applied.
    pub fn is_applicable(&self) -> bool {
        matches!(
            self,
            VersionCheck::Baseline(_) | VersionCheck::Accepted(_) | VersionCheck::HotReload { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct VersionTracker {
    state: TrackerState,
}

impl Default for VersionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionTracker {
    pub fn new() -> Self {
        Self {
            state: TrackerState::Uninitialized,
        }
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn current(&self) -> Option<u64> {
        match self.state {
            TrackerState::Uninitialized => None,
            TrackerState::Tracking { current } => Some(current),
            TrackerState::AwaitingRecovery { last } => Some(last),
        }
    }

    pub fn is_recovering(&self) -> bool {
        matches!(self.state, TrackerState::AwaitingRecovery { .. })
    }

    /// Check an incremental update carrying `version`. Accepted versions
    /// become current; a gap moves the tracker into recovery.
    pub fn check_update(&mut self, version: u64, hotreload: bool) -> VersionCheck {
        let check = match self.state {
            TrackerState::Uninitialized => {
                self.state = TrackerState::Tracking { current: version };
                VersionCheck::Baseline(version)
            }
            TrackerState::Tracking { current } if current.checked_add(1) == Some(version) => {
                self.state = TrackerState::Tracking { current: version };
                VersionCheck::Accepted(version)
            }
            TrackerState::Tracking { current } if hotreload => {
                self.state = TrackerState::Tracking { current: version };
                VersionCheck::HotReload {
                    from: current,
                    to: version,
                }
            }
            TrackerState::Tracking { current } => {
                self.state = TrackerState::AwaitingRecovery { last: current };
                VersionCheck::Desync {
                    expected: current.checked_add(1),
                    got: version,
                }
            }
            TrackerState::AwaitingRecovery { .. } => VersionCheck::Refused { got: version },
        };

        match check {
            VersionCheck::Desync { expected, got } => {
                tracing::warn!(?expected, got, "version desync, refusing patches until recovery");
            }
            VersionCheck::HotReload { from, to } => {
                tracing::info!(from, to, "hot reload accepted out of sequence");
            }
            VersionCheck::Refused { got } => {
                tracing::debug!(got, "update refused while awaiting recovery");
            }
            _ => {}
        }
        check
    }

    /// Adopt the version of a mount or full-state payload unconditionally.
    pub fn reset_to(&mut self, version: u64) {
        if self.is_recovering() {
            tracing::info!(version, "recovered from desync");
        }
        self.state = TrackerState::Tracking { current: version };
    }

    /// Stop trusting incremental updates, e.g. after a patch batch failed.
    pub fn begin_recovery(&mut self) {
        if let TrackerState::Tracking { current } = self.state {
            self.state = TrackerState::AwaitingRecovery { last: current };
        }
    }

    /// Forget everything; the next version seen becomes the baseline.
    pub fn clear(&mut self) {
        self.state = TrackerState::Uninitialized;
    }
}
