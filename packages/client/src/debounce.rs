//! Per-event debouncing. Rapid dispatches of the same event collapse into
//! one: the latest parameters win, the window restarts and the event moves
//! behind everything dispatched before it.
//!
//! Windows differ per event, but pending events still leave in dispatch
//! order: when one comes due, every event dispatched earlier is flushed
//! with it, even if its own window has not elapsed.

use indexmap::IndexMap;
use std::time::{Duration, Instant};
use tether_protocol::Params;

#[derive(Debug, Clone)]
struct Pending {
    params: Params,
    due: Instant,
}

#[derive(Debug, Default)]
pub struct Debouncer {
    pending: IndexMap<String, Pending>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, event: &str, params: Params, window: Duration, now: Instant) {
        let due = now + window;
        self.pending.shift_remove(event);
        self.pending.insert(event.to_string(), Pending { params, due });
    }

    /// Remove and return the events to send at `now`, in dispatch order:
    /// the latest one whose window elapsed and everything ahead of it.
    pub fn due(&mut self, now: Instant) -> Vec<(String, Params)> {
        let cut = match self.pending.values().rposition(|p| p.due <= now) {
            Some(last) => last + 1,
            None => return Vec::new(),
        };
        self.pending
            .drain(..cut)
            .map(|(event, pending)| (event, pending.params))
            .collect()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.due).min()
    }

    pub fn cancel_all(&mut self) -> usize {
        let cancelled = self.pending.len();
        self.pending.clear();
        cancelled
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
