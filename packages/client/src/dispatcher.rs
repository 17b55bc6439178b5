//! # Event Dispatcher
//!
//! Single entry point for outbound events. User interactions, two-way
//! bindings and navigation collaborators all go through [`EventDispatcher::prepare`],
//! which cleans the parameters, consults the [`ResponseCache`] and tracks
//! the request until the server answers.

use crate::cache::{ResponseCache, CACHE_REQUEST_ID_PARAM};
use serde_json::Value;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tether_protocol::{ClientMessage, Params};
use tether_vdom::attrs::is_unsafe_key;
use tether_vdom::Patch;

/// Suppress the loading indicator for this event.
pub const SKIP_LOADING_PARAM: &str = "_skipLoading";
/// The caller already applied an optimistic prediction.
pub const OPTIMISTIC_PARAM: &str = "_optimistic";
/// Per-call debounce hint consumed by the session.
pub const DEBOUNCE_PARAM: &str = "_debounce";

const LOCAL_PARAMS: &[&str] = &[SKIP_LOADING_PARAM, OPTIMISTIC_PARAM, DEBOUNCE_PARAM];

/// Identifies one sent event until it settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

/// Outcome of preparing an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Prepared {
    /// Send this message to the server
    Send { request: RequestId, message: ClientMessage },
    /// Served locally; apply these patches without a round trip
    CacheHit { event: String, patches: Vec<Patch> },
    Dropped { reason: &'static str },
}

/// An event waiting for the server's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlight {
    pub id: RequestId,
    pub event: String,
    pub skip_loading: bool,
    pub optimistic: bool,
    pub cache_request_id: Option<String>,
}

#[derive(Debug)]
pub struct EventDispatcher {
    cache: ResponseCache,
    in_flight: VecDeque<InFlight>,
    next_request: u64,
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Null) | None => false,
        Some(Value::String(s)) => !s.is_empty() && s != "false",
        Some(_) => true,
    }
}

/// Parameters as they may leave the process: unsafe keys and local
/// bookkeeping flags removed.
pub fn outbound_params(params: &Params) -> Params {
    params
        .iter()
        .filter(|(key, _)| !is_unsafe_key(key) && !LOCAL_PARAMS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

impl EventDispatcher {
    pub fn new(cache: ResponseCache) -> Self {
        Self {
            cache,
            in_flight: VecDeque::new(),
            next_request: 0,
        }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut ResponseCache {
        &mut self.cache
    }

    pub fn prepare(&mut self, event: &str, params: &Params, now: Instant) -> Prepared {
        if event.is_empty() {
            return Prepared::Dropped { reason: "empty event name" };
        }
        if is_unsafe_key(event) {
            tracing::warn!(event, "refusing event with unsafe name");
            return Prepared::Dropped { reason: "unsafe event name" };
        }

        let skip_loading = truthy(params.get(SKIP_LOADING_PARAM));
        let optimistic = truthy(params.get(OPTIMISTIC_PARAM));
        let mut outbound = outbound_params(params);

        let mut cache_request_id = None;
        if let Some(policy) = self.cache.policy(event).cloned() {
            let key = self.cache.cache_key(event, &outbound);
            if let Some(patches) = self.cache.lookup(&key, now) {
                tracing::debug!(event, key = %key, "cache hit");
                return Prepared::CacheHit {
                    event: event.to_string(),
                    patches,
                };
            }
            tracing::debug!(event, key = %key, "cache miss");
            let request_id = self
                .cache
                .begin_request(key, Duration::from_secs(policy.ttl), now);
            outbound.insert(
                CACHE_REQUEST_ID_PARAM.to_string(),
                Value::String(request_id.clone()),
            );
            cache_request_id = Some(request_id);
        }

        self.next_request += 1;
        let request = RequestId(self.next_request);
        self.in_flight.push_back(InFlight {
            id: request,
            event: event.to_string(),
            skip_loading,
            optimistic,
            cache_request_id,
        });
        Prepared::Send {
            request,
            message: ClientMessage::event(event, outbound),
        }
    }

    /// A reply arrived. A correlation id settles its own request, anything
    /// else settles the oldest one: the server answers a connection's events
    /// in the order they were sent, and requests that never left are removed
    /// through [`EventDispatcher::fail_request`]. `patches` populate the
    /// cache when the request was cacheable.
    pub fn settle(
        &mut self,
        cache_request_id: Option<&str>,
        patches: Option<&[Patch]>,
        now: Instant,
    ) -> Option<InFlight> {
        if let Some(request_id) = cache_request_id {
            self.cache
                .complete(request_id, patches.map(<[Patch]>::to_vec), now);
            let position = self
                .in_flight
                .iter()
                .position(|f| f.cache_request_id.as_deref() == Some(request_id));
            if let Some(position) = position {
                return self.in_flight.remove(position);
            }
        }
        self.in_flight.pop_front()
    }

    /// The server reported an error for the oldest request.
    pub fn fail(&mut self, now: Instant) -> Option<InFlight> {
        let failed = self.in_flight.pop_front()?;
        if let Some(request_id) = &failed.cache_request_id {
            self.cache.complete(request_id, None, now);
        }
        Some(failed)
    }

    /// The request could not be delivered.
    pub fn fail_request(&mut self, request: RequestId, now: Instant) -> Option<InFlight> {
        let position = self.in_flight.iter().position(|f| f.id == request)?;
        let failed = self.in_flight.remove(position)?;
        if let Some(request_id) = &failed.cache_request_id {
            self.cache.complete(request_id, None, now);
        }
        Some(failed)
    }

    /// Take back the most recent request; it was never sent.
    pub fn retract_last(&mut self, now: Instant) -> Option<InFlight> {
        let retracted = self.in_flight.pop_back()?;
        if let Some(request_id) = &retracted.cache_request_id {
            self.cache.complete(request_id, None, now);
        }
        Some(retracted)
    }

    /// Forget optimistic predictions after a desync. Returns the events whose
    /// predictions are void.
    pub fn discard_optimistic(&mut self) -> Vec<String> {
        let mut discarded = Vec::new();
        for flight in self.in_flight.iter_mut().filter(|f| f.optimistic) {
            flight.optimistic = false;
            discarded.push(flight.event.clone());
        }
        discarded
    }

    /// Drop every in-flight request, e.g. on teardown or a lost connection.
    pub fn discard_all(&mut self) -> Vec<InFlight> {
        self.in_flight.drain(..).collect()
    }

    pub fn is_loading(&self, event: &str) -> bool {
        self.in_flight
            .iter()
            .any(|f| f.event == event && !f.skip_loading)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}
