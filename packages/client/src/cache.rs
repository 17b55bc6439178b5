//! # Response Cache
//!
//! Client-side cache for read-mostly, parameterised events. Only events the
//! server declared cacheable on mount are considered. Entries expire by TTL
//! and are evicted in insertion order once the capacity is reached; reads do
//! not refresh an entry's position.
//!
//! A cacheable request that misses is tagged with a correlation id and
//! tracked as pending until its reply arrives or its lifetime runs out.

use lru::LruCache;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tether_protocol::{CacheConfig, CachePolicy, Params};
use tether_vdom::Patch;

/// Parameter carrying the correlation id of a cacheable request.
pub const CACHE_REQUEST_ID_PARAM: &str = "_cacheRequestId";

#[derive(Debug, Clone)]
struct CacheEntry {
    patches: Vec<Patch>,
    expires_at: Instant,
}

#[derive(Debug, Clone)]
struct PendingRequest {
    key: String,
    ttl: Duration,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct ResponseCache {
    entries: LruCache<String, CacheEntry>,
    policies: CacheConfig,
    pending: HashMap<String, PendingRequest>,
    pending_ttl: Duration,
    next_request: u64,
}

impl ResponseCache {
    pub fn new(capacity: NonZeroUsize, pending_ttl: Duration) -> Self {
        Self {
            entries: LruCache::new(capacity),
            policies: CacheConfig::new(),
            pending: HashMap::new(),
            pending_ttl,
            next_request: 0,
        }
    }

    /// Replace the per-event policies (delivered with `mount`).
    pub fn set_policies(&mut self, policies: CacheConfig) {
        tracing::debug!(events = policies.len(), "cache policies updated");
        self.policies = policies;
    }

    pub fn policy(&self, event: &str) -> Option<&CachePolicy> {
        self.policies.get(event)
    }

    pub fn is_cacheable(&self, event: &str) -> bool {
        self.policies.contains_key(event)
    }

    /// Cache key for `event` with `params`: the event name and the sorted
    /// key parameters. Without declared key parameters every parameter not
    /// starting with `_` counts.
    pub fn cache_key(&self, event: &str, params: &Params) -> String {
        let key_params = self
            .policy(event)
            .map(|p| p.key_params.as_slice())
            .unwrap_or(&[]);

        let selected: BTreeMap<&str, &Value> = if key_params.is_empty() {
            params
                .iter()
                .filter(|(k, _)| !k.starts_with('_'))
                .map(|(k, v)| (k.as_str(), v))
                .collect()
        } else {
            key_params
                .iter()
                .filter_map(|k| params.get(k).map(|v| (k.as_str(), v)))
                .collect()
        };

        let encoded = serde_json::to_string(&selected).unwrap_or_default();
        format!("{}:{}", event, encoded)
    }

    /// Live entry for `key`. Expired entries are dropped on read.
    pub fn lookup(&mut self, key: &str, now: Instant) -> Option<Vec<Patch>> {
        let expired = match self.entries.peek(key) {
            Some(entry) if entry.expires_at > now => return Some(entry.patches.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.pop(key);
            tracing::debug!(key = %key, "cache entry expired");
        }
        None
    }

    /// Register a cacheable request that missed. Returns its correlation id.
    pub fn begin_request(&mut self, key: String, ttl: Duration, now: Instant) -> String {
        self.next_request += 1;
        let request_id = format!("cache_{}", self.next_request);
        self.pending.insert(
            request_id.clone(),
            PendingRequest {
                key,
                ttl,
                expires_at: now + self.pending_ttl,
            },
        );
        request_id
    }

    /// Resolve a pending request. With `patches` the reply is stored under
    /// the request's key. Returns false for unknown or already expired ids.
    pub fn complete(&mut self, request_id: &str, patches: Option<Vec<Patch>>, now: Instant) -> bool {
        let pending = match self.pending.remove(request_id) {
            Some(pending) => pending,
            None => return false,
        };
        if pending.expires_at <= now {
            tracing::debug!(request_id, "reply arrived after pending lifetime");
            return false;
        }
        if let Some(patches) = patches {
            tracing::debug!(key = %pending.key, "caching response");
            self.entries.put(
                pending.key,
                CacheEntry {
                    patches,
                    expires_at: now + pending.ttl,
                },
            );
        }
        true
    }

    /// Drop pending requests whose lifetime ran out.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, p| p.expires_at > now);
        let dropped = before - self.pending.len();
        if dropped > 0 {
            tracing::debug!(dropped, "dropped unanswered cache requests");
        }
        dropped
    }

    pub fn next_pending_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.expires_at).min()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.pending.clear();
    }
}
