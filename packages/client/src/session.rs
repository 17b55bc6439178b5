//! # Session Controller
//!
//! The protocol core of a live view, free of I/O. It owns the live tree,
//! the binding table, the version tracker and the event dispatcher, and is
//! driven by discrete inputs: inbound messages, user interactions, timer
//! checks and connection changes. Each input returns the [`Effect`]s the
//! caller must carry out; deadlines are exposed through
//! [`SessionController::next_deadline`].
//!
//! Patch application and reconciliation run to completion inside a single
//! call, so no other input ever observes a half-patched tree.

use crate::cache::ResponseCache;
use crate::config::ClientConfig;
use crate::debounce::Debouncer;
use crate::dispatcher::{EventDispatcher, Prepared, RequestId, DEBOUNCE_PARAM};
use crate::hooks::ViewHooks;
use crate::version::{VersionCheck, VersionTracker};
use indexmap::IndexMap;
use serde_json::Value;
use std::time::{Duration, Instant};
use tether_protocol::{CacheConfig, ClientMessage, Params, ProtocolError, ServerMessage};
use tether_vdom::attrs::{FORM_CONTROLS, VALUE_ATTR};
use tether_vdom::{morph, BindingTable, LiveTree, MorphOptions, NodeId, Patch, PatchEngine, VNode};

/// Heartbeats allowed to go unanswered before the connection counts as lost.
pub const MAX_MISSED_PONGS: u32 = 2;

/// Root tag used when a mount arrives without a tree and none exists yet.
const FALLBACK_ROOT_TAG: &str = "div";

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Send(ClientMessage),
    /// Send an event; report a failed delivery through
    /// [`SessionController::event_not_sent`]
    SendEvent { request: RequestId, message: ClientMessage },
    /// Throw the view away and start over
    HardReload { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heartbeat {
    Ping,
    /// Too many pings went unanswered
    Stale,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub messages: usize,
    pub malformed: usize,
    pub batches_applied: usize,
    pub patches_applied: usize,
    pub patch_failures: usize,
    pub morphs: usize,
    pub cache_hits: usize,
    pub recoveries_requested: usize,
    pub recoveries_completed: usize,
    pub desyncs: usize,
}

pub struct SessionController {
    view: String,
    params: Params,
    tree: Option<LiveTree>,
    bindings: BindingTable,
    engine: PatchEngine,
    tracker: VersionTracker,
    dispatcher: EventDispatcher,
    debouncer: Debouncer,
    debounce: IndexMap<String, Duration>,
    hooks: Box<dyn ViewHooks>,
    session_id: Option<String>,
    connected: bool,
    full_state_supported: bool,
    focused: Option<NodeId>,
    missed_pongs: u32,
    recovery_timeout: Duration,
    recovery_deadline: Option<Instant>,
    stats: SessionStats,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("view", &self.view)
            .field("session_id", &self.session_id)
            .field("connected", &self.connected)
            .field("version", &self.tracker.current())
            .field("stats", &self.stats)
            .finish()
    }
}

impl SessionController {
    pub fn new(config: &ClientConfig, hooks: Box<dyn ViewHooks>) -> Self {
        let cache = ResponseCache::new(config.cache_capacity(), config.pending_ttl());
        let debounce = config
            .debounce
            .keys()
            .filter_map(|event| config.debounce_window(event).map(|window| (event.clone(), window)))
            .collect();

        Self {
            view: config.view.clone(),
            params: config.params.clone(),
            tree: None,
            bindings: BindingTable::new(),
            engine: PatchEngine::new(),
            tracker: VersionTracker::new(),
            dispatcher: EventDispatcher::new(cache),
            debouncer: Debouncer::new(),
            debounce,
            hooks,
            session_id: None,
            connected: false,
            full_state_supported: false,
            focused: None,
            missed_pongs: 0,
            recovery_timeout: config.recovery_timeout(),
            recovery_deadline: None,
            stats: SessionStats::default(),
        }
    }

    /// Start from a pre-rendered tree.
    pub fn with_tree(mut self, tree: LiveTree) -> Self {
        let root = tree.root();
        self.bindings.rescan(&tree, &[root]);
        self.tree = Some(tree);
        self
    }

    pub fn tree(&self) -> Option<&LiveTree> {
        self.tree.as_ref()
    }

    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    pub fn tracker(&self) -> &VersionTracker {
        &self.tracker
    }

    pub fn version(&self) -> Option<u64> {
        self.tracker.current()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_loading(&self, event: &str) -> bool {
        self.dispatcher.is_loading(event)
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Pending full-state request deadline, if a recovery is outstanding.
    pub fn recovery_deadline(&self) -> Option<Instant> {
        self.recovery_deadline
    }

    /// Earliest instant at which [`SessionController::check_timeouts`] has work.
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.recovery_deadline,
            self.debouncer.next_deadline(),
            self.dispatcher.cache().next_pending_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    // ---- connection ----

    /// A transport opened. Versions restart with the new mount.
    pub fn connection_opened(&mut self, full_state_supported: bool) -> Vec<Effect> {
        self.connected = true;
        self.full_state_supported = full_state_supported;
        self.missed_pongs = 0;
        self.tracker.clear();
        self.recovery_deadline = None;
        self.hooks.connection_changed(true);
        tracing::debug!(view = %self.view, "mounting view");
        vec![Effect::Send(ClientMessage::mount(self.view.clone(), self.params.clone()))]
    }

    pub fn connection_lost(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;
        self.recovery_deadline = None;
        self.clear_in_flight();
        self.hooks.connection_changed(false);
    }

    /// Leave the view: cancel timers and forget in-flight work.
    pub fn teardown(&mut self) {
        let cancelled = self.debouncer.cancel_all();
        if cancelled > 0 {
            tracing::debug!(cancelled, "cancelled debounced events");
        }
        self.connection_lost();
        self.clear_in_flight();
    }

    fn clear_in_flight(&mut self) {
        for flight in self.dispatcher.discard_all() {
            if flight.optimistic {
                self.hooks.optimistic_discarded(&flight.event);
            }
            if !flight.skip_loading {
                self.hooks.loading_changed(&flight.event, false);
            }
        }
    }

    pub fn heartbeat(&mut self) -> Heartbeat {
        if self.missed_pongs >= MAX_MISSED_PONGS {
            tracing::warn!(missed = self.missed_pongs, "heartbeat unanswered");
            return Heartbeat::Stale;
        }
        self.missed_pongs += 1;
        Heartbeat::Ping
    }

    // ---- outbound ----

    /// Entry point for every outbound event.
    pub fn dispatch(&mut self, event: &str, params: Params, now: Instant) -> Vec<Effect> {
        let window = params
            .get(DEBOUNCE_PARAM)
            .and_then(Value::as_u64)
            .map(Duration::from_millis)
            .or_else(|| self.debounce.get(event).copied());

        match window {
            Some(window) if !window.is_zero() => {
                self.debouncer.schedule(event, params, window, now);
                Vec::new()
            }
            _ => self.send_event(event, &params, now),
        }
    }

    /// Send debounced events whose window elapsed.
    pub fn flush_debounced(&mut self, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        for (event, params) in self.debouncer.due(now) {
            effects.extend(self.send_event(&event, &params, now));
        }
        effects
    }

    /// An interaction of `kind` happened on `node`; dispatch the nearest
    /// declared handler.
    pub fn fire(&mut self, node: NodeId, kind: &str, now: Instant) -> Vec<Effect> {
        let tree = match &self.tree {
            Some(tree) => tree,
            None => return Vec::new(),
        };
        let (bound, descriptor) = match self.bindings.find(tree, node, kind) {
            Some(found) => found,
            None => {
                tracing::debug!(node = node.as_u64(), kind, "no binding");
                return Vec::new();
            }
        };

        let mut params: Params = descriptor
            .params
            .iter()
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect();
        let is_control = tree
            .tag(node)
            .map(|tag| FORM_CONTROLS.iter().any(|c| c.eq_ignore_ascii_case(tag)))
            .unwrap_or(false);
        if is_control {
            if let Some(value) = tree.attr(node, VALUE_ATTR) {
                params.insert(VALUE_ATTR.to_string(), Value::String(value.to_string()));
            }
        }
        let handler = descriptor.handler.clone();

        tracing::debug!(node = bound.as_u64(), kind, handler = %handler, "binding fired");
        self.dispatch(&handler, params, now)
    }

    pub fn set_focus(&mut self, node: Option<NodeId>) {
        self.focused = node;
    }

    fn send_event(&mut self, event: &str, params: &Params, now: Instant) -> Vec<Effect> {
        let prepared = self.dispatcher.prepare(event, params, now);
        if !self.connected && matches!(prepared, Prepared::Send { .. }) {
            tracing::warn!(event, "not connected, dropping event");
            self.dispatcher.retract_last(now);
            return Vec::new();
        }

        match prepared {
            Prepared::CacheHit { event, patches } => {
                self.stats.cache_hits += 1;
                // Cached replies skip the version check
                if !self.apply_batch(&patches, false) {
                    return self.start_recovery(now, "cached patches failed to apply");
                }
                tracing::debug!(event = %event, "served from cache");
                Vec::new()
            }
            Prepared::Dropped { reason } => {
                tracing::debug!(event, reason, "event dropped");
                Vec::new()
            }
            Prepared::Send { request, message } => {
                if self.dispatcher.is_loading(event) {
                    self.hooks.loading_changed(event, true);
                }
                vec![Effect::SendEvent { request, message }]
            }
        }
    }

    /// An event never reached the server. Its request is abandoned the way
    /// a server-side rejection would be.
    pub fn event_not_sent(&mut self, request: RequestId, reason: &str, now: Instant) {
        if let Some(failed) = self.dispatcher.fail_request(request, now) {
            tracing::warn!(event = %failed.event, reason, "event not delivered");
            self.finish_flight(&failed.event, failed.skip_loading, failed.optimistic);
            self.hooks.warning(&format!("{} was not delivered: {}", failed.event, reason));
        }
    }

    // ---- inbound ----

    /// Feed a decoded (or undecodable) inbound record.
    pub fn handle_inbound(&mut self, message: Result<ServerMessage, ProtocolError>, now: Instant) -> Vec<Effect> {
        match message {
            Ok(message) => self.handle_message(message, now),
            Err(e) => {
                self.stats.malformed += 1;
                tracing::warn!(error = %e, "dropping malformed message");
                Vec::new()
            }
        }
    }

    pub fn handle_message(&mut self, message: ServerMessage, now: Instant) -> Vec<Effect> {
        self.stats.messages += 1;
        tracing::trace!(kind = message.kind(), "inbound");

        match message {
            ServerMessage::Connect { session_id } => {
                tracing::info!(session = ?session_id, "session established");
                self.session_id = session_id;
                Vec::new()
            }
            ServerMessage::Mount {
                session_id,
                view,
                version,
                tree,
                cache_config,
            } => self.on_mount(session_id, &view, version, tree, cache_config),
            ServerMessage::Patch {
                version,
                patches,
                broadcast,
                hotreload,
                cache_request_id,
                ..
            } => self.on_patch(version, &patches, broadcast, hotreload, cache_request_id.as_deref(), now),
            ServerMessage::HtmlRecovery { version, tree } => {
                self.replace_state(version, &tree, false);
                self.stats.recoveries_completed += 1;
                Vec::new()
            }
            ServerMessage::HtmlUpdate {
                version,
                tree,
                broadcast,
                cache_request_id,
            } => {
                self.replace_state(version, &tree, broadcast);
                if !broadcast {
                    self.settle(cache_request_id.as_deref(), None, now);
                }
                Vec::new()
            }
            ServerMessage::Error { .. } => {
                let text = message.error_text().unwrap_or_default().to_string();
                let detail = match &message {
                    ServerMessage::Error { detail, .. } => detail.clone(),
                    _ => Params::new(),
                };
                tracing::warn!(error = %text, "server reported an error");
                if let Some(failed) = self.dispatcher.fail(now) {
                    self.finish_flight(&failed.event, failed.skip_loading, failed.optimistic);
                }
                self.hooks.server_error(&text, &detail);
                Vec::new()
            }
            ServerMessage::Pong => {
                self.missed_pongs = 0;
                Vec::new()
            }
            ServerMessage::Hotreload { file } => {
                tracing::info!(file = ?file, "hot reload signal");
                self.request_full_state(now, "hot reload")
            }
            ServerMessage::Reload { file } => {
                tracing::info!(file = ?file, "server requested reload");
                vec![Effect::HardReload {
                    reason: "server requested reload".to_string(),
                }]
            }
            ServerMessage::Noop => {
                self.settle(None, None, now);
                Vec::new()
            }
            ServerMessage::PushEvent { event, payload } => {
                self.hooks.push_event(&event, &payload);
                Vec::new()
            }
            ServerMessage::RateLimitExceeded { message } => {
                let text = message.unwrap_or_else(|| "rate limit exceeded".to_string());
                tracing::warn!(message = %text, "rate limited by server");
                self.hooks.warning(&text);
                Vec::new()
            }
        }
    }

    fn on_mount(
        &mut self,
        session_id: Option<String>,
        view: &str,
        version: u64,
        tree: Option<VNode>,
        cache_config: Option<CacheConfig>,
    ) -> Vec<Effect> {
        if session_id.is_some() {
            self.session_id = session_id;
        }
        if let Some(policies) = cache_config {
            self.dispatcher.cache_mut().set_policies(policies);
        }

        match tree {
            Some(tree) => self.replace_state(version, &tree, false),
            None => {
                if self.tree.is_none() {
                    tracing::warn!(view, "mounted without a tree; starting empty");
                    self.tree = Some(LiveTree::empty(FALLBACK_ROOT_TAG));
                }
                self.tracker.reset_to(version);
            }
        }
        tracing::info!(view, version, "view mounted");
        Vec::new()
    }

    fn on_patch(
        &mut self,
        version: u64,
        patches: &[Patch],
        broadcast: bool,
        hotreload: bool,
        cache_request_id: Option<&str>,
        now: Instant,
    ) -> Vec<Effect> {
        let check = self.tracker.check_update(version, hotreload);
        let replies = !broadcast && !hotreload;

        if !check.is_applicable() {
            let desync = matches!(check, VersionCheck::Desync { .. });
            if desync {
                self.stats.desyncs += 1;
                for event in self.dispatcher.discard_optimistic() {
                    self.hooks.optimistic_discarded(&event);
                }
            }
            if replies {
                self.settle(cache_request_id, None, now);
            }
            return if desync {
                self.start_recovery(now, "version desync")
            } else {
                Vec::new()
            };
        }

        let success = self.apply_batch(patches, broadcast);
        if replies {
            self.settle(cache_request_id, success.then_some(patches), now);
        }
        if success {
            Vec::new()
        } else {
            self.start_recovery(now, "patch batch failed")
        }
    }

    /// Apply one batch and refresh bindings for what it touched.
    fn apply_batch(&mut self, patches: &[Patch], broadcast: bool) -> bool {
        let tree = match self.tree.as_mut() {
            Some(tree) => tree,
            None => {
                tracing::warn!("patches arrived before mount");
                self.stats.patch_failures += patches.len();
                return false;
            }
        };

        let options = MorphOptions {
            broadcast,
            focused: self.focused.filter(|node| tree.contains(*node)),
        };
        let report = self.engine.apply_with(tree, patches, &options);
        self.stats.batches_applied += 1;
        self.stats.patches_applied += report.applied;
        self.stats.patch_failures += report.failures.len();

        let rescan = self.bindings.rescan(tree, &report.touched);
        if rescan.newly_bound > 0 || rescan.pruned > 0 {
            tracing::debug!(bound = rescan.newly_bound, pruned = rescan.pruned, "bindings refreshed");
        }
        if !report.touched.is_empty() {
            self.hooks.subtree_mutated(tree, &report.touched);
        }

        if report.is_success() {
            true
        } else {
            for failure in &report.failures {
                tracing::warn!(patch = failure.index, phase = ?failure.phase, error = %failure.error, "patch failed");
            }
            false
        }
    }

    /// Adopt a full tree and its version.
    fn replace_state(&mut self, version: u64, desired: &VNode, broadcast: bool) {
        let rebuild = match self.tree.as_mut() {
            None => true,
            Some(tree) => {
                let root = tree.root();
                let options = MorphOptions {
                    broadcast,
                    focused: self.focused.filter(|node| tree.contains(*node)),
                };
                match morph(tree, root, desired, &options) {
                    Ok(stats) => {
                        self.stats.morphs += 1;
                        self.bindings.rescan(tree, &[root]);
                        if !stats.is_noop() {
                            self.hooks.subtree_mutated(tree, &[root]);
                        }
                        false
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "reconciliation failed; rebuilding tree");
                        true
                    }
                }
            }
        };

        if rebuild {
            let tree = LiveTree::new(desired);
            let root = tree.root();
            self.bindings = BindingTable::new();
            self.bindings.rescan(&tree, &[root]);
            self.hooks.subtree_mutated(&tree, &[root]);
            self.tree = Some(tree);
        }
        self.tracker.reset_to(version);
        self.recovery_deadline = None;
    }

    fn settle(&mut self, cache_request_id: Option<&str>, patches: Option<&[Patch]>, now: Instant) {
        if let Some(flight) = self.dispatcher.settle(cache_request_id, patches, now) {
            self.finish_flight(&flight.event, flight.skip_loading, false);
        }
    }

    fn finish_flight(&mut self, event: &str, skip_loading: bool, optimistic: bool) {
        if optimistic {
            self.hooks.optimistic_discarded(event);
        }
        if !skip_loading && !self.dispatcher.is_loading(event) {
            self.hooks.loading_changed(event, false);
        }
    }

    // ---- recovery ----

    fn start_recovery(&mut self, now: Instant, reason: &str) -> Vec<Effect> {
        self.tracker.begin_recovery();
        self.request_full_state(now, reason)
    }

    fn request_full_state(&mut self, now: Instant, reason: &str) -> Vec<Effect> {
        if self.recovery_deadline.is_some() {
            return Vec::new();
        }
        if !self.connected || !self.full_state_supported {
            tracing::warn!(reason, "full state unavailable, forcing reload");
            return vec![Effect::HardReload {
                reason: reason.to_string(),
            }];
        }
        tracing::info!(reason, "requesting full state");
        self.stats.recoveries_requested += 1;
        self.recovery_deadline = Some(now + self.recovery_timeout);
        vec![Effect::Send(ClientMessage::RequestHtml)]
    }

    /// Run whatever timers have expired by `now`.
    pub fn check_timeouts(&mut self, now: Instant) -> Vec<Effect> {
        self.dispatcher.cache_mut().sweep(now);

        if let Some(deadline) = self.recovery_deadline {
            if deadline <= now {
                self.recovery_deadline = None;
                tracing::error!("full state request unanswered, forcing reload");
                return vec![Effect::HardReload {
                    reason: "recovery timed out".to_string(),
                }];
            }
        }

        self.flush_debounced(now)
    }
}
