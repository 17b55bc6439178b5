/// Protocol tests for the session controller, driven without I/O
use crate::config::ClientConfig;
use crate::hooks::ViewHooks;
use crate::session::{Effect, Heartbeat, SessionController};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tether_protocol::{decode_server, CacheConfig, CachePolicy, ClientMessage, Params, ProtocolError, ServerMessage};
use tether_vdom::{Address, LiveTree, NodeId, Patch, VNode};

#[derive(Clone, Default)]
struct Recorder {
    log: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    fn entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

impl ViewHooks for Recorder {
    fn subtree_mutated(&mut self, _tree: &LiveTree, roots: &[NodeId]) {
        self.record(format!("mutated {}", roots.len()));
    }

    fn connection_changed(&mut self, connected: bool) {
        self.record(format!("connected {}", connected));
    }

    fn server_error(&mut self, message: &str, _detail: &Params) {
        self.record(format!("error {}", message));
    }

    fn loading_changed(&mut self, event: &str, loading: bool) {
        self.record(format!("loading {} {}", event, loading));
    }

    fn optimistic_discarded(&mut self, event: &str) {
        self.record(format!("discarded {}", event));
    }

    fn push_event(&mut self, event: &str, payload: &Value) {
        self.record(format!("push {} {}", event, payload));
    }

    fn warning(&mut self, message: &str) {
        self.record(format!("warning {}", message));
    }
}

fn params(value: Value) -> Params {
    value.as_object().cloned().unwrap()
}

fn counter(count: &str) -> VNode {
    VNode::element("div")
        .with_stable_id("root")
        .with_child(VNode::element("span").with_stable_id("n").with_child(VNode::text(count)))
        .with_child(
            VNode::element("button")
                .with_stable_id("inc")
                .with_attr("dj-click", "increment")
                .with_attr("dj-value-step", "1")
                .with_child(VNode::text("+")),
        )
}

fn mounted(version: u64, tree: VNode) -> ServerMessage {
    ServerMessage::Mount {
        session_id: Some("s1".to_string()),
        view: "counter".to_string(),
        version,
        tree: Some(tree),
        cache_config: None,
    }
}

fn session(full_state: bool) -> (SessionController, Recorder) {
    let recorder = Recorder::default();
    let config = ClientConfig {
        view: "counter".to_string(),
        ..ClientConfig::default()
    };
    let mut session = SessionController::new(&config, Box::new(recorder.clone()));
    session.connection_opened(full_state);
    (session, recorder)
}

/// Event messages among `effects`.
fn sent_events(effects: &[Effect]) -> Vec<ClientMessage> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            Effect::SendEvent { message, .. } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

fn text_at(session: &SessionController, stable_id: &str) -> String {
    let tree = session.tree().unwrap();
    tree.text_content(tree.by_stable_id(stable_id).unwrap())
}

#[test]
fn test_open_sends_mount() {
    let config = ClientConfig {
        view: "counter".to_string(),
        ..ClientConfig::default()
    };
    let mut session = SessionController::new(&config, Box::new(Recorder::default()));
    let effects = session.connection_opened(true);
    assert_eq!(
        effects,
        vec![Effect::Send(ClientMessage::mount("counter", Params::new()))]
    );
    assert!(session.is_connected());
}

#[test]
fn test_mount_then_contiguous_patch() {
    let (mut session, recorder) = session(true);
    let now = Instant::now();

    assert!(session.handle_message(mounted(1, counter("0")), now).is_empty());
    assert_eq!(session.version(), Some(1));
    assert_eq!(session.session_id(), Some("s1"));

    let effects = session.handle_message(
        ServerMessage::patch(2, vec![Patch::set_text(Address::id("n"), "1")]),
        now,
    );
    assert!(effects.is_empty());
    assert_eq!(text_at(&session, "n"), "1");
    assert_eq!(session.version(), Some(2));
    assert!(recorder.entries().contains(&"mutated 1".to_string()));
}

#[test]
fn test_gap_requests_full_state_and_recovers() {
    let (mut session, recorder) = session(true);
    let now = Instant::now();
    session.handle_message(mounted(1, counter("0")), now);
    session.dispatch("toggle", params(json!({"_optimistic": true})), now);

    let effects = session.handle_message(
        ServerMessage::patch(3, vec![Patch::set_text(Address::id("n"), "9")]),
        now,
    );
    assert_eq!(effects, vec![Effect::Send(ClientMessage::RequestHtml)]);
    assert_eq!(text_at(&session, "n"), "0");
    assert!(recorder.entries().contains(&"discarded toggle".to_string()));
    assert!(session.recovery_deadline().is_some());

    // Refused until the recovery payload lands
    session.handle_message(ServerMessage::patch(2, vec![Patch::set_text(Address::id("n"), "2")]), now);
    assert_eq!(text_at(&session, "n"), "0");

    session.handle_message(
        ServerMessage::HtmlRecovery {
            version: 3,
            tree: counter("3"),
        },
        now,
    );
    assert_eq!(text_at(&session, "n"), "3");
    assert_eq!(session.version(), Some(3));
    assert!(session.recovery_deadline().is_none());

    session.handle_message(ServerMessage::patch(4, vec![Patch::set_text(Address::id("n"), "4")]), now);
    assert_eq!(text_at(&session, "n"), "4");
    assert_eq!(session.stats().recoveries_completed, 1);
}

#[test]
fn test_failed_batch_requests_full_state() {
    let (mut session, _) = session(true);
    let now = Instant::now();
    session.handle_message(mounted(1, counter("0")), now);

    let effects = session.handle_message(
        ServerMessage::patch(2, vec![Patch::set_text(Address::id("missing"), "x")]),
        now,
    );
    assert_eq!(effects, vec![Effect::Send(ClientMessage::RequestHtml)]);
    assert!(session.tracker().is_recovering());
    assert_eq!(session.stats().patch_failures, 1);
}

#[test]
fn test_desync_without_full_state_forces_reload() {
    let (mut session, _) = session(false);
    let now = Instant::now();
    session.handle_message(mounted(1, counter("0")), now);

    let effects = session.handle_message(ServerMessage::patch(5, Vec::new()), now);
    assert!(matches!(effects.as_slice(), [Effect::HardReload { .. }]));
}

#[test]
fn test_unanswered_recovery_times_out() {
    let (mut session, _) = session(true);
    let now = Instant::now();
    session.handle_message(mounted(1, counter("0")), now);
    session.handle_message(ServerMessage::patch(7, Vec::new()), now);

    let deadline = session.next_deadline().unwrap();
    assert!(session.check_timeouts(deadline - Duration::from_millis(1)).is_empty());
    assert_eq!(
        session.check_timeouts(deadline),
        vec![Effect::HardReload {
            reason: "recovery timed out".to_string()
        }]
    );
}

#[test]
fn test_hotreload_patch_skips_contiguity() {
    let (mut session, _) = session(true);
    let now = Instant::now();
    session.handle_message(mounted(1, counter("0")), now);

    let effects = session.handle_message(
        ServerMessage::Patch {
            version: 50,
            patches: vec![Patch::set_text(Address::id("n"), "reloaded")],
            broadcast: false,
            hotreload: true,
            file: Some("counter.html".to_string()),
            cache_request_id: None,
        },
        now,
    );
    assert!(effects.is_empty());
    assert_eq!(text_at(&session, "n"), "reloaded");
    assert_eq!(session.version(), Some(50));
}

#[test]
fn test_fire_dispatches_bound_handler() {
    let (mut session, recorder) = session(true);
    let now = Instant::now();
    session.handle_message(mounted(1, counter("0")), now);

    let tree = session.tree().unwrap();
    let button = tree.by_stable_id("inc").unwrap();
    let label = tree.children(button)[0];

    let effects = session.fire(label, "click", now);
    assert_eq!(
        sent_events(&effects),
        vec![ClientMessage::event("increment", params(json!({"step": "1"})))]
    );
    assert!(session.is_loading("increment"));
    assert!(recorder.entries().contains(&"loading increment true".to_string()));

    session.handle_message(ServerMessage::patch(2, vec![Patch::set_text(Address::id("n"), "1")]), now);
    assert!(!session.is_loading("increment"));
    assert!(recorder.entries().contains(&"loading increment false".to_string()));

    assert!(session.fire(label, "dblclick", now).is_empty());
}

#[test]
fn test_cached_event_served_locally() {
    let (mut session, _) = session(true);
    let now = Instant::now();
    let mut cache_config = CacheConfig::new();
    cache_config.insert(
        "search".to_string(),
        CachePolicy {
            ttl: 60,
            key_params: vec![],
        },
    );
    session.handle_message(
        ServerMessage::Mount {
            session_id: None,
            view: "counter".to_string(),
            version: 1,
            tree: Some(counter("0")),
            cache_config: Some(cache_config),
        },
        now,
    );

    let effects = session.dispatch("search", params(json!({"q": "cat"})), now);
    let request_id = match effects.as_slice() {
        [Effect::SendEvent {
            message: ClientMessage::Event { params, .. },
            ..
        }] => {
            params["_cacheRequestId"].as_str().unwrap().to_string()
        }
        other => panic!("unexpected {:?}", other),
    };

    session.handle_message(
        ServerMessage::Patch {
            version: 2,
            patches: vec![Patch::set_text(Address::id("n"), "cats")],
            broadcast: false,
            hotreload: false,
            file: None,
            cache_request_id: Some(request_id),
        },
        now,
    );
    session.handle_message(ServerMessage::patch(3, vec![Patch::set_text(Address::id("n"), "other")]), now);

    let effects = session.dispatch("search", params(json!({"q": "cat", "_skipLoading": true})), now);
    assert!(effects.is_empty());
    assert_eq!(text_at(&session, "n"), "cats");
    assert_eq!(session.stats().cache_hits, 1);
    // Cached replies leave the version alone
    assert_eq!(session.version(), Some(3));
}

#[test]
fn test_debounced_dispatch_coalesces() {
    let recorder = Recorder::default();
    let mut config = ClientConfig {
        view: "search".to_string(),
        ..ClientConfig::default()
    };
    config.debounce.insert("search".to_string(), 300);
    let mut session = SessionController::new(&config, Box::new(recorder));
    session.connection_opened(true);
    let now = Instant::now();

    assert!(session.dispatch("search", params(json!({"q": "c"})), now).is_empty());
    assert!(session
        .dispatch("search", params(json!({"q": "cat"})), now + Duration::from_millis(100))
        .is_empty());

    let deadline = session.next_deadline().unwrap();
    assert_eq!(deadline, now + Duration::from_millis(400));
    assert_eq!(
        sent_events(&session.check_timeouts(deadline)),
        vec![ClientMessage::event("search", params(json!({"q": "cat"})))]
    );

    session.dispatch("search", params(json!({"q": "dog"})), now);
    session.teardown();
    assert!(session.next_deadline().is_none());
}

#[test]
fn test_server_error_clears_loading() {
    let (mut session, recorder) = session(true);
    let now = Instant::now();
    session.handle_message(mounted(1, counter("0")), now);
    session.dispatch("save", Params::new(), now);

    let effects = session.handle_message(
        serde_json::from_value(json!({"type": "error", "message": "Permission denied"})).unwrap(),
        now,
    );
    assert!(effects.is_empty());
    assert!(!session.is_loading("save"));
    let entries = recorder.entries();
    assert!(entries.contains(&"error Permission denied".to_string()));
    assert!(entries.contains(&"loading save false".to_string()));
}

#[test]
fn test_heartbeat_goes_stale_without_pong() {
    let (mut session, _) = session(true);
    assert_eq!(session.heartbeat(), Heartbeat::Ping);
    session.handle_message(ServerMessage::Pong, Instant::now());
    assert_eq!(session.heartbeat(), Heartbeat::Ping);
    assert_eq!(session.heartbeat(), Heartbeat::Ping);
    assert_eq!(session.heartbeat(), Heartbeat::Stale);
}

#[test]
fn test_misc_server_messages() {
    let (mut session, recorder) = session(true);
    let now = Instant::now();
    session.handle_message(mounted(1, counter("0")), now);

    session.handle_message(
        ServerMessage::PushEvent {
            event: "flash".to_string(),
            payload: json!({"level": "info"}),
        },
        now,
    );
    session.handle_message(ServerMessage::RateLimitExceeded { message: None }, now);
    assert_eq!(
        session.handle_message(ServerMessage::Hotreload { file: None }, now),
        vec![Effect::Send(ClientMessage::RequestHtml)]
    );
    assert!(matches!(
        session.handle_message(ServerMessage::Reload { file: None }, now).as_slice(),
        [Effect::HardReload { .. }]
    ));

    let entries = recorder.entries();
    assert!(entries.contains(&r#"push flash {"level":"info"}"#.to_string()));
    assert!(entries.contains(&"warning rate limit exceeded".to_string()));
}

#[test]
fn test_malformed_message_is_dropped() {
    let (mut session, _) = session(true);
    let effects = session.handle_inbound(Err(ProtocolError::UnknownType("bogus".to_string())), Instant::now());
    assert!(effects.is_empty());
    assert_eq!(session.stats().malformed, 1);
}

#[test]
fn test_remount_morphs_existing_tree() {
    let (mut session, _) = session(true);
    let now = Instant::now();
    session.handle_message(mounted(1, counter("0")), now);
    let span = session.tree().unwrap().by_stable_id("n").unwrap();

    session.connection_lost();
    session.connection_opened(true);
    session.handle_message(mounted(1, counter("5")), now);

    let tree = session.tree().unwrap();
    assert_eq!(tree.by_stable_id("n"), Some(span));
    assert_eq!(text_at(&session, "n"), "5");
    assert_eq!(session.stats().morphs, 1);
}

#[test]
fn test_undelivered_event_clears_loading_and_keeps_replies_paired() {
    let (mut session, recorder) = session(true);
    let now = Instant::now();
    session.handle_message(mounted(1, counter("0")), now);

    let failed = match session.dispatch("a", Params::new(), now).as_slice() {
        [Effect::SendEvent { request, .. }] => *request,
        other => panic!("unexpected {:?}", other),
    };
    session.event_not_sent(failed, "server replied with status 500", now);
    assert!(!session.is_loading("a"));

    session.dispatch("b", Params::new(), now);
    // A reply that carries no correlation id settles "b", the only request
    // the server actually received.
    session.handle_message(ServerMessage::patch(2, vec![Patch::set_text(Address::id("n"), "1")]), now);
    assert!(!session.is_loading("b"));
    assert_eq!(session.dispatcher().in_flight(), 0);

    let loading: Vec<String> = recorder
        .entries()
        .into_iter()
        .filter(|entry| entry.starts_with("loading"))
        .collect();
    assert_eq!(
        loading,
        vec!["loading a true", "loading a false", "loading b true", "loading b false"]
    );
    assert!(recorder
        .entries()
        .contains(&"warning a was not delivered: server replied with status 500".to_string()));

    // Reporting the same request twice is harmless
    session.event_not_sent(failed, "again", now);
    assert_eq!(recorder.entries().iter().filter(|e| e.starts_with("warning")).count(), 1);
}

fn search_form(value: &str) -> VNode {
    VNode::element("div").with_stable_id("root").with_child(
        VNode::element("input")
            .with_stable_id("q")
            .with_attr("name", "q")
            .with_attr("value", value),
    )
}

#[test]
fn test_focused_value_survives_local_updates_but_not_broadcasts() {
    let (mut session, _) = session(true);
    let now = Instant::now();
    session.handle_message(mounted(1, search_form("typed locally")), now);
    let input = session.tree().unwrap().by_stable_id("q").unwrap();
    session.set_focus(Some(input));
    let value = |session: &SessionController| session.tree().unwrap().attr(input, "value").map(str::to_string);

    session.handle_message(
        ServerMessage::patch(2, vec![Patch::set_attribute(Address::id("q"), "value", "server")]),
        now,
    );
    assert_eq!(value(&session).as_deref(), Some("typed locally"));
    assert_eq!(session.version(), Some(2));

    session.handle_message(
        ServerMessage::Patch {
            version: 3,
            patches: vec![Patch::set_attribute(Address::id("q"), "value", "from a peer")],
            broadcast: true,
            hotreload: false,
            file: None,
            cache_request_id: None,
        },
        now,
    );
    assert_eq!(value(&session).as_deref(), Some("from a peer"));

    // Same rule for full-tree updates
    session.handle_message(
        ServerMessage::HtmlUpdate {
            version: 4,
            tree: search_form("server"),
            broadcast: false,
            cache_request_id: None,
        },
        now,
    );
    assert_eq!(value(&session).as_deref(), Some("from a peer"));

    session.handle_message(
        ServerMessage::HtmlUpdate {
            version: 5,
            tree: search_form("peer again"),
            broadcast: true,
            cache_request_id: None,
        },
        now,
    );
    assert_eq!(value(&session).as_deref(), Some("peer again"));
    assert_eq!(session.tree().unwrap().by_stable_id("q"), Some(input));
}

#[test]
fn test_broadcast_full_update_leaves_requests_in_flight() {
    let (mut session, _) = session(true);
    let now = Instant::now();
    session.handle_message(mounted(1, counter("0")), now);
    session.dispatch("increment", Params::new(), now);

    session.handle_message(
        ServerMessage::HtmlUpdate {
            version: 2,
            tree: counter("7"),
            broadcast: true,
            cache_request_id: None,
        },
        now,
    );
    assert_eq!(text_at(&session, "n"), "7");
    assert!(session.is_loading("increment"));
}

#[test]
fn test_recovery_from_markup_payload() {
    let (mut session, _) = session(true);
    let now = Instant::now();
    session.handle_message(mounted(1, counter("0")), now);
    let span = session.tree().unwrap().by_stable_id("n").unwrap();

    let effects = session.handle_message(ServerMessage::patch(4, Vec::new()), now);
    assert_eq!(effects, vec![Effect::Send(ClientMessage::RequestHtml)]);

    let recovery = decode_server(
        r#"{"type": "html_recovery", "version": 4, "html": "<div data-dj-id=\"root\">\n  <span data-dj-id=\"n\">4</span>\n  <button data-dj-id=\"inc\" dj-click=\"increment\" dj-value-step=\"1\">+</button>\n</div>"}"#,
    );
    assert!(session.handle_inbound(recovery, now).is_empty());

    assert_eq!(text_at(&session, "n"), "4");
    assert_eq!(session.tree().unwrap().by_stable_id("n"), Some(span));
    assert_eq!(session.version(), Some(4));
    assert!(!session.tracker().is_recovering());
    assert!(session.recovery_deadline().is_none());
    assert_eq!(session.stats().recoveries_completed, 1);
}

#[test]
fn test_last_representable_version_desyncs_instead_of_overflowing() {
    let (mut session, _) = session(true);
    let now = Instant::now();
    session.handle_message(mounted(u64::MAX, counter("0")), now);

    let effects = session.handle_message(ServerMessage::patch(0, vec![Patch::set_text(Address::id("n"), "x")]), now);
    assert_eq!(effects, vec![Effect::Send(ClientMessage::RequestHtml)]);
    assert_eq!(text_at(&session, "n"), "0");
    assert_eq!(session.stats().desyncs, 1);
}
