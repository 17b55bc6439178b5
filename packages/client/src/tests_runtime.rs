/// Runtime tests over the in-memory loopback transport
use crate::config::{ClientConfig, ReconnectConfig};
use crate::errors::ClientError;
use crate::hooks::{UploadLink, ViewHooks};
use crate::runtime::{ClientRuntime, RunOutcome};
use crate::transport::loopback::LoopbackNetwork;
use crate::transport::Tier;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tether_protocol::{ClientMessage, Params, ServerMessage};
use tether_vdom::{Address, LiveTree, NodeId, Patch, VNode};

#[derive(Clone, Default)]
struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    fn count(&self, entry: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == entry).count()
    }
}

impl ViewHooks for Log {
    fn subtree_mutated(&mut self, _tree: &LiveTree, _roots: &[NodeId]) {
        self.0.lock().unwrap().push("mutated".to_string());
    }

    fn loading_changed(&mut self, event: &str, loading: bool) {
        self.0.lock().unwrap().push(format!("{} {}", event, loading));
    }

    fn connection_changed(&mut self, connected: bool) {
        let entry = if connected { "up" } else { "down" };
        self.0.lock().unwrap().push(entry.to_string());
    }
}

fn config() -> ClientConfig {
    ClientConfig {
        view: "counter".to_string(),
        reconnect: ReconnectConfig {
            max_attempts: 5,
            base_delay_ms: 1,
            max_delay_ms: 2,
        },
        ..ClientConfig::default()
    }
}

fn counter(count: &str) -> VNode {
    VNode::element("div")
        .with_child(VNode::element("span").with_stable_id("n").with_child(VNode::text(count)))
}

/// Answers mounts with version 1 and `increment` with version 2.
fn counter_server(network: &LoopbackNetwork) {
    network.respond_with(|message| match message {
        ClientMessage::Mount { view, .. } => vec![ServerMessage::Mount {
            session_id: Some("s1".to_string()),
            view: view.clone(),
            version: 1,
            tree: Some(counter("0")),
            cache_config: None,
        }],
        ClientMessage::Event { event, .. } if event == "increment" => vec![ServerMessage::patch(
            2,
            vec![Patch::set_text(Address::id("n"), "1")],
        )],
        ClientMessage::Event { event, .. } if event == "boom" => vec![ServerMessage::Reload { file: None }],
        _ => Vec::new(),
    });
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

fn mounts_on(network: &LoopbackNetwork, tier: Tier) -> usize {
    network
        .sent()
        .iter()
        .filter(|(t, m)| *t == tier && matches!(m, ClientMessage::Mount { .. }))
        .count()
}

#[tokio::test]
async fn test_counter_end_to_end() {
    let network = LoopbackNetwork::new();
    counter_server(&network);
    let log = Log::default();
    let (runtime, handle) =
        ClientRuntime::with_factory(config(), Box::new(log.clone()), Box::new(network.clone()));
    let task = tokio::spawn(runtime.run());

    wait_for(|| log.count("mutated") == 1).await;
    handle.dispatch("increment", Params::new()).unwrap();
    wait_for(|| log.count("mutated") == 2).await;
    handle.shutdown().unwrap();

    let report = task.await.unwrap().unwrap();
    assert_eq!(report.outcome, RunOutcome::Closed);
    let tree = report.session.tree().unwrap();
    assert_eq!(tree.text_content(tree.by_stable_id("n").unwrap()), "1");
    assert_eq!(report.session.version(), Some(2));
    assert_eq!(report.failovers, 0);
}

#[tokio::test]
async fn test_exhausted_primary_fails_over_once() {
    let network = LoopbackNetwork::new();
    network.refuse(Tier::Socket);
    counter_server(&network);
    let log = Log::default();
    let (runtime, handle) =
        ClientRuntime::with_factory(config(), Box::new(log.clone()), Box::new(network.clone()));
    let task = tokio::spawn(runtime.run());

    wait_for(|| log.count("mutated") == 1).await;
    handle.shutdown().unwrap();
    let report = task.await.unwrap().unwrap();

    assert_eq!(report.failovers, 1);
    // Initial attempt plus five reconnects, then never again
    assert_eq!(network.attempts(Tier::Socket), 6);
    assert_eq!(network.attempts(Tier::PushStream), 1);
    assert_eq!(network.attempts(Tier::Polling), 0);
    assert_eq!(mounts_on(&network, Tier::PushStream), 1);
}

#[tokio::test]
async fn test_all_tiers_exhausted_is_terminal() {
    let network = LoopbackNetwork::new();
    for tier in Tier::ALL {
        network.refuse(tier);
    }
    let mut config = config();
    config.reconnect.max_attempts = 1;
    let (runtime, _handle) =
        ClientRuntime::with_factory(config, Box::new(Log::default()), Box::new(network.clone()));

    let result = runtime.run().await;
    assert!(matches!(result, Err(ClientError::ConnectionExhausted(Tier::Polling))));
    for tier in Tier::ALL {
        assert_eq!(network.attempts(tier), 2);
    }
}

#[tokio::test]
async fn test_dropped_connection_reconnects_and_remounts() {
    let network = LoopbackNetwork::new();
    counter_server(&network);
    let log = Log::default();
    let (runtime, handle) =
        ClientRuntime::with_factory(config(), Box::new(log.clone()), Box::new(network.clone()));
    let task = tokio::spawn(runtime.run());

    wait_for(|| log.count("up") == 1).await;
    network.sever("network unreachable");
    wait_for(|| log.count("up") == 2).await;
    wait_for(|| mounts_on(&network, Tier::Socket) == 2).await;
    handle.shutdown().unwrap();

    let report = task.await.unwrap().unwrap();
    assert_eq!(log.count("down"), 1);
    assert_eq!(report.failovers, 0);
    assert_eq!(network.attempts(Tier::Socket), 2);
}

#[tokio::test]
async fn test_upload_link_uses_primary_connection() {
    let network = LoopbackNetwork::new();
    counter_server(&network);
    let log = Log::default();
    let (runtime, handle) =
        ClientRuntime::with_factory(config(), Box::new(log.clone()), Box::new(network.clone()));
    assert!(!handle.is_open());
    let task = tokio::spawn(runtime.run());

    wait_for(|| handle.is_open()).await;
    assert!(handle.send_binary(vec![1, 2, 3]));
    wait_for(|| !network.binary().is_empty()).await;
    handle.shutdown().unwrap();

    task.await.unwrap().unwrap();
    assert_eq!(network.binary(), vec![vec![1, 2, 3]]);
    assert!(!handle.is_open());
}

#[tokio::test]
async fn test_server_reload_ends_the_run() {
    let network = LoopbackNetwork::new();
    counter_server(&network);
    let log = Log::default();
    let (runtime, handle) =
        ClientRuntime::with_factory(config(), Box::new(log.clone()), Box::new(network.clone()));
    let task = tokio::spawn(runtime.run());

    wait_for(|| log.count("mutated") == 1).await;
    handle.dispatch("boom", Params::new()).unwrap();

    let report = task.await.unwrap().unwrap();
    assert_eq!(
        report.outcome,
        RunOutcome::Reload {
            reason: "server requested reload".to_string()
        }
    );
}

#[tokio::test]
async fn test_shutdown_during_backoff() {
    let network = LoopbackNetwork::new();
    network.refuse(Tier::Socket);
    let mut config = config();
    config.tiers.push_stream = false;
    config.tiers.polling = false;
    config.reconnect.base_delay_ms = 60_000;
    config.reconnect.max_delay_ms = 60_000;
    let (runtime, handle) =
        ClientRuntime::with_factory(config, Box::new(Log::default()), Box::new(network.clone()));
    let task = tokio::spawn(runtime.run());

    wait_for(|| network.attempts(Tier::Socket) == 1).await;
    handle.shutdown().unwrap();

    let report = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(report.outcome, RunOutcome::Closed);
    assert_eq!(network.attempts(Tier::Socket), 1);
}

#[tokio::test]
async fn test_rejected_send_does_not_steal_the_next_reply() {
    let network = LoopbackNetwork::new();
    counter_server(&network);
    network.reject_event("save");
    let log = Log::default();
    let (runtime, handle) =
        ClientRuntime::with_factory(config(), Box::new(log.clone()), Box::new(network.clone()));
    let task = tokio::spawn(runtime.run());

    wait_for(|| log.count("mutated") == 1).await;
    handle.dispatch("save", Params::new()).unwrap();
    handle.dispatch("increment", Params::new()).unwrap();
    wait_for(|| log.count("increment false") == 1).await;
    handle.shutdown().unwrap();

    let report = task.await.unwrap().unwrap();
    assert_eq!(report.outcome, RunOutcome::Closed);
    assert_eq!(
        log.0.lock().unwrap().clone(),
        vec![
            "up",
            "mutated",
            "save true",
            "save false",
            "increment true",
            "mutated",
            "increment false",
            "down"
        ]
    );
    assert_eq!(report.session.dispatcher().in_flight(), 0);
    // The connection survived the rejection
    assert_eq!(network.attempts(Tier::Socket), 1);
}
