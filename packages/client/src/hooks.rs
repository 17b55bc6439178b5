//! Collaborator seams: view hooks observe what the session does to the
//! tree and the connection; the upload link exposes the primary connection
//! to an upload subsystem without interpreting its payloads.

use serde_json::Value;
use tether_protocol::Params;
use tether_vdom::{LiveTree, NodeId};

/// Notifications from the session to the embedding view. Every method has
/// a no-op default.
pub trait ViewHooks: Send {
    /// A patch batch or reconciliation pass mutated these subtrees.
    fn subtree_mutated(&mut self, _tree: &LiveTree, _roots: &[NodeId]) {}

    fn connection_changed(&mut self, _connected: bool) {}

    /// The server rejected an event.
    fn server_error(&mut self, _message: &str, _detail: &Params) {}

    fn loading_changed(&mut self, _event: &str, _loading: bool) {}

    /// A local prediction for `event` must be reverted.
    fn optimistic_discarded(&mut self, _event: &str) {}

    fn push_event(&mut self, _event: &str, _payload: &Value) {}

    /// Non-fatal condition worth showing, e.g. rate limiting.
    fn warning(&mut self, _message: &str) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl ViewHooks for NoopHooks {}

/// Binary side channel on the primary connection.
pub trait UploadLink {
    fn is_open(&self) -> bool;

    /// Queue a binary frame. Returns false when it cannot be delivered.
    fn send_binary(&self, data: Vec<u8>) -> bool;
}
