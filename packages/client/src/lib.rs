pub mod cache;
pub mod config;
pub mod debounce;
pub mod dispatcher;
pub mod errors;
pub mod hooks;
pub mod runtime;
pub mod session;
pub mod transport;
pub mod version;

#[cfg(test)]
mod tests_runtime;
#[cfg(test)]
mod tests_session;

pub use cache::ResponseCache;
pub use config::{CacheSettings, ClientConfig, ReconnectConfig, TierConfig};
pub use dispatcher::{EventDispatcher, InFlight, Prepared, RequestId};
pub use errors::{ClientError, ClientResult, TransportError};
pub use hooks::{NoopHooks, UploadLink, ViewHooks};
pub use runtime::{ClientHandle, ClientRuntime, Command, RunOutcome, RunReport};
pub use session::{Effect, Heartbeat, SessionController, SessionStats};
pub use transport::{
    DefaultTransportFactory, Tier, Transport, TransportEvent, TransportFactory, TransportManager,
};
pub use version::{TrackerState, VersionCheck, VersionTracker};
