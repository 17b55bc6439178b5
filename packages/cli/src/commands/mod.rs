pub mod connect;
pub mod diff;
pub mod init;
pub mod replay;

pub use connect::{connect, ConnectArgs};
pub use diff::{diff, DiffArgs};
pub use init::{init, InitArgs};
pub use replay::{replay, ReplayArgs};
