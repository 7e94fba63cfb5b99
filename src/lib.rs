//! z21link - Client for the Z21 command station LAN protocol
//!
//! Talks to a Roco/Fleischmann Z21 over UDP: encodes commands, frames and
//! decodes the telegrams the station sends back, and keeps the broadcast
//! subscription alive while the station is reachable.

pub mod config;
pub mod network;
pub mod protocol;

pub use config::Config;
pub use network::{ClientError, ClientResult, NetworkConfig, Z21Client};
pub use protocol::{Command, Z21Event};
