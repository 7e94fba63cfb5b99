//! Network module - Handles UDP communication with the command station
//!
//! Provides:
//! - Transport abstraction over a connected UDP socket
//! - Liveness probing and broadcast subscription renewal
//! - The client engine tying framing, decoding and commands together

mod client;
mod liveness;
mod transport;

pub use client::*;
pub use liveness::*;
pub use transport::*;

use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for network operations
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Station UDP port
    pub port: u16,
    /// Local address the socket binds to
    pub bind_address: SocketAddr,
    /// Interval between reachability probes
    pub probe_interval: Duration,
    /// Interval between broadcast subscription renewals
    pub renewal_interval: Duration,
    /// Upper bound for a single probe
    pub probe_timeout: Duration,
    /// Buffered events per subscriber before the oldest are dropped
    pub event_capacity: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: crate::protocol::DEFAULT_PORT,
            bind_address: SocketAddr::from(([0, 0, 0, 0], 0)),
            probe_interval: Duration::from_secs(5),
            renewal_interval: Duration::from_secs(50),
            probe_timeout: Duration::from_secs(2),
            event_capacity: 256,
        }
    }
}

impl NetworkConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    pub fn with_bind_address(mut self, bind_address: SocketAddr) -> Self {
        self.bind_address = bind_address;
        self
    }

    pub fn with_intervals(mut self, probe: Duration, renewal: Duration) -> Self {
        self.probe_interval = probe;
        self.renewal_interval = renewal;
        self
    }

    /// Timer settings for the liveness manager
    pub fn liveness(&self) -> LivenessConfig {
        LivenessConfig {
            probe_interval: self.probe_interval,
            renewal_interval: self.renewal_interval,
            probe_timeout: self.probe_timeout,
        }
    }
}

/// Resolve a hostname to a socket address
pub async fn resolve_host(host: &str, port: u16) -> std::io::Result<SocketAddr> {
    use tokio::net::lookup_host;

    let addr_string = format!("{}:{}", host, port);
    let mut addrs = lookup_host(&addr_string).await?;

    addrs.next().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Could not resolve host: {}", host),
        )
    })
}
