//! Datagram transport
//!
//! The client only needs four operations from its socket: set the default
//! peer, send one datagram, receive one datagram and close. [`UdpTransport`]
//! provides them over a tokio UDP socket.

use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::RwLock;

/// Largest datagram read in one receive
const RECV_BUFFER_SIZE: usize = 4096;

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport not connected")]
    NotConnected,

    #[error("Transport closed")]
    Closed,
}

impl TransportError {
    /// Socket level failure, as opposed to misuse of the transport
    pub fn is_transport_fault(&self) -> bool {
        matches!(self, TransportError::Io(_))
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Datagram socket used by the client
#[async_trait]
pub trait Transport: Send + Sync {
    /// Set (or reset) the default remote peer
    async fn connect(&self, remote: SocketAddr) -> TransportResult<()>;

    /// Send one datagram to the default peer
    async fn send(&self, datagram: &[u8]) -> TransportResult<usize>;

    /// Wait for the next datagram; `Closed` once the transport is closed
    async fn recv(&self) -> TransportResult<Bytes>;

    async fn close(&self) -> TransportResult<()>;
}

/// Transport statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransportStats {
    pub datagrams_sent: u64,
    pub datagrams_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

#[derive(Debug, Default)]
struct Counters {
    datagrams_sent: AtomicU64,
    datagrams_received: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
}

/// UDP transport bound to a local address
pub struct UdpTransport {
    bind_address: SocketAddr,
    socket: RwLock<Option<Arc<UdpSocket>>>,
    counters: Counters,
}

impl UdpTransport {
    pub fn new(bind_address: SocketAddr) -> Self {
        Self {
            bind_address,
            socket: RwLock::new(None),
            counters: Counters::default(),
        }
    }

    async fn current(&self) -> TransportResult<Arc<UdpSocket>> {
        self.socket
            .read()
            .await
            .clone()
            .ok_or(TransportError::NotConnected)
    }

    /// Snapshot of the traffic counters
    pub fn stats(&self) -> TransportStats {
        TransportStats {
            datagrams_sent: self.counters.datagrams_sent.load(Ordering::Relaxed),
            datagrams_received: self.counters.datagrams_received.load(Ordering::Relaxed),
            bytes_sent: self.counters.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.counters.bytes_received.load(Ordering::Relaxed),
        }
    }

    /// Local address of the bound socket
    pub async fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.current().await?.local_addr()?)
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn connect(&self, remote: SocketAddr) -> TransportResult<()> {
        let mut slot = self.socket.write().await;

        // Reconnects keep the bound socket so a pending receive stays valid
        let socket = match slot.as_ref() {
            Some(socket) => socket.clone(),
            None => {
                let socket = Arc::new(UdpSocket::bind(self.bind_address).await?);
                tracing::debug!("UDP socket bound to {}", socket.local_addr()?);
                *slot = Some(socket.clone());
                socket
            }
        };

        socket.connect(remote).await?;
        tracing::debug!("UDP default peer set to {}", remote);
        Ok(())
    }

    async fn send(&self, datagram: &[u8]) -> TransportResult<usize> {
        let socket = self.current().await?;
        let sent = socket.send(datagram).await?;

        self.counters.datagrams_sent.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes_sent
            .fetch_add(sent as u64, Ordering::Relaxed);
        Ok(sent)
    }

    async fn recv(&self) -> TransportResult<Bytes> {
        let socket = match self.current().await {
            Ok(socket) => socket,
            Err(TransportError::NotConnected) => return Err(TransportError::Closed),
            Err(e) => return Err(e),
        };

        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        let n = socket.recv(&mut buf).await?;
        buf.truncate(n);

        self.counters
            .datagrams_received
            .fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes_received
            .fetch_add(n as u64, Ordering::Relaxed);
        Ok(Bytes::from(buf))
    }

    async fn close(&self) -> TransportResult<()> {
        if self.socket.write().await.take().is_some() {
            tracing::debug!("UDP socket closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 0))
    }

    #[tokio::test]
    async fn test_send_before_connect_is_rejected() {
        let transport = UdpTransport::new(loopback());
        assert!(matches!(
            transport.send(&[0x04, 0x00, 0x10, 0x00]).await,
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(transport.recv().await, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_loopback_exchange() {
        let station = UdpSocket::bind(loopback()).await.unwrap();
        let transport = UdpTransport::new(loopback());
        transport.connect(station.local_addr().unwrap()).await.unwrap();

        transport.send(&[0x04, 0x00, 0x10, 0x00]).await.unwrap();
        let mut buf = [0u8; 16];
        let (n, from) = station.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[0x04, 0x00, 0x10, 0x00]);

        let reply = [0x08, 0x00, 0x10, 0x00, 0x01, 0x00, 0x00, 0x00];
        station.send_to(&reply, from).await.unwrap();
        let received = transport.recv().await.unwrap();
        assert_eq!(&received[..], &reply);

        let stats = transport.stats();
        assert_eq!(stats.datagrams_sent, 1);
        assert_eq!(stats.bytes_received, 8);

        transport.close().await.unwrap();
        assert!(matches!(transport.recv().await, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_reconnect_keeps_local_socket() {
        let station = UdpSocket::bind(loopback()).await.unwrap();
        let transport = UdpTransport::new(loopback());
        transport.connect(station.local_addr().unwrap()).await.unwrap();
        let first = transport.local_addr().await.unwrap();

        transport.connect(station.local_addr().unwrap()).await.unwrap();
        assert_eq!(transport.local_addr().await.unwrap(), first);
    }

    #[test]
    fn test_fault_classification() {
        let io = TransportError::Io(std::io::Error::new(std::io::ErrorKind::Other, "down"));
        assert!(io.is_transport_fault());
        assert!(!TransportError::NotConnected.is_transport_fault());
    }
}
