//! Z21 Client
//!
//! Owns the receive loop and the outbound queue, exposes the command API
//! and publishes every decoded telegram as a [`Z21Event`].

use bytes::Bytes;
use parking_lot::Mutex;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::liveness::{LivenessManager, ReachabilityProbe, StationLink, SystemPing};
use super::transport::{Transport, TransportError, UdpTransport};
use super::NetworkConfig;
use crate::protocol::{
    decode_telegram, encode_drive_batch, encode_function_batch, frame, hex_dump, Command,
    FunctionCommand, LocoAddress, LocoDrive, Reachability, ValueError, Z21Event,
};

/// Pause before re-arming the receive loop after a socket error
const RECV_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Upper bound for flushing queued commands on dispose
const FLUSH_TIMEOUT: Duration = Duration::from_millis(500);

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid value: {0}")]
    Value(#[from] ValueError),

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Not connected")]
    NotConnected,

    #[error("Client disposed")]
    Disposed,
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Client connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

struct Slot {
    state: ConnectionState,
    connecting: bool,
    remote: Option<SocketAddr>,
    outbound: Option<mpsc::UnboundedSender<Bytes>>,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
}

/// State shared between the client handle and its tasks
struct Shared {
    transport: Arc<dyn Transport>,
    events: broadcast::Sender<Z21Event>,
    slot: Mutex<Slot>,
    disposed: AtomicBool,
    reconnecting: AtomicBool,
}

impl Shared {
    fn publish(&self, event: Z21Event) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }

    /// Queue an encoded datagram for the writer task
    fn enqueue(&self, label: &str, datagram: Bytes) -> ClientResult<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(ClientError::Disposed);
        }

        let slot = self.slot.lock();
        let outbound = match (&slot.state, &slot.outbound) {
            (ConnectionState::Connected, Some(outbound)) => outbound,
            _ => return Err(ClientError::NotConnected),
        };

        tracing::debug!("-> {} [{}]", label, hex_dump(&datagram));
        outbound
            .send(datagram)
            .map_err(|_| ClientError::NotConnected)
    }

    fn dispatch(&self, command: Command) -> ClientResult<()> {
        self.enqueue(&command.to_string(), command.to_bytes())
    }

    /// Frame, decode and publish one received datagram
    fn handle_datagram(&self, datagram: &[u8]) {
        tracing::trace!("Received {} bytes: {}", datagram.len(), hex_dump(datagram));
        self.publish(Z21Event::RawReceived(datagram.to_vec()));

        for telegram in frame(datagram) {
            let telegram = match telegram {
                Ok(telegram) => telegram,
                Err(e) => {
                    tracing::error!("Framing error: {}", e);
                    continue;
                }
            };

            tracing::trace!("<- [{}]", hex_dump(telegram));
            match decode_telegram(telegram) {
                Ok(Some(event)) => self.publish(event),
                Ok(None) => {}
                Err(e) => tracing::error!("Decode error: {}", e),
            }
        }
    }

    /// Re-establish the socket's peer; at most one attempt runs at a time
    fn spawn_reconnect(self: &Arc<Self>) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        let Some(remote) = self.slot.lock().remote else {
            return;
        };
        if self.reconnecting.swap(true, Ordering::SeqCst) {
            return;
        }

        let shared = self.clone();
        tokio::spawn(async move {
            tracing::info!("Reconnecting to {}", remote);
            match shared.transport.connect(remote).await {
                Ok(()) => tracing::info!("Reconnected to {}", remote),
                Err(e) => tracing::error!("Reconnect to {} failed: {}", remote, e),
            }
            shared.reconnecting.store(false, Ordering::SeqCst);
        });
    }

    async fn write_loop(self: Arc<Self>, mut outbound: mpsc::UnboundedReceiver<Bytes>) {
        while let Some(datagram) = outbound.recv().await {
            if let Err(e) = self.transport.send(&datagram).await {
                tracing::error!("Send failed: {}", e);
                if e.is_transport_fault() {
                    self.spawn_reconnect();
                }
            }
        }
        tracing::debug!("Write loop finished");
    }

    async fn receive_loop(self: Arc<Self>) {
        loop {
            match self.transport.recv().await {
                Ok(datagram) => self.handle_datagram(&datagram),
                Err(TransportError::Closed) => break,
                Err(e) => {
                    if self.disposed.load(Ordering::SeqCst) {
                        break;
                    }
                    tracing::error!("Receive error: {}", e);
                    tokio::time::sleep(RECV_RETRY_DELAY).await;
                }
            }
        }
        tracing::debug!("Receive loop finished");
    }

    fn abort_tasks(&self) {
        let mut slot = self.slot.lock();
        slot.outbound = None;
        for task in [slot.writer.take(), slot.reader.take()].into_iter().flatten() {
            task.abort();
        }
    }
}

impl StationLink for Shared {
    fn send_command(&self, command: Command) {
        if let Err(e) = self.dispatch(command) {
            tracing::debug!("{} not sent: {}", command, e);
        }
    }

    fn reachability_changed(&self, reachability: Reachability) {
        self.publish(Z21Event::ReachabilityChanged(reachability));
    }
}

/// Client for a Z21 command station
pub struct Z21Client {
    config: NetworkConfig,
    shared: Arc<Shared>,
    liveness: LivenessManager,
}

impl Z21Client {
    /// Create a client using UDP and the system `ping` probe
    pub fn new(config: NetworkConfig) -> Self {
        let transport = Arc::new(UdpTransport::new(config.bind_address));
        let probe = Arc::new(SystemPing::new(config.probe_timeout));
        Self::with_transport(config, transport, probe)
    }

    /// Create a client over the given transport and probe
    pub fn with_transport(
        config: NetworkConfig,
        transport: Arc<dyn Transport>,
        probe: Arc<dyn ReachabilityProbe>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let shared = Arc::new(Shared {
            transport,
            events,
            slot: Mutex::new(Slot {
                state: ConnectionState::Disconnected,
                connecting: false,
                remote: None,
                outbound: None,
                writer: None,
                reader: None,
            }),
            disposed: AtomicBool::new(false),
            reconnecting: AtomicBool::new(false),
        });
        let liveness = LivenessManager::new(config.liveness(), probe, shared.clone());

        Self {
            config,
            shared,
            liveness,
        }
    }

    /// Subscribe to decoded events
    pub fn subscribe(&self) -> broadcast::Receiver<Z21Event> {
        self.shared.events.subscribe()
    }

    /// Connect to the station at `host`
    pub async fn connect(&self, host: IpAddr) -> ClientResult<()> {
        if self.shared.disposed.load(Ordering::SeqCst) {
            return Err(ClientError::Disposed);
        }

        let remote = SocketAddr::new(host, self.config.port);
        {
            let mut slot = self.shared.slot.lock();
            if slot.state == ConnectionState::Connected || slot.connecting {
                tracing::warn!("Already connected to {:?}", slot.remote);
                return Err(ClientError::AlreadyConnected);
            }
            slot.connecting = true;
        }

        tracing::info!("Connecting to {}", remote);
        if let Err(e) = self.shared.transport.connect(remote).await {
            self.shared.slot.lock().connecting = false;
            return Err(e.into());
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(self.shared.clone().write_loop(outbound_rx));
        let reader = tokio::spawn(self.shared.clone().receive_loop());

        {
            let mut slot = self.shared.slot.lock();
            slot.connecting = false;
            slot.state = ConnectionState::Connected;
            slot.remote = Some(remote);
            slot.outbound = Some(outbound_tx);
            slot.writer = Some(writer);
            slot.reader = Some(reader);
        }

        // The first probe tick fires immediately
        self.liveness.start(host);
        tracing::info!("Connected to {}", remote);
        Ok(())
    }

    /// Resolve `hostname` and connect to it
    pub async fn connect_hostname(&self, hostname: &str) -> ClientResult<()> {
        let addr = super::resolve_host(hostname, self.config.port).await?;
        self.connect(addr.ip()).await
    }

    /// Stop timers, log off and close the transport
    ///
    /// Later commands fail with [`ClientError::Disposed`]. Calling this more
    /// than once is a no-op.
    pub async fn dispose(&self) -> ClientResult<()> {
        if self.shared.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.liveness.stop();

        let (was_connected, writer) = {
            let mut slot = self.shared.slot.lock();
            let was_connected = slot.state == ConnectionState::Connected;
            slot.state = ConnectionState::Disconnected;
            // Closing the queue lets the writer finish what is already queued
            slot.outbound = None;
            (was_connected, slot.writer.take())
        };

        if let Some(mut writer) = writer {
            if tokio::time::timeout(FLUSH_TIMEOUT, &mut writer).await.is_err() {
                tracing::warn!("Queued commands not flushed within {:?}", FLUSH_TIMEOUT);
                writer.abort();
            }
        }

        if was_connected {
            let logoff = Command::LogOff;
            tracing::debug!("-> {} [{}]", logoff, hex_dump(&logoff.to_bytes()));
            if let Err(e) = self.shared.transport.send(&logoff.to_bytes()).await {
                tracing::warn!("Logoff not sent: {}", e);
            }
        }

        self.shared.abort_tasks();
        if let Err(e) = self.shared.transport.close().await {
            tracing::warn!("Error closing transport: {}", e);
        }

        tracing::info!("Client disposed");
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.slot.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::SeqCst)
    }

    /// Last reachability reported by the probe
    pub fn reachability(&self) -> Reachability {
        self.liveness.reachability()
    }

    /// Station address once connected
    pub fn remote(&self) -> Option<SocketAddr> {
        self.shared.slot.lock().remote
    }

    /// Send any command
    pub fn send(&self, command: Command) -> ClientResult<()> {
        self.shared.dispatch(command)
    }

    pub fn get_status(&self) -> ClientResult<()> {
        self.send(Command::GetStatus)
    }

    pub fn get_version(&self) -> ClientResult<()> {
        self.send(Command::GetVersion)
    }

    pub fn get_firmware_version(&self) -> ClientResult<()> {
        self.send(Command::GetFirmwareVersion)
    }

    pub fn get_hardware_info(&self) -> ClientResult<()> {
        self.send(Command::GetHardwareInfo)
    }

    pub fn get_serial_number(&self) -> ClientResult<()> {
        self.send(Command::GetSerialNumber)
    }

    pub fn get_lan_code(&self) -> ClientResult<()> {
        self.send(Command::GetLanCode)
    }

    /// Subscribe to the station's broadcasts
    pub fn log_on(&self) -> ClientResult<()> {
        self.send(Command::LogOn)
    }

    pub fn log_off(&self) -> ClientResult<()> {
        self.send(Command::LogOff)
    }

    pub fn get_loco_info(&self, address: u16) -> ClientResult<()> {
        let address = LocoAddress::new(address)?;
        self.send(Command::GetLocoInfo(address))
    }

    pub fn set_loco_drive(&self, drive: LocoDrive) -> ClientResult<()> {
        self.send(Command::SetLocoDrive(drive))
    }

    /// Send several drive commands in one datagram
    pub fn set_loco_drive_batch(&self, drives: &[LocoDrive]) -> ClientResult<()> {
        if drives.is_empty() {
            return Ok(());
        }
        let label = format!("SET LOCO DRIVE x{}", drives.len());
        self.shared.enqueue(&label, encode_drive_batch(drives))
    }

    pub fn set_loco_function(&self, function: FunctionCommand) -> ClientResult<()> {
        self.send(Command::SetLocoFunction(function))
    }

    /// Send several function commands in one datagram
    pub fn set_loco_function_batch(&self, functions: &[FunctionCommand]) -> ClientResult<()> {
        if functions.is_empty() {
            return Ok(());
        }
        let label = format!("SET LOCO FUNCTION x{}", functions.len());
        self.shared.enqueue(&label, encode_function_batch(functions))
    }

    /// Emergency stop of all locomotives
    pub fn set_stop(&self) -> ClientResult<()> {
        self.send(Command::SetStop)
    }

    pub fn set_track_power_on(&self) -> ClientResult<()> {
        self.send(Command::SetTrackPowerOn)
    }

    pub fn set_track_power_off(&self) -> ClientResult<()> {
        self.send(Command::SetTrackPowerOff)
    }

    pub fn system_state_get_data(&self) -> ClientResult<()> {
        self.send(Command::SystemStateGetData)
    }
}

impl Drop for Z21Client {
    fn drop(&mut self) {
        self.liveness.stop();
        self.shared.abort_tasks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Direction, ToggleMode};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio_test::{assert_err, assert_ok};

    const HOST: IpAddr = IpAddr::V4(std::net::Ipv4Addr::new(192, 168, 0, 111));

    const LOGON: [u8; 8] = [0x08, 0x00, 0x50, 0x00, 0x01, 0x00, 0x01, 0x00];
    const GET_STATUS: [u8; 7] = [0x07, 0x00, 0x40, 0x00, 0x21, 0x24, 0x05];
    const LOGOFF: [u8; 4] = [0x04, 0x00, 0x30, 0x00];
    const STOPPED: [u8; 7] = [0x07, 0x00, 0x40, 0x00, 0x81, 0x00, 0x81];
    const SERIAL: [u8; 8] = [0x08, 0x00, 0x10, 0x00, 0x39, 0x30, 0x00, 0x00];

    struct MockTransport {
        sent: mpsc::UnboundedSender<Vec<u8>>,
        inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Bytes>>,
        fail_sends: AtomicUsize,
        connects: AtomicUsize,
        closed: AtomicBool,
    }

    struct Harness {
        transport: Arc<MockTransport>,
        sent: mpsc::UnboundedReceiver<Vec<u8>>,
        inbound: mpsc::UnboundedSender<Bytes>,
    }

    impl Harness {
        async fn next_sent(&mut self) -> Vec<u8> {
            tokio::time::timeout(Duration::from_secs(1), self.sent.recv())
                .await
                .unwrap()
                .unwrap()
        }

        fn deliver(&self, datagram: &[u8]) {
            self.inbound.send(Bytes::copy_from_slice(datagram)).unwrap();
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn connect(&self, _remote: SocketAddr) -> Result<(), TransportError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn send(&self, datagram: &[u8]) -> Result<usize, TransportError> {
            if self
                .fail_sends
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "reset",
                )));
            }
            self.sent.send(datagram.to_vec()).unwrap();
            Ok(datagram.len())
        }

        async fn recv(&self) -> Result<Bytes, TransportError> {
            match self.inbound.lock().await.recv().await {
                Some(datagram) => Ok(datagram),
                None => Err(TransportError::Closed),
            }
        }

        async fn close(&self) -> Result<(), TransportError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct StaticProbe(bool);

    #[async_trait]
    impl ReachabilityProbe for StaticProbe {
        async fn probe(&self, _host: IpAddr) -> std::io::Result<bool> {
            Ok(self.0)
        }
    }

    fn client(reachable: bool) -> (Z21Client, Harness) {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(MockTransport {
            sent: sent_tx,
            inbound: tokio::sync::Mutex::new(inbound_rx),
            fail_sends: AtomicUsize::new(0),
            connects: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        });
        let client = Z21Client::with_transport(
            NetworkConfig::default(),
            transport.clone(),
            Arc::new(StaticProbe(reachable)),
        );
        let harness = Harness {
            transport,
            sent: sent_rx,
            inbound: inbound_tx,
        };
        (client, harness)
    }

    async fn next_event(events: &mut broadcast::Receiver<Z21Event>) -> Z21Event {
        tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_rejected_before_connect() {
        let (client, _harness) = client(true);
        assert!(!client.is_connected());
        assert!(matches!(client.get_status(), Err(ClientError::NotConnected)));
        assert!(matches!(client.set_stop(), Err(ClientError::NotConnected)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_logs_on_when_reachable() {
        let (client, mut harness) = client(true);
        let mut events = client.subscribe();

        assert_ok!(client.connect(HOST).await);
        assert!(client.is_connected());
        assert_eq!(client.remote(), Some(SocketAddr::new(HOST, 21105)));

        assert_eq!(harness.next_sent().await, LOGON);
        assert_eq!(harness.next_sent().await, GET_STATUS);
        assert_eq!(
            next_event(&mut events).await,
            Z21Event::ReachabilityChanged(Reachability::Reachable)
        );
        assert_eq!(client.reachability(), Reachability::Reachable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_station_gets_no_logon() {
        let (client, mut harness) = client(false);
        assert_ok!(client.connect(HOST).await);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(harness.sent.try_recv().is_err());
        assert_eq!(client.reachability(), Reachability::Unreachable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_twice_is_rejected() {
        let (client, harness) = client(false);
        assert_ok!(client.connect(HOST).await);
        assert!(matches!(
            client.connect(HOST).await,
            Err(ClientError::AlreadyConnected)
        ));
        assert_eq!(harness.transport.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_telegrams_published_in_order() {
        let (client, harness) = client(false);
        let mut events = client.subscribe();
        assert_ok!(client.connect(HOST).await);

        let mut datagram = STOPPED.to_vec();
        datagram.extend_from_slice(&SERIAL);
        harness.deliver(&datagram);

        assert_eq!(next_event(&mut events).await, Z21Event::RawReceived(datagram));
        assert_eq!(next_event(&mut events).await, Z21Event::Stopped);
        assert_eq!(next_event(&mut events).await, Z21Event::SerialNumber(12345));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_datagram_keeps_loop_alive() {
        let (client, harness) = client(false);
        let mut events = client.subscribe();
        assert_ok!(client.connect(HOST).await);

        // Good telegram, then a length that overruns the buffer
        let mut broken = STOPPED.to_vec();
        broken.extend_from_slice(&[0x09, 0x00, 0x40]);
        harness.deliver(&broken);
        harness.deliver(&SERIAL);

        assert_eq!(next_event(&mut events).await, Z21Event::RawReceived(broken));
        assert_eq!(next_event(&mut events).await, Z21Event::Stopped);
        assert_eq!(
            next_event(&mut events).await,
            Z21Event::RawReceived(SERIAL.to_vec())
        );
        assert_eq!(next_event(&mut events).await, Z21Event::SerialNumber(12345));
    }

    #[tokio::test(start_paused = true)]
    async fn test_truncated_telegram_drops_only_itself() {
        let (client, harness) = client(false);
        let mut events = client.subscribe();
        assert_ok!(client.connect(HOST).await);

        // Framed serial number reply with three of its four payload bytes missing
        let mut datagram = vec![0x05, 0x00, 0x10, 0x00, 0x01];
        datagram.extend_from_slice(&STOPPED);
        harness.deliver(&datagram);

        assert_eq!(next_event(&mut events).await, Z21Event::RawReceived(datagram));
        assert_eq!(next_event(&mut events).await, Z21Event::Stopped);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_fault_triggers_single_reconnect() {
        let (client, mut harness) = client(false);
        assert_ok!(client.connect(HOST).await);
        harness.transport.fail_sends.store(1, Ordering::SeqCst);

        // Fire and forget: the fault is not reported to the caller
        assert_ok!(client.get_status());
        assert_ok!(client.get_serial_number());

        assert_eq!(harness.next_sent().await, [0x04, 0x00, 0x10, 0x00]);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(harness.transport.connects.load(Ordering::SeqCst), 2);

        // The failed datagram is not redelivered
        assert!(harness.sent.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_leave_in_call_order() {
        let (client, mut harness) = client(false);
        assert_ok!(client.connect(HOST).await);

        let drive = LocoDrive::new(LocoAddress::new(3).unwrap(), 50, Direction::Forward).unwrap();
        assert_ok!(client.set_loco_drive(drive));
        assert_ok!(client.set_track_power_off());
        assert_ok!(client.get_loco_info(3));

        assert_eq!(harness.next_sent().await[4], 0xE4);
        assert_eq!(
            harness.next_sent().await,
            [0x07, 0x00, 0x40, 0x00, 0x21, 0x80, 0xA1]
        );
        assert_eq!(harness.next_sent().await[4], 0xE3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_loco_address_rejected() {
        let (client, _harness) = client(false);
        assert_ok!(client.connect(HOST).await);
        assert!(matches!(
            client.get_loco_info(20000),
            Err(ClientError::Value(ValueError::AddressOutOfRange(20000)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches() {
        let (client, mut harness) = client(false);

        // Empty batches never reach the connection check
        assert_ok!(client.set_loco_drive_batch(&[]));
        assert_ok!(client.set_loco_function_batch(&[]));

        assert_ok!(client.connect(HOST).await);
        let address = LocoAddress::new(3).unwrap();
        let functions = [
            FunctionCommand::new(address, 0, ToggleMode::On).unwrap(),
            FunctionCommand::new(address, 1, ToggleMode::Toggle).unwrap(),
        ];
        assert_ok!(client.set_loco_function_batch(&functions));

        let datagram = harness.next_sent().await;
        assert_eq!(datagram.len(), 20);
        assert_eq!(datagram[0], 0x0A);
        assert_eq!(datagram[10], 0x0A);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_logs_off_and_rejects_commands() {
        let (client, mut harness) = client(true);
        assert_ok!(client.connect(HOST).await);
        assert_eq!(harness.next_sent().await, LOGON);
        assert_eq!(harness.next_sent().await, GET_STATUS);

        assert_ok!(client.dispose().await);
        assert_eq!(harness.next_sent().await, LOGOFF);
        assert!(harness.transport.closed.load(Ordering::SeqCst));
        assert!(client.is_disposed());
        assert!(!client.is_connected());

        assert_err!(client.get_status());
        assert!(matches!(client.get_status(), Err(ClientError::Disposed)));
        assert!(matches!(
            client.connect(HOST).await,
            Err(ClientError::Disposed)
        ));

        // Renewal timer no longer runs
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(harness.sent.try_recv().is_err());

        assert_ok!(client.dispose().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_before_connect_sends_nothing() {
        let (client, mut harness) = client(true);
        assert_ok!(client.dispose().await);
        assert!(harness.sent.try_recv().is_err());
    }
}
