//! Liveness and broadcast subscription management
//!
//! A periodic probe tracks whether the station is reachable. Only changes
//! of reachability have side effects:
//! - Unreachable -> Reachable: log on, request status, start renewal timer
//! - Reachable -> Unreachable: stop renewal timer
//!
//! The renewal timer re-requests status so the station keeps this client
//! subscribed to its broadcasts.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::net::IpAddr;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};

use crate::protocol::{Command, Reachability};

/// Timer settings for liveness management
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessConfig {
    pub probe_interval: Duration,
    pub renewal_interval: Duration,
    pub probe_timeout: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(5),
            renewal_interval: Duration::from_secs(50),
            probe_timeout: Duration::from_secs(2),
        }
    }
}

/// Link-level reachability check, independent of the Z21 protocol
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn probe(&self, host: IpAddr) -> std::io::Result<bool>;
}

/// Probe using the platform `ping` utility
#[derive(Debug, Clone)]
pub struct SystemPing {
    timeout: Duration,
}

impl SystemPing {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ReachabilityProbe for SystemPing {
    async fn probe(&self, host: IpAddr) -> std::io::Result<bool> {
        let mut command = tokio::process::Command::new("ping");

        #[cfg(target_os = "windows")]
        command.args(["-n", "1", "-w", &self.timeout.as_millis().to_string()]);

        #[cfg(target_os = "macos")]
        command.args(["-c", "1", "-W", &self.timeout.as_millis().to_string()]);

        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        command.args(["-c", "1", "-W", &self.timeout.as_secs().max(1).to_string()]);

        let status = command
            .arg(host.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await?;

        Ok(status.success())
    }
}

/// What the liveness manager drives on the station connection
pub trait StationLink: Send + Sync {
    /// Queue a command; failures are the link's to report
    fn send_command(&self, command: Command);

    fn reachability_changed(&self, reachability: Reachability);
}

struct LivenessState {
    reachability: Reachability,
    renewal: Option<JoinHandle<()>>,
    /// Set by `stop`; outcomes of probes still in flight are ignored
    stopped: bool,
}

struct Inner {
    config: LivenessConfig,
    probe: Arc<dyn ReachabilityProbe>,
    link: Arc<dyn StationLink>,
    state: Mutex<LivenessState>,
}

impl Inner {
    async fn run_probe(&self, host: IpAddr) -> bool {
        match tokio::time::timeout(self.config.probe_timeout, self.probe.probe(host)).await {
            Ok(Ok(reachable)) => reachable,
            Ok(Err(e)) => {
                tracing::error!("Error while probing {}: {}", host, e);
                false
            }
            Err(_) => {
                tracing::debug!("Probe of {} timed out", host);
                false
            }
        }
    }

    /// Record a probe outcome; returns the new reachability on a transition
    fn apply(&self, reachable: bool) -> Option<Reachability> {
        let next = if reachable {
            Reachability::Reachable
        } else {
            Reachability::Unreachable
        };

        {
            let mut state = self.state.lock();
            if state.stopped || state.reachability == next {
                return None;
            }
            state.reachability = next;

            match next {
                Reachability::Reachable => {
                    tracing::info!("Z21 reachable, logging on");
                    self.link.send_command(Command::LogOn);
                    self.link.send_command(Command::GetStatus);
                    if let Some(old) = state.renewal.replace(self.spawn_renewal()) {
                        old.abort();
                    }
                }
                Reachability::Unreachable => {
                    tracing::warn!("Z21 unreachable");
                    if let Some(renewal) = state.renewal.take() {
                        renewal.abort();
                    }
                }
            }
        }

        self.link.reachability_changed(next);
        Some(next)
    }

    fn spawn_renewal(&self) -> JoinHandle<()> {
        let link = self.link.clone();
        let period = self.config.renewal_interval;

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                tracing::debug!("Renewing broadcast subscription");
                link.send_command(Command::GetStatus);
            }
        })
    }
}

/// Drives the probe and renewal timers
pub struct LivenessManager {
    inner: Arc<Inner>,
    probe_task: Mutex<Option<JoinHandle<()>>>,
}

impl LivenessManager {
    pub fn new(
        config: LivenessConfig,
        probe: Arc<dyn ReachabilityProbe>,
        link: Arc<dyn StationLink>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                probe,
                link,
                state: Mutex::new(LivenessState {
                    reachability: Reachability::Unreachable,
                    renewal: None,
                    stopped: false,
                }),
            }),
            probe_task: Mutex::new(None),
        }
    }

    /// Start probing `host`; the first probe runs immediately
    ///
    /// The next probe is scheduled one full interval after the previous one
    /// settles, so slow probes never run back to back.
    pub fn start(&self, host: IpAddr) {
        let mut task = self.probe_task.lock();
        if task.is_some() {
            return;
        }
        self.inner.state.lock().stopped = false;

        let inner = self.inner.clone();
        *task = Some(tokio::spawn(async move {
            loop {
                let reachable = inner.run_probe(host).await;
                inner.apply(reachable);
                sleep(inner.config.probe_interval).await;
            }
        }));
        tracing::debug!(
            "Liveness probing of {} every {:?}",
            host,
            self.inner.config.probe_interval
        );
    }

    /// Stop both timers and forget the last reachability
    pub fn stop(&self) {
        if let Some(task) = self.probe_task.lock().take() {
            task.abort();
        }

        let mut state = self.inner.state.lock();
        state.stopped = true;
        if let Some(renewal) = state.renewal.take() {
            renewal.abort();
        }
        state.reachability = Reachability::Unreachable;
    }

    /// Run one probe outside the timer and apply its outcome
    pub async fn probe_once(&self, host: IpAddr) -> Option<Reachability> {
        let reachable = self.inner.run_probe(host).await;
        self.inner.apply(reachable)
    }

    pub fn reachability(&self) -> Reachability {
        self.inner.state.lock().reachability
    }

    pub fn is_probing(&self) -> bool {
        self.probe_task.lock().is_some()
    }

    /// Whether the subscription renewal timer is running
    pub fn is_renewing(&self) -> bool {
        self.inner.state.lock().renewal.is_some()
    }
}

impl Drop for LivenessManager {
    fn drop(&mut self) {
        self.stop();
    }
}
