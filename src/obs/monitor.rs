//! Recorder monitor: polls the OBS WebSocket record status and turns
//! level changes into edge notifications for the controller.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use obws::Client;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ObsConfig;
use crate::error::{Result, TrackerError};

/// Bounded wait for the poll loop to exit on disconnect
const POLL_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Consecutive poll failures before attempting a transparent reconnect
const RECONNECT_AFTER_FAILURES: u32 = 5;

/// Level transition of the recorder's output state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderEdge {
    Started,
    Stopped,
}

/// Edge detector over the recorder's boolean output state.
///
/// `observe` must only be fed successfully polled levels: a failed poll
/// is "unknown", not a level, and must not advance the detector. The
/// initial level is `false`, so a recorder already mid-recording fires
/// one rising edge on the first successful poll.
#[derive(Debug)]
pub struct EdgeDetector {
    last: bool,
}

impl EdgeDetector {
    pub fn new() -> Self {
        Self { last: false }
    }

    /// Feed one successfully polled level; yields at most one edge per
    /// level change.
    pub fn observe(&mut self, current: bool) -> Option<RecorderEdge> {
        if current == self.last {
            return None;
        }
        self.last = current;
        Some(if current {
            RecorderEdge::Started
        } else {
            RecorderEdge::Stopped
        })
    }
}

impl Default for EdgeDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view of the recorder link, for status display
#[derive(Debug, Clone, Default)]
pub struct LinkStatus {
    pub connected: bool,
    pub recorder_version: Option<String>,
    pub last_polled: Option<chrono::DateTime<chrono::Local>>,
}

/// Owns the OBS WebSocket link and the poll loop task.
pub struct RecorderMonitor {
    status: Arc<Mutex<LinkStatus>>,
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl RecorderMonitor {
    /// Connect to the recorder and, only on success, start the poll loop.
    /// A connect failure leaves nothing running.
    pub async fn connect(
        config: ObsConfig,
        edge_tx: mpsc::UnboundedSender<RecorderEdge>,
    ) -> Result<Self> {
        let client = Client::connect(
            config.host.clone(),
            config.port,
            config.password.as_deref(),
        )
        .await
        .map_err(|e| TrackerError::connection("connect", e))?;

        let recorder_version = match client.general().version().await {
            Ok(version) => Some(version.obs_version.to_string()),
            Err(e) => {
                debug!("Could not read recorder version: {}", e);
                None
            }
        };
        match &recorder_version {
            Some(version) => info!("Connected to OBS {}", version),
            None => info!("Connected to OBS (version unknown)"),
        }

        let status = Arc::new(Mutex::new(LinkStatus {
            connected: true,
            recorder_version,
            last_polled: None,
        }));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(poll_loop(
            client,
            config,
            status.clone(),
            edge_tx,
            shutdown_rx,
        ));

        Ok(Self {
            status,
            shutdown_tx,
            handle: Some(handle),
        })
    }

    pub fn status(&self) -> LinkStatus {
        self.status.lock().unwrap().clone()
    }

    /// Signal the poll loop to exit and join it with a bounded timeout;
    /// an unresponsive loop is aborted rather than waited on forever.
    pub async fn disconnect(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(mut handle) = self.handle.take() {
            if tokio::time::timeout(POLL_JOIN_TIMEOUT, &mut handle)
                .await
                .is_err()
            {
                warn!("Recorder poll loop did not exit in time, aborting it");
                handle.abort();
            }
        }
        self.status.lock().unwrap().connected = false;
        info!("Disconnected from recorder");
    }
}

async fn poll_loop(
    mut client: Client,
    config: ObsConfig,
    status: Arc<Mutex<LinkStatus>>,
    edge_tx: mpsc::UnboundedSender<RecorderEdge>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut edges = EdgeDetector::new();
    let normal_interval = Duration::from_millis(config.poll_interval_ms);
    let retry_interval = Duration::from_millis(config.retry_interval_ms);
    let mut interval = normal_interval;
    let mut consecutive_failures: u32 = 0;

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = tokio::time::sleep(interval) => {
                match client.recording().status().await {
                    Ok(record_status) => {
                        consecutive_failures = 0;
                        interval = normal_interval;
                        {
                            let mut s = status.lock().unwrap();
                            s.connected = true;
                            s.last_polled = Some(chrono::Local::now());
                        }
                        if let Some(edge) = edges.observe(record_status.active) {
                            debug!("Recorder output edge: {:?}", edge);
                            if edge_tx.send(edge).is_err() {
                                // Controller is gone; nothing left to notify
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        interval = retry_interval;
                        warn!(
                            "Recorder poll failed ({} consecutive): {}",
                            consecutive_failures, e
                        );
                        if consecutive_failures >= RECONNECT_AFTER_FAILURES {
                            status.lock().unwrap().connected = false;
                            match Client::connect(
                                config.host.clone(),
                                config.port,
                                config.password.as_deref(),
                            )
                            .await
                            {
                                Ok(new_client) => {
                                    info!("Reconnected to recorder");
                                    client = new_client;
                                    consecutive_failures = 0;
                                    interval = normal_interval;
                                    status.lock().unwrap().connected = true;
                                }
                                Err(e) => {
                                    debug!("Reconnect attempt failed: {}", e);
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    debug!("Recorder poll loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_sequence_yields_one_start_and_one_stop() {
        let mut edges = EdgeDetector::new();
        let polls = [false, false, true, true, false];

        let fired: Vec<RecorderEdge> = polls.iter().filter_map(|&p| edges.observe(p)).collect();
        assert_eq!(fired, vec![RecorderEdge::Started, RecorderEdge::Stopped]);
    }

    #[test]
    fn recorder_already_active_fires_rising_edge_on_first_poll() {
        let mut edges = EdgeDetector::new();
        assert_eq!(edges.observe(true), Some(RecorderEdge::Started));
        assert_eq!(edges.observe(true), None);
    }

    #[test]
    fn steady_levels_fire_nothing() {
        let mut edges = EdgeDetector::new();
        for _ in 0..10 {
            assert_eq!(edges.observe(false), None);
        }
    }
}
