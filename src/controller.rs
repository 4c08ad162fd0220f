//! Session controller
//!
//! Wires the recorder monitor, the recording session, and the manual
//! command channel into one select loop, and owns orderly shutdown: an
//! active session is always finalized before the recorder link or the
//! encoder subprocess is released.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

use crate::encoder::{EncoderProcess, EncoderState};
use crate::error::TrackerError;
use crate::obs::{RecorderEdge, RecorderMonitor};
use crate::session::{
    EventCounters, RecorderContext, RecordingSession, SessionNotice, StartTrigger,
};

/// Commands accepted by the controller
#[derive(Debug, Clone)]
pub enum ControllerCommand {
    /// Manually start input capture (override path, independent of the monitor)
    StartCapture,
    /// Manually stop input capture
    StopCapture,
    /// Request a status broadcast
    GetStatus,
    /// Shut the controller down
    Shutdown,
}

/// Status updates broadcast by the controller
#[derive(Debug, Clone)]
pub enum ControllerStatus {
    Idle {
        recorder_connected: bool,
    },
    Recording {
        session_id: String,
        log_path: PathBuf,
        counters: EventCounters,
    },
    Error(String),
}

/// Create the command/status channel pair for the controller
pub fn create_controller_channels() -> (
    mpsc::Sender<ControllerCommand>,
    mpsc::Receiver<ControllerCommand>,
    broadcast::Sender<ControllerStatus>,
    broadcast::Receiver<ControllerStatus>,
) {
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let (status_tx, status_rx) = broadcast::channel(16);
    (cmd_tx, cmd_rx, status_tx, status_rx)
}

pub struct SessionController {
    session: Arc<RecordingSession>,
    monitor: Option<RecorderMonitor>,
    edge_rx: Option<mpsc::UnboundedReceiver<RecorderEdge>>,
    notice_rx: Option<mpsc::UnboundedReceiver<SessionNotice>>,
    cmd_rx: Option<mpsc::Receiver<ControllerCommand>>,
    status_tx: broadcast::Sender<ControllerStatus>,
    encoder: Option<EncoderProcess>,
}

impl SessionController {
    /// Wire a controller. `monitor`/`edge_rx` are absent when the recorder
    /// integration is disabled or unavailable; `encoder` is present when a
    /// standalone encoder should be bracketed with manual sessions.
    pub fn new(
        session: Arc<RecordingSession>,
        monitor: Option<RecorderMonitor>,
        edge_rx: Option<mpsc::UnboundedReceiver<RecorderEdge>>,
        cmd_rx: mpsc::Receiver<ControllerCommand>,
        status_tx: broadcast::Sender<ControllerStatus>,
        encoder: Option<EncoderProcess>,
    ) -> Self {
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        session.set_notice_sender(notice_tx);

        Self {
            session,
            monitor,
            edge_rx,
            notice_rx: Some(notice_rx),
            cmd_rx: Some(cmd_rx),
            status_tx,
            encoder,
        }
    }

    /// Run the controller loop until Shutdown (or all inputs close).
    pub async fn run(mut self) -> anyhow::Result<()> {
        info!("Session controller started");
        self.broadcast_status();

        let mut edge_rx = self.edge_rx.take();
        let Some(mut notice_rx) = self.notice_rx.take() else {
            return Ok(());
        };
        let Some(mut cmd_rx) = self.cmd_rx.take() else {
            return Ok(());
        };

        loop {
            tokio::select! {
                Some(edge) = async {
                    match &mut edge_rx {
                        Some(rx) => rx.recv().await,
                        None => std::future::pending().await,
                    }
                } => {
                    match edge {
                        RecorderEdge::Started => {
                            info!("OBS recording started - starting input tracking");
                            self.start_session(StartTrigger::RecorderEdge);
                        }
                        RecorderEdge::Stopped => {
                            info!("OBS recording stopped - stopping input tracking");
                            self.stop_session();
                        }
                    }
                }

                Some(notice) = notice_rx.recv() => {
                    match notice {
                        SessionNotice::WriteFailuresExceeded => {
                            error!("Persistent log write failures, stopping session");
                            self.stop_session();
                            let _ = self
                                .status_tx
                                .send(ControllerStatus::Error(
                                    "session stopped: log sink unusable".to_string(),
                                ));
                        }
                    }
                }

                Some(cmd) = cmd_rx.recv() => {
                    match cmd {
                        ControllerCommand::StartCapture => {
                            info!("Manual capture start requested");
                            self.start_session(StartTrigger::Manual);
                        }
                        ControllerCommand::StopCapture => {
                            info!("Manual capture stop requested");
                            self.stop_session();
                        }
                        ControllerCommand::GetStatus => {
                            self.report_status();
                            self.broadcast_status();
                        }
                        ControllerCommand::Shutdown => {
                            info!("Shutdown requested");
                            break;
                        }
                    }
                }

                else => break,
            }
        }

        // Finalize the log before releasing anything else
        self.stop_session();
        if let Some(mut monitor) = self.monitor.take() {
            monitor.disconnect().await;
        }

        info!("Session controller shut down");
        Ok(())
    }

    fn start_session(&mut self, trigger: StartTrigger) {
        let recorder = self
            .monitor
            .as_ref()
            .map(|monitor| {
                let link = monitor.status();
                RecorderContext {
                    connected: link.connected,
                    version: link.recorder_version,
                }
            })
            .unwrap_or_default();

        match self.session.start(trigger, recorder) {
            Ok(log_path) => {
                // Without a recorder application, a manual session drives
                // its own encoder, bracketed 1:1 with the log file.
                if trigger == StartTrigger::Manual && self.monitor.is_none() {
                    if let Some(encoder) = self.encoder.as_mut() {
                        let video_path = log_path.with_extension("mkv");
                        if let Err(e) = encoder.start(&video_path) {
                            warn!("Encoder failed to start, capturing log only: {:#}", e);
                        }
                    }
                }
                self.broadcast_status();
            }
            Err(TrackerError::AlreadyRecording) => {
                warn!("Ignoring start request: a session is already recording");
            }
            Err(e) => {
                error!("Failed to start session: {}", e);
                let _ = self.status_tx.send(ControllerStatus::Error(e.to_string()));
            }
        }
    }

    /// Log the operator-facing status summary
    fn report_status(&mut self) {
        if let Some(monitor) = &self.monitor {
            let link = monitor.status();
            info!(
                "Recorder link: connected={}, version={}, last_poll={:?}",
                link.connected,
                link.recorder_version.as_deref().unwrap_or("unknown"),
                link.last_polled
            );
        } else {
            info!("Recorder link: disabled");
        }

        match self.session.status() {
            Some(session) => {
                let c = session.counters;
                info!(
                    "Recording session {}: {} events (mouse {}, keyboard {}, gamepad {}) -> {:?}",
                    session.session_id, c.total, c.mouse, c.keyboard, c.gamepad, session.log_path
                );
                if self.monitor.is_none() {
                    if let Some(encoder) = self.encoder.as_mut() {
                        if encoder.state() == EncoderState::Stopped {
                            warn!("Encoder is not running while a session is active");
                        }
                    }
                }
            }
            None => info!("No active recording session"),
        }
    }

    fn stop_session(&mut self) {
        if self.session.stop() {
            if let Some(encoder) = self.encoder.as_mut() {
                encoder.stop();
            }
            self.broadcast_status();
        }
    }

    fn broadcast_status(&self) {
        let status = match self.session.status() {
            Some(session) if self.session.is_recording() => ControllerStatus::Recording {
                session_id: session.session_id,
                log_path: session.log_path,
                counters: session.counters,
            },
            _ => ControllerStatus::Idle {
                recorder_connected: self
                    .monitor
                    .as_ref()
                    .map(|m| m.status().connected)
                    .unwrap_or(false),
            },
        };
        let _ = self.status_tx.send(status);
    }
}
