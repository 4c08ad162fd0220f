//! Standalone video encoder subprocess
//!
//! Used when no external recorder application drives the session: a
//! manually started session brackets one encoder process 1:1 with the
//! log file. Graceful stop first (ffmpeg reads `q` on stdin), force-kill
//! after a bounded wait.

use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::config::EncoderConfig;

/// Bounded wait for the encoder to exit after a graceful stop request
const GRACEFUL_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Encoder process state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    Stopped,
    Running,
    Stopping,
}

/// Manages the encoder subprocess lifecycle
pub struct EncoderProcess {
    config: EncoderConfig,
    process: Option<Child>,
    state: EncoderState,
}

impl EncoderProcess {
    pub fn new(config: EncoderConfig) -> Self {
        Self {
            config,
            process: None,
            state: EncoderState::Stopped,
        }
    }

    pub fn state(&mut self) -> EncoderState {
        self.refresh_process_state();
        self.state
    }

    /// Spawn the encoder writing to `output_path`.
    pub fn start(&mut self, output_path: &Path) -> anyhow::Result<()> {
        self.refresh_process_state();
        if self.state == EncoderState::Running {
            debug!("Encoder is already running");
            return Ok(());
        }

        let mut args = if self.config.args.is_empty() {
            default_capture_args()
        } else {
            self.config.args.clone()
        };
        args.push(output_path.to_string_lossy().into_owned());

        info!("Launching encoder: {} {:?}", self.config.command, args);

        let process = Command::new(&self.config.command)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                anyhow::anyhow!("failed to launch encoder '{}': {}", self.config.command, e)
            })?;

        self.process = Some(process);
        self.state = EncoderState::Running;
        Ok(())
    }

    /// Stop the encoder: graceful quit first, then kill after a bounded
    /// wait. Idempotent.
    pub fn stop(&mut self) {
        self.refresh_process_state();
        if self.state == EncoderState::Stopped {
            return;
        }
        self.state = EncoderState::Stopping;

        if let Some(mut process) = self.process.take() {
            // ffmpeg treats `q` on stdin as a graceful stop request
            if let Some(stdin) = process.stdin.as_mut() {
                let _ = stdin.write_all(b"q\n");
                let _ = stdin.flush();
            }

            let deadline = Instant::now() + GRACEFUL_STOP_TIMEOUT;
            loop {
                match process.try_wait() {
                    Ok(Some(exit_status)) => {
                        debug!("Encoder exited: {:?}", exit_status);
                        break;
                    }
                    Ok(None) => {
                        if Instant::now() >= deadline {
                            warn!("Encoder did not stop gracefully, killing it");
                            let _ = process.kill();
                            let _ = process.wait();
                            break;
                        }
                        std::thread::sleep(Duration::from_millis(100));
                    }
                    Err(e) => {
                        error!("Error checking encoder status: {}", e);
                        let _ = process.kill();
                        break;
                    }
                }
            }
        }

        self.state = EncoderState::Stopped;
        info!("Encoder stopped");
    }

    fn refresh_process_state(&mut self) {
        if self.state != EncoderState::Running {
            return;
        }

        let mut exited = false;
        if let Some(process) = self.process.as_mut() {
            match process.try_wait() {
                Ok(Some(exit_status)) => {
                    debug!("Encoder process exited on its own: {:?}", exit_status);
                    exited = true;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Failed to check encoder process status: {}", e);
                }
            }
        } else {
            exited = true;
        }

        if exited {
            self.process = None;
            self.state = EncoderState::Stopped;
        }
    }
}

impl Drop for EncoderProcess {
    fn drop(&mut self) {
        if self.state == EncoderState::Running {
            self.stop();
        }
    }
}

/// Platform screen-grab input arguments used when none are configured
fn default_capture_args() -> Vec<String> {
    let mut args: Vec<String> = vec!["-y".into(), "-loglevel".into(), "error".into()];

    #[cfg(target_os = "linux")]
    args.extend(["-f".into(), "x11grab".into(), "-i".into(), ":0.0".into()]);

    #[cfg(target_os = "macos")]
    args.extend(["-f".into(), "avfoundation".into(), "-i".into(), "1:none".into()]);

    #[cfg(target_os = "windows")]
    args.extend(["-f".into(), "gdigrab".into(), "-i".into(), "desktop".into()]);

    args
}
