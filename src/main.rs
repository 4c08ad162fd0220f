//! OBS companion input tracker
//!
//! Mirrors OBS recording state over WebSocket and writes a timestamped
//! input event log (mouse, keyboard, gamepad) alongside each recording.

mod config;
mod controller;
mod data;
mod encoder;
mod error;
mod input;
mod logging;
mod obs;
mod session;
mod sink;

use std::sync::Arc;

use anyhow::Result;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::controller::{create_controller_channels, ControllerCommand, SessionController};
use crate::encoder::EncoderProcess;
use crate::input::build_sources;
use crate::obs::RecorderMonitor;
use crate::session::{RecordingSession, SessionSettings};

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = logging::init_logging()?;

    info!("OBS input tracker starting...");

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let manual_start = args.iter().any(|a| a == "--manual" || a == "-m");
    let no_obs = args.iter().any(|a| a == "--no-obs");

    // Load configuration
    let config = Config::load()?;
    info!("Configuration loaded from {:?}", config.config_path()?);

    let sources = build_sources(&config);
    if sources.is_empty() {
        warn!("All input sources are disabled; session logs will only contain markers");
    }

    let session = Arc::new(RecordingSession::new(
        SessionSettings {
            save_dir: config.recording.save_directory.clone(),
            max_consecutive_write_failures: config.recording.max_consecutive_write_failures,
        },
        sources,
    ));

    // Recorder link. A connect failure is not fatal: manual capture keeps
    // working and the failure is surfaced as a warning.
    let (monitor, edge_rx) = if no_obs {
        info!("Recorder integration disabled (--no-obs)");
        (None, None)
    } else {
        let (edge_tx, edge_rx) = mpsc::unbounded_channel();
        match RecorderMonitor::connect(config.obs.clone(), edge_tx).await {
            Ok(monitor) => (Some(monitor), Some(edge_rx)),
            Err(e) => {
                warn!("{}", e);
                warn!("Running without recorder sync; start sessions manually with --manual");
                (None, None)
            }
        }
    };

    let encoder = if config.encoder.enabled {
        Some(EncoderProcess::new(config.encoder.clone()))
    } else {
        None
    };

    let (cmd_tx, cmd_rx, status_tx, _status_rx) = create_controller_channels();
    let controller = SessionController::new(session, monitor, edge_rx, cmd_rx, status_tx, encoder);

    // Ctrl+C requests an orderly shutdown through the command channel so
    // an active session is finalized before exit.
    let ctrl_c_tx = cmd_tx.clone();
    ctrlc::set_handler(move || {
        info!("Ctrl+C received, shutting down...");
        let _ = ctrl_c_tx.blocking_send(ControllerCommand::Shutdown);
    })?;

    // Interactive commands stand in for the manual controls of a GUI
    let stdin_cmd_tx = cmd_tx.clone();
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let cmd = match line.trim() {
                "start" => ControllerCommand::StartCapture,
                "stop" => ControllerCommand::StopCapture,
                "status" => ControllerCommand::GetStatus,
                "quit" | "exit" => ControllerCommand::Shutdown,
                "" => continue,
                other => {
                    warn!("Unknown command '{}' (try: start, stop, status, quit)", other);
                    continue;
                }
            };
            if stdin_cmd_tx.send(cmd).await.is_err() {
                break;
            }
        }
    });

    if manual_start {
        cmd_tx.send(ControllerCommand::StartCapture).await?;
    }

    if let Err(e) = controller.run().await {
        error!("Controller error: {:#}", e);
    }

    info!("OBS input tracker shut down");
    Ok(())
}

fn print_help() {
    println!("obs-input-tracker - Timestamped input logs synced to OBS recordings");
    println!();
    println!("USAGE:");
    println!("    obs-input-tracker [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help      Print this help message");
    println!("    -m, --manual    Start a capture session immediately");
    println!("    --no-obs        Do not connect to OBS (manual capture only)");
    println!();
    println!("ENVIRONMENT:");
    println!("    RUST_LOG        Set log level (e.g., debug, info, warn)");
    println!();
    println!("COMMANDS (stdin):");
    println!("    start | stop | status | quit");
    println!();
    println!("Tracking normally starts and stops automatically with OBS recording.");
}
