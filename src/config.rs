//! Configuration management for the input tracker

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// OBS WebSocket configuration
    #[serde(default)]
    pub obs: ObsConfig,

    /// Session log configuration
    #[serde(default)]
    pub recording: RecordingConfig,

    /// Mouse/keyboard capture configuration
    #[serde(default)]
    pub input: InputConfig,

    /// Gamepad capture configuration
    #[serde(default)]
    pub gamepad: GamepadConfig,

    /// Standalone encoder configuration
    #[serde(default)]
    pub encoder: EncoderConfig,

    /// Path to config file (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObsConfig {
    /// OBS WebSocket host
    #[serde(default = "default_obs_host")]
    pub host: String,

    /// OBS WebSocket port
    #[serde(default = "default_obs_port")]
    pub port: u16,

    /// OBS WebSocket password (optional)
    pub password: Option<String>,

    /// Record-status polling interval (ms)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Retry interval after a failed poll (ms)
    #[serde(default = "default_retry_interval")]
    pub retry_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Directory for session log files
    #[serde(default = "default_save_directory")]
    pub save_directory: PathBuf,

    /// Attach absolute coordinates to mouse records
    #[serde(default = "default_true")]
    pub include_mouse_position: bool,

    /// Consecutive record-write failures tolerated before the session is
    /// stopped
    #[serde(default = "default_max_write_failures")]
    pub max_consecutive_write_failures: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Whether to capture keyboard events
    #[serde(default = "default_true")]
    pub capture_keyboard: bool,

    /// Whether to capture mouse movement
    #[serde(default = "default_true")]
    pub capture_mouse_move: bool,

    /// Whether to capture mouse clicks
    #[serde(default = "default_true")]
    pub capture_mouse_click: bool,

    /// Whether to capture mouse scroll
    #[serde(default = "default_true")]
    pub capture_mouse_scroll: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GamepadConfig {
    /// Whether to capture gamepad input
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Gamepad polling interval (ms)
    #[serde(default = "default_gamepad_poll_interval")]
    pub poll_interval_ms: u64,

    /// Stick readings at/below this magnitude are suppressed as drift
    #[serde(default = "default_stick_deadzone")]
    pub stick_deadzone: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Whether manual sessions should drive a standalone encoder
    #[serde(default)]
    pub enabled: bool,

    /// Encoder executable
    #[serde(default = "default_encoder_command")]
    pub command: String,

    /// Encoder arguments; the output path is appended. Empty means
    /// platform screen-grab defaults.
    #[serde(default)]
    pub args: Vec<String>,
}

// Default value functions
fn default_obs_host() -> String {
    "localhost".to_string()
}

fn default_obs_port() -> u16 {
    4455
}

fn default_poll_interval() -> u64 {
    500 // sub-second, responsive without hammering the websocket
}

fn default_retry_interval() -> u64 {
    2000
}

fn default_true() -> bool {
    true
}

fn default_max_write_failures() -> u32 {
    5
}

fn default_gamepad_poll_interval() -> u64 {
    10
}

fn default_stick_deadzone() -> f64 {
    0.1
}

fn default_encoder_command() -> String {
    "ffmpeg".to_string()
}

fn default_save_directory() -> PathBuf {
    if let Some(user_dirs) = directories::UserDirs::new() {
        if let Some(videos) = user_dirs.video_dir() {
            return videos.join("OBSInputLogs");
        }
        return user_dirs.home_dir().join("OBSInputLogs");
    }
    std::env::temp_dir().join("obs-input-logs")
}

impl Default for ObsConfig {
    fn default() -> Self {
        Self {
            host: default_obs_host(),
            port: default_obs_port(),
            password: None,
            poll_interval_ms: default_poll_interval(),
            retry_interval_ms: default_retry_interval(),
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            save_directory: default_save_directory(),
            include_mouse_position: true,
            max_consecutive_write_failures: default_max_write_failures(),
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            capture_keyboard: true,
            capture_mouse_move: true,
            capture_mouse_click: true,
            capture_mouse_scroll: true,
        }
    }
}

impl Default for GamepadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: default_gamepad_poll_interval(),
            stick_deadzone: default_stick_deadzone(),
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            command: default_encoder_command(),
            args: Vec::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            obs: ObsConfig::default(),
            recording: RecordingConfig::default(),
            input: InputConfig::default(),
            gamepad: GamepadConfig::default(),
            encoder: EncoderConfig::default(),
            config_path: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location or create a default
    /// file there.
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

            let mut config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

            config.config_path = Some(config_path);
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = match &self.config_path {
            Some(path) => path.clone(),
            None => Self::default_config_path()?,
        };

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Get the config file path
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config_path {
            Some(path) => Ok(path.clone()),
            None => Self::default_config_path(),
        }
    }

    fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = directories::ProjectDirs::from("dev", "obs-input-tracker", "tracker")
            .context("Failed to determine config directory")?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_toml() {
        let config = Config::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();

        assert_eq!(parsed.obs.host, "localhost");
        assert_eq!(parsed.obs.port, 4455);
        assert_eq!(parsed.obs.poll_interval_ms, 500);
        assert_eq!(parsed.gamepad.stick_deadzone, 0.1);
        assert!(parsed.input.capture_keyboard);
        assert!(!parsed.encoder.enabled);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [obs]
            host = "192.168.1.20"
            port = 4456

            [gamepad]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(parsed.obs.host, "192.168.1.20");
        assert_eq!(parsed.obs.port, 4456);
        assert_eq!(parsed.obs.poll_interval_ms, 500);
        assert!(!parsed.gamepad.enabled);
        assert!(parsed.recording.include_mouse_position);
    }
}
