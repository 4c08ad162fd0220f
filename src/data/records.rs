//! Log record model: one self-contained JSON object per line

use serde::{Deserialize, Serialize};

use super::events::{
    EventCategory, GamepadAxisEvent, GamepadButtonEvent, GamepadDPadEvent, KeyEvent,
    MouseButtonEvent, MouseMoveEvent, MouseWheelEvent,
};

/// One record of the session log.
///
/// Serializes flat as `{"timestamp": .., "absolute_time": ..,
/// "event_type": "...", "details": {..}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Seconds since session start (monotonic clock), microsecond resolution
    pub timestamp: f64,

    /// Unix seconds (wall clock), informational
    pub absolute_time: f64,

    #[serde(flatten)]
    pub body: EventBody,
}

/// Tagged record body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "details")]
pub enum EventBody {
    SessionStart(SessionMetadata),
    MouseMove(MouseMoveEvent),
    MouseButton(MouseButtonEvent),
    MouseWheel(MouseWheelEvent),
    KeyDown(KeyEvent),
    KeyUp(KeyEvent),
    GamepadButton(GamepadButtonEvent),
    GamepadAxis(GamepadAxisEvent),
    GamepadDPad(GamepadDPadEvent),
    SessionEnd(SessionSummary),
}

impl EventBody {
    /// Counter category for input events; session markers are not counted
    pub fn category(&self) -> Option<EventCategory> {
        match self {
            EventBody::MouseMove(_) | EventBody::MouseButton(_) | EventBody::MouseWheel(_) => {
                Some(EventCategory::Mouse)
            }
            EventBody::KeyDown(_) | EventBody::KeyUp(_) => Some(EventCategory::Keyboard),
            EventBody::GamepadButton(_) | EventBody::GamepadAxis(_) | EventBody::GamepadDPad(_) => {
                Some(EventCategory::Gamepad)
            }
            EventBody::SessionStart(_) | EventBody::SessionEnd(_) => None,
        }
    }
}

/// First record of every log file. Written once, never rewritten in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: String,

    /// Unix seconds at session start
    pub start_time_unix: f64,

    /// RFC 3339 rendering of the start time, for humans
    pub start_time_readable: String,

    /// Whether this session was edge-triggered by the external recorder
    pub obs_sync: bool,

    /// Whether the recorder link was connected at start
    pub obs_connected: bool,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub obs_version: Option<String>,

    pub device: DeviceInfo,

    /// Names of the input sources this session will arm
    pub enabled_sources: Vec<String>,
}

/// Best-effort, informational device description. Unreliable by design;
/// absence of any field never blocks session start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub platform: String,
    pub agent_version: String,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub device_id: Option<String>,
}

impl DeviceInfo {
    pub fn detect() -> Self {
        Self {
            platform: std::env::consts::OS.to_string(),
            agent_version: env!("CARGO_PKG_VERSION").to_string(),
            device_id: machine_uid::get().ok(),
        }
    }
}

/// Last record of every log file, carrying the final counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub total_events: u64,
    pub mouse_events: u64,
    pub keyboard_events: u64,
    pub gamepad_events: u64,
    pub duration_seconds: f64,
}

/// Round a seconds value to microsecond precision for stable log output
pub(crate) fn to_micro_precision(seconds: f64) -> f64 {
    (seconds * 1_000_000.0).round() / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> SessionMetadata {
        SessionMetadata {
            session_id: "20250101_120000".to_string(),
            start_time_unix: 1735732800.0,
            start_time_readable: "2025-01-01T12:00:00+00:00".to_string(),
            obs_sync: true,
            obs_connected: true,
            obs_version: Some("30.1.2".to_string()),
            device: DeviceInfo {
                platform: "linux".to_string(),
                agent_version: "0.1.0".to_string(),
                device_id: None,
            },
            enabled_sources: vec!["mouse".to_string(), "keyboard".to_string()],
        }
    }

    #[test]
    fn record_serializes_flat_with_tag_and_details() {
        let record = LogRecord {
            timestamp: 1.234567,
            absolute_time: 1735732801.234567,
            body: EventBody::MouseMove(MouseMoveEvent {
                dx: 3.0,
                dy: -2.0,
                x: None,
                y: None,
            }),
        };

        let value: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&record).unwrap()).unwrap();
        assert_eq!(value["event_type"], "MouseMove");
        assert_eq!(value["details"]["dx"], 3.0);
        assert_eq!(value["timestamp"], 1.234567);
        // Optional position fields are absent when not logged
        assert!(value["details"].get("x").is_none());
    }

    #[test]
    fn session_markers_round_trip() {
        let record = LogRecord {
            timestamp: 0.0,
            absolute_time: 1735732800.0,
            body: EventBody::SessionStart(sample_metadata()),
        };

        let line = serde_json::to_string(&record).unwrap();
        let parsed: LogRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn categories_cover_input_events_only() {
        let key = EventBody::KeyDown(KeyEvent { key: "a".to_string() });
        assert_eq!(key.category(), Some(EventCategory::Keyboard));

        let marker = EventBody::SessionStart(sample_metadata());
        assert_eq!(marker.category(), None);
    }

    #[test]
    fn micro_precision_rounding() {
        assert_eq!(to_micro_precision(1.23456789), 1.234568);
        assert_eq!(to_micro_precision(0.0000004), 0.0);
    }
}
