//! Input event payloads and identity mapping

use serde::{Deserialize, Serialize};

/// Category of an input event, used for per-session counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    Mouse,
    Keyboard,
    Gamepad,
}

/// Mouse movement as a delta from the previously observed position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MouseMoveEvent {
    /// Horizontal delta since the last observed position
    pub dx: f64,

    /// Vertical delta since the last observed position
    pub dy: f64,

    /// Absolute X coordinate, present when position logging is enabled
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub x: Option<f64>,

    /// Absolute Y coordinate, present when position logging is enabled
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub y: Option<f64>,
}

/// Mouse button transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MouseButtonEvent {
    /// Button identity ("left", "right", "middle", "other_<n>")
    pub button: String,

    /// Press or release
    pub action: ButtonAction,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub x: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub y: Option<f64>,
}

/// Press/release state of a mouse button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonAction {
    Pressed,
    Released,
}

/// Mouse wheel motion; at least one delta is non-zero
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MouseWheelEvent {
    pub dx: i64,
    pub dy: i64,
}

/// Keyboard transition with a normalized key identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyEvent {
    /// Printable character, canonical symbolic name, or "unknown_<code>"
    pub key: String,
}

/// Gamepad button transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GamepadButtonEvent {
    /// Semantic button name ("a_button", "start_button", "button_<n>", ...)
    pub button: String,

    /// Platform button code as reported by the driver
    pub raw_code: u32,

    pub state: GamepadButtonState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GamepadButtonState {
    Press,
    Release,
}

/// Analog axis reading (stick axis in -1..=1, trigger in 0..=1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GamepadAxisEvent {
    /// Axis name ("left_stick_x", "right_trigger", ...)
    pub axis: String,

    pub value: f64,
}

/// Directional pad state as a named combination of directions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GamepadDPadEvent {
    /// "up", "up_right", "down_left", ..., or "neutral"
    pub direction: String,

    pub raw_x: i32,
    pub raw_y: i32,
}

/// Resolve a mouse button to its logged identity
pub fn mouse_button_name(button: rdev::Button) -> String {
    match button {
        rdev::Button::Left => "left".to_string(),
        rdev::Button::Right => "right".to_string(),
        rdev::Button::Middle => "middle".to_string(),
        rdev::Button::Unknown(n) => format!("other_{}", n),
    }
}

/// Resolve a key to its logged identity.
///
/// Preference order: the event's printable text when it is a single
/// non-control, non-whitespace character; else the canonical symbolic
/// name; else an explicit "unknown_<code>" sentinel. An event is never
/// dropped for lack of identity.
pub fn key_identity(key: rdev::Key, text: Option<&str>) -> String {
    if let Some(text) = text {
        let mut chars = text.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if !c.is_control() && !c.is_whitespace() {
                return c.to_string();
            }
        }
    }

    match key {
        rdev::Key::Unknown(code) => format!("unknown_{}", code),
        other => format!("{:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_identity_prefers_printable_text() {
        assert_eq!(key_identity(rdev::Key::KeyA, Some("a")), "a");
        assert_eq!(key_identity(rdev::Key::KeyA, Some("A")), "A");
    }

    #[test]
    fn key_identity_falls_back_to_symbolic_name() {
        assert_eq!(key_identity(rdev::Key::ShiftLeft, None), "ShiftLeft");
        assert_eq!(key_identity(rdev::Key::F5, Some("")), "F5");
        // Whitespace text is not a useful identity
        assert_eq!(key_identity(rdev::Key::Space, Some(" ")), "Space");
    }

    #[test]
    fn key_identity_unknown_sentinel() {
        assert_eq!(key_identity(rdev::Key::Unknown(250), None), "unknown_250");
    }

    #[test]
    fn mouse_button_names() {
        assert_eq!(mouse_button_name(rdev::Button::Left), "left");
        assert_eq!(mouse_button_name(rdev::Button::Unknown(7)), "other_7");
    }
}
