//! Gamepad capture source (gilrs, fixed-interval poll)

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use gilrs::{Axis, Button, Gilrs};
use tracing::{debug, info, warn};

use crate::data::{
    EventBody, GamepadAxisEvent, GamepadButtonEvent, GamepadButtonState, GamepadDPadEvent,
};
use crate::error::{Result, TrackerError};
use crate::input::{EventConsumer, InputSource};

/// How long arm() waits for the poll worker to report readiness
const ARM_READY_TIMEOUT: Duration = Duration::from_secs(2);

/// How long disarm() waits for the poll worker to exit before abandoning it
const DISARM_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct GamepadSettings {
    pub poll_interval: Duration,

    /// Stick readings at/below this magnitude are treated as drift noise
    pub stick_deadzone: f64,
}

struct Worker {
    stop: Arc<AtomicBool>,
    done_rx: mpsc::Receiver<()>,
    handle: thread::JoinHandle<()>,
}

/// Gamepad source backed by a dedicated poll thread.
///
/// Unlike the OS-hook sources, the worker is created per arm and torn down
/// on disarm; the gamepad subsystem is initialized inside the worker.
pub struct GamepadSource {
    settings: GamepadSettings,
    worker: Mutex<Option<Worker>>,
}

impl GamepadSource {
    pub fn new(settings: GamepadSettings) -> Self {
        Self {
            settings,
            worker: Mutex::new(None),
        }
    }
}

impl InputSource for GamepadSource {
    fn name(&self) -> &'static str {
        "gamepad"
    }

    fn arm(&self, consumer: Arc<dyn EventConsumer>) -> Result<()> {
        let mut slot = self.worker.lock().unwrap();
        if slot.is_some() {
            return Ok(());
        }

        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel::<std::result::Result<usize, String>>();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let worker_stop = stop.clone();
        let settings = self.settings.clone();
        let handle = thread::Builder::new()
            .name("gamepad-capture".to_string())
            .spawn(move || {
                poll_worker(settings, consumer, worker_stop, ready_tx, done_tx);
            })
            .map_err(|e| TrackerError::Device {
                source_name: "gamepad",
                reason: format!("failed to spawn poll thread: {}", e),
            })?;

        match ready_rx.recv_timeout(ARM_READY_TIMEOUT) {
            Ok(Ok(count)) => {
                info!("Gamepad source armed, {} pad(s) connected", count);
                *slot = Some(Worker {
                    stop,
                    done_rx,
                    handle,
                });
                Ok(())
            }
            Ok(Err(reason)) => {
                let _ = handle.join();
                Err(TrackerError::Device {
                    source_name: "gamepad",
                    reason,
                })
            }
            Err(_) => {
                // Worker never became ready; tell it to exit and move on
                stop.store(true, Ordering::SeqCst);
                Err(TrackerError::Device {
                    source_name: "gamepad",
                    reason: "poll worker did not become ready in time".to_string(),
                })
            }
        }
    }

    fn disarm(&self) {
        let worker = self.worker.lock().unwrap().take();
        if let Some(worker) = worker {
            worker.stop.store(true, Ordering::SeqCst);
            match worker.done_rx.recv_timeout(DISARM_TIMEOUT) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    let _ = worker.handle.join();
                    debug!("Gamepad source disarmed");
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!("Gamepad worker unresponsive on disarm, abandoning it");
                }
            }
        }
    }
}

fn poll_worker(
    settings: GamepadSettings,
    consumer: Arc<dyn EventConsumer>,
    stop: Arc<AtomicBool>,
    ready_tx: mpsc::Sender<std::result::Result<usize, String>>,
    done_tx: mpsc::Sender<()>,
) {
    let mut gilrs = match Gilrs::new() {
        Ok(gilrs) => gilrs,
        Err(e) => {
            let _ = ready_tx.send(Err(format!("gamepad subsystem init failed: {}", e)));
            return;
        }
    };

    let pad_count = gilrs.gamepads().count();
    if pad_count == 0 {
        let _ = ready_tx.send(Err("no gamepads detected".to_string()));
        return;
    }
    let _ = ready_tx.send(Ok(pad_count));

    let mut dpad = DpadState::default();
    while !stop.load(Ordering::SeqCst) {
        while let Some(gilrs::Event { event, .. }) = gilrs.next_event() {
            if stop.load(Ordering::SeqCst) {
                break;
            }
            match event {
                gilrs::EventType::Connected => {
                    info!("Gamepad connected");
                }
                gilrs::EventType::Disconnected => {
                    warn!("Gamepad disconnected");
                }
                other => {
                    if let Some(body) = translate(other, &mut dpad, settings.stick_deadzone) {
                        consumer.consume(body);
                    }
                }
            }
        }
        thread::sleep(settings.poll_interval);
    }

    let _ = done_tx.send(());
}

/// Translate one driver event into a log payload, if it is loggable.
fn translate(event: gilrs::EventType, dpad: &mut DpadState, deadzone: f64) -> Option<EventBody> {
    match event {
        gilrs::EventType::ButtonPressed(button, code) => {
            if let Some(direction) = dpad_direction_of(button) {
                dpad.set(direction, true);
                Some(dpad.to_event())
            } else {
                button_body(button, code.into_u32(), GamepadButtonState::Press)
            }
        }
        gilrs::EventType::ButtonReleased(button, code) => {
            if let Some(direction) = dpad_direction_of(button) {
                dpad.set(direction, false);
                Some(dpad.to_event())
            } else {
                button_body(button, code.into_u32(), GamepadButtonState::Release)
            }
        }
        gilrs::EventType::ButtonChanged(button, value, _) => match button {
            Button::LeftTrigger2 => Some(trigger_event("left_trigger", value as f64)),
            Button::RightTrigger2 => Some(trigger_event("right_trigger", value as f64)),
            _ => None,
        },
        gilrs::EventType::AxisChanged(axis, value, _) => match axis {
            Axis::LeftStickX | Axis::LeftStickY | Axis::RightStickX | Axis::RightStickY => {
                let name = stick_axis_name(axis)?;
                filter_stick(value as f64, deadzone).map(|v| {
                    EventBody::GamepadAxis(GamepadAxisEvent {
                        axis: name.to_string(),
                        value: v,
                    })
                })
            }
            Axis::LeftZ => Some(trigger_event("left_trigger", value as f64)),
            Axis::RightZ => Some(trigger_event("right_trigger", value as f64)),
            Axis::DPadX => {
                dpad.set(DpadDirection::Right, value > 0.5);
                dpad.set(DpadDirection::Left, value < -0.5);
                Some(dpad.to_event())
            }
            Axis::DPadY => {
                dpad.set(DpadDirection::Up, value > 0.5);
                dpad.set(DpadDirection::Down, value < -0.5);
                Some(dpad.to_event())
            }
            _ => None,
        },
        _ => None,
    }
}

fn button_body(button: Button, raw_code: u32, state: GamepadButtonState) -> Option<EventBody> {
    // Triggers are reported as axes, not buttons
    if matches!(button, Button::LeftTrigger2 | Button::RightTrigger2) {
        return None;
    }
    Some(EventBody::GamepadButton(GamepadButtonEvent {
        button: button_name(button, raw_code),
        raw_code,
        state,
    }))
}

fn trigger_event(axis: &str, value: f64) -> EventBody {
    EventBody::GamepadAxis(GamepadAxisEvent {
        axis: axis.to_string(),
        value: normalize_trigger(value),
    })
}

/// Semantic button names, with a generic fallback for unmapped buttons
fn button_name(button: Button, raw_code: u32) -> String {
    match button {
        Button::South => "a_button".to_string(),
        Button::East => "b_button".to_string(),
        Button::West => "x_button".to_string(),
        Button::North => "y_button".to_string(),
        Button::LeftTrigger => "lb_shoulder".to_string(),
        Button::RightTrigger => "rb_shoulder".to_string(),
        Button::Select => "back_button".to_string(),
        Button::Start => "start_button".to_string(),
        Button::Mode => "guide_button".to_string(),
        Button::LeftThumb => "left_stick_press".to_string(),
        Button::RightThumb => "right_stick_press".to_string(),
        Button::C => "c_button".to_string(),
        Button::Z => "z_button".to_string(),
        _ => format!("button_{}", raw_code),
    }
}

fn stick_axis_name(axis: Axis) -> Option<&'static str> {
    match axis {
        Axis::LeftStickX => Some("left_stick_x"),
        Axis::LeftStickY => Some("left_stick_y"),
        Axis::RightStickX => Some("right_stick_x"),
        Axis::RightStickY => Some("right_stick_y"),
        _ => None,
    }
}

/// Suppress stick readings at/below the deadzone; pass the normalized
/// value through above it.
fn filter_stick(value: f64, deadzone: f64) -> Option<f64> {
    if value.abs() <= deadzone {
        None
    } else {
        Some(value)
    }
}

/// Triggers are logged as an unsigned 0..=1 range
fn normalize_trigger(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DpadDirection {
    Up,
    Down,
    Left,
    Right,
}

fn dpad_direction_of(button: Button) -> Option<DpadDirection> {
    match button {
        Button::DPadUp => Some(DpadDirection::Up),
        Button::DPadDown => Some(DpadDirection::Down),
        Button::DPadLeft => Some(DpadDirection::Left),
        Button::DPadRight => Some(DpadDirection::Right),
        _ => None,
    }
}

/// Current directional-pad level state, reported as a named combination
#[derive(Debug, Default)]
struct DpadState {
    up: bool,
    down: bool,
    left: bool,
    right: bool,
}

impl DpadState {
    fn set(&mut self, direction: DpadDirection, pressed: bool) {
        match direction {
            DpadDirection::Up => self.up = pressed,
            DpadDirection::Down => self.down = pressed,
            DpadDirection::Left => self.left = pressed,
            DpadDirection::Right => self.right = pressed,
        }
    }

    fn direction_name(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if self.up {
            parts.push("up");
        } else if self.down {
            parts.push("down");
        }
        if self.right {
            parts.push("right");
        } else if self.left {
            parts.push("left");
        }
        if parts.is_empty() {
            "neutral".to_string()
        } else {
            parts.join("_")
        }
    }

    fn raw_x(&self) -> i32 {
        self.right as i32 - self.left as i32
    }

    fn raw_y(&self) -> i32 {
        self.up as i32 - self.down as i32
    }

    fn to_event(&self) -> EventBody {
        EventBody::GamepadDPad(GamepadDPadEvent {
            direction: self.direction_name(),
            raw_x: self.raw_x(),
            raw_y: self.raw_y(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stick_deadzone_suppresses_at_or_below_threshold() {
        assert_eq!(filter_stick(0.05, 0.1), None);
        assert_eq!(filter_stick(-0.1, 0.1), None);
        assert_eq!(filter_stick(0.1, 0.1), None);
        assert_eq!(filter_stick(0.11, 0.1), Some(0.11));
        assert_eq!(filter_stick(-0.5, 0.1), Some(-0.5));
    }

    #[test]
    fn trigger_values_are_unsigned_normalized() {
        assert_eq!(normalize_trigger(-0.2), 0.0);
        assert_eq!(normalize_trigger(0.5), 0.5);
        assert_eq!(normalize_trigger(1.4), 1.0);
    }

    #[test]
    fn button_names_use_semantic_table_with_fallback() {
        assert_eq!(button_name(Button::South, 0), "a_button");
        assert_eq!(button_name(Button::Start, 7), "start_button");
        assert_eq!(button_name(Button::Unknown, 42), "button_42");
    }

    #[test]
    fn dpad_direction_combinations() {
        let mut dpad = DpadState::default();
        assert_eq!(dpad.direction_name(), "neutral");

        dpad.set(DpadDirection::Up, true);
        assert_eq!(dpad.direction_name(), "up");
        assert_eq!((dpad.raw_x(), dpad.raw_y()), (0, 1));

        dpad.set(DpadDirection::Right, true);
        assert_eq!(dpad.direction_name(), "up_right");

        dpad.set(DpadDirection::Up, false);
        dpad.set(DpadDirection::Down, true);
        dpad.set(DpadDirection::Right, false);
        dpad.set(DpadDirection::Left, true);
        assert_eq!(dpad.direction_name(), "down_left");
        assert_eq!((dpad.raw_x(), dpad.raw_y()), (-1, -1));
    }

    #[test]
    fn stick_axis_names_cover_both_sticks() {
        assert_eq!(stick_axis_name(Axis::LeftStickX), Some("left_stick_x"));
        assert_eq!(stick_axis_name(Axis::RightStickY), Some("right_stick_y"));
        assert_eq!(stick_axis_name(Axis::DPadX), None);
    }
}
