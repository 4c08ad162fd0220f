//! Mouse capture source (rdev OS hook)

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use tracing::{debug, error, info};

use crate::data::{
    mouse_button_name, ButtonAction, EventBody, MouseButtonEvent, MouseMoveEvent, MouseWheelEvent,
};
use crate::error::{Result, TrackerError};
use crate::input::{EventConsumer, InputSource};

#[derive(Debug, Clone)]
pub struct MouseSettings {
    /// Attach absolute coordinates to move/button records
    pub include_position: bool,
    pub capture_move: bool,
    pub capture_click: bool,
    pub capture_scroll: bool,
}

/// Tracks the last observed absolute position and yields non-zero deltas.
///
/// The first observation after a reset only seeds the tracker; redundant
/// samples (zero delta in both axes) are suppressed.
#[derive(Debug, Default)]
pub(crate) struct DeltaTracker {
    last: Option<(f64, f64)>,
}

impl DeltaTracker {
    pub(crate) fn reset(&mut self) {
        self.last = None;
    }

    pub(crate) fn observe(&mut self, x: f64, y: f64) -> Option<(f64, f64)> {
        let delta = self.last.map(|(lx, ly)| (x - lx, y - ly));
        self.last = Some((x, y));
        match delta {
            Some((dx, dy)) if dx != 0.0 || dy != 0.0 => Some((dx, dy)),
            _ => None,
        }
    }

    pub(crate) fn last_position(&self) -> Option<(f64, f64)> {
        self.last
    }
}

struct MouseShared {
    settings: MouseSettings,
    armed: AtomicBool,
    consumer: Mutex<Option<Arc<dyn EventConsumer>>>,
    tracker: Mutex<DeltaTracker>,
    hook_started: AtomicBool,
}

/// Mouse source backed by an rdev hook thread.
///
/// The hook thread is spawned on first arm and lives for the rest of the
/// process (the OS hook cannot be torn down from another thread); disarm
/// drops the consumer so subsequent callbacks are discarded.
pub struct MouseSource {
    shared: Arc<MouseShared>,
}

impl MouseSource {
    pub fn new(settings: MouseSettings) -> Self {
        Self {
            shared: Arc::new(MouseShared {
                settings,
                armed: AtomicBool::new(false),
                consumer: Mutex::new(None),
                tracker: Mutex::new(DeltaTracker::default()),
                hook_started: AtomicBool::new(false),
            }),
        }
    }

    fn ensure_hook(&self) -> Result<()> {
        if self.shared.hook_started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let shared = self.shared.clone();
        thread::Builder::new()
            .name("mouse-capture".to_string())
            .spawn(move || {
                info!("Mouse hook thread started");
                let callback_shared = shared.clone();
                if let Err(e) = rdev::listen(move |event| callback_shared.handle(event)) {
                    error!("Mouse hook failed: {:?}", e);
                    shared.hook_started.store(false, Ordering::SeqCst);
                }
            })
            .map_err(|e| {
                self.shared.hook_started.store(false, Ordering::SeqCst);
                TrackerError::Device {
                    source_name: "mouse",
                    reason: format!("failed to spawn hook thread: {}", e),
                }
            })?;

        Ok(())
    }
}

impl MouseShared {
    fn handle(&self, event: rdev::Event) {
        if !self.armed.load(Ordering::SeqCst) {
            return;
        }

        let body = match event.event_type {
            rdev::EventType::MouseMove { x, y } => {
                let mut tracker = self.tracker.lock().unwrap();
                let delta = tracker.observe(x, y);
                drop(tracker);

                if !self.settings.capture_move {
                    return;
                }
                match delta {
                    Some((dx, dy)) => {
                        let (px, py) = if self.settings.include_position {
                            (Some(x), Some(y))
                        } else {
                            (None, None)
                        };
                        EventBody::MouseMove(MouseMoveEvent { dx, dy, x: px, y: py })
                    }
                    None => return,
                }
            }
            rdev::EventType::ButtonPress(button) => {
                if !self.settings.capture_click {
                    return;
                }
                self.button_event(button, ButtonAction::Pressed)
            }
            rdev::EventType::ButtonRelease(button) => {
                if !self.settings.capture_click {
                    return;
                }
                self.button_event(button, ButtonAction::Released)
            }
            rdev::EventType::Wheel { delta_x, delta_y } => {
                if !self.settings.capture_scroll || (delta_x == 0 && delta_y == 0) {
                    return;
                }
                EventBody::MouseWheel(MouseWheelEvent {
                    dx: delta_x,
                    dy: delta_y,
                })
            }
            // Keyboard events belong to the keyboard source
            rdev::EventType::KeyPress(_) | rdev::EventType::KeyRelease(_) => return,
        };

        let consumer = self.consumer.lock().unwrap().clone();
        if let Some(consumer) = consumer {
            consumer.consume(body);
        }
    }

    fn button_event(&self, button: rdev::Button, action: ButtonAction) -> EventBody {
        // rdev button events carry no coordinates; fall back to the last
        // observed pointer position when position logging is on.
        let (x, y) = if self.settings.include_position {
            match self.tracker.lock().unwrap().last_position() {
                Some((x, y)) => (Some(x), Some(y)),
                None => (None, None),
            }
        } else {
            (None, None)
        };

        EventBody::MouseButton(MouseButtonEvent {
            button: mouse_button_name(button),
            action,
            x,
            y,
        })
    }
}

impl InputSource for MouseSource {
    fn name(&self) -> &'static str {
        "mouse"
    }

    fn arm(&self, consumer: Arc<dyn EventConsumer>) -> Result<()> {
        self.shared.tracker.lock().unwrap().reset();
        *self.shared.consumer.lock().unwrap() = Some(consumer);
        self.ensure_hook()?;
        self.shared.armed.store(true, Ordering::SeqCst);
        debug!("Mouse source armed");
        Ok(())
    }

    fn disarm(&self) {
        self.shared.armed.store(false, Ordering::SeqCst);
        self.shared.consumer.lock().unwrap().take();
        debug!("Mouse source disarmed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_tracker_suppresses_redundant_samples() {
        let mut tracker = DeltaTracker::default();
        let positions = [(0.0, 0.0), (0.0, 0.0), (1.0, 0.0), (1.0, 0.0), (1.0, 1.0)];

        let deltas: Vec<(f64, f64)> = positions
            .iter()
            .filter_map(|&(x, y)| tracker.observe(x, y))
            .collect();

        assert_eq!(deltas, vec![(1.0, 0.0), (0.0, 1.0)]);
    }

    #[test]
    fn delta_tracker_first_sample_only_seeds() {
        let mut tracker = DeltaTracker::default();
        assert_eq!(tracker.observe(100.0, 50.0), None);
        assert_eq!(tracker.observe(101.0, 50.0), Some((1.0, 0.0)));
    }

    #[test]
    fn delta_tracker_reset_forgets_position() {
        let mut tracker = DeltaTracker::default();
        tracker.observe(5.0, 5.0);
        tracker.reset();
        assert_eq!(tracker.observe(10.0, 10.0), None);
        assert_eq!(tracker.last_position(), Some((10.0, 10.0)));
    }
}
