//! Input capture sources
//!
//! Three independently-lived producers (mouse, keyboard, gamepad) behind
//! one narrow trait pair. Sources are inert while disarmed.

mod gamepad;
mod keyboard;
mod mouse;

pub use gamepad::{GamepadSettings, GamepadSource};
pub use keyboard::KeyboardSource;
pub use mouse::{MouseSettings, MouseSource};

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::data::EventBody;
use crate::error::Result;

/// Consumer of input events. The recording session implements this.
pub trait EventConsumer: Send + Sync {
    fn consume(&self, event: EventBody);
}

/// One independently-lived input event producer.
///
/// "Disarmed" means consumer calls after that point are dropped, not that
/// calls already in flight are cancelled.
pub trait InputSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Begin delivering events to `consumer`.
    fn arm(&self, consumer: Arc<dyn EventConsumer>) -> Result<()>;

    /// Stop delivering events. Safe to call even if arm failed partway;
    /// never blocks longer than a bounded wait.
    fn disarm(&self);
}

/// Build the input sources enabled by configuration.
pub fn build_sources(config: &Config) -> Vec<Arc<dyn InputSource>> {
    let mut sources: Vec<Arc<dyn InputSource>> = Vec::new();

    let input = &config.input;
    if input.capture_mouse_move || input.capture_mouse_click || input.capture_mouse_scroll {
        sources.push(Arc::new(MouseSource::new(MouseSettings {
            include_position: config.recording.include_mouse_position,
            capture_move: input.capture_mouse_move,
            capture_click: input.capture_mouse_click,
            capture_scroll: input.capture_mouse_scroll,
        })));
    }

    if input.capture_keyboard {
        sources.push(Arc::new(KeyboardSource::new()));
    }

    if config.gamepad.enabled {
        sources.push(Arc::new(GamepadSource::new(GamepadSettings {
            poll_interval: Duration::from_millis(config.gamepad.poll_interval_ms),
            stick_deadzone: config.gamepad.stick_deadzone,
        })));
    }

    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn default_config_builds_all_three_sources() {
        let config = Config::default();
        let sources = build_sources(&config);
        let names: Vec<&str> = sources.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["mouse", "keyboard", "gamepad"]);
    }

    #[test]
    fn disabled_sources_are_not_built() {
        let mut config = Config::default();
        config.input.capture_keyboard = false;
        config.gamepad.enabled = false;
        let sources = build_sources(&config);
        let names: Vec<&str> = sources.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["mouse"]);
    }
}
