//! Keyboard capture source (rdev OS hook)

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use tracing::{debug, error, info};

use crate::data::{key_identity, EventBody, KeyEvent};
use crate::error::{Result, TrackerError};
use crate::input::{EventConsumer, InputSource};

struct KeyboardShared {
    armed: AtomicBool,
    consumer: Mutex<Option<Arc<dyn EventConsumer>>>,
    /// Identity recorded at press time, so a release whose event carries no
    /// text resolves to the same identity as its press.
    held: Mutex<HashMap<String, String>>,
    hook_started: AtomicBool,
}

/// Keyboard source backed by an rdev hook thread.
///
/// Same lifecycle as the mouse source: the hook thread is spawned once and
/// abandoned on disarm (events are dropped while disarmed).
pub struct KeyboardSource {
    shared: Arc<KeyboardShared>,
}

impl KeyboardSource {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(KeyboardShared {
                armed: AtomicBool::new(false),
                consumer: Mutex::new(None),
                held: Mutex::new(HashMap::new()),
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
            .name("keyboard-capture".to_string())
            .spawn(move || {
                info!("Keyboard hook thread started");
                let callback_shared = shared.clone();
                if let Err(e) = rdev::listen(move |event| callback_shared.handle(event)) {
                    error!("Keyboard hook failed: {:?}", e);
                    shared.hook_started.store(false, Ordering::SeqCst);
                }
            })
            .map_err(|e| {
                self.shared.hook_started.store(false, Ordering::SeqCst);
                TrackerError::Device {
                    source_name: "keyboard",
                    reason: format!("failed to spawn hook thread: {}", e),
                }
            })?;

        Ok(())
    }
}

impl Default for KeyboardSource {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyboardShared {
    fn handle(&self, event: rdev::Event) {
        if !self.armed.load(Ordering::SeqCst) {
            return;
        }

        let body = match event.event_type {
            rdev::EventType::KeyPress(key) => {
                let identity = key_identity(key, event.name.as_deref());
                self.held
                    .lock()
                    .unwrap()
                    .insert(format!("{:?}", key), identity.clone());
                EventBody::KeyDown(KeyEvent { key: identity })
            }
            rdev::EventType::KeyRelease(key) => {
                let identity = self
                    .held
                    .lock()
                    .unwrap()
                    .remove(&format!("{:?}", key))
                    .unwrap_or_else(|| key_identity(key, event.name.as_deref()));
                EventBody::KeyUp(KeyEvent { key: identity })
            }
            // Pointer events belong to the mouse source
            _ => return,
        };

        let consumer = self.consumer.lock().unwrap().clone();
        if let Some(consumer) = consumer {
            consumer.consume(body);
        }
    }
}

impl InputSource for KeyboardSource {
    fn name(&self) -> &'static str {
        "keyboard"
    }

    fn arm(&self, consumer: Arc<dyn EventConsumer>) -> Result<()> {
        self.shared.held.lock().unwrap().clear();
        *self.shared.consumer.lock().unwrap() = Some(consumer);
        self.ensure_hook()?;
        self.shared.armed.store(true, Ordering::SeqCst);
        debug!("Keyboard source armed");
        Ok(())
    }

    fn disarm(&self) {
        self.shared.armed.store(false, Ordering::SeqCst);
        self.shared.consumer.lock().unwrap().take();
        debug!("Keyboard source disarmed");
    }
}
