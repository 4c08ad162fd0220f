//! Recording session implementation
//!
//! Owns one active capture session: the log sink, per-category counters,
//! and the Idle -> Recording -> Idle state machine with a transient
//! Stopping phase guarding concurrent stops. All writes and counter
//! updates are serialized through one lock, which is the total order on
//! log lines.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use chrono::Local;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};

use crate::data::{
    to_micro_precision, DeviceInfo, EventBody, EventCategory, LogRecord, SessionMetadata,
    SessionSummary,
};
use crate::error::{Result, TrackerError};
use crate::input::{EventConsumer, InputSource};
use crate::sink::EventSink;

/// What triggered a session start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartTrigger {
    /// Rising edge from the external recorder monitor
    RecorderEdge,
    /// Manual override (CLI or command channel)
    Manual,
}

/// Recorder link status captured into session metadata
#[derive(Debug, Clone, Default)]
pub struct RecorderContext {
    pub connected: bool,
    pub version: Option<String>,
}

/// Out-of-band notices from the record path to the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionNotice {
    /// Consecutive write failures crossed the configured threshold;
    /// the sink should be treated as unusable and the session stopped.
    WriteFailuresExceeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Recording,
    Stopping,
}

/// Per-category event counts for one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventCounters {
    pub mouse: u64,
    pub keyboard: u64,
    pub gamepad: u64,
    pub total: u64,
}

impl EventCounters {
    fn record(&mut self, category: EventCategory) {
        match category {
            EventCategory::Mouse => self.mouse += 1,
            EventCategory::Keyboard => self.keyboard += 1,
            EventCategory::Gamepad => self.gamepad += 1,
        }
        self.total += 1;
    }
}

/// Session-start settings, consumed from configuration
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Directory for session log files
    pub save_dir: PathBuf,

    /// Consecutive record-write failures tolerated before escalating to a
    /// full stop
    pub max_consecutive_write_failures: u32,
}

/// Read-only status snapshot for display
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub session_id: String,
    pub log_path: PathBuf,
    pub counters: EventCounters,
}

struct ActiveLog {
    sink: EventSink,
    session_id: String,
    started_monotonic: Instant,
    counters: EventCounters,
    consecutive_write_failures: u32,
}

struct Inner {
    phase: Phase,
    active: Option<ActiveLog>,
}

/// One explicitly-owned recording session. The controller holds it in an
/// `Arc`; input sources see it only as an [`EventConsumer`].
pub struct RecordingSession {
    settings: SessionSettings,
    sources: Vec<Arc<dyn InputSource>>,
    inner: Mutex<Inner>,
    notice_tx: Mutex<Option<UnboundedSender<SessionNotice>>>,
}

impl RecordingSession {
    pub fn new(settings: SessionSettings, sources: Vec<Arc<dyn InputSource>>) -> Self {
        Self {
            settings,
            sources,
            inner: Mutex::new(Inner {
                phase: Phase::Idle,
                active: None,
            }),
            notice_tx: Mutex::new(None),
        }
    }

    /// Register the channel used for write-failure escalation notices.
    pub fn set_notice_sender(&self, tx: UnboundedSender<SessionNotice>) {
        *self.notice_tx.lock().unwrap() = Some(tx);
    }

    /// Start a new session: open the sink at a collision-resistant path,
    /// write the metadata header, reset counters, then arm the input
    /// sources. Fails with [`TrackerError::AlreadyRecording`] unless Idle.
    ///
    /// A sink failure rolls back completely (sink closed, state Idle, no
    /// source armed). A source that fails to arm is disabled for this
    /// session with a warning; the session starts with the remaining
    /// sources.
    pub fn start(
        self: &Arc<Self>,
        trigger: StartTrigger,
        recorder: RecorderContext,
    ) -> Result<PathBuf> {
        let started_wall = Local::now();
        let session_id = started_wall.format("%Y%m%d_%H%M%S").to_string();
        let path = self
            .settings
            .save_dir
            .join(format!("input_log_{}.jsonl", session_id));

        {
            let mut inner = self.inner.lock().unwrap();
            if inner.phase != Phase::Idle {
                return Err(TrackerError::AlreadyRecording);
            }

            let mut sink = EventSink::create(&path)?;
            let start_time_unix = unix_now();

            let metadata = SessionMetadata {
                session_id: session_id.clone(),
                start_time_unix,
                start_time_readable: started_wall.to_rfc3339(),
                obs_sync: trigger == StartTrigger::RecorderEdge,
                obs_connected: recorder.connected,
                obs_version: recorder.version,
                device: DeviceInfo::detect(),
                enabled_sources: self.sources.iter().map(|s| s.name().to_string()).collect(),
            };
            let header = LogRecord {
                timestamp: 0.0,
                absolute_time: start_time_unix,
                body: EventBody::SessionStart(metadata),
            };

            if let Err(e) = sink.write_record(&header) {
                let _ = sink.close();
                return Err(e);
            }

            inner.active = Some(ActiveLog {
                sink,
                session_id: session_id.clone(),
                started_monotonic: Instant::now(),
                counters: EventCounters::default(),
                consecutive_write_failures: 0,
            });
            inner.phase = Phase::Recording;
        }

        // Arm outside the lock; sources deliver from their own threads and
        // the record path takes the same lock.
        let consumer: Arc<dyn EventConsumer> = self.clone();
        for source in &self.sources {
            if let Err(e) = source.arm(consumer.clone()) {
                warn!(
                    "Input source '{}' disabled for this session: {}",
                    source.name(),
                    e
                );
            }
        }

        info!("Input tracking started: {:?} (session {})", path, session_id);
        Ok(path)
    }

    /// Stop the active session: disarm sources (bounded waits), append the
    /// SessionEnd record with final counters, close the sink, return to
    /// Idle. Duplicate/concurrent stops collapse; returns whether this
    /// call performed the stop.
    pub fn stop(&self) -> bool {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.phase != Phase::Recording {
                return false;
            }
            inner.phase = Phase::Stopping;
        }

        // Late events now see Stopping and are dropped cleanly.
        for source in &self.sources {
            source.disarm();
        }

        let mut inner = self.inner.lock().unwrap();
        if let Some(mut active) = inner.active.take() {
            let duration = active.started_monotonic.elapsed().as_secs_f64();
            let summary = SessionSummary {
                total_events: active.counters.total,
                mouse_events: active.counters.mouse,
                keyboard_events: active.counters.keyboard,
                gamepad_events: active.counters.gamepad,
                duration_seconds: to_micro_precision(duration),
            };
            let record = LogRecord {
                timestamp: to_micro_precision(duration),
                absolute_time: unix_now(),
                body: EventBody::SessionEnd(summary),
            };

            if let Err(e) = active.sink.write_record(&record) {
                warn!("Failed to write session summary: {}", e);
            }
            if let Err(e) = active.sink.close() {
                warn!("Failed to close log file: {}", e);
            }

            info!(
                "Input tracking stopped (session {}, {} events)",
                active.session_id, active.counters.total
            );
        }
        inner.phase = Phase::Idle;
        true
    }

    pub fn is_recording(&self) -> bool {
        self.inner.lock().unwrap().phase == Phase::Recording
    }

    /// Status snapshot of the active session, if any
    pub fn status(&self) -> Option<SessionStatus> {
        let inner = self.inner.lock().unwrap();
        inner.active.as_ref().map(|active| SessionStatus {
            session_id: active.session_id.clone(),
            log_path: active.sink.path().to_path_buf(),
            counters: active.counters,
        })
    }

    fn record(&self, body: EventBody) {
        // Session markers are produced by the session itself, never
        // accepted from sources.
        let Some(category) = body.category() else {
            return;
        };

        let mut inner = self.inner.lock().unwrap();
        if inner.phase != Phase::Recording {
            return;
        }
        let Some(active) = inner.active.as_mut() else {
            return;
        };

        let record = LogRecord {
            timestamp: to_micro_precision(active.started_monotonic.elapsed().as_secs_f64()),
            absolute_time: unix_now(),
            body,
        };
        active.counters.record(category);

        match active.sink.write_record(&record) {
            Ok(()) => active.consecutive_write_failures = 0,
            Err(e) => {
                active.consecutive_write_failures += 1;
                warn!(
                    "Dropped log record ({} consecutive write failures): {}",
                    active.consecutive_write_failures, e
                );
                if active.consecutive_write_failures
                    == self.settings.max_consecutive_write_failures
                {
                    error!("Log sink looks unusable, requesting session stop");
                    if let Some(tx) = self.notice_tx.lock().unwrap().as_ref() {
                        let _ = tx.send(SessionNotice::WriteFailuresExceeded);
                    }
                }
            }
        }
    }
}

impl EventConsumer for RecordingSession {
    fn consume(&self, event: EventBody) {
        self.record(event);
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{KeyEvent, MouseMoveEvent, MouseWheelEvent};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    static DIR_SEQ: AtomicU32 = AtomicU32::new(0);

    fn temp_save_dir() -> PathBuf {
        let seq = DIR_SEQ.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!(
            "obs-input-tracker-session-{}-{}",
            std::process::id(),
            seq
        ))
    }

    /// Inert source that records its armed state
    struct TestSource {
        name: &'static str,
        armed: AtomicBool,
        fail_arm: bool,
    }

    impl TestSource {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                armed: AtomicBool::new(false),
                fail_arm: false,
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                armed: AtomicBool::new(false),
                fail_arm: true,
            })
        }

        fn is_armed(&self) -> bool {
            self.armed.load(Ordering::SeqCst)
        }
    }

    impl InputSource for TestSource {
        fn name(&self) -> &'static str {
            self.name
        }

        fn arm(&self, _consumer: Arc<dyn EventConsumer>) -> Result<()> {
            if self.fail_arm {
                return Err(TrackerError::Device {
                    source_name: self.name,
                    reason: "test arm failure".to_string(),
                });
            }
            self.armed.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn disarm(&self) {
            self.armed.store(false, Ordering::SeqCst);
        }
    }

    fn settings(save_dir: PathBuf) -> SessionSettings {
        SessionSettings {
            save_dir,
            max_consecutive_write_failures: 5,
        }
    }

    fn key_event(key: &str) -> EventBody {
        EventBody::KeyDown(KeyEvent {
            key: key.to_string(),
        })
    }

    fn mouse_event(dx: f64, dy: f64) -> EventBody {
        EventBody::MouseMove(MouseMoveEvent {
            dx,
            dy,
            x: None,
            y: None,
        })
    }

    fn read_records(path: &std::path::Path) -> Vec<LogRecord> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn session_log_is_framed_by_metadata_and_summary() {
        let source = TestSource::new("mouse");
        let sources: Vec<Arc<dyn InputSource>> = vec![source.clone()];
        let session = Arc::new(RecordingSession::new(settings(temp_save_dir()), sources));

        let path = session
            .start(StartTrigger::Manual, RecorderContext::default())
            .unwrap();
        assert!(source.is_armed());

        session.consume(mouse_event(1.0, 0.0));
        session.consume(mouse_event(0.0, 1.0));
        session.consume(key_event("a"));
        assert!(session.stop());
        assert!(!source.is_armed());

        let records = read_records(&path);
        assert_eq!(records.len(), 5);

        match &records[0].body {
            EventBody::SessionStart(meta) => {
                assert!(!meta.obs_sync);
                assert_eq!(meta.enabled_sources, vec!["mouse".to_string()]);
            }
            other => panic!("expected SessionStart first, got {:?}", other),
        }
        match &records[4].body {
            EventBody::SessionEnd(summary) => {
                assert_eq!(summary.total_events, 3);
                assert_eq!(summary.mouse_events, 2);
                assert_eq!(summary.keyboard_events, 1);
                assert_eq!(summary.gamepad_events, 0);
            }
            other => panic!("expected SessionEnd last, got {:?}", other),
        }

        // Relative timestamps never decrease across the file
        for pair in records.windows(2) {
            assert!(pair[1].timestamp >= pair[0].timestamp);
        }
    }

    #[test]
    fn start_while_recording_fails_without_restart() {
        let session = Arc::new(RecordingSession::new(
            settings(temp_save_dir()),
            vec![TestSource::new("mouse") as Arc<dyn InputSource>],
        ));

        let first = session
            .start(StartTrigger::Manual, RecorderContext::default())
            .unwrap();
        let second = session.start(StartTrigger::Manual, RecorderContext::default());
        assert!(matches!(second, Err(TrackerError::AlreadyRecording)));

        // The original session is untouched
        assert!(session.is_recording());
        assert_eq!(session.status().unwrap().log_path, first);
        session.stop();
    }

    #[test]
    fn stop_is_idempotent() {
        let session = Arc::new(RecordingSession::new(settings(temp_save_dir()), vec![]));

        let path = session
            .start(StartTrigger::Manual, RecorderContext::default())
            .unwrap();
        session.consume(key_event("x"));
        assert!(session.stop());
        assert!(!session.stop());

        let records = read_records(&path);
        let ends = records
            .iter()
            .filter(|r| matches!(r.body, EventBody::SessionEnd(_)))
            .count();
        assert_eq!(ends, 1);
    }

    #[test]
    fn events_outside_recording_are_dropped() {
        let session = Arc::new(RecordingSession::new(settings(temp_save_dir()), vec![]));

        session.consume(key_event("early"));
        let path = session
            .start(StartTrigger::Manual, RecorderContext::default())
            .unwrap();
        session.consume(key_event("during"));
        session.stop();
        session.consume(key_event("late"));

        let records = read_records(&path);
        assert_eq!(records.len(), 3); // metadata + one event + summary
    }

    #[test]
    fn failed_sink_open_leaves_no_source_armed() {
        let blocker = temp_save_dir();
        std::fs::create_dir_all(blocker.parent().unwrap()).unwrap();
        std::fs::write(&blocker, b"not a directory").unwrap();

        let source = TestSource::new("mouse");
        let sources: Vec<Arc<dyn InputSource>> = vec![source.clone()];
        let session = Arc::new(RecordingSession::new(settings(blocker.join("logs")), sources));

        let result = session.start(StartTrigger::Manual, RecorderContext::default());
        assert!(matches!(result, Err(TrackerError::File { .. })));
        assert!(!source.is_armed());
        assert!(!session.is_recording());
    }

    #[test]
    fn arm_failure_disables_only_that_source() {
        let good = TestSource::new("mouse");
        let bad = TestSource::failing("gamepad");
        let sources: Vec<Arc<dyn InputSource>> = vec![bad.clone(), good.clone()];
        let session = Arc::new(RecordingSession::new(settings(temp_save_dir()), sources));

        session
            .start(StartTrigger::Manual, RecorderContext::default())
            .unwrap();
        assert!(session.is_recording());
        assert!(good.is_armed());
        assert!(!bad.is_armed());
        session.stop();
    }

    #[test]
    fn concurrent_producers_keep_counts_and_order() {
        let session = Arc::new(RecordingSession::new(settings(temp_save_dir()), vec![]));
        let path = session
            .start(StartTrigger::Manual, RecorderContext::default())
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let session = session.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..25 {
                    if i % 2 == 0 {
                        session.consume(key_event("k"));
                    } else {
                        session.consume(EventBody::MouseWheel(MouseWheelEvent { dx: 0, dy: 1 }));
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        session.stop();

        let records = read_records(&path);
        assert_eq!(records.len(), 102); // metadata + 100 events + summary

        match &records.last().unwrap().body {
            EventBody::SessionEnd(summary) => {
                assert_eq!(summary.total_events, 100);
                assert_eq!(summary.keyboard_events, 52);
                assert_eq!(summary.mouse_events, 48);
            }
            other => panic!("expected SessionEnd last, got {:?}", other),
        }

        for pair in records.windows(2) {
            assert!(pair[1].timestamp >= pair[0].timestamp);
        }
    }
}
