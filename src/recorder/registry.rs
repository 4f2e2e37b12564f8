//! Session registry
//!
//! Process-wide table of per-user recording state. This is the only shared
//! mutable state in the engine: command handlers and session loop threads
//! both go through it. Registry operations are short critical sections over
//! the map and per-user session slots; no I/O happens under a lock.

use crate::capture::SourceConnector;
use crate::recorder::session::{self, SessionConfig, SessionControl};
use crate::utils::time::format_timestamp;
use crate::writer::ChunkFormat;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Outcome of a start request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new session loop was spawned
    Started,
    /// The user already has a live session; nothing was done
    AlreadyRecording,
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryConfig {
    /// Root directory for chunk files
    #[serde(default = "default_recordings_root")]
    pub recordings_root: PathBuf,

    /// Wall-clock length of one chunk, in seconds
    #[serde(default = "default_interval_secs")]
    pub chunk_interval_secs: u64,

    /// How often the session reopens its stream, in seconds.
    /// Defaults to the chunk interval; the two cadences are configured
    /// separately but intentionally match.
    #[serde(default = "default_interval_secs")]
    pub reconnect_interval_secs: u64,

    /// Frame rate declared to chunk writers
    #[serde(default = "default_frame_rate")]
    pub frame_rate: f64,

    /// Sleep between loop iterations when no frame arrived, in milliseconds.
    /// Bounds busy-spin against an unavailable stream while keeping stop
    /// requests responsive.
    #[serde(default = "default_idle_tick_ms")]
    pub idle_tick_ms: u64,
}

fn default_recordings_root() -> PathBuf {
    PathBuf::from("recordings")
}

fn default_interval_secs() -> u64 {
    60 * 5
}

fn default_frame_rate() -> f64 {
    20.0
}

fn default_idle_tick_ms() -> u64 {
    25
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            recordings_root: default_recordings_root(),
            chunk_interval_secs: default_interval_secs(),
            reconnect_interval_secs: default_interval_secs(),
            frame_rate: default_frame_rate(),
            idle_tick_ms: default_idle_tick_ms(),
        }
    }
}

/// Control handle for one spawned session loop.
///
/// The registry owns this; the loop's internal state (source, writer, chunk
/// clock) belongs to the loop thread alone. The registry can only signal
/// stop and observe completion.
struct SessionHandle {
    stop: Arc<AtomicBool>,
    done: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SessionHandle {
    fn is_live(&self) -> bool {
        !self.done.load(Ordering::Acquire)
    }
}

/// Per-user state; created lazily on first use, lives for process lifetime
struct UserEntry {
    flip: Arc<AtomicBool>,
    session: Mutex<Option<SessionHandle>>,
}

impl UserEntry {
    fn new() -> Self {
        Self {
            flip: Arc::new(AtomicBool::new(false)),
            session: Mutex::new(None),
        }
    }
}

/// Process-wide mapping from user id to recording state
pub struct SessionRegistry {
    entries: Mutex<HashMap<String, Arc<UserEntry>>>,
    connector: Arc<dyn SourceConnector>,
    format: Arc<dyn ChunkFormat>,
    config: RegistryConfig,
}

impl SessionRegistry {
    /// Create a registry with explicit source and chunk-format backends
    pub fn new(
        config: RegistryConfig,
        connector: Arc<dyn SourceConnector>,
        format: Arc<dyn ChunkFormat>,
    ) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            connector,
            format,
            config,
        }
    }

    /// Create a registry with the production ffmpeg backends
    pub fn ffmpeg(config: RegistryConfig) -> Self {
        Self::new(
            config,
            Arc::new(crate::capture::ffmpeg::FfmpegConnector::new()),
            Arc::new(crate::writer::ffmpeg::Mp4ChunkFormat::new()),
        )
    }

    fn entry(&self, user_id: &str) -> Arc<UserEntry> {
        let mut entries = self.entries.lock();
        entries
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(UserEntry::new()))
            .clone()
    }

    fn peek(&self, user_id: &str) -> Option<Arc<UserEntry>> {
        self.entries.lock().get(user_id).cloned()
    }

    /// Whether the user currently has a live session loop
    pub fn is_recording(&self, user_id: &str) -> bool {
        self.peek(user_id).is_some_and(|entry| {
            entry
                .session
                .lock()
                .as_ref()
                .is_some_and(SessionHandle::is_live)
        })
    }

    /// Spawn a recording session for the user unless one is already live.
    ///
    /// The check and the spawn happen under the user's session-slot lock, so
    /// two concurrent starts cannot both win. An empty `chunk_prefix` means
    /// "derive from the start time"; the prefix is fixed once here so every
    /// chunk of the session lands under one directory.
    ///
    /// The only error is an OS failure to spawn the loop thread.
    pub fn start_session(
        &self,
        user_id: &str,
        source_url: &str,
        chunk_prefix: &str,
    ) -> std::io::Result<StartOutcome> {
        let entry = self.entry(user_id);
        let mut slot = entry.session.lock();

        if slot.as_ref().is_some_and(SessionHandle::is_live) {
            tracing::debug!("User {} is already recording", user_id);
            return Ok(StartOutcome::AlreadyRecording);
        }

        // Any previous session has exited; reclaim its thread
        if let Some(mut old) = slot.take() {
            if let Some(handle) = old.thread.take() {
                let _ = handle.join();
            }
        }

        let chunk_prefix = if chunk_prefix.is_empty() {
            format_timestamp(Utc::now())
        } else {
            chunk_prefix.to_string()
        };

        let config = SessionConfig {
            user_id: user_id.to_string(),
            source_url: source_url.to_string(),
            chunk_prefix,
            recordings_root: self.config.recordings_root.clone(),
            chunk_interval: Duration::from_secs(self.config.chunk_interval_secs),
            reconnect_interval: Duration::from_secs(self.config.reconnect_interval_secs),
            frame_rate: self.config.frame_rate,
            idle_tick: Duration::from_millis(self.config.idle_tick_ms),
        };

        let control = SessionControl {
            stop: Arc::new(AtomicBool::new(false)),
            done: Arc::new(AtomicBool::new(false)),
            flip: Arc::clone(&entry.flip),
        };

        let stop = Arc::clone(&control.stop);
        let done = Arc::clone(&control.done);
        let connector = Arc::clone(&self.connector);
        let format = Arc::clone(&self.format);

        let thread = thread::Builder::new()
            .name(format!("record-{}", user_id))
            .spawn(move || session::run(config, control, connector, format))?;

        tracing::info!("Started recording session for user {}", user_id);
        *slot = Some(SessionHandle {
            stop,
            done,
            thread: Some(thread),
        });
        Ok(StartOutcome::Started)
    }

    /// Request the user's session to stop.
    ///
    /// Always succeeds; with no live session it is a no-op. The loop observes
    /// the request at its next poll point and releases its resources on the
    /// way out. Callers needing full quiescence poll [`Self::is_recording`]
    /// or use [`Self::await_idle`].
    pub fn stop_session(&self, user_id: &str) {
        if let Some(entry) = self.peek(user_id) {
            if let Some(handle) = entry.session.lock().as_ref() {
                handle.stop.store(true, Ordering::Release);
                tracing::info!("Stop requested for user {}", user_id);
            }
        }
    }

    /// Toggle the user's flip flag and return the new value.
    ///
    /// Works with or without a live session; while recording, the loop sees
    /// the new value no later than its next frame.
    pub fn toggle_flip(&self, user_id: &str) -> bool {
        let entry = self.entry(user_id);
        let flipped = !entry.flip.fetch_xor(true, Ordering::AcqRel);
        tracing::debug!("Flip for user {} now {}", user_id, flipped);
        flipped
    }

    /// Current flip flag, `false` for unseen users
    pub fn get_flip(&self, user_id: &str) -> bool {
        self.peek(user_id)
            .is_some_and(|entry| entry.flip.load(Ordering::Acquire))
    }

    /// Block until the user's session has fully quiesced.
    ///
    /// Returns `false` if the session was still live at the deadline. On
    /// success the exited loop thread is joined and its handle reclaimed.
    pub fn await_idle(&self, user_id: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_recording(user_id) {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }

        if let Some(entry) = self.peek(user_id) {
            let mut slot = entry.session.lock();
            if let Some(handle) = slot.as_mut() {
                if let Some(thread) = handle.thread.take() {
                    let _ = thread.join();
                }
            }
        }
        true
    }

    /// Stop every live session and join its thread.
    ///
    /// Meant for process shutdown so open chunk writers get finalized. A
    /// session blocked on a stalled stream read can delay this until the
    /// read returns.
    pub fn shutdown(&self) {
        let entries: Vec<Arc<UserEntry>> = self.entries.lock().values().cloned().collect();

        for entry in &entries {
            if let Some(handle) = entry.session.lock().as_ref() {
                handle.stop.store(true, Ordering::Release);
            }
        }

        for entry in &entries {
            let thread = entry
                .session
                .lock()
                .as_mut()
                .and_then(|handle| handle.thread.take());
            if let Some(thread) = thread {
                let _ = thread.join();
            }
        }

        tracing::info!("All recording sessions stopped");
    }
}
