//! Recording session loop
//!
//! One thread per active recording. The loop owns its frame source and chunk
//! writer exclusively; the registry reaches it only through the shared stop
//! and flip flags in [`SessionControl`]. Per-frame failures are absorbed here
//! and logged; nothing propagates back to the request layer.

use crate::capture::{CaptureError, FrameSource, SourceConnector};
use crate::utils::time::format_timestamp;
use crate::writer::{ChunkError, ChunkFormat, ChunkWriter};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Everything a session loop needs to know, fixed at start time
#[derive(Debug, Clone)]
pub(crate) struct SessionConfig {
    pub user_id: String,
    pub source_url: String,
    pub chunk_prefix: String,
    pub recordings_root: PathBuf,
    pub chunk_interval: Duration,
    pub reconnect_interval: Duration,
    pub frame_rate: f64,
    pub idle_tick: Duration,
}

impl SessionConfig {
    /// Path for a chunk starting at `ts`:
    /// `<root>/<user>/<prefix>/<timestamp>.<ext>`
    fn chunk_path(&self, ts: DateTime<Utc>, extension: &str) -> PathBuf {
        self.recordings_root
            .join(&self.user_id)
            .join(&self.chunk_prefix)
            .join(format!("{}.{}", format_timestamp(ts), extension))
    }
}

/// Flags shared between the registry and one session loop
#[derive(Clone)]
pub(crate) struct SessionControl {
    pub stop: Arc<AtomicBool>,
    pub done: Arc<AtomicBool>,
    pub flip: Arc<AtomicBool>,
}

/// Marks the session done on every exit path, panics included
struct DoneGuard(Arc<AtomicBool>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Drive one recording session until stop is requested.
///
/// State machine: Connecting -> Capturing -> (Rotating) -> Capturing -> ...
/// -> Stopped. Failed opens and empty reads cost one idle tick and loop back
/// through the stop check, so a dead stream never makes the session
/// unkillable.
pub(crate) fn run(
    config: SessionConfig,
    control: SessionControl,
    connector: Arc<dyn SourceConnector>,
    format: Arc<dyn ChunkFormat>,
) {
    let _done = DoneGuard(Arc::clone(&control.done));

    tracing::info!(
        "Recording session for user {} capturing {} into {}",
        config.user_id,
        config.source_url,
        config.chunk_prefix
    );

    let mut source: Option<Box<dyn FrameSource>> = None;
    let mut source_opened: Option<Instant> = None;
    let mut writer: Option<Box<dyn ChunkWriter>> = None;
    let mut chunk_opened: Option<Instant> = None;

    while !control.stop.load(Ordering::Acquire) {
        // Connecting: first open, and the periodic reconnect thereafter.
        // The reconnect cadence deliberately matches the chunk interval by
        // default; the two clocks are tracked separately.
        let reconnect_due =
            source_opened.map_or(true, |opened| opened.elapsed() >= config.reconnect_interval);
        if source.is_none() || reconnect_due {
            match connector.open(&config.source_url) {
                Ok(opened) => {
                    source = Some(opened);
                    source_opened = Some(Instant::now());
                }
                Err(e) => {
                    tracing::debug!("Stream {} unavailable: {}", config.source_url, e);
                    source = None;
                    thread::sleep(config.idle_tick);
                    continue;
                }
            }
        }

        let Some(open_source) = source.as_mut() else {
            continue;
        };

        // Capturing: an empty tick just loops back through the stop check
        let mut frame = match open_source.read_frame() {
            Ok(frame) => frame,
            Err(CaptureError::NoFrame) | Err(CaptureError::Unavailable(_)) => {
                thread::sleep(config.idle_tick);
                continue;
            }
        };

        // Rotating: chunk boundary when the current chunk's first frame is
        // older than the chunk interval
        let rotate_due =
            chunk_opened.is_some_and(|opened| opened.elapsed() >= config.chunk_interval);
        if writer.is_none() || rotate_due {
            if let Some(full) = writer.take() {
                if let Err(e) = full.finish() {
                    tracing::warn!("Failed to finalize chunk: {}", e);
                }
            }

            match open_chunk(&config, format.as_ref(), frame.size()) {
                Ok(next) => {
                    writer = Some(next);
                    chunk_opened = Some(Instant::now());
                }
                Err(e) => {
                    // Unwritable destination; drop this frame and retry later
                    tracing::error!("Cannot create chunk for user {}: {}", config.user_id, e);
                    chunk_opened = None;
                    thread::sleep(config.idle_tick);
                    continue;
                }
            }
        }

        if control.flip.load(Ordering::Acquire) {
            frame.flip_vertical();
        }

        if let Some(open_writer) = writer.as_mut() {
            if let Err(e) = open_writer.write_frame(&frame) {
                tracing::warn!("Dropped frame for user {}: {}", config.user_id, e);
            }
        }
    }

    // Stopped: release the writer and the source on the way out
    if let Some(open_writer) = writer.take() {
        if let Err(e) = open_writer.finish() {
            tracing::warn!("Failed to finalize final chunk: {}", e);
        }
    }
    drop(source);

    tracing::info!("Recording session for user {} stopped", config.user_id);
}

/// Create the chunk's directory and open a writer for it
fn open_chunk(
    config: &SessionConfig,
    format: &dyn ChunkFormat,
    size: crate::capture::FrameSize,
) -> Result<Box<dyn ChunkWriter>, ChunkError> {
    let path = config.chunk_path(Utc::now(), format.extension());
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ChunkError::CannotCreate {
            path: path.clone(),
            reason: e.to_string(),
        })?;
    }
    format.open(&path, size, config.frame_rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::testutil::{RawChunkFormat, SolidFrameConnector};
    use crate::recorder::{RegistryConfig, SessionRegistry};
    use chrono::TimeZone;
    use std::fs;
    use tempfile::tempdir;

    fn chunk_files(dir: &std::path::Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        files.sort();
        files
    }

    fn config_for(root: &std::path::Path) -> SessionConfig {
        SessionConfig {
            user_id: "u1".to_string(),
            source_url: "stub://cam".to_string(),
            chunk_prefix: "p".to_string(),
            recordings_root: root.to_path_buf(),
            chunk_interval: Duration::from_secs(1),
            reconnect_interval: Duration::from_secs(1),
            frame_rate: 20.0,
            idle_tick: Duration::from_millis(2),
        }
    }

    #[test]
    fn test_chunk_paths_increase_with_time() {
        let dir = tempdir().unwrap();
        let config = config_for(dir.path());
        let base = Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 42).unwrap();

        let first = config.chunk_path(base, "mp4");
        let second = config.chunk_path(base + chrono::Duration::seconds(1), "mp4");
        assert!(second > first);
        assert_eq!(first.parent(), second.parent());
    }

    #[test]
    fn test_chunk_paths_isolated_per_user() {
        let dir = tempdir().unwrap();
        let ts = Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 42).unwrap();

        let mut a = config_for(dir.path());
        a.user_id = "alice".to_string();
        let mut b = config_for(dir.path());
        b.user_id = "bob".to_string();

        // Same second, same prefix: the user directory keeps them apart
        assert_ne!(a.chunk_path(ts, "mp4"), b.chunk_path(ts, "mp4"));
    }

    /// A 1s rotation interval against a synthetic source yields one chunk
    /// per elapsed second: 4 files after ~3.5s.
    #[test]
    fn test_rotation_produces_one_chunk_per_interval() {
        let dir = tempdir().unwrap();
        let registry = SessionRegistry::new(
            RegistryConfig {
                recordings_root: dir.path().to_path_buf(),
                chunk_interval_secs: 1,
                reconnect_interval_secs: 1,
                frame_rate: 20.0,
                idle_tick_ms: 2,
            },
            Arc::new(SolidFrameConnector::default()),
            Arc::new(RawChunkFormat),
        );

        registry.start_session("u1", "stub://cam", "clips").unwrap();

        let chunk_dir = dir.path().join("u1").join("clips");
        // Anchor timing to the first chunk actually appearing
        let deadline = Instant::now() + Duration::from_secs(2);
        while !chunk_dir.exists() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(chunk_dir.exists(), "no chunk directory was created");

        thread::sleep(Duration::from_millis(3500));
        registry.stop_session("u1");
        assert!(registry.await_idle("u1", Duration::from_secs(5)));

        let files = chunk_files(&chunk_dir);
        assert_eq!(files.len(), 4, "expected 4 chunks, got {:?}", files);

        // Strictly increasing names, never reused
        for pair in files.windows(2) {
            assert!(pair[0] < pair[1]);
        }

        // Each chunk holds at most one interval's worth of frames
        let frame_len = SolidFrameConnector::default().frame_len();
        for file in &files {
            let bytes = fs::metadata(file).unwrap().len() as usize;
            assert!(bytes > 0, "empty chunk {:?}", file);
            assert_eq!(bytes % frame_len, 0);
            let frames = bytes / frame_len;
            // Frames arrive every ~5ms; one 1s interval caps well under this
            assert!(frames <= 1000, "chunk {:?} spans too many frames", file);
        }
    }

    #[test]
    fn test_flip_applies_to_subsequent_frames() {
        let dir = tempdir().unwrap();
        let connector = SolidFrameConnector::default();
        let frame_len = connector.frame_len();
        let registry = SessionRegistry::new(
            RegistryConfig {
                recordings_root: dir.path().to_path_buf(),
                chunk_interval_secs: 60,
                reconnect_interval_secs: 60,
                frame_rate: 20.0,
                idle_tick_ms: 2,
            },
            Arc::new(connector),
            Arc::new(RawChunkFormat),
        );

        registry.start_session("u1", "stub://cam", "clips").unwrap();
        thread::sleep(Duration::from_millis(100));
        assert!(registry.toggle_flip("u1"));
        thread::sleep(Duration::from_millis(100));
        registry.stop_session("u1");
        assert!(registry.await_idle("u1", Duration::from_secs(5)));

        let files = chunk_files(&dir.path().join("u1").join("clips"));
        assert_eq!(files.len(), 1);
        let bytes = fs::read(&files[0]).unwrap();
        assert!(bytes.len() >= 2 * frame_len);

        let unflipped = SolidFrameConnector::pattern();
        let mut flipped = crate::capture::Frame::new(
            SolidFrameConnector::size(),
            unflipped.clone(),
        );
        flipped.flip_vertical();

        // First frame written before the toggle, last frame after it
        assert_eq!(&bytes[..frame_len], &unflipped[..]);
        let last = &bytes[bytes.len() - frame_len..];
        assert_eq!(last, flipped.data());
    }
}
