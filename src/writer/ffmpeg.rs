//! FFmpeg-backed MP4 chunk writer
//!
//! Encodes raw RGB24 frames to H.264 MP4 by piping them to an ffmpeg child
//! process on stdin. One child per chunk; closing stdin finalizes the file.

use super::{ChunkError, ChunkFormat, ChunkWriter};
use crate::capture::{Frame, FrameSize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

/// H.264-in-MP4 chunk format
#[derive(Debug, Default, Clone)]
pub struct Mp4ChunkFormat;

impl Mp4ChunkFormat {
    pub fn new() -> Self {
        Self
    }
}

impl ChunkFormat for Mp4ChunkFormat {
    fn extension(&self) -> &'static str {
        "mp4"
    }

    fn open(
        &self,
        path: &Path,
        size: FrameSize,
        frame_rate: f64,
    ) -> Result<Box<dyn ChunkWriter>, ChunkError> {
        let path_str = path.to_str().ok_or_else(|| ChunkError::CannotCreate {
            path: path.to_path_buf(),
            reason: "path is not valid UTF-8".to_string(),
        })?;

        let mut process = Command::new("ffmpeg")
            .args([
                "-y",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "-s",
                &format!("{}x{}", size.width, size.height),
                "-r",
                &frame_rate.to_string(),
                "-i",
                "-",
                "-c:v",
                "libx264",
                "-preset",
                "veryfast",
                "-pix_fmt",
                "yuv420p",
                "-movflags",
                "+faststart",
                path_str,
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ChunkError::CannotCreate {
                path: path.to_path_buf(),
                reason: format!("failed to start ffmpeg encoder: {}", e),
            })?;

        let stdin = process.stdin.take().ok_or_else(|| ChunkError::CannotCreate {
            path: path.to_path_buf(),
            reason: "failed to capture ffmpeg stdin".to_string(),
        })?;

        tracing::info!("Opened chunk {}", path.display());

        Ok(Box::new(FfmpegChunkWriter {
            process,
            stdin: Some(stdin),
            path: path.to_path_buf(),
            frame_count: 0,
        }))
    }
}

/// One encoder child writing a single chunk file
pub struct FfmpegChunkWriter {
    process: Child,
    stdin: Option<ChildStdin>,
    path: PathBuf,
    frame_count: u64,
}

impl ChunkWriter for FfmpegChunkWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), ChunkError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ChunkError::Write("encoder already finished".to_string()))?;
        stdin
            .write_all(frame.data())
            .map_err(|e| ChunkError::Write(e.to_string()))?;
        self.frame_count += 1;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<(), ChunkError> {
        // Closing stdin signals EOF; the encoder then writes the trailer
        drop(self.stdin.take());

        let status = self
            .process
            .wait()
            .map_err(|e| ChunkError::Finalize(e.to_string()))?;
        if !status.success() {
            return Err(ChunkError::Finalize(format!(
                "ffmpeg exited with {} for {}",
                status,
                self.path.display()
            )));
        }

        tracing::info!(
            "Finished chunk {} ({} frames)",
            self.path.display(),
            self.frame_count
        );
        Ok(())
    }
}

impl Drop for FfmpegChunkWriter {
    fn drop(&mut self) {
        // Reached only if the writer was dropped without finish()
        if self.stdin.take().is_some() {
            let _ = self.process.wait();
        }
    }
}
