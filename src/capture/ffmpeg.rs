//! FFmpeg-backed frame source
//!
//! Decodes a network video stream (RTSP/HTTP/file URL) to raw RGB24 frames by
//! piping an ffmpeg child process. The stream is probed once with ffprobe to
//! learn its dimensions, then frames are read as fixed-size chunks from the
//! decoder's stdout.

use super::{CaptureError, Frame, FrameSize, FrameSource, SourceConnector};
use std::io::{BufReader, Read};
use std::process::{Child, ChildStdout, Command, Stdio};

/// Opens network streams by spawning an ffmpeg decoder per connection
#[derive(Debug, Default, Clone)]
pub struct FfmpegConnector;

impl FfmpegConnector {
    pub fn new() -> Self {
        Self
    }

    /// Probe the stream to get the video dimensions
    fn probe(url: &str) -> Result<FrameSize, CaptureError> {
        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height",
                "-of",
                "csv=p=0",
                url,
            ])
            .output()
            .map_err(|e| CaptureError::Unavailable(format!("failed to run ffprobe: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CaptureError::Unavailable(format!(
                "ffprobe failed: {}",
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let parts: Vec<&str> = stdout.trim().split(',').collect();
        if parts.len() < 2 {
            return Err(CaptureError::Unavailable(format!(
                "unexpected ffprobe output: {}",
                stdout
            )));
        }

        let width: u32 = parts[0]
            .parse()
            .map_err(|_| CaptureError::Unavailable("invalid width".to_string()))?;
        let height: u32 = parts[1]
            .parse()
            .map_err(|_| CaptureError::Unavailable("invalid height".to_string()))?;

        Ok(FrameSize { width, height })
    }
}

impl SourceConnector for FfmpegConnector {
    fn open(&self, url: &str) -> Result<Box<dyn FrameSource>, CaptureError> {
        let size = Self::probe(url)?;

        tracing::info!("Opening stream {}: {}x{}", url, size.width, size.height);

        // Decode to raw RGB24 on stdout; -s pins exact dimensions
        let mut process = Command::new("ffmpeg")
            .args([
                "-nostdin",
                "-i",
                url,
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "-s",
                &format!("{}x{}", size.width, size.height),
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                CaptureError::Unavailable(format!("failed to start ffmpeg decoder: {}", e))
            })?;

        let stdout = process.stdout.take().ok_or_else(|| {
            CaptureError::Unavailable("failed to capture ffmpeg stdout".to_string())
        })?;

        let frame_len = size.byte_len();
        Ok(Box::new(FfmpegFrameSource {
            process,
            stdout: BufReader::with_capacity(frame_len * 2, stdout),
            size,
        }))
    }
}

/// One open decoder pipe; reads fixed-size RGB24 frames until the child exits
pub struct FfmpegFrameSource {
    process: Child,
    stdout: BufReader<ChildStdout>,
    size: FrameSize,
}

impl FrameSource for FfmpegFrameSource {
    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        let mut data = vec![0u8; self.size.byte_len()];
        match self.stdout.read_exact(&mut data) {
            Ok(()) => Ok(Frame::new(self.size, data)),
            // EOF or a broken pipe both mean "no frame this tick"; the
            // session's periodic reconnect replaces a dead decoder.
            Err(_) => Err(CaptureError::NoFrame),
        }
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        if let Err(e) = self.process.kill() {
            tracing::debug!("ffmpeg decoder already exited: {}", e);
        }
        let _ = self.process.wait();
    }
}
