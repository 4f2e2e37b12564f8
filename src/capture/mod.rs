//! Frame capture abstractions
//!
//! Defines the frame type and the traits a live video source must implement.
//! The production implementation (`ffmpeg`) decodes a network stream via an
//! ffmpeg child process; tests substitute synthetic sources.

pub mod ffmpeg;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from opening or reading a frame source
#[derive(Error, Debug)]
pub enum CaptureError {
    /// The stream could not be opened; callers retry later
    #[error("stream unavailable: {0}")]
    Unavailable(String),

    /// No frame was produced this tick; not fatal, callers re-poll
    #[error("no frame available")]
    NoFrame,
}

/// Frame dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    /// Byte length of one tightly packed RGB24 frame at this size
    pub fn byte_len(&self) -> usize {
        (self.width as usize) * (self.height as usize) * 3
    }
}

/// One decoded video frame, tightly packed RGB24, rows top to bottom
#[derive(Debug, Clone)]
pub struct Frame {
    size: FrameSize,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap a raw RGB24 buffer. The buffer length must match the size.
    pub fn new(size: FrameSize, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), size.byte_len());
        Self { size, data }
    }

    pub fn size(&self) -> FrameSize {
        self.size
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mirror the frame vertically in place (first row becomes last)
    pub fn flip_vertical(&mut self) {
        let row_len = (self.size.width as usize) * 3;
        if row_len == 0 {
            return;
        }
        let height = self.size.height as usize;
        for row in 0..height / 2 {
            let top = row * row_len;
            let bottom = (height - 1 - row) * row_len;
            for col in 0..row_len {
                self.data.swap(top + col, bottom + col);
            }
        }
    }
}

/// A live feed of decoded frames from one opened stream
pub trait FrameSource: Send {
    /// Read the next frame. `NoFrame` means "nothing this tick"; the caller
    /// re-polls or waits for its periodic reconnect.
    fn read_frame(&mut self) -> Result<Frame, CaptureError>;
}

/// Opens network streams; the seam the session loop reconnects through
pub trait SourceConnector: Send + Sync {
    fn open(&self, url: &str) -> Result<Box<dyn FrameSource>, CaptureError>;
}
