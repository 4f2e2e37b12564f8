//! Synthetic sources and chunk formats for engine tests

use crate::capture::{CaptureError, Frame, FrameSize, FrameSource, SourceConnector};
use crate::writer::{ChunkError, ChunkFormat, ChunkWriter};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::thread;
use std::time::Duration;

/// Produces one fixed test-pattern frame per tick.
///
/// Rows carry distinct values so a vertical flip is observable in the output
/// bytes.
#[derive(Debug, Clone)]
pub(crate) struct SolidFrameConnector {
    period: Duration,
}

impl Default for SolidFrameConnector {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(5),
        }
    }
}

impl SolidFrameConnector {
    pub(crate) fn size() -> FrameSize {
        FrameSize {
            width: 4,
            height: 4,
        }
    }

    /// The frame bytes every tick produces: row r filled with value r
    pub(crate) fn pattern() -> Vec<u8> {
        let size = Self::size();
        let row_len = (size.width as usize) * 3;
        let mut data = Vec::with_capacity(size.byte_len());
        for row in 0..size.height as u8 {
            data.extend(std::iter::repeat(row).take(row_len));
        }
        data
    }

    pub(crate) fn frame_len(&self) -> usize {
        Self::size().byte_len()
    }
}

impl SourceConnector for SolidFrameConnector {
    fn open(&self, _url: &str) -> Result<Box<dyn FrameSource>, CaptureError> {
        Ok(Box::new(SolidFrameSource {
            period: self.period,
        }))
    }
}

struct SolidFrameSource {
    period: Duration,
}

impl FrameSource for SolidFrameSource {
    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        thread::sleep(self.period);
        Ok(Frame::new(
            SolidFrameConnector::size(),
            SolidFrameConnector::pattern(),
        ))
    }
}

/// A stream that can never be opened
pub(crate) struct UnavailableConnector;

impl SourceConnector for UnavailableConnector {
    fn open(&self, url: &str) -> Result<Box<dyn FrameSource>, CaptureError> {
        Err(CaptureError::Unavailable(format!("stub stream down: {}", url)))
    }
}

/// Creates chunk files but discards every frame
pub(crate) struct NullChunkFormat;

impl ChunkFormat for NullChunkFormat {
    fn extension(&self) -> &'static str {
        "null"
    }

    fn open(
        &self,
        path: &Path,
        _size: FrameSize,
        _frame_rate: f64,
    ) -> Result<Box<dyn ChunkWriter>, ChunkError> {
        File::create(path).map_err(|e| ChunkError::CannotCreate {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Box::new(NullChunkWriter))
    }
}

struct NullChunkWriter;

impl ChunkWriter for NullChunkWriter {
    fn write_frame(&mut self, _frame: &Frame) -> Result<(), ChunkError> {
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<(), ChunkError> {
        Ok(())
    }
}

/// Writes frames verbatim so tests can count and inspect them
pub(crate) struct RawChunkFormat;

impl ChunkFormat for RawChunkFormat {
    fn extension(&self) -> &'static str {
        "raw"
    }

    fn open(
        &self,
        path: &Path,
        _size: FrameSize,
        _frame_rate: f64,
    ) -> Result<Box<dyn ChunkWriter>, ChunkError> {
        let file = File::create(path).map_err(|e| ChunkError::CannotCreate {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Box::new(RawChunkWriter { file }))
    }
}

struct RawChunkWriter {
    file: File,
}

impl ChunkWriter for RawChunkWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), ChunkError> {
        self.file
            .write_all(frame.data())
            .map_err(|e| ChunkError::Write(e.to_string()))
    }

    fn finish(mut self: Box<Self>) -> Result<(), ChunkError> {
        self.file
            .flush()
            .map_err(|e| ChunkError::Finalize(e.to_string()))
    }
}
