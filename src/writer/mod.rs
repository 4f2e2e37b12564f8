//! Chunk output abstractions
//!
//! A chunk is one bounded-duration output file. `ChunkFormat` opens chunk
//! files for a container format; `ChunkWriter` owns one open chunk and
//! accepts frames until it is finished. Frame size is fixed per chunk,
//! taken from the first frame written to it.

pub mod ffmpeg;

use crate::capture::{Frame, FrameSize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from creating or writing a chunk
#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("cannot create chunk {path}: {reason}")]
    CannotCreate { path: PathBuf, reason: String },

    #[error("failed to write frame: {0}")]
    Write(String),

    #[error("failed to finalize chunk: {0}")]
    Finalize(String),
}

/// One open chunk file accepting frames
pub trait ChunkWriter: Send {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), ChunkError>;

    /// Flush, close the underlying file, and release the writer
    fn finish(self: Box<Self>) -> Result<(), ChunkError>;
}

/// A container format that can open chunk files
pub trait ChunkFormat: Send + Sync {
    /// File extension for chunk paths, without the dot
    fn extension(&self) -> &'static str;

    fn open(
        &self,
        path: &Path,
        size: FrameSize,
        frame_rate: f64,
    ) -> Result<Box<dyn ChunkWriter>, ChunkError>;
}
