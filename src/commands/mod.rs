//! Request-layer command handlers
//!
//! The thin facade a web frontend calls into. Handlers never surface
//! per-frame errors; starts and stops always send the caller back to the
//! main view.

pub mod recording;
