//! Recording session engine
//!
//! This module implements the per-user recording architecture:
//! - SessionRegistry tracking which users are recording and their flip flags
//! - The per-session capture-and-write loop with time-based chunk rotation
//! - Session control handles carrying an explicit stop signal

pub mod registry;
pub mod session;

#[cfg(test)]
pub(crate) mod testutil;

pub use registry::{RegistryConfig, SessionRegistry, StartOutcome};
