//! Camvault - per-user chunked recording of network video streams.
//!
//! The engine lets an authenticated operator start recording a network video
//! source, writes the stream to disk in time-bounded chunks, and applies an
//! optional per-user vertical flip. Authentication and page rendering live in
//! the host application; this crate is the recording core it drives through
//! [`commands`] or [`recorder::SessionRegistry`] directly.

pub mod capture;
pub mod commands;
pub mod recorder;
pub mod utils;
pub mod writer;

pub use capture::{Frame, FrameSize};
pub use recorder::{RegistryConfig, SessionRegistry, StartOutcome};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging for a host binary
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "camvault=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Camvault v{}", env!("CARGO_PKG_VERSION"));
}
