//! Recording commands
//!
//! start/stop redirect to the index view whatever the outcome: a duplicate
//! start is a user-visible no-op, and an OS spawn failure is logged rather
//! than shown. Flip and status return plain payloads for the view to render.

use crate::recorder::SessionRegistry;
use serde::{Deserialize, Serialize};

/// Where start/stop send the browser afterwards
pub const INDEX_VIEW: &str = "/";

/// Form fields of a start request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    /// Network video source to capture
    pub url: String,

    /// Chunk directory name; empty means "derive from the start time"
    #[serde(default)]
    pub prefix: String,
}

/// Instruction for the request layer to redirect the browser
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Redirect {
    pub location: &'static str,
}

impl Redirect {
    fn index() -> Self {
        Self {
            location: INDEX_VIEW,
        }
    }
}

/// Response to a flip toggle
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlipResponse {
    pub success: bool,
    pub flip: bool,
}

/// Recording status for the index view poll
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub recording: bool,
    pub flip: bool,
}

/// Begin recording for the user; redirects whether or not a session started
pub fn start_recording(
    registry: &SessionRegistry,
    user_id: &str,
    request: &StartRequest,
) -> Redirect {
    if let Err(e) = registry.start_session(user_id, &request.url, &request.prefix) {
        tracing::error!("Failed to spawn recording session for {}: {}", user_id, e);
    }
    Redirect::index()
}

/// Request the user's recording to stop; always redirects
pub fn stop_recording(registry: &SessionRegistry, user_id: &str) -> Redirect {
    registry.stop_session(user_id);
    Redirect::index()
}

/// Toggle the user's flip transform; works with or without a live session
pub fn toggle_flip(registry: &SessionRegistry, user_id: &str) -> FlipResponse {
    FlipResponse {
        success: true,
        flip: registry.toggle_flip(user_id),
    }
}

/// Current recording and flip state for the user
pub fn recording_status(registry: &SessionRegistry, user_id: &str) -> StatusResponse {
    StatusResponse {
        recording: registry.is_recording(user_id),
        flip: registry.get_flip(user_id),
    }
}
