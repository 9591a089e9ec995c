use super::store::SessionState;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Statistics about an in-flight session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub session_id: String,

    /// Lifecycle state; sessions found only on disk report `open`
    pub state: SessionState,

    /// Frames stored so far, including ones too small to be used
    pub frames_count: usize,

    /// Frames that will make it into the video
    pub valid_frames_count: usize,

    /// Total bytes across all stored frames
    pub frame_bytes: u64,

    pub first_sequence: Option<u64>,
    pub last_sequence: Option<u64>,

    /// Whether an audio track has been uploaded
    pub has_audio: bool,

    /// When these numbers were gathered
    pub checked_at: DateTime<Utc>,
}
