//! HTTP API for recording clients
//!
//! This module exposes the capture-and-assembly pipeline over REST:
//! - POST /upload-frame - Store one frame (multipart: streamId, frame, sequence?)
//! - POST /upload-audio - Store the audio track (multipart: streamId, audio)
//! - POST /finalize - Assemble and download the video (JSON: streamId, fps?)
//! - GET /sessions/:id/status - Query what a session holds
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{FinalizeRequest, FrameAccepted};
pub use routes::create_router;
pub use state::{AppState, HttpSettings};
