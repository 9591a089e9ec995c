//! Session storage and lifecycle
//!
//! This module provides the `SessionStore` that manages:
//! - One isolated working directory per session id
//! - Frame and audio ingestion into that directory
//! - The Open → Finalizing → Completed/Failed lifecycle
//! - Directory cleanup when a session ends

mod frame;
mod id;
mod stats;
mod store;

pub use frame::Frame;
pub(crate) use frame::{output_file_name, parse_frame_sequence};
pub use id::SessionId;
pub use stats::SessionStats;
pub use store::{FinalizeLease, SessionState, SessionStore};
