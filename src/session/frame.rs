//! On-disk naming of session files.
//!
//! Names are a storage detail: everything outside this module and the
//! frame collector works with [`Frame`] records instead of file names.

use super::id::SessionId;
use crate::error::{AssemblyError, Result};
use serde::Serialize;
use std::path::PathBuf;

const FRAME_MARKER: &str = "_frame_";
const FRAME_EXTENSION: &str = ".jpg";

/// One persisted frame image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Frame {
    pub session_id: SessionId,
    /// Position in the recorded stream; frames are assembled in ascending order
    pub sequence: u64,
    pub path: PathBuf,
    pub size: u64,
}

pub(crate) fn frame_file_name(session_id: &SessionId, sequence: u64) -> String {
    // 20 digits covers u64::MAX, so lexical and numeric order agree
    format!("{}{}{:020}{}", session_id, FRAME_MARKER, sequence, FRAME_EXTENSION)
}

/// Extract the sequence number from a frame file name.
///
/// Returns `None` for files that are not frames of this session and an
/// error for names that look like frames but break the numbering contract.
pub(crate) fn parse_frame_sequence(session_id: &SessionId, file_name: &str) -> Option<Result<u64>> {
    let digits = file_name
        .strip_prefix(session_id.as_str())?
        .strip_prefix(FRAME_MARKER)?
        .strip_suffix(FRAME_EXTENSION)?;

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Some(Err(AssemblyError::InvalidFrameName(file_name.to_string())));
    }

    Some(
        digits
            .parse::<u64>()
            .map_err(|_| AssemblyError::InvalidFrameName(file_name.to_string())),
    )
}

pub(crate) fn audio_file_name(session_id: &SessionId, extension: &str) -> String {
    format!("{}_audio.{}", session_id, extension)
}

pub(crate) fn output_file_name(session_id: &SessionId) -> String {
    format!("{}_output.mp4", session_id)
}
