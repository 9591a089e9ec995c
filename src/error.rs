use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::io;
use thiserror::Error;

/// Errors raised by ingestion and finalization.
///
/// Ingest errors are local to one request. Any error returned from a
/// finalize is terminal for the session: its directory is already gone.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("invalid session id: {0}")]
    InvalidSession(String),

    #[error("invalid frame rate {0}: expected 1..=120")]
    InvalidFrameRate(u32),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("malformed upload: {0}")]
    InvalidUpload(String),

    #[error("no valid frames to process for session {0}")]
    NoFramesFound(String),

    #[error("session {0} is being finalized")]
    SessionBusy(String),

    #[error("session {0} is already being finalized")]
    FinalizeInProgress(String),

    #[error("frame {sequence} already exists for session {session_id}")]
    DuplicateFrame { session_id: String, sequence: u64 },

    #[error("frame file name does not follow the naming contract: {0}")]
    InvalidFrameName(String),

    #[error("could not read frame dimensions: {0}")]
    ProbeFailure(String),

    #[error("video encoding failed: {0}")]
    EncodingFailure(String),

    #[error("storage error: {0}")]
    Io(#[from] io::Error),
}

impl AssemblyError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidSession(_)
            | Self::InvalidFrameRate(_)
            | Self::MissingField(_)
            | Self::InvalidUpload(_)
            | Self::NoFramesFound(_) => StatusCode::BAD_REQUEST,
            Self::SessionBusy(_) | Self::FinalizeInProgress(_) | Self::DuplicateFrame { .. } => {
                StatusCode::CONFLICT
            }
            Self::InvalidFrameName(_)
            | Self::ProbeFailure(_)
            | Self::EncodingFailure(_)
            | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for AssemblyError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Internal details stay in the log
        let message = match &self {
            Self::Io(_) => "storage error".to_string(),
            _ => self.to_string(),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

pub type Result<T, E = AssemblyError> = std::result::Result<T, E>;
