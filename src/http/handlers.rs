use super::state::AppState;
use crate::error::{AssemblyError, ErrorResponse};
use crate::session::{SessionId, SessionStats};
use axum::{
    body::{Body, Bytes},
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
        Multipart, Path, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    #[serde(rename = "streamId")]
    pub stream_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FinalizeRequest {
    #[serde(rename = "streamId")]
    pub stream_id: Option<String>,

    /// Frames per second of the output (default from config)
    pub fps: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct FrameAccepted {
    pub stream_id: String,
    pub sequence: u64,
    pub bytes: u64,
}

#[derive(Debug, Serialize)]
pub struct AudioAccepted {
    pub stream_id: String,
    pub bytes: usize,
}

/// Fields of an upload form, read in whatever order the client sent them
#[derive(Debug, Default)]
struct UploadForm {
    stream_id: Option<String>,
    sequence: Option<u64>,
    file: Option<Bytes>,
}

fn invalid_upload(e: MultipartError) -> AssemblyError {
    AssemblyError::InvalidUpload(e.body_text())
}

/// Requests axum refuses to parse still get the JSON error body
fn rejected(e: impl std::fmt::Display) -> AssemblyError {
    AssemblyError::InvalidUpload(e.to_string())
}

async fn read_upload(
    multipart: Result<Multipart, MultipartRejection>,
    file_field: &str,
) -> Result<UploadForm, AssemblyError> {
    let mut multipart = multipart.map_err(rejected)?;
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(invalid_upload)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "streamId" => {
                form.stream_id = Some(field.text().await.map_err(invalid_upload)?);
            }
            "sequence" => {
                let raw = field.text().await.map_err(invalid_upload)?;
                let sequence = raw.trim().parse::<u64>().map_err(|_| {
                    AssemblyError::InvalidUpload(format!("sequence {:?} is not a number", raw))
                })?;
                form.sequence = Some(sequence);
            }
            _ if name == file_field => {
                form.file = Some(field.bytes().await.map_err(invalid_upload)?);
            }
            _ => debug!("Ignoring upload field {:?}", name),
        }
    }

    Ok(form)
}

/// The form field wins over the query string
fn resolve_session(
    form: Option<String>,
    query: Option<String>,
) -> Result<SessionId, AssemblyError> {
    let raw = form.or(query).unwrap_or_default();
    SessionId::parse(raw.trim())
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /upload-frame
/// Store one frame image for a session
pub async fn upload_frame(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<FrameAccepted>, AssemblyError> {
    let form = read_upload(multipart, "frame").await?;
    let session_id = resolve_session(form.stream_id, query.stream_id)?;
    let image = form.file.ok_or(AssemblyError::MissingField("frame"))?;

    let frame = state
        .store()
        .ingest_frame(&session_id, form.sequence, &image)
        .await?;

    Ok(Json(FrameAccepted {
        stream_id: session_id.to_string(),
        sequence: frame.sequence,
        bytes: frame.size,
    }))
}

/// POST /upload-audio
/// Store (or replace) the session's audio track
pub async fn upload_audio(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AudioAccepted>, AssemblyError> {
    let form = read_upload(multipart, "audio").await?;
    let session_id = resolve_session(form.stream_id, query.stream_id)?;
    let audio = form.file.ok_or(AssemblyError::MissingField("audio"))?;

    state.store().ingest_audio(&session_id, &audio).await?;

    Ok(Json(AudioAccepted {
        stream_id: session_id.to_string(),
        bytes: audio.len(),
    }))
}

/// POST /finalize
/// Assemble the session into a video and stream it back
pub async fn finalize(
    State(state): State<AppState>,
    req: Result<Json<FinalizeRequest>, JsonRejection>,
) -> Result<Response, AssemblyError> {
    let Json(req) = req.map_err(rejected)?;
    let session_id = resolve_session(req.stream_id, None)?;
    let fps = req.fps.unwrap_or(state.settings.default_fps);

    info!("Finalizing session {} at {}fps", session_id, fps);

    let video = state.assembler.finalize(&session_id, fps).await?;
    let size = video.size();
    let stream = video.into_stream().await?;

    let headers = [
        (header::CONTENT_TYPE, "video/mp4".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", state.settings.output_filename),
        ),
        (header::CONTENT_LENGTH, size.to_string()),
    ];

    Ok((StatusCode::OK, headers, Body::from_stream(stream)).into_response())
}

/// GET /sessions/:stream_id/status
/// Get what has been uploaded so far for a session
pub async fn get_session_status(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
) -> Result<Response, AssemblyError> {
    let session_id = SessionId::parse(&stream_id)?;

    match state.store().stats(&session_id).await? {
        Some(stats) => Ok((StatusCode::OK, Json::<SessionStats>(stats)).into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Session {} not found", session_id),
            }),
        )
            .into_response()),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
