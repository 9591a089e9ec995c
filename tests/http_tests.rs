// Integration tests for the HTTP API
//
// Requests go straight through the router with `oneshot`; the encoder is
// the fake one, so these check wiring, status codes and headers.

mod common;

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::{frame_bytes, sid, FakeEncoder, FAKE_VIDEO};
use frame_assembler::{create_router, AppState, Assembler, HttpSettings, SessionStore};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "frame-assembler-test-boundary";

enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

fn multipart(parts: &[Part]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, filename, data) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        name, filename
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn upload(uri: &str, parts: &[Part]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart(parts)))
        .unwrap()
}

fn finalize_request(json: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/finalize")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

fn app(temp_dir: &TempDir) -> (Router, AppState, Arc<FakeEncoder>) {
    let encoder = Arc::new(FakeEncoder::default());
    let store = Arc::new(SessionStore::new(temp_dir.path()));
    let state = AppState::new(Assembler::new(store, encoder.clone())).with_settings(HttpSettings {
        output_filename: "grabacion_final.mp4".to_string(),
        ..HttpSettings::default()
    });
    (create_router(state.clone()), state, encoder)
}

async fn json_body(response: axum::response::Response) -> Result<serde_json::Value> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[tokio::test]
async fn test_health_check() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (router, _, _) = app(&temp_dir);

    let response = router
        .oneshot(Request::get("/health").body(Body::empty())?)
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_upload_frame_with_form_session_id() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (router, state, _) = app(&temp_dir);
    let image = frame_bytes(1);

    let response = router
        .oneshot(upload(
            "/upload-frame",
            &[
                Part::File("frame", "frame.jpg", &image),
                Part::Text("streamId", "cam-1"),
                Part::Text("sequence", "17"),
            ],
        ))
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    assert_eq!(body["stream_id"], "cam-1");
    assert_eq!(body["sequence"], 17);
    assert_eq!(body["bytes"], image.len() as u64);

    let stats = state.store().stats(&sid("cam-1")).await?.expect("session exists");
    assert_eq!(stats.frames_count, 1);

    Ok(())
}

#[tokio::test]
async fn test_upload_frame_with_query_session_id() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (router, state, _) = app(&temp_dir);

    let response = router
        .oneshot(upload(
            "/upload-frame?streamId=cam-2",
            &[Part::File("frame", "frame.jpg", &frame_bytes(2))],
        ))
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(state.store().session_dir(&sid("cam-2")).is_dir());

    Ok(())
}

#[tokio::test]
async fn test_upload_rejects_missing_or_unsafe_session_id() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (router, _, _) = app(&temp_dir);

    let missing = router
        .clone()
        .oneshot(upload(
            "/upload-frame",
            &[Part::File("frame", "frame.jpg", &frame_bytes(1))],
        ))
        .await?;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

    let traversal = router
        .oneshot(upload(
            "/upload-frame",
            &[
                Part::Text("streamId", "../escape"),
                Part::File("frame", "frame.jpg", &frame_bytes(1)),
            ],
        ))
        .await?;
    assert_eq!(traversal.status(), StatusCode::BAD_REQUEST);
    assert!(!temp_dir.path().parent().unwrap().join("escape").exists());

    Ok(())
}

#[tokio::test]
async fn test_upload_without_file_field_is_bad_request() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (router, _, _) = app(&temp_dir);

    let response = router
        .oneshot(upload("/upload-audio", &[Part::Text("streamId", "cam-1")]))
        .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await?;
    assert_eq!(body["error"], "missing field: audio");

    Ok(())
}

#[tokio::test]
async fn test_duplicate_sequence_is_conflict() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (router, _, _) = app(&temp_dir);
    let parts = |seed| {
        upload(
            "/upload-frame?streamId=cam-1",
            &[
                Part::Text("sequence", "5"),
                Part::File("frame", "frame.jpg", &frame_bytes(seed)),
            ],
        )
    };

    let first = router.clone().oneshot(parts(1)).await?;
    let second = router.oneshot(parts(2)).await?;

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::CONFLICT);

    Ok(())
}

#[tokio::test]
async fn test_finalize_streams_video_and_removes_session() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (router, state, encoder) = app(&temp_dir);

    for (sequence, seed) in [("2", 2), ("1", 1)] {
        let response = router
            .clone()
            .oneshot(upload(
                "/upload-frame",
                &[
                    Part::Text("streamId", "cam-1"),
                    Part::Text("sequence", sequence),
                    Part::File("frame", "frame.jpg", &frame_bytes(seed)),
                ],
            ))
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = router
        .clone()
        .oneshot(upload(
            "/upload-audio",
            &[
                Part::Text("streamId", "cam-1"),
                Part::File("audio", "audio.webm", b"webm-bytes"),
            ],
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .oneshot(finalize_request(r#"{"streamId":"cam-1","fps":5}"#))
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"grabacion_final.mp4\""
    );
    let body = to_bytes(response.into_body(), usize::MAX).await?;
    assert_eq!(&body[..], FAKE_VIDEO);

    let manifest = encoder.last_manifest().expect("encoder was called");
    assert_eq!(manifest.fps, 5);
    assert!(manifest.audio.is_some());
    assert_eq!(manifest.entries.len(), 2);

    assert!(common::wait_until_gone(&state.store().session_dir(&sid("cam-1"))).await);

    Ok(())
}

#[tokio::test]
async fn test_finalize_uses_default_fps() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (router, state, encoder) = app(&temp_dir);
    state
        .store()
        .ingest_frame(&sid("cam-1"), Some(1), &frame_bytes(1))
        .await?;

    let response = router
        .oneshot(finalize_request(r#"{"streamId":"cam-1"}"#))
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    drop(response);
    assert_eq!(encoder.last_manifest().expect("encoder was called").fps, 10);

    Ok(())
}

#[tokio::test]
async fn test_finalize_unknown_session_is_bad_request() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (router, _, encoder) = app(&temp_dir);

    let response = router
        .oneshot(finalize_request(r#"{"streamId":"nobody"}"#))
        .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await?;
    assert!(body["error"].as_str().unwrap().contains("no valid frames"));
    assert_eq!(encoder.calls(), 0);

    Ok(())
}

#[tokio::test]
async fn test_finalize_without_stream_id_is_bad_request() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (router, _, _) = app(&temp_dir);

    let response = router.oneshot(finalize_request(r#"{"fps":10}"#)).await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_session_status() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (router, state, _) = app(&temp_dir);
    state
        .store()
        .ingest_frame(&sid("cam-1"), Some(3), &frame_bytes(3))
        .await?;

    let found = router
        .clone()
        .oneshot(Request::get("/sessions/cam-1/status").body(Body::empty())?)
        .await?;
    assert_eq!(found.status(), StatusCode::OK);
    let body = json_body(found).await?;
    assert_eq!(body["state"], "open");
    assert_eq!(body["valid_frames_count"], 1);
    assert_eq!(body["has_audio"], false);

    let missing = router
        .oneshot(Request::get("/sessions/cam-9/status").body(Body::empty())?)
        .await?;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn test_finalize_again_after_download_finds_nothing() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (router, state, encoder) = app(&temp_dir);
    state
        .store()
        .ingest_frame(&sid("cam-1"), Some(1), &frame_bytes(1))
        .await?;

    let first = router
        .clone()
        .oneshot(finalize_request(r#"{"streamId":"cam-1"}"#))
        .await?;
    assert_eq!(first.status(), StatusCode::OK);
    let body = to_bytes(first.into_body(), usize::MAX).await?;
    assert_eq!(&body[..], FAKE_VIDEO);

    // The session is closed by the time the last byte is read
    assert!(!state.store().session_dir(&sid("cam-1")).exists());

    let second = router
        .clone()
        .oneshot(finalize_request(r#"{"streamId":"cam-1"}"#))
        .await?;
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
    let body = json_body(second).await?;
    assert!(body["error"].as_str().unwrap().contains("no valid frames"));
    assert_eq!(encoder.calls(), 1);

    let upload = router
        .oneshot(upload(
            "/upload-frame?streamId=cam-1",
            &[Part::File("frame", "frame.jpg", &frame_bytes(2))],
        ))
        .await?;
    assert_eq!(upload.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn test_malformed_finalize_body_gets_json_error() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (router, _, encoder) = app(&temp_dir);

    let response = router.oneshot(finalize_request("{streamId: cam-1")).await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await?;
    assert!(body["error"].as_str().unwrap().starts_with("malformed upload"));
    assert_eq!(encoder.calls(), 0);

    Ok(())
}

#[tokio::test]
async fn test_upload_without_multipart_body_gets_json_error() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (router, _, _) = app(&temp_dir);

    let request = Request::builder()
        .method("POST")
        .uri("/upload-frame?streamId=cam-1")
        .header(header::CONTENT_TYPE, "image/jpeg")
        .body(Body::from(frame_bytes(1)))?;
    let response = router.oneshot(request).await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await?;
    assert!(body["error"].is_string());
    assert!(!temp_dir.path().join("cam-1").exists());

    Ok(())
}
