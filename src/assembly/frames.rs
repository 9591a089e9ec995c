use crate::error::{AssemblyError, Result};
use crate::session::{parse_frame_sequence, Frame, SessionId};
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info};

/// List every frame stored for a session, sorted by sequence.
///
/// No size filtering happens here. A missing directory yields no frames.
pub async fn scan(dir: &Path, session_id: &SessionId) -> Result<Vec<Frame>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut frames = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        let Some(sequence) = parse_frame_sequence(session_id, name) else {
            continue;
        };
        let sequence = sequence?;
        let meta = entry.metadata().await?;
        if !meta.is_file() {
            continue;
        }
        frames.push(Frame {
            session_id: session_id.clone(),
            sequence,
            path: entry.path(),
            size: meta.len(),
        });
    }

    frames.sort_by_key(|f| f.sequence);
    Ok(frames)
}

/// Frames eligible for assembly: larger than `min_bytes`, strictly ascending.
pub async fn collect(dir: &Path, session_id: &SessionId, min_bytes: u64) -> Result<Vec<Frame>> {
    let all = scan(dir, session_id).await?;
    let total = all.len();

    let frames: Vec<Frame> = all.into_iter().filter(|f| f.size > min_bytes).collect();

    // Two names parsing to one number (e.g. "_01" and "_1") have no defined order
    if let Some(pair) = frames.windows(2).find(|w| w[0].sequence == w[1].sequence) {
        return Err(AssemblyError::InvalidFrameName(format!(
            "duplicate sequence {} ({} and {})",
            pair[0].sequence,
            pair[0].path.display(),
            pair[1].path.display()
        )));
    }

    if total > frames.len() {
        debug!(
            "Discarded {} frames at or below {} bytes for session {}",
            total - frames.len(),
            min_bytes,
            session_id
        );
    }

    if frames.is_empty() {
        return Err(AssemblyError::NoFramesFound(session_id.to_string()));
    }

    info!("Collected {} valid frames for session {}", frames.len(), session_id);
    Ok(frames)
}
