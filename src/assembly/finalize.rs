use super::encoder::VideoEncoder;
use super::manifest::{self, MAX_FPS};
use super::{frames, probe};
use crate::error::{AssemblyError, Result};
use crate::session::{output_file_name, FinalizeLease, SessionId, SessionStore};
use axum::body::Bytes;
use futures::future;
use futures::stream::{self, Stream, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

/// Drives a session from `Finalizing` to a finished video, or to cleanup.
pub struct Assembler {
    store: Arc<SessionStore>,
    encoder: Arc<dyn VideoEncoder>,
}

impl Assembler {
    pub fn new(store: Arc<SessionStore>, encoder: Arc<dyn VideoEncoder>) -> Self {
        Self { store, encoder }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Close the session and assemble its frames and audio into one video.
    ///
    /// Only one finalize runs per session; a concurrent call fails with
    /// `FinalizeInProgress`. On error the session's directory is already
    /// removed when this returns. On success the directory lives until the
    /// returned [`FinishedVideo`] (or its stream) is dropped.
    pub async fn finalize(&self, session_id: &SessionId, fps: u32) -> Result<FinishedVideo> {
        // A bad request must not cost the client its session
        if fps == 0 || fps > MAX_FPS {
            return Err(AssemblyError::InvalidFrameRate(fps));
        }

        let mut lease = self.store.begin_finalize(session_id).await?;

        match self.assemble(session_id, fps).await {
            Ok((path, size)) => {
                lease.mark_completed();
                info!(
                    "Session {} assembled: {} ({} bytes)",
                    session_id,
                    path.display(),
                    size
                );
                Ok(FinishedVideo { path, size, lease })
            }
            Err(e) => {
                warn!("Finalize failed for session {}: {}", session_id, e);
                lease.release().await;
                Err(e)
            }
        }
    }

    async fn assemble(&self, session_id: &SessionId, fps: u32) -> Result<(PathBuf, u64)> {
        let dir = self.store.session_dir(session_id);

        let frames = frames::collect(&dir, session_id, self.store.min_frame_bytes()).await?;
        let resolution = probe::probe(&frames[0].path).await?;
        let audio = self.store.audio_track(session_id).await?;
        let manifest = manifest::plan(&frames, audio, resolution, fps)?;

        let output = dir.join(output_file_name(session_id));
        let path = self.encoder.encode(&manifest, &output).await?;
        let size = tokio::fs::metadata(&path).await?.len();
        Ok((path, size))
    }
}

/// A finished video that still owns its session.
///
/// The session is marked Completed and its directory removed when this
/// value, or the stream made from it, is dropped.
pub struct FinishedVideo {
    path: PathBuf,
    size: u64,
    lease: FinalizeLease,
}

impl FinishedVideo {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn session_id(&self) -> &SessionId {
        self.lease.session_id()
    }

    /// Stream the file's bytes.
    ///
    /// The session is closed before the stream reports its end, so a reader
    /// that drained it sees the session gone. A stream dropped early closes
    /// the session from the lease's `Drop`.
    pub async fn into_stream(self) -> Result<impl Stream<Item = std::io::Result<Bytes>> + Send> {
        let file = tokio::fs::File::open(&self.path).await?;
        let lease = self.lease;
        let close = stream::once(async move {
            lease.release().await;
            None::<std::io::Result<Bytes>>
        })
        .filter_map(future::ready);
        Ok(ReaderStream::new(file).chain(close))
    }

    /// Read the whole file, then close the session and wait for cleanup.
    pub async fn into_bytes(self) -> Result<Vec<u8>> {
        let bytes = tokio::fs::read(&self.path).await;
        self.lease.release().await;
        Ok(bytes?)
    }

    /// Close the session without reading the video.
    pub async fn release(self) {
        self.lease.release().await;
    }
}
