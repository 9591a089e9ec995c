use super::frame::{self, Frame};
use super::id::SessionId;
use super::stats::SessionStats;
use crate::assembly::frames;
use crate::config::StorageConfig;
use crate::error::{AssemblyError, Result};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, error, info, warn};

/// How many times a generated timestamp sequence is bumped on collision
const MAX_SEQUENCE_BUMPS: u32 = 16;

/// Lifecycle of a session: `Open → Finalizing → {Completed, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Open,
    Finalizing,
    Completed,
    Failed,
}

struct SessionEntry {
    state: SessionState,
    /// Ingests hold read permits, finalize holds the write permit
    gate: Arc<RwLock<()>>,
}

/// Owns the per-session working directories under one base directory and
/// the registry that keeps finalization exclusive.
pub struct SessionStore {
    base_dir: PathBuf,
    min_frame_bytes: u64,
    audio_extension: String,
    sessions: Mutex<HashMap<SessionId, SessionEntry>>,
}

impl SessionStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            min_frame_bytes: 5000,
            audio_extension: "webm".to_string(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.base_dir())
            .with_min_frame_bytes(config.min_frame_bytes)
            .with_audio_extension(&config.audio_extension)
    }

    pub fn with_min_frame_bytes(mut self, min_frame_bytes: u64) -> Self {
        self.min_frame_bytes = min_frame_bytes;
        self
    }

    pub fn with_audio_extension(mut self, extension: &str) -> Self {
        self.audio_extension = extension.trim_start_matches('.').to_string();
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn min_frame_bytes(&self) -> u64 {
        self.min_frame_bytes
    }

    pub fn session_dir(&self, session_id: &SessionId) -> PathBuf {
        self.base_dir.join(session_id.as_str())
    }

    pub fn audio_path(&self, session_id: &SessionId) -> PathBuf {
        self.session_dir(session_id)
            .join(frame::audio_file_name(session_id, &self.audio_extension))
    }

    /// Create the session's working directory if it does not exist yet.
    pub async fn ensure(&self, session_id: &SessionId) -> Result<PathBuf> {
        let dir = self.session_dir(session_id);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Recursively delete the session's working directory. Missing is fine.
    pub async fn remove(&self, session_id: &SessionId) -> Result<()> {
        match tokio::fs::remove_dir_all(self.session_dir(session_id)).await {
            Ok(()) => {
                debug!("Removed working directory for session {}", session_id);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Current lifecycle state, if the session is known to this process.
    pub fn state(&self, session_id: &SessionId) -> Option<SessionState> {
        self.sessions().get(session_id).map(|entry| entry.state)
    }

    /// Persist one frame image.
    ///
    /// Without a sequence hint the current UTC time in milliseconds is used.
    /// A colliding generated sequence is bumped; a colliding client hint is
    /// rejected, so an existing frame is never overwritten.
    pub async fn ingest_frame(
        &self,
        session_id: &SessionId,
        sequence_hint: Option<u64>,
        image: &[u8],
    ) -> Result<Frame> {
        let _permit = self.open_for_ingest(session_id)?;
        let dir = self.ensure(session_id).await?;

        let staging = write_staging(&dir, image).await?;
        let published = self
            .publish_frame(session_id, &dir, &staging, sequence_hint, image.len() as u64)
            .await;
        if let Err(e) = tokio::fs::remove_file(&staging).await {
            warn!("Failed to remove staging file {}: {}", staging.display(), e);
        }

        let frame = published?;
        debug!(
            "Stored frame {} for session {} ({} bytes)",
            frame.sequence, session_id, frame.size
        );
        Ok(frame)
    }

    /// Persist the session's audio track, replacing any earlier upload.
    pub async fn ingest_audio(&self, session_id: &SessionId, audio: &[u8]) -> Result<PathBuf> {
        let _permit = self.open_for_ingest(session_id)?;
        let dir = self.ensure(session_id).await?;

        let staging = write_staging(&dir, audio).await?;
        let path = self.audio_path(session_id);
        tokio::fs::rename(&staging, &path).await?;

        info!("Stored audio for session {} ({} bytes)", session_id, audio.len());
        Ok(path)
    }

    /// The session's audio file, if one was uploaded and is non-empty.
    pub async fn audio_track(&self, session_id: &SessionId) -> Result<Option<PathBuf>> {
        let path = self.audio_path(session_id);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.len() > 0 => Ok(Some(path)),
            Ok(_) => {
                warn!("Ignoring empty audio upload for session {}", session_id);
                Ok(None)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Summary of what has been uploaded so far, or `None` for an unknown session.
    pub async fn stats(&self, session_id: &SessionId) -> Result<Option<SessionStats>> {
        let dir = self.session_dir(session_id);
        if !tokio::fs::try_exists(&dir).await? {
            return Ok(None);
        }

        let all = frames::scan(&dir, session_id).await?;
        let valid: Vec<&Frame> = all.iter().filter(|f| f.size > self.min_frame_bytes).collect();

        Ok(Some(SessionStats {
            session_id: session_id.to_string(),
            state: self.state(session_id).unwrap_or(SessionState::Open),
            frames_count: all.len(),
            valid_frames_count: valid.len(),
            frame_bytes: all.iter().map(|f| f.size).sum(),
            first_sequence: valid.first().map(|f| f.sequence),
            last_sequence: valid.last().map(|f| f.sequence),
            has_audio: self.audio_track(session_id).await?.is_some(),
            checked_at: Utc::now(),
        }))
    }

    /// Claim exclusive finalization of a session.
    ///
    /// Fails fast if another finalize holds the session, then waits for
    /// in-flight ingests to finish. New ingests are refused from here on.
    pub async fn begin_finalize(self: &Arc<Self>, session_id: &SessionId) -> Result<FinalizeLease> {
        let gate = {
            let mut sessions = self.sessions();
            let entry = sessions.entry(session_id.clone()).or_insert_with(|| SessionEntry {
                state: SessionState::Open,
                gate: Arc::new(RwLock::new(())),
            });
            match entry.state {
                SessionState::Open => {}
                SessionState::Finalizing => {
                    return Err(AssemblyError::FinalizeInProgress(session_id.to_string()))
                }
                SessionState::Completed | SessionState::Failed => {
                    return Err(AssemblyError::SessionBusy(session_id.to_string()))
                }
            }
            entry.state = SessionState::Finalizing;
            Arc::clone(&entry.gate)
        };

        info!("Session {} is finalizing", session_id);

        // Dropped while waiting, the lease still closes the session
        let mut lease = FinalizeLease {
            store: Arc::clone(self),
            session_id: session_id.clone(),
            gate,
            write: None,
            outcome: SessionState::Failed,
            released: false,
        };
        lease.write = Some(Arc::clone(&lease.gate).write_owned().await);
        Ok(lease)
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionId, SessionEntry>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open_for_ingest<'a>(&'a self, session_id: &'a SessionId) -> Result<IngestPermit<'a>> {
        let mut sessions = self.sessions();
        let entry = sessions.entry(session_id.clone()).or_insert_with(|| {
            debug!("Opening session {}", session_id);
            SessionEntry {
                state: SessionState::Open,
                gate: Arc::new(RwLock::new(())),
            }
        });
        if entry.state != SessionState::Open {
            return Err(AssemblyError::SessionBusy(session_id.to_string()));
        }
        let gate = Arc::clone(&entry.gate);
        let read = Arc::clone(&gate)
            .try_read_owned()
            .map_err(|_| AssemblyError::SessionBusy(session_id.to_string()))?;
        Ok(IngestPermit {
            store: self,
            session_id,
            gate,
            read: Some(read),
        })
    }

    async fn publish_frame(
        &self,
        session_id: &SessionId,
        dir: &Path,
        staging: &Path,
        sequence_hint: Option<u64>,
        size: u64,
    ) -> Result<Frame> {
        let mut sequence = match sequence_hint {
            Some(sequence) => sequence,
            None => Utc::now().timestamp_millis().max(0) as u64,
        };
        let mut bumps = 0;

        loop {
            let path = dir.join(frame::frame_file_name(session_id, sequence));
            // A hard link fails instead of replacing an existing frame
            match tokio::fs::hard_link(staging, &path).await {
                Ok(()) => {
                    return Ok(Frame {
                        session_id: session_id.clone(),
                        sequence,
                        path,
                        size,
                    })
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if sequence_hint.is_some() || bumps >= MAX_SEQUENCE_BUMPS {
                        return Err(AssemblyError::DuplicateFrame {
                            session_id: session_id.to_string(),
                            sequence,
                        });
                    }
                    warn!(
                        "Frame {} already exists for session {}, bumping sequence",
                        sequence, session_id
                    );
                    sequence += 1;
                    bumps += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Record the terminal state, delete the directory, then forget the session.
    async fn finish(&self, session_id: &SessionId, gate: &Arc<RwLock<()>>, outcome: SessionState) {
        self.mark(session_id, gate, outcome);
        if let Err(e) = self.remove(session_id).await {
            error!("Cleanup failed for session {}: {}", session_id, e);
        }
        self.forget(session_id, gate);
        info!("Session {} closed ({:?})", session_id, outcome);
    }

    fn finish_blocking(
        &self,
        session_id: &SessionId,
        gate: &Arc<RwLock<()>>,
        outcome: SessionState,
    ) {
        self.mark(session_id, gate, outcome);
        match std::fs::remove_dir_all(self.session_dir(session_id)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => error!("Cleanup failed for session {}: {}", session_id, e),
        }
        self.forget(session_id, gate);
    }

    fn mark(&self, session_id: &SessionId, gate: &Arc<RwLock<()>>, state: SessionState) {
        if let Some(entry) = self.sessions().get_mut(session_id) {
            if Arc::ptr_eq(&entry.gate, gate) {
                entry.state = state;
            }
        }
    }

    fn forget(&self, session_id: &SessionId, gate: &Arc<RwLock<()>>) {
        let mut sessions = self.sessions();
        if sessions
            .get(session_id)
            .is_some_and(|entry| Arc::ptr_eq(&entry.gate, gate))
        {
            sessions.remove(session_id);
        }
    }
}

/// Read permit held for the length of one ingest.
///
/// The last permit out of an `Open` session drops its registry entry, so
/// idle sessions cost nothing in memory. Their files stay on disk until a
/// finalize removes them.
struct IngestPermit<'a> {
    store: &'a SessionStore,
    session_id: &'a SessionId,
    gate: Arc<RwLock<()>>,
    read: Option<OwnedRwLockReadGuard<()>>,
}

impl Drop for IngestPermit<'_> {
    fn drop(&mut self) {
        let mut sessions = self.store.sessions();
        drop(self.read.take());
        // New permits are only handed out under the registry lock, so two
        // references (registry and ours) means nobody else is using the gate
        let idle = sessions.get(self.session_id).is_some_and(|entry| {
            entry.state == SessionState::Open
                && Arc::ptr_eq(&entry.gate, &self.gate)
                && Arc::strong_count(&self.gate) == 2
        });
        if idle {
            sessions.remove(self.session_id);
        }
    }
}

async fn write_staging(dir: &Path, bytes: &[u8]) -> Result<PathBuf> {
    // Hidden name keeps half-written uploads out of directory scans
    let staging = dir.join(format!(".{}.part", uuid::Uuid::new_v4()));
    tokio::fs::write(&staging, bytes).await?;
    Ok(staging)
}

/// Exclusive claim on a session while it is finalized.
///
/// Whichever way the lease ends, the session's directory is removed and the
/// session is forgotten. Dropping the lease without calling
/// [`FinalizeLease::release`] does the same work on a background task.
pub struct FinalizeLease {
    store: Arc<SessionStore>,
    session_id: SessionId,
    gate: Arc<RwLock<()>>,
    write: Option<OwnedRwLockWriteGuard<()>>,
    outcome: SessionState,
    released: bool,
}

impl FinalizeLease {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// The output was produced; closing the lease now counts as Completed.
    pub fn mark_completed(&mut self) {
        self.outcome = SessionState::Completed;
    }

    /// Close the session and wait for its directory to be removed.
    pub async fn release(mut self) {
        self.released = true;
        let write = self.write.take();
        self.store
            .finish(&self.session_id, &self.gate, self.outcome)
            .await;
        drop(write);
    }
}

impl Drop for FinalizeLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let store = Arc::clone(&self.store);
        let session_id = self.session_id.clone();
        let gate = Arc::clone(&self.gate);
        let write = self.write.take();
        let outcome = self.outcome;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    // Cancelled before the claim completed: let in-flight
                    // ingests land before the directory goes
                    let write = match write {
                        Some(write) => write,
                        None => Arc::clone(&gate).write_owned().await,
                    };
                    store.finish(&session_id, &gate, outcome).await;
                    drop(write);
                });
            }
            Err(_) => {
                let _waited = write.is_none().then(|| gate.blocking_write());
                store.finish_blocking(&session_id, &gate, outcome);
                drop(write);
            }
        }
    }
}
