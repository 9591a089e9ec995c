use super::probe::Resolution;
use crate::error::{AssemblyError, Result};
use crate::session::Frame;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

pub const MAX_FPS: u32 = 120;

/// One input frame and how long it stays on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    pub path: PathBuf,
    /// Seconds, rounded to 5 decimals. The last entry has none.
    pub duration_secs: Option<f64>,
}

/// Everything the encoder needs for one finalize, and nothing else.
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyManifest {
    pub entries: Vec<ManifestEntry>,
    pub audio: Option<PathBuf>,
    pub resolution: Resolution,
    pub fps: u32,
}

/// Build the manifest for ordered, validated frames.
pub fn plan(
    frames: &[Frame],
    audio: Option<PathBuf>,
    resolution: Resolution,
    fps: u32,
) -> Result<AssemblyManifest> {
    if fps == 0 || fps > MAX_FPS {
        return Err(AssemblyError::InvalidFrameRate(fps));
    }

    let duration = frame_duration(fps);
    let last = frames.len().saturating_sub(1);
    let entries = frames
        .iter()
        .enumerate()
        .map(|(i, frame)| ManifestEntry {
            path: frame.path.clone(),
            duration_secs: (i < last).then_some(duration),
        })
        .collect();

    Ok(AssemblyManifest {
        entries,
        audio,
        resolution,
        fps,
    })
}

/// `1/fps` seconds at 5 decimal places.
pub fn frame_duration(fps: u32) -> f64 {
    (100_000.0 / fps as f64).round() / 100_000.0
}

impl AssemblyManifest {
    /// Render as an ffconcat sequence description.
    pub fn render(&self) -> String {
        let mut out = String::from("ffconcat version 1.0\n");
        for entry in &self.entries {
            let _ = writeln!(out, "file '{}'", escape_path(&entry.path));
            if let Some(duration) = entry.duration_secs {
                let _ = writeln!(out, "duration {:.5}", duration);
            }
        }
        out
    }

    pub fn frame_count(&self) -> usize {
        self.entries.len()
    }
}

fn escape_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', r"'\''")
}
