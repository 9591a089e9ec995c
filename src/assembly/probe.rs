use crate::error::{AssemblyError, Result};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Output size in pixels. Both sides are even once normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Round each side down to an even number, as yuv420p requires.
    pub fn even(width: u32, height: u32) -> Self {
        Self {
            width: width - width % 2,
            height: height - height % 2,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Read the frame's header and return its normalized resolution.
pub async fn probe(frame_path: &Path) -> Result<Resolution> {
    let path: PathBuf = frame_path.to_path_buf();
    let (width, height) = tokio::task::spawn_blocking(move || read_dimensions(&path))
        .await
        .map_err(|e| AssemblyError::ProbeFailure(format!("probe task failed: {}", e)))??;

    let resolution = Resolution::even(width, height);
    if resolution.width == 0 || resolution.height == 0 {
        return Err(AssemblyError::ProbeFailure(format!(
            "{} is too small ({}x{})",
            frame_path.display(),
            width,
            height
        )));
    }

    debug!(
        "Probed {}: {}x{} -> {}",
        frame_path.display(),
        width,
        height,
        resolution
    );
    Ok(resolution)
}

fn read_dimensions(path: &Path) -> Result<(u32, u32)> {
    let failure =
        |e: &dyn fmt::Display| AssemblyError::ProbeFailure(format!("{}: {}", path.display(), e));

    // Sniff the format from content; the extension is always .jpg
    image::io::Reader::open(path)
        .map_err(|e| failure(&e))?
        .with_guessed_format()
        .map_err(|e| failure(&e))?
        .into_dimensions()
        .map_err(|e| failure(&e))
}
