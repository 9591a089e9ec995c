// Shared fixtures for integration tests
//
// Frames are generated as noisy JPEGs so they are both decodable and well
// above the default 5000 byte corruption threshold.

#![allow(dead_code)]

use async_trait::async_trait;
use frame_assembler::error::{AssemblyError, Result};
use frame_assembler::{AssemblyManifest, SessionId, VideoEncoder};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub const FAKE_VIDEO: &[u8] = b"\x00\x00\x00\x18ftypmp42fake-video-bytes";

/// Encode a `width`x`height` JPEG filled with pseudo-random noise.
pub fn noisy_jpeg(width: u32, height: u32, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    let img = image::RgbImage::from_fn(width, height, |_, _| {
        let mut next = || {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 24) as u8
        };
        image::Rgb([next(), next(), next()])
    });

    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageOutputFormat::Jpeg(90))
        .expect("encode test jpeg");
    buf
}

/// A decodable frame comfortably above the size threshold.
pub fn frame_bytes(seed: u32) -> Vec<u8> {
    noisy_jpeg(160, 120, seed)
}

pub fn sid(raw: &str) -> SessionId {
    SessionId::parse(raw).expect("valid session id")
}

/// Encoder double that records manifests instead of running ffmpeg.
#[derive(Default)]
pub struct FakeEncoder {
    pub calls: AtomicUsize,
    pub manifests: Mutex<Vec<AssemblyManifest>>,
    pub fail: bool,
    /// Signalled when an encode starts
    pub started: Notify,
    /// When set, encodes wait for a permit before finishing
    pub hold: Option<Arc<Notify>>,
}

impl FakeEncoder {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn held(hold: Arc<Notify>) -> Self {
        Self {
            hold: Some(hold),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_manifest(&self) -> Option<AssemblyManifest> {
        self.manifests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl VideoEncoder for FakeEncoder {
    async fn encode(&self, manifest: &AssemblyManifest, output: &Path) -> Result<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.manifests.lock().unwrap().push(manifest.clone());
        self.started.notify_one();

        if let Some(hold) = &self.hold {
            hold.notified().await;
        }

        // Partial output, as a crashed encoder would leave behind
        tokio::fs::write(output, b"partial").await?;
        if self.fail {
            return Err(AssemblyError::EncodingFailure("fake encoder failure".to_string()));
        }

        tokio::fs::write(output, FAKE_VIDEO).await?;
        Ok(output.to_path_buf())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Wait until `path` disappears; background cleanup runs on its own task.
pub async fn wait_until_gone(path: &Path) -> bool {
    for _ in 0..200 {
        if !path.exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
