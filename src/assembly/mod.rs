//! Turning a session's stored frames into a video
//!
//! - `frames`: list, filter and order the stored frames
//! - `probe`: output resolution from the first valid frame
//! - `manifest`: the ordered input description handed to the encoder
//! - `encoder`: the `VideoEncoder` seam and its ffmpeg implementation
//! - `finalize`: the state machine tying the steps together

pub mod encoder;
pub mod finalize;
pub mod frames;
pub mod manifest;
pub mod probe;

pub use encoder::{FfmpegArgs, FfmpegEncoder, FfmpegSettings, VideoEncoder};
pub use finalize::{Assembler, FinishedVideo};
pub use manifest::{plan, AssemblyManifest, ManifestEntry};
pub use probe::{probe, Resolution};
