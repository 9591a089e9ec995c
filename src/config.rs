use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub encoder: EncoderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
    /// Single front-end origin allowed by CORS; unset disables the layer
    pub cors_origin: Option<String>,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root under which every session gets its own working directory
    pub base_dir: String,
    /// Frames at or below this size are treated as blank or corrupt
    pub min_frame_bytes: u64,
    pub audio_extension: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EncoderConfig {
    pub ffmpeg_path: String,
    pub video_codec: String,
    pub audio_codec: String,
    pub pixel_format: String,
    pub timeout_secs: u64,
    /// File name presented to the client on download
    pub output_filename: String,
    pub default_fps: u32,
}

impl Config {
    /// Load configuration from an optional file plus `FRAME_ASSEMBLER__*`
    /// environment overrides, on top of built-in defaults.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("service.name", "frame-assembler")?
            .set_default("service.http.bind", "0.0.0.0")?
            .set_default("service.http.port", 3000)?
            .set_default("service.max_upload_bytes", 16 * 1024 * 1024)?
            .set_default("storage.base_dir", "./tmp")?
            .set_default("storage.min_frame_bytes", 5000)?
            .set_default("storage.audio_extension", "webm")?
            .set_default("encoder.ffmpeg_path", "ffmpeg")?
            .set_default("encoder.video_codec", "libx264")?
            .set_default("encoder.audio_codec", "aac")?
            .set_default("encoder.pixel_format", "yuv420p")?
            .set_default("encoder.timeout_secs", 300)?
            .set_default("encoder.output_filename", "final_recording.mp4")?
            .set_default("encoder.default_fps", 10)?
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("FRAME_ASSEMBLER").separator("__"))
            .build()
            .with_context(|| format!("Failed to load config from {}", path))?;

        Ok(settings.try_deserialize()?)
    }
}

impl StorageConfig {
    pub fn base_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.base_dir).into_owned())
    }
}

impl EncoderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
