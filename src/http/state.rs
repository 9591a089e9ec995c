use crate::assembly::{Assembler, FfmpegEncoder};
use crate::config::Config;
use crate::session::SessionStore;
use std::sync::Arc;

/// Request-facing settings that are not part of the pipeline itself
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// File name the finished video is downloaded as
    pub output_filename: String,
    pub default_fps: u32,
    pub max_upload_bytes: usize,
    pub cors_origin: Option<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            output_filename: "final_recording.mp4".to_string(),
            default_fps: 10,
            max_upload_bytes: 16 * 1024 * 1024,
            cors_origin: None,
        }
    }
}

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub assembler: Arc<Assembler>,
    pub settings: Arc<HttpSettings>,
}

impl AppState {
    pub fn new(assembler: Assembler) -> Self {
        Self {
            assembler: Arc::new(assembler),
            settings: Arc::new(HttpSettings::default()),
        }
    }

    pub fn with_settings(mut self, settings: HttpSettings) -> Self {
        self.settings = Arc::new(settings);
        self
    }

    /// Wire the store and the ffmpeg encoder from configuration.
    pub fn from_config(config: &Config) -> Self {
        let store = Arc::new(SessionStore::from_config(&config.storage));
        let encoder = Arc::new(FfmpegEncoder::from_config(&config.encoder));

        Self::new(Assembler::new(store, encoder)).with_settings(HttpSettings {
            output_filename: config.encoder.output_filename.clone(),
            default_fps: config.encoder.default_fps,
            max_upload_bytes: config.service.max_upload_bytes,
            cors_origin: config.service.cors_origin.clone(),
        })
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        self.assembler.store()
    }
}
