use super::manifest::AssemblyManifest;
use crate::config::EncoderConfig;
use crate::error::{AssemblyError, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, info};

/// Lines of encoder stderr kept for the failure log
const STDERR_TAIL_LINES: usize = 20;

/// Turns an assembly manifest into a single video file.
#[async_trait::async_trait]
pub trait VideoEncoder: Send + Sync {
    /// Encode and return the path of the finished, non-empty output.
    ///
    /// On failure the partial output is left in place for cleanup.
    async fn encode(&self, manifest: &AssemblyManifest, output: &Path) -> Result<PathBuf>;

    /// Encoder name for logging
    fn name(&self) -> &str;
}

/// Settings for [`FfmpegEncoder`].
#[derive(Debug, Clone)]
pub struct FfmpegSettings {
    pub binary: String,
    pub video_codec: String,
    pub audio_codec: String,
    pub pixel_format: String,
    pub timeout: Duration,
}

impl Default for FfmpegSettings {
    fn default() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            pixel_format: "yuv420p".to_string(),
            timeout: Duration::from_secs(300),
        }
    }
}

impl From<&EncoderConfig> for FfmpegSettings {
    fn from(config: &EncoderConfig) -> Self {
        Self {
            binary: config.ffmpeg_path.clone(),
            video_codec: config.video_codec.clone(),
            audio_codec: config.audio_codec.clone(),
            pixel_format: config.pixel_format.clone(),
            timeout: config.timeout(),
        }
    }
}

/// Builds the ffmpeg argument list from a manifest and nothing else.
#[derive(Debug, Clone)]
pub struct FfmpegArgs<'a> {
    settings: &'a FfmpegSettings,
    manifest: &'a AssemblyManifest,
    manifest_path: &'a Path,
    output: &'a Path,
}

impl<'a> FfmpegArgs<'a> {
    pub fn new(
        settings: &'a FfmpegSettings,
        manifest: &'a AssemblyManifest,
        manifest_path: &'a Path,
        output: &'a Path,
    ) -> Self {
        Self {
            settings,
            manifest,
            manifest_path,
            output,
        }
    }

    pub fn build(&self) -> Vec<String> {
        let fps = self.manifest.fps.to_string();
        let mut args = vec![
            "-hide_banner".to_string(),
            "-nostdin".to_string(),
            "-y".to_string(),
            "-r".to_string(),
            fps.clone(),
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            self.manifest_path.to_string_lossy().into_owned(),
        ];

        if let Some(audio) = &self.manifest.audio {
            args.push("-i".to_string());
            args.push(audio.to_string_lossy().into_owned());
        }

        args.extend(["-map".to_string(), "0:v:0".to_string()]);
        if self.manifest.audio.is_some() {
            args.extend(["-map".to_string(), "1:a:0".to_string()]);
        }

        args.push("-vf".to_string());
        args.push(format!(
            "scale={}:{}",
            self.manifest.resolution.width, self.manifest.resolution.height
        ));
        args.extend(vec![
            "-c:v".to_string(),
            self.settings.video_codec.clone(),
            "-pix_fmt".to_string(),
            self.settings.pixel_format.clone(),
            "-r".to_string(),
            fps,
        ]);

        if self.manifest.audio.is_some() {
            args.extend(["-c:a".to_string(), self.settings.audio_codec.clone()]);
        }

        args.extend(vec![
            "-movflags".to_string(),
            "+faststart".to_string(),
            self.output.to_string_lossy().into_owned(),
        ]);

        args
    }
}

/// Runs the external `ffmpeg` binary once per finalize.
pub struct FfmpegEncoder {
    settings: FfmpegSettings,
}

impl FfmpegEncoder {
    pub fn new(settings: FfmpegSettings) -> Self {
        Self { settings }
    }

    pub fn from_config(config: &EncoderConfig) -> Self {
        Self::new(FfmpegSettings::from(config))
    }

    async fn run(&self, args: &[String]) -> Result<()> {
        let child = Command::new(&self.settings.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AssemblyError::EncodingFailure(format!(
                    "failed to start {}: {}",
                    self.settings.binary, e
                ))
            })?;

        // Dropping the future on timeout kills the child
        let output = tokio::time::timeout(self.settings.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                AssemblyError::EncodingFailure(format!(
                    "timed out after {}s",
                    self.settings.timeout.as_secs()
                ))
            })?
            .map_err(|e| AssemblyError::EncodingFailure(format!("stream error: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("ffmpeg stderr (tail):\n{}", stderr_tail(&stderr, STDERR_TAIL_LINES));
            return Err(AssemblyError::EncodingFailure(format!(
                "ffmpeg exited with {}",
                output.status
            )));
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl VideoEncoder for FfmpegEncoder {
    async fn encode(&self, manifest: &AssemblyManifest, output: &Path) -> Result<PathBuf> {
        let manifest_path = output.with_extension("ffconcat");
        tokio::fs::write(&manifest_path, manifest.render()).await?;

        let args = FfmpegArgs::new(&self.settings, manifest, &manifest_path, output).build();
        info!(
            "Encoding {} frames at {}fps, {} (audio: {})",
            manifest.frame_count(),
            manifest.fps,
            manifest.resolution,
            manifest.audio.is_some()
        );
        debug!("{} {}", self.settings.binary, args.join(" "));

        self.run(&args).await?;
        verify_output(output).await?;

        info!("Encoded {}", output.display());
        Ok(output.to_path_buf())
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

/// The encoder reported success; make sure it actually produced something.
pub async fn verify_output(output: &Path) -> Result<()> {
    match tokio::fs::metadata(output).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        Ok(_) => Err(AssemblyError::EncodingFailure("output file is empty".to_string())),
        Err(_) => Err(AssemblyError::EncodingFailure("output file is missing".to_string())),
    }
}

fn stderr_tail(stderr: &str, lines: usize) -> String {
    let all: Vec<&str> = stderr.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
