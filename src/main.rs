use anyhow::{Context, Result};
use clap::Parser;
use frame_assembler::{create_router, AppState, Config};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(version, about = "Assembles uploaded recording frames into a video")]
struct Args {
    /// Config file path (extension optional)
    #[arg(long, default_value = "config/frame-assembler")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("Frame Assembler v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);
    info!("Session storage: {}", cfg.storage.base_dir().display());
    info!("Encoder: {} ({})", cfg.encoder.ffmpeg_path, cfg.encoder.video_codec);

    let state = AppState::from_config(&cfg);
    tokio::fs::create_dir_all(state.store().base_dir())
        .await
        .context("Failed to create session storage directory")?;

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")?;

    Ok(())
}
