use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod db;
mod editor;
mod error;
mod media;
mod pipeline;
mod providers;
#[cfg(test)]
mod testing;

use config::Config;
use media::ffmpeg::FFmpegWrapper;
use media::MediaEngine;
use pipeline::{JobOrchestrator, OrchestratorConfig, Providers};
use providers::{
    ElevenLabsNarration, EspeakNarration, HttpClient, ImageProvider, NarrationProvider,
    ReplicateVideo, SdHostClient, VideoProvider,
};

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    std::fs::create_dir_all(&config.job_output_dir)?;
    std::fs::create_dir_all(&config.editor_runtime_dir)?;

    let db_path = config.editor_runtime_dir.join("index.db");
    let db = Arc::new(db::Database::new(&db_path)?);
    info!("Editor index at {:?}", db_path);

    let http = HttpClient::new(config.retry.clone())?;
    let media: Arc<dyn MediaEngine> = Arc::new(FFmpegWrapper::default());
    let images: Arc<dyn ImageProvider> =
        Arc::new(SdHostClient::new(http.clone(), config.sd_host.clone()));

    let replicate = ReplicateVideo::new(http.clone(), config.replicate.clone());
    let remote_video: Option<Arc<dyn VideoProvider>> = if replicate.is_configured() {
        Some(Arc::new(replicate))
    } else {
        warn!("remote video provider not configured; jobs will use local generation");
        None
    };

    let elevenlabs = ElevenLabsNarration::new(http.clone(), config.elevenlabs.clone());
    let remote_narration: Option<Arc<dyn NarrationProvider>> = if elevenlabs.is_configured() {
        Some(Arc::new(elevenlabs))
    } else {
        warn!("remote narration provider not configured");
        None
    };

    let espeak = EspeakNarration::new(config.espeak_binary.clone());
    if !espeak.is_available() {
        warn!(binary = %config.espeak_binary, "local narration binary not found; silent fallback only");
    }

    let orchestrator = Arc::new(JobOrchestrator::start(
        OrchestratorConfig::new(config.job_output_dir.clone()),
        Providers {
            remote_video,
            local_image: images.clone(),
            remote_narration,
            local_narration: Some(Arc::new(espeak)),
            media: media.clone(),
        },
    ));
    let mut job_events = orchestrator.subscribe();
    tokio::spawn(async move {
        loop {
            match job_events.recv().await {
                Ok(event) => debug!(
                    job_id = %event.job_id,
                    status = ?event.status,
                    stage = ?event.stage,
                    progress = event.progress,
                    "job update"
                ),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "job event log lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let editor = Arc::new(editor::Editor::new(db, media, &config.editor_runtime_dir));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .allow_credentials(false);

    let app = api::router(api::AppState {
        orchestrator: orchestrator.clone(),
        editor,
        images,
        image_host: config.sd_host.base_url.clone(),
    })
    .layer(cors);

    info!("Starting daemon server on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    orchestrator.stop().await;
    Ok(())
}
