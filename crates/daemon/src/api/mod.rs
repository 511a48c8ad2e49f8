use axum::{extract::State, response::Json, routing::get, Router};
use serde::Serialize;
use std::sync::Arc;

use crate::editor::Editor;
use crate::pipeline::JobOrchestrator;
use crate::providers::ImageProvider;

pub mod download;
pub mod editor;
pub mod error;
pub mod images;
pub mod jobs;

use error::ApiError;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<JobOrchestrator>,
    pub editor: Arc<Editor>,
    pub images: Arc<dyn ImageProvider>,
    /// Base URL of the local image host, reported by `/health`.
    pub image_host: String,
}

#[derive(Serialize)]
pub struct Health {
    status: &'static str,
    sd_host: String,
    queued_jobs: usize,
    assets: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(state.clone())
        .merge(images::router(state.clone()))
        .nest("/jobs", jobs::router(state.clone()))
        .nest("/editor", editor::router(state))
}

async fn health(State(state): State<AppState>) -> Result<Json<Health>, ApiError> {
    Ok(Json(Health {
        status: "ok",
        sd_host: state.image_host.clone(),
        queued_jobs: state.orchestrator.queue_depth(),
        assets: state.editor.db().count_assets()?,
    }))
}
