use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use engine::Project;
use serde::Serialize;

use super::download::serve_file;
use super::error::ApiError;
use super::AppState;
use crate::db::AssetRecord;
use crate::error::PipelineError;

/// Largest accepted asset upload.
const MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024;

#[derive(Serialize)]
pub struct AssetList {
    assets: Vec<AssetRecord>,
}

#[derive(Serialize)]
pub struct ExportResponse {
    export_id: String,
    duration: f64,
    download_url: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/assets", get(list_assets))
        .route(
            "/assets/upload",
            post(upload_asset).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/assets/:id/download", get(download_asset))
        .route("/export", post(export_project))
        .route("/exports/:id/download", get(download_export))
        .with_state(state)
}

/// Imports the multipart `file` field. Other fields are ignored.
async fn upload_asset(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<AssetRecord>), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PipelineError::validation(format!("invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let asset = state.editor.import_upload(&filename, field).await?;
        return Ok((StatusCode::CREATED, Json(asset)));
    }
    Err(PipelineError::validation("multipart body has no file field").into())
}

async fn list_assets(State(state): State<AppState>) -> Result<Json<AssetList>, ApiError> {
    Ok(Json(AssetList {
        assets: state.editor.list_assets()?,
    }))
}

async fn download_asset(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let asset = state.editor.get_asset(&id)?;
    serve_file(
        std::path::Path::new(&asset.path),
        &headers,
        Some(&asset.stored_name),
    )
    .await
}

async fn export_project(
    State(state): State<AppState>,
    Json(project): Json<Project>,
) -> Result<Json<ExportResponse>, ApiError> {
    let export = state.editor.export(&project).await?;
    Ok(Json(ExportResponse {
        download_url: format!("/editor/exports/{}/download", export.export_id),
        export_id: export.export_id,
        duration: export.duration,
    }))
}

async fn download_export(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let path = state
        .editor
        .export_path(&id)?
        .ok_or_else(|| ApiError::NotFound(format!("export {id} not found")))?;
    serve_file(&path, &headers, Some(&format!("{id}.mp4"))).await
}
