//! Timeline editor: asset import and project export.

use bytes::Bytes;
use chrono::Utc;
use engine::{compile_project, Project};
use futures::{pin_mut, Stream, StreamExt};
use serde::Serialize;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{AssetRecord, Database, ExportRecord};
use crate::error::{PipelineError, PipelineResult};
use crate::media::{compute_file_checksum, safe_filename, MediaEngine};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportResult {
    pub export_id: String,
    pub duration: f64,
    pub output_path: PathBuf,
}

pub struct Editor {
    db: Arc<Database>,
    media: Arc<dyn MediaEngine>,
    assets_dir: PathBuf,
    exports_dir: PathBuf,
    uploads_dir: PathBuf,
}

impl Editor {
    /// Lays out `<runtime_dir>/assets`, `<runtime_dir>/exports` and the
    /// `<runtime_dir>/uploads` staging area.
    pub fn new(db: Arc<Database>, media: Arc<dyn MediaEngine>, runtime_dir: &Path) -> Self {
        Self {
            db,
            media,
            assets_dir: runtime_dir.join("assets"),
            exports_dir: runtime_dir.join("exports"),
            uploads_dir: runtime_dir.join("uploads"),
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Stages an uploaded file, then moves it into the asset store, probes it
    /// and indexes it. Only the final path component of `filename` is kept.
    pub async fn import_upload<S, E>(&self, filename: &str, chunks: S) -> PipelineResult<AssetRecord>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let original_name = Path::new(filename)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| PipelineError::validation("missing filename"))?;

        let id = Uuid::new_v4().simple().to_string();
        tokio::fs::create_dir_all(&self.uploads_dir).await?;
        let staged = self.uploads_dir.join(format!("{id}.upload"));

        let size_bytes = match stage_upload(&staged, chunks).await {
            Ok(size) if size > 0 => size,
            result => {
                let _ = tokio::fs::remove_file(&staged).await;
                return Err(result
                    .err()
                    .unwrap_or_else(|| PipelineError::validation("uploaded file is empty")));
            }
        };

        let stored_name = format!("{id}_{}", safe_filename(&original_name));
        let dest = self.assets_dir.join(&stored_name);
        tokio::fs::create_dir_all(&self.assets_dir).await?;
        if let Err(err) = tokio::fs::rename(&staged, &dest).await {
            warn!(error = %err, "rename from staging failed, copying");
            tokio::fs::copy(&staged, &dest).await?;
            let _ = tokio::fs::remove_file(&staged).await;
        }

        let info = match self.media.probe(&dest).await {
            Ok(info) => info,
            Err(err) => {
                let _ = tokio::fs::remove_file(&dest).await;
                return Err(err);
            }
        };
        let checksum = compute_file_checksum(&dest)
            .await
            .map_err(|e| PipelineError::EngineExecution(format!("checksum failed: {e}")))?;

        let record = AssetRecord {
            id,
            original_name,
            stored_name,
            path: dest.to_string_lossy().to_string(),
            size_bytes,
            checksum,
            kind: info.kind,
            has_video: info.has_video,
            has_audio: info.has_audio,
            duration: info.duration,
            width: info.width,
            height: info.height,
            created_at: Utc::now(),
        };
        self.db.insert_asset(&record)?;
        info!(asset_id = %record.id, kind = ?record.kind, duration = record.duration, "asset imported");
        Ok(record)
    }

    pub fn list_assets(&self) -> PipelineResult<Vec<AssetRecord>> {
        self.db.list_assets()
    }

    pub fn get_asset(&self, id: &str) -> PipelineResult<AssetRecord> {
        self.db
            .get_asset(id)?
            .ok_or_else(|| PipelineError::AssetNotFound(id.to_string()))
    }

    /// Compiles `project`, renders it and records the export.
    pub async fn export(&self, project: &Project) -> PipelineResult<ExportResult> {
        let assets = self.db.assets_by_id(&project.referenced_assets())?;
        let graph = compile_project(project, &assets)?;

        let export_id = Uuid::new_v4().simple().to_string();
        let output_path = self.exports_dir.join(format!("{export_id}.mp4"));
        self.media.render(&graph, &output_path).await?;

        self.db.insert_export(&ExportRecord {
            id: export_id.clone(),
            output_path: output_path.to_string_lossy().to_string(),
            duration: graph.output_duration,
            project_json: serde_json::to_string(project)?,
            created_at: Utc::now(),
        })?;

        info!(export_id = %export_id, duration = graph.output_duration, "project exported");
        Ok(ExportResult {
            export_id,
            duration: graph.output_duration,
            output_path,
        })
    }

    /// Stored output of a recorded export.
    pub fn export_path(&self, export_id: &str) -> PipelineResult<Option<PathBuf>> {
        Ok(self
            .db
            .get_export(export_id)?
            .map(|e| PathBuf::from(e.output_path)))
    }
}

async fn stage_upload<S, E>(staged: &Path, chunks: S) -> PipelineResult<u64>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    pin_mut!(chunks);
    let mut file = tokio::fs::File::create(staged).await?;
    let mut written = 0u64;
    while let Some(chunk) = chunks.next().await {
        let chunk =
            chunk.map_err(|e| PipelineError::validation(format!("upload interrupted: {e}")))?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}
