use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::download::serve_file;
use super::error::ApiError;
use super::AppState;
use crate::pipeline::{Job, JobStage, JobStatus, ProviderKind, VideoJobRequest};

const DEFAULT_LIST_LIMIT: usize = 20;

#[derive(Serialize)]
pub struct JobSummary {
    id: String,
    prompt: String,
    status: JobStatus,
    stage: JobStage,
    progress: u8,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    error: Option<String>,
    video_provider: Option<ProviderKind>,
    audio_provider: Option<ProviderKind>,
    download_url: Option<String>,
}

impl From<Job> for JobSummary {
    fn from(job: Job) -> Self {
        let download_url =
            (job.status == JobStatus::Completed).then(|| format!("/jobs/{}/download", job.id));
        JobSummary {
            id: job.id,
            prompt: job.prompt,
            status: job.status,
            stage: job.stage,
            progress: job.progress,
            created_at: job.created_at,
            updated_at: job.updated_at,
            error: job.error,
            video_provider: job.video_provider,
            audio_provider: job.audio_provider,
            download_url,
        }
    }
}

#[derive(Serialize)]
pub struct SubmitResponse {
    id: String,
    status: JobStatus,
    poll_url: String,
    download_url: String,
}

#[derive(Serialize)]
pub struct JobList {
    jobs: Vec<JobSummary>,
}

#[derive(Deserialize)]
pub struct ListQuery {
    limit: Option<usize>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(list_jobs))
        .route("/video", post(submit_video_job))
        .route("/:id", get(get_job))
        .route("/:id/download", get(download_job))
        .with_state(state)
}

async fn submit_video_job(
    State(state): State<AppState>,
    Json(request): Json<VideoJobRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    state.images.wait_until_ready().await?;
    let job = state.orchestrator.submit(request)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            poll_url: format!("/jobs/{}", job.id),
            download_url: format!("/jobs/{}/download", job.id),
            id: job.id,
            status: job.status,
        }),
    ))
}

async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<JobList> {
    let jobs = state
        .orchestrator
        .list_recent(query.limit.unwrap_or(DEFAULT_LIST_LIMIT))
        .into_iter()
        .map(JobSummary::from)
        .collect();
    Json(JobList { jobs })
}

async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobSummary>, ApiError> {
    Ok(Json(state.orchestrator.get(&id)?.into()))
}

async fn download_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let job = state.orchestrator.get(&id)?;
    if job.status != JobStatus::Completed {
        return Err(ApiError::Conflict(format!(
            "job {id} is {:?}, not completed",
            job.status
        )));
    }
    let path = job
        .output_path
        .ok_or_else(|| ApiError::NotFound(format!("job {id} has no output")))?;

    serve_file(&path, &headers, Some(&format!("{id}.mp4"))).await
}
