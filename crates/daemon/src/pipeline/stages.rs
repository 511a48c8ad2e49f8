use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::fallback::{run_chain, Attempt, ChainOutcome};
use super::job::{Job, JobStage, ProviderKind};
use crate::error::{PipelineError, PipelineResult};
use crate::media::MediaEngine;
use crate::providers::{ImageProvider, NarrationProvider, VideoProvider};

/// Everything a job needs from the outside world.
#[derive(Clone)]
pub struct Providers {
    pub remote_video: Option<Arc<dyn VideoProvider>>,
    pub local_image: Arc<dyn ImageProvider>,
    pub remote_narration: Option<Arc<dyn NarrationProvider>>,
    pub local_narration: Option<Arc<dyn NarrationProvider>>,
    pub media: Arc<dyn MediaEngine>,
}

/// Still image from the local provider, held for `seconds`.
async fn local_video(
    providers: &Providers,
    prompt: &str,
    seconds: u32,
    job_dir: &Path,
) -> PipelineResult<PathBuf> {
    providers.local_image.wait_until_ready().await?;
    let image = providers.local_image.generate_image(prompt).await?;

    let frame = job_dir.join("frame.png");
    tokio::fs::write(&frame, &image).await?;

    let output = job_dir.join("video_local.mp4");
    providers
        .media
        .image_to_video(&frame, &output, seconds)
        .await?;
    Ok(output)
}

/// Remote generation when requested, then the local still-image path.
pub async fn video_stage(
    providers: &Providers,
    job: &Job,
    seconds: u32,
    job_dir: &Path,
    on_checkpoint: impl FnMut(JobStage),
) -> PipelineResult<ChainOutcome<PathBuf>> {
    let mut attempts = Vec::new();
    if job.use_remote_video {
        attempts.push(Attempt::new(
            ProviderKind::Remote,
            Some(JobStage::GeneratingVideoRemote),
            move || async move {
                let remote = providers
                    .remote_video
                    .as_ref()
                    .ok_or_else(|| PipelineError::provider("remote video", "not configured"))?;
                remote.generate_video(&job.prompt, seconds, job_dir).await
            },
        ));
    }
    attempts.push(Attempt::new(
        ProviderKind::Local,
        Some(JobStage::GeneratingVideoLocal),
        move || local_video(providers, &job.prompt, seconds, job_dir),
    ));

    run_chain("video", attempts, on_checkpoint).await
}

/// Remote narration, then the local binary, then silence.
pub async fn audio_stage(
    providers: &Providers,
    job: &Job,
    seconds: u32,
    job_dir: &Path,
) -> PipelineResult<ChainOutcome<PathBuf>> {
    let text = job.narration.as_str();
    let mut attempts = Vec::new();

    if job.use_remote_audio {
        attempts.push(Attempt::new(ProviderKind::Remote, None, move || async move {
            let remote = providers
                .remote_narration
                .as_ref()
                .ok_or_else(|| PipelineError::provider("remote narration", "not configured"))?;
            remote.synthesize(text, job_dir).await
        }));
    }
    if let Some(local) = &providers.local_narration {
        attempts.push(Attempt::new(ProviderKind::LocalBinary, None, move || {
            local.synthesize(text, job_dir)
        }));
    }
    attempts.push(Attempt::new(ProviderKind::Silent, None, move || async move {
        let output = job_dir.join("audio_silent.m4a");
        providers.media.silent_audio(&output, seconds).await?;
        Ok(output)
    }));

    run_chain("audio", attempts, |_| {}).await
}
