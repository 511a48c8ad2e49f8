use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{PipelineError, PipelineResult};

pub const MAX_PROMPT_CHARS: usize = 800;
pub const MAX_NARRATION_CHARS: usize = 1200;
/// Stored error messages are cut to this many characters.
pub const MAX_ERROR_CHARS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Queued,
    Starting,
    GeneratingVideoRemote,
    GeneratingVideoLocal,
    GeneratingAudio,
    Muxing,
    Completed,
    Failed,
}

impl JobStage {
    /// Progress checkpoint reached on entering this stage.
    pub fn progress(self) -> u8 {
        match self {
            JobStage::Queued => 0,
            JobStage::Starting => 5,
            JobStage::GeneratingVideoRemote => 20,
            JobStage::GeneratingVideoLocal => 30,
            JobStage::GeneratingAudio => 55,
            JobStage::Muxing => 80,
            JobStage::Completed | JobStage::Failed => 100,
        }
    }
}

/// Which provider produced a stage's artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Remote,
    Local,
    LocalBinary,
    Silent,
}

#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: String,
    pub prompt: String,
    /// Spoken text; the prompt when no narration was given.
    pub narration: String,
    pub use_remote_video: bool,
    pub use_remote_audio: bool,
    pub status: JobStatus,
    pub stage: JobStage,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
    pub output_path: Option<PathBuf>,
    pub video_provider: Option<ProviderKind>,
    pub audio_provider: Option<ProviderKind>,
}

impl Job {
    pub fn queued(id: String, request: ValidatedRequest) -> Self {
        let now = Utc::now();
        let narration = request
            .narration
            .unwrap_or_else(|| request.prompt.clone());
        Job {
            id,
            prompt: request.prompt,
            narration,
            use_remote_video: request.use_remote_video,
            use_remote_audio: request.use_remote_audio,
            status: JobStatus::Queued,
            stage: JobStage::Queued,
            progress: 0,
            created_at: now,
            updated_at: now,
            error: None,
            output_path: None,
            video_provider: None,
            audio_provider: None,
        }
    }

    /// Moves to `stage`. Progress never decreases.
    pub fn enter_stage(&mut self, stage: JobStage) {
        self.stage = stage;
        self.progress = self.progress.max(stage.progress());
        self.updated_at = Utc::now();
    }

    pub fn record_video_provider(&mut self, provider: ProviderKind) {
        self.video_provider = Some(provider);
        self.updated_at = Utc::now();
    }

    pub fn record_audio_provider(&mut self, provider: ProviderKind) {
        self.audio_provider = Some(provider);
        self.updated_at = Utc::now();
    }

    pub fn fail(&mut self, message: &str) {
        self.status = JobStatus::Failed;
        self.error = Some(message.chars().take(MAX_ERROR_CHARS).collect());
        self.enter_stage(JobStage::Failed);
    }
}

fn default_true() -> bool {
    true
}

/// Body of a video job submission.
#[derive(Debug, Clone, Deserialize)]
pub struct VideoJobRequest {
    pub prompt: String,
    #[serde(default)]
    pub narration: Option<String>,
    #[serde(default = "default_true", alias = "use_replicate")]
    pub use_remote_video: bool,
    #[serde(default = "default_true", alias = "use_elevenlabs")]
    pub use_remote_audio: bool,
}

/// A request that passed validation, with narration normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    pub prompt: String,
    pub narration: Option<String>,
    pub use_remote_video: bool,
    pub use_remote_audio: bool,
}

impl VideoJobRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            narration: None,
            use_remote_video: true,
            use_remote_audio: true,
        }
    }

    pub fn validate(self) -> PipelineResult<ValidatedRequest> {
        let prompt = self.prompt.trim().to_string();
        let prompt_chars = prompt.chars().count();
        if prompt_chars == 0 {
            return Err(PipelineError::validation("prompt must not be empty"));
        }
        if prompt_chars > MAX_PROMPT_CHARS {
            return Err(PipelineError::validation(format!(
                "prompt must be at most {MAX_PROMPT_CHARS} characters"
            )));
        }

        let narration = self
            .narration
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        if narration
            .as_ref()
            .is_some_and(|n| n.chars().count() > MAX_NARRATION_CHARS)
        {
            return Err(PipelineError::validation(format!(
                "narration must be at most {MAX_NARRATION_CHARS} characters"
            )));
        }

        Ok(ValidatedRequest {
            prompt,
            narration,
            use_remote_video: self.use_remote_video,
            use_remote_audio: self.use_remote_audio,
        })
    }
}

/// Target clip length in seconds for the spoken text.
pub fn estimate_duration_seconds(text: &str) -> u32 {
    let words = text.split_whitespace().count().max(1);
    let estimate = (words as f64 * 0.45).floor() as u32 + 2;
    estimate.clamp(6, 20)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_estimate_is_clamped() {
        assert_eq!(estimate_duration_seconds(""), 6);
        assert_eq!(estimate_duration_seconds("one two three four five six seven eight nine ten"), 6);
        assert_eq!(estimate_duration_seconds(&"word ".repeat(20)), 11);
        assert_eq!(estimate_duration_seconds(&"word ".repeat(200)), 20);
    }

    #[test]
    fn validation_trims_and_bounds() {
        let ok = VideoJobRequest {
            narration: Some("   ".to_string()),
            ..VideoJobRequest::new("  a quiet harbor  ")
        }
        .validate()
        .unwrap();
        assert_eq!(ok.prompt, "a quiet harbor");
        assert_eq!(ok.narration, None);

        assert!(VideoJobRequest::new("   ").validate().is_err());
        assert!(VideoJobRequest::new("p".repeat(801)).validate().is_err());
        assert!(VideoJobRequest::new("p".repeat(800)).validate().is_ok());

        let long_narration = VideoJobRequest {
            narration: Some("n".repeat(1201)),
            ..VideoJobRequest::new("ok")
        };
        assert!(matches!(long_narration.validate(), Err(PipelineError::Validation(_))));
    }

    #[test]
    fn request_accepts_legacy_flag_names() {
        let request: VideoJobRequest = serde_json::from_str(
            r#"{"prompt": "x", "use_replicate": false, "use_elevenlabs": false}"#,
        )
        .unwrap();
        assert!(!request.use_remote_video);
        assert!(!request.use_remote_audio);

        let defaults: VideoJobRequest = serde_json::from_str(r#"{"prompt": "x"}"#).unwrap();
        assert!(defaults.use_remote_video && defaults.use_remote_audio);
    }

    #[test]
    fn progress_never_goes_backwards() {
        let request = VideoJobRequest::new("x").validate().unwrap();
        let mut job = Job::queued("j".to_string(), request);
        assert_eq!(job.narration, "x");
        job.enter_stage(JobStage::Muxing);
        job.enter_stage(JobStage::GeneratingVideoRemote);
        assert_eq!(job.progress, 80);

        job.fail(&"e".repeat(5000));
        assert_eq!(job.progress, 100);
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_ref().map(|e| e.len()), Some(MAX_ERROR_CHARS));
    }

    #[test]
    fn recording_a_provider_touches_updated_at() {
        let request = VideoJobRequest::new("x").validate().unwrap();
        let mut job = Job::queued("j".to_string(), request);
        let stale = job.updated_at - chrono::Duration::seconds(60);

        job.updated_at = stale;
        job.record_video_provider(ProviderKind::Local);
        assert_eq!(job.video_provider, Some(ProviderKind::Local));
        assert!(job.updated_at > stale);

        job.updated_at = stale;
        job.record_audio_provider(ProviderKind::Silent);
        assert_eq!(job.audio_provider, Some(ProviderKind::Silent));
        assert!(job.updated_at > stale);
    }
}
