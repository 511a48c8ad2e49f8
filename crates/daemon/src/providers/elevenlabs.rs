use async_trait::async_trait;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;

use super::http::HttpClient;
use super::NarrationProvider;
use crate::config::ElevenLabsConfig;
use crate::error::{PipelineError, PipelineResult};

const PROVIDER: &str = "elevenlabs";

/// Remote speech synthesis returning MPEG audio.
pub struct ElevenLabsNarration {
    http: HttpClient,
    config: ElevenLabsConfig,
}

impl ElevenLabsNarration {
    pub fn new(http: HttpClient, config: ElevenLabsConfig) -> Self {
        Self { http, config }
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_key.is_some() && self.config.voice_id.is_some()
    }
}

#[async_trait]
impl NarrationProvider for ElevenLabsNarration {
    async fn synthesize(&self, text: &str, job_dir: &Path) -> PipelineResult<PathBuf> {
        let (Some(api_key), Some(voice_id)) = (&self.config.api_key, &self.config.voice_id) else {
            return Err(PipelineError::provider(PROVIDER, "api key or voice id not configured"));
        };

        let url = format!(
            "{}/v1/text-to-speech/{}",
            self.config.api_base.trim_end_matches('/'),
            voice_id
        );
        let body = json!({
            "text": text,
            "model_id": self.config.model_id,
            "voice_settings": {"stability": 0.5, "similarity_boost": 0.75},
        });

        let response = self
            .http
            .send("elevenlabs.tts", |c| {
                c.post(&url)
                    .header("xi-api-key", api_key.as_str())
                    .header("Accept", "audio/mpeg")
                    .timeout(self.config.request_timeout)
                    .json(&body)
            })
            .await
            .map_err(|e| PipelineError::provider(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(PipelineError::provider(
                PROVIDER,
                format!("text-to-speech returned {status}: {detail}"),
            ));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| PipelineError::provider(PROVIDER, e))?;
        if audio.is_empty() {
            return Err(PipelineError::provider(PROVIDER, "empty audio response"));
        }

        let dest = job_dir.join("audio_remote.mp3");
        tokio::fs::write(&dest, &audio).await?;
        info!(bytes = audio.len(), "remote narration written");
        Ok(dest)
    }
}
