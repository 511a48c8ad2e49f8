use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::NarrationProvider;
use crate::error::{PipelineError, PipelineResult};
use crate::media::ffmpeg::stderr_tail;

const PROVIDER: &str = "espeak";
const WORDS_PER_MINUTE: &str = "155";

/// Local speech synthesis through an installed binary, resolved on each call.
pub struct EspeakNarration {
    binary: String,
}

impl EspeakNarration {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        which::which(&self.binary).is_ok()
    }
}

#[async_trait]
impl NarrationProvider for EspeakNarration {
    async fn synthesize(&self, text: &str, job_dir: &Path) -> PipelineResult<PathBuf> {
        let binary = which::which(&self.binary)
            .map_err(|e| PipelineError::provider(PROVIDER, format!("{} not available: {e}", self.binary)))?;

        let dest = job_dir.join("audio_local.wav");
        debug!(binary = %binary.display(), "synthesizing narration locally");
        // Text goes over stdin so it is never parsed as an option.
        let mut child = Command::new(&binary)
            .arg("-s")
            .arg(WORDS_PER_MINUTE)
            .arg("-w")
            .arg(&dest)
            .arg("--stdin")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PipelineError::provider(PROVIDER, e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|e| PipelineError::provider(PROVIDER, e))?;
        }
        let output = child
            .wait_with_output()
            .await
            .map_err(|e| PipelineError::provider(PROVIDER, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::provider(PROVIDER, stderr_tail(&stderr, 600)));
        }

        let written = tokio::fs::metadata(&dest)
            .await
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false);
        if !written {
            return Err(PipelineError::provider(
                PROVIDER,
                format!("exited successfully but wrote no audio to {}", dest.display()),
            ));
        }
        Ok(dest)
    }
}
