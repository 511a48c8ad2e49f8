//! External generation services behind small capability traits.
//!
//! A provider error is never fatal on its own: the job pipeline treats it as
//! the signal to try the next provider in the stage's fallback chain.

pub mod elevenlabs;
pub mod espeak;
pub mod http;
pub mod replicate;
pub mod sd_host;

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::error::PipelineResult;

pub use elevenlabs::ElevenLabsNarration;
pub use espeak::EspeakNarration;
pub use http::{HttpClient, RetryPolicy};
pub use replicate::ReplicateVideo;
pub use sd_host::SdHostClient;

/// Produces a video file for a prompt.
#[async_trait]
pub trait VideoProvider: Send + Sync {
    async fn generate_video(
        &self,
        prompt: &str,
        duration_seconds: u32,
        job_dir: &Path,
    ) -> PipelineResult<PathBuf>;
}

/// On-demand still image generation.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// One health probe. Never fails; unreachable means not ready.
    async fn is_ready(&self) -> bool;

    /// Blocks until the provider is ready or its startup bound elapses.
    async fn wait_until_ready(&self) -> PipelineResult<()>;

    /// Encoded image bytes (PNG).
    async fn generate_image(&self, prompt: &str) -> PipelineResult<Bytes>;
}

/// Speech synthesis into an audio file inside `job_dir`.
#[async_trait]
pub trait NarrationProvider: Send + Sync {
    async fn synthesize(&self, text: &str, job_dir: &Path) -> PipelineResult<PathBuf>;
}
