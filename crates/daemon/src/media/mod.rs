pub mod ffmpeg;

use anyhow::Result;
use async_trait::async_trait;
use engine::{AssetKind, RenderGraph};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, BufReader};

use crate::error::PipelineResult;

/// Probed properties of a media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub kind: AssetKind,
    pub has_video: bool,
    pub has_audio: bool,
    pub duration: f64,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// The external rendering engine.
///
/// Every failure is an `EngineExecution` error carrying the tail of the
/// engine's diagnostics.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    async fn probe(&self, path: &Path) -> PipelineResult<MediaInfo>;

    async fn render(&self, graph: &RenderGraph, output: &Path) -> PipelineResult<()>;

    /// Fixed-length video from one still image.
    async fn image_to_video(&self, image: &Path, output: &Path, seconds: u32) -> PipelineResult<()>;

    async fn silent_audio(&self, output: &Path, seconds: u32) -> PipelineResult<()>;

    /// Copy the video stream, transcode the audio, stop at the shorter stream.
    async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> PipelineResult<()>;
}

pub async fn compute_file_checksum(file_path: &Path) -> Result<String> {
    let file = File::open(file_path).await?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// File name safe to store on disk: `[A-Za-z0-9._-]`, at most 120 characters.
pub fn safe_filename(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(120)
        .collect();
    if cleaned.is_empty() {
        "asset.bin".to_string()
    } else {
        cleaned
    }
}
