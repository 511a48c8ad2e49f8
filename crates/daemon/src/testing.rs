//! In-process fakes for the external collaborators.

use async_trait::async_trait;
use bytes::Bytes;
use engine::{AssetKind, RenderGraph};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::{PipelineError, PipelineResult};
use crate::media::{MediaEngine, MediaInfo};
use crate::providers::{ImageProvider, NarrationProvider, VideoProvider};

enum Behavior {
    Ok,
    Fail,
    Panic,
}

pub struct FakeVideo(Behavior);

impl FakeVideo {
    pub fn ok() -> Self {
        Self(Behavior::Ok)
    }

    pub fn failing() -> Self {
        Self(Behavior::Fail)
    }

    pub fn panicking() -> Self {
        Self(Behavior::Panic)
    }
}

#[async_trait]
impl VideoProvider for FakeVideo {
    async fn generate_video(&self, _prompt: &str, _seconds: u32, job_dir: &Path) -> PipelineResult<PathBuf> {
        match self.0 {
            Behavior::Ok => {
                let path = job_dir.join("video_remote.mp4");
                tokio::fs::write(&path, b"remote-video").await?;
                Ok(path)
            }
            Behavior::Fail => Err(PipelineError::provider("replicate", "prediction failed")),
            Behavior::Panic => panic!("remote video exploded"),
        }
    }
}

pub struct FakeImage {
    ready: bool,
}

impl FakeImage {
    pub fn ready() -> Self {
        Self { ready: true }
    }

    pub fn never_ready() -> Self {
        Self { ready: false }
    }
}

#[async_trait]
impl ImageProvider for FakeImage {
    async fn is_ready(&self) -> bool {
        self.ready
    }

    async fn wait_until_ready(&self) -> PipelineResult<()> {
        if self.ready {
            Ok(())
        } else {
            Err(PipelineError::timeout("local image provider startup"))
        }
    }

    async fn generate_image(&self, _prompt: &str) -> PipelineResult<Bytes> {
        Ok(Bytes::from_static(b"\x89PNG"))
    }
}

pub struct FakeNarration {
    file_name: &'static str,
    fail: bool,
}

impl FakeNarration {
    pub fn ok(file_name: &'static str) -> Self {
        Self {
            file_name,
            fail: false,
        }
    }

    pub fn failing(name: &'static str) -> Self {
        Self {
            file_name: name,
            fail: true,
        }
    }
}

#[async_trait]
impl NarrationProvider for FakeNarration {
    async fn synthesize(&self, _text: &str, job_dir: &Path) -> PipelineResult<PathBuf> {
        if self.fail {
            return Err(PipelineError::provider("narration", format!("{} unavailable", self.file_name)));
        }
        let path = job_dir.join(self.file_name);
        tokio::fs::write(&path, b"audio").await?;
        Ok(path)
    }
}

/// Writes placeholder files and records what it was asked to do.
#[derive(Default)]
pub struct FakeMedia {
    mux_error: Mutex<Option<String>>,
    render_error: Mutex<Option<String>>,
    muxed: Mutex<Vec<PathBuf>>,
    rendered: Mutex<Vec<RenderGraph>>,
    image_to_video: AtomicUsize,
}

impl FakeMedia {
    pub fn fail_mux(&self, stderr: &str) {
        *self.mux_error.lock().unwrap() = Some(stderr.to_string());
    }

    pub fn fail_render(&self, stderr: &str) {
        *self.render_error.lock().unwrap() = Some(stderr.to_string());
    }

    pub fn muxed_outputs(&self) -> Vec<PathBuf> {
        self.muxed.lock().unwrap().clone()
    }

    pub fn rendered_graphs(&self) -> Vec<RenderGraph> {
        self.rendered.lock().unwrap().clone()
    }

    pub fn image_to_video_calls(&self) -> usize {
        self.image_to_video.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaEngine for FakeMedia {
    async fn probe(&self, path: &Path) -> PipelineResult<MediaInfo> {
        let is_audio = path
            .extension()
            .is_some_and(|ext| ext == "mp3" || ext == "wav");
        Ok(MediaInfo {
            kind: if is_audio { AssetKind::Audio } else { AssetKind::Video },
            has_video: !is_audio,
            has_audio: true,
            duration: 5.0,
            width: (!is_audio).then_some(1280),
            height: (!is_audio).then_some(720),
        })
    }

    async fn render(&self, graph: &RenderGraph, output: &Path) -> PipelineResult<()> {
        let failure = self.render_error.lock().unwrap().clone();
        if let Some(stderr) = failure {
            return Err(PipelineError::EngineExecution(format!("ffmpeg export failed: {stderr}")));
        }
        self.rendered.lock().unwrap().push(graph.clone());
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(output, b"rendered").await?;
        Ok(())
    }

    async fn image_to_video(&self, _image: &Path, output: &Path, _seconds: u32) -> PipelineResult<()> {
        self.image_to_video.fetch_add(1, Ordering::SeqCst);
        tokio::fs::write(output, b"local-video").await?;
        Ok(())
    }

    async fn silent_audio(&self, output: &Path, _seconds: u32) -> PipelineResult<()> {
        tokio::fs::write(output, b"silence").await?;
        Ok(())
    }

    async fn mux(&self, _video: &Path, _audio: &Path, output: &Path) -> PipelineResult<()> {
        let failure = self.mux_error.lock().unwrap().clone();
        if let Some(stderr) = failure {
            return Err(PipelineError::EngineExecution(format!("mux failed: {stderr}")));
        }
        tokio::fs::write(output, b"final").await?;
        self.muxed.lock().unwrap().push(output.to_path_buf());
        Ok(())
    }
}
