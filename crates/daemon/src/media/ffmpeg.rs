use async_trait::async_trait;
use engine::render::render_command;
use engine::{AssetKind, RenderGraph};
use serde::Deserialize;
use std::ffi::OsString;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info};

use super::{MediaEngine, MediaInfo};
use crate::error::{PipelineError, PipelineResult};

/// Diagnostics kept from a failed pipeline stage command.
const STAGE_STDERR_TAIL: usize = 600;
/// Diagnostics kept from a failed project export.
const EXPORT_STDERR_TAIL: usize = 700;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: Option<FormatInfo>,
    #[serde(default)]
    streams: Vec<StreamInfo>,
}

#[derive(Debug, Deserialize)]
struct FormatInfo {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamInfo {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

/// Last `max_chars` characters of `text`, trimmed.
pub fn stderr_tail(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    let count = trimmed.chars().count();
    if count <= max_chars {
        return trimmed.to_string();
    }
    trimmed.chars().skip(count - max_chars).collect()
}

fn parse_probe(stdout: &[u8]) -> PipelineResult<MediaInfo> {
    let probe: ProbeOutput = serde_json::from_slice(stdout)?;

    let duration = probe
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .unwrap_or(0.0);

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let has_audio = probe
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));
    let has_video = video_stream.is_some();

    let kind = if has_video {
        AssetKind::Video
    } else if has_audio {
        AssetKind::Audio
    } else {
        AssetKind::File
    };

    Ok(MediaInfo {
        kind,
        has_video,
        has_audio,
        duration,
        width: video_stream.and_then(|s| s.width),
        height: video_stream.and_then(|s| s.height),
    })
}

/// Media engine backed by the `ffmpeg` and `ffprobe` binaries.
#[derive(Debug, Clone)]
pub struct FFmpegWrapper {
    ffmpeg: String,
    ffprobe: String,
}

impl Default for FFmpegWrapper {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl FFmpegWrapper {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Runs `program`, returning stdout. Failure carries the stderr tail.
    async fn run_command(
        program: &str,
        args: &[OsString],
        what: &str,
        tail: usize,
    ) -> PipelineResult<Vec<u8>> {
        debug!(program, args = ?args, "running media command");
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                PipelineError::EngineExecution(format!("{what}: failed to start {program}: {e}"))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::EngineExecution(format!(
                "{what}: {}",
                stderr_tail(&stderr, tail)
            )));
        }

        Ok(output.stdout)
    }

    async fn ffmpeg(&self, args: Vec<OsString>, what: &str, tail: usize) -> PipelineResult<()> {
        Self::run_command(&self.ffmpeg, &args, what, tail).await?;
        Ok(())
    }
}

async fn ensure_parent(path: &Path) -> PipelineResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

fn os_args<const N: usize>(args: [&str; N]) -> Vec<OsString> {
    args.iter().map(OsString::from).collect()
}

#[async_trait]
impl MediaEngine for FFmpegWrapper {
    async fn probe(&self, path: &Path) -> PipelineResult<MediaInfo> {
        let mut args = os_args([
            "-v",
            "error",
            "-show_entries",
            "format=duration:stream=codec_type,width,height",
            "-of",
            "json",
        ]);
        args.push(path.as_os_str().to_owned());

        let stdout =
            Self::run_command(&self.ffprobe, &args, "ffprobe failed", STAGE_STDERR_TAIL).await?;
        parse_probe(&stdout)
    }

    async fn render(&self, graph: &RenderGraph, output: &Path) -> PipelineResult<()> {
        ensure_parent(output).await?;
        let command = render_command(graph, output);
        info!(
            output = %output.display(),
            nodes = graph.nodes.len(),
            duration = graph.output_duration,
            "rendering project"
        );
        let args: Vec<OsString> = command.ffmpeg_args.iter().map(OsString::from).collect();
        self.ffmpeg(args, "ffmpeg export failed", EXPORT_STDERR_TAIL)
            .await
    }

    async fn image_to_video(&self, image: &Path, output: &Path, seconds: u32) -> PipelineResult<()> {
        ensure_parent(output).await?;
        let seconds = seconds.to_string();
        let mut args = os_args(["-y", "-loop", "1", "-i"]);
        args.push(image.as_os_str().to_owned());
        args.extend(os_args([
            "-vf",
            "scale=1280:720,format=yuv420p",
            "-t",
            seconds.as_str(),
            "-r",
            "24",
            "-c:v",
            "libx264",
        ]));
        args.push(output.as_os_str().to_owned());
        self.ffmpeg(args, "image to video failed", STAGE_STDERR_TAIL)
            .await
    }

    async fn silent_audio(&self, output: &Path, seconds: u32) -> PipelineResult<()> {
        ensure_parent(output).await?;
        let seconds = seconds.to_string();
        let mut args = os_args([
            "-y",
            "-f",
            "lavfi",
            "-i",
            "anullsrc=channel_layout=stereo:sample_rate=44100",
            "-t",
            seconds.as_str(),
            "-c:a",
            "aac",
        ]);
        args.push(output.as_os_str().to_owned());
        self.ffmpeg(args, "silent audio failed", STAGE_STDERR_TAIL)
            .await
    }

    async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> PipelineResult<()> {
        ensure_parent(output).await?;
        let mut args = os_args(["-y", "-i"]);
        args.push(video.as_os_str().to_owned());
        args.push("-i".into());
        args.push(audio.as_os_str().to_owned());
        args.extend(os_args([
            "-c:v", "copy", "-c:a", "aac", "-b:a", "192k", "-shortest",
        ]));
        args.push(output.as_os_str().to_owned());
        self.ffmpeg(args, "mux failed", STAGE_STDERR_TAIL).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_video_with_audio() {
        let json = br#"{
            "streams": [
                {"codec_type": "video", "width": 1920, "height": 1080},
                {"codec_type": "audio"}
            ],
            "format": {"duration": "12.480000"}
        }"#;
        let info = parse_probe(json).unwrap();
        assert_eq!(info.kind, AssetKind::Video);
        assert!(info.has_video && info.has_audio);
        assert_eq!(info.duration, 12.48);
        assert_eq!((info.width, info.height), (Some(1920), Some(1080)));
    }

    #[test]
    fn parses_audio_only_and_unknown_duration() {
        let json = br#"{"streams": [{"codec_type": "audio"}], "format": {"duration": "N/A"}}"#;
        let info = parse_probe(json).unwrap();
        assert_eq!(info.kind, AssetKind::Audio);
        assert!(!info.has_video);
        assert_eq!(info.duration, 0.0);
        assert_eq!(info.width, None);
    }

    #[test]
    fn streamless_file_is_generic() {
        let info = parse_probe(br#"{"format": {}}"#).unwrap();
        assert_eq!(info.kind, AssetKind::File);
    }

    #[test]
    fn stderr_tail_keeps_the_end() {
        let text = format!("{}END", "x".repeat(1000));
        let tail = stderr_tail(&text, 600);
        assert_eq!(tail.chars().count(), 600);
        assert!(tail.ends_with("END"));
        assert_eq!(stderr_tail("  short  ", 600), "short");
    }

    #[tokio::test]
    async fn missing_binary_is_an_engine_error() {
        let engine = FFmpegWrapper::new("/nonexistent/ffmpeg", "/nonexistent/ffprobe");
        let err = engine
            .silent_audio(Path::new("/tmp/never-written.m4a"), 6)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::EngineExecution(_)));
        assert!(err.to_string().contains("failed to start"));
    }
}
