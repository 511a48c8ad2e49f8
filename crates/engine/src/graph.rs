//! Engine-neutral render graph produced by the compiler.
//!
//! A graph is an ordered list of labelled nodes. Each node names one
//! operation with typed parameters and the pads it reads from: either a
//! stream of a file input or the output of an earlier node. Nothing here
//! knows about ffmpeg syntax; see [`crate::render`] for that.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
}

/// Where a node reads from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Pad {
    Input { index: usize, stream: StreamKind },
    Node { label: String },
}

impl Pad {
    pub fn node(label: impl Into<String>) -> Self {
        Pad::Node {
            label: label.into(),
        }
    }

    pub fn video(index: usize) -> Self {
        Pad::Input {
            index,
            stream: StreamKind::Video,
        }
    }

    pub fn audio(index: usize) -> Self {
        Pad::Input {
            index,
            stream: StreamKind::Audio,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fade {
    /// Offset from the start of the clip, in seconds.
    pub start: f64,
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Solid background covering the whole output.
    ColorSource {
        color: String,
        width: u32,
        height: u32,
        fps: u32,
        duration: f64,
    },
    /// Stereo silence trimmed to the output duration.
    SilenceSource { duration: f64 },
    /// Trim a source, reset timestamps, scale to the canvas and conform the
    /// frame rate, with optional fades.
    PrepareVideo {
        in_point: f64,
        duration: f64,
        width: u32,
        height: u32,
        fps: u32,
        fade_in: Option<Fade>,
        fade_out: Option<Fade>,
    },
    /// Composite the second pad over the first while `start <= t <= end`.
    Overlay { start: f64, end: f64 },
    /// Trim a source audio stream, scale its volume and delay it into place.
    PrepareAudio {
        in_point: f64,
        duration: f64,
        volume: f64,
        delay_ms: u64,
    },
    /// Sum all input pads without normalization.
    AudioMix { inputs: usize },
    AudioPassthrough,
    /// Draw text over the input while `start <= t <= end`. `text` is raw.
    DrawText {
        text: String,
        font_size: u32,
        color: String,
        x: i32,
        y: i32,
        start: f64,
        end: f64,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::ColorSource { .. } => "color_source",
            Operation::SilenceSource { .. } => "silence_source",
            Operation::PrepareVideo { .. } => "prepare_video",
            Operation::Overlay { .. } => "overlay",
            Operation::PrepareAudio { .. } => "prepare_audio",
            Operation::AudioMix { .. } => "audio_mix",
            Operation::AudioPassthrough => "audio_passthrough",
            Operation::DrawText { .. } => "draw_text",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderNode {
    pub label: String,
    pub op: Operation,
    pub inputs: Vec<Pad>,
}

/// A file read by the renderer exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderInput {
    pub asset_id: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeSettings {
    pub video_codec: String,
    pub preset: String,
    pub crf: u32,
    pub pixel_format: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub fast_start: bool,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        EncodeSettings {
            video_codec: "libx264".to_string(),
            preset: "veryfast".to_string(),
            crf: 23,
            pixel_format: "yuv420p".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate: "192k".to_string(),
            fast_start: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderGraph {
    pub inputs: Vec<RenderInput>,
    pub nodes: Vec<RenderNode>,
    pub final_video_label: String,
    pub final_audio_label: String,
    pub output_duration: f64,
    pub encode: EncodeSettings,
}

impl RenderGraph {
    pub fn node(&self, label: &str) -> Option<&RenderNode> {
        self.nodes.iter().find(|node| node.label == label)
    }

    pub fn overlay_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node.op, Operation::Overlay { .. }))
            .count()
    }

    /// Pads feeding the final audio node.
    pub fn mix_inputs(&self) -> &[Pad] {
        self.node(&self.final_audio_label)
            .map(|node| node.inputs.as_slice())
            .unwrap_or(&[])
    }

    pub fn input_index(&self, asset_id: &str) -> Option<usize> {
        self.inputs.iter().position(|input| input.asset_id == asset_id)
    }
}
