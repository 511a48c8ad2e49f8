use std::path::{Path, PathBuf};

use crate::graph::{Operation, Pad, RenderGraph, RenderNode, StreamKind};

pub struct RenderCommand {
    /// Arguments for the `ffmpeg` binary, program name excluded.
    pub ffmpeg_args: Vec<String>,
    pub output_path: PathBuf,
}

/// Escape text for a single-quoted drawtext `text=` value inside a filter graph.
pub fn escape_drawtext(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '\\' | ':' | '\'' | '%' | ',' | '[' | ']') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn pad(pad: &Pad) -> String {
    match pad {
        Pad::Input {
            index,
            stream: StreamKind::Video,
        } => format!("[{index}:v]"),
        Pad::Input {
            index,
            stream: StreamKind::Audio,
        } => format!("[{index}:a]"),
        Pad::Node { label } => format!("[{label}]"),
    }
}

fn between(start: f64, end: f64) -> String {
    format!("enable='between(t,{start:.3},{end:.3})'")
}

fn filter_body(op: &Operation) -> String {
    match op {
        Operation::ColorSource {
            color,
            width,
            height,
            fps,
            duration,
        } => format!("color=c={color}:s={width}x{height}:r={fps}:d={duration:.3},format=yuv420p"),
        Operation::SilenceSource { duration } => format!(
            "anullsrc=channel_layout=stereo:sample_rate=44100,atrim=duration={duration:.3},asetpts=PTS-STARTPTS"
        ),
        Operation::PrepareVideo {
            in_point,
            duration,
            width,
            height,
            fps,
            fade_in,
            fade_out,
        } => {
            let mut chain = format!(
                "trim=start={in_point:.3}:duration={duration:.3},setpts=PTS-STARTPTS,scale={width}:{height},fps={fps}"
            );
            if let Some(fade) = fade_in {
                chain.push_str(&format!(",fade=t=in:st={:.3}:d={:.3}", fade.start, fade.duration));
            }
            if let Some(fade) = fade_out {
                chain.push_str(&format!(",fade=t=out:st={:.3}:d={:.3}", fade.start, fade.duration));
            }
            chain
        }
        Operation::Overlay { start, end } => {
            format!("overlay=shortest=0:{}", between(*start, *end))
        }
        Operation::PrepareAudio {
            in_point,
            duration,
            volume,
            delay_ms,
        } => format!(
            "atrim=start={in_point:.3}:duration={duration:.3},asetpts=PTS-STARTPTS,volume={volume:.3},adelay={delay_ms}|{delay_ms}"
        ),
        Operation::AudioMix { inputs } => {
            format!("amix=inputs={inputs}:normalize=0:dropout_transition=0")
        }
        Operation::AudioPassthrough => "anull".to_string(),
        Operation::DrawText {
            text,
            font_size,
            color,
            x,
            y,
            start,
            end,
        } => format!(
            "drawtext=text='{}':fontcolor={color}:fontsize={font_size}:x={x}:y={y}:{}",
            escape_drawtext(text),
            between(*start, *end)
        ),
    }
}

fn filter_statement(node: &RenderNode) -> String {
    let inputs: String = node.inputs.iter().map(pad).collect();
    format!("{inputs}{}[{}]", filter_body(&node.op), node.label)
}

/// The `-filter_complex` value for a graph.
pub fn filter_complex(graph: &RenderGraph) -> String {
    graph
        .nodes
        .iter()
        .map(filter_statement)
        .collect::<Vec<_>>()
        .join(";")
}

/// Generate the ffmpeg invocation that renders `graph` to `output_path`.
pub fn render_command(graph: &RenderGraph, output_path: &Path) -> RenderCommand {
    let mut args = vec!["-y".to_string()];
    for input in &graph.inputs {
        args.push("-i".to_string());
        args.push(input.path.clone());
    }

    let encode = &graph.encode;
    args.extend([
        "-filter_complex".to_string(),
        filter_complex(graph),
        "-map".to_string(),
        format!("[{}]", graph.final_video_label),
        "-map".to_string(),
        format!("[{}]", graph.final_audio_label),
        "-c:v".to_string(),
        encode.video_codec.clone(),
        "-preset".to_string(),
        encode.preset.clone(),
        "-crf".to_string(),
        encode.crf.to_string(),
        "-pix_fmt".to_string(),
        encode.pixel_format.clone(),
        "-c:a".to_string(),
        encode.audio_codec.clone(),
        "-b:a".to_string(),
        encode.audio_bitrate.clone(),
    ]);
    if encode.fast_start {
        args.push("-movflags".to_string());
        args.push("+faststart".to_string());
    }
    args.push(output_path.to_string_lossy().to_string());

    RenderCommand {
        ffmpeg_args: args,
        output_path: output_path.to_path_buf(),
    }
}
