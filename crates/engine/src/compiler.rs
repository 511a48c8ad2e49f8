use std::cmp::Ordering;

use crate::error::CompileError;
use crate::graph::*;
use crate::timeline::*;

const BASE_VIDEO_LABEL: &str = "vbase";
const BASE_AUDIO_LABEL: &str = "abase";
const AUDIO_OUT_LABEL: &str = "aout";

/// Clamped timing of a video or audio clip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipTiming {
    pub start: f64,
    pub in_point: f64,
    pub duration: f64,
    pub transition_in: f64,
    pub transition_out: f64,
}

impl ClipTiming {
    pub fn resolve(clip: &Clip) -> Self {
        let duration = clip.duration.max(MIN_CLIP_DURATION);
        let half = duration / 2.0;
        ClipTiming {
            start: clip.start.max(0.0),
            in_point: clip.in_point.max(0.0),
            duration,
            transition_in: clip.transition_in.min(half).max(0.0),
            transition_out: clip.transition_out.min(half).max(0.0),
        }
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    fn fade_in(&self) -> Option<Fade> {
        (self.transition_in > 0.0).then_some(Fade {
            start: 0.0,
            duration: self.transition_in,
        })
    }

    fn fade_out(&self) -> Option<Fade> {
        (self.transition_out > 0.0).then_some(Fade {
            start: (self.duration - self.transition_out).max(0.0),
            duration: self.transition_out,
        })
    }

    fn delay_ms(&self) -> u64 {
        (self.start * 1000.0) as u64
    }
}

/// Compositing order: track index, then start, then position in the track.
/// Later clips are layered on top.
fn compositing_order(a: &PlacedClip<'_>, b: &PlacedClip<'_>) -> Ordering {
    a.track_index
        .cmp(&b.track_index)
        .then(a.clip.start.total_cmp(&b.clip.start))
        .then(a.clip_index.cmp(&b.clip_index))
}

fn text_order(a: &PlacedClip<'_>, b: &PlacedClip<'_>) -> Ordering {
    a.clip
        .start
        .total_cmp(&b.clip.start)
        .then(a.track_index.cmp(&b.track_index))
        .then(a.clip_index.cmp(&b.clip_index))
}

struct GraphBuilder<'a, R> {
    project: &'a Project,
    assets: &'a R,
    inputs: Vec<RenderInput>,
    nodes: Vec<RenderNode>,
}

impl<'a, R: AssetResolver> GraphBuilder<'a, R> {
    fn push(&mut self, label: impl Into<String>, op: Operation, inputs: Vec<Pad>) -> String {
        let label = label.into();
        self.nodes.push(RenderNode {
            label: label.clone(),
            op,
            inputs,
        });
        label
    }

    /// Asset and input index for a clip, or `None` when the clip has no asset.
    fn source(&self, clip: &Clip) -> Result<Option<(&'a Asset, usize)>, CompileError> {
        let Some(asset_id) = clip.asset_id.as_deref().filter(|id| !id.is_empty()) else {
            return Ok(None);
        };
        let assets: &'a R = self.assets;
        let asset = assets
            .resolve(asset_id)
            .ok_or_else(|| CompileError::AssetNotFound(asset_id.to_string()))?;
        let index = self
            .inputs
            .iter()
            .position(|input| input.asset_id == asset_id)
            .ok_or_else(|| CompileError::AssetNotFound(asset_id.to_string()))?;
        Ok(Some((asset, index)))
    }

    fn prepare_audio(&mut self, label: String, source: usize, timing: &ClipTiming, volume: f64) -> String {
        self.push(
            label,
            Operation::PrepareAudio {
                in_point: timing.in_point,
                duration: timing.duration,
                volume,
                delay_ms: timing.delay_ms(),
            },
            vec![Pad::audio(source)],
        )
    }

    /// Folds every video clip onto the background, left to right. Returns the
    /// label of the composite and the labels of any audio the clips carry.
    fn build_visual_chain(&mut self, base: String) -> Result<(String, Vec<String>), CompileError> {
        let project = self.project;
        let mut clips = project.placed_clips(TrackKind::Video);
        clips.sort_by(compositing_order);

        let mut current = base;
        let mut audio_labels = Vec::new();
        for (idx, placed) in clips.iter().enumerate() {
            let Some((asset, source)) = self.source(placed.clip)? else {
                continue;
            };
            if !asset.has_video {
                continue;
            }
            let timing = ClipTiming::resolve(placed.clip);

            let clip_label = self.push(
                format!("vclip{idx}"),
                Operation::PrepareVideo {
                    in_point: timing.in_point,
                    duration: timing.duration,
                    width: project.width,
                    height: project.height,
                    fps: project.fps,
                    fade_in: timing.fade_in(),
                    fade_out: timing.fade_out(),
                },
                vec![Pad::video(source)],
            );
            current = self.push(
                format!("vtmp{idx}"),
                Operation::Overlay {
                    start: timing.start,
                    end: timing.end(),
                },
                vec![Pad::node(current), Pad::node(clip_label)],
            );

            if asset.has_audio {
                let label = self.prepare_audio(format!("av{idx}"), source, &timing, placed.clip.volume);
                audio_labels.push(label);
            }
        }
        Ok((current, audio_labels))
    }

    fn build_audio_chain(&mut self, mut labels: Vec<String>) -> Result<String, CompileError> {
        let mut clips = self.project.placed_clips(TrackKind::Audio);
        clips.sort_by(compositing_order);

        for (idx, placed) in clips.iter().enumerate() {
            let Some((asset, source)) = self.source(placed.clip)? else {
                continue;
            };
            if !asset.has_audio {
                continue;
            }
            let timing = ClipTiming::resolve(placed.clip);
            let label = self.prepare_audio(format!("aa{idx}"), source, &timing, placed.clip.volume);
            labels.push(label);
        }

        let pads: Vec<Pad> = labels.into_iter().map(Pad::node).collect();
        let op = if pads.len() == 1 {
            Operation::AudioPassthrough
        } else {
            Operation::AudioMix { inputs: pads.len() }
        };
        Ok(self.push(AUDIO_OUT_LABEL, op, pads))
    }

    fn build_text_chain(&mut self, base: String) -> String {
        let project = self.project;
        let mut clips = project.placed_clips(TrackKind::Text);
        clips.sort_by(text_order);

        let mut current = base;
        for (idx, placed) in clips.iter().enumerate() {
            let clip = placed.clip;
            let Some(text) = clip.overlay_text() else {
                continue;
            };
            let start = clip.start.max(0.0);
            let end = clip
                .end
                .unwrap_or(start + DEFAULT_TEXT_DURATION)
                .max(start + MIN_TEXT_DURATION);
            let y = clip
                .y
                .unwrap_or(project.height as i32 - DEFAULT_TEXT_BOTTOM_MARGIN);

            current = self.push(
                format!("vtxt{idx}"),
                Operation::DrawText {
                    text: text.to_string(),
                    font_size: clip.font_size,
                    color: clip.color.clone(),
                    x: clip.x,
                    y,
                    start,
                    end,
                },
                vec![Pad::node(current)],
            );
        }
        current
    }
}

/// Compiles a project into a render graph.
///
/// Fails without a partial graph when the project is invalid, has nothing to
/// show, or references an asset `assets` cannot resolve.
pub fn compile_project<R: AssetResolver>(project: &Project, assets: &R) -> Result<RenderGraph, CompileError> {
    project.validate()?;
    if !project.has_visual_content() {
        return Err(CompileError::EmptyProject);
    }

    let output_duration = project.resolved_duration();

    let mut inputs = Vec::new();
    for asset_id in project.referenced_assets() {
        let asset = assets
            .resolve(asset_id)
            .ok_or_else(|| CompileError::AssetNotFound(asset_id.to_string()))?;
        inputs.push(RenderInput {
            asset_id: asset_id.to_string(),
            path: asset.path.clone(),
        });
    }

    let mut builder = GraphBuilder {
        project,
        assets,
        inputs,
        nodes: Vec::new(),
    };

    let base_video = builder.push(
        BASE_VIDEO_LABEL,
        Operation::ColorSource {
            color: project.bg_color.clone(),
            width: project.width,
            height: project.height,
            fps: project.fps,
            duration: output_duration,
        },
        Vec::new(),
    );
    let base_audio = builder.push(
        BASE_AUDIO_LABEL,
        Operation::SilenceSource {
            duration: output_duration,
        },
        Vec::new(),
    );

    let (composite, mut audio_labels) = builder.build_visual_chain(base_video)?;
    audio_labels.insert(0, base_audio);
    let final_audio_label = builder.build_audio_chain(audio_labels)?;
    let final_video_label = builder.build_text_chain(composite);

    Ok(RenderGraph {
        inputs: builder.inputs,
        nodes: builder.nodes,
        final_video_label,
        final_audio_label,
        output_duration,
        encode: EncodeSettings::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn asset(id: &str, has_video: bool, has_audio: bool) -> Asset {
        Asset {
            id: id.to_string(),
            kind: if has_video { AssetKind::Video } else { AssetKind::Audio },
            has_video,
            has_audio,
            duration: 10.0,
            width: has_video.then_some(1920),
            height: has_video.then_some(1080),
            path: format!("/media/{id}.mp4"),
        }
    }

    fn store(assets: &[Asset]) -> HashMap<String, Asset> {
        assets.iter().map(|a| (a.id.clone(), a.clone())).collect()
    }

    fn media_clip(id: &str, asset_id: &str, start: f64, duration: f64) -> Clip {
        Clip {
            asset_id: Some(asset_id.to_string()),
            start,
            duration,
            ..Clip::new(id)
        }
    }

    fn track(id: &str, clips: Vec<Clip>) -> Track {
        Track {
            id: id.to_string(),
            clips,
        }
    }

    #[test]
    fn single_clip_with_audio_mixes_two_labels() {
        let assets = store(&[asset("a1", true, true)]);
        let project = Project {
            video_tracks: vec![track("v1", vec![media_clip("c1", "a1", 0.0, 5.0)])],
            ..Project::default()
        };

        let graph = compile_project(&project, &assets).unwrap();

        assert_eq!(graph.output_duration, 5.0);
        assert_eq!(graph.mix_inputs().len(), 2);
        assert!(matches!(
            graph.node(&graph.final_audio_label).unwrap().op,
            Operation::AudioMix { inputs: 2 }
        ));
        assert_eq!(graph.final_video_label, "vtmp0");
    }

    #[test]
    fn silent_project_passes_base_audio_through() {
        let assets = store(&[asset("a1", true, false)]);
        let project = Project {
            video_tracks: vec![track("v1", vec![media_clip("c1", "a1", 0.0, 2.0)])],
            ..Project::default()
        };

        let graph = compile_project(&project, &assets).unwrap();
        let out = graph.node(&graph.final_audio_label).unwrap();
        assert_eq!(out.op, Operation::AudioPassthrough);
        assert_eq!(out.inputs, vec![Pad::node("abase")]);
    }

    #[test]
    fn empty_project_is_rejected() {
        let project = Project {
            audio_tracks: vec![track("a", vec![media_clip("c1", "a1", 0.0, 2.0)])],
            ..Project::default()
        };
        let assets = store(&[asset("a1", false, true)]);
        assert_eq!(compile_project(&project, &assets), Err(CompileError::EmptyProject));
    }

    #[test]
    fn missing_asset_aborts_compile() {
        let project = Project {
            video_tracks: vec![track("v1", vec![media_clip("c1", "missing-1", 0.0, 2.0)])],
            ..Project::default()
        };
        assert_eq!(
            compile_project(&project, &HashMap::new()),
            Err(CompileError::AssetNotFound("missing-1".to_string()))
        );
    }

    #[test]
    fn missing_audio_track_asset_also_aborts_compile() {
        let assets = store(&[asset("v", true, false)]);
        let project = Project {
            video_tracks: vec![track("v1", vec![media_clip("c1", "v", 0.0, 2.0)])],
            audio_tracks: vec![track("a1", vec![media_clip("c2", "music", 0.0, 2.0)])],
            ..Project::default()
        };
        assert_eq!(
            compile_project(&project, &assets),
            Err(CompileError::AssetNotFound("music".to_string()))
        );
    }

    #[test]
    fn shared_asset_is_read_once() {
        let assets = store(&[asset("a1", true, true)]);
        let project = Project {
            video_tracks: vec![track(
                "v1",
                vec![media_clip("c1", "a1", 0.0, 2.0), media_clip("c2", "a1", 2.0, 2.0)],
            )],
            audio_tracks: vec![track("a", vec![media_clip("c3", "a1", 0.0, 4.0)])],
            ..Project::default()
        };

        let graph = compile_project(&project, &assets).unwrap();
        assert_eq!(graph.inputs.len(), 1);
        assert_eq!(graph.overlay_count(), 2);
        // base + two video clip audios + one audio clip
        assert_eq!(graph.mix_inputs().len(), 4);
    }

    #[test]
    fn higher_track_is_composited_last() {
        let assets = store(&[asset("low", true, false), asset("high", true, false)]);
        let project = Project {
            video_tracks: vec![
                track("v1", vec![media_clip("c1", "low", 0.0, 3.0)]),
                track("v2", vec![media_clip("c2", "high", 0.0, 3.0)]),
            ],
            ..Project::default()
        };

        let graph = compile_project(&project, &assets).unwrap();
        let overlays: Vec<&RenderNode> = graph
            .nodes
            .iter()
            .filter(|n| matches!(n.op, Operation::Overlay { .. }))
            .collect();
        assert_eq!(overlays.len(), 2);
        assert_eq!(overlays[0].inputs[0], Pad::node("vbase"));
        assert_eq!(overlays[1].inputs[0], Pad::node(overlays[0].label.clone()));

        let top = graph.node(&overlays[1].inputs[1].clone().label()).unwrap();
        assert_eq!(top.inputs, vec![Pad::video(graph.input_index("high").unwrap())]);
    }

    #[test]
    fn transitions_are_clamped_to_half_the_clip() {
        let assets = store(&[asset("a1", true, false)]);
        let mut clip = media_clip("c1", "a1", -3.0, 0.02);
        clip.transition_in = 9.0;
        clip.transition_out = -1.0;
        clip.in_point = -2.0;
        let project = Project {
            video_tracks: vec![track("v1", vec![clip])],
            ..Project::default()
        };

        let graph = compile_project(&project, &assets).unwrap();
        match &graph.node("vclip0").unwrap().op {
            Operation::PrepareVideo {
                in_point,
                duration,
                fade_in,
                fade_out,
                ..
            } => {
                assert_eq!(*in_point, 0.0);
                assert_eq!(*duration, MIN_CLIP_DURATION);
                assert_eq!(fade_in.unwrap().duration, MIN_CLIP_DURATION / 2.0);
                assert!(fade_out.is_none());
            }
            other => panic!("unexpected op {other:?}"),
        }
        assert_eq!(
            graph.node("vtmp0").unwrap().op,
            Operation::Overlay {
                start: 0.0,
                end: MIN_CLIP_DURATION
            }
        );
    }

    #[test]
    fn text_overlays_fold_after_video_in_start_order() {
        let assets = store(&[asset("a1", true, false)]);
        let late = Clip {
            text: Some("second".to_string()),
            start: 3.0,
            ..Clip::new("t2")
        };
        let early = Clip {
            text: Some("first".to_string()),
            start: 1.0,
            end: Some(1.01),
            y: Some(10),
            ..Clip::new("t1")
        };
        let blank = Clip {
            text: Some("  ".to_string()),
            ..Clip::new("t3")
        };
        let project = Project {
            video_tracks: vec![track("v1", vec![media_clip("c1", "a1", 0.0, 5.0)])],
            text_tracks: vec![track("t", vec![late, early, blank])],
            ..Project::default()
        };

        let graph = compile_project(&project, &assets).unwrap();
        let texts: Vec<&RenderNode> = graph
            .nodes
            .iter()
            .filter(|n| matches!(n.op, Operation::DrawText { .. }))
            .collect();
        assert_eq!(texts.len(), 2);
        assert_eq!(texts[0].inputs, vec![Pad::node("vtmp0")]);
        assert_eq!(graph.final_video_label, texts[1].label);

        match &texts[0].op {
            Operation::DrawText { text, start, end, x, y, .. } => {
                assert_eq!(text, "first");
                assert_eq!(*start, 1.0);
                assert!((end - 1.05).abs() < 1e-9);
                assert_eq!((*x, *y), (40, 10));
            }
            other => panic!("unexpected op {other:?}"),
        }
        match &texts[1].op {
            Operation::DrawText { end, y, .. } => {
                assert_eq!(*end, 5.0);
                assert_eq!(*y, 720 - 80);
            }
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[test]
    fn text_only_project_compiles() {
        let project = Project {
            text_tracks: vec![track(
                "t",
                vec![Clip {
                    text: Some("hello".to_string()),
                    ..Clip::new("t1")
                }],
            )],
            ..Project::default()
        };

        let graph = compile_project(&project, &HashMap::new()).unwrap();
        assert!(graph.inputs.is_empty());
        assert_eq!(graph.overlay_count(), 0);
        assert_eq!(graph.final_video_label, "vtxt0");
        assert_eq!(graph.output_duration, 3.0);
    }

    impl Pad {
        fn label(self) -> String {
            match self {
                Pad::Node { label } => label,
                Pad::Input { .. } => panic!("not a node pad"),
            }
        }
    }
}
