use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::CompileError;

/// Shortest clip the compiler will emit, in seconds.
pub const MIN_CLIP_DURATION: f64 = 0.1;
/// Shortest on-screen time for a text overlay, in seconds.
pub const MIN_TEXT_DURATION: f64 = 0.05;
/// On-screen time for a text overlay that has no explicit end.
pub const DEFAULT_TEXT_DURATION: f64 = 2.0;
pub const DEFAULT_TEXT_X: i32 = 40;
/// Default text baseline distance from the bottom edge of the canvas.
pub const DEFAULT_TEXT_BOTTOM_MARGIN: i32 = 80;

const MAX_ID_LEN: usize = 120;
const MAX_COLOR_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Video,
    Audio,
    File,
}

/// Probed media properties of an ingested file. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub kind: AssetKind,
    pub has_video: bool,
    pub has_audio: bool,
    pub duration: f64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub path: String,
}

/// Looks up assets referenced by clips.
pub trait AssetResolver {
    fn resolve(&self, asset_id: &str) -> Option<&Asset>;
}

impl AssetResolver for HashMap<String, Asset> {
    fn resolve(&self, asset_id: &str) -> Option<&Asset> {
        self.get(asset_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clip {
    pub id: String,
    #[serde(default)]
    pub asset_id: Option<String>,
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub in_point: f64,
    #[serde(default = "default_clip_duration")]
    pub duration: f64,
    #[serde(default)]
    pub transition_in: f64,
    #[serde(default)]
    pub transition_out: f64,
    #[serde(default = "default_volume")]
    pub volume: f64,
    #[serde(default)]
    pub text: Option<String>,
    /// End time for text overlays.
    #[serde(default)]
    pub end: Option<f64>,
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    #[serde(default = "default_text_color")]
    pub color: String,
    #[serde(default = "default_text_x")]
    pub x: i32,
    #[serde(default)]
    pub y: Option<i32>,
}

fn default_clip_duration() -> f64 {
    3.0
}

fn default_volume() -> f64 {
    1.0
}

fn default_font_size() -> u32 {
    42
}

fn default_text_color() -> String {
    "white".to_string()
}

fn default_text_x() -> i32 {
    DEFAULT_TEXT_X
}

impl Clip {
    pub fn new(id: impl Into<String>) -> Self {
        Clip {
            id: id.into(),
            asset_id: None,
            start: 0.0,
            in_point: 0.0,
            duration: default_clip_duration(),
            transition_in: 0.0,
            transition_out: 0.0,
            volume: default_volume(),
            text: None,
            end: None,
            font_size: default_font_size(),
            color: default_text_color(),
            x: default_text_x(),
            y: None,
        }
    }

    pub fn end_time(&self) -> f64 {
        self.start + self.duration
    }

    /// Non-blank overlay text, trimmed.
    pub fn overlay_text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    #[serde(default)]
    pub clips: Vec<Clip>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_bg_color")]
    pub bg_color: String,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub video_tracks: Vec<Track>,
    #[serde(default)]
    pub audio_tracks: Vec<Track>,
    #[serde(default)]
    pub text_tracks: Vec<Track>,
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

fn default_fps() -> u32 {
    24
}

fn default_bg_color() -> String {
    "black".to_string()
}

impl Default for Project {
    fn default() -> Self {
        Project {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            bg_color: default_bg_color(),
            duration: None,
            video_tracks: Vec::new(),
            audio_tracks: Vec::new(),
            text_tracks: Vec::new(),
        }
    }
}

/// A clip together with its position in the project.
#[derive(Debug, Clone, Copy)]
pub struct PlacedClip<'a> {
    pub clip: &'a Clip,
    pub track_index: usize,
    pub clip_index: usize,
}

impl Project {
    pub fn tracks(&self, kind: TrackKind) -> &[Track] {
        match kind {
            TrackKind::Video => &self.video_tracks,
            TrackKind::Audio => &self.audio_tracks,
            TrackKind::Text => &self.text_tracks,
        }
    }

    /// All clips of one modality in track order, then clip order.
    pub fn placed_clips(&self, kind: TrackKind) -> Vec<PlacedClip<'_>> {
        self.tracks(kind)
            .iter()
            .enumerate()
            .flat_map(|(track_index, track)| {
                track
                    .clips
                    .iter()
                    .enumerate()
                    .map(move |(clip_index, clip)| PlacedClip {
                        clip,
                        track_index,
                        clip_index,
                    })
            })
            .collect()
    }

    fn all_clips(&self) -> impl Iterator<Item = &Clip> {
        self.video_tracks
            .iter()
            .chain(&self.audio_tracks)
            .chain(&self.text_tracks)
            .flat_map(|track| track.clips.iter())
    }

    /// `max(declared duration, latest clip end, 1.0)`.
    pub fn resolved_duration(&self) -> f64 {
        let latest_end = self
            .all_clips()
            .map(Clip::end_time)
            .fold(1.0_f64, f64::max);
        self.duration.unwrap_or(0.0).max(latest_end).max(1.0)
    }

    /// True when at least one video clip references an asset or one text clip
    /// carries visible text.
    pub fn has_visual_content(&self) -> bool {
        let has_video = self
            .video_tracks
            .iter()
            .flat_map(|track| &track.clips)
            .any(|clip| clip.asset_id.as_deref().is_some_and(|id| !id.is_empty()));
        let has_text = self
            .text_tracks
            .iter()
            .flat_map(|track| &track.clips)
            .any(|clip| clip.overlay_text().is_some());
        has_video || has_text
    }

    /// Asset ids referenced by video and audio clips, deduplicated, stable by
    /// first occurrence.
    pub fn referenced_assets(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for track in self.video_tracks.iter().chain(&self.audio_tracks) {
            for clip in &track.clips {
                if let Some(asset_id) = clip.asset_id.as_deref().filter(|id| !id.is_empty()) {
                    if !seen.contains(&asset_id) {
                        seen.push(asset_id);
                    }
                }
            }
        }
        seen
    }

    pub fn validate(&self) -> Result<(), CompileError> {
        if !(16..=7680).contains(&self.width) || !(16..=7680).contains(&self.height) {
            return Err(CompileError::Validation(format!(
                "canvas {}x{} is outside 16..=7680",
                self.width, self.height
            )));
        }
        if !(1..=120).contains(&self.fps) {
            return Err(CompileError::Validation(format!(
                "fps {} is outside 1..=120",
                self.fps
            )));
        }
        validate_color("bg_color", &self.bg_color)?;
        if let Some(duration) = self.duration {
            if !duration.is_finite() {
                return Err(CompileError::Validation("duration is not finite".to_string()));
            }
        }

        for track in self
            .video_tracks
            .iter()
            .chain(&self.audio_tracks)
            .chain(&self.text_tracks)
        {
            validate_id("track", &track.id)?;
            for clip in &track.clips {
                validate_clip(clip)?;
            }
        }
        Ok(())
    }
}

fn validate_id(what: &str, id: &str) -> Result<(), CompileError> {
    if id.trim().is_empty() || id.len() > MAX_ID_LEN {
        return Err(CompileError::Validation(format!(
            "{what} id must be 1..={MAX_ID_LEN} characters, got {:?}",
            id
        )));
    }
    Ok(())
}

fn validate_clip(clip: &Clip) -> Result<(), CompileError> {
    validate_id("clip", &clip.id)?;

    let numbers = [
        ("start", clip.start),
        ("in_point", clip.in_point),
        ("duration", clip.duration),
        ("transition_in", clip.transition_in),
        ("transition_out", clip.transition_out),
        ("volume", clip.volume),
    ];
    for (field, value) in numbers {
        if !value.is_finite() {
            return Err(CompileError::Validation(format!(
                "clip {}: {field} is not finite",
                clip.id
            )));
        }
    }
    if clip.end.is_some_and(|end| !end.is_finite()) {
        return Err(CompileError::Validation(format!(
            "clip {}: end is not finite",
            clip.id
        )));
    }
    if clip.volume < 0.0 {
        return Err(CompileError::Validation(format!(
            "clip {}: volume must not be negative",
            clip.id
        )));
    }
    if !(1..=512).contains(&clip.font_size) {
        return Err(CompileError::Validation(format!(
            "clip {}: font_size {} is outside 1..=512",
            clip.id, clip.font_size
        )));
    }
    validate_color(&format!("clip {} color", clip.id), &clip.color)?;
    Ok(())
}

/// Color names, `#RRGGBB`/`0xRRGGBB` and an optional `@alpha` suffix. Anything
/// else could carry filter-graph syntax into the render command.
fn validate_color(what: &str, color: &str) -> Result<(), CompileError> {
    let valid = !color.is_empty()
        && color.len() <= MAX_COLOR_LEN
        && color
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '#' | '@' | '.' | '_'));
    if !valid {
        return Err(CompileError::Validation(format!(
            "{what} {color:?} is not a color name or hex value"
        )));
    }
    Ok(())
}
