//! Montage configuration.

use serde::Deserialize;
use std::path::PathBuf;

/// Locations and tuning constants for a montage run.
///
/// All paths are relative to the process working directory unless set
/// otherwise.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MontageConfig {
    /// Where uploads are stored before scoring
    pub images_dir: PathBuf,
    /// Where the collage and video are written
    pub output_dir: PathBuf,
    pub collage_file_name: String,
    pub video_file_name: String,
    /// Parent of the per-mood music folders
    pub music_root: PathBuf,
    /// Maximum number of images kept after selection
    pub top_k: usize,
    /// Scores below this do not count as a match
    pub min_score: f32,
    /// Edge length of a collage tile in pixels
    pub tile_size: u32,
    pub tiles_per_row: u32,
    /// Seconds per image when the prompt names no total duration
    pub default_clip_seconds: f64,
    pub video_height: u32,
    pub fps: i32,
    pub model_id: String,
    pub model_revision: String,
}

impl Default for MontageConfig {
    fn default() -> Self {
        Self {
            images_dir: PathBuf::from("images"),
            output_dir: PathBuf::from("outputs"),
            collage_file_name: "montage_image.jpg".to_string(),
            video_file_name: "montage_video.mp4".to_string(),
            music_root: PathBuf::from("music"),
            top_k: 6,
            min_score: 0.2,
            tile_size: 300,
            tiles_per_row: 3,
            default_clip_seconds: 2.0,
            video_height: 480,
            fps: 24,
            model_id: "openai/clip-vit-base-patch32".to_string(),
            // main has no safetensors weights
            model_revision: "refs/pr/15".to_string(),
        }
    }
}

impl MontageConfig {
    /// Create config from `MONTAGE_*` environment variables. Missing or
    /// unparseable values keep their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            images_dir: env_var("MONTAGE_IMAGES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.images_dir),
            output_dir: env_var("MONTAGE_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            collage_file_name: defaults.collage_file_name,
            video_file_name: defaults.video_file_name,
            music_root: env_var("MONTAGE_MUSIC_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.music_root),
            top_k: env_parse("MONTAGE_TOP_K")
                .filter(|k| *k > 0)
                .unwrap_or(defaults.top_k),
            min_score: env_parse("MONTAGE_MIN_SCORE").unwrap_or(defaults.min_score),
            tile_size: defaults.tile_size,
            tiles_per_row: defaults.tiles_per_row,
            default_clip_seconds: defaults.default_clip_seconds,
            video_height: defaults.video_height,
            fps: env_parse("MONTAGE_FPS")
                .filter(|fps| *fps > 0)
                .unwrap_or(defaults.fps),
            model_id: env_var("MONTAGE_MODEL_ID").unwrap_or(defaults.model_id),
            model_revision: env_var("MONTAGE_MODEL_REVISION").unwrap_or(defaults.model_revision),
        }
    }

    pub fn collage_path(&self) -> PathBuf {
        self.output_dir.join(&self.collage_file_name)
    }

    pub fn video_path(&self) -> PathBuf {
        self.output_dir.join(&self.video_file_name)
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_var(key).and_then(|value| value.trim().parse().ok())
}
