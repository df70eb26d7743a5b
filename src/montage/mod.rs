pub mod collage;
pub mod config;
pub mod error;
pub mod music;
pub mod pipeline;
pub mod prompt;
pub mod scoring;
pub mod selection;
pub mod video;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use error::{MontageError, Result};

/// An uploaded image, identified by its location on disk.
///
/// Pixels are only read when a stage needs them, and every stage decodes
/// its own copy, so an asset is never mutated after upload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageAsset {
    pub path: PathBuf,
}

impl ImageAsset {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name for log lines
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Decode into 8-bit RGB regardless of the source color model
    pub fn load_rgb(&self) -> Result<image::RgbImage> {
        image::open(&self.path)
            .map(|img| img.to_rgb8())
            .map_err(|source| MontageError::Decode {
                path: self.path.clone(),
                source,
            })
    }
}

/// The fixed set of moods offered to the user. Steers both the scoring
/// description and the music folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mood {
    Happy,
    Sad,
    Calm,
    Energetic,
    Romantic,
}

impl Mood {
    pub const ALL: [Mood; 5] = [
        Mood::Happy,
        Mood::Sad,
        Mood::Calm,
        Mood::Energetic,
        Mood::Romantic,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Mood::Happy => "Happy",
            Mood::Sad => "Sad",
            Mood::Calm => "Calm",
            Mood::Energetic => "Energetic",
            Mood::Romantic => "Romantic",
        }
    }

    /// Name of the folder under the music root holding tracks for this mood
    pub fn music_dir_name(&self) -> String {
        self.label().to_lowercase()
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Mood {
    type Err = MontageError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Mood::ALL
            .into_iter()
            .find(|mood| mood.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| MontageError::InvalidMood(s.to_string()))
    }
}

/// Relevance of one image to the request description. Higher is better;
/// the range depends on the model and is not bounded to [0, 1].
#[derive(Debug, Clone)]
pub struct ScoredImage {
    pub score: f32,
    pub image: ImageAsset,
}

/// Everything the user supplied for one montage
#[derive(Debug, Clone)]
pub struct MontageRequest {
    pub prompt: String,
    pub mood: Mood,
    /// Total video length in seconds, taken from the prompt text
    pub target_duration: Option<u32>,
    pub images: Vec<ImageAsset>,
}

impl MontageRequest {
    pub fn new(prompt: impl Into<String>, mood: Mood, images: Vec<ImageAsset>) -> Self {
        let prompt = prompt.into();
        let target_duration = prompt::extract_duration(&prompt);

        Self {
            prompt,
            mood,
            target_duration,
            images,
        }
    }
}

/// Output files of a finished montage. Paths are fixed, so each request
/// overwrites the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MontageArtifacts {
    pub collage_path: PathBuf,
    pub video_path: PathBuf,
}
