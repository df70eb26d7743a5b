use crate::montage::{music, prompt, video};
use crate::{ClipEngine, ImageAsset, MontageConfig, MontageError, MontageRequest, Mood};
use napi::bindgen_prelude::*;
use napi_derive::napi;

fn to_napi(err: MontageError) -> napi::Error {
    napi::Error::from_reason(err.to_string())
}

#[napi(object)]
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct JsMontageArtifacts {
    pub collage_path: String,
    pub video_path: String,
    pub target_duration_seconds: Option<u32>,
}

/// Holds the relevance model for the life of the Node process. Requests
/// write to fixed paths; callers run them one at a time.
#[napi]
pub struct MontageStudio {
    engine: ClipEngine,
    config: MontageConfig,
}

#[napi]
impl MontageStudio {
    #[napi(constructor)]
    pub fn new() -> Result<Self> {
        crate::init_logging();
        video::init_ffmpeg().map_err(|err| to_napi(MontageError::Encode(err)))?;

        let config = MontageConfig::from_env();
        let engine = ClipEngine::load(&config).map_err(|err| to_napi(MontageError::Model(err)))?;

        Ok(Self { engine, config })
    }

    #[napi]
    pub fn save_upload(&self, file_name: String, contents: Buffer) -> Result<String> {
        let asset = crate::persist_upload(&self.config, &file_name, &contents).map_err(to_napi)?;
        Ok(asset.path.to_string_lossy().into_owned())
    }

    #[napi]
    pub fn create_montage(
        &self,
        image_paths: Vec<String>,
        prompt: String,
        mood: String,
    ) -> Result<JsMontageArtifacts> {
        let mood: Mood = mood.parse().map_err(to_napi)?;
        let images = image_paths.into_iter().map(ImageAsset::new).collect();
        let request = MontageRequest::new(prompt, mood, images);

        let mut rng = rand::thread_rng();
        let artifacts = crate::create_montage(&self.engine, &self.config, &request, &mut rng)
            .map_err(to_napi)?;

        Ok(JsMontageArtifacts {
            collage_path: artifacts.collage_path.to_string_lossy().into_owned(),
            video_path: artifacts.video_path.to_string_lossy().into_owned(),
            target_duration_seconds: request.target_duration,
        })
    }
}

#[napi]
pub fn extract_duration(prompt: String) -> Option<u32> {
    prompt::extract_duration(&prompt)
}

#[napi]
pub fn select_music(mood: String) -> Result<Option<String>> {
    let mood: Mood = mood.parse().map_err(to_napi)?;
    let config = MontageConfig::from_env();

    Ok(music::select_music(&config.music_root, mood, &mut rand::thread_rng())
        .map(|path| path.to_string_lossy().into_owned()))
}
