use super::config::MontageConfig;
use super::error::{MontageError, Result, skip_failed_images};
use super::{ImageAsset, Mood, ScoredImage, prompt};
use anyhow::Context;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::clip::{ClipConfig, ClipModel};
use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use std::path::Path;
use tokenizers::Tokenizer;
use tracing::info;

/// CLIP text context length
const MAX_TEXT_TOKENS: usize = 77;

/// Per-channel statistics the CLIP image tower was trained with
const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
const CLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

/// Joint image-text model that rates how well an image fits a description
pub trait RelevanceModel {
    fn affinity(&self, image: &RgbImage, description: &str) -> anyhow::Result<f32>;
}

/// Frozen CLIP ViT-B/32. Load once per process and share by reference;
/// inference never mutates it.
pub struct ClipEngine {
    model: ClipModel,
    tokenizer: Tokenizer,
    device: Device,
    image_size: usize,
}

impl ClipEngine {
    /// Fetch weights and tokenizer from the Hugging Face hub (cached after
    /// the first download) and build the model
    pub fn load(config: &MontageConfig) -> anyhow::Result<Self> {
        info!(model = %config.model_id, revision = %config.model_revision, "loading CLIP model");

        let api = Api::new().context("Failed to create Hugging Face API client")?;
        let repo = api.repo(Repo::with_revision(
            config.model_id.clone(),
            RepoType::Model,
            config.model_revision.clone(),
        ));

        let weights = repo
            .get("model.safetensors")
            .context("Failed to download model weights")?;
        let tokenizer = repo
            .get("tokenizer.json")
            .context("Failed to download tokenizer")?;

        Self::from_files(&weights, &tokenizer)
    }

    pub fn from_files(weights: &Path, tokenizer: &Path) -> anyhow::Result<Self> {
        let device = Device::Cpu;
        let config = ClipConfig::vit_base_patch32();

        // SAFETY: the weights file is not modified while mapped
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, &device) }
            .context("Failed to map model weights")?;
        let model = ClipModel::new(vb, &config).context("Failed to build CLIP model")?;

        let tokenizer = Tokenizer::from_file(tokenizer)
            .map_err(anyhow::Error::msg)
            .context("Failed to read tokenizer")?;

        info!("CLIP model ready");

        Ok(Self {
            model,
            tokenizer,
            device,
            image_size: config.image_size,
        })
    }

    fn input_ids(&self, description: &str) -> anyhow::Result<Tensor> {
        let encoding = self
            .tokenizer
            .encode(description, true)
            .map_err(anyhow::Error::msg)
            .context("Failed to tokenize description")?;

        let mut ids = encoding.get_ids().to_vec();
        if ids.len() > MAX_TEXT_TOKENS {
            // keep the end-of-text token, text pooling reads from it
            let eot = ids[ids.len() - 1];
            ids.truncate(MAX_TEXT_TOKENS - 1);
            ids.push(eot);
        }

        Ok(Tensor::new(vec![ids], &self.device)?)
    }
}

impl RelevanceModel for ClipEngine {
    fn affinity(&self, image: &RgbImage, description: &str) -> anyhow::Result<f32> {
        let pixels = pixel_values(image, self.image_size, &self.device)?;
        let input_ids = self.input_ids(description)?;

        let (_logits_per_text, logits_per_image) = self
            .model
            .forward(&pixels, &input_ids)
            .context("CLIP forward pass failed")?;

        let logits = logits_per_image.flatten_all()?.to_vec1::<f32>()?;
        logits.first().copied().context("Model returned no logits")
    }
}

/// Bicubic resize of the short edge to `size`, center crop, then CLIP
/// normalization. Shaped (1, 3, size, size).
fn pixel_values(image: &RgbImage, size: usize, device: &Device) -> anyhow::Result<Tensor> {
    let side = size as u32;
    let cropped = DynamicImage::ImageRgb8(image.clone())
        .resize_to_fill(side, side, FilterType::CatmullRom)
        .to_rgb8();

    let mean = Tensor::new(&CLIP_MEAN, device)?.reshape((3, 1, 1))?;
    let std = Tensor::new(&CLIP_STD, device)?.reshape((3, 1, 1))?;

    let tensor = Tensor::from_vec(cropped.into_raw(), (size, size, 3), device)?
        .permute((2, 0, 1))?
        .to_dtype(DType::F32)?
        .affine(1. / 255., 0.)?
        .broadcast_sub(&mean)?
        .broadcast_div(&std)?
        .unsqueeze(0)?;

    Ok(tensor)
}

/// Score every image against the mood/prompt description.
///
/// Images that fail to decode or to score are logged and left out, so a
/// batch of bad images yields an empty list rather than an error.
pub fn score<M: RelevanceModel + ?Sized>(
    model: &M,
    images: &[ImageAsset],
    prompt: &str,
    mood: Mood,
) -> Result<Vec<ScoredImage>> {
    let description = prompt::describe(mood, prompt);
    info!(%description, "scoring {} images", images.len());

    let results = images.iter().map(|image| {
        score_image(model, image, &description).inspect(|scored| {
            info!("Scoring {} -> {:.4}", image.name(), scored.score);
        })
    });

    skip_failed_images(results, "image during scoring")
}

fn score_image<M: RelevanceModel + ?Sized>(
    model: &M,
    image: &ImageAsset,
    description: &str,
) -> Result<ScoredImage> {
    let rgb = image.load_rgb()?;

    let score = model
        .affinity(&rgb, description)
        .and_then(|score| {
            if score.is_finite() {
                Ok(score)
            } else {
                anyhow::bail!("non-finite score {score}")
            }
        })
        .map_err(|reason| MontageError::Scoring {
            path: image.path.clone(),
            reason,
        })?;

    Ok(ScoredImage {
        score,
        image: image.clone(),
    })
}
