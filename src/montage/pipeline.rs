use super::collage::{CollageBuilder, write_collage};
use super::config::MontageConfig;
use super::error::{MontageError, Result};
use super::scoring::{self, RelevanceModel};
use super::selection::SelectionPolicy;
use super::video::{self, TimelineSettings};
use super::{ImageAsset, MontageArtifacts, MontageRequest, music};
use rand::Rng;
use std::io;
use std::path::Path;
use tracing::info;

/// Store an uploaded file under the images directory.
///
/// Only the final component of `file_name` is used, so uploads cannot
/// escape the directory. An existing file of the same name is replaced.
pub fn persist_upload(
    config: &MontageConfig,
    file_name: &str,
    contents: &[u8],
) -> Result<ImageAsset> {
    let name = Path::new(file_name)
        .file_name()
        .ok_or_else(|| {
            MontageError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid upload file name {:?}", file_name),
            ))
        })?;

    std::fs::create_dir_all(&config.images_dir)?;
    let path = config.images_dir.join(name);
    std::fs::write(&path, contents)?;

    info!("Stored upload {:?} ({} bytes)", path, contents.len());

    Ok(ImageAsset::new(path))
}

/// Run one montage request end to end: score, select, collage, video.
///
/// `model` is the long-lived relevance engine; `rng` drives the random
/// fallback, the collage shuffle and the music pick. Output files live at
/// fixed paths, so callers must not run two requests at once.
pub fn create_montage<M, R>(
    model: &M,
    config: &MontageConfig,
    request: &MontageRequest,
    rng: &mut R,
) -> Result<MontageArtifacts>
where
    M: RelevanceModel + ?Sized,
    R: Rng + ?Sized,
{
    if request.images.is_empty() {
        return Err(MontageError::EmptyInput);
    }
    if request.prompt.trim().is_empty() {
        return Err(MontageError::EmptyPrompt);
    }

    info!(
        "Creating montage from {} images (mood {}, target {:?}s)",
        request.images.len(),
        request.mood,
        request.target_duration
    );

    std::fs::create_dir_all(&config.output_dir)?;

    let scored = scoring::score(model, &request.images, &request.prompt, request.mood)?;
    let mut selected = SelectionPolicy::from(config).select(scored, &request.images, rng)?;

    let collage = CollageBuilder::from(config).build(&mut selected, rng)?;
    let collage_path = config.collage_path();
    write_collage(&collage, &collage_path)?;

    let music = music::select_music(&config.music_root, request.mood, rng);
    let rendered = video::build_video(
        &selected,
        request.target_duration.map(f64::from),
        music.as_deref(),
        &config.video_path(),
        &TimelineSettings::from(config),
    )?;

    info!(
        "Montage created: {:?} and {:?} ({:.2}s)",
        collage_path, rendered.path, rendered.duration_seconds
    );

    Ok(MontageArtifacts {
        collage_path,
        video_path: rendered.path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::montage::scoring::tests::{RedChannelModel, write_solid};
    use crate::montage::Mood;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> MontageConfig {
        MontageConfig {
            images_dir: dir.path().join("images"),
            output_dir: dir.path().join("outputs"),
            music_root: dir.path().join("music"),
            video_height: 64,
            ..MontageConfig::default()
        }
    }

    #[test]
    fn test_persist_upload_keeps_only_file_name() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        let asset = persist_upload(&config, "../../evil.png", b"bytes").unwrap();

        assert_eq!(asset.path, config.images_dir.join("evil.png"));
        assert_eq!(std::fs::read(&asset.path).unwrap(), b"bytes");

        let err = persist_upload(&config, "..", b"x").unwrap_err();
        assert!(matches!(err, MontageError::Io(_)));
    }

    #[test]
    fn test_rejects_empty_requests() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let model = RedChannelModel::new();
        let mut rng = StdRng::seed_from_u64(0);

        let empty = MontageRequest::new("sunset", Mood::Calm, Vec::new());
        assert!(matches!(
            create_montage(&model, &config, &empty, &mut rng),
            Err(MontageError::EmptyInput)
        ));

        let image = write_solid(&dir, "a.png", 8, 8, [255, 0, 0]);
        let blank = MontageRequest::new("   ", Mood::Calm, vec![image]);
        assert!(matches!(
            create_montage(&model, &config, &blank, &mut rng),
            Err(MontageError::EmptyPrompt)
        ));
    }

    #[test]
    fn test_four_images_ten_seconds_without_music() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let images: Vec<ImageAsset> = (0..4)
            .map(|i| write_solid(&dir, &format!("{i}.png"), 96, 64, [120 + i * 40, 0, 0]))
            .collect();
        let request = MontageRequest::new("energetic sunset 10 seconds", Mood::Energetic, images);
        let model = RedChannelModel::new();
        let mut rng = StdRng::seed_from_u64(21);

        let artifacts = create_montage(&model, &config, &request, &mut rng).unwrap();

        assert_eq!(artifacts.collage_path, config.collage_path());
        assert_eq!(artifacts.video_path, config.video_path());

        let collage = image::open(&artifacts.collage_path).unwrap();
        assert_eq!((collage.width(), collage.height()), (900, 600));

        let duration = video::probe_duration(&artifacts.video_path).unwrap();
        assert!((duration - 10.0).abs() < 0.25, "duration was {duration}");
    }

    #[test]
    fn test_low_scores_fall_back_to_random_images() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        // red channel 10 scores ~0.04, below the threshold
        let images: Vec<ImageAsset> = (0..8)
            .map(|i| write_solid(&dir, &format!("{i}.png"), 64, 64, [10, i * 20, 0]))
            .collect();
        let request = MontageRequest::new("quiet lake", Mood::Calm, images);
        let model = RedChannelModel::new();
        let mut rng = StdRng::seed_from_u64(4);

        let artifacts = create_montage(&model, &config, &request, &mut rng).unwrap();

        // six tiles from the fallback sample, default 2s per image
        let collage = image::open(&artifacts.collage_path).unwrap();
        assert_eq!((collage.width(), collage.height()), (900, 600));
        let duration = video::probe_duration(&artifacts.video_path).unwrap();
        assert!((duration - 12.0).abs() < 0.25, "duration was {duration}");
    }
}
