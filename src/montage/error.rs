use std::path::PathBuf;
use thiserror::Error;
use tracing::warn;

pub type Result<T> = std::result::Result<T, MontageError>;

/// Failures of a montage request.
///
/// `Decode` and `Scoring` are raised per image; the stages that see them log
/// and drop the image instead of returning them. Everything else aborts the
/// request and carries the message shown to the user.
#[derive(Debug, Error)]
pub enum MontageError {
    #[error("Please upload at least 1 image.")]
    EmptyInput,

    #[error("Please enter a prompt.")]
    EmptyPrompt,

    #[error("No valid images to create a montage.")]
    NoValidImages,

    #[error("Unknown mood \"{0}\", expected one of Happy, Sad, Calm, Energetic, Romantic")]
    InvalidMood(String),

    #[error("Failed to decode image {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("Failed to score image {}: {reason:#}", .path.display())]
    Scoring { path: PathBuf, reason: anyhow::Error },

    #[error("Failed to write collage {}: {source}", .path.display())]
    CollageWrite {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("Failed to encode montage video: {0:#}")]
    Encode(anyhow::Error),

    #[error("Failed to load relevance model: {0:#}")]
    Model(anyhow::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MontageError {
    /// Per-image failures that a stage absorbs rather than propagates
    pub fn is_per_image(&self) -> bool {
        matches!(self, MontageError::Decode { .. } | MontageError::Scoring { .. })
    }
}

/// Collect the successes of a per-image stage. Per-image failures are logged
/// and dropped; any other error stops the stage.
pub(crate) fn skip_failed_images<T, I>(results: I, stage: &str) -> Result<Vec<T>>
where
    I: IntoIterator<Item = Result<T>>,
{
    let mut kept = Vec::new();
    for result in results {
        match result {
            Ok(value) => kept.push(value),
            Err(err) if err.is_per_image() => warn!("Skipping {}: {}", stage, err),
            Err(err) => return Err(err),
        }
    }
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_image_classification() {
        let scoring = MontageError::Scoring {
            path: PathBuf::from("images/a.jpg"),
            reason: anyhow::anyhow!("bad tensor"),
        };
        assert!(scoring.is_per_image());
        assert!(!MontageError::NoValidImages.is_per_image());
        assert!(!MontageError::Encode(anyhow::anyhow!("boom")).is_per_image());
    }

    #[test]
    fn test_skip_failed_images_drops_only_per_image_failures() {
        let results = vec![
            Ok(1),
            Err(MontageError::Decode {
                path: PathBuf::from("images/broken.jpg"),
                source: image::ImageError::IoError(std::io::ErrorKind::NotFound.into()),
            }),
            Ok(3),
        ];
        assert_eq!(skip_failed_images(results, "test").unwrap(), vec![1, 3]);

        let results = vec![Ok(1), Err(MontageError::NoValidImages), Ok(3)];
        let err = skip_failed_images(results, "test").unwrap_err();
        assert!(matches!(err, MontageError::NoValidImages));
    }

    #[test]
    fn test_messages_carry_context() {
        let err = MontageError::Encode(anyhow::anyhow!("muxer refused").context("write trailer"));
        assert_eq!(
            err.to_string(),
            "Failed to encode montage video: write trailer: muxer refused"
        );
        assert_eq!(
            MontageError::EmptyInput.to_string(),
            "Please upload at least 1 image."
        );
    }
}
