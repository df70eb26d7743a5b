use super::config::MontageConfig;
use super::error::{MontageError, Result};
use super::{ImageAsset, ScoredImage};
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{info, warn};

pub const MIN_SCORE_THRESHOLD: f32 = 0.2;
pub const DEFAULT_TOP_K: usize = 6;

/// Confidence threshold plus the random fallback used when nothing
/// clears it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionPolicy {
    pub top_k: usize,
    pub min_score: f32,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            min_score: MIN_SCORE_THRESHOLD,
        }
    }
}

impl From<&MontageConfig> for SelectionPolicy {
    fn from(config: &MontageConfig) -> Self {
        Self {
            top_k: config.top_k,
            min_score: config.min_score,
        }
    }
}

impl SelectionPolicy {
    /// Pick at most `top_k` images.
    ///
    /// Scores at or above the threshold are returned best first. If none
    /// qualify, a uniform sample is drawn from `all_images`, so images that
    /// failed scoring can still be picked. Equal scores come out in no
    /// particular order.
    pub fn select<R: Rng + ?Sized>(
        &self,
        scored: Vec<ScoredImage>,
        all_images: &[ImageAsset],
        rng: &mut R,
    ) -> Result<Vec<ImageAsset>> {
        if all_images.is_empty() {
            return Err(MontageError::EmptyInput);
        }

        let top_k = self.top_k.max(1);

        let mut matches: Vec<ScoredImage> = scored
            .into_iter()
            .filter(|candidate| candidate.score >= self.min_score)
            .collect();

        if matches.is_empty() {
            warn!("No high-confidence matches found. Falling back to random images.");
            let count = top_k.min(all_images.len());
            return Ok(all_images.choose_multiple(rng, count).cloned().collect());
        }

        matches.sort_unstable_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(top_k);

        info!(
            "Selected {} images above {:.2} (best {:.4})",
            matches.len(),
            self.min_score,
            matches[0].score
        );

        Ok(matches.into_iter().map(|m| m.image).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    fn assets(count: usize) -> Vec<ImageAsset> {
        (0..count)
            .map(|i| ImageAsset::new(format!("images/{i}.jpg")))
            .collect()
    }

    fn scored(images: &[ImageAsset], scores: &[f32]) -> Vec<ScoredImage> {
        images
            .iter()
            .zip(scores)
            .map(|(image, score)| ScoredImage {
                score: *score,
                image: image.clone(),
            })
            .collect()
    }

    #[test]
    fn test_empty_input_is_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        let err = SelectionPolicy::default()
            .select(Vec::new(), &[], &mut rng)
            .unwrap_err();
        assert!(matches!(err, MontageError::EmptyInput));
    }

    #[test]
    fn test_matches_sorted_descending_and_truncated() {
        let images = assets(8);
        let scores = [0.5, 0.1, 30.0, 0.2, 25.5, 0.19, 28.0, 21.0];
        let mut rng = StdRng::seed_from_u64(7);

        let policy = SelectionPolicy {
            top_k: 4,
            ..SelectionPolicy::default()
        };
        let picked = policy
            .select(scored(&images, &scores), &images, &mut rng)
            .unwrap();

        let expected: Vec<ImageAsset> = [2, 6, 4, 7].iter().map(|i| images[*i].clone()).collect();
        assert_eq!(picked, expected);
    }

    #[test]
    fn test_threshold_is_inclusive_and_top_k_may_exceed_matches() {
        let images = assets(3);
        let mut rng = StdRng::seed_from_u64(3);

        let picked = SelectionPolicy::default()
            .select(scored(&images, &[0.2, 0.05, 0.9]), &images, &mut rng)
            .unwrap();

        assert_eq!(picked, vec![images[2].clone(), images[0].clone()]);
    }

    #[test]
    fn test_fallback_samples_from_all_images() {
        let images = assets(10);
        // only a few images were scored, all below threshold
        let low = scored(&images[..3], &[0.1, 0.0, -4.0]);
        let universe: HashSet<&ImageAsset> = images.iter().collect();

        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let picked = SelectionPolicy::default()
                .select(low.clone(), &images, &mut rng)
                .unwrap();

            assert_eq!(picked.len(), DEFAULT_TOP_K);
            assert!(picked.iter().all(|p| universe.contains(p)));
            let distinct: HashSet<&ImageAsset> = picked.iter().collect();
            assert_eq!(distinct.len(), picked.len());
        }
    }

    #[test]
    fn test_fallback_bounded_by_available_images() {
        let images = assets(2);
        let mut rng = StdRng::seed_from_u64(11);

        let picked = SelectionPolicy::default()
            .select(Vec::new(), &images, &mut rng)
            .unwrap();

        assert_eq!(picked.len(), 2);
    }

    #[test]
    fn test_selection_size_always_within_bounds() {
        let mut rng = StdRng::seed_from_u64(42);
        for count in 1..12 {
            let images = assets(count);
            for top_k in 0..8 {
                let scores: Vec<f32> = (0..count).map(|i| (i as f32) * 0.07).collect();
                let policy = SelectionPolicy {
                    top_k,
                    ..SelectionPolicy::default()
                };
                let picked = policy
                    .select(scored(&images, &scores), &images, &mut rng)
                    .unwrap();
                assert!(!picked.is_empty());
                assert!(picked.len() <= top_k.max(1));
            }
        }
    }

    #[test]
    fn test_duplicate_paths_are_independent_entries() {
        let image = ImageAsset::new("images/same.jpg");
        let images = vec![image.clone(), image.clone()];
        let mut rng = StdRng::seed_from_u64(5);

        let picked = SelectionPolicy::default()
            .select(scored(&images, &[0.4, 0.3]), &images, &mut rng)
            .unwrap();

        assert_eq!(picked, vec![image.clone(), image]);
    }
}
