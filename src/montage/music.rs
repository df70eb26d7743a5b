use super::Mood;
use rand::Rng;
use rand::seq::SliceRandom;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Pick a random `.mp3` from `<music_root>/<mood>/`.
///
/// A missing or empty folder means no music. Never creates anything.
pub fn select_music<R: Rng + ?Sized>(
    music_root: &Path,
    mood: Mood,
    rng: &mut R,
) -> Option<PathBuf> {
    let folder = music_root.join(mood.music_dir_name());

    let entries = match std::fs::read_dir(&folder) {
        Ok(entries) => entries,
        Err(err) => {
            debug!("No music folder {:?}: {}", folder, err);
            return None;
        }
    };

    let mut tracks: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "mp3"))
        .collect();

    // directory order is platform dependent
    tracks.sort();

    let track = tracks.choose(rng).cloned();
    match &track {
        Some(path) => info!("Selected music {:?} for mood {}", path, mood),
        None => debug!("No .mp3 files in {:?}", folder),
    }
    track
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use tempfile::TempDir;

    #[test]
    fn test_picks_mp3_from_mood_folder() {
        let root = TempDir::new().unwrap();
        let happy = root.path().join("happy");
        std::fs::create_dir_all(&happy).unwrap();
        std::fs::write(happy.join("a.mp3"), b"").unwrap();
        std::fs::write(happy.join("b.mp3"), b"").unwrap();
        std::fs::write(happy.join("notes.txt"), b"").unwrap();

        for seed in 0..10 {
            let mut rng = StdRng::seed_from_u64(seed);
            let track = select_music(root.path(), Mood::Happy, &mut rng).unwrap();
            assert_eq!(track.parent(), Some(happy.as_path()));
            assert_eq!(track.extension().unwrap(), "mp3");
        }
    }

    #[test]
    fn test_missing_or_empty_folder_means_no_music() {
        let root = TempDir::new().unwrap();
        let mut rng = StdRng::seed_from_u64(0);

        assert_eq!(select_music(root.path(), Mood::Sad, &mut rng), None);
        assert!(!root.path().join("sad").exists());

        let calm = root.path().join("calm");
        std::fs::create_dir_all(calm.join("nested.mp3")).unwrap();
        std::fs::write(calm.join("track.wav"), b"").unwrap();
        assert_eq!(select_music(root.path(), Mood::Calm, &mut rng), None);
    }
}
