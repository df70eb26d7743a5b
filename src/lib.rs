#![deny(clippy::all)]

pub mod montage;

#[cfg(feature = "node")]
mod node;

pub use montage::config::MontageConfig;
pub use montage::error::{MontageError, Result};
pub use montage::pipeline::{create_montage, persist_upload};
pub use montage::scoring::{ClipEngine, RelevanceModel};
pub use montage::{ImageAsset, MontageArtifacts, MontageRequest, Mood, ScoredImage};

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber. Honors `RUST_LOG`, defaulting to `info`;
/// later calls are no-ops.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
