use super::ImageAsset;
use super::config::MontageConfig;
use super::error::{MontageError, Result, skip_failed_images};
use image::RgbImage;
use image::imageops::{self, FilterType};
use rand::Rng;
use rand::seq::SliceRandom;
use std::path::Path;
use tracing::info;

/// Square-tile grid. Rows fill left to right; the last row may be short,
/// leaving its right side black.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollageBuilder {
    pub tile_size: u32,
    pub tiles_per_row: u32,
}

impl Default for CollageBuilder {
    fn default() -> Self {
        Self {
            tile_size: 300,
            tiles_per_row: 3,
        }
    }
}

impl From<&MontageConfig> for CollageBuilder {
    fn from(config: &MontageConfig) -> Self {
        Self {
            tile_size: config.tile_size,
            tiles_per_row: config.tiles_per_row.max(1),
        }
    }
}

impl CollageBuilder {
    /// Shuffle `images` in place, then tile them in the new order.
    ///
    /// The shuffled order is left in `images` so the video can follow it.
    pub fn build<R: Rng + ?Sized>(
        &self,
        images: &mut [ImageAsset],
        rng: &mut R,
    ) -> Result<RgbImage> {
        images.shuffle(rng);
        self.compose(images)
    }

    /// Tile images in the given order, skipping any that fail to decode
    pub fn compose(&self, images: &[ImageAsset]) -> Result<RgbImage> {
        let tiles = skip_failed_images(
            images.iter().map(|image| {
                image.load_rgb().map(|rgb| {
                    imageops::resize(&rgb, self.tile_size, self.tile_size, FilterType::Triangle)
                })
            }),
            "collage tile",
        )?;

        if tiles.is_empty() {
            return Err(MontageError::NoValidImages);
        }

        let (width, height) = self.dimensions(tiles.len());
        let mut canvas = RgbImage::new(width, height);

        for (index, tile) in tiles.iter().enumerate() {
            let index = index as u32;
            let x = (index % self.tiles_per_row) * self.tile_size;
            let y = (index / self.tiles_per_row) * self.tile_size;
            imageops::replace(&mut canvas, tile, i64::from(x), i64::from(y));
        }

        info!("Built {}x{} collage from {} tiles", width, height, tiles.len());

        Ok(canvas)
    }

    /// Canvas size for `count` tiles
    pub fn dimensions(&self, count: usize) -> (u32, u32) {
        let count = count as u32;
        let columns = count.min(self.tiles_per_row);
        let rows = count.div_ceil(self.tiles_per_row);
        (columns * self.tile_size, rows * self.tile_size)
    }
}

/// Write the collage, replacing any earlier one. The format follows the
/// file extension.
pub fn write_collage(collage: &RgbImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    collage.save(path).map_err(|source| MontageError::CollageWrite {
        path: path.to_path_buf(),
        source,
    })
}
