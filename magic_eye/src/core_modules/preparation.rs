// THEORY:
// Compositing needs two rasters of the same size: the pattern tile repeated across the
// target, and the depth source fitted to it. Producing those rasters is not the engines'
// business. `Preparer` is the seam through which the pipeline asks an outside
// collaborator for them, and the pipeline caches whatever comes back.
//
// `ImagePreparer` is the stock collaborator, built on the `image` crate:
// - the pattern tile is repeated from the top-left corner, so every row starts at the
//   beginning of a period;
// - the depth source is scaled uniformly until it covers the target (aspect fill),
//   anchored at the top-left, and the overflow on the right or bottom is cropped.

use crate::core_modules::pixel_buffer::PixelBuffer;
use crate::core_modules::utils::image_helper::image_helper::{from_rgba_image, to_rgba_image};
use image::imageops::{self, FilterType};

/// Produces the derived buffers the engines consume.
pub trait Preparer {
    /// Repeats `tile` to fill `width x height`.
    fn tile_pattern(&self, tile: &PixelBuffer, width: usize, height: usize) -> PixelBuffer;

    /// Fits `depth` to exactly `width x height`.
    fn fit_depth(&self, depth: &PixelBuffer, width: usize, height: usize) -> PixelBuffer;
}

/// Tiling and aspect-fill resizing on top of `image::imageops`.
#[derive(Debug, Clone, Copy)]
pub struct ImagePreparer {
    /// Resampling filter used when scaling the depth source.
    pub filter: FilterType,
}

impl Default for ImagePreparer {
    fn default() -> Self {
        Self {
            filter: FilterType::Triangle,
        }
    }
}

impl Preparer for ImagePreparer {
    fn tile_pattern(&self, tile: &PixelBuffer, width: usize, height: usize) -> PixelBuffer {
        if tile.is_empty() {
            return PixelBuffer::new(width, height);
        }
        let (tile_width, tile_height) = tile.dimensions();
        PixelBuffer::from_fn(width, height, |x, y| tile.row(y % tile_height)[x % tile_width])
    }

    fn fit_depth(&self, depth: &PixelBuffer, width: usize, height: usize) -> PixelBuffer {
        if depth.is_empty() || width == 0 || height == 0 {
            return PixelBuffer::new(width, height);
        }
        if depth.dimensions() == (width, height) {
            return depth.clone();
        }

        let (source_width, source_height) = depth.dimensions();
        let scale = (width as f64 / source_width as f64).max(height as f64 / source_height as f64);
        let scaled_width = ((source_width as f64 * scale).ceil() as usize).max(width);
        let scaled_height = ((source_height as f64 * scale).ceil() as usize).max(height);

        let source = to_rgba_image(depth);
        let scaled = imageops::resize(&source, scaled_width as u32, scaled_height as u32, self.filter);
        let cropped = imageops::crop_imm(&scaled, 0, 0, width as u32, height as u32).to_image();
        from_rgba_image(&cropped)
    }
}
