// THEORY:
// The `SequentialShiftEngine` is the direct rendition of single-image stereogram linking:
// walk the pattern once in row-major order and, for every pixel, copy it `shift(g)`
// columns to the right, where `g` is the depth luma under it. The pattern buffer is both
// source and destination, so a pixel read at column `x` already carries every write made
// by columns to its left. That cascade is what turns a flat repeating texture into
// depth: each relocated pixel becomes the source for the next relocation one period on.
//
// Key properties:
// 1.  **Single Pass**: O(width * height), strictly increasing `x` within each row.
// 2.  **Last Write Wins**: a later column overwriting an earlier write to the same
//     target is intended.
// 3.  **Fill Policy**: columns that are never a write target keep the pattern's own
//     value. For a tiled pattern that is simply the first period of every row.
// 4.  **Exclusive Ownership**: the engine owns the pattern for the whole pass; nothing
//     else may observe the buffer mid-row.

use crate::core_modules::disparity::DisparityTable;
use crate::core_modules::engine::ShiftEngine;
use crate::core_modules::error::{CompositeResult, check_dimensions};
use crate::core_modules::pixel_buffer::PixelBuffer;

/// Single-threaded, in-place compositing.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialShiftEngine;

impl SequentialShiftEngine {
    pub fn new() -> Self {
        Self
    }

    /// Runs the pass over `pattern` in place.
    pub fn apply(
        &self,
        pattern: &mut PixelBuffer,
        depth: &PixelBuffer,
        table: &DisparityTable,
    ) -> CompositeResult<()> {
        check_dimensions(pattern, depth)?;
        let width = pattern.width();
        for y in 0..pattern.height() {
            let depth_row = depth.row(y);
            let row = pattern.row_mut(y);
            for x in 0..width {
                let pixel = row[x];
                let target = x as isize + table.shift(depth_row[x].luma());
                // Writes that land outside the row are dropped.
                if let Some(slot) = usize::try_from(target).ok().and_then(|t| row.get_mut(t)) {
                    *slot = pixel;
                }
            }
        }
        Ok(())
    }
}

impl ShiftEngine for SequentialShiftEngine {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn composite(
        &self,
        mut pattern: PixelBuffer,
        depth: &PixelBuffer,
        table: &DisparityTable,
    ) -> CompositeResult<PixelBuffer> {
        self.apply(&mut pattern, depth, table)?;
        Ok(pattern)
    }
}
