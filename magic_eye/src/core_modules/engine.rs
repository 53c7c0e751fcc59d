// THEORY:
// Both compositing strategies answer the same question: given a tiled pattern, a depth
// buffer of the same size and a disparity table, what is the stereogram? `ShiftEngine` is
// the seam between the facade and the two strategies, so the facade can pick one at run
// time without knowing how it works.
//
// The pattern is taken by value. The sequential engine mutates it in place and hands the
// same storage back; the parallel kernel only reads it and returns fresh storage. Either
// way the caller gives up the pattern for the duration of the call, which is the
// exclusive-ownership rule the sequential pass depends on.

use crate::core_modules::disparity::DisparityTable;
use crate::core_modules::error::CompositeResult;
use crate::core_modules::pixel_buffer::PixelBuffer;

/// A compositing strategy.
pub trait ShiftEngine {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Composites `pattern` against `depth`.
    ///
    /// Fails with `CompositeError::Dimension` when the buffers differ in size. The table
    /// must describe an active configuration (`p0 > 0`).
    fn composite(
        &self,
        pattern: PixelBuffer,
        depth: &PixelBuffer,
        table: &DisparityTable,
    ) -> CompositeResult<PixelBuffer>;

    /// Composites a pattern the caller keeps, such as a cached derived buffer.
    ///
    /// The default copies the pattern first. Engines that never write to it override
    /// this to skip the copy.
    fn composite_borrowed(
        &self,
        pattern: &PixelBuffer,
        depth: &PixelBuffer,
        table: &DisparityTable,
    ) -> CompositeResult<PixelBuffer> {
        self.composite(pattern.clone(), depth, table)
    }
}
