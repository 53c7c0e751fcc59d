// THEORY:
// A compositing call fails for one of two reasons: the caller handed over buffers that
// do not line up, or a disparity configuration could divide by zero. Kernel period
// mismatches and worker failures are folded into the same enum so both facades return
// one error type.
//
// "Inputs not ready" is not an error: engines report it as `Ok(None)`.

use crate::core_modules::pixel_buffer::PixelBuffer;
use thiserror::Error;

/// A disparity configuration that could divide by zero for some luma value.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum ConfigError {
    /// `k_max` must be finite and strictly positive.
    #[error("k_max must be finite and positive, got {0}")]
    InvalidMax(f32),

    /// `k_min` must be finite and greater than -1.
    #[error("k_min must be finite and greater than -1, got {0}")]
    InvalidMin(f32),
}

/// Errors that abort a compositing call.
#[derive(Error, Debug)]
pub enum CompositeError {
    /// Pattern and depth buffers differ in size.
    #[error(
        "pattern is {pattern_width}x{pattern_height} but depth is {depth_width}x{depth_height}"
    )]
    Dimension {
        pattern_width: usize,
        pattern_height: usize,
        depth_width: usize,
        depth_height: usize,
    },

    /// The disparity configuration was rejected.
    #[error("invalid disparity configuration: {0}")]
    Config(#[from] ConfigError),

    /// A kernel specialised for one period was handed a table for another.
    #[error("kernel specialised for period {kernel} cannot run period {table}")]
    KernelPeriod { kernel: usize, table: usize },

    /// A blocking worker task panicked or was cancelled.
    #[error("compositing worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Fails with `CompositeError::Dimension` unless both buffers share a size.
pub(crate) fn check_dimensions(pattern: &PixelBuffer, depth: &PixelBuffer) -> CompositeResult<()> {
    if pattern.same_dimensions(depth) {
        return Ok(());
    }
    Err(CompositeError::Dimension {
        pattern_width: pattern.width(),
        pattern_height: pattern.height(),
        depth_width: depth.width(),
        depth_height: depth.height(),
    })
}

/// Result type for compositing operations.
pub type CompositeResult<T> = Result<T, CompositeError>;
