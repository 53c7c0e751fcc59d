// THEORY:
// This file is the entry point for the `magic_eye` library crate. It exposes the
// compositing engine that turns a tiled pattern and a depth map into an autostereogram.
//
// The public surface is deliberately small:
// - `pipeline::composite` and the `MagicEye` facade (with its async twin in
//   `parallel_pipeline`) are what a frame loop or a command-line runner calls;
// - `core_modules` holds the building blocks (pixels, buffers, the disparity function
//   and the two engines) for callers that want to drive an engine directly.
//
// Capture, display and image preparation stay outside. The crate only ever sees two
// buffers of the same size and hands back a third.

pub mod core_modules;
pub mod parallel_pipeline;
pub mod pipeline;

pub use core_modules::disparity::{DisparityConfig, DisparityTable, shift};
pub use core_modules::engine::ShiftEngine;
pub use core_modules::error::{CompositeError, CompositeResult, ConfigError};
pub use core_modules::pixel::pixel::Pixel;
pub use core_modules::pixel_buffer::PixelBuffer;
pub use core_modules::preparation::{ImagePreparer, Preparer};
pub use core_modules::sequential_engine::SequentialShiftEngine;
pub use core_modules::shift_kernel::{KernelCache, ParallelShiftKernel, ShiftKernel};
pub use parallel_pipeline::WorkerPool;
pub use pipeline::{CacheStats, Invalidation, MagicEye, PipelineConfig, Strategy, composite};
