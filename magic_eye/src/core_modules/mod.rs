pub mod disparity;
pub mod engine;
pub mod error;
pub mod pixel;
pub mod pixel_buffer;
pub mod preparation;
pub mod sequential_engine;
pub mod shift_kernel;
pub mod utils;
