// THEORY:
// The `PixelBuffer` is the raster both engines operate on. It is a "dumb" container
// much like a chunk: a flat, row-major `Vec<Pixel>` plus immutable dimensions. It knows
// how to index itself and nothing about stereograms.
//
// Key architectural principles:
// 1.  **Forgiving Coordinates**: Signed coordinate access returns `None` for reads and
//     silently ignores writes outside the raster. A shifted write that lands off the
//     edge of the image is simply dropped, so the engines never branch on bounds
//     before calling into the buffer.
// 2.  **Row Slices**: Hot loops work on whole rows (`row`, `row_mut`) to stay in cache
//     and avoid per-pixel index arithmetic.
// 3.  **Fixed Shape**: Width and height are set at construction and cannot change; a
//     differently sized raster is a different buffer.
// 4.  **Representable Shape**: `width * height` always fits in `usize` and always equals
//     the pixel count. Constructors that wrap caller data return `None` otherwise;
//     constructors that allocate panic, like `vec!` does for an impossible length.

use crate::core_modules::pixel::pixel::{Byte, CHANNELS, Pixel};

/// A 2-D RGBA raster stored row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: usize,
    height: usize,
    pixels: Vec<Pixel>,
}

impl PixelBuffer {
    /// Creates a buffer filled with transparent black.
    ///
    /// # Panics
    ///
    /// Panics when `width * height` overflows `usize`.
    pub fn new(width: usize, height: usize) -> Self {
        Self::filled(width, height, Pixel::TRANSPARENT)
    }

    /// # Panics
    ///
    /// Panics when `width * height` overflows `usize`; see [`PixelBuffer::try_filled`].
    pub fn filled(width: usize, height: usize, pixel: Pixel) -> Self {
        match Self::try_filled(width, height, pixel) {
            Some(buffer) => buffer,
            None => panic!("{width}x{height} raster overflows usize"),
        }
    }

    /// Like [`PixelBuffer::filled`], but returns `None` when `width * height` overflows.
    pub fn try_filled(width: usize, height: usize, pixel: Pixel) -> Option<Self> {
        let len = pixel_count(width, height)?;
        Some(Self {
            width,
            height,
            pixels: vec![pixel; len],
        })
    }

    /// Wraps an existing row-major pixel vector. Returns `None` when the length does
    /// not match `width * height`, or when that product overflows.
    pub fn from_pixels(width: usize, height: usize, pixels: Vec<Pixel>) -> Option<Self> {
        if pixel_count(width, height) != Some(pixels.len()) {
            return None;
        }
        Some(Self {
            width,
            height,
            pixels,
        })
    }

    /// Builds a buffer by evaluating `f(x, y)` for every pixel.
    ///
    /// # Panics
    ///
    /// Panics when `width * height` overflows `usize`.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> Pixel) -> Self {
        let Some(len) = pixel_count(width, height) else {
            panic!("{width}x{height} raster overflows usize");
        };
        let mut pixels = Vec::with_capacity(len);
        for y in 0..height {
            for x in 0..width {
                pixels.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Decodes tightly packed RGBA bytes. Returns `None` on a length mismatch.
    pub fn from_rgba_bytes(width: usize, height: usize, bytes: &[Byte]) -> Option<Self> {
        let expected = pixel_count(width, height)?.checked_mul(CHANNELS)?;
        if bytes.len() != expected {
            return None;
        }
        let pixels = bytes
            .chunks_exact(CHANNELS)
            .map(|rgba| Pixel::new(rgba[0], rgba[1], rgba[2], rgba[3]))
            .collect();
        Self::from_pixels(width, height, pixels)
    }

    pub fn to_rgba_bytes(&self) -> Vec<Byte> {
        self.pixels.iter().flat_map(|pixel| pixel.to_bytes()).collect()
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn same_dimensions(&self, other: &PixelBuffer) -> bool {
        self.dimensions() == other.dimensions()
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    #[inline]
    fn index_of(&self, x: isize, y: isize) -> Option<usize> {
        let x = usize::try_from(x).ok()?;
        let y = usize::try_from(y).ok()?;
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(y * self.width + x)
    }

    /// Reads the pixel at `(x, y)`; `None` outside the raster.
    #[inline]
    pub fn get(&self, x: isize, y: isize) -> Option<Pixel> {
        self.index_of(x, y).and_then(|index| self.pixels.get(index).copied())
    }

    /// Writes the pixel at `(x, y)`; a no-op outside the raster.
    #[inline]
    pub fn set(&mut self, x: isize, y: isize, pixel: Pixel) {
        if let Some(slot) = self.index_of(x, y).and_then(|index| self.pixels.get_mut(index)) {
            *slot = pixel;
        }
    }

    /// Reads by flat row-major index.
    #[inline]
    pub fn get_index(&self, index: usize) -> Option<Pixel> {
        self.pixels.get(index).copied()
    }

    #[inline]
    pub fn set_index(&mut self, index: usize, pixel: Pixel) {
        if let Some(slot) = self.pixels.get_mut(index) {
            *slot = pixel;
        }
    }

    /// The pixels of row `y`. Panics if `y >= height`.
    #[inline]
    pub fn row(&self, y: usize) -> &[Pixel] {
        let start = y * self.width;
        &self.pixels[start..start + self.width]
    }

    /// Mutable pixels of row `y`. Panics if `y >= height`.
    #[inline]
    pub fn row_mut(&mut self, y: usize) -> &mut [Pixel] {
        let start = y * self.width;
        &mut self.pixels[start..start + self.width]
    }

    pub fn as_slice(&self) -> &[Pixel] {
        &self.pixels
    }

    pub fn as_mut_slice(&mut self) -> &mut [Pixel] {
        &mut self.pixels
    }

    pub fn into_pixels(self) -> Vec<Pixel> {
        self.pixels
    }

    /// Visits every pixel in row-major order as `(index, x, y, pixel)`.
    pub fn enumerate(&self) -> impl Iterator<Item = (usize, usize, usize, Pixel)> + '_ {
        let width = self.width.max(1);
        self.pixels
            .iter()
            .enumerate()
            .map(move |(index, pixel)| (index, index % width, index / width, *pixel))
    }
}

/// Number of pixels in a `width x height` raster, or `None` when it overflows `usize`.
pub fn pixel_count(width: usize, height: usize) -> Option<usize> {
    width.checked_mul(height)
}
