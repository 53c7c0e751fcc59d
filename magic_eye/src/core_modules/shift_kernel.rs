// THEORY:
// The `ShiftKernel` computes the stereogram one destination pixel at a time, with no
// pixel ever observing another pixel's output. That is the property a GPU-style
// executor needs, and it is exactly what the sequential pass lacks: there, the value at
// column `x` is the end of a chain of overwrites made by every column to its left.
//
// The kernel reconstructs that chain locally. With shifts in `[0, p0]` a pixel moves
// right by at most one period, so the state of period `j` depends only on period `j - 1`
// and the original source. For destination `(x, y)`:
//
//   n  = x / p0          periods that precede x
//   dx = x % p0          offset inside its own period
//
//   window = [ current | next ]          two periods, 2 * p0 pixels
//   current <- source[0 .. p0)
//   for j in 0..=n:
//       if j > 0: current <- next                      (carry the relocated period over)
//       next <- source[(j+1)*p0 .. (j+2)*p0)           (fresh from the ORIGINAL pattern)
//       for i in 0..p0 where column i + j*p0 is inside the image:
//           s = shift(luma(depth[i + j*p0]))
//           window[i + s] <- window[i]                 (dropped outside the window)
//   result = current[dx]
//
// Work per pixel grows with `x`, and neighbouring pixels redo the same periods. That
// redundancy buys full independence: pixels can run in any order, on any number of
// workers, and always produce the same bits.
//
// Equivalence with the sequential pass: when every shift lies in `[0, p0]` no write can
// escape the two-period window, and the two strategies agree pixel for pixel. Larger or
// negative shifts fall outside the window and are dropped here while the sequential
// pass still performs them; for those configurations this kernel is the reference.
//
// Fill policy: pattern samples beyond the right edge read as transparent black, and
// window positions that are never written keep the original pattern value.
//
// The kernel is specialised for one period and built once per distinct `p0`
// (`KernelCache`); the per-call configuration arrives through the `DisparityTable`.

use crate::core_modules::disparity::DisparityTable;
use crate::core_modules::engine::ShiftEngine;
use crate::core_modules::error::{CompositeError, CompositeResult, check_dimensions};
use crate::core_modules::pixel::pixel::Pixel;
use crate::core_modules::pixel_buffer::PixelBuffer;
use log::debug;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

/// A per-pixel compositing kernel specialised for one pattern period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftKernel {
    period: usize,
}

impl ShiftKernel {
    /// Specialises the kernel for `period`. Returns `None` for a zero period, which has
    /// nothing to composite.
    pub fn new(period: usize) -> Option<Self> {
        (period > 0).then_some(Self { period })
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Scratch length every caller of [`ShiftKernel::shade`] must provide.
    pub fn window_len(&self) -> usize {
        2 * self.period
    }

    /// A zeroed scratch window of the right size.
    pub fn window(&self) -> Vec<Pixel> {
        vec![Pixel::TRANSPARENT; self.window_len()]
    }

    pub(crate) fn check_table(&self, table: &DisparityTable) -> CompositeResult<()> {
        if table.period() != self.period {
            return Err(CompositeError::KernelPeriod {
                kernel: self.period,
                table: table.period(),
            });
        }
        Ok(())
    }

    /// Copies one period of the original pattern row into `dst`.
    #[inline]
    fn sample_period(&self, pattern: &PixelBuffer, y: isize, period_index: usize, dst: &mut [Pixel]) {
        let start = period_index * self.period;
        for (i, slot) in dst.iter_mut().enumerate() {
            *slot = pattern
                .get((start + i) as isize, y)
                .unwrap_or(Pixel::TRANSPARENT);
        }
    }

    /// Computes the destination pixel at `(x, y)`.
    ///
    /// `window` is scratch space of [`ShiftKernel::window_len`] pixels. It is fully
    /// re-seeded from the sources on entry, so nothing carries from one call to the
    /// next. Only `pattern` and `depth` are read; both must be the unmutated inputs.
    pub fn shade(
        &self,
        pattern: &PixelBuffer,
        depth: &PixelBuffer,
        table: &DisparityTable,
        x: usize,
        y: usize,
        window: &mut [Pixel],
    ) -> Pixel {
        let p0 = self.period;
        let window = &mut window[..2 * p0];
        let n = x / p0;
        let dx = x % p0;
        let row = y as isize;
        let span = window.len() as isize;

        self.sample_period(pattern, row, 0, &mut window[..p0]);
        for j in 0..=n {
            if j > 0 {
                window.copy_within(p0.., 0);
            }
            self.sample_period(pattern, row, j + 1, &mut window[p0..]);

            let base = j * p0;
            for i in 0..p0 {
                let Some(sample) = depth.get((base + i) as isize, row) else {
                    // Past the right edge; no later column exists either.
                    break;
                };
                let target = i as isize + table.shift(sample.luma());
                if (0..span).contains(&target) {
                    window[target as usize] = window[i];
                }
            }
        }
        window[dx]
    }

    /// Shades every pixel of `rows` into `out`, row-major. `out` must hold exactly
    /// `rows.len() * width` pixels.
    pub fn shade_rows(
        &self,
        pattern: &PixelBuffer,
        depth: &PixelBuffer,
        table: &DisparityTable,
        rows: Range<usize>,
        out: &mut [Pixel],
    ) {
        let width = pattern.width();
        if width == 0 {
            return;
        }
        let mut window = self.window();
        for (y, dst) in rows.zip(out.chunks_exact_mut(width)) {
            for (x, slot) in dst.iter_mut().enumerate() {
                *slot = self.shade(pattern, depth, table, x, y, &mut window);
            }
        }
    }
}

/// Splits `height` rows into at most `workers` contiguous bands.
pub(crate) fn row_bands(height: usize, workers: usize) -> Vec<Range<usize>> {
    if height == 0 {
        return Vec::new();
    }
    let workers = workers.clamp(1, height);
    let rows_per_band = height.div_ceil(workers);
    (0..height)
        .step_by(rows_per_band)
        .map(|start| start..(start + rows_per_band).min(height))
        .collect()
}

/// Runs a [`ShiftKernel`] over a whole image on scoped worker threads.
#[derive(Debug, Clone)]
pub struct ParallelShiftKernel {
    kernel: Arc<ShiftKernel>,
    workers: usize,
}

impl ParallelShiftKernel {
    /// `workers == 0` uses one worker per logical CPU.
    pub fn new(kernel: Arc<ShiftKernel>, workers: usize) -> Self {
        let workers = if workers == 0 { num_cpus::get() } else { workers };
        Self { kernel, workers }
    }

    pub fn kernel(&self) -> &Arc<ShiftKernel> {
        &self.kernel
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Composites without consuming the pattern.
    pub fn run(
        &self,
        pattern: &PixelBuffer,
        depth: &PixelBuffer,
        table: &DisparityTable,
    ) -> CompositeResult<PixelBuffer> {
        check_dimensions(pattern, depth)?;
        self.kernel.check_table(table)?;
        let (width, height) = pattern.dimensions();
        let mut output = PixelBuffer::new(width, height);
        let kernel = self.kernel.as_ref();

        let mut rest = output.as_mut_slice();
        std::thread::scope(|scope| {
            for rows in row_bands(height, self.workers) {
                let (band, tail) = std::mem::take(&mut rest).split_at_mut(rows.len() * width);
                rest = tail;
                scope.spawn(move || kernel.shade_rows(pattern, depth, table, rows, band));
            }
        });

        Ok(output)
    }
}

impl ShiftEngine for ParallelShiftKernel {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn composite(
        &self,
        pattern: PixelBuffer,
        depth: &PixelBuffer,
        table: &DisparityTable,
    ) -> CompositeResult<PixelBuffer> {
        self.run(&pattern, depth, table)
    }

    fn composite_borrowed(
        &self,
        pattern: &PixelBuffer,
        depth: &PixelBuffer,
        table: &DisparityTable,
    ) -> CompositeResult<PixelBuffer> {
        self.run(pattern, depth, table)
    }
}

/// Kernels built so far, one per distinct period.
#[derive(Debug, Default)]
pub struct KernelCache {
    kernels: HashMap<usize, Arc<ShiftKernel>>,
    builds: usize,
}

impl KernelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the kernel for `period`, building it on first use.
    pub fn get_or_build(&mut self, period: usize) -> Option<Arc<ShiftKernel>> {
        if let Some(kernel) = self.kernels.get(&period) {
            return Some(Arc::clone(kernel));
        }
        let kernel = Arc::new(ShiftKernel::new(period)?);
        debug!("built shift kernel for period {period}");
        self.builds += 1;
        self.kernels.insert(period, Arc::clone(&kernel));
        Some(kernel)
    }

    /// How many kernels have been built over the cache's lifetime.
    pub fn builds(&self) -> usize {
        self.builds
    }

    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }
}
