// THEORY:
// The async half of the pipeline. A frame loop running on tokio must not stall its
// executor while a stereogram is generated, so compositing is moved onto tokio's blocking
// pool:
//
// - the sequential engine is picked by `select_engine`, like the blocking facade does,
//   and runs as one blocking task against the cached pattern;
// - the parallel kernel is fanned out by `WorkerPool` as one blocking task per band of
//   rows. Each task holds only `Arc`s to the read-only sources and writes its own band,
//   so there is no shared mutable state between tasks. Bands are stitched back together
//   in row order once every task has finished.
//
// Because each band is shaded by the same pure per-pixel kernel, the result does not
// depend on how many bands there are or in which order tokio runs them.

use crate::core_modules::disparity::DisparityTable;
use crate::core_modules::error::{CompositeResult, check_dimensions};
use crate::core_modules::pixel::pixel::Pixel;
use crate::core_modules::pixel_buffer::PixelBuffer;
use crate::core_modules::preparation::Preparer;
use crate::core_modules::shift_kernel::{ShiftKernel, row_bands};
use crate::pipeline::{MagicEye, Prepared, Strategy, select_engine};
use futures::future::try_join_all;
use log::debug;
use std::sync::Arc;
use std::time::Instant;

/// Runs the parallel kernel on tokio's blocking pool.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    /// `workers == 0` uses one band per logical CPU.
    pub fn new(workers: usize) -> Self {
        let workers = if workers == 0 { num_cpus::get() } else { workers };
        Self { workers }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub async fn composite(
        &self,
        kernel: Arc<ShiftKernel>,
        pattern: Arc<PixelBuffer>,
        depth: Arc<PixelBuffer>,
        table: Arc<DisparityTable>,
    ) -> CompositeResult<PixelBuffer> {
        check_dimensions(&pattern, &depth)?;
        kernel.check_table(&table)?;
        let (width, height) = pattern.dimensions();
        let bands = row_bands(height, self.workers);
        debug!("dispatching {} band(s) of {width}x{height}", bands.len());

        let tasks = bands.into_iter().map(|rows| {
            let kernel = Arc::clone(&kernel);
            let pattern = Arc::clone(&pattern);
            let depth = Arc::clone(&depth);
            let table = Arc::clone(&table);
            tokio::task::spawn_blocking(move || {
                let mut band = vec![Pixel::TRANSPARENT; rows.len() * width];
                kernel.shade_rows(&pattern, &depth, &table, rows, &mut band);
                band
            })
        });
        let bands = try_join_all(tasks).await?;

        let mut output = PixelBuffer::new(width, height);
        let mut rest = output.as_mut_slice();
        for band in bands {
            let (dst, tail) = std::mem::take(&mut rest).split_at_mut(band.len());
            dst.copy_from_slice(&band);
            rest = tail;
        }
        Ok(output)
    }
}

impl<P: Preparer> MagicEye<P> {
    /// Composites with the configured strategy without blocking the async executor.
    pub async fn composite_async(&mut self) -> CompositeResult<Option<PixelBuffer>> {
        self.composite_with_async(self.config().strategy).await
    }

    pub async fn composite_with_async(
        &mut self,
        strategy: Strategy,
    ) -> CompositeResult<Option<PixelBuffer>> {
        let Some(prepared) = self.prepare()? else {
            return Ok(None);
        };
        let workers = self.config().workers;
        let started = Instant::now();
        let result = match strategy.resolve() {
            // The kernel fans out across the blocking pool, one task per band.
            Strategy::Parallel => {
                let out = WorkerPool::new(workers)
                    .composite(prepared.kernel, prepared.pattern, prepared.depth, prepared.table)
                    .await?;
                self.report_timing("parallel", started);
                out
            }
            resolved => {
                let engine = select_engine(resolved, prepared.kernel, workers);
                let name = engine.name();
                let Prepared {
                    pattern,
                    depth,
                    table,
                    ..
                } = prepared;
                let out = tokio::task::spawn_blocking(move || {
                    engine.composite_borrowed(&pattern, &depth, &table)
                })
                .await??;
                self.report_timing(name, started);
                out
            }
        };
        Ok(Some(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::disparity::DisparityConfig;
    use crate::core_modules::error::CompositeError;
    use crate::core_modules::shift_kernel::ParallelShiftKernel;

    fn sources() -> (Arc<PixelBuffer>, Arc<PixelBuffer>) {
        let pattern = PixelBuffer::from_fn(19, 6, |x, y| Pixel::new((x * 13) as u8, (y * 29) as u8, 3, 255));
        let depth = PixelBuffer::from_fn(19, 6, |x, y| Pixel::gray(((x * 37 + y * 11) % 256) as u8));
        (Arc::new(pattern), Arc::new(depth))
    }

    #[tokio::test]
    async fn pool_matches_scoped_threads() {
        let (pattern, depth) = sources();
        let table = Arc::new(DisparityTable::new(&DisparityConfig::new(4)).unwrap());
        let kernel = Arc::new(ShiftKernel::new(4).unwrap());

        let expected = ParallelShiftKernel::new(Arc::clone(&kernel), 1)
            .run(&pattern, &depth, &table)
            .unwrap();
        for workers in [1, 2, 5, 32] {
            let out = WorkerPool::new(workers)
                .composite(
                    Arc::clone(&kernel),
                    Arc::clone(&pattern),
                    Arc::clone(&depth),
                    Arc::clone(&table),
                )
                .await
                .unwrap();
            assert_eq!(out, expected, "workers={workers}");
        }
    }

    #[tokio::test]
    async fn pool_rejects_mismatched_sources() {
        let (pattern, _) = sources();
        let depth = Arc::new(PixelBuffer::new(18, 6));
        let table = Arc::new(DisparityTable::new(&DisparityConfig::new(4)).unwrap());
        let kernel = Arc::new(ShiftKernel::new(4).unwrap());
        let result = WorkerPool::new(2).composite(kernel, pattern, depth, table).await;
        assert!(matches!(result, Err(CompositeError::Dimension { .. })));
    }
}
