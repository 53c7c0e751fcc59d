// THEORY:
// The `pipeline` module is the top-level API of the compositing engine. It wraps the
// engines, the disparity table and the preparation step behind two entry points:
//
// - `composite(pattern, depth, config, strategy)`: a pure function over two prepared
//   buffers. No state, no caching.
// - `MagicEye`: a long-lived facade for a frame loop. It owns the pattern tile and the
//   depth source, remembers the buffers derived from them, and composites on demand.
//
// Caching is explicit. Every source gets a generation number when it is set; a derived
// buffer remembers the (generation, size) it was built for and is rebuilt only when that
// key no longer matches or when a caller invalidates it. The dependency graph is small:
//
//     size     -> derived pattern, derived depth
//     pattern  -> derived pattern (and the period p0, which is the tile width)
//     depth    -> derived depth
//
// The disparity table is cached against the exact bits of its configuration, and shift
// kernels are cached per period, so changing the depth range never rebuilds a kernel and
// switching back to a previously seen period reuses the kernel built for it.
//
// "No result" (`Ok(None)`) means the inputs are not ready: no pattern, no depth, or a
// zero period. Callers skip the frame. Errors are reserved for inputs that can never
// composite (mismatched sizes, a configuration that divides by zero).

use crate::core_modules::disparity::{DEFAULT_K_MAX, DEFAULT_K_MIN, DisparityConfig, DisparityTable};
use crate::core_modules::engine::ShiftEngine;
use crate::core_modules::error::{CompositeResult, check_dimensions};
use crate::core_modules::pixel_buffer::PixelBuffer;
use crate::core_modules::preparation::{ImagePreparer, Preparer};
use crate::core_modules::sequential_engine::SequentialShiftEngine;
use crate::core_modules::shift_kernel::{KernelCache, ParallelShiftKernel, ShiftKernel};
use log::{debug, info};
use std::sync::Arc;
use std::time::Instant;

/// Which engine runs a composite call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// In-place single pass on the calling thread.
    Sequential,
    /// Per-pixel kernel across worker threads.
    Parallel,
    /// Parallel when more than one CPU is available, sequential otherwise.
    #[default]
    Auto,
}

impl Strategy {
    /// Resolves `Auto` against the machine; other strategies are returned as-is.
    pub fn resolve(self) -> Strategy {
        match self {
            Strategy::Auto if num_cpus::get() > 1 => Strategy::Parallel,
            Strategy::Auto => Strategy::Sequential,
            other => other,
        }
    }
}

/// Why cached derived buffers must be dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invalidation {
    /// Drops both derived buffers.
    SizeChanged,
    /// Drops the derived pattern only.
    PatternChanged,
    /// Drops the derived depth only.
    DepthChanged,
}

/// Configuration for the `MagicEye` facade.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Target width of the stereogram in pixels.
    pub width: usize,
    /// Target height of the stereogram in pixels.
    pub height: usize,
    pub k_min: f32,
    pub k_max: f32,
    pub strategy: Strategy,
    /// Worker threads for the parallel kernel. Zero means one per logical CPU.
    pub workers: usize,
    /// Log the duration of every generation at `info` level.
    pub measure: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            k_min: DEFAULT_K_MIN,
            k_max: DEFAULT_K_MAX,
            strategy: Strategy::Auto,
            workers: 0,
            measure: false,
        }
    }
}

/// Counters describing how much work the caches have saved or redone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub pattern_derivations: usize,
    pub depth_derivations: usize,
    pub table_builds: usize,
    pub kernel_builds: usize,
}

/// Composites two prepared buffers of the same size.
///
/// Returns `Ok(None)` when `config.p0 == 0`.
pub fn composite(
    pattern: PixelBuffer,
    depth: &PixelBuffer,
    config: &DisparityConfig,
    strategy: Strategy,
) -> CompositeResult<Option<PixelBuffer>> {
    let Some(kernel) = ShiftKernel::new(config.p0) else {
        return Ok(None);
    };
    check_dimensions(&pattern, depth)?;
    let table = DisparityTable::new(config)?;
    let engine = select_engine(strategy, Arc::new(kernel), 0);
    engine.composite(pattern, depth, &table).map(Some)
}

pub(crate) fn select_engine(
    strategy: Strategy,
    kernel: Arc<ShiftKernel>,
    workers: usize,
) -> Box<dyn ShiftEngine + Send + Sync> {
    let engine: Box<dyn ShiftEngine + Send + Sync> = match strategy.resolve() {
        Strategy::Sequential => Box::new(SequentialShiftEngine::new()),
        _ => Box::new(ParallelShiftKernel::new(kernel, workers)),
    };
    debug!("compositing with the {} engine", engine.name());
    engine
}

struct Source {
    buffer: PixelBuffer,
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DerivedKey {
    generation: u64,
    width: usize,
    height: usize,
}

struct Derived {
    key: DerivedKey,
    buffer: Arc<PixelBuffer>,
}

/// Everything one composite call needs, resolved from the caches.
pub(crate) struct Prepared {
    pub(crate) pattern: Arc<PixelBuffer>,
    pub(crate) depth: Arc<PixelBuffer>,
    pub(crate) table: Arc<DisparityTable>,
    pub(crate) kernel: Arc<ShiftKernel>,
}

/// Returns the cached buffer for `key`, deriving and storing a new one on a miss.
fn refresh(
    slot: &mut Option<Derived>,
    key: DerivedKey,
    derivations: &mut usize,
    derive: impl FnOnce() -> PixelBuffer,
) -> Arc<PixelBuffer> {
    if let Some(cached) = slot.as_ref().filter(|cached| cached.key == key) {
        return Arc::clone(&cached.buffer);
    }
    let buffer = Arc::new(derive());
    *derivations += 1;
    *slot = Some(Derived {
        key,
        buffer: Arc::clone(&buffer),
    });
    buffer
}

/// The stateful compositing facade.
pub struct MagicEye<P = ImagePreparer> {
    config: PipelineConfig,
    preparer: P,
    pattern: Option<Source>,
    depth: Option<Source>,
    generations: u64,
    pattern_cache: Option<Derived>,
    depth_cache: Option<Derived>,
    table_cache: Option<Arc<DisparityTable>>,
    kernels: KernelCache,
    stats: CacheStats,
}

impl<P: Preparer + Default> MagicEye<P> {
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_preparer(config, P::default())
    }
}

impl<P: Preparer> MagicEye<P> {
    pub fn with_preparer(config: PipelineConfig, preparer: P) -> Self {
        Self {
            config,
            preparer,
            pattern: None,
            depth: None,
            generations: 0,
            pattern_cache: None,
            depth_cache: None,
            table_cache: None,
            kernels: KernelCache::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn size(&self) -> (usize, usize) {
        (self.config.width, self.config.height)
    }

    /// The pattern period: the width of the current tile, or zero without one.
    pub fn period(&self) -> usize {
        self.pattern.as_ref().map_or(0, |source| source.buffer.width())
    }

    pub fn disparity_config(&self) -> DisparityConfig {
        DisparityConfig {
            k_min: self.config.k_min,
            k_max: self.config.k_max,
            p0: self.period(),
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            kernel_builds: self.kernels.builds(),
            ..self.stats
        }
    }

    fn next_generation(&mut self) -> u64 {
        self.generations += 1;
        self.generations
    }

    pub fn set_size(&mut self, width: usize, height: usize) {
        if self.size() == (width, height) {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.invalidate(Invalidation::SizeChanged);
    }

    /// Replaces the pattern tile. Its width becomes the period.
    pub fn set_pattern(&mut self, tile: PixelBuffer) {
        let generation = self.next_generation();
        self.pattern = Some(Source {
            buffer: tile,
            generation,
        });
        self.invalidate(Invalidation::PatternChanged);
    }

    pub fn clear_pattern(&mut self) {
        self.pattern = None;
        self.invalidate(Invalidation::PatternChanged);
    }

    /// Replaces the depth source. Any size; it is fitted to the target on demand.
    pub fn set_depth(&mut self, depth: PixelBuffer) {
        let generation = self.next_generation();
        self.depth = Some(Source {
            buffer: depth,
            generation,
        });
        self.invalidate(Invalidation::DepthChanged);
    }

    pub fn clear_depth(&mut self) {
        self.depth = None;
        self.invalidate(Invalidation::DepthChanged);
    }

    pub fn set_depth_range(&mut self, k_min: f32, k_max: f32) {
        self.config.k_min = k_min;
        self.config.k_max = k_max;
    }

    pub fn set_strategy(&mut self, strategy: Strategy) {
        self.config.strategy = strategy;
    }

    pub fn set_measure(&mut self, measure: bool) {
        self.config.measure = measure;
    }

    /// Drops the derived buffers that depend on `reason`.
    pub fn invalidate(&mut self, reason: Invalidation) {
        debug!("invalidating derived buffers: {reason:?}");
        match reason {
            Invalidation::SizeChanged => {
                self.pattern_cache = None;
                self.depth_cache = None;
            }
            Invalidation::PatternChanged => self.pattern_cache = None,
            Invalidation::DepthChanged => self.depth_cache = None,
        }
    }

    fn table(&mut self, config: &DisparityConfig) -> CompositeResult<Arc<DisparityTable>> {
        if let Some(table) = self.table_cache.as_ref().filter(|t| t.config().key() == config.key()) {
            return Ok(Arc::clone(table));
        }
        let table = Arc::new(DisparityTable::new(config)?);
        self.stats.table_builds += 1;
        debug!("built disparity table for {config:?}");
        self.table_cache = Some(Arc::clone(&table));
        Ok(table)
    }

    /// Resolves sources, caches and kernel for one composite call. `Ok(None)` when the
    /// inputs are not ready.
    pub(crate) fn prepare(&mut self) -> CompositeResult<Option<Prepared>> {
        let config = self.disparity_config();
        if self.pattern.is_none() || self.depth.is_none() {
            return Ok(None);
        }
        let Some(kernel) = self.kernels.get_or_build(config.p0) else {
            return Ok(None);
        };
        let table = self.table(&config)?;

        let (width, height) = self.size();
        let (Some(pattern), Some(depth)) = (self.pattern.as_ref(), self.depth.as_ref()) else {
            return Ok(None);
        };
        let preparer = &self.preparer;

        let pattern_key = DerivedKey {
            generation: pattern.generation,
            width,
            height,
        };
        let pattern = refresh(
            &mut self.pattern_cache,
            pattern_key,
            &mut self.stats.pattern_derivations,
            || {
                debug!("deriving {width}x{height} pattern");
                preparer.tile_pattern(&pattern.buffer, width, height)
            },
        );

        let depth_key = DerivedKey {
            generation: depth.generation,
            width,
            height,
        };
        let depth = refresh(
            &mut self.depth_cache,
            depth_key,
            &mut self.stats.depth_derivations,
            || {
                debug!("deriving {width}x{height} depth");
                preparer.fit_depth(&depth.buffer, width, height)
            },
        );

        Ok(Some(Prepared {
            pattern,
            depth,
            table,
            kernel,
        }))
    }

    pub(crate) fn report_timing(&self, engine: &str, started: Instant) {
        if self.config.measure {
            info!(
                "generation ({engine}): {:.6} seconds",
                started.elapsed().as_secs_f64()
            );
        }
    }

    /// Composites with the configured strategy.
    pub fn composite(&mut self) -> CompositeResult<Option<PixelBuffer>> {
        self.composite_with(self.config.strategy)
    }

    /// Composites with an explicit strategy.
    pub fn composite_with(&mut self, strategy: Strategy) -> CompositeResult<Option<PixelBuffer>> {
        let Some(prepared) = self.prepare()? else {
            return Ok(None);
        };
        let engine = select_engine(strategy, prepared.kernel, self.config.workers);
        let started = Instant::now();
        // The cached pattern must survive an in-place pass, so it is only ever borrowed.
        let result = engine.composite_borrowed(&prepared.pattern, &prepared.depth, &prepared.table)?;
        self.report_timing(engine.name(), started);
        Ok(Some(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::error::CompositeError;
    use crate::core_modules::pixel::pixel::Pixel;

    fn tile() -> PixelBuffer {
        PixelBuffer::from_fn(4, 1, |x, _| Pixel::new(x as u8 * 50, 10, 20, 255))
    }

    #[test]
    fn strategy_resolution_never_returns_auto() {
        assert_ne!(Strategy::Auto.resolve(), Strategy::Auto);
        assert_eq!(Strategy::Sequential.resolve(), Strategy::Sequential);
        assert_eq!(Strategy::Parallel.resolve(), Strategy::Parallel);
    }

    #[test]
    fn engine_selection_follows_the_resolved_strategy() {
        let kernel = Arc::new(ShiftKernel::new(4).unwrap());
        let pick = |strategy| select_engine(strategy, Arc::clone(&kernel), 2).name();
        assert_eq!(pick(Strategy::Sequential), "sequential");
        assert_eq!(pick(Strategy::Parallel), "parallel");
        assert_eq!(pick(Strategy::Auto), pick(Strategy::Auto.resolve()));
    }

    #[test]
    fn free_composite_is_inactive_without_a_period() {
        let out = composite(
            PixelBuffer::new(4, 4),
            &PixelBuffer::new(4, 4),
            &DisparityConfig::new(0),
            Strategy::Sequential,
        )
        .unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn free_composite_reports_bad_configs() {
        let config = DisparityConfig::new(2).with_depth_range(0.2, 0.0);
        for strategy in [Strategy::Sequential, Strategy::Parallel] {
            let result = composite(PixelBuffer::new(4, 4), &PixelBuffer::new(4, 4), &config, strategy);
            assert!(matches!(result, Err(CompositeError::Config(_))));
        }
    }

    #[test]
    fn period_follows_the_tile_width() {
        let mut eye: MagicEye = MagicEye::new(PipelineConfig::default());
        assert_eq!(eye.period(), 0);
        eye.set_pattern(tile());
        assert_eq!(eye.period(), 4);
        assert_eq!(eye.disparity_config(), DisparityConfig::new(4));
        eye.clear_pattern();
        assert_eq!(eye.period(), 0);
    }

    #[test]
    fn set_size_to_the_same_size_keeps_caches() {
        let mut eye: MagicEye = MagicEye::new(PipelineConfig {
            width: 8,
            height: 2,
            ..PipelineConfig::default()
        });
        eye.set_pattern(tile());
        eye.set_depth(PixelBuffer::filled(8, 2, Pixel::gray(0)));
        eye.composite_with(Strategy::Sequential).unwrap();
        eye.set_size(8, 2);
        eye.composite_with(Strategy::Sequential).unwrap();
        assert_eq!(eye.stats().pattern_derivations, 1);
        assert_eq!(eye.stats().depth_derivations, 1);
    }

    #[test]
    fn depth_range_changes_rebuild_only_the_table() {
        let mut eye: MagicEye = MagicEye::new(PipelineConfig {
            width: 8,
            height: 2,
            ..PipelineConfig::default()
        });
        eye.set_pattern(tile());
        eye.set_depth(PixelBuffer::filled(8, 2, Pixel::gray(40)));
        eye.composite_with(Strategy::Parallel).unwrap();
        eye.set_depth_range(0.0, 2.0);
        eye.composite_with(Strategy::Parallel).unwrap();
        let stats = eye.stats();
        assert_eq!(stats.table_builds, 2);
        assert_eq!(stats.kernel_builds, 1);
        assert_eq!(stats.pattern_derivations, 1);
        assert_eq!(stats.depth_derivations, 1);
    }
}
