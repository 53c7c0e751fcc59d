// tests/test_pipeline.rs: exercises the stateful facade, covering readiness, cache invalidation,
// kernel reuse and the async entry points.

use image::imageops::FilterType;
use magic_eye::{
    CompositeError, ImagePreparer, Invalidation, MagicEye, PipelineConfig, Pixel, PixelBuffer,
    Preparer, Strategy,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const A: Pixel = Pixel::new(200, 10, 10, 255);
const B: Pixel = Pixel::new(10, 200, 10, 255);
const C: Pixel = Pixel::new(10, 10, 200, 255);
const D: Pixel = Pixel::new(120, 120, 0, 255);

/// Counts how often the facade asks for derived buffers.
#[derive(Default, Clone)]
struct CountingPreparer {
    inner: ImagePreparer,
    tiles: Arc<AtomicUsize>,
    fits: Arc<AtomicUsize>,
}

impl CountingPreparer {
    fn nearest() -> Self {
        Self {
            inner: ImagePreparer {
                filter: FilterType::Nearest,
            },
            ..Self::default()
        }
    }

    fn counts(&self) -> (usize, usize) {
        (self.tiles.load(Ordering::SeqCst), self.fits.load(Ordering::SeqCst))
    }
}

impl Preparer for CountingPreparer {
    fn tile_pattern(&self, tile: &PixelBuffer, width: usize, height: usize) -> PixelBuffer {
        self.tiles.fetch_add(1, Ordering::SeqCst);
        self.inner.tile_pattern(tile, width, height)
    }

    fn fit_depth(&self, depth: &PixelBuffer, width: usize, height: usize) -> PixelBuffer {
        self.fits.fetch_add(1, Ordering::SeqCst);
        self.inner.fit_depth(depth, width, height)
    }
}

fn config(width: usize, height: usize) -> PipelineConfig {
    PipelineConfig {
        width,
        height,
        ..PipelineConfig::default()
    }
}

fn abcd_tile() -> PixelBuffer {
    PixelBuffer::from_pixels(4, 1, vec![A, B, C, D]).unwrap()
}

fn ready(width: usize, height: usize) -> (MagicEye<CountingPreparer>, CountingPreparer) {
    let preparer = CountingPreparer::nearest();
    let mut eye = MagicEye::with_preparer(config(width, height), preparer.clone());
    eye.set_pattern(abcd_tile());
    eye.set_depth(PixelBuffer::from_fn(width, height, |x, y| {
        Pixel::gray(((x * 29 + y * 53) % 256) as u8)
    }));
    (eye, preparer)
}

// ===== Readiness =====

#[test]
fn missing_inputs_yield_no_result() {
    let mut eye: MagicEye = MagicEye::new(config(8, 2));
    assert!(eye.composite().unwrap().is_none());

    eye.set_pattern(abcd_tile());
    assert!(eye.composite().unwrap().is_none(), "depth still missing");

    eye.set_depth(PixelBuffer::filled(8, 2, Pixel::gray(0)));
    assert!(eye.composite().unwrap().is_some());

    eye.clear_depth();
    assert!(eye.composite().unwrap().is_none());

    eye.set_depth(PixelBuffer::filled(8, 2, Pixel::gray(0)));
    eye.clear_pattern();
    assert!(eye.composite().unwrap().is_none());
}

#[test]
fn zero_width_tile_yields_no_result() {
    let mut eye: MagicEye = MagicEye::new(config(8, 2));
    eye.set_pattern(PixelBuffer::new(0, 3));
    eye.set_depth(PixelBuffer::filled(8, 2, Pixel::gray(0)));
    assert_eq!(eye.period(), 0);
    for strategy in [Strategy::Sequential, Strategy::Parallel] {
        assert!(eye.composite_with(strategy).unwrap().is_none());
    }
}

#[test]
fn invalid_depth_range_is_an_error() {
    let (mut eye, _) = ready(8, 2);
    eye.set_depth_range(0.2, 0.0);
    assert!(matches!(eye.composite(), Err(CompositeError::Config(_))));
    eye.set_depth_range(0.2, 1.0);
    assert!(eye.composite().unwrap().is_some());
}

// ===== Output =====

#[test]
fn black_depth_reproduces_the_tiled_pattern() {
    let mut eye: MagicEye = MagicEye::new(config(8, 2));
    eye.set_pattern(abcd_tile());
    eye.set_depth(PixelBuffer::filled(8, 2, Pixel::gray(0)));

    for strategy in [Strategy::Sequential, Strategy::Parallel, Strategy::Auto] {
        let out = eye.composite_with(strategy).unwrap().expect("ready");
        assert_eq!(out.dimensions(), (8, 2));
        for y in 0..2 {
            assert_eq!(out.row(y), &[A, B, C, D, A, B, C, D], "{strategy:?}");
        }
    }
}

#[test]
fn strategies_agree_through_the_facade() {
    let (mut eye, _) = ready(37, 11);
    let sequential = eye.composite_with(Strategy::Sequential).unwrap();
    let parallel = eye.composite_with(Strategy::Parallel).unwrap();
    assert!(sequential.is_some());
    assert_eq!(sequential, parallel);
}

#[test]
fn depth_of_any_size_is_fitted_to_the_target() {
    let preparer = CountingPreparer::nearest();
    let mut eye = MagicEye::with_preparer(config(12, 6), preparer);
    eye.set_pattern(abcd_tile());
    eye.set_depth(PixelBuffer::filled(3, 2, Pixel::gray(0)));
    let out = eye.composite().unwrap().expect("ready");
    assert_eq!(out.dimensions(), (12, 6));
    assert_eq!(out.row(5), &[A, B, C, D, A, B, C, D, A, B, C, D]);
}

#[test]
fn the_cached_pattern_survives_a_sequential_pass() {
    let (mut eye, _) = ready(16, 3);
    let first = eye.composite_with(Strategy::Sequential).unwrap();
    let second = eye.composite_with(Strategy::Sequential).unwrap();
    assert_eq!(first, second);
}

// ===== Caching =====

#[test]
fn repeated_composites_reuse_derived_buffers() {
    let (mut eye, preparer) = ready(16, 4);
    for _ in 0..3 {
        eye.composite().unwrap();
    }
    assert_eq!(preparer.counts(), (1, 1));
    let stats = eye.stats();
    assert_eq!(stats.pattern_derivations, 1);
    assert_eq!(stats.depth_derivations, 1);
    assert_eq!(stats.table_builds, 1);
    assert_eq!(stats.kernel_builds, 1);
}

#[test]
fn pattern_invalidation_recomputes_only_the_pattern() {
    let (mut eye, preparer) = ready(16, 4);
    eye.composite().unwrap();

    eye.invalidate(Invalidation::PatternChanged);
    eye.composite().unwrap();
    assert_eq!(preparer.counts(), (2, 1));

    eye.set_pattern(abcd_tile());
    eye.composite().unwrap();
    assert_eq!(preparer.counts(), (3, 1));
}

#[test]
fn depth_invalidation_recomputes_only_the_depth() {
    let (mut eye, preparer) = ready(16, 4);
    eye.composite().unwrap();

    eye.invalidate(Invalidation::DepthChanged);
    eye.composite().unwrap();
    assert_eq!(preparer.counts(), (1, 2));

    eye.set_depth(PixelBuffer::filled(5, 5, Pixel::gray(99)));
    eye.composite().unwrap();
    assert_eq!(preparer.counts(), (1, 3));
}

#[test]
fn size_changes_recompute_both() {
    let (mut eye, preparer) = ready(16, 4);
    eye.composite().unwrap();

    eye.set_size(20, 4);
    let out = eye.composite().unwrap().expect("ready");
    assert_eq!(out.dimensions(), (20, 4));
    assert_eq!(preparer.counts(), (2, 2));

    eye.invalidate(Invalidation::SizeChanged);
    eye.composite().unwrap();
    assert_eq!(preparer.counts(), (3, 3));
}

#[test]
fn kernels_are_built_once_per_period() {
    let (mut eye, _) = ready(24, 2);
    eye.composite_with(Strategy::Parallel).unwrap();

    eye.set_pattern(PixelBuffer::filled(6, 2, Pixel::gray(128)));
    eye.composite_with(Strategy::Parallel).unwrap();
    assert_eq!(eye.stats().kernel_builds, 2);

    eye.set_pattern(abcd_tile());
    eye.composite_with(Strategy::Parallel).unwrap();
    eye.set_depth_range(0.0, 1.0);
    eye.composite_with(Strategy::Parallel).unwrap();
    assert_eq!(eye.stats().kernel_builds, 2);
}

// ===== Async =====

#[tokio::test]
async fn async_composite_matches_the_blocking_one() {
    let (mut eye, _) = ready(41, 9);
    let expected = eye.composite_with(Strategy::Sequential).unwrap();
    assert!(expected.is_some());
    for strategy in [Strategy::Sequential, Strategy::Parallel, Strategy::Auto] {
        let out = eye.composite_with_async(strategy).await.unwrap();
        assert_eq!(out, expected, "{strategy:?}");
    }
}

#[tokio::test]
async fn async_composite_reports_no_result() {
    let mut eye: MagicEye = MagicEye::new(config(8, 2));
    eye.set_depth(PixelBuffer::filled(8, 2, Pixel::gray(0)));
    assert!(eye.composite_async().await.unwrap().is_none());
}
