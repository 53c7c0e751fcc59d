// THEORY:
// The `disparity` module turns a depth sample into a horizontal displacement. It is the
// only place the stereogram geometry lives; both engines call into it per pixel and
// otherwise only move pixels around.
//
// For a luma sample `g` and a configuration `{k_min, k_max, p0}`:
//
//     shift(g) = floor( p0 * (1 - g*(k_max - k_min) / (k_max * (255*(1 + k_max) - g*(k_max - k_min)))) )
//
// `p0` is the pattern period (the width of one tile). A black sample (g = 0) always
// shifts by exactly one period, which reproduces the tiled pattern unchanged. `k_min` and
// `k_max` bound the perceived depth range; with `k_min <= k_max` the shift shrinks as luma
// grows, so brighter samples appear closer.
//
// The denominator is linear in `g`. It is positive at g = 0 whenever `k_max > 0`, and at
// g = 255 it reduces to `255 * k_max * (1 + k_min)`. Requiring `k_max > 0` and `k_min > -1`
// therefore keeps it strictly positive across the whole luma range; any configuration
// outside those bounds is rejected before a single shift is evaluated.
//
// The bounds themselves are any finite `f32`, so the products in the formula can reach
// the square of `f32::MAX`. `shift` widens to `f64`, where they stay finite, and regroups
// the denominator as
//
//     255*(1 + k_min) + (255 - g)*(k_max - k_min)        when k_min <= k_max
//     255*(1 + k_max) + g*(k_min - k_max)                otherwise
//
// Both terms are non-negative for a valid configuration, so nothing cancels at extreme
// bounds and every rounding step moves the same way as `g`. The result stays monotonic
// in `g` for every configuration `validate` accepts.
//
// Because luma is an 8-bit value there are only 256 possible shifts per configuration.
// `DisparityTable` evaluates all of them once and the engines do a table lookup in the
// hot path.

use crate::core_modules::error::ConfigError;
use crate::core_modules::pixel::pixel::Luma;

pub type Shift = isize;

const LUMA_LEVELS: usize = 256;
const LUMA_MAX: f64 = 255.0;

pub const DEFAULT_K_MIN: f32 = 0.2;
pub const DEFAULT_K_MAX: f32 = 1.0;

/// Parameters of the disparity function. Plain value data, passed per call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisparityConfig {
    /// Lower bound of the perceived depth range.
    pub k_min: f32,
    /// Upper bound of the perceived depth range. Must be positive.
    pub k_max: f32,
    /// Pattern period in pixels. Zero disables compositing.
    pub p0: usize,
}

impl Default for DisparityConfig {
    fn default() -> Self {
        Self {
            k_min: DEFAULT_K_MIN,
            k_max: DEFAULT_K_MAX,
            p0: 0,
        }
    }
}

impl DisparityConfig {
    /// Default depth range for the given pattern period.
    pub fn new(p0: usize) -> Self {
        Self {
            p0,
            ..Self::default()
        }
    }

    pub fn with_depth_range(mut self, k_min: f32, k_max: f32) -> Self {
        self.k_min = k_min;
        self.k_max = k_max;
        self
    }

    /// Whether compositing is switched on at all.
    pub fn is_active(&self) -> bool {
        self.p0 > 0
    }

    /// Rejects configurations whose denominator could reach zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.k_max.is_finite() || self.k_max <= 0.0 {
            return Err(ConfigError::InvalidMax(self.k_max));
        }
        if !self.k_min.is_finite() || self.k_min <= -1.0 {
            return Err(ConfigError::InvalidMin(self.k_min));
        }
        Ok(())
    }

    /// Bit-exact identity of the configuration, usable as a cache key.
    pub(crate) fn key(&self) -> (u32, u32, usize) {
        (self.k_min.to_bits(), self.k_max.to_bits(), self.p0)
    }
}

/// Evaluates the disparity formula directly.
///
/// The configuration must already be valid; see [`DisparityConfig::validate`].
pub fn shift(g: Luma, config: &DisparityConfig) -> Shift {
    let p0 = config.p0 as f64;
    if g == 0 {
        return p0 as Shift;
    }
    let k_min = f64::from(config.k_min);
    let k_max = f64::from(config.k_max);
    let span = k_max - k_min;
    let g = f64::from(g);

    // 255 * (1 + k_max) - g * span, regrouped so both terms are non-negative.
    let depth = if span >= 0.0 {
        let rest = LUMA_MAX * (1.0 + k_min) + (LUMA_MAX - g) * span;
        (g * span) / (k_max * rest)
    } else {
        let pull = g * -span;
        -1.0 / (k_max * (1.0 + LUMA_MAX * (1.0 + k_max) / pull))
    };
    (p0 * (1.0 - depth)).floor() as Shift
}

/// All 256 shifts of one validated configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DisparityTable {
    config: DisparityConfig,
    shifts: [Shift; LUMA_LEVELS],
}

impl DisparityTable {
    pub fn new(config: &DisparityConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut shifts = [0; LUMA_LEVELS];
        for (g, slot) in shifts.iter_mut().enumerate() {
            *slot = shift(g as Luma, config);
        }
        Ok(Self {
            config: *config,
            shifts,
        })
    }

    #[inline]
    pub fn shift(&self, g: Luma) -> Shift {
        self.shifts[g as usize]
    }

    pub fn period(&self) -> usize {
        self.config.p0
    }

    pub fn config(&self) -> &DisparityConfig {
        &self.config
    }

    /// Smallest and largest shift the table can produce.
    pub fn bounds(&self) -> (Shift, Shift) {
        let min = self.shifts.iter().copied().min().unwrap_or(0);
        let max = self.shifts.iter().copied().max().unwrap_or(0);
        (min, max)
    }
}
