//! Glyph cell metrics derived from a DOM measurement probe.
//!
//! The web layer renders an off-screen run of the same monospace character,
//! measures its bounding box, and hands the raw numbers here as a
//! [`ProbeSample`]. This module divides the run width by the repetition
//! count to get a stable per-cell width, derives the cell height as a
//! multiple of the font size (rendered line-height is unreliable across
//! platforms, so it is never measured), and rejects implausible widths in
//! favor of a hardcoded fallback — the usual symptom of measuring while a
//! fallback font is still active.

use std::fmt;

use tracing::warn;

/// Sub-pixel units per pixel (fixed-point denominator).
///
/// 256 gives 8 fractional bits of sub-pixel precision, enough to represent
/// fractional char widths like 8.4px without floating-point ambiguity.
pub const SUBPX_SCALE: u32 = 256;

/// Convert a floating-point pixel value to sub-pixel units.
///
/// Rounds to nearest sub-pixel unit. Returns `None` for negative,
/// non-finite, or overflowing input.
#[must_use]
pub fn px_to_subpx(px: f64) -> Option<u32> {
    if !px.is_finite() || px < 0.0 {
        return None;
    }
    let val = (px * f64::from(SUBPX_SCALE)).round();
    if val > f64::from(u32::MAX) {
        return None;
    }
    Some(val as u32)
}

// ---------------------------------------------------------------------------
// GlyphMetrics
// ---------------------------------------------------------------------------

/// Per-cell glyph dimensions in sub-pixel units (1/256 px).
///
/// Both dimensions are always > 0; use [`GlyphMetrics::new`] or
/// [`GlyphMetrics::from_px`] to validate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlyphMetrics {
    /// Cell width in sub-pixel units.
    pub width_subpx: u32,
    /// Cell height in sub-pixel units.
    pub height_subpx: u32,
}

impl GlyphMetrics {
    /// Create metrics from sub-pixel values.
    ///
    /// Returns `None` if either dimension is zero.
    #[must_use]
    pub fn new(width_subpx: u32, height_subpx: u32) -> Option<Self> {
        if width_subpx == 0 || height_subpx == 0 {
            return None;
        }
        Some(Self {
            width_subpx,
            height_subpx,
        })
    }

    /// Create metrics from floating-point pixel values.
    #[must_use]
    pub fn from_px(width_px: f64, height_px: f64) -> Option<Self> {
        let w = px_to_subpx(width_px)?;
        let h = px_to_subpx(height_px)?;
        Self::new(w, h)
    }

    /// Cell width in whole pixels (truncated).
    #[must_use]
    pub const fn width_px(&self) -> u32 {
        self.width_subpx / SUBPX_SCALE
    }

    /// Cell height in whole pixels (truncated).
    #[must_use]
    pub const fn height_px(&self) -> u32 {
        self.height_subpx / SUBPX_SCALE
    }

    /// Hardcoded fallback for when measurement is implausible: 8x17 px,
    /// a typical monospace cell at UI font sizes.
    pub const FALLBACK: Self = Self {
        width_subpx: 8 * SUBPX_SCALE,
        height_subpx: 17 * SUBPX_SCALE,
    };
}

impl Default for GlyphMetrics {
    fn default() -> Self {
        Self::FALLBACK
    }
}

impl fmt::Display for GlyphMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.2}x{:.2}px",
            f64::from(self.width_subpx) / f64::from(SUBPX_SCALE),
            f64::from(self.height_subpx) / f64::from(SUBPX_SCALE),
        )
    }
}

// ---------------------------------------------------------------------------
// MetricsPolicy
// ---------------------------------------------------------------------------

/// Injectable constants for metric derivation.
///
/// These used to be free-floating module constants; carrying them in a
/// policy struct lets tests pin every threshold deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsPolicy {
    /// Lower bound of the plausible per-cell width envelope, sub-pixel.
    pub plausible_min_subpx: u32,
    /// Upper bound of the plausible per-cell width envelope, sub-pixel.
    pub plausible_max_subpx: u32,
    /// Metrics substituted when the measured width is out of envelope.
    pub fallback: GlyphMetrics,
    /// Cell height as a percentage of font size (120 = 1.2x).
    pub line_height_pct: u32,
}

impl Default for MetricsPolicy {
    fn default() -> Self {
        Self {
            // 6..=12px covers monospace fonts at typical UI sizes; a width
            // outside this envelope means the probe raced a font load.
            plausible_min_subpx: 6 * SUBPX_SCALE,
            plausible_max_subpx: 12 * SUBPX_SCALE,
            fallback: GlyphMetrics::FALLBACK,
            line_height_pct: 120,
        }
    }
}

// ---------------------------------------------------------------------------
// ProbeSample and derivation
// ---------------------------------------------------------------------------

/// Raw numbers from one DOM glyph probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSample {
    /// Rendered width of the whole glyph run, sub-pixel.
    pub run_width_subpx: u32,
    /// How many identical characters the run contained.
    pub repeat_count: u32,
    /// Font size the run was rendered at, sub-pixel.
    pub font_size_subpx: u32,
}

impl ProbeSample {
    /// Build a sample from floating-point pixel measurements.
    ///
    /// Returns `None` for invalid measurements (non-finite, negative,
    /// zero repetitions, zero font size).
    #[must_use]
    pub fn from_px(run_width_px: f64, repeat_count: u32, font_size_px: f64) -> Option<Self> {
        if repeat_count == 0 {
            return None;
        }
        let run_width_subpx = px_to_subpx(run_width_px)?;
        let font_size_subpx = px_to_subpx(font_size_px)?;
        if font_size_subpx == 0 {
            return None;
        }
        Some(Self {
            run_width_subpx,
            repeat_count,
            font_size_subpx,
        })
    }
}

/// Derive validated cell metrics from a probe sample.
///
/// Width is the run width divided by the repetition count, rounded to the
/// nearest sub-pixel unit. Height is `font_size * line_height_pct / 100`,
/// never measured. A width outside the policy's plausible envelope is
/// replaced wholesale by the policy fallback.
#[must_use]
pub fn derive_metrics(sample: ProbeSample, policy: &MetricsPolicy) -> GlyphMetrics {
    if sample.repeat_count == 0 {
        warn!("glyph probe sample with zero repeat count, using fallback");
        return policy.fallback;
    }

    let half = u64::from(sample.repeat_count) / 2;
    let width_subpx = ((u64::from(sample.run_width_subpx) + half)
        / u64::from(sample.repeat_count))
    .min(u64::from(u32::MAX)) as u32;

    if width_subpx < policy.plausible_min_subpx || width_subpx > policy.plausible_max_subpx {
        warn!(
            width_subpx,
            min = policy.plausible_min_subpx,
            max = policy.plausible_max_subpx,
            "measured glyph width out of plausible envelope, using fallback"
        );
        return policy.fallback;
    }

    let height_subpx = (u64::from(sample.font_size_subpx) * u64::from(policy.line_height_pct)
        / 100)
        .min(u64::from(u32::MAX)) as u32;

    GlyphMetrics::new(width_subpx, height_subpx).unwrap_or(policy.fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn px_to_subpx_basic() {
        assert_eq!(px_to_subpx(0.0), Some(0));
        assert_eq!(px_to_subpx(1.0), Some(256));
        assert_eq!(px_to_subpx(8.4), Some(2150)); // 8.4 * 256 = 2150.4 -> 2150
        assert_eq!(px_to_subpx(0.5), Some(128));
    }

    #[test]
    fn px_to_subpx_rejects_invalid() {
        assert_eq!(px_to_subpx(-1.0), None);
        assert_eq!(px_to_subpx(f64::NAN), None);
        assert_eq!(px_to_subpx(f64::INFINITY), None);
    }

    #[test]
    fn metrics_rejects_zero_dimensions() {
        assert!(GlyphMetrics::new(0, 256).is_none());
        assert!(GlyphMetrics::new(256, 0).is_none());
    }

    #[test]
    fn metrics_fallback_is_8x17() {
        assert_eq!(GlyphMetrics::FALLBACK.width_px(), 8);
        assert_eq!(GlyphMetrics::FALLBACK.height_px(), 17);
        assert_eq!(GlyphMetrics::default(), GlyphMetrics::FALLBACK);
    }

    #[test]
    fn metrics_display() {
        let m = GlyphMetrics::from_px(8.5, 17.0).unwrap();
        assert_eq!(format!("{m}"), "8.50x17.00px");
    }

    #[test]
    fn probe_sample_from_px_validates() {
        assert!(ProbeSample::from_px(840.0, 100, 14.0).is_some());
        assert!(ProbeSample::from_px(840.0, 0, 14.0).is_none());
        assert!(ProbeSample::from_px(840.0, 100, 0.0).is_none());
        assert!(ProbeSample::from_px(-1.0, 100, 14.0).is_none());
        assert!(ProbeSample::from_px(f64::NAN, 100, 14.0).is_none());
    }

    #[test]
    fn derive_in_envelope_divides_run_width() {
        // 100 repetitions at 8.4px each -> 840px run.
        let sample = ProbeSample::from_px(840.0, 100, 14.0).unwrap();
        let m = derive_metrics(sample, &MetricsPolicy::default());
        // 840 * 256 = 215040; / 100 = 2150.4 -> rounds to 2150
        assert_eq!(m.width_subpx, 2150);
    }

    #[test]
    fn derive_height_is_multiple_of_font_size() {
        let sample = ProbeSample::from_px(840.0, 100, 14.0).unwrap();
        let m = derive_metrics(sample, &MetricsPolicy::default());
        // 14px * 1.2 = 16.8px = 4300.8 subpx -> 4300 (14*256*120/100)
        assert_eq!(m.height_subpx, 14 * 256 * 120 / 100);
    }

    #[test]
    fn derive_rejects_too_narrow_width() {
        // 3px per char: a proportional fallback font was still active.
        let sample = ProbeSample::from_px(300.0, 100, 14.0).unwrap();
        let policy = MetricsPolicy::default();
        assert_eq!(derive_metrics(sample, &policy), policy.fallback);
    }

    #[test]
    fn derive_rejects_too_wide_width() {
        let sample = ProbeSample::from_px(2000.0, 100, 14.0).unwrap();
        let policy = MetricsPolicy::default();
        assert_eq!(derive_metrics(sample, &policy), policy.fallback);
    }

    #[test]
    fn derive_respects_custom_envelope() {
        let sample = ProbeSample::from_px(300.0, 100, 14.0).unwrap();
        let policy = MetricsPolicy {
            plausible_min_subpx: 2 * SUBPX_SCALE,
            ..MetricsPolicy::default()
        };
        let m = derive_metrics(sample, &policy);
        assert_eq!(m.width_subpx, 3 * SUBPX_SCALE);
    }

    #[test]
    fn derive_envelope_boundaries_inclusive() {
        let policy = MetricsPolicy::default();
        let at_min = ProbeSample::from_px(600.0, 100, 14.0).unwrap();
        assert_eq!(
            derive_metrics(at_min, &policy).width_subpx,
            6 * SUBPX_SCALE
        );
        let at_max = ProbeSample::from_px(1200.0, 100, 14.0).unwrap();
        assert_eq!(
            derive_metrics(at_max, &policy).width_subpx,
            12 * SUBPX_SCALE
        );
    }

    #[test]
    fn derive_deterministic_across_calls() {
        let sample = ProbeSample::from_px(841.7, 100, 14.0).unwrap();
        let policy = MetricsPolicy::default();
        assert_eq!(
            derive_metrics(sample, &policy),
            derive_metrics(sample, &policy)
        );
    }
}
