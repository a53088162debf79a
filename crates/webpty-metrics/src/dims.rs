//! Container box to terminal grid dimensions.
//!
//! Naively dividing container width by cell width overestimates columns:
//! scrollbar width, the widget's internal viewport padding, and sub-pixel
//! rounding in its renderer all eat horizontal space. Any overestimate makes
//! the remote PTY wrap a line one column before the browser does, which
//! corrupts cursor-relative redraws in shells, editors, and TUIs. The
//! calculation here therefore biases toward fewer columns:
//!
//! 1. subtract a fixed horizontal margin from the container width,
//! 2. inflate the effective cell width by a small percentage,
//! 3. subtract a fixed column count as a final buffer,
//! 4. clamp against a runaway ceiling (corrupt metrics) and against the
//!    hard floor (degenerate PTY).
//!
//! Containers below the minimum usable size get the documented 80x24
//! default instead of degenerate values; callers retry on the next resize.

use std::fmt;

use crate::glyph::{GlyphMetrics, SUBPX_SCALE};

// ---------------------------------------------------------------------------
// GridDimensions
// ---------------------------------------------------------------------------

/// A terminal grid size in whole cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridDimensions {
    /// Grid columns.
    pub cols: u16,
    /// Grid rows.
    pub rows: u16,
}

impl GridDimensions {
    /// Create a grid size.
    #[must_use]
    pub const fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }

    /// The conventional terminal default.
    pub const DEFAULT_80X24: Self = Self { cols: 80, rows: 24 };
}

impl fmt::Display for GridDimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

// ---------------------------------------------------------------------------
// ContainerBox
// ---------------------------------------------------------------------------

/// A container's client box in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerBox {
    /// Client width in CSS pixels.
    pub width_px: u32,
    /// Client height in CSS pixels.
    pub height_px: u32,
}

impl ContainerBox {
    /// Create a container box.
    #[must_use]
    pub const fn new(width_px: u32, height_px: u32) -> Self {
        Self {
            width_px,
            height_px,
        }
    }
}

impl fmt::Display for ContainerBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}px", self.width_px, self.height_px)
    }
}

// ---------------------------------------------------------------------------
// DimensionPolicy
// ---------------------------------------------------------------------------

/// Injectable safety margins and floors for the dimension calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimensionPolicy {
    /// Fixed horizontal subtraction: scrollbar + viewport padding +
    /// rounding buffer, CSS pixels.
    pub horizontal_margin_px: u32,
    /// Percentage inflation applied to the cell width before dividing.
    pub width_inflation_pct: u32,
    /// Columns subtracted after division as a final buffer.
    pub column_buffer: u16,
    /// Hard floor for columns.
    pub min_cols: u16,
    /// Hard floor for rows.
    pub min_rows: u16,
    /// Containers narrower than this get the default grid.
    pub min_usable_width_px: u32,
    /// Containers shorter than this get the default grid.
    pub min_usable_height_px: u32,
    /// Grid returned for unusably small containers.
    pub default_dims: GridDimensions,
    /// Narrowest cell width considered physically possible; caps columns
    /// at `width / this` even when metrics are corrupt.
    pub min_plausible_width_subpx: u32,
}

impl Default for DimensionPolicy {
    fn default() -> Self {
        Self {
            horizontal_margin_px: 16,
            width_inflation_pct: 2,
            column_buffer: 2,
            min_cols: 40,
            min_rows: 10,
            min_usable_width_px: 200,
            min_usable_height_px: 150,
            default_dims: GridDimensions::DEFAULT_80X24,
            min_plausible_width_subpx: 6 * SUBPX_SCALE,
        }
    }
}

// ---------------------------------------------------------------------------
// calculate
// ---------------------------------------------------------------------------

/// Compute a safe grid size for a container box and cell metrics.
///
/// Integer-only arithmetic on sub-pixel units; the same inputs always
/// produce the same grid.
#[must_use]
pub fn calculate(
    container: ContainerBox,
    metrics: &GlyphMetrics,
    policy: &DimensionPolicy,
) -> GridDimensions {
    if container.width_px < policy.min_usable_width_px
        || container.height_px < policy.min_usable_height_px
    {
        return policy.default_dims;
    }

    let usable_w_subpx = u64::from(container.width_px.saturating_sub(policy.horizontal_margin_px))
        * u64::from(SUBPX_SCALE);

    let inflated_w_subpx = (u64::from(metrics.width_subpx)
        * u64::from(100 + policy.width_inflation_pct)
        / 100)
        .max(1);

    let raw_cols = usable_w_subpx / inflated_w_subpx;
    let cols = raw_cols.saturating_sub(u64::from(policy.column_buffer));

    // Runaway ceiling: no real monospace cell is narrower than the
    // plausible minimum, so columns can never exceed width / that minimum.
    let ceiling = u64::from(container.width_px) * u64::from(SUBPX_SCALE)
        / u64::from(policy.min_plausible_width_subpx.max(1));
    let cols = cols
        .min(ceiling)
        .max(u64::from(policy.min_cols))
        .min(u64::from(u16::MAX)) as u16;

    let raw_rows = u64::from(container.height_px) * u64::from(SUBPX_SCALE)
        / u64::from(metrics.height_subpx.max(1));
    let rows = raw_rows
        .max(u64::from(policy.min_rows))
        .min(u64::from(u16::MAX)) as u16;

    GridDimensions { cols, rows }
}
