#![forbid(unsafe_code)]

//! Deterministic glyph metrics and grid dimension calculation.
//!
//! This crate owns the two leaf computations of the embedded-terminal
//! pipeline:
//!
//! - [`glyph`]: turn a raw DOM probe sample (rendered width of a glyph run)
//!   into validated per-cell metrics, with a sanity envelope guarding
//!   against font-load races.
//! - [`dims`]: turn a container's pixel box plus cell metrics into a safe
//!   `(cols, rows)` pair the remote PTY can be resized to without the PTY
//!   wrapping lines one column before the browser does.
//!
//! # Determinism
//!
//! All pixel-to-cell conversions use fixed-point arithmetic (256 sub-pixel
//! units per pixel) so the same probe sample and container box always yield
//! the same grid, regardless of platform FPU behavior.

pub mod dims;
pub mod glyph;

pub use dims::{ContainerBox, DimensionPolicy, GridDimensions, calculate};
pub use glyph::{GlyphMetrics, MetricsPolicy, ProbeSample, SUBPX_SCALE, derive_metrics};
