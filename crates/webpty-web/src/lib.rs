#![forbid(unsafe_code)]

//! Browser binding for the embedded terminal.
//!
//! The deterministic core lives in the `webpty` crate; this crate supplies
//! the pieces only a browser can: probing rendered glyph sizes from the
//! DOM, a [`SocketPort`](webpty::SocketPort) backed by a real `WebSocket`,
//! a `ResizeObserver` feeding the client, and the animation-frame deferral
//! of the first fit. All of that is gated to `wasm32`; the helpers here are
//! pure and natively testable.

use webpty_metrics::{GlyphMetrics, MetricsPolicy, ProbeSample, derive_metrics};

#[cfg(target_arch = "wasm32")]
pub mod wasm;

/// How many copies of the probe glyph are rendered per measurement.
///
/// Measuring a long run and dividing by its length averages away the
/// sub-pixel jitter a single glyph's bounding box shows across platforms.
pub const PROBE_REPEAT: u32 = 64;

/// The glyph rendered by the probe. `W` is the widest Latin glyph in most
/// fonts; in a true monospace font every glyph has the same advance, so a
/// run of it detects proportional fallback fonts loudly.
pub const PROBE_GLYPH: char = 'W';

/// Ceiling on waiting for the web font load signal before probing anyway.
pub const FONT_LOAD_TIMEOUT_MS: u32 = 3_000;

/// Text content for the probe node.
#[must_use]
pub fn probe_text() -> String {
    std::iter::repeat_n(PROBE_GLYPH, PROBE_REPEAT as usize).collect()
}

/// CSS `font` shorthand for the probe node and the widget, so both render
/// with the identical font stack.
#[must_use]
pub fn font_shorthand(font_size_px: u32, font_family: &str) -> String {
    format!("{font_size_px}px {font_family}")
}

/// Convert a measured probe-run bounding box into validated cell metrics.
///
/// Falls back to the policy's defaults when the run width is degenerate
/// (zero, NaN) or the per-glyph width lands outside the plausible
/// monospace envelope.
#[must_use]
pub fn metrics_from_probe(
    run_width_px: f64,
    font_size_px: u32,
    policy: &MetricsPolicy,
) -> GlyphMetrics {
    match ProbeSample::from_px(run_width_px, PROBE_REPEAT, f64::from(font_size_px)) {
        Some(sample) => derive_metrics(sample, policy),
        None => policy.fallback,
    }
}

/// Whether a websocket close code counts as a clean shutdown.
///
/// 1000 is normal closure; 1001 is "going away" (tab closed, navigation),
/// which is routine in a browser and must not produce a disconnect notice.
#[must_use]
pub fn is_clean_close(code: u16) -> bool {
    code == webpty_transport::CLOSE_NORMAL || code == webpty_transport::CLOSE_GOING_AWAY
}
