#![forbid(unsafe_code)]

//! Ownership wrapper around the embedded terminal-emulation widget.
//!
//! The widget itself (cell rendering, cursor drawing, keystroke-to-byte
//! encoding) is external; this crate owns its handle and enforces the write
//! discipline around it:
//!
//! - before a live session starts, application code may write a static
//!   welcome banner;
//! - [`TerminalSurface::begin_session`] resets the widget (clearing the
//!   banner, cursor to home) and from then on the transport is the only
//!   writer — PTY redraws are cursor-relative, so a second writer corrupts
//!   them;
//! - disposal is idempotent and terminal: every operation on a disposed
//!   surface is a structured error, never a panic.
//!
//! Keystrokes flow the other way: the host binding feeds widget byte events
//! into [`TerminalSurface::emit_input`], which fans them out to registered
//! listeners (the transport adapter, in practice exactly one).

use std::fmt;

use tracing::debug;
use webpty_metrics::GridDimensions;

pub mod recording;

// ---------------------------------------------------------------------------
// Widget contract
// ---------------------------------------------------------------------------

/// The embedded terminal-emulation widget, reduced to the four operations
/// this subsystem needs. Object-safe so hosts can supply any emulator.
pub trait TerminalWidget {
    /// Feed output bytes to the emulator for rendering.
    fn write(&mut self, bytes: &[u8]);
    /// Resize the emulator's visible grid.
    fn resize(&mut self, cols: u16, rows: u16);
    /// Clear screen and scrollback, cursor to home.
    fn reset(&mut self);
    /// Release the widget's resources. Must tolerate repeat calls.
    fn dispose(&mut self);
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Widget colors, as CSS color strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    pub background: String,
    pub foreground: String,
    pub cursor: String,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            background: "#1e1e1e".to_string(),
            foreground: "#d4d4d4".to_string(),
            cursor: "#aeafad".to_string(),
        }
    }
}

/// Configuration for a terminal surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceOptions {
    /// Widget theme.
    pub theme: Theme,
    /// Scrollback buffer length in lines.
    pub scrollback_lines: u32,
    /// Font size in CSS pixels.
    pub font_size_px: u32,
    /// Font family, as a CSS font-family list.
    pub font_family: String,
}

impl Default for SurfaceOptions {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            scrollback_lines: 1000,
            font_size_px: 14,
            font_family: "monospace".to_string(),
        }
    }
}

impl SurfaceOptions {
    /// Override the font size.
    #[must_use]
    pub fn with_font_size(mut self, px: u32) -> Self {
        self.font_size_px = px;
        self
    }

    /// Override the font family.
    #[must_use]
    pub fn with_font_family(mut self, family: impl Into<String>) -> Self {
        self.font_family = family.into();
        self
    }

    /// Override the scrollback length.
    #[must_use]
    pub fn with_scrollback(mut self, lines: u32) -> Self {
        self.scrollback_lines = lines;
        self
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Surface write-discipline violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceError {
    /// A banner write was attempted after the live session started.
    BannerAfterLive,
    /// The surface was already disposed.
    Disposed,
}

impl fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BannerAfterLive => {
                write!(f, "banner writes are not allowed once a session is live")
            }
            Self::Disposed => write!(f, "surface already disposed"),
        }
    }
}

impl std::error::Error for SurfaceError {}

// ---------------------------------------------------------------------------
// TerminalSurface
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WritePhase {
    /// Pre-session: application banner writes allowed.
    Banner,
    /// Live session: the transport is the only writer.
    Live,
}

type InputListener = Box<dyn FnMut(&[u8])>;

/// Owner of one terminal-emulation widget instance.
pub struct TerminalSurface {
    widget: Box<dyn TerminalWidget>,
    options: SurfaceOptions,
    phase: WritePhase,
    disposed: bool,
    dims: Option<GridDimensions>,
    listeners: Vec<(u64, InputListener)>,
    next_listener_id: u64,
}

impl TerminalSurface {
    /// Take ownership of a widget.
    pub fn new(widget: Box<dyn TerminalWidget>, options: SurfaceOptions) -> Self {
        Self {
            widget,
            options,
            phase: WritePhase::Banner,
            disposed: false,
            dims: None,
            listeners: Vec::new(),
            next_listener_id: 0,
        }
    }

    /// Configuration this surface was created with.
    #[must_use]
    pub fn options(&self) -> &SurfaceOptions {
        &self.options
    }

    /// Last grid size passed to [`TerminalSurface::resize`].
    #[must_use]
    pub fn dimensions(&self) -> Option<GridDimensions> {
        self.dims
    }

    /// Whether [`TerminalSurface::dispose`] has run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Write a static banner before any session starts.
    pub fn write_banner(&mut self, text: &str) -> Result<(), SurfaceError> {
        self.ensure_alive()?;
        if self.phase == WritePhase::Live {
            return Err(SurfaceError::BannerAfterLive);
        }
        self.widget.write(text.as_bytes());
        Ok(())
    }

    /// Start (or restart) a live session: reset the widget so the first
    /// transport byte lands on a clean home-positioned screen.
    ///
    /// Safe to call on every reconnect; the remote PTY state is assumed
    /// replaced, so the local grid must be too.
    pub fn begin_session(&mut self) -> Result<(), SurfaceError> {
        self.ensure_alive()?;
        self.widget.reset();
        self.phase = WritePhase::Live;
        debug!("terminal surface session started");
        Ok(())
    }

    /// Write transport-delivered output bytes.
    pub fn write_output(&mut self, bytes: &[u8]) -> Result<(), SurfaceError> {
        self.ensure_alive()?;
        self.widget.write(bytes);
        Ok(())
    }

    /// Append a visible out-of-band notice on its own line.
    pub fn write_notice(&mut self, text: &str) -> Result<(), SurfaceError> {
        self.ensure_alive()?;
        self.widget.write(b"\r\n");
        self.widget.write(text.as_bytes());
        self.widget.write(b"\r\n");
        Ok(())
    }

    /// Resize the widget grid and remember the dimensions.
    pub fn resize(&mut self, dims: GridDimensions) -> Result<(), SurfaceError> {
        self.ensure_alive()?;
        self.widget.resize(dims.cols, dims.rows);
        self.dims = Some(dims);
        Ok(())
    }

    /// Register an input listener; returns a token for
    /// [`TerminalSurface::off_input`].
    pub fn on_input(&mut self, listener: impl FnMut(&[u8]) + 'static) -> u64 {
        let id = self.next_listener_id;
        self.next_listener_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a previously registered listener. Returns whether it existed.
    pub fn off_input(&mut self, id: u64) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Number of live input listeners.
    #[must_use]
    pub fn input_listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Deliver widget keystroke bytes to all listeners.
    ///
    /// Called by the host binding; the bytes are never echoed locally —
    /// only the PTY's own echo comes back through the transport.
    pub fn emit_input(&mut self, bytes: &[u8]) {
        if self.disposed {
            return;
        }
        for (_, listener) in &mut self.listeners {
            listener(bytes);
        }
    }

    /// Dispose the widget and drop all listeners. Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.listeners.clear();
        self.widget.dispose();
        debug!("terminal surface disposed");
    }

    fn ensure_alive(&self) -> Result<(), SurfaceError> {
        if self.disposed {
            return Err(SurfaceError::Disposed);
        }
        Ok(())
    }
}

impl fmt::Debug for TerminalSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminalSurface")
            .field("phase", &self.phase)
            .field("disposed", &self.disposed)
            .field("dims", &self.dims)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}
