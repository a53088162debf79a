//! The transport contract shared by both wire protocols.

use std::fmt;

use webpty_metrics::{ContainerBox, GlyphMetrics};
use webpty_surface::{SurfaceError, TerminalSurface};

use crate::port::{SocketEvent, SocketPort};

/// Which wire protocol a client speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransportKind {
    /// Raw bytes plus the `__RESIZE__:` sentinel control frame.
    #[default]
    FramedText,
    /// Named JSON events (`pty-input`, `pty-output`, `resize`, `pty-exit`).
    TypedEvent,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FramedText => write!(f, "framed_text"),
            Self::TypedEvent => write!(f, "typed_event"),
        }
    }
}

/// Adapter failures surfaced to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The surface rejected an operation (disposed mid-callback).
    Surface(SurfaceError),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Surface(err) => write!(f, "surface error: {err}"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<SurfaceError> for TransportError {
    fn from(err: SurfaceError) -> Self {
        Self::Surface(err)
    }
}

/// One protocol variant driving one surface over one socket.
///
/// Implementations are passive: the host delivers socket events, input
/// bytes, container boxes, and clock ticks; the adapter decides what to
/// write to the surface and send through the port. Exactly one adapter may
/// drive a surface at a time — the controller tears the previous session
/// down before starting a new one.
pub trait TransportAdapter {
    /// Handle a socket lifecycle or data event.
    ///
    /// On `Opened` the adapter must run the session handshake: reset the
    /// surface, then transmit dimensions before any application data.
    fn on_socket_event(
        &mut self,
        now_ms: u64,
        event: SocketEvent,
        surface: &mut TerminalSurface,
        port: &mut dyn SocketPort,
    ) -> Result<(), TransportError>;

    /// Forward keystroke bytes from the surface to the server.
    fn send_input(&mut self, bytes: &[u8], port: &mut dyn SocketPort);

    /// Record a container resize; propagation is debounced.
    fn push_resize(&mut self, now_ms: u64, container: ContainerBox);

    /// Install freshly probed glyph metrics.
    ///
    /// Called once the DOM probe completes (and again if a late font load
    /// triggers a re-probe). Variants that size from their own fit routine
    /// instead of the calculator may ignore it.
    fn update_metrics(&mut self, metrics: GlyphMetrics);

    /// Advance the adapter's clock, flushing any due resize.
    fn tick(
        &mut self,
        now_ms: u64,
        surface: &mut TerminalSurface,
        port: &mut dyn SocketPort,
    ) -> Result<(), TransportError>;

    /// Cleanly close the socket and drop pending work.
    fn disconnect(&mut self, port: &mut dyn SocketPort);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_display() {
        assert_eq!(format!("{}", TransportKind::FramedText), "framed_text");
        assert_eq!(format!("{}", TransportKind::TypedEvent), "typed_event");
        assert_eq!(TransportKind::default(), TransportKind::FramedText);
    }

    #[test]
    fn error_wraps_surface_error() {
        let err = TransportError::from(SurfaceError::Disposed);
        assert_eq!(err, TransportError::Surface(SurfaceError::Disposed));
        assert!(format!("{err}").contains("disposed"));
    }
}
