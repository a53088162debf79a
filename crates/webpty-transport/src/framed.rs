//! Framed-text wire protocol: raw bytes plus a sentinel resize frame.
//!
//! Every message on the socket is either terminal I/O bytes (both
//! directions) or the client-to-server control frame
//! `__RESIZE__:<cols>:<rows>`. There is no other framing: the server
//! distinguishes control from data purely by the literal prefix. An output
//! stream that happened to start with the literal would be misinterpreted
//! server-side; that collision is an accepted limitation of the protocol,
//! traded for zero per-byte overhead. The client never interprets inbound
//! frames as control, so inbound data containing the literal is safe.
//!
//! This variant does not trust the widget's fit: dimensions are recomputed
//! through the safety-margin calculator so the PTY can never wrap a line
//! the browser didn't.

use tracing::{debug, trace, warn};
use webpty_metrics::{ContainerBox, DimensionPolicy, GlyphMetrics, GridDimensions, calculate};
use webpty_surface::TerminalSurface;

use crate::adapter::{TransportAdapter, TransportError};
use crate::debounce::ResizeDebouncer;
use crate::port::{CLOSE_NORMAL, SocketEvent, SocketPort};

/// Literal prefix marking a client-to-server resize control frame.
pub const RESIZE_PREFIX: &str = "__RESIZE__:";

/// Notice appended to the terminal after an abnormal close.
pub const DISCONNECT_NOTICE: &str = "connection closed";

/// Encode a resize control frame.
#[must_use]
pub fn encode_resize_frame(dims: GridDimensions) -> String {
    format!("{RESIZE_PREFIX}{}:{}", dims.cols, dims.rows)
}

/// Parse a resize control frame, strictly.
///
/// Returns `None` unless the text is exactly the prefix followed by two
/// positive decimal fields. Servers call this on every inbound text frame;
/// anything that does not parse is terminal input, not control.
#[must_use]
pub fn parse_resize_frame(text: &str) -> Option<GridDimensions> {
    let rest = text.strip_prefix(RESIZE_PREFIX)?;
    let mut fields = rest.split(':');
    let cols: u16 = fields.next()?.parse().ok()?;
    let rows: u16 = fields.next()?.parse().ok()?;
    if fields.next().is_some() || cols == 0 || rows == 0 {
        return None;
    }
    Some(GridDimensions { cols, rows })
}

/// Adapter for the framed-text protocol.
#[derive(Debug)]
pub struct FramedTextAdapter {
    metrics: GlyphMetrics,
    policy: DimensionPolicy,
    debouncer: ResizeDebouncer<ContainerBox>,
    container: Option<ContainerBox>,
    open: bool,
}

impl FramedTextAdapter {
    /// Create an adapter with the measured glyph metrics and dimension
    /// policy it will calculate against.
    #[must_use]
    pub fn new(metrics: GlyphMetrics, policy: DimensionPolicy, quiet_ms: u64) -> Self {
        Self {
            metrics,
            policy,
            debouncer: ResizeDebouncer::new(quiet_ms),
            container: None,
            open: false,
        }
    }

    /// Whether the socket is currently open from this adapter's view.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    fn current_dims(&self) -> GridDimensions {
        match self.container {
            Some(container) => calculate(container, &self.metrics, &self.policy),
            None => self.policy.default_dims,
        }
    }

    fn apply_resize(
        &mut self,
        dims: GridDimensions,
        surface: &mut TerminalSurface,
        port: &mut dyn SocketPort,
    ) -> Result<(), TransportError> {
        surface.resize(dims)?;
        if self.open {
            port.send_text(&encode_resize_frame(dims));
            trace!(%dims, "sent resize control frame");
        }
        Ok(())
    }
}

impl TransportAdapter for FramedTextAdapter {
    fn on_socket_event(
        &mut self,
        _now_ms: u64,
        event: SocketEvent,
        surface: &mut TerminalSurface,
        port: &mut dyn SocketPort,
    ) -> Result<(), TransportError> {
        match event {
            SocketEvent::Opened => {
                self.open = true;
                // Reset happens-before the first transport byte; the
                // resize frame goes out before any application data so the
                // server sizes its PTY before spawning or redrawing.
                surface.begin_session()?;
                let dims = self.current_dims();
                self.apply_resize(dims, surface, port)?;
                debug!(%dims, "framed-text session handshake complete");
                Ok(())
            }
            SocketEvent::Binary(bytes) => {
                surface.write_output(&bytes)?;
                Ok(())
            }
            SocketEvent::Text(text) => {
                // Server-to-client frames are raw output bytes only.
                surface.write_output(text.as_bytes())?;
                Ok(())
            }
            SocketEvent::Closed { code, clean } => {
                let was_open = self.open;
                self.open = false;
                self.debouncer.cancel();
                if was_open && !clean {
                    warn!(code, "framed-text socket closed abnormally");
                    surface.write_notice(DISCONNECT_NOTICE)?;
                }
                Ok(())
            }
            SocketEvent::Errored(message) => {
                warn!(message, "framed-text socket error");
                Ok(())
            }
        }
    }

    fn send_input(&mut self, bytes: &[u8], port: &mut dyn SocketPort) {
        if !self.open {
            trace!(len = bytes.len(), "dropping input while socket closed");
            return;
        }
        port.send_binary(bytes);
    }

    fn push_resize(&mut self, now_ms: u64, container: ContainerBox) {
        self.container = Some(container);
        self.debouncer.push(container, now_ms);
    }

    fn update_metrics(&mut self, metrics: GlyphMetrics) {
        debug!(%metrics, "glyph metrics replaced");
        self.metrics = metrics;
    }

    fn tick(
        &mut self,
        now_ms: u64,
        surface: &mut TerminalSurface,
        port: &mut dyn SocketPort,
    ) -> Result<(), TransportError> {
        if let Some(container) = self.debouncer.poll(now_ms) {
            let dims = calculate(container, &self.metrics, &self.policy);
            self.apply_resize(dims, surface, port)?;
        }
        Ok(())
    }

    fn disconnect(&mut self, port: &mut dyn SocketPort) {
        self.debouncer.cancel();
        if self.open {
            self.open = false;
            port.close(CLOSE_NORMAL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{RecordingPort, SentFrame};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use webpty_surface::SurfaceOptions;
    use webpty_surface::recording::{RecordingHandle, RecordingWidget};

    fn surface() -> (TerminalSurface, RecordingHandle) {
        let (widget, handle) = RecordingWidget::new();
        (
            TerminalSurface::new(Box::new(widget), SurfaceOptions::default()),
            handle,
        )
    }

    fn adapter() -> FramedTextAdapter {
        FramedTextAdapter::new(
            GlyphMetrics::from_px(8.0, 16.0).unwrap(),
            DimensionPolicy::default(),
            200,
        )
    }

    fn opened(
        a: &mut FramedTextAdapter,
        s: &mut TerminalSurface,
        p: &mut RecordingPort,
    ) {
        a.on_socket_event(0, SocketEvent::Opened, s, p).unwrap();
    }

    #[test]
    fn encode_parse_round_trip() {
        let dims = GridDimensions::new(120, 40);
        assert_eq!(encode_resize_frame(dims), "__RESIZE__:120:40");
        assert_eq!(parse_resize_frame("__RESIZE__:120:40"), Some(dims));
    }

    #[test]
    fn parse_rejects_malformed_frames() {
        for text in [
            "RESIZE:80:24",
            "__RESIZE__:80",
            "__RESIZE__:80:24:1",
            "__RESIZE__:0:24",
            "__RESIZE__:80:0",
            "__RESIZE__:eighty:24",
            "__RESIZE__:80:24 ",
            "__RESIZE__:-80:24",
            "ls -la",
            "",
        ] {
            assert_eq!(parse_resize_frame(text), None, "accepted {text:?}");
        }
    }

    #[test]
    fn handshake_resets_then_sends_resize_before_data() {
        let (mut s, handle) = surface();
        let mut p = RecordingPort::new();
        let mut a = adapter();
        a.push_resize(0, ContainerBox::new(816, 480));
        opened(&mut a, &mut s, &mut p);

        assert_eq!(handle.resets(), 1);
        // 816 - 16 margin = 800; 800 / (8 * 1.02) = 98 -> minus buffer = 96
        let expected = GridDimensions::new(96, 30);
        assert_eq!(handle.resizes(), vec![(96, 30)]);
        assert_eq!(
            p.sent.first(),
            Some(&SentFrame::Text(encode_resize_frame(expected)))
        );
    }

    #[test]
    fn handshake_without_container_uses_default_dims() {
        let (mut s, _handle) = surface();
        let mut p = RecordingPort::new();
        let mut a = adapter();
        opened(&mut a, &mut s, &mut p);
        assert_eq!(p.texts(), vec!["__RESIZE__:80:24".to_string()]);
    }

    #[test]
    fn local_resize_matches_wire_resize() {
        let (mut s, _handle) = surface();
        let mut p = RecordingPort::new();
        let mut a = adapter();
        opened(&mut a, &mut s, &mut p);
        a.push_resize(1000, ContainerBox::new(1000, 600));
        a.tick(1200, &mut s, &mut p).unwrap();

        let frame = p.texts().last().cloned().unwrap();
        let wire = parse_resize_frame(&frame).unwrap();
        assert_eq!(s.dimensions(), Some(wire));
    }

    #[test]
    fn updated_metrics_drive_subsequent_fits() {
        let (mut s, _handle) = surface();
        let mut p = RecordingPort::new();
        let mut a = adapter();
        opened(&mut a, &mut s, &mut p);

        // A large-font probe lands: the same container must now yield a
        // smaller grid than the construction-time metrics gave.
        let probed = GlyphMetrics::from_px(12.0, 24.0).unwrap();
        a.update_metrics(probed);
        a.push_resize(0, ContainerBox::new(1000, 600));
        a.tick(200, &mut s, &mut p).unwrap();

        let container = ContainerBox::new(1000, 600);
        let policy = DimensionPolicy::default();
        let expected = calculate(container, &probed, &policy);
        let stale = calculate(container, &GlyphMetrics::from_px(8.0, 16.0).unwrap(), &policy);
        assert_ne!(expected, stale);
        assert_eq!(p.texts().last().unwrap(), &encode_resize_frame(expected));
        assert_eq!(s.dimensions(), Some(expected));
    }

    #[test]
    fn resize_burst_collapses_to_one_frame_with_last_dims() {
        let (mut s, _handle) = surface();
        let mut p = RecordingPort::new();
        let mut a = adapter();
        opened(&mut a, &mut s, &mut p);
        let frames_after_handshake = p.texts().len();

        for i in 0..10u32 {
            a.push_resize(u64::from(i) * 10, ContainerBox::new(600 + i * 40, 600));
            a.tick(u64::from(i) * 10, &mut s, &mut p).unwrap();
        }
        a.tick(90 + 200, &mut s, &mut p).unwrap();

        let texts = p.texts();
        assert_eq!(texts.len(), frames_after_handshake + 1);
        // Only the last container of the burst survives: 960px wide.
        let expected = calculate(
            ContainerBox::new(960, 600),
            &GlyphMetrics::from_px(8.0, 16.0).unwrap(),
            &DimensionPolicy::default(),
        );
        assert_eq!(texts.last().unwrap(), &encode_resize_frame(expected));
    }

    #[test]
    fn inbound_frames_are_written_verbatim() {
        let (mut s, handle) = surface();
        let mut p = RecordingPort::new();
        let mut a = adapter();
        opened(&mut a, &mut s, &mut p);

        a.on_socket_event(0, SocketEvent::Binary(b"\x1b[2Jhello".to_vec()), &mut s, &mut p)
            .unwrap();
        // Inbound text is data too, even when it looks like the sentinel:
        // the client side never treats inbound frames as control.
        a.on_socket_event(
            0,
            SocketEvent::Text("__RESIZE__:10:10".to_string()),
            &mut s,
            &mut p,
        )
        .unwrap();

        let written = handle.written_bytes();
        let tail = &written[written.len() - (9 + 16)..];
        assert_eq!(tail, b"\x1b[2Jhello__RESIZE__:10:10".as_slice());
    }

    #[test]
    fn input_forwarded_verbatim_while_open_dropped_while_closed() {
        let (mut s, _handle) = surface();
        let mut p = RecordingPort::new();
        let mut a = adapter();

        a.send_input(b"early", &mut p);
        assert!(p.binaries().is_empty());

        opened(&mut a, &mut s, &mut p);
        a.send_input(b"ls\r", &mut p);
        assert_eq!(p.binaries(), vec![b"ls\r".to_vec()]);
    }

    #[test]
    fn abnormal_close_writes_notice_exactly_once() {
        let (mut s, handle) = surface();
        let mut p = RecordingPort::new();
        let mut a = adapter();
        opened(&mut a, &mut s, &mut p);

        a.on_socket_event(0, SocketEvent::Closed { code: 1006, clean: false }, &mut s, &mut p)
            .unwrap();
        // A stray duplicate close event must not duplicate the notice.
        a.on_socket_event(0, SocketEvent::Closed { code: 1006, clean: false }, &mut s, &mut p)
            .unwrap();

        let written = String::from_utf8(handle.written_bytes()).unwrap();
        assert_eq!(written.matches(DISCONNECT_NOTICE).count(), 1);
    }

    #[test]
    fn clean_close_is_silent() {
        let (mut s, handle) = surface();
        let mut p = RecordingPort::new();
        let mut a = adapter();
        opened(&mut a, &mut s, &mut p);
        let writes_before = handle.writes().len();

        a.on_socket_event(0, SocketEvent::Closed { code: 1000, clean: true }, &mut s, &mut p)
            .unwrap();
        assert_eq!(handle.writes().len(), writes_before);
    }

    #[test]
    fn close_cancels_pending_resize() {
        let (mut s, _handle) = surface();
        let mut p = RecordingPort::new();
        let mut a = adapter();
        opened(&mut a, &mut s, &mut p);
        let frames_after_handshake = p.texts().len();

        a.push_resize(0, ContainerBox::new(900, 500));
        a.on_socket_event(10, SocketEvent::Closed { code: 1000, clean: true }, &mut s, &mut p)
            .unwrap();
        a.tick(1000, &mut s, &mut p).unwrap();
        assert_eq!(p.texts().len(), frames_after_handshake);
    }

    #[test]
    fn disconnect_closes_normally_once() {
        let (mut s, _handle) = surface();
        let mut p = RecordingPort::new();
        let mut a = adapter();
        opened(&mut a, &mut s, &mut p);

        a.disconnect(&mut p);
        a.disconnect(&mut p);
        assert_eq!(p.closes(), vec![CLOSE_NORMAL]);
        assert!(!a.is_open());
    }

    proptest! {
        #[test]
        fn any_valid_dims_survive_the_wire(cols in 1u16.., rows in 1u16..) {
            let dims = GridDimensions { cols, rows };
            prop_assert_eq!(
                parse_resize_frame(&encode_resize_frame(dims)),
                Some(dims)
            );
        }
    }
}
