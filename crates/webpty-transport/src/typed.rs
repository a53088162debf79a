//! Typed-event wire protocol: named JSON events over a reconnecting socket.
//!
//! Four events, tagged by an `event` field:
//!
//! - `pty-input {input}` — client to server, keystroke text;
//! - `pty-output {output}` — server to client, terminal output;
//! - `resize {cols, rows}` — client to server, grid dimensions;
//! - `pty-exit {reason}` — server to client, child process ended.
//!
//! Unlike the framed variant, this adapter trusts the dimensions the
//! widget's own fit routine reports instead of the safety-margin
//! calculator — a small off-by-one wrapping risk accepted for simplicity,
//! since the reconnecting socket layer masks transient mismatches anyway.
//!
//! Reconnection itself belongs to that socket layer (bounded attempts,
//! fixed backoff). The adapter only guarantees that every `Opened` —
//! first connect or reconnect alike — re-runs the reset-plus-resize
//! handshake, because the remote PTY state is assumed replaced.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};
use webpty_metrics::{ContainerBox, GlyphMetrics, GridDimensions};
use webpty_surface::TerminalSurface;

use crate::adapter::{TransportAdapter, TransportError};
use crate::debounce::ResizeDebouncer;
use crate::port::{CLOSE_NORMAL, SocketEvent, SocketPort};

/// One wire event, in either direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum WireEvent {
    /// Keystroke text, client to server.
    PtyInput {
        /// Raw input, UTF-8.
        input: String,
    },
    /// Terminal output, server to client.
    PtyOutput {
        /// Raw output, UTF-8.
        output: String,
    },
    /// Grid dimensions, client to server.
    Resize {
        /// Columns.
        cols: u16,
        /// Rows.
        rows: u16,
    },
    /// Child process ended, server to client.
    PtyExit {
        /// Human-readable exit reason, if the server knows one.
        #[serde(default)]
        reason: Option<String>,
    },
}

/// Encode a wire event as a JSON text frame.
#[must_use]
pub fn encode_event(event: &WireEvent) -> String {
    // Serialization of these enum payloads cannot fail.
    serde_json::to_string(event).unwrap_or_default()
}

/// Decode a JSON text frame into a wire event.
pub fn decode_event(text: &str) -> Result<WireEvent, serde_json::Error> {
    serde_json::from_str(text)
}

/// The widget's own fit routine: container box in, grid dimensions out.
pub type FitFn = Box<dyn FnMut(ContainerBox) -> GridDimensions>;

/// Adapter for the typed-event protocol.
pub struct TypedEventAdapter {
    fit: FitFn,
    debouncer: ResizeDebouncer<ContainerBox>,
    container: Option<ContainerBox>,
    open: bool,
}

impl TypedEventAdapter {
    /// Create an adapter around the widget's fit routine.
    #[must_use]
    pub fn new(fit: FitFn, quiet_ms: u64) -> Self {
        Self {
            fit,
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

    fn fitted_dims(&mut self) -> GridDimensions {
        match self.container {
            Some(container) => (self.fit)(container),
            None => GridDimensions::DEFAULT_80X24,
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
            port.send_text(&encode_event(&WireEvent::Resize {
                cols: dims.cols,
                rows: dims.rows,
            }));
            trace!(%dims, "sent resize event");
        }
        Ok(())
    }

    fn handle_wire_event(
        &mut self,
        event: WireEvent,
        surface: &mut TerminalSurface,
    ) -> Result<(), TransportError> {
        match event {
            WireEvent::PtyOutput { output } => {
                surface.write_output(output.as_bytes())?;
            }
            WireEvent::PtyExit { reason } => {
                debug!(?reason, "remote process exited");
                let notice = match reason {
                    Some(reason) => format!("process exited: {reason}"),
                    None => "process exited".to_string(),
                };
                surface.write_notice(&notice)?;
            }
            WireEvent::PtyInput { .. } | WireEvent::Resize { .. } => {
                // Client-to-server events echoed back; nothing to do.
                warn!("ignoring client-direction event from server");
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for TypedEventAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedEventAdapter")
            .field("open", &self.open)
            .field("container", &self.container)
            .finish_non_exhaustive()
    }
}

impl TransportAdapter for TypedEventAdapter {
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
                // Every (re)connect replaces the remote PTY, so the local
                // grid is reset and freshly fitted dimensions announced.
                surface.begin_session()?;
                let dims = self.fitted_dims();
                self.apply_resize(dims, surface, port)?;
                debug!(%dims, "typed-event session handshake complete");
                Ok(())
            }
            SocketEvent::Text(text) => match decode_event(&text) {
                Ok(event) => self.handle_wire_event(event, surface),
                Err(error) => {
                    warn!(%error, "discarding undecodable event frame");
                    Ok(())
                }
            },
            SocketEvent::Binary(bytes) => {
                // Tolerated for servers that stream output as binary.
                surface.write_output(&bytes)?;
                Ok(())
            }
            SocketEvent::Closed { code, clean } => {
                let was_open = self.open;
                self.open = false;
                self.debouncer.cancel();
                if was_open && !clean {
                    warn!(code, "typed-event socket closed abnormally");
                    surface.write_notice(crate::framed::DISCONNECT_NOTICE)?;
                }
                Ok(())
            }
            SocketEvent::Errored(message) => {
                warn!(message, "typed-event socket error");
                Ok(())
            }
        }
    }

    fn send_input(&mut self, bytes: &[u8], port: &mut dyn SocketPort) {
        if !self.open {
            trace!(len = bytes.len(), "dropping input while socket closed");
            return;
        }
        let input = String::from_utf8_lossy(bytes).into_owned();
        port.send_text(&encode_event(&WireEvent::PtyInput { input }));
    }

    fn push_resize(&mut self, now_ms: u64, container: ContainerBox) {
        self.container = Some(container);
        self.debouncer.push(container, now_ms);
    }

    fn update_metrics(&mut self, _metrics: GlyphMetrics) {
        // Sizing is delegated to the fit routine; metrics reach it through
        // whatever state the routine captured, not through the adapter.
    }

    fn tick(
        &mut self,
        now_ms: u64,
        surface: &mut TerminalSurface,
        port: &mut dyn SocketPort,
    ) -> Result<(), TransportError> {
        if let Some(container) = self.debouncer.poll(now_ms) {
            let dims = (self.fit)(container);
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
    use crate::recording::RecordingPort;
    use pretty_assertions::assert_eq;
    use webpty_surface::SurfaceOptions;
    use webpty_surface::recording::{RecordingHandle, RecordingWidget};

    fn surface() -> (TerminalSurface, RecordingHandle) {
        let (widget, handle) = RecordingWidget::new();
        (
            TerminalSurface::new(Box::new(widget), SurfaceOptions::default()),
            handle,
        )
    }

    /// Fit routine standing in for the widget's: one cell per 10x20 px.
    fn adapter() -> TypedEventAdapter {
        TypedEventAdapter::new(
            Box::new(|c: ContainerBox| {
                GridDimensions::new((c.width_px / 10) as u16, (c.height_px / 20) as u16)
            }),
            200,
        )
    }

    #[test]
    fn event_json_shapes_match_the_wire_contract() {
        assert_eq!(
            encode_event(&WireEvent::PtyInput { input: "ls\r".into() }),
            r#"{"event":"pty-input","input":"ls\r"}"#
        );
        assert_eq!(
            encode_event(&WireEvent::Resize { cols: 100, rows: 30 }),
            r#"{"event":"resize","cols":100,"rows":30}"#
        );
        assert_eq!(
            decode_event(r#"{"event":"pty-output","output":"hi"}"#).unwrap(),
            WireEvent::PtyOutput { output: "hi".into() }
        );
        assert_eq!(
            decode_event(r#"{"event":"pty-exit","reason":"exit 0"}"#).unwrap(),
            WireEvent::PtyExit {
                reason: Some("exit 0".into())
            }
        );
        assert_eq!(
            decode_event(r#"{"event":"pty-exit"}"#).unwrap(),
            WireEvent::PtyExit { reason: None }
        );
    }

    #[test]
    fn decode_rejects_unknown_and_malformed() {
        assert!(decode_event(r#"{"event":"mystery"}"#).is_err());
        assert!(decode_event("not json").is_err());
        assert!(decode_event(r#"{"cols":80}"#).is_err());
    }

    #[test]
    fn handshake_uses_widget_fit_dimensions() {
        let (mut s, handle) = surface();
        let mut p = RecordingPort::new();
        let mut a = adapter();
        a.push_resize(0, ContainerBox::new(1000, 600));
        a.on_socket_event(0, SocketEvent::Opened, &mut s, &mut p).unwrap();

        assert_eq!(handle.resets(), 1);
        // Trusts the fit routine exactly: 1000/10 x 600/20, no margins.
        assert_eq!(handle.resizes(), vec![(100, 30)]);
        assert_eq!(
            p.texts(),
            vec![r#"{"event":"resize","cols":100,"rows":30}"#.to_string()]
        );
    }

    #[test]
    fn reconnect_reruns_reset_and_resize() {
        let (mut s, handle) = surface();
        let mut p = RecordingPort::new();
        let mut a = adapter();
        a.push_resize(0, ContainerBox::new(800, 400));

        a.on_socket_event(0, SocketEvent::Opened, &mut s, &mut p).unwrap();
        a.on_socket_event(
            10,
            SocketEvent::Closed { code: 1006, clean: false },
            &mut s,
            &mut p,
        )
        .unwrap();
        a.on_socket_event(20, SocketEvent::Opened, &mut s, &mut p).unwrap();

        assert_eq!(handle.resets(), 2);
        assert_eq!(handle.resizes(), vec![(80, 20), (80, 20)]);
        assert_eq!(p.texts().len(), 2);
    }

    #[test]
    fn output_events_reach_the_surface() {
        let (mut s, handle) = surface();
        let mut p = RecordingPort::new();
        let mut a = adapter();
        a.on_socket_event(0, SocketEvent::Opened, &mut s, &mut p).unwrap();
        a.on_socket_event(
            0,
            SocketEvent::Text(r#"{"event":"pty-output","output":"$ "}"#.into()),
            &mut s,
            &mut p,
        )
        .unwrap();

        assert!(handle.written_bytes().ends_with(b"$ "));
    }

    #[test]
    fn exit_event_writes_reason_notice() {
        let (mut s, handle) = surface();
        let mut p = RecordingPort::new();
        let mut a = adapter();
        a.on_socket_event(0, SocketEvent::Opened, &mut s, &mut p).unwrap();
        a.on_socket_event(
            0,
            SocketEvent::Text(r#"{"event":"pty-exit","reason":"signal: 9"}"#.into()),
            &mut s,
            &mut p,
        )
        .unwrap();

        let written = String::from_utf8(handle.written_bytes()).unwrap();
        assert!(written.contains("process exited: signal: 9"));
    }

    #[test]
    fn undecodable_frames_are_discarded_silently() {
        let (mut s, handle) = surface();
        let mut p = RecordingPort::new();
        let mut a = adapter();
        a.on_socket_event(0, SocketEvent::Opened, &mut s, &mut p).unwrap();
        let writes_before = handle.writes().len();
        a.on_socket_event(0, SocketEvent::Text("garbage".into()), &mut s, &mut p)
            .unwrap();
        assert_eq!(handle.writes().len(), writes_before);
    }

    #[test]
    fn input_is_wrapped_in_pty_input_event() {
        let (mut s, _handle) = surface();
        let mut p = RecordingPort::new();
        let mut a = adapter();
        a.on_socket_event(0, SocketEvent::Opened, &mut s, &mut p).unwrap();
        a.send_input(b"echo hi\r", &mut p);

        let last = p.texts().last().cloned().unwrap();
        assert_eq!(
            decode_event(&last).unwrap(),
            WireEvent::PtyInput {
                input: "echo hi\r".into()
            }
        );
    }

    #[test]
    fn resize_bursts_collapse_and_trust_fit() {
        let (mut s, _handle) = surface();
        let mut p = RecordingPort::new();
        let mut a = adapter();
        a.on_socket_event(0, SocketEvent::Opened, &mut s, &mut p).unwrap();
        let frames_after_handshake = p.texts().len();

        for i in 0..10u32 {
            a.push_resize(u64::from(i), ContainerBox::new(500 + i * 10, 400));
        }
        a.tick(9 + 200, &mut s, &mut p).unwrap();

        let texts = p.texts();
        assert_eq!(texts.len(), frames_after_handshake + 1);
        assert_eq!(
            decode_event(texts.last().unwrap()).unwrap(),
            WireEvent::Resize { cols: 59, rows: 20 }
        );
    }

    #[test]
    fn abnormal_close_notice_and_disconnect_idempotence() {
        let (mut s, handle) = surface();
        let mut p = RecordingPort::new();
        let mut a = adapter();
        a.on_socket_event(0, SocketEvent::Opened, &mut s, &mut p).unwrap();
        a.on_socket_event(
            0,
            SocketEvent::Closed { code: 1006, clean: false },
            &mut s,
            &mut p,
        )
        .unwrap();
        let written = String::from_utf8(handle.written_bytes()).unwrap();
        assert_eq!(written.matches("connection closed").count(), 1);

        a.disconnect(&mut p);
        a.disconnect(&mut p);
        assert!(p.closes().is_empty()); // already closed, nothing to close
    }
}
