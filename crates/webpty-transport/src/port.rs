//! Socket abstraction the adapters talk through.
//!
//! The outbound half is the [`SocketPort`] trait; the inbound half is the
//! [`SocketEvent`] stream the host delivers from its socket callbacks.
//! On wasm the port wraps a browser `WebSocket`; in tests it records.

/// Normal closure code: teardown initiated deliberately by either side.
pub const CLOSE_NORMAL: u16 = 1000;

/// Going-away closure code: the page is unloading.
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Outbound socket operations available to an adapter.
pub trait SocketPort {
    /// Send a text frame.
    fn send_text(&mut self, text: &str);
    /// Send a binary frame.
    fn send_binary(&mut self, bytes: &[u8]);
    /// Close the socket with the given close code.
    fn close(&mut self, code: u16);
}

/// Inbound socket lifecycle and data events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// The socket finished connecting. Fires again after every reconnect.
    Opened,
    /// A text frame arrived.
    Text(String),
    /// A binary frame arrived.
    Binary(Vec<u8>),
    /// The socket closed.
    Closed {
        /// Close code reported by the socket.
        code: u16,
        /// Whether the closure was clean (normal close handshake).
        clean: bool,
    },
    /// The socket errored. A `Closed` event still follows.
    Errored(String),
}

impl SocketEvent {
    /// Whether this event ends the session.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }
}
