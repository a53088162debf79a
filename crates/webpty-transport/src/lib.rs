#![forbid(unsafe_code)]

//! Transport adapters between a terminal surface and a remote PTY socket.
//!
//! Two wire protocols share one adapter contract:
//!
//! - [`framed::FramedTextAdapter`] multiplexes raw I/O bytes and a
//!   `__RESIZE__:<cols>:<rows>` control frame over a plain socket, and
//!   recomputes dimensions defensively through the safety-margin
//!   calculator.
//! - [`typed::TypedEventAdapter`] speaks named JSON events (`pty-input`,
//!   `pty-output`, `resize`, `pty-exit`) and trusts the widget's own fit
//!   routine, accepting a small off-by-one wrapping risk for simplicity.
//!
//! Adapters are single-threaded state machines: the host delivers
//! [`port::SocketEvent`]s and clock ticks (`now_ms` is always an argument,
//! never sampled), the adapter calls back into the surface and the
//! [`port::SocketPort`]. That keeps every ordering and debouncing rule
//! testable without timers or a browser.

pub mod adapter;
pub mod debounce;
pub mod framed;
pub mod port;
pub mod recording;
pub mod typed;

pub use adapter::{TransportAdapter, TransportError, TransportKind};
pub use debounce::ResizeDebouncer;
pub use framed::{FramedTextAdapter, RESIZE_PREFIX, encode_resize_frame, parse_resize_frame};
pub use port::{CLOSE_GOING_AWAY, CLOSE_NORMAL, SocketEvent, SocketPort};
pub use typed::{TypedEventAdapter, WireEvent, decode_event, encode_event};
