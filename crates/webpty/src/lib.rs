#![forbid(unsafe_code)]

//! Browser-embedded terminal synced with a remote PTY.
//!
//! This umbrella crate wires the layered pieces together:
//!
//! - [`webpty_metrics`] — glyph probing arithmetic and the safety-margin
//!   dimension calculator;
//! - [`webpty_surface`] — ownership of the terminal-emulation widget and
//!   its write discipline;
//! - [`webpty_transport`] — the two wire-protocol adapters and the resize
//!   debouncer;
//! - [`lifecycle`] — the connect/disconnect state machine;
//! - [`client`] — one mounted client combining all of the above.
//!
//! Everything here is host-driven and deterministic: sockets, DOM nodes,
//! observers, and clocks live in the host binding (`webpty-web` in the
//! browser), which feeds events and `now_ms` timestamps in and executes
//! the returned commands.

pub mod client;
pub mod lifecycle;

pub use client::{ClientOptions, HostCommand, TerminalClient};
pub use lifecycle::{ConnectionController, ConnectionState, LifecycleAction, LifecycleEvent};
pub use webpty_metrics::{
    ContainerBox, DimensionPolicy, GlyphMetrics, GridDimensions, MetricsPolicy, ProbeSample,
    calculate, derive_metrics,
};
pub use webpty_surface::{SurfaceError, SurfaceOptions, TerminalSurface, TerminalWidget, Theme};
pub use webpty_transport::{
    FramedTextAdapter, SocketEvent, SocketPort, TransportAdapter, TransportError, TransportKind,
    TypedEventAdapter,
};
