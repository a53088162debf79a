//! One mounted terminal client: surface + transport + lifecycle, wired.
//!
//! [`TerminalClient`] owns the [`TerminalSurface`], the selected
//! [`TransportAdapter`], and the [`ConnectionController`], and executes the
//! controller's actions against them. The host binding (the wasm layer, or
//! a test) remains responsible for the things only it can do: creating
//! sockets when asked via [`HostCommand::OpenSocket`], delivering socket
//! events back in, observing container resizes, and ticking the clock.
//!
//! The socket handle and the widget handle are each owned here and nowhere
//! else; no other component writes to either directly.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use tracing::trace;
use webpty_metrics::{ContainerBox, GlyphMetrics};
use webpty_surface::{SurfaceOptions, TerminalSurface, TerminalWidget};
use webpty_transport::{
    CLOSE_NORMAL, SocketEvent, SocketPort, TransportAdapter, TransportError, TransportKind,
};

use crate::lifecycle::{ConnectionController, ConnectionState, LifecycleAction, LifecycleEvent};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Host-facing constructor configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Connect automatically once the surface reports ready.
    pub auto_connect: bool,
    /// Static banner written before the first session starts.
    pub welcome_message: Option<String>,
    /// CSS height for the host element.
    pub height: String,
    /// Font size in CSS pixels.
    pub font_size_px: u32,
    /// Font family, as a CSS font-family list.
    pub font_family: String,
    /// Which wire protocol to speak.
    pub transport: TransportKind,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            auto_connect: true,
            welcome_message: None,
            height: "100%".to_string(),
            font_size_px: 14,
            font_family: "monospace".to_string(),
            transport: TransportKind::default(),
        }
    }
}

impl ClientOptions {
    fn surface_options(&self) -> SurfaceOptions {
        SurfaceOptions::default()
            .with_font_size(self.font_size_px)
            .with_font_family(self.font_family.clone())
    }
}

/// Work only the host binding can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    /// Create a socket and tag its callbacks with this generation.
    OpenSocket {
        /// Generation for the new socket's events.
        generation: u64,
    },
}

// ---------------------------------------------------------------------------
// TerminalClient
// ---------------------------------------------------------------------------

type ConnectionListener = Box<dyn FnMut(bool)>;
type InputQueue = Rc<RefCell<VecDeque<Vec<u8>>>>;

/// A mounted terminal synced with one remote PTY.
pub struct TerminalClient {
    surface: TerminalSurface,
    adapter: Box<dyn TransportAdapter>,
    controller: ConnectionController,
    on_connection_change: Option<ConnectionListener>,
    input_queue: InputQueue,
    input_listener: Option<u64>,
    options: ClientOptions,
}

impl TerminalClient {
    /// Wrap a widget and an adapter. Writes the welcome banner, if any,
    /// before any session can start.
    #[must_use]
    pub fn new(
        widget: Box<dyn TerminalWidget>,
        adapter: Box<dyn TransportAdapter>,
        options: ClientOptions,
    ) -> Self {
        let mut surface = TerminalSurface::new(widget, options.surface_options());
        if let Some(banner) = &options.welcome_message {
            // The surface is fresh and pre-session; this cannot fail.
            let _ = surface.write_banner(banner);
        }
        Self {
            surface,
            adapter,
            controller: ConnectionController::new(options.auto_connect),
            on_connection_change: None,
            input_queue: Rc::new(RefCell::new(VecDeque::new())),
            input_listener: None,
            options,
        }
    }

    /// Register the host's connection-change callback. Replaces any
    /// previous one.
    pub fn set_connection_listener(&mut self, listener: impl FnMut(bool) + 'static) {
        self.on_connection_change = Some(Box::new(listener));
    }

    /// Configuration this client was created with.
    #[must_use]
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.controller.state()
    }

    /// The owned surface, for inspection.
    #[must_use]
    pub fn surface(&self) -> &TerminalSurface {
        &self.surface
    }

    /// Signal that the surface finished mounting (fonts loaded, widget
    /// laid out). May trigger auto-connect.
    pub fn surface_ready(&mut self, port: &mut dyn SocketPort) -> Vec<HostCommand> {
        let actions = self.controller.handle_event(LifecycleEvent::SurfaceReady);
        self.apply(actions, port)
    }

    /// Explicit connect request.
    pub fn connect(&mut self, port: &mut dyn SocketPort) -> Vec<HostCommand> {
        let actions = self.controller.handle_event(LifecycleEvent::ConnectRequested);
        self.apply(actions, port)
    }

    /// Explicit disconnect request. Idempotent.
    pub fn disconnect(&mut self, port: &mut dyn SocketPort) {
        let actions = self
            .controller
            .handle_event(LifecycleEvent::DisconnectRequested);
        self.apply(actions, port);
    }

    /// Deliver a socket event from the socket tagged `generation`.
    pub fn socket_event(
        &mut self,
        now_ms: u64,
        generation: u64,
        event: SocketEvent,
        port: &mut dyn SocketPort,
    ) -> Result<Vec<HostCommand>, TransportError> {
        if !self.controller.is_mounted() {
            return Ok(Vec::new());
        }
        if generation != self.controller.generation() {
            // A replaced socket's callback. A stale open still holds a
            // live socket that must be closed; everything else is noise.
            if matches!(event, SocketEvent::Opened) {
                port.close(CLOSE_NORMAL);
            }
            trace!(generation, "dropping stale socket event");
            return Ok(Vec::new());
        }

        let lifecycle = match &event {
            SocketEvent::Opened => Some(LifecycleEvent::SocketOpened { generation }),
            SocketEvent::Closed { clean, .. } => Some(LifecycleEvent::SocketClosed {
                generation,
                clean: *clean,
            }),
            SocketEvent::Errored(_) => Some(LifecycleEvent::SocketErrored { generation }),
            SocketEvent::Text(_) | SocketEvent::Binary(_) => None,
        };

        // Adapter first: the handshake (reset + resize) and any inline
        // close notice must land before the host learns of the transition.
        self.adapter
            .on_socket_event(now_ms, event, &mut self.surface, port)?;

        match lifecycle {
            Some(event) => {
                let actions = self.controller.handle_event(event);
                Ok(self.apply(actions, port))
            }
            None => Ok(Vec::new()),
        }
    }

    /// Deliver widget keystroke bytes and forward them to the transport.
    pub fn feed_input(&mut self, bytes: &[u8], port: &mut dyn SocketPort) {
        if !self.controller.is_mounted() {
            return;
        }
        self.surface.emit_input(bytes);
        self.pump_input(port);
    }

    /// Record a container resize; propagation is debounced until a tick.
    pub fn container_resized(&mut self, now_ms: u64, container: ContainerBox) {
        if !self.controller.is_mounted() {
            return;
        }
        self.adapter.push_resize(now_ms, container);
    }

    /// Install probed glyph metrics, replacing whatever the transport was
    /// constructed with. Dimension calculations from here on use them.
    pub fn set_metrics(&mut self, metrics: GlyphMetrics) {
        if !self.controller.is_mounted() {
            return;
        }
        self.adapter.update_metrics(metrics);
    }

    /// Advance the clock, flushing any due debounced resize.
    pub fn tick(
        &mut self,
        now_ms: u64,
        port: &mut dyn SocketPort,
    ) -> Result<(), TransportError> {
        if !self.controller.is_mounted() {
            return Ok(());
        }
        self.adapter.tick(now_ms, &mut self.surface, port)
    }

    /// Synchronous unmount teardown: close the socket, unsubscribe
    /// everything, dispose the widget. After this every method is a
    /// silent no-op.
    pub fn unmount(&mut self, port: &mut dyn SocketPort) {
        let actions = self.controller.handle_event(LifecycleEvent::Unmounted);
        self.apply(actions, port);
        self.surface.dispose();
    }

    fn apply(&mut self, actions: Vec<LifecycleAction>, port: &mut dyn SocketPort) -> Vec<HostCommand> {
        let mut commands = Vec::new();
        for action in actions {
            match action {
                LifecycleAction::OpenSocket { generation } => {
                    self.subscribe_input();
                    commands.push(HostCommand::OpenSocket { generation });
                }
                LifecycleAction::CloseSocket => {
                    self.adapter.disconnect(port);
                }
                LifecycleAction::TearDownSession => {
                    self.unsubscribe_input();
                }
                LifecycleAction::NotifyConnectionChange(connected) => {
                    if let Some(listener) = &mut self.on_connection_change {
                        listener(connected);
                    }
                }
            }
        }
        commands
    }

    /// Register the single session data listener, if not already live.
    fn subscribe_input(&mut self) {
        if self.input_listener.is_some() {
            return;
        }
        let queue = Rc::clone(&self.input_queue);
        let id = self
            .surface
            .on_input(move |bytes| queue.borrow_mut().push_back(bytes.to_vec()));
        self.input_listener = Some(id);
    }

    fn unsubscribe_input(&mut self) {
        if let Some(id) = self.input_listener.take() {
            self.surface.off_input(id);
        }
        self.input_queue.borrow_mut().clear();
    }

    fn pump_input(&mut self, port: &mut dyn SocketPort) {
        loop {
            let chunk = self.input_queue.borrow_mut().pop_front();
            let Some(chunk) = chunk else { break };
            self.adapter.send_input(&chunk, port);
        }
    }
}

impl std::fmt::Debug for TerminalClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalClient")
            .field("state", &self.controller.state())
            .field("mounted", &self.controller.is_mounted())
            .field("surface", &self.surface)
            .finish_non_exhaustive()
    }
}
