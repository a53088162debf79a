//! The connection lifecycle state machine.
//!
//! Socket callbacks, resize observers, and animation frames all interleave
//! on one thread; modelling the lifecycle as closures over mutable flags
//! makes the "mounted" guard and the "at most one session" invariant
//! untestable. Instead every external occurrence becomes a
//! [`LifecycleEvent`], the controller transitions its [`ConnectionState`]
//! and returns [`LifecycleAction`]s for the host to execute. The controller
//! itself never touches a socket or a widget.
//!
//! Sessions are numbered by a generation counter. Each connect attempt
//! bumps it, and socket events carry the generation of the socket that
//! produced them, so a close callback from a torn-down socket can never
//! corrupt the session that replaced it.

use std::fmt;

use tracing::{debug, trace};

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// The externally visible connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No session, none requested.
    #[default]
    Idle,
    /// A socket has been requested but has not opened yet.
    Connecting,
    /// The socket is open and the handshake has run.
    Connected,
    /// The last session ended abnormally; explicit reconnect available.
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Events and actions
// ---------------------------------------------------------------------------

/// An external occurrence fed into the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The terminal surface finished mounting (fonts loaded, widget laid
    /// out). Triggers auto-connect when configured.
    SurfaceReady,
    /// Explicit connect request from the host UI.
    ConnectRequested,
    /// The socket of the given generation opened.
    SocketOpened {
        /// Session generation the socket belongs to.
        generation: u64,
    },
    /// The socket of the given generation closed.
    SocketClosed {
        /// Session generation the socket belongs to.
        generation: u64,
        /// Whether the closure used a normal close code.
        clean: bool,
    },
    /// The socket of the given generation errored.
    SocketErrored {
        /// Session generation the socket belongs to.
        generation: u64,
    },
    /// Explicit disconnect request from the host UI.
    DisconnectRequested,
    /// The host component unmounted. Terminal: all later events are
    /// silently dropped.
    Unmounted,
}

/// What the host must do in response to an event, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    /// Open a new socket tagged with this generation.
    OpenSocket {
        /// Generation to tag the new socket's callbacks with.
        generation: u64,
    },
    /// Close the current socket with a normal close code.
    CloseSocket,
    /// Unsubscribe the session's data listener and resize observation and
    /// drop any pending debounce. Always ordered before [`CloseSocket`]
    /// so no listener can fire into a half-closed session.
    ///
    /// [`CloseSocket`]: LifecycleAction::CloseSocket
    TearDownSession,
    /// Invoke the host's connection-change callback.
    NotifyConnectionChange(bool),
}

// ---------------------------------------------------------------------------
// ConnectionController
// ---------------------------------------------------------------------------

/// Pure state machine owning the [`ConnectionState`] and the session
/// generation counter.
#[derive(Debug)]
pub struct ConnectionController {
    state: ConnectionState,
    mounted: bool,
    auto_connect: bool,
    generation: u64,
}

impl ConnectionController {
    /// Create a mounted controller in the idle state.
    #[must_use]
    pub fn new(auto_connect: bool) -> Self {
        Self {
            state: ConnectionState::Idle,
            mounted: true,
            auto_connect,
            generation: 0,
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the host component is still mounted.
    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Generation of the current (or most recent) connect attempt.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Transition on an event, returning the actions the host must run.
    pub fn handle_event(&mut self, event: LifecycleEvent) -> Vec<LifecycleAction> {
        use LifecycleAction as A;
        use LifecycleEvent as E;

        if !self.mounted {
            trace!(?event, "dropping lifecycle event after unmount");
            return Vec::new();
        }

        match event {
            E::SurfaceReady => {
                if self.auto_connect
                    && matches!(self.state, ConnectionState::Idle | ConnectionState::Error)
                {
                    self.begin_connect(Vec::new())
                } else {
                    Vec::new()
                }
            }

            E::ConnectRequested => match self.state {
                // A connect attempt is already in flight.
                ConnectionState::Connecting => Vec::new(),
                // Connecting over a live session replaces it: the old
                // session comes down fully before the new socket opens.
                ConnectionState::Connected => self.begin_connect(vec![
                    A::NotifyConnectionChange(false),
                    A::TearDownSession,
                    A::CloseSocket,
                ]),
                ConnectionState::Idle | ConnectionState::Error => self.begin_connect(Vec::new()),
            },

            E::SocketOpened { generation } => {
                if generation != self.generation {
                    // A socket from a replaced attempt finally opened.
                    debug!(generation, current = self.generation, "closing stale socket");
                    return vec![A::CloseSocket];
                }
                if self.state == ConnectionState::Connecting {
                    self.state = ConnectionState::Connected;
                    debug!(generation, "session connected");
                    vec![A::NotifyConnectionChange(true)]
                } else {
                    Vec::new()
                }
            }

            E::SocketClosed { generation, clean } => {
                if generation != self.generation {
                    return Vec::new();
                }
                match self.state {
                    ConnectionState::Connected => {
                        self.state = if clean {
                            ConnectionState::Idle
                        } else {
                            ConnectionState::Error
                        };
                        debug!(generation, clean, "session closed");
                        vec![A::NotifyConnectionChange(false), A::TearDownSession]
                    }
                    ConnectionState::Connecting => {
                        // Never got to connected, so nothing to notify.
                        self.state = ConnectionState::Error;
                        vec![A::TearDownSession]
                    }
                    ConnectionState::Idle | ConnectionState::Error => Vec::new(),
                }
            }

            E::SocketErrored { generation } => {
                if generation != self.generation {
                    return Vec::new();
                }
                match self.state {
                    ConnectionState::Connected => {
                        self.state = ConnectionState::Error;
                        vec![A::NotifyConnectionChange(false), A::TearDownSession]
                    }
                    ConnectionState::Connecting => {
                        self.state = ConnectionState::Error;
                        vec![A::TearDownSession]
                    }
                    ConnectionState::Idle | ConnectionState::Error => Vec::new(),
                }
            }

            E::DisconnectRequested => match self.state {
                ConnectionState::Connected => {
                    self.state = ConnectionState::Idle;
                    // Bump so the closing socket's own close callback is
                    // recognized as stale and cannot re-notify.
                    self.generation += 1;
                    vec![
                        A::NotifyConnectionChange(false),
                        A::TearDownSession,
                        A::CloseSocket,
                    ]
                }
                ConnectionState::Connecting => {
                    self.state = ConnectionState::Idle;
                    self.generation += 1;
                    vec![A::TearDownSession, A::CloseSocket]
                }
                // Disconnect is idempotent.
                ConnectionState::Idle | ConnectionState::Error => Vec::new(),
            },

            E::Unmounted => {
                self.mounted = false;
                let mut actions = Vec::new();
                if self.state == ConnectionState::Connected {
                    actions.push(A::NotifyConnectionChange(false));
                }
                if matches!(
                    self.state,
                    ConnectionState::Connected | ConnectionState::Connecting
                ) {
                    actions.push(A::TearDownSession);
                    actions.push(A::CloseSocket);
                }
                self.state = ConnectionState::Idle;
                self.generation += 1;
                debug!("lifecycle controller unmounted");
                actions
            }
        }
    }

    fn begin_connect(&mut self, mut actions: Vec<LifecycleAction>) -> Vec<LifecycleAction> {
        self.generation += 1;
        self.state = ConnectionState::Connecting;
        debug!(generation = self.generation, "connect attempt started");
        actions.push(LifecycleAction::OpenSocket {
            generation: self.generation,
        });
        actions
    }
}
