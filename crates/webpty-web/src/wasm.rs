//! DOM-side runtime: glyph probing, websocket wiring, resize observation.
//!
//! Everything stateful funnels into the deterministic [`TerminalClient`];
//! this module only translates between browser callbacks and client calls.
//! Each socket is tagged with the lifecycle generation it was opened for,
//! so callbacks from a torn-down socket are recognized and dropped instead
//! of corrupting the session that replaced it.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use js_sys::{Function, Promise, Uint8Array};
use tracing::{debug, warn};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    BinaryType, CloseEvent, Document, Element, HtmlElement, MessageEvent, ResizeObserver,
    ResizeObserverEntry, WebSocket,
};
use web_time::Instant;

use webpty::{
    ClientOptions, ContainerBox, DimensionPolicy, GlyphMetrics, HostCommand, MetricsPolicy,
    SocketEvent, SocketPort, TerminalClient, TerminalWidget, TransportKind,
};
use webpty_transport::FramedTextAdapter;
use webpty_transport::debounce::DEFAULT_QUIET_MS;
use webpty_transport::typed::TypedEventAdapter;

use crate::{FONT_LOAD_TIMEOUT_MS, font_shorthand, is_clean_close, metrics_from_probe, probe_text};

fn window() -> Result<web_sys::Window, JsValue> {
    web_sys::window().ok_or_else(|| JsValue::from_str("no window"))
}

fn document() -> Result<Document, JsValue> {
    window()?
        .document()
        .ok_or_else(|| JsValue::from_str("no document"))
}

// ---------------------------------------------------------------------------
// Font loading and glyph probing
// ---------------------------------------------------------------------------

/// Resolve when the document's fonts report ready, or after the timeout.
///
/// A font that never loads must not wedge the terminal: the probe runs
/// anyway and the plausibility envelope limits the damage.
pub async fn await_fonts(timeout_ms: u32) -> Result<(), JsValue> {
    let ready = document()?.fonts().ready()?;
    let win = window()?;
    let timeout = Promise::new(&mut |resolve, _reject| {
        let _ = win.set_timeout_with_callback_and_timeout_and_arguments_0(
            &resolve,
            timeout_ms as i32,
        );
    });
    let race = Promise::race(&js_sys::Array::of2(&ready, &timeout));
    JsFuture::from(race).await?;
    Ok(())
}

/// Measure the rendered per-cell size of the active monospace font.
///
/// Renders an off-screen run of the probe glyph, measures its bounding
/// box, and removes the node again. Implausible measurements collapse to
/// the policy fallback inside [`metrics_from_probe`].
pub fn probe_glyph_metrics(
    font_size_px: u32,
    font_family: &str,
    policy: &MetricsPolicy,
) -> Result<GlyphMetrics, JsValue> {
    let doc = document()?;
    let body = doc.body().ok_or_else(|| JsValue::from_str("no body"))?;

    let span: HtmlElement = doc.create_element("span")?.dyn_into()?;
    let style = span.style();
    style.set_property("position", "absolute")?;
    style.set_property("visibility", "hidden")?;
    style.set_property("white-space", "pre")?;
    style.set_property("font", &font_shorthand(font_size_px, font_family))?;
    span.set_text_content(Some(&probe_text()));

    body.append_child(&span)?;
    let run_width_px = span.get_bounding_client_rect().width();
    body.remove_child(&span)?;

    let metrics = metrics_from_probe(run_width_px, font_size_px, policy);
    debug!(%metrics, run_width_px, "glyph probe complete");
    Ok(metrics)
}

// ---------------------------------------------------------------------------
// Widget and socket bridges
// ---------------------------------------------------------------------------

/// Terminal-emulation widget supplied by the host page as four callbacks.
struct JsWidget {
    write: Function,
    resize: Function,
    reset: Function,
    dispose: Function,
}

impl TerminalWidget for JsWidget {
    fn write(&mut self, bytes: &[u8]) {
        let data = Uint8Array::from(bytes);
        if let Err(err) = self.write.call1(&JsValue::NULL, &data) {
            warn!(?err, "widget write callback threw");
        }
    }

    fn resize(&mut self, cols: u16, rows: u16) {
        let _ = self
            .resize
            .call2(&JsValue::NULL, &JsValue::from(cols), &JsValue::from(rows));
    }

    fn reset(&mut self) {
        let _ = self.reset.call0(&JsValue::NULL);
    }

    fn dispose(&mut self) {
        let _ = self.dispose.call0(&JsValue::NULL);
    }
}

/// [`SocketPort`] over a live `WebSocket` handle.
struct WsPort<'a> {
    socket: &'a WebSocket,
}

impl SocketPort for WsPort<'_> {
    fn send_text(&mut self, text: &str) {
        if let Err(err) = self.socket.send_with_str(text) {
            warn!(?err, "websocket text send failed");
        }
    }

    fn send_binary(&mut self, bytes: &[u8]) {
        if let Err(err) = self.socket.send_with_u8_array(bytes) {
            warn!(?err, "websocket binary send failed");
        }
    }

    fn close(&mut self, code: u16) {
        let _ = self.socket.close_with_code(code);
    }
}

/// Port used when no socket exists yet; sends have nowhere to go.
struct NullPort;

impl SocketPort for NullPort {
    fn send_text(&mut self, _text: &str) {}
    fn send_binary(&mut self, _bytes: &[u8]) {}
    fn close(&mut self, _code: u16) {}
}

// ---------------------------------------------------------------------------
// WebTerminal
// ---------------------------------------------------------------------------

struct Inner {
    client: TerminalClient,
    socket: Option<WebSocket>,
    container: Element,
    url: String,
    epoch: Instant,
    observer: Option<ResizeObserver>,
    // Latest probed metrics, shared with the typed adapter's fit closure.
    metrics: Rc<Cell<GlyphMetrics>>,
    // One tick closure per mount, re-armed on every resize burst.
    tick: Option<Closure<dyn FnMut(JsValue)>>,
    tick_timer: Option<i32>,
    // Keeps socket/observer closures alive for the mount's lifetime.
    closures: Vec<Closure<dyn FnMut(JsValue)>>,
}

impl Inner {
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

/// The JS-facing handle for one embedded terminal.
#[wasm_bindgen]
pub struct WebTerminal {
    inner: Rc<RefCell<Inner>>,
}

#[wasm_bindgen]
impl WebTerminal {
    /// Create a terminal bound to a container element and a websocket URL.
    ///
    /// The four functions delegate to the embedded emulator widget:
    /// `write(Uint8Array)`, `resize(cols, rows)`, `reset()`, `dispose()`.
    #[wasm_bindgen(constructor)]
    pub fn new(
        container: Element,
        url: String,
        write: Function,
        resize: Function,
        reset: Function,
        dispose: Function,
        options: &WebTerminalOptions,
    ) -> WebTerminal {
        let widget = JsWidget {
            write,
            resize,
            reset,
            dispose,
        };
        let client_options = options.to_client_options();
        let metrics = Rc::new(Cell::new(GlyphMetrics::FALLBACK));
        let adapter: Box<dyn webpty::TransportAdapter> = match client_options.transport {
            TransportKind::FramedText => Box::new(FramedTextAdapter::new(
                metrics.get(),
                DimensionPolicy::default(),
                DEFAULT_QUIET_MS,
            )),
            TransportKind::TypedEvent => {
                let policy = DimensionPolicy::default();
                let probed = Rc::clone(&metrics);
                Box::new(TypedEventAdapter::new(
                    Box::new(move |container: ContainerBox| {
                        // The typed protocol trusts the widget's fit; here
                        // the calculator over the latest probed metrics
                        // stands in for it.
                        webpty::calculate(container, &probed.get(), &policy)
                    }),
                    DEFAULT_QUIET_MS,
                ))
            }
        };
        let client = TerminalClient::new(Box::new(widget), adapter, client_options);
        WebTerminal {
            inner: Rc::new(RefCell::new(Inner {
                client,
                socket: None,
                container,
                url,
                epoch: Instant::now(),
                observer: None,
                metrics,
                tick: None,
                tick_timer: None,
                closures: Vec::new(),
            })),
        }
    }

    /// Register the `onConnectionChange(connected: bool)` callback.
    pub fn on_connection_change(&self, callback: Function) {
        self.inner
            .borrow_mut()
            .client
            .set_connection_listener(move |connected| {
                let _ = callback.call1(&JsValue::NULL, &JsValue::from_bool(connected));
            });
    }

    /// Finish mounting: await fonts, probe glyph metrics, defer the first
    /// fit by two animation frames so the widget's internal layout pass
    /// has completed, then signal readiness (which may auto-connect).
    pub async fn mount(&self) -> Result<(), JsValue> {
        let (font_size_px, font_family, height) = {
            let inner = self.inner.borrow();
            let opts = inner.client.options();
            (
                opts.font_size_px,
                opts.font_family.clone(),
                opts.height.clone(),
            )
        };

        // The configured height governs the very first fit, so it lands on
        // the container before anything measures it.
        {
            let inner = self.inner.borrow();
            if let Some(element) = inner.container.dyn_ref::<HtmlElement>() {
                element.style().set_property("height", &height)?;
            }
        }

        await_fonts(FONT_LOAD_TIMEOUT_MS).await?;

        // The handle may have been unmounted while fonts were loading.
        if !self.is_mounted() {
            return Ok(());
        }

        let metrics = probe_glyph_metrics(font_size_px, &font_family, &MetricsPolicy::default())?;
        {
            let mut inner = self.inner.borrow_mut();
            inner.metrics.set(metrics);
            inner.client.set_metrics(metrics);
        }

        next_animation_frame().await?;
        next_animation_frame().await?;
        if !self.is_mounted() {
            return Ok(());
        }

        observe_container(&self.inner)?;
        push_container_box(&self.inner);

        let commands = {
            let mut inner = self.inner.borrow_mut();
            inner.client.surface_ready(&mut NullPort)
        };
        run_commands(&self.inner, commands);
        Ok(())
    }

    /// Explicit connect (also reconnect from the error state).
    pub fn connect(&self) {
        let commands = {
            let mut inner = self.inner.borrow_mut();
            let socket = inner.socket.take();
            let commands = match &socket {
                Some(ws) => inner.client.connect(&mut WsPort { socket: ws }),
                None => inner.client.connect(&mut NullPort),
            };
            inner.socket = socket;
            commands
        };
        run_commands(&self.inner, commands);
    }

    /// Explicit disconnect. Idempotent.
    pub fn disconnect(&self) {
        let mut inner = self.inner.borrow_mut();
        let socket = inner.socket.take();
        match &socket {
            Some(ws) => inner.client.disconnect(&mut WsPort { socket: ws }),
            None => inner.client.disconnect(&mut NullPort),
        }
    }

    /// Forward keystroke bytes from the widget's input handler.
    pub fn feed_input(&self, data: &[u8]) {
        let mut inner = self.inner.borrow_mut();
        let socket = inner.socket.take();
        match &socket {
            Some(ws) => inner.client.feed_input(data, &mut WsPort { socket: ws }),
            None => inner.client.feed_input(data, &mut NullPort),
        }
        inner.socket = socket;
    }

    /// Tear everything down synchronously: observer, timer, socket, widget.
    pub fn unmount(&self) {
        let mut inner = self.inner.borrow_mut();
        if let Some(observer) = inner.observer.take() {
            observer.disconnect();
        }
        if let Some(handle) = inner.tick_timer.take() {
            if let Ok(win) = window() {
                win.clear_timeout_with_handle(handle);
            }
        }
        inner.tick = None;
        let socket = inner.socket.take();
        match &socket {
            Some(ws) => inner.client.unmount(&mut WsPort { socket: ws }),
            None => inner.client.unmount(&mut NullPort),
        }
        inner.closures.clear();
    }

    /// Current lifecycle state, as `idle|connecting|connected|error`.
    pub fn connection_state(&self) -> String {
        self.inner.borrow().client.connection_state().to_string()
    }

    fn is_mounted(&self) -> bool {
        !self.inner.borrow().client.surface().is_disposed()
    }
}

/// Constructor configuration mirrored from JS.
#[wasm_bindgen]
#[derive(Clone)]
pub struct WebTerminalOptions {
    auto_connect: bool,
    welcome_message: Option<String>,
    height: String,
    font_size_px: u32,
    font_family: String,
    typed_events: bool,
}

#[wasm_bindgen]
impl WebTerminalOptions {
    #[wasm_bindgen(constructor)]
    pub fn new() -> WebTerminalOptions {
        let defaults = ClientOptions::default();
        WebTerminalOptions {
            auto_connect: defaults.auto_connect,
            welcome_message: None,
            height: defaults.height,
            font_size_px: defaults.font_size_px,
            font_family: defaults.font_family,
            typed_events: false,
        }
    }

    pub fn set_auto_connect(&mut self, value: bool) {
        self.auto_connect = value;
    }

    pub fn set_welcome_message(&mut self, value: Option<String>) {
        self.welcome_message = value;
    }

    pub fn set_height(&mut self, value: String) {
        self.height = value;
    }

    pub fn set_font_size(&mut self, value: u32) {
        self.font_size_px = value;
    }

    pub fn set_font_family(&mut self, value: String) {
        self.font_family = value;
    }

    /// Select the typed-event protocol instead of framed text.
    pub fn set_typed_events(&mut self, value: bool) {
        self.typed_events = value;
    }
}

impl Default for WebTerminalOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl WebTerminalOptions {
    fn to_client_options(&self) -> ClientOptions {
        ClientOptions {
            auto_connect: self.auto_connect,
            welcome_message: self.welcome_message.clone(),
            height: self.height.clone(),
            font_size_px: self.font_size_px,
            font_family: self.font_family.clone(),
            transport: if self.typed_events {
                TransportKind::TypedEvent
            } else {
                TransportKind::FramedText
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Wiring helpers
// ---------------------------------------------------------------------------

async fn next_animation_frame() -> Result<(), JsValue> {
    let win = window()?;
    let promise = Promise::new(&mut |resolve, _reject| {
        let _ = win.request_animation_frame(&resolve);
    });
    JsFuture::from(promise).await?;
    Ok(())
}

fn observe_container(inner_rc: &Rc<RefCell<Inner>>) -> Result<(), JsValue> {
    let rc = Rc::clone(inner_rc);
    let on_resize = Closure::<dyn FnMut(JsValue)>::new(move |entries: JsValue| {
        let entries: js_sys::Array = entries.unchecked_into();
        let Some(last) = entries.iter().last() else {
            return;
        };
        let entry: ResizeObserverEntry = last.unchecked_into();
        let rect = entry.content_rect();
        let container = ContainerBox::new(rect.width() as u32, rect.height() as u32);
        let now = rc.borrow().now_ms();
        rc.borrow_mut().client.container_resized(now, container);
        schedule_tick(&rc);
    });

    let observer = ResizeObserver::new(on_resize.as_ref().unchecked_ref())?;
    let mut inner = inner_rc.borrow_mut();
    observer.observe(&inner.container);
    inner.observer = Some(observer);
    inner.closures.push(on_resize);
    Ok(())
}

/// Feed the container's current box in, e.g. for the initial fit.
fn push_container_box(inner_rc: &Rc<RefCell<Inner>>) {
    let mut inner = inner_rc.borrow_mut();
    let rect = inner.container.get_bounding_client_rect();
    let container = ContainerBox::new(rect.width() as u32, rect.height() as u32);
    let now = inner.now_ms();
    inner.client.container_resized(now, container);
    drop(inner);
    schedule_tick(inner_rc);
}

/// Arrange for the client clock to advance past the debounce window.
///
/// The closure is created once per mount and re-armed on every call; a
/// resize burst replaces the pending timeout instead of stacking new
/// timers and closures for the life of the mount.
fn schedule_tick(inner_rc: &Rc<RefCell<Inner>>) {
    if inner_rc.borrow().tick.is_none() {
        let rc = Rc::clone(inner_rc);
        let tick = Closure::<dyn FnMut(JsValue)>::new(move |_: JsValue| {
            let mut inner = rc.borrow_mut();
            inner.tick_timer = None;
            let now = inner.now_ms();
            let socket = inner.socket.take();
            let result = match &socket {
                Some(ws) => inner.client.tick(now, &mut WsPort { socket: ws }),
                None => inner.client.tick(now, &mut NullPort),
            };
            inner.socket = socket;
            if let Err(err) = result {
                warn!(%err, "debounce tick failed");
            }
        });
        inner_rc.borrow_mut().tick = Some(tick);
    }

    let Ok(win) = window() else {
        return;
    };
    let mut guard = inner_rc.borrow_mut();
    let inner = &mut *guard;
    if let Some(handle) = inner.tick_timer.take() {
        win.clear_timeout_with_handle(handle);
    }
    if let Some(tick) = inner.tick.as_ref() {
        inner.tick_timer = win
            .set_timeout_with_callback_and_timeout_and_arguments_0(
                tick.as_ref().unchecked_ref(),
                (DEFAULT_QUIET_MS + 10) as i32,
            )
            .ok();
    }
}

/// Execute client-issued commands, opening tagged sockets as requested.
fn run_commands(inner_rc: &Rc<RefCell<Inner>>, commands: Vec<HostCommand>) {
    for command in commands {
        match command {
            HostCommand::OpenSocket { generation } => {
                if let Err(err) = open_socket(inner_rc, generation) {
                    warn!(?err, "failed to open websocket");
                    let now = inner_rc.borrow().now_ms();
                    let _ = inner_rc.borrow_mut().client.socket_event(
                        now,
                        generation,
                        SocketEvent::Errored("websocket construction failed".into()),
                        &mut NullPort,
                    );
                }
            }
        }
    }
}

fn deliver(inner_rc: &Rc<RefCell<Inner>>, generation: u64, event: SocketEvent) {
    let (commands, result) = {
        let mut inner = inner_rc.borrow_mut();
        let now = inner.now_ms();
        let socket = inner.socket.take();
        let result = match &socket {
            Some(ws) => inner
                .client
                .socket_event(now, generation, event, &mut WsPort { socket: ws }),
            None => inner
                .client
                .socket_event(now, generation, event, &mut NullPort),
        };
        inner.socket = socket;
        match result {
            Ok(commands) => (commands, Ok(())),
            Err(err) => (Vec::new(), Err(err)),
        }
    };
    if let Err(err) = result {
        warn!(%err, "socket event handling failed");
    }
    run_commands(inner_rc, commands);
}

fn open_socket(inner_rc: &Rc<RefCell<Inner>>, generation: u64) -> Result<(), JsValue> {
    let url = inner_rc.borrow().url.clone();
    let socket = WebSocket::new(&url)?;
    socket.set_binary_type(BinaryType::Arraybuffer);

    let rc = Rc::clone(inner_rc);
    let on_open = Closure::<dyn FnMut(JsValue)>::new(move |_: JsValue| {
        deliver(&rc, generation, SocketEvent::Opened);
    });
    socket.set_onopen(Some(on_open.as_ref().unchecked_ref()));

    let rc = Rc::clone(inner_rc);
    let on_message = Closure::<dyn FnMut(JsValue)>::new(move |event: JsValue| {
        let event: MessageEvent = event.unchecked_into();
        let data = event.data();
        let socket_event = if let Some(text) = data.as_string() {
            SocketEvent::Text(text)
        } else {
            let bytes = Uint8Array::new(&data).to_vec();
            SocketEvent::Binary(bytes)
        };
        deliver(&rc, generation, socket_event);
    });
    socket.set_onmessage(Some(on_message.as_ref().unchecked_ref()));

    let rc = Rc::clone(inner_rc);
    let on_close = Closure::<dyn FnMut(JsValue)>::new(move |event: JsValue| {
        let event: CloseEvent = event.unchecked_into();
        let code = event.code();
        deliver(
            &rc,
            generation,
            SocketEvent::Closed {
                code,
                clean: event.was_clean() && is_clean_close(code),
            },
        );
    });
    socket.set_onclose(Some(on_close.as_ref().unchecked_ref()));

    let rc = Rc::clone(inner_rc);
    let on_error = Closure::<dyn FnMut(JsValue)>::new(move |_: JsValue| {
        deliver(&rc, generation, SocketEvent::Errored("websocket error".into()));
    });
    socket.set_onerror(Some(on_error.as_ref().unchecked_ref()));

    let mut inner = inner_rc.borrow_mut();
    inner.socket = Some(socket);
    inner
        .closures
        .extend([on_open, on_message, on_close, on_error]);
    Ok(())
}
