#![forbid(unsafe_code)]

//! Websocket-to-PTY bridge: the server half of the embedded terminal.
//!
//! Accepts a websocket client, spawns a PTY child process, and pumps bytes
//! between them, speaking either of the two client wire protocols:
//!
//! - framed text: client input arrives as raw text/binary frames, except
//!   the literal `__RESIZE__:<cols>:<rows>` control frame; PTY output goes
//!   back as binary frames;
//! - typed events: JSON frames tagged `pty-input` / `resize` inbound,
//!   `pty-output` / `pty-exit` outbound.
//!
//! The PTY spawns with sane defaults and is resized when the client's
//! first control frame arrives. Each session appends JSONL telemetry and
//! ends with a byte-count summary.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use portable_pty::{Child, CommandBuilder, ExitStatus, MasterPty, PtySize};
use serde_json::{Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info, warn};
use tungstenite::protocol::WebSocketConfig;
use tungstenite::{Error as WsError, Message, WebSocket, accept_with_config};
use webpty_metrics::GridDimensions;
use webpty_transport::framed::parse_resize_frame;
use webpty_transport::typed::{WireEvent, decode_event, encode_event};
use webpty_transport::{CLOSE_NORMAL, TransportKind};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Runtime configuration for the bridge server.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Address to bind the websocket server to.
    pub bind_addr: SocketAddr,
    /// Which client wire protocol this bridge speaks.
    pub protocol: TransportKind,
    /// Executable to spawn in the PTY.
    pub command: String,
    /// Command arguments.
    pub args: Vec<String>,
    /// TERM value exported to the child process.
    pub term: String,
    /// Extra child environment variables.
    pub env: Vec<(String, String)>,
    /// PTY grid before the client's first resize arrives.
    pub initial_dims: GridDimensions,
    /// Optional JSONL telemetry file path.
    pub telemetry_path: Option<PathBuf>,
    /// Max websocket message/frame size.
    pub max_message_bytes: usize,
    /// Loop sleep duration when idle.
    pub idle_sleep: Duration,
    /// Stop after one session if true.
    pub accept_once: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let command = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 9330)),
            protocol: TransportKind::default(),
            command,
            args: Vec::new(),
            term: "xterm-256color".to_string(),
            env: Vec::new(),
            // The client sends real dimensions in its handshake; until
            // then the PTY runs at the conventional default.
            initial_dims: GridDimensions::DEFAULT_80X24,
            telemetry_path: None,
            max_message_bytes: 256 * 1024,
            idle_sleep: Duration::from_millis(5),
            accept_once: true,
        }
    }
}

/// Session summary emitted when a bridge session ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSummary {
    /// Session id used in telemetry.
    pub session_id: String,
    /// Total websocket inbound bytes.
    pub ws_in_bytes: u64,
    /// Total websocket outbound bytes.
    pub ws_out_bytes: u64,
    /// Total bytes written into PTY stdin.
    pub pty_in_bytes: u64,
    /// Total bytes read from PTY stdout/stderr.
    pub pty_out_bytes: u64,
    /// Number of resize operations processed.
    pub resize_events: u64,
    /// Exit code if the child terminated during the session.
    pub exit_code: Option<u32>,
    /// Exit signal (platform-dependent text) if available.
    pub exit_signal: Option<String>,
}

impl BridgeSummary {
    fn as_json(&self) -> Value {
        json!({
            "session_id": self.session_id,
            "ws_in_bytes": self.ws_in_bytes,
            "ws_out_bytes": self.ws_out_bytes,
            "pty_in_bytes": self.pty_in_bytes,
            "pty_out_bytes": self.pty_out_bytes,
            "resize_events": self.resize_events,
            "exit_code": self.exit_code,
            "exit_signal": self.exit_signal,
        })
    }
}

// ---------------------------------------------------------------------------
// Inbound classification
// ---------------------------------------------------------------------------

/// What one inbound websocket message means to the PTY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Bytes destined for the PTY's stdin.
    Input(Vec<u8>),
    /// A viewport resize.
    Resize(GridDimensions),
    /// The client is done; end the session.
    Shutdown,
    /// Protocol chatter with no PTY effect.
    Ignored,
}

/// Classify an inbound frame under the given wire protocol.
#[must_use]
pub fn classify_inbound(protocol: TransportKind, message: &Message) -> Inbound {
    match message {
        Message::Binary(bytes) => Inbound::Input(bytes.to_vec()),
        Message::Text(text) => classify_text(protocol, text.as_ref()),
        Message::Close(_) => Inbound::Shutdown,
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Inbound::Ignored,
    }
}

fn classify_text(protocol: TransportKind, text: &str) -> Inbound {
    match protocol {
        TransportKind::FramedText => match parse_resize_frame(text) {
            Some(dims) => Inbound::Resize(dims),
            // No other framing exists: any other text is terminal input.
            None => Inbound::Input(text.as_bytes().to_vec()),
        },
        TransportKind::TypedEvent => match decode_event(text) {
            Ok(WireEvent::PtyInput { input }) => Inbound::Input(input.into_bytes()),
            Ok(WireEvent::Resize { cols, rows }) => {
                if cols == 0 || rows == 0 {
                    warn!(cols, rows, "rejecting zero-sized resize event");
                    Inbound::Ignored
                } else {
                    Inbound::Resize(GridDimensions::new(cols, rows))
                }
            }
            Ok(event) => {
                warn!(?event, "ignoring server-direction event from client");
                Inbound::Ignored
            }
            Err(error) => {
                warn!(%error, "discarding undecodable event frame");
                Inbound::Ignored
            }
        },
    }
}

/// Wrap PTY output for the wire.
#[must_use]
pub fn output_message(protocol: TransportKind, bytes: &[u8]) -> Message {
    match protocol {
        TransportKind::FramedText => Message::binary(bytes.to_vec()),
        TransportKind::TypedEvent => Message::text(encode_event(&WireEvent::PtyOutput {
            output: String::from_utf8_lossy(bytes).into_owned(),
        })),
    }
}

/// The frame announcing child exit, where the protocol has one.
#[must_use]
pub fn exit_message(
    protocol: TransportKind,
    exit_code: Option<u32>,
    exit_signal: Option<&str>,
) -> Option<Message> {
    match protocol {
        // Framed text has no exit frame; the normal close says it all.
        TransportKind::FramedText => None,
        TransportKind::TypedEvent => {
            let reason = match (exit_code, exit_signal) {
                (_, Some(signal)) => Some(format!("signal: {signal}")),
                (Some(code), None) => Some(format!("exit {code}")),
                (None, None) => None,
            };
            Some(Message::text(encode_event(&WireEvent::PtyExit { reason })))
        }
    }
}

// ---------------------------------------------------------------------------
// Server loops
// ---------------------------------------------------------------------------

/// Bind and run the bridge server.
///
/// With `accept_once` set this serves a single session and returns;
/// otherwise it keeps accepting until the listener fails.
pub fn run_bridge(config: BridgeConfig) -> io::Result<()> {
    let listener = TcpListener::bind(config.bind_addr)?;
    info!(addr = %config.bind_addr, protocol = %config.protocol, "bridge listening");
    run_with_listener(listener, config)
}

/// Run the bridge on an already-bound listener (lets callers bind port 0).
pub fn run_with_listener(listener: TcpListener, config: BridgeConfig) -> io::Result<()> {
    loop {
        let (stream, peer_addr) = listener.accept()?;
        let session_id = make_session_id();
        let mut telemetry = TelemetrySink::new(config.telemetry_path.as_deref(), &session_id)?;
        telemetry.write(
            "session_start",
            json!({
                "peer": peer_addr.to_string(),
                "protocol": config.protocol.to_string(),
                "command": config.command,
                "args": config.args,
                "cols": config.initial_dims.cols,
                "rows": config.initial_dims.rows,
                "term": config.term,
            }),
        )?;

        match run_single_session(stream, &config, &session_id, &mut telemetry) {
            Ok(summary) => {
                debug!(session = %summary.session_id, "session ended");
                telemetry.write("session_end", summary.as_json())?;
            }
            Err(error) => {
                warn!(%error, "session failed");
                telemetry.write("session_error", json!({ "error": error.to_string() }))?;
                if config.accept_once {
                    return Err(error);
                }
            }
        }

        if config.accept_once {
            return Ok(());
        }
    }
}

fn run_single_session(
    stream: TcpStream,
    config: &BridgeConfig,
    session_id: &str,
    telemetry: &mut TelemetrySink,
) -> io::Result<BridgeSummary> {
    stream.set_nodelay(true)?;
    let ws_config = WebSocketConfig::default()
        .max_message_size(Some(config.max_message_bytes))
        .max_frame_size(Some(config.max_message_bytes))
        .write_buffer_size(0);
    let mut websocket = accept_with_config(stream, Some(ws_config)).map_err(|error| {
        io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!("websocket handshake failed: {error}"),
        )
    })?;
    websocket.get_mut().set_nonblocking(true)?;

    let mut pty = PtySession::spawn(config)?;
    let mut counters = Counters::default();

    loop {
        let mut progressed = false;

        // Drain inbound frames until the socket would block.
        loop {
            match websocket.read() {
                Ok(message) => {
                    progressed = true;
                    match classify_inbound(config.protocol, &message) {
                        Inbound::Input(bytes) => {
                            counters.ws_in_bytes = counters.ws_in_bytes.saturating_add(len_u64(&bytes));
                            pty.send_input(&bytes)?;
                            counters.pty_in_bytes =
                                counters.pty_in_bytes.saturating_add(len_u64(&bytes));
                        }
                        Inbound::Resize(dims) => {
                            pty.resize(dims)?;
                            counters.resize_events = counters.resize_events.saturating_add(1);
                            telemetry.write(
                                "resize",
                                json!({ "cols": dims.cols, "rows": dims.rows }),
                            )?;
                        }
                        Inbound::Shutdown => {
                            return Ok(counters.into_summary(session_id, None, None));
                        }
                        Inbound::Ignored => {}
                    }
                }
                Err(WsError::Io(error)) if error.kind() == io::ErrorKind::WouldBlock => break,
                Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => {
                    return Ok(counters.into_summary(session_id, None, None));
                }
                Err(error) => {
                    return Err(io::Error::other(format!("websocket read failed: {error}")));
                }
            }
        }

        // Pump PTY output out.
        let output = pty.drain_output_nonblocking()?;
        if !output.is_empty() {
            progressed = true;
            counters.pty_out_bytes = counters.pty_out_bytes.saturating_add(len_u64(&output));
            counters.ws_out_bytes = counters.ws_out_bytes.saturating_add(len_u64(&output));
            send_ws_message(&mut websocket, output_message(config.protocol, &output))?;
        }

        // Child exit ends the session after flushing trailing output.
        if let Some(status) = pty.try_wait()? {
            let exit_code = Some(status.exit_code());
            let exit_signal = status.signal().map(ToOwned::to_owned);

            let trailing = pty.drain_output_nonblocking()?;
            if !trailing.is_empty() {
                counters.pty_out_bytes = counters.pty_out_bytes.saturating_add(len_u64(&trailing));
                counters.ws_out_bytes = counters.ws_out_bytes.saturating_add(len_u64(&trailing));
                send_ws_message(&mut websocket, output_message(config.protocol, &trailing))?;
            }

            if let Some(message) =
                exit_message(config.protocol, exit_code, exit_signal.as_deref())
            {
                send_ws_message(&mut websocket, message)?;
            }
            let _ = websocket.close(Some(tungstenite::protocol::CloseFrame {
                code: CLOSE_NORMAL.into(),
                reason: "process exited".into(),
            }));
            return Ok(counters.into_summary(session_id, exit_code, exit_signal));
        }

        if !progressed {
            thread::sleep(config.idle_sleep);
        }
    }
}

fn send_ws_message(websocket: &mut WebSocket<TcpStream>, message: Message) -> io::Result<()> {
    let mut retries = 0_u8;
    loop {
        match websocket.send(message.clone()) {
            Ok(()) => return Ok(()),
            Err(WsError::Io(error)) if error.kind() == io::ErrorKind::WouldBlock && retries < 5 => {
                retries = retries.saturating_add(1);
                thread::sleep(Duration::from_millis(2));
            }
            Err(error) => {
                return Err(io::Error::other(format!("websocket send failed: {error}")));
            }
        }
    }
}

fn len_u64(bytes: &[u8]) -> u64 {
    u64::try_from(bytes.len()).unwrap_or(u64::MAX)
}

fn make_session_id() -> String {
    let ts = OffsetDateTime::now_utc().unix_timestamp_nanos();
    format!("webpty-{}-{ts}", std::process::id())
}

#[derive(Debug, Default)]
struct Counters {
    ws_in_bytes: u64,
    ws_out_bytes: u64,
    pty_in_bytes: u64,
    pty_out_bytes: u64,
    resize_events: u64,
}

impl Counters {
    fn into_summary(
        self,
        session_id: &str,
        exit_code: Option<u32>,
        exit_signal: Option<String>,
    ) -> BridgeSummary {
        BridgeSummary {
            session_id: session_id.to_string(),
            ws_in_bytes: self.ws_in_bytes,
            ws_out_bytes: self.ws_out_bytes,
            pty_in_bytes: self.pty_in_bytes,
            pty_out_bytes: self.pty_out_bytes,
            resize_events: self.resize_events,
            exit_code,
            exit_signal,
        }
    }
}

// ---------------------------------------------------------------------------
// PTY session
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum ReaderMsg {
    Data(Vec<u8>),
    Eof,
    Err(io::Error),
}

struct PtySession {
    child: Box<dyn Child + Send + Sync>,
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    rx: mpsc::Receiver<ReaderMsg>,
    reader_thread: Option<thread::JoinHandle<()>>,
    eof: bool,
}

impl PtySession {
    fn spawn(config: &BridgeConfig) -> io::Result<Self> {
        let mut cmd = CommandBuilder::new(&config.command);
        for arg in &config.args {
            cmd.arg(arg);
        }
        cmd.env("TERM", &config.term);
        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        let pty_system = portable_pty::native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: config.initial_dims.rows,
                cols: config.initial_dims.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(pty_error)?;

        let child = pair.slave.spawn_command(cmd).map_err(pty_error)?;
        let mut reader = pair.master.try_clone_reader().map_err(pty_error)?;
        let writer = pair.master.take_writer().map_err(pty_error)?;

        let (tx, rx) = mpsc::channel::<ReaderMsg>();
        let reader_thread = thread::Builder::new()
            .name("webpty-pty-reader".to_string())
            .spawn(move || {
                let mut buffer = [0_u8; 8192];
                loop {
                    match reader.read(&mut buffer) {
                        Ok(0) => {
                            let _ = tx.send(ReaderMsg::Eof);
                            break;
                        }
                        Ok(n) => {
                            let _ = tx.send(ReaderMsg::Data(buffer[..n].to_vec()));
                        }
                        Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                        Err(error) => {
                            let _ = tx.send(ReaderMsg::Err(error));
                            break;
                        }
                    }
                }
            })
            .map_err(|error| {
                io::Error::other(format!("failed to spawn PTY reader thread: {error}"))
            })?;

        Ok(Self {
            child,
            master: pair.master,
            writer,
            rx,
            reader_thread: Some(reader_thread),
            eof: false,
        })
    }

    fn send_input(&mut self, bytes: &[u8]) -> io::Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.writer.write_all(bytes)?;
        self.writer.flush()?;
        Ok(())
    }

    fn resize(&mut self, dims: GridDimensions) -> io::Result<()> {
        self.master
            .resize(PtySize {
                rows: dims.rows,
                cols: dims.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(pty_error)
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    fn drain_output_nonblocking(&mut self) -> io::Result<Vec<u8>> {
        if self.eof {
            return Ok(Vec::new());
        }

        let mut output = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(ReaderMsg::Data(bytes)) => output.extend_from_slice(&bytes),
                Ok(ReaderMsg::Eof) => {
                    self.eof = true;
                    break;
                }
                Ok(ReaderMsg::Err(error)) => return Err(error),
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    self.eof = true;
                    break;
                }
            }
        }

        Ok(output)
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        let _ = self.child.kill();
        if let Some(handle) = self.reader_thread.take() {
            let _ = handle.join();
        }
    }
}

fn pty_error<E: std::fmt::Display>(error: E) -> io::Error {
    io::Error::other(format!("{error}"))
}

// ---------------------------------------------------------------------------
// Telemetry
// ---------------------------------------------------------------------------

struct TelemetrySink {
    file: Option<File>,
    session_id: String,
    seq: u64,
}

impl TelemetrySink {
    fn new(path: Option<&Path>, session_id: &str) -> io::Result<Self> {
        let file = match path {
            Some(path) => Some(OpenOptions::new().create(true).append(true).open(path)?),
            None => None,
        };
        Ok(Self {
            file,
            session_id: session_id.to_string(),
            seq: 0,
        })
    }

    fn write(&mut self, event: &str, payload: Value) -> io::Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        let line = json!({
            "event": event,
            "ts": now_iso8601(),
            "session_id": self.session_id,
            "seq": self.seq,
            "payload": payload,
        });
        self.seq = self.seq.saturating_add(1);
        writeln!(file, "{line}")?;
        file.flush()?;
        Ok(())
    }
}

fn now_iso8601() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn config_defaults() {
        let c = BridgeConfig::default();
        assert_eq!(c.protocol, TransportKind::FramedText);
        assert_eq!(c.initial_dims, GridDimensions::DEFAULT_80X24);
        assert_eq!(c.term, "xterm-256color");
        assert_eq!(c.max_message_bytes, 256 * 1024);
        assert!(c.accept_once);
    }

    #[test]
    fn framed_text_distinguishes_control_from_input() {
        let p = TransportKind::FramedText;
        assert_eq!(
            classify_inbound(p, &Message::text("__RESIZE__:100:30")),
            Inbound::Resize(GridDimensions::new(100, 30))
        );
        assert_eq!(
            classify_inbound(p, &Message::text("ls -la\r")),
            Inbound::Input(b"ls -la\r".to_vec())
        );
        // Almost-control frames are input, not errors.
        assert_eq!(
            classify_inbound(p, &Message::text("__RESIZE__:0:30")),
            Inbound::Input(b"__RESIZE__:0:30".to_vec())
        );
        assert_eq!(
            classify_inbound(p, &Message::binary(b"a".to_vec())),
            Inbound::Input(b"a".to_vec())
        );
    }

    #[test]
    fn typed_events_classify_by_tag() {
        let p = TransportKind::TypedEvent;
        assert_eq!(
            classify_inbound(p, &Message::text(r#"{"event":"pty-input","input":"ls\r"}"#)),
            Inbound::Input(b"ls\r".to_vec())
        );
        assert_eq!(
            classify_inbound(p, &Message::text(r#"{"event":"resize","cols":90,"rows":25}"#)),
            Inbound::Resize(GridDimensions::new(90, 25))
        );
        // Server-direction and malformed events have no PTY effect.
        assert_eq!(
            classify_inbound(p, &Message::text(r#"{"event":"pty-output","output":"x"}"#)),
            Inbound::Ignored
        );
        assert_eq!(classify_inbound(p, &Message::text("garbage")), Inbound::Ignored);
        assert_eq!(
            classify_inbound(p, &Message::text(r#"{"event":"resize","cols":0,"rows":25}"#)),
            Inbound::Ignored
        );
    }

    #[test]
    fn close_frame_is_shutdown_for_both_protocols() {
        for p in [TransportKind::FramedText, TransportKind::TypedEvent] {
            assert_eq!(classify_inbound(p, &Message::Close(None)), Inbound::Shutdown);
        }
    }

    #[test]
    fn output_framing_matches_protocol() {
        let framed = output_message(TransportKind::FramedText, b"hi");
        assert_eq!(framed, Message::binary(b"hi".to_vec()));

        let typed = output_message(TransportKind::TypedEvent, b"hi");
        assert_eq!(
            typed,
            Message::text(r#"{"event":"pty-output","output":"hi"}"#)
        );
    }

    #[test]
    fn exit_message_only_for_typed_events() {
        assert_eq!(exit_message(TransportKind::FramedText, Some(0), None), None);
        assert_eq!(
            exit_message(TransportKind::TypedEvent, Some(0), None),
            Some(Message::text(r#"{"event":"pty-exit","reason":"exit 0"}"#))
        );
        assert_eq!(
            exit_message(TransportKind::TypedEvent, None, Some("SIGKILL")),
            Some(Message::text(
                r#"{"event":"pty-exit","reason":"signal: SIGKILL"}"#
            ))
        );
    }

    #[test]
    fn summary_json_contains_all_fields() {
        let summary = BridgeSummary {
            session_id: "s-1".to_string(),
            ws_in_bytes: 100,
            ws_out_bytes: 200,
            pty_in_bytes: 50,
            pty_out_bytes: 150,
            resize_events: 3,
            exit_code: Some(0),
            exit_signal: None,
        };
        let json = summary.as_json();
        assert_eq!(json["session_id"], "s-1");
        assert_eq!(json["ws_in_bytes"], 100);
        assert_eq!(json["ws_out_bytes"], 200);
        assert_eq!(json["pty_in_bytes"], 50);
        assert_eq!(json["pty_out_bytes"], 150);
        assert_eq!(json["resize_events"], 3);
        assert_eq!(json["exit_code"], 0);
        assert!(json["exit_signal"].is_null());
    }

    #[test]
    fn session_ids_are_unique_enough() {
        assert_ne!(make_session_id(), make_session_id());
    }

    #[test]
    fn telemetry_sink_without_path_is_a_noop() {
        let mut sink = TelemetrySink::new(None, "s").expect("create sink");
        sink.write("event", json!({"k": 1})).expect("write");
        assert_eq!(sink.seq, 0);
    }

    #[test]
    fn telemetry_sink_appends_jsonl() {
        let dir = std::env::temp_dir().join("webpty-test-telemetry");
        std::fs::create_dir_all(&dir).expect("create dir");
        let path = dir.join("telemetry.jsonl");
        let _ = std::fs::remove_file(&path);

        {
            let mut sink = TelemetrySink::new(Some(&path), "sess-1").expect("create sink");
            sink.write("start", json!({"x": 1})).expect("write 1");
            sink.write("end", json!({"x": 2})).expect("write 2");
            assert_eq!(sink.seq, 2);
        }

        let content = std::fs::read_to_string(&path).expect("read file");
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in &lines {
            let v: Value = serde_json::from_str(line).expect("parse JSON");
            assert_eq!(v["session_id"], "sess-1");
            assert!(v["ts"].is_string());
            assert!(v["event"].is_string());
        }

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_dir(&dir);
    }

    #[cfg(unix)]
    mod smoke {
        use super::*;
        use std::time::Instant;
        use tungstenite::connect;
        use tungstenite::stream::MaybeTlsStream;

        fn spawn_bridge(
            protocol: TransportKind,
        ) -> (SocketAddr, thread::JoinHandle<io::Result<()>>) {
            let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
                .expect("bind ephemeral port");
            let bind_addr = listener.local_addr().expect("local addr");
            let config = BridgeConfig {
                bind_addr,
                protocol,
                command: "/bin/sh".to_string(),
                args: vec!["-c".to_string(), "cat".to_string()],
                idle_sleep: Duration::from_millis(1),
                accept_once: true,
                ..BridgeConfig::default()
            };
            let handle = thread::spawn(move || run_with_listener(listener, config));
            (bind_addr, handle)
        }

        fn connect_client(
            bind_addr: SocketAddr,
        ) -> WebSocket<MaybeTlsStream<TcpStream>> {
            let (mut client, _response) =
                connect(format!("ws://{bind_addr}/pty")).expect("connect websocket");
            if let MaybeTlsStream::Plain(stream) = client.get_mut() {
                stream
                    .set_read_timeout(Some(Duration::from_millis(50)))
                    .expect("set read timeout");
            }
            client
        }

        fn read_until(
            client: &mut WebSocket<MaybeTlsStream<TcpStream>>,
            needle: &[u8],
        ) -> Vec<u8> {
            let deadline = Instant::now() + Duration::from_secs(3);
            let mut observed = Vec::new();
            while Instant::now() < deadline {
                match client.read() {
                    Ok(Message::Binary(bytes)) => observed.extend_from_slice(bytes.as_ref()),
                    Ok(Message::Text(text)) => observed.extend_from_slice(text.as_bytes()),
                    Ok(_) => {}
                    Err(WsError::Io(error))
                        if matches!(
                            error.kind(),
                            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                        ) => {}
                    Err(error) => panic!("websocket read failed: {error}"),
                }
                if observed.windows(needle.len()).any(|w| w == needle) {
                    break;
                }
            }
            observed
        }

        #[test]
        fn framed_session_echoes_through_the_pty() {
            let (bind_addr, handle) = spawn_bridge(TransportKind::FramedText);
            let mut client = connect_client(bind_addr);

            client
                .send(Message::text("__RESIZE__:100:30"))
                .expect("send resize frame");
            client
                .send(Message::binary(b"hello-through-bridge\n".to_vec()))
                .expect("send input");

            let observed = read_until(&mut client, b"hello-through-bridge");
            assert!(
                observed
                    .windows(b"hello-through-bridge".len())
                    .any(|w| w == b"hello-through-bridge"),
                "expected PTY echo in websocket output"
            );

            let _ = client.close(None);
            handle.join().expect("bridge thread join").expect("bridge result");
        }

        #[test]
        fn typed_session_wraps_output_in_events() {
            let (bind_addr, handle) = spawn_bridge(TransportKind::TypedEvent);
            let mut client = connect_client(bind_addr);

            client
                .send(Message::text(encode_event(&WireEvent::Resize {
                    cols: 90,
                    rows: 25,
                })))
                .expect("send resize event");
            client
                .send(Message::text(encode_event(&WireEvent::PtyInput {
                    input: "typed-roundtrip\n".to_string(),
                })))
                .expect("send input event");

            let observed = read_until(&mut client, b"typed-roundtrip");
            let text = String::from_utf8_lossy(&observed);
            assert!(
                text.contains(r#""event":"pty-output""#),
                "expected pty-output events, got: {text}"
            );
            assert!(text.contains("typed-roundtrip"));

            let _ = client.close(None);
            handle.join().expect("bridge thread join").expect("bridge result");
        }
    }
}
