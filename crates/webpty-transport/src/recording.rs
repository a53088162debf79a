//! Recording socket port for tests.

use crate::port::SocketPort;

/// One outbound operation captured by [`RecordingPort`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentFrame {
    /// A text frame.
    Text(String),
    /// A binary frame.
    Binary(Vec<u8>),
    /// A close call with its close code.
    Close(u16),
}

/// Test double capturing everything an adapter sends.
#[derive(Debug, Default)]
pub struct RecordingPort {
    /// Captured operations, in order.
    pub sent: Vec<SentFrame>,
}

impl RecordingPort {
    /// Create an empty port.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only the text frames, in order.
    #[must_use]
    pub fn texts(&self) -> Vec<String> {
        self.sent
            .iter()
            .filter_map(|f| match f {
                SentFrame::Text(t) => Some(t.clone()),
                _ => None,
            })
            .collect()
    }

    /// Only the binary frames, in order.
    #[must_use]
    pub fn binaries(&self) -> Vec<Vec<u8>> {
        self.sent
            .iter()
            .filter_map(|f| match f {
                SentFrame::Binary(b) => Some(b.clone()),
                _ => None,
            })
            .collect()
    }

    /// Close codes sent, in order.
    #[must_use]
    pub fn closes(&self) -> Vec<u16> {
        self.sent
            .iter()
            .filter_map(|f| match f {
                SentFrame::Close(code) => Some(*code),
                _ => None,
            })
            .collect()
    }
}

impl SocketPort for RecordingPort {
    fn send_text(&mut self, text: &str) {
        self.sent.push(SentFrame::Text(text.to_string()));
    }

    fn send_binary(&mut self, bytes: &[u8]) {
        self.sent.push(SentFrame::Binary(bytes.to_vec()));
    }

    fn close(&mut self, code: u16) {
        self.sent.push(SentFrame::Close(code));
    }
}
