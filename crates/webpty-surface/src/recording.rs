//! Recording widget for tests.
//!
//! [`RecordingWidget`] satisfies [`TerminalWidget`](crate::TerminalWidget)
//! while mirroring every call into a shared [`RecordingHandle`], so tests
//! can assert exactly which widget methods ran (and, just as importantly,
//! which did not — e.g. after unmount).

use std::cell::RefCell;
use std::rc::Rc;

use crate::TerminalWidget;

#[derive(Debug, Default)]
struct RecordingState {
    writes: Vec<Vec<u8>>,
    resizes: Vec<(u16, u16)>,
    resets: u32,
    disposals: u32,
}

/// Test double for the embedded emulator widget.
#[derive(Debug)]
pub struct RecordingWidget {
    state: Rc<RefCell<RecordingState>>,
}

/// Shared view of everything a [`RecordingWidget`] has been asked to do.
#[derive(Debug, Clone)]
pub struct RecordingHandle {
    state: Rc<RefCell<RecordingState>>,
}

impl RecordingWidget {
    /// Create a widget plus the handle observing it.
    #[must_use]
    pub fn new() -> (Self, RecordingHandle) {
        let state = Rc::new(RefCell::new(RecordingState::default()));
        (
            Self {
                state: Rc::clone(&state),
            },
            RecordingHandle { state },
        )
    }
}

impl TerminalWidget for RecordingWidget {
    fn write(&mut self, bytes: &[u8]) {
        self.state.borrow_mut().writes.push(bytes.to_vec());
    }

    fn resize(&mut self, cols: u16, rows: u16) {
        self.state.borrow_mut().resizes.push((cols, rows));
    }

    fn reset(&mut self) {
        self.state.borrow_mut().resets += 1;
    }

    fn dispose(&mut self) {
        self.state.borrow_mut().disposals += 1;
    }
}

impl RecordingHandle {
    /// All write payloads, in order.
    #[must_use]
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.borrow().writes.clone()
    }

    /// All writes concatenated into one byte stream.
    #[must_use]
    pub fn written_bytes(&self) -> Vec<u8> {
        self.state.borrow().writes.concat()
    }

    /// All resize calls, in order.
    #[must_use]
    pub fn resizes(&self) -> Vec<(u16, u16)> {
        self.state.borrow().resizes.clone()
    }

    /// Number of reset calls.
    #[must_use]
    pub fn resets(&self) -> u32 {
        self.state.borrow().resets
    }

    /// Number of dispose calls.
    #[must_use]
    pub fn disposals(&self) -> u32 {
        self.state.borrow().disposals
    }

    /// Total number of recorded calls of any kind.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        let s = self.state.borrow();
        s.writes.len() + s.resizes.len() + s.resets as usize + s.disposals as usize
    }
}
