//! Quiet-window coalescing for resize bursts.
//!
//! Dragging a window edge fires container-resize events continuously;
//! forwarding each one would flood the PTY with resize churn. The debouncer
//! keeps only the most recent pending value and releases it once no new
//! value has arrived for a full quiet window.
//!
//! Time is an argument (`now_ms`), never sampled internally, so bursts can
//! be replayed deterministically in tests.

/// Default quiet window before a pending resize is released.
pub const DEFAULT_QUIET_MS: u64 = 200;

/// Coalesces a burst of values into the last one after a quiet period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeDebouncer<T> {
    quiet_ms: u64,
    pending: Option<T>,
    deadline_ms: Option<u64>,
}

impl<T> ResizeDebouncer<T> {
    /// Create a debouncer with the given quiet window.
    #[must_use]
    pub fn new(quiet_ms: u64) -> Self {
        Self {
            quiet_ms,
            pending: None,
            deadline_ms: None,
        }
    }

    /// Record a new value, replacing any pending one and restarting the
    /// quiet window.
    pub fn push(&mut self, value: T, now_ms: u64) {
        self.pending = Some(value);
        self.deadline_ms = Some(now_ms.saturating_add(self.quiet_ms));
    }

    /// Release the pending value if the quiet window has elapsed.
    pub fn poll(&mut self, now_ms: u64) -> Option<T> {
        let deadline = self.deadline_ms?;
        if now_ms < deadline {
            return None;
        }
        self.deadline_ms = None;
        self.pending.take()
    }

    /// Drop any pending value without releasing it.
    pub fn cancel(&mut self) {
        self.pending = None;
        self.deadline_ms = None;
    }

    /// Whether a value is waiting for its quiet window.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl<T> Default for ResizeDebouncer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_QUIET_MS)
    }
}
