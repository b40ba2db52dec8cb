//! Thread-safe accumulator for recoverable failures.
//!
//! Partial failures (a merge dropping a mismatched feature, eviction that
//! cannot free memory, a downsample falling back to the full array) do not
//! abort the operation. They are recorded here so callers can surface them
//! to the user, and logged through `tracing` at the point they occur.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// How many warnings a sink holds before the oldest are discarded.
pub const DEFAULT_WARNING_CAPACITY: usize = 1024;

/// Identifies the kind of recoverable failure.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum WarningCode {
    /// A feature name could not be resolved to a cached entry.
    UnknownFeature,
    /// A merged feature's sample count disagreed with the base matrix.
    MergeSampleMismatch,
    /// Eviction ran out of entries while memory was still over the ceiling.
    ResourceExhausted,
    /// Evicting an entry did not measurably reduce memory usage.
    EvictionStalled,
    /// A downsample target was zero, negative, or out of range.
    InvalidDownsampleTarget,
    /// A downsample could not run and returned its input unchanged.
    DownsampleFallback,
}

impl WarningCode {
    /// Returns the stable numeric identifier shown as `Wnnn`.
    pub fn number(self) -> u16 {
        match self {
            WarningCode::UnknownFeature => 1,
            WarningCode::MergeSampleMismatch => 2,
            WarningCode::ResourceExhausted => 3,
            WarningCode::EvictionStalled => 4,
            WarningCode::InvalidDownsampleTarget => 5,
            WarningCode::DownsampleFallback => 6,
        }
    }
}

impl fmt::Display for WarningCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "W{:03}", self.number())
    }
}

/// A single recorded warning.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Warning {
    /// What went wrong.
    pub code: WarningCode,
    /// Human-readable detail.
    pub message: String,
}

impl Warning {
    /// Creates a new warning.
    pub fn new(code: WarningCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "warning[{}]: {}", self.code, self.message)
    }
}

/// A thread-safe accumulator for warnings emitted by concurrent requests.
///
/// The sink is bounded. Once it holds its capacity, each new warning
/// displaces the oldest one and bumps [`dropped`](Self::dropped). A
/// long-lived session should drain it with [`take_all`](Self::take_all)
/// after each request it reports on.
pub struct WarningSink {
    held: Mutex<Held>,
    capacity: usize,
}

#[derive(Default)]
struct Held {
    warnings: VecDeque<Warning>,
    dropped: usize,
}

impl WarningSink {
    /// Creates a new empty sink holding up to [`DEFAULT_WARNING_CAPACITY`].
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_WARNING_CAPACITY)
    }

    /// Creates a sink that keeps the newest `capacity` warnings (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            held: Mutex::new(Held::default()),
            capacity: capacity.max(1),
        }
    }

    /// Records a warning and logs it.
    pub fn emit(&self, warning: Warning) {
        tracing::warn!(code = %warning.code, "{}", warning.message);
        let mut held = self.lock();
        if held.warnings.len() >= self.capacity {
            held.warnings.pop_front();
            held.dropped += 1;
        }
        held.warnings.push_back(warning);
    }

    /// Shorthand for [`emit`](Self::emit) with a code and message.
    pub fn warn(&self, code: WarningCode, message: impl Into<String>) {
        self.emit(Warning::new(code, message));
    }

    /// Number of warnings currently held.
    pub fn len(&self) -> usize {
        self.lock().warnings.len()
    }

    /// Returns `true` if no warnings are held.
    pub fn is_empty(&self) -> bool {
        self.lock().warnings.is_empty()
    }

    /// Most warnings held at once.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Warnings discarded for space since the last [`take_all`](Self::take_all).
    pub fn dropped(&self) -> usize {
        self.lock().dropped
    }

    /// Number of held warnings with the given code.
    pub fn count(&self, code: WarningCode) -> usize {
        let held = self.lock();
        held.warnings.iter().filter(|w| w.code == code).count()
    }

    /// Takes all held warnings, oldest first, leaving the sink empty.
    pub fn take_all(&self) -> Vec<Warning> {
        let mut held = self.lock();
        held.dropped = 0;
        held.warnings.drain(..).collect()
    }

    /// Returns a snapshot of all held warnings without draining.
    pub fn warnings(&self) -> Vec<Warning> {
        self.lock().warnings.iter().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, Held> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for WarningSink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_display() {
        assert_eq!(WarningCode::UnknownFeature.to_string(), "W001");
        assert_eq!(WarningCode::MergeSampleMismatch.to_string(), "W002");
        assert_eq!(WarningCode::DownsampleFallback.to_string(), "W006");
    }

    #[test]
    fn warning_display() {
        let w = Warning::new(WarningCode::EvictionStalled, "no progress");
        assert_eq!(w.to_string(), "warning[W004]: no progress");
    }

    #[test]
    fn empty_sink() {
        let sink = WarningSink::new();
        assert!(sink.is_empty());
        assert!(sink.take_all().is_empty());
    }

    #[test]
    fn take_all_drains() {
        let sink = WarningSink::new();
        sink.warn(WarningCode::UnknownFeature, "a");
        sink.warn(WarningCode::ResourceExhausted, "b");
        assert_eq!(sink.count(WarningCode::UnknownFeature), 1);
        assert_eq!(sink.warnings().len(), 2);
        assert_eq!(sink.take_all().len(), 2);
        assert!(sink.is_empty());
    }

    #[test]
    fn full_sink_discards_oldest() {
        let sink = WarningSink::with_capacity(3);
        for i in 0..5 {
            sink.warn(WarningCode::UnknownFeature, format!("x{i}"));
        }
        assert_eq!(sink.len(), 3);
        assert_eq!(sink.dropped(), 2);

        let messages: Vec<String> = sink.take_all().into_iter().map(|w| w.message).collect();
        assert_eq!(messages, vec!["x2", "x3", "x4"]);
        assert_eq!(sink.dropped(), 0);
        assert!(sink.is_empty());
    }

    #[test]
    fn default_capacity_bounds_the_sink() {
        let sink = WarningSink::new();
        assert_eq!(sink.capacity(), DEFAULT_WARNING_CAPACITY);
        for _ in 0..DEFAULT_WARNING_CAPACITY + 10 {
            sink.warn(WarningCode::EvictionStalled, "stalled");
        }
        assert_eq!(sink.len(), DEFAULT_WARNING_CAPACITY);
        assert_eq!(sink.dropped(), 10);
        assert_eq!(WarningSink::with_capacity(0).capacity(), 1);
    }

    #[test]
    fn thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let sink = Arc::new(WarningSink::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sink = Arc::clone(&sink);
                thread::spawn(move || {
                    for _ in 0..50 {
                        sink.warn(WarningCode::MergeSampleMismatch, "mismatch");
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(sink.len(), 400);
    }
}
