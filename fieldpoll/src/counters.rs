use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared between the transceiver and the controller
#[derive(Debug, Default)]
pub struct Counters {
    messages: AtomicU64,
    timeouts: AtomicU64,
    failures: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time copy of the [`Counters`]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct CounterSnapshot {
    /// transactions started
    pub messages: u64,
    /// read timeouts
    pub timeouts: u64,
    /// actions abandoned after exhausting their retries
    pub failures: u64,
    /// actions dropped because the action queue was full
    pub dropped: u64,
}

impl Counters {
    pub(crate) fn increment_messages(&self) {
        self.messages.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn increment_timeouts(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn increment_failures(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn increment_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// read all counters
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            messages: self.messages.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Display for CounterSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "messages: {} timeouts: {} failures: {} dropped: {}",
            self.messages, self.timeouts, self.failures, self.dropped
        )
    }
}
