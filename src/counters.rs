use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// Traffic totals shared by every session and read by the reporter.
///
/// Each field is its own atomic, so writers never contend on a lock and a
/// snapshot never blocks them. Fields only ever grow.
#[derive(Debug, Default)]
pub struct Counters {
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    send_count: AtomicU64,
}

/// Point-in-time read of [`Counters`]. Each field is individually exact;
/// the three are not read atomically together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub send_count: u64,
}

impl Counters {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_sent(&self, n: u64) {
        self.bytes_sent.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_received(&self, n: u64) {
        self.bytes_received.fetch_add(n, Ordering::Relaxed);
    }

    pub fn increment_send_count(&self) {
        self.send_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            send_count: self.send_count.load(Ordering::Relaxed),
        }
    }
}

impl CounterSnapshot {
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// True when no field of `self` is below the matching field of `earlier`.
    pub fn dominates(&self, earlier: &CounterSnapshot) -> bool {
        self.bytes_sent >= earlier.bytes_sent
            && self.bytes_received >= earlier.bytes_received
            && self.send_count >= earlier.send_count
    }
}

impl fmt::Display for CounterSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total_bytes={} / total_bytes_read={} / total_sends={}",
            self.bytes_sent, self.bytes_received, self.send_count
        )
    }
}
