use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hdrhistogram::{CreationError, Histogram};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::{DrainEnd, SessionError};

/// How each session ended. Kept apart from [`crate::Counters`] so a failed
/// session leaves the traffic totals untouched.
pub struct SessionStats {
    connect_latency: Mutex<Histogram<u64>>,
    started: AtomicU64,
    connected: AtomicU64,
    connect_failures: AtomicU64,
    write_failures: AtomicU64,
    closed: AtomicU64,
    abandoned: AtomicU64,
    drain_early_exit: AtomicU64,
    drain_idle: AtomicU64,
    drain_peer_closed: AtomicU64,
    drain_failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TallySnapshot {
    pub started: u64,
    pub connected: u64,
    pub connect_failures: u64,
    pub write_failures: u64,
    pub closed: u64,
    pub abandoned: u64,
    pub drain_early_exit: u64,
    pub drain_idle: u64,
    pub drain_peer_closed: u64,
    pub drain_failed: u64,
}

impl SessionStats {
    pub fn new() -> Result<Arc<Self>, CreationError> {
        Ok(Arc::new(Self {
            connect_latency: Mutex::new(Histogram::<u64>::new_with_bounds(1, 60_000, 3)?),
            started: AtomicU64::new(0),
            connected: AtomicU64::new(0),
            connect_failures: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            closed: AtomicU64::new(0),
            abandoned: AtomicU64::new(0),
            drain_early_exit: AtomicU64::new(0),
            drain_idle: AtomicU64::new(0),
            drain_peer_closed: AtomicU64::new(0),
            drain_failed: AtomicU64::new(0),
        }))
    }

    pub fn record_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn record_connected(&self, latency: Duration) {
        self.connected.fetch_add(1, Ordering::Relaxed);
        let millis = (latency.as_millis() as u64).max(1);
        self.connect_latency.lock().await.saturating_record(millis);
    }

    pub fn record_failure(&self, err: &SessionError) {
        if err.is_connect() {
            self.connect_failures.fetch_add(1, Ordering::Relaxed);
        } else {
            self.write_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_drain(&self, end: DrainEnd) {
        let counter = match end {
            DrainEnd::EarlyExit => &self.drain_early_exit,
            DrainEnd::WouldBlock | DrainEnd::Idle => &self.drain_idle,
            DrainEnd::PeerClosed => &self.drain_peer_closed,
            DrainEnd::Failed(_) => &self.drain_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_close(&self, closed: bool) {
        if closed {
            self.closed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.abandoned.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn tally(&self) -> TallySnapshot {
        TallySnapshot {
            started: self.started.load(Ordering::Relaxed),
            connected: self.connected.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            closed: self.closed.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            drain_early_exit: self.drain_early_exit.load(Ordering::Relaxed),
            drain_idle: self.drain_idle.load(Ordering::Relaxed),
            drain_peer_closed: self.drain_peer_closed.load(Ordering::Relaxed),
            drain_failed: self.drain_failed.load(Ordering::Relaxed),
        }
    }

    pub async fn print_summary(&self) {
        let tally = self.tally();
        let hist = self.connect_latency.lock().await;

        info!("");
        info!("Session Outcomes:");
        info!("  Started:             {}", tally.started);
        info!("  Connected:           {}", tally.connected);
        info!("  Connect Failures:    {}", tally.connect_failures);
        info!("  Write Failures:      {}", tally.write_failures);
        info!("  Closed:              {}", tally.closed);
        info!("  Abandoned:           {}", tally.abandoned);

        info!("");
        info!("Drain Endings:");
        info!("  Early Exit:          {}", tally.drain_early_exit);
        info!("  Idle:                {}", tally.drain_idle);
        info!("  Peer Closed:         {}", tally.drain_peer_closed);
        info!("  Read Error:          {}", tally.drain_failed);

        info!("");
        info!("Connect Latency (ms):");
        if hist.len() > 0 {
            info!("  Min:    {:.2}", hist.min());
            info!("  Mean:   {:.2}", hist.mean());
            info!("  p50:    {:.2}", hist.value_at_quantile(0.50));
            info!("  p95:    {:.2}", hist.value_at_quantile(0.95));
            info!("  p99:    {:.2}", hist.value_at_quantile(0.99));
            info!("  Max:    {:.2}", hist.max());
        } else {
            info!("  No data");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[tokio::test]
    async fn tallies_each_outcome() {
        let stats = SessionStats::new().unwrap();

        stats.record_started();
        stats.record_started();
        stats.record_connected(Duration::from_millis(3)).await;
        stats.record_failure(&SessionError::Connect {
            addr: "127.0.0.1:1".to_string(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        });
        stats.record_drain(DrainEnd::WouldBlock);
        stats.record_drain(DrainEnd::Failed(io::ErrorKind::ConnectionReset));
        stats.record_close(false);

        let tally = stats.tally();
        assert_eq!(tally.started, 2);
        assert_eq!(tally.connected, 1);
        assert_eq!(tally.connect_failures, 1);
        assert_eq!(tally.write_failures, 0);
        assert_eq!(tally.drain_idle, 1);
        assert_eq!(tally.drain_failed, 1);
        assert_eq!(tally.abandoned, 1);
        assert_eq!(tally.closed, 0);
    }

    #[tokio::test]
    async fn sub_millisecond_connects_are_recorded() {
        let stats = SessionStats::new().unwrap();
        stats.record_connected(Duration::from_micros(200)).await;
        assert_eq!(stats.connect_latency.lock().await.len(), 1);
    }
}
