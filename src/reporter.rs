use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::config::ReportFormat;
use crate::counters::{CounterSnapshot, Counters};
use crate::error::ConfigError;

/// Renders one status line.
pub fn format_status(snapshot: &CounterSnapshot, format: ReportFormat) -> String {
    match format {
        ReportFormat::Text => snapshot.to_string(),
        ReportFormat::Json => match sonic_rs::to_string(snapshot) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to encode status as JSON: {}", e);
                snapshot.to_string()
            }
        },
    }
}

/// Background status printer.
///
/// It only ever loads the counter atomics, so it never waits on a session.
/// Nothing joins it: the task ends when the runtime shuts down at process
/// exit.
pub struct Reporter {
    counters: Arc<Counters>,
    cadence: Duration,
    format: ReportFormat,
}

impl Reporter {
    pub fn new(
        counters: Arc<Counters>,
        cadence: Duration,
        format: ReportFormat,
    ) -> Result<Self, ConfigError> {
        if cadence.is_zero() {
            return Err(ConfigError::Zero {
                name: "report_interval_ms",
            });
        }
        Ok(Self {
            counters,
            cadence,
            format,
        })
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let mut ticker = interval(self.cadence);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let snapshot = self.counters.snapshot();
            info!("{}", format_status(&snapshot, self.format));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_status_has_all_three_fields() {
        let snapshot = CounterSnapshot {
            bytes_sent: 10,
            bytes_received: 7,
            send_count: 2,
        };
        let json = format_status(&snapshot, ReportFormat::Json);
        assert!(json.contains("\"bytes_sent\":10"));
        assert!(json.contains("\"bytes_received\":7"));
        assert!(json.contains("\"send_count\":2"));
    }

    #[test]
    fn text_status_matches_display() {
        let snapshot = CounterSnapshot::default();
        assert_eq!(
            format_status(&snapshot, ReportFormat::Text),
            "total_bytes=0 / total_bytes_read=0 / total_sends=0"
        );
    }

    #[tokio::test]
    async fn reporter_runs_until_aborted() {
        let counters = Counters::new();
        let handle = Reporter::new(
            Arc::clone(&counters),
            Duration::from_millis(10),
            ReportFormat::Text,
        )
        .unwrap()
        .spawn();

        counters.add_sent(5);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
        assert_eq!(counters.snapshot().bytes_sent, 5);
    }

    #[test]
    fn zero_cadence_is_rejected() {
        let result = Reporter::new(Counters::new(), Duration::ZERO, ReportFormat::Text);
        assert!(matches!(
            result,
            Err(ConfigError::Zero {
                name: "report_interval_ms"
            })
        ));
    }
}
