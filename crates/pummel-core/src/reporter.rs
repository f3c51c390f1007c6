use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::warn;

use crate::stats::{Snapshot, StatsAggregator};

/// Emits one status line per second from the aggregator's window.
pub struct Reporter {
    stats: Arc<StatsAggregator>,
}

impl Reporter {
    pub fn new(stats: Arc<StatsAggregator>) -> Self {
        Self { stats }
    }

    /// Tick once per second until the stop signal arrives, then perform a
    /// final drain so the closing window is never silently dropped.
    pub async fn run(self, mut stop: broadcast::Receiver<()>) {
        let period = Duration::from_secs(1);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.emit(),
                _ = stop.recv() => {
                    self.emit();
                    break;
                }
            }
        }
    }

    fn emit(&self) {
        let snapshot = self.stats.snapshot_and_reset();
        let line = format_status_line(&snapshot);
        // A failed write must not take the run down; log it and let the
        // next tick try again.
        if let Err(err) = writeln!(std::io::stdout().lock(), "{line}") {
            warn!("failed to write status line: {err}");
        }
    }
}

pub fn format_status_line(s: &Snapshot) -> String {
    format!(
        "sent={} done={} ok={} err={} p50={:.1}ms p90={:.1}ms p99={:.1}ms \
         total done={} ok={} err={}",
        s.sent,
        s.done,
        s.ok,
        s.err,
        s.p50_ms,
        s.p90_ms,
        s.p99_ms,
        s.done_total,
        s.ok_total,
        s.err_total
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_line_format() {
        let snapshot = Snapshot {
            sent: 10,
            done: 9,
            ok: 8,
            err: 1,
            p50_ms: 12.34,
            p90_ms: 56.0,
            p99_ms: 120.5,
            done_total: 109,
            ok_total: 100,
            err_total: 9,
        };

        let line = format_status_line(&snapshot);
        assert_eq!(
            line,
            "sent=10 done=9 ok=8 err=1 p50=12.3ms p90=56.0ms p99=120.5ms \
             total done=109 ok=100 err=9"
        );
    }

    #[tokio::test]
    async fn test_stop_triggers_final_drain() {
        let stats = Arc::new(StatsAggregator::new());
        let (stop_tx, stop_rx) = broadcast::channel(1);

        stats.on_sent();
        stats.on_result(true, 5.0);

        let handle = tokio::spawn(Reporter::new(stats.clone()).run(stop_rx));
        stop_tx.send(()).unwrap();
        handle.await.unwrap();

        // The reporter's final drain consumed the pending window
        let snapshot = stats.snapshot_and_reset();
        assert_eq!(snapshot.sent, 0);
        assert_eq!(snapshot.done, 0);
        assert_eq!(snapshot.done_total, 1);
    }
}
