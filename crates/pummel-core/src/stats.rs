use serde::Serialize;
use std::sync::Mutex;

/// Counters for the current one-second reporting window.
#[derive(Debug, Default)]
struct WindowCounters {
    sent: u64,
    done: u64,
    ok: u64,
    err: u64,
    latencies_ms: Vec<f64>,
}

#[derive(Debug, Default)]
struct StatsInner {
    window: WindowCounters,
    done_total: u64,
    ok_total: u64,
    err_total: u64,
}

/// Thread-safe statistics aggregator.
///
/// All counters live behind one lock; every operation is O(1) except the
/// snapshot, which takes the window's latency buffer with it. Counters are
/// never mutated from outside this type.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    inner: Mutex<StatsInner>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that one request was issued.
    pub fn on_sent(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.window.sent += 1;
    }

    /// Record one completed request, exactly once per dispatch.
    pub fn on_result(&self, ok: bool, latency_ms: f64) {
        let mut inner = self.inner.lock().unwrap();
        inner.window.done += 1;
        inner.done_total += 1;
        if ok {
            inner.window.ok += 1;
            inner.ok_total += 1;
        } else {
            inner.window.err += 1;
            inner.err_total += 1;
        }
        inner.window.latencies_ms.push(latency_ms);
    }

    /// Atomically drain the window counters, leaving them zeroed.
    /// Cumulative totals are unaffected.
    pub fn snapshot_and_reset(&self) -> Snapshot {
        let (window, done_total, ok_total, err_total) = {
            let mut inner = self.inner.lock().unwrap();
            (
                std::mem::take(&mut inner.window),
                inner.done_total,
                inner.ok_total,
                inner.err_total,
            )
        };

        let mut latencies = window.latencies_ms;
        latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        Snapshot {
            sent: window.sent,
            done: window.done,
            ok: window.ok,
            err: window.err,
            p50_ms: percentile(&latencies, 0.50),
            p90_ms: percentile(&latencies, 0.90),
            p99_ms: percentile(&latencies, 0.99),
            done_total,
            ok_total,
            err_total,
        }
    }

    /// Cumulative (done, ok, err) totals since process start.
    pub fn totals(&self) -> (u64, u64, u64) {
        let inner = self.inner.lock().unwrap();
        (inner.done_total, inner.ok_total, inner.err_total)
    }
}

/// One drained reporting window plus the cumulative totals at drain time.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub sent: u64,
    pub done: u64,
    pub ok: u64,
    pub err: u64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p99_ms: f64,
    pub done_total: u64,
    pub ok_total: u64,
    pub err_total: u64,
}

/// Index-based percentile: the element at `floor(p * n)` of the ascending
/// sorted slice, clamped to the last element. No interpolation, and an
/// empty slice reports 0.0. This exact policy is load-bearing for the
/// reported numbers; do not switch to an interpolated rank.
fn percentile(sorted_ms: &[f64], p: f64) -> f64 {
    if sorted_ms.is_empty() {
        return 0.0;
    }
    let idx = ((p * sorted_ms.len() as f64).floor() as usize).min(sorted_ms.len() - 1);
    sorted_ms[idx]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_done_total_is_ok_plus_err() {
        let stats = StatsAggregator::new();
        for i in 0..10 {
            stats.on_sent();
            stats.on_result(i % 3 != 0, 5.0);
        }

        let (done, ok, err) = stats.totals();
        assert_eq!(done, 10);
        assert_eq!(done, ok + err);
    }

    #[test]
    fn test_snapshot_resets_window_not_totals() {
        let stats = StatsAggregator::new();
        stats.on_sent();
        stats.on_sent();
        stats.on_result(true, 12.0);
        stats.on_result(false, 30.0);

        let snap = stats.snapshot_and_reset();
        assert_eq!(snap.sent, 2);
        assert_eq!(snap.done, 2);
        assert_eq!(snap.ok, 1);
        assert_eq!(snap.err, 1);
        assert_eq!(snap.done_total, 2);

        // Window is empty again, totals survive
        let snap = stats.snapshot_and_reset();
        assert_eq!(snap.sent, 0);
        assert_eq!(snap.done, 0);
        assert_eq!(snap.ok, 0);
        assert_eq!(snap.err, 0);
        assert_eq!(snap.p50_ms, 0.0);
        assert_eq!(snap.done_total, 2);
        assert_eq!(snap.ok_total, 1);
        assert_eq!(snap.err_total, 1);
    }

    #[test]
    fn test_percentile_indexing() {
        // floor(p * n) into the sorted values, no interpolation
        let values = vec![10.0, 20.0, 30.0, 40.0];
        assert_eq!(percentile(&values, 0.50), 30.0);
        assert_eq!(percentile(&values, 0.90), 40.0);
        assert_eq!(percentile(&values, 0.99), 40.0);

        let single = vec![7.5];
        assert_eq!(percentile(&single, 0.50), 7.5);
        assert_eq!(percentile(&single, 0.99), 7.5);

        assert_eq!(percentile(&[], 0.50), 0.0);
    }

    #[test]
    fn test_percentiles_are_monotonic() {
        let stats = StatsAggregator::new();
        for latency in [3.0, 120.0, 45.0, 8.0, 300.0, 15.0, 15.0, 60.0, 2.0] {
            stats.on_result(true, latency);
        }

        let snap = stats.snapshot_and_reset();
        assert!(snap.p50_ms <= snap.p90_ms, "p50 {} p90 {}", snap.p50_ms, snap.p90_ms);
        assert!(snap.p90_ms <= snap.p99_ms, "p90 {} p99 {}", snap.p90_ms, snap.p99_ms);
    }

    #[test]
    fn test_unsorted_input_is_sorted_for_percentiles() {
        let stats = StatsAggregator::new();
        stats.on_result(true, 50.0);
        stats.on_result(true, 1.0);

        let snap = stats.snapshot_and_reset();
        // floor(0.5 * 2) == 1 -> second element of the sorted pair
        assert_eq!(snap.p50_ms, 50.0);
    }
}
