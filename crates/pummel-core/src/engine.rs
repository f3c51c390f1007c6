use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep_until, Instant};
use tracing::info;

use crate::dispatch::{Dispatcher, RequestTemplate};
use crate::limiter::ConcurrencyLimiter;
use crate::reporter::Reporter;
use crate::stats::StatsAggregator;
use crate::target::TargetList;

const WINDOW: Duration = Duration::from_secs(1);

/// Resolved run parameters, after CLI flags and any config file merge.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub urls: Vec<String>,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    /// Requests per second; 0 sends nothing and idles through each window.
    pub rps: u64,
    /// Max in-flight requests; 0 = effectively unbounded.
    pub concurrency: u32,
    pub timeout: Duration,
    /// Absent = run until the stop flag is raised.
    pub duration: Option<Duration>,
    pub insecure: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            method: "GET".to_string(),
            headers: Vec::new(),
            body: None,
            rps: 10,
            concurrency: 0,
            timeout: Duration::from_secs(15),
            duration: None,
            insecure: false,
        }
    }
}

/// Cumulative outcome of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub duration_ms: u64,
    pub done: u64,
    pub ok: u64,
    pub err: u64,
    pub achieved_rps: f64,
}

/// Owns the shared connection pool, the limiter, the aggregator and the
/// target cursor, and drives the per-second pacing loop.
pub struct Engine {
    rps: u64,
    duration: Option<Duration>,
    targets: Arc<TargetList>,
    dispatcher: Arc<Dispatcher>,
    stats: Arc<StatsAggregator>,
}

impl Engine {
    pub fn new(settings: RunSettings) -> Result<Self> {
        let targets = Arc::new(TargetList::new(settings.urls.clone())?);
        let template =
            RequestTemplate::build(&settings.method, &settings.headers, settings.body.clone())?;
        let client = build_client(&settings)?;
        let limiter = ConcurrencyLimiter::new(settings.concurrency);
        let stats = Arc::new(StatsAggregator::new());
        let dispatcher = Arc::new(Dispatcher::new(client, template, limiter, stats.clone()));

        Ok(Self {
            rps: settings.rps,
            duration: settings.duration,
            targets,
            dispatcher,
            stats,
        })
    }

    pub fn stats(&self) -> Arc<StatsAggregator> {
        self.stats.clone()
    }

    /// Drive windows until the stop flag is raised or the configured
    /// duration elapses, then drain and return the cumulative summary.
    ///
    /// Each window spawns one task per slot and suspends exactly once, for
    /// whatever remains of the second. An overrunning window starts its
    /// successor immediately instead of sleeping a negative remainder, so
    /// pacing degrades gracefully under overload instead of drifting.
    pub async fn run(&self, stop: Arc<AtomicBool>) -> Result<RunSummary> {
        let started = Instant::now();
        let deadline = self.duration.map(|d| started + d);

        let (reporter_stop_tx, reporter_stop_rx) = broadcast::channel(1);
        let reporter_handle =
            tokio::spawn(Reporter::new(self.stats.clone()).run(reporter_stop_rx));

        // Wait-group over in-flight dispatches: every task holds a clone
        // of the sender and recv() yields None once the last clone drops.
        let (inflight_tx, mut inflight_rx) = mpsc::channel::<()>(1);

        loop {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            let window_start = Instant::now();
            if let Some(deadline) = deadline {
                if window_start >= deadline {
                    break;
                }
            }

            if self.rps == 0 {
                // Idle heartbeat
                sleep_until(window_start + WINDOW).await;
                continue;
            }

            for slot in 0..self.rps {
                let scheduled_at = window_start + slot_offset(slot, self.rps);
                let url = self.targets.next().to_string();
                let dispatcher = self.dispatcher.clone();
                let guard = inflight_tx.clone();
                tokio::spawn(async move {
                    dispatcher.dispatch(&url, scheduled_at).await;
                    drop(guard);
                });
            }

            sleep_until(window_start + WINDOW).await;
        }

        info!("scheduling stopped, draining in-flight requests");
        drop(inflight_tx);
        let _ = inflight_rx.recv().await;

        let _ = reporter_stop_tx.send(());
        reporter_handle.await.context("reporter task panicked")?;

        let (done, ok, err) = self.stats.totals();
        let elapsed = started.elapsed();
        let achieved_rps = if elapsed.as_secs_f64() > 0.0 {
            done as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        Ok(RunSummary {
            duration_ms: elapsed.as_millis() as u64,
            done,
            ok,
            err,
            achieved_rps,
        })
    }
}

/// Send instant of slot `i` relative to its window start: `i * (1/rps)`.
fn slot_offset(slot: u64, rps: u64) -> Duration {
    Duration::from_secs_f64(slot as f64 / rps as f64)
}

fn build_client(settings: &RunSettings) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(settings.timeout);
    if settings.concurrency > 0 {
        // Idle pool holds at least twice the in-flight cap
        builder = builder.pool_max_idle_per_host((settings.concurrency as usize * 2).max(256));
    }
    if settings.insecure {
        builder = builder.danger_accept_invalid_certs(true);
    }
    builder.build().context("failed to build HTTP client")
}
