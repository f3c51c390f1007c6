use anyhow::{Context, Result};
use clap::Parser;
use pummel_core::{Config, Engine, RunSettings, RunSummary};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "pummel")]
#[command(about = "Steady-rate HTTP load generator with live latency stats")]
struct Args {
    /// Target URL (repeatable)
    #[arg(long = "url")]
    urls: Vec<String>,

    /// File with newline-separated target URLs (blank and # lines skipped)
    #[arg(long)]
    urls_file: Option<PathBuf>,

    /// Target requests per second (0 = idle heartbeat)
    #[arg(long)]
    rps: Option<u64>,

    /// Max simultaneous in-flight requests (0 = effectively unbounded)
    #[arg(long)]
    concurrency: Option<u32>,

    /// HTTP method
    #[arg(long)]
    method: Option<String>,

    /// Total per-request timeout in seconds
    #[arg(long)]
    timeout: Option<f64>,

    /// Request header as "Name: Value" (repeatable)
    #[arg(long = "header")]
    headers: Vec<String>,

    /// File whose raw bytes are sent as the request body
    #[arg(long)]
    body_file: Option<PathBuf>,

    /// Run length in seconds; absent = run until interrupted
    #[arg(long)]
    duration: Option<u64>,

    /// Disable TLS certificate verification
    #[arg(long)]
    insecure: bool,

    /// TOML configuration file; explicit flags take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the final summary as JSON to this path
    #[arg(long)]
    out: Option<PathBuf>,

    /// Log each request outcome
    #[arg(long, short = 'v')]
    verbose: bool,
}

#[derive(Debug, Serialize)]
struct RunReport {
    timestamp: String,
    duration_ms: u64,
    done: u64,
    ok: u64,
    err: u64,
    achieved_rps: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let file = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    let settings = resolve_settings(&args, &file)?;

    let concurrency = if settings.concurrency == 0 {
        "unbounded".to_string()
    } else {
        settings.concurrency.to_string()
    };
    info!(
        "starting: {} target(s), {} {} rps, concurrency {}",
        settings.urls.len(),
        settings.method,
        settings.rps,
        concurrency
    );

    let engine = Engine::new(settings)?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, draining");
                stop.store(true, Ordering::Relaxed);
            }
        });
    }

    let summary = engine.run(stop).await?;
    print_summary(&summary);

    if let Some(path) = &args.out {
        write_report(path, &summary)?;
        info!("results written to {}", path.display());
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "info,pummel_core=debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();
}

/// Merge CLI flags over config-file values into one resolved settings
/// struct. Targets given on the command line replace file-provided ones;
/// headers from both sources apply.
fn resolve_settings(args: &Args, file: &Config) -> Result<RunSettings> {
    let defaults = RunSettings::default();

    let mut urls = args.urls.clone();
    if let Some(path) = &args.urls_file {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read URL file {}", path.display()))?;
        urls.extend(parse_urls(&contents));
    }
    if urls.is_empty() {
        urls = file.target.urls.clone();
        if let Some(path) = &file.target.urls_file {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read URL file {path}"))?;
            urls.extend(parse_urls(&contents));
        }
    }
    if urls.is_empty() {
        anyhow::bail!("no target URLs; pass --url, --urls-file or a config file");
    }

    let mut headers = Vec::new();
    for line in file.target.headers.iter().chain(args.headers.iter()) {
        // Entries without a colon are silently skipped
        if let Some(header) = parse_header_line(line) {
            headers.push(header);
        }
    }

    let body_file = args
        .body_file
        .clone()
        .or_else(|| file.target.body_file.clone().map(PathBuf::from));
    let body = match &body_file {
        Some(path) => Some(
            std::fs::read(path)
                .with_context(|| format!("failed to read body file {}", path.display()))?,
        ),
        None => None,
    };

    let timeout_secs = args
        .timeout
        .or(file.target.timeout_secs)
        .unwrap_or(defaults.timeout.as_secs_f64());
    if !(timeout_secs > 0.0 && timeout_secs.is_finite()) {
        anyhow::bail!("timeout must be a positive number of seconds");
    }

    Ok(RunSettings {
        urls,
        method: args
            .method
            .clone()
            .or_else(|| file.target.method.clone())
            .unwrap_or(defaults.method),
        headers,
        body,
        rps: args.rps.or(file.load.rps).unwrap_or(defaults.rps),
        concurrency: args
            .concurrency
            .or(file.load.concurrency)
            .unwrap_or(defaults.concurrency),
        timeout: Duration::from_secs_f64(timeout_secs),
        duration: args
            .duration
            .or(file.load.duration_secs)
            .map(Duration::from_secs),
        insecure: args.insecure || file.target.insecure.unwrap_or(false),
    })
}

fn parse_urls(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn parse_header_line(line: &str) -> Option<(String, String)> {
    let (name, value) = line.split_once(':')?;
    Some((name.trim().to_string(), value.trim().to_string()))
}

fn print_summary(summary: &RunSummary) {
    println!("\n=== Run Summary ===");
    println!("Duration: {}ms", summary.duration_ms);
    println!("Done: {}", summary.done);
    println!("Ok: {}", summary.ok);
    println!("Err: {}", summary.err);
    println!("Achieved RPS: {:.1}", summary.achieved_rps);
    println!();
}

fn write_report(path: &std::path::Path, summary: &RunSummary) -> Result<()> {
    let report = RunReport {
        timestamp: chrono::Utc::now().to_rfc3339(),
        duration_ms: summary.duration_ms,
        done: summary.done,
        ok: summary.ok,
        err: summary.err,
        achieved_rps: summary.achieved_rps,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).ok();
        }
    }
    let json = serde_json::to_string_pretty(&report)?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write results to {}", path.display()))?;
    Ok(())
}
