// QuotaGuard - Main Entry Point
//
// Command-line front end for the quota-aware API client:
// - Inspect the configured quota
// - Simulate bursts of traffic against the admission controller
// - Issue rate-limited GET requests against the remote API

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quotaguard_client::config::{Config, LoggingConfig};
use quotaguard_client::metrics;
use quotaguard_client::rate_limit::{AdmissionController, Profile, RateLimitError};
use quotaguard_client::transport::{HttpTransport, RateLimitedTransport};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

/// QuotaGuard: quota-aware client for rate-limited HTTP APIs
#[derive(Parser, Debug)]
#[command(name = "quotaguard")]
#[command(author = "QuotaGuard Contributors")]
#[command(version)]
#[command(about = "Quota-aware client for rate-limited HTTP APIs", long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the configured quota and current throttling state
    Status {
        /// Print the status as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push a burst of requests through the admission controller without network I/O
    Simulate {
        /// Number of requests to admit
        #[arg(short = 'n', long, default_value_t = 10)]
        requests: usize,

        /// Requests in flight at once
        #[arg(short = 'j', long, default_value_t = 4)]
        concurrency: usize,

        /// Override the configured profile
        #[arg(long)]
        profile: Option<Profile>,

        /// Print Prometheus metrics afterwards
        #[arg(long)]
        metrics: bool,
    },
    /// Send a rate-limited GET request and print the JSON response
    Get {
        /// Path relative to the configured base URL
        path: String,

        /// Query parameters as key=value
        #[arg(short, long, value_parser = parse_key_value)]
        query: Vec<(String, String)>,

        /// Give up if no slot is granted within this many seconds
        #[arg(long)]
        wait_timeout: Option<u64>,
    },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    // Load configuration
    let config = match &args.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;

    init_tracing(&config.logging, args.verbose)?;

    if let Err(e) = metrics::init() {
        warn!("Failed to register metrics: {}", e);
    }

    info!("QuotaGuard v{} starting...", env!("CARGO_PKG_VERSION"));

    match args.command {
        Some(Commands::Status { json }) => show_status(&config, json)?,
        Some(Commands::Simulate {
            requests,
            concurrency,
            profile,
            metrics,
        }) => {
            simulate(&config, requests, concurrency, profile, metrics).await?;
        }
        Some(Commands::Get {
            path,
            query,
            wait_timeout,
        }) => {
            get(&config, &path, &query, wait_timeout).await?;
        }
        None => {
            info!("No command specified. Use \"quotaguard --help\" for usage.");
        }
    }

    Ok(())
}

/// Initialize tracing from the `[logging]` section; logs go to stderr
fn init_tracing(logging: &LoggingConfig, verbose: bool) -> Result<()> {
    let level = if verbose {
        Level::DEBUG
    } else {
        logging
            .level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))?
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match logging.format.to_lowercase().as_str() {
        "json" => builder.json().init(),
        "pretty" => builder.pretty().init(),
        _ => builder.compact().init(),
    }

    Ok(())
}

fn build_limiter(config: &Config, profile: Option<Profile>) -> Result<AdmissionController> {
    let mut settings = config.rate_limit.clone();
    if let Some(profile) = profile {
        settings.profile = profile;
    }
    AdmissionController::new(settings.to_limiter_config()).context("Invalid rate limit configuration")
}

/// Print the quota a fresh client would start with
fn show_status(config: &Config, json: bool) -> Result<()> {
    let limiter = build_limiter(config, None)?;
    let status = limiter.status();

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("{}", status);
        println!(
            "Queueing: {} (max {} waiters)",
            if config.rate_limit.queue_requests { "on" } else { "off" },
            config.rate_limit.max_queue_size
        );
        println!("Next reset: {}", format_reset(limiter.next_reset_timestamp()));
    }

    Ok(())
}

fn format_reset(timestamp_ms: u64) -> String {
    if timestamp_ms == 0 {
        return "never (limits disabled)".to_string();
    }
    chrono::DateTime::from_timestamp_millis(timestamp_ms as i64)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

/// Outcome counts of a simulated burst
#[derive(Debug, Default)]
struct SimulationReport {
    immediate: usize,
    queued: usize,
    rejected: usize,
}

async fn simulate(
    config: &Config,
    requests: usize,
    concurrency: usize,
    profile: Option<Profile>,
    show_metrics: bool,
) -> Result<()> {
    anyhow::ensure!(concurrency > 0, "--concurrency must be at least 1");

    let limiter = build_limiter(config, profile)?;
    let gate = Arc::new(Semaphore::new(concurrency));
    let started = Instant::now();

    info!(
        requests,
        concurrency,
        profile = %limiter.profile(),
        "Starting simulation"
    );

    let mut tasks = JoinSet::new();
    for i in 0..requests {
        let limiter = limiter.clone();
        let gate = Arc::clone(&gate);
        tasks.spawn(async move {
            let _permit = gate.acquire_owned().await?;
            let result = limiter.request_wait().await;
            if let Ok(admission) = &result {
                tracing::debug!(request = i, waited = ?admission.waited(), "Admitted");
            }
            Ok::<_, anyhow::Error>(result)
        });
    }

    let mut report = SimulationReport::default();
    while let Some(joined) = tasks.join_next().await {
        match joined.context("Simulation task panicked")?? {
            Ok(admission) if admission.was_queued() => report.queued += 1,
            Ok(_) => report.immediate += 1,
            Err(RateLimitError::RateLimitExceeded { .. }) | Err(RateLimitError::QueueFull { .. }) => {
                report.rejected += 1
            }
            Err(e) => return Err(e.into()),
        }
    }

    let elapsed = started.elapsed();
    println!(
        "Admitted {} of {} requests ({} immediate, {} queued, {} rejected) in {:.2}s",
        report.immediate + report.queued,
        requests,
        report.immediate,
        report.queued,
        report.rejected,
        elapsed.as_secs_f64()
    );
    println!("{}", limiter.status());

    if show_metrics {
        print!("{}", metrics::gather_metrics()?);
    }

    Ok(())
}

async fn get(
    config: &Config,
    path: &str,
    query: &[(String, String)],
    wait_timeout: Option<u64>,
) -> Result<()> {
    let limiter = build_limiter(config, None)?;
    let http = HttpTransport::from_settings(&config.client).context("Failed to create HTTP transport")?;

    let mut client = RateLimitedTransport::new(http, limiter);
    if let Some(secs) = wait_timeout {
        client = client.with_wait_timeout(Duration::from_secs(secs));
    }

    let query: Vec<(&str, &str)> = query.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    let body = client
        .get(path, &query)
        .await
        .with_context(|| format!("GET {} failed", path))?;

    println!("{}", serde_json::to_string_pretty(&body)?);
    info!("{}", client.status());

    Ok(())
}
