// Prometheus metrics for admission control
//
// - Admissions by path (immediate, queued)
// - Rejections by reason (rate_limited, queue_full, timeout)
// - Released reservations (counter)
// - Waiter queue depth (gauge)
// - Time spent queued (histogram)

use lazy_static::lazy_static;
use prometheus::{Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    pub static ref ADMISSIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("quotaguard_admissions_total", "Requests admitted against the quota"),
        &["path"]
    ).expect("Failed to create admissions metric");

    pub static ref REJECTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("quotaguard_rejections_total", "Requests rejected by the admission controller"),
        &["reason"]
    ).expect("Failed to create rejections metric");

    pub static ref RELEASES_TOTAL: IntCounter = IntCounter::new(
        "quotaguard_releases_total",
        "Reservations given back because the request was never dispatched"
    ).expect("Failed to create releases metric");

    pub static ref QUEUE_DEPTH: IntGauge = IntGauge::new(
        "quotaguard_queue_depth",
        "Requests currently waiting for a slot"
    ).expect("Failed to create queue depth metric");

    pub static ref QUEUE_WAIT_SECONDS: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new("quotaguard_queue_wait_seconds", "Time a queued request waited for a slot")
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 60.0]),
    ).expect("Failed to create queue wait metric");
}

/// Register all metrics - call once per process
pub fn init() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(ADMISSIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REJECTIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RELEASES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(QUEUE_DEPTH.clone()))?;
    REGISTRY.register(Box::new(QUEUE_WAIT_SECONDS.clone()))?;
    Ok(())
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}
