// Admission control hot paths
//
// - Immediate admissions under a disabled profile and under Premium limits
// - Window bookkeeping in the quota tracker
// - Status snapshots
//
// Usage:
//   cargo bench --bench admission

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use quotaguard_client::rate_limit::quota::SECOND_MS;
use quotaguard_client::rate_limit::{
    AdmissionController, ManualClock, Profile, QuotaTracker, RateLimiterConfig,
};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

// Midnight UTC, 2024-01-01
const T0: u64 = 1_704_067_200_000;

fn bench_tracker(c: &mut Criterion) {
    c.bench_function("tracker_refresh_and_record", |b| {
        let mut tracker = QuotaTracker::new(Some(16), Some(50_000), T0);
        let mut now = T0;
        b.iter(|| {
            // Roll into a fresh second every call so the limit never binds
            now += SECOND_MS;
            tracker.refresh_windows(black_box(now));
            if tracker.has_capacity() {
                black_box(tracker.record());
            }
        });
    });
}

fn bench_request_wait(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("request_wait_immediate");

    for profile in [Profile::Disabled, Profile::Premium] {
        group.bench_with_input(BenchmarkId::from_parameter(profile), &profile, |b, &profile| {
            let clock = Arc::new(ManualClock::new(T0));
            let controller =
                AdmissionController::with_clock(RateLimiterConfig::new(profile), clock.clone())
                    .unwrap();

            b.iter(|| {
                // Each admission gets its own second
                clock.advance(Duration::from_millis(SECOND_MS));
                rt.block_on(async {
                    let admission = controller.request_wait().await.unwrap();
                    admission.release();
                })
            });
        });
    }

    group.finish();
}

fn bench_status(c: &mut Criterion) {
    let clock = Arc::new(ManualClock::new(T0));
    let controller =
        AdmissionController::with_clock(RateLimiterConfig::new(Profile::Standard), clock).unwrap();
    controller.record_admission();

    c.bench_function("status_snapshot", |b| {
        b.iter(|| black_box(controller.status()));
    });
}

criterion_group!(benches, bench_tracker, bench_request_wait, bench_status);
criterion_main!(benches);
