//! Benchmark: sampling-method grid scan
//!
//! Measures the two phases of an imaging run separately:
//! 1. Operator build + SVD, as a function of the trace length
//! 2. The per-point scan, as a function of the worker count
//!
//! Run with:
//!   cargo bench -p math-scatter-sampling --bench grid_scan

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use math_scatter_sampling::testdata::{ScenarioParams, SyntheticScenario};
use math_scatter_sampling::{
    CancelToken, ImagingConfig, ParallelScheduler, PreparedOperator, RegularizationConfig,
    SchedulerConfig, WindowConfig,
};
use std::time::Duration;

fn scenario(samples: usize) -> SyntheticScenario {
    SyntheticScenario::generate(ScenarioParams {
        samples,
        time_step: 10.0 / samples as f64,
        ..ScenarioParams::default()
    })
    .expect("synthetic scenario")
}

/// Build and factorize the operator for increasing trace lengths
fn bench_prepare(c: &mut Criterion) {
    let mut group = c.benchmark_group("prepare_operator");
    group.warm_up_time(Duration::from_secs(2));
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(10);

    for &samples in &[50, 100, 200] {
        let s = scenario(samples);
        group.throughput(Throughput::Elements((s.params.receivers * samples) as u64));

        group.bench_with_input(BenchmarkId::new("time_domain", samples), &s, |b, s| {
            b.iter(|| {
                let prepared = PreparedOperator::prepare(
                    &s.receivers,
                    &s.time_axis,
                    &s.data,
                    &WindowConfig::default(),
                )
                .expect("prepare");
                black_box(prepared)
            });
        });
    }

    group.finish();
}

/// Scan the standard grid with a fixed factorization
fn bench_scan_workers(c: &mut Criterion) {
    let mut group = c.benchmark_group("grid_scan");
    group.warm_up_time(Duration::from_secs(2));
    group.measurement_time(Duration::from_secs(5));

    let s = SyntheticScenario::standard().expect("synthetic scenario");
    let prepared =
        PreparedOperator::prepare(&s.receivers, &s.time_axis, &s.data, &WindowConfig::default())
            .expect("prepare");
    group.throughput(Throughput::Elements(s.grid.len() as u64));

    for &workers in &[1, 2, 4, 8] {
        let config = ImagingConfig {
            regularization: RegularizationConfig::truncated(5),
            scheduler: SchedulerConfig::with_workers(workers),
            ..ImagingConfig::default()
        };
        let scheduler = ParallelScheduler::new(&config.scheduler).expect("worker pool");

        group.bench_with_input(BenchmarkId::new("workers", workers), &config, |b, config| {
            b.iter(|| {
                let result = prepared
                    .image(&s.grid, &s.impulse, config, &scheduler, &CancelToken::new())
                    .expect("scan");
                black_box(result.field)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_prepare, bench_scan_workers);
criterion_main!(benches);
