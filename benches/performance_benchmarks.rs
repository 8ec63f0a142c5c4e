use chrono::{Days, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use healthtrend::{
    AnalysisConfig, CorrelationEngine, HealthAnalyzer, HealthLogEntry, Metric,
    MetricSeriesExtractor, TrendModelFitter,
};
use std::collections::BTreeMap;

/// Performance benchmarks for the analysis engine
///
/// These benchmarks run the core fitting and analysis paths over logs of
/// increasing length to check that cost stays near linear.

fn create_log(days: u64) -> Vec<HealthLogEntry> {
    let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
    (0..days)
        .map(|i| {
            let wave = ((i as f64) * 0.3).sin();
            let drift = i as f64 / days as f64;
            HealthLogEntry::new(start + Days::new(i))
                .with(Metric::Bpm, 64.0 + 4.0 * wave)
                .with(Metric::Weight, 72.0 - drift)
                .with(Metric::Fatigue, 5.0 + 2.0 * wave)
                .with(Metric::Stiffness, 4.5 + 2.0 * wave + drift)
                .with(Metric::BackPain, 4.0 + 1.5 * wave)
                .with(Metric::Sleep, 7.0 - 1.5 * wave)
                .with(Metric::JointPain, 3.0 + wave)
                .with(Metric::Mobility, 7.0 - wave)
                .with(Metric::Mood, 6.0 + ((i % 5) as f64 - 2.0) * 0.5)
                .with(Metric::Steps, 6000.0 + 1500.0 * wave)
                .with_flare(wave > 0.9)
        })
        .collect()
}

fn bench_trend_fitting(c: &mut Criterion) {
    let fitter = TrendModelFitter::new();
    let mut group = c.benchmark_group("Trend Fitting");

    for &days in &[7, 30, 90, 365] {
        let logs = create_log(days);
        let series = MetricSeriesExtractor::extract(&logs, Metric::Fatigue);

        group.throughput(Throughput::Elements(days));
        group.bench_with_input(BenchmarkId::new("fit", days), &series, |b, series| {
            b.iter(|| fitter.fit(black_box(series)));
        });
    }

    group.finish();
}

fn bench_correlation_matrix(c: &mut Criterion) {
    let engine = CorrelationEngine::new();
    let mut group = c.benchmark_group("Correlation Matrix");

    for &days in &[30, 365] {
        let logs = create_log(days);
        let series: BTreeMap<Metric, _> = Metric::ALL
            .iter()
            .map(|&m| (m, MetricSeriesExtractor::extract(&logs, m)))
            .collect();

        group.bench_with_input(BenchmarkId::new("all_metrics", days), &series, |b, series| {
            b.iter(|| engine.compute_correlation_matrix(black_box(series)));
        });
    }

    group.finish();
}

fn bench_full_analysis(c: &mut Criterion) {
    let parallel = HealthAnalyzer::new();
    let serial = HealthAnalyzer::with_config(AnalysisConfig {
        parallel: false,
        ..AnalysisConfig::default()
    })
    .unwrap();

    let mut group = c.benchmark_group("Full Analysis");
    group.sample_size(20);

    for &days in &[30, 180, 730] {
        let logs = create_log(days);
        let window = &logs[logs.len() - 30..];

        group.throughput(Throughput::Elements(days));
        group.bench_with_input(BenchmarkId::new("parallel", days), &logs, |b, logs| {
            b.iter(|| parallel.analyze(black_box(window), black_box(logs)));
        });
        group.bench_with_input(BenchmarkId::new("serial", days), &logs, |b, logs| {
            b.iter(|| serial.analyze(black_box(window), black_box(logs)));
        });
    }

    group.finish();
}

fn bench_forecast(c: &mut Criterion) {
    let analyzer = HealthAnalyzer::new();
    let logs = create_log(120);

    c.bench_function("forecast_30_days", |b| {
        b.iter(|| analyzer.forecast(black_box(&logs), Metric::Sleep, 30, Some(0.95)));
    });
}

criterion_group!(
    benches,
    bench_trend_fitting,
    bench_correlation_matrix,
    bench_full_analysis,
    bench_forecast
);
criterion_main!(benches);
