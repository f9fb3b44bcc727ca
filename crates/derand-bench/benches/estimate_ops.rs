//! Criterion benchmarks for the storage estimators.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use derand_bench::{reference_profile, stress_profile};
use derand_records::estimate::{estimate_events, estimate_sockcalls};

fn bench_estimate_events_10k(c: &mut Criterion) {
    let mut t = reference_profile(42).unwrap();
    t.canonicalize().unwrap();

    c.bench_function("estimate_events_10k", |b| {
        b.iter(|| black_box(estimate_events(&t.events, &t.sockcalls)));
    });
}

fn bench_estimate_sockcalls_100k(c: &mut Criterion) {
    let mut t = stress_profile(42).unwrap();
    t.canonicalize().unwrap();

    c.bench_function("estimate_sockcalls_100k", |b| {
        b.iter(|| black_box(estimate_sockcalls(&t.sockcalls)));
    });
}

fn bench_storage_reports_10k(c: &mut Criterion) {
    let mut t = reference_profile(42).unwrap();
    t.canonicalize().unwrap();

    c.bench_function("storage_reports_10k", |b| {
        b.iter(|| {
            let raw = t.raw_storage_report();
            let compressed = t.compressed_storage_report();
            black_box((raw.total(), compressed.total()));
        });
    });
}

criterion_group!(
    benches,
    bench_estimate_events_10k,
    bench_estimate_sockcalls_100k,
    bench_storage_reports_10k
);
criterion_main!(benches);
