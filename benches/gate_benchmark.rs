//! Benchmarks for region evaluation and gate decisions.
//!
//! Run with: cargo bench
//!
//! This benchmark suite measures:
//! - Pattern evaluation with a warm and a cold pattern cache
//! - Fingerprint construction
//! - Single-item checks and listing filters through the gate

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use regionwall::config::GateConfig;
use regionwall::geo::{CachedLocator, LocationDescriptor, StaticLocator};
use regionwall::store::MemoryStore;
use regionwall::{
    AccessGate, ContentItem, ContentVisibility, MemoryContentStore, RegionMode, RegionPolicy,
    Visitor,
};
use std::sync::Arc;

const FINGERPRINT: &str = "China|CN|Beijing ChinaNet39.9042,116.4074|https://search.example/|Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0|CN";

fn gate() -> AccessGate {
    let locator = StaticLocator::with_private_networks();
    locator
        .add(
            "1.2.0.0/16",
            LocationDescriptor {
                country: "China".into(),
                country_code: "CN".into(),
                city: "Beijing".into(),
                network: "ChinaNet".into(),
                coordinate: "39.9042,116.4074".into(),
                address: "China|CN|Beijing".into(),
            },
        )
        .unwrap();
    let config = GateConfig {
        secret: "bench-secret".into(),
        ..Default::default()
    };
    AccessGate::new(
        &config,
        Arc::new(CachedLocator::new(locator)),
        Arc::new(MemoryStore::new()),
    )
    .unwrap()
}

fn visitor() -> Visitor {
    Visitor::new("1.2.3.4".parse().unwrap())
        .with_url("blog.example.com", "/42")
        .with_header("User-Agent", "Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0")
        .with_header("Referer", "https://search.example/")
        .with_header("CF-IPCountry", "CN")
}

/// Benchmark policy evaluation for every mode
fn bench_policy_evaluate(c: &mut Criterion) {
    let policy = RegionPolicy::new();
    let rules: Vec<ContentVisibility> = RegionMode::ALL
        .iter()
        .map(|mode| ContentVisibility::new(*mode, "US|JP", "CN|HK"))
        .collect();

    let mut group = c.benchmark_group("policy_evaluate");
    group.throughput(Throughput::Elements(rules.len() as u64));

    group.bench_function("warm_cache", |b| {
        b.iter(|| {
            for rule in &rules {
                black_box(policy.evaluate(black_box(FINGERPRINT), rule));
            }
        })
    });

    group.bench_function("cold_cache", |b| {
        b.iter(|| {
            let policy = RegionPolicy::with_cache_capacity(16);
            for rule in &rules {
                black_box(policy.evaluate(black_box(FINGERPRINT), rule));
            }
        })
    });

    group.finish();
}

/// Benchmark context construction (location lookup and fingerprint)
fn bench_context(c: &mut Criterion) {
    let gate = gate();
    let visitor = visitor();

    c.bench_function("visitor_context", |b| {
        b.iter(|| black_box(gate.context(black_box(&visitor))))
    });
}

/// Benchmark an allowed single-item check
fn bench_check_single(c: &mut Criterion) {
    let gate = gate();
    let visitor = visitor();
    let ctx = gate.context(&visitor);
    let item = ContentItem::new(42, 1).with_visibility(ContentVisibility::allow("CN"));

    c.bench_function("check_single_allowed", |b| {
        b.iter(|| black_box(gate.check_single(&ctx, black_box(&item))))
    });
}

/// Benchmark listing filters with different store sizes
fn bench_listing(c: &mut Criterion) {
    let gate = gate();
    let visitor = visitor();
    let ctx = gate.context(&visitor);

    let mut group = c.benchmark_group("listing");

    for size in [100usize, 1_000, 10_000].iter() {
        let store = MemoryContentStore::new();
        for i in 0..*size {
            let mode = RegionMode::ALL[i % RegionMode::ALL.len()];
            store.insert(
                ContentItem::new(i as u64, (i % 8) as u32)
                    .with_visibility(ContentVisibility::new(mode, "US|CN", "HK")),
            );
        }

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("items", size), size, |b, _| {
            b.iter(|| black_box(gate.list(&ctx, &store)))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_policy_evaluate,
    bench_context,
    bench_check_single,
    bench_listing,
);

criterion_main!(benches);
