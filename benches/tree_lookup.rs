//! Benchmarks for tree lookups and scans

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dictree::core::{build_to_vec, Container};
use dictree::{BuildConfig, CompressionMethod, Metadata, ReaderConfig, TrailerLayout};

fn container(n: usize, method: CompressionMethod, cache_nodes: usize) -> Container<Vec<u8>> {
    let entries = (0..n).map(|i| (format!("key{:08}", i), format!("value for entry {}", i)));
    let config = BuildConfig::default().with_compression(method);
    let bytes = build_to_vec(TrailerLayout::Single, &Metadata::new(), &config, entries).unwrap();
    Container::from_source(bytes, &ReaderConfig::default().with_cache(cache_nodes, 64 << 20)).unwrap()
}

fn benchmark_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_lookup");

    for size in [1_000, 100_000].iter() {
        let cached = container(*size, CompressionMethod::Deflate, 1024);
        let uncached = container(*size, CompressionMethod::Deflate, 0);

        group.bench_with_input(BenchmarkId::new("cached", size), size, |b, &size| {
            let mut i = 0usize;
            b.iter(|| {
                i = (i + 7919) % size;
                black_box(cached.entries().lookup(format!("key{:08}", i).as_bytes()).unwrap());
            });
        });

        group.bench_with_input(BenchmarkId::new("uncached", size), size, |b, &size| {
            let mut i = 0usize;
            b.iter(|| {
                i = (i + 7919) % size;
                black_box(uncached.entries().lookup(format!("key{:08}", i).as_bytes()).unwrap());
            });
        });
    }

    group.finish();
}

fn benchmark_lookup_by_compression(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_lookup_uncached");

    for method in [
        CompressionMethod::None,
        CompressionMethod::Deflate,
        CompressionMethod::Lz4,
        CompressionMethod::Zstd,
    ] {
        let container = container(50_000, method, 0);
        group.bench_function(format!("{:?}", method), |b| {
            let mut i = 0usize;
            b.iter(|| {
                i = (i + 7919) % 50_000;
                black_box(container.entries().lookup(format!("key{:08}", i).as_bytes()).unwrap());
            });
        });
    }

    group.finish();
}

fn benchmark_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_scan");
    let container = container(100_000, CompressionMethod::Deflate, 256);

    for prefix in ["key0009999", "key000999", "key00099"].iter() {
        let matches = container.entries().scan(prefix.as_bytes()).count();
        group.throughput(Throughput::Elements(matches as u64));
        group.bench_with_input(BenchmarkId::from_parameter(prefix), prefix, |b, prefix| {
            b.iter(|| {
                black_box(container.entries().scan(prefix.as_bytes()).count());
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_lookup,
    benchmark_lookup_by_compression,
    benchmark_scan
);
criterion_main!(benches);
