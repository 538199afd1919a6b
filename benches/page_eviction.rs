//! Page Eviction Benchmarks
//!
//! Cost of choosing which rendered pages to drop when the cache is over
//! capacity. Runs on every insertion, so it should stay in the microseconds.
//!
//! Run with: `cargo bench --bench page_eviction`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use flipbook_offline::render::select_evictions;

fn bench_sequential_reading(c: &mut Criterion) {
    let mut group = c.benchmark_group("eviction/sequential");

    for capacity in [10usize, 50, 200] {
        let resident: Vec<u32> = (1..=capacity as u32 + 1).collect();
        group.throughput(Throughput::Elements(resident.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &resident, |b, resident| {
            b.iter(|| {
                select_evictions(
                    black_box(resident.iter().copied()),
                    black_box(capacity as u32 + 1),
                    capacity,
                )
            })
        });
    }

    group.finish();
}

fn bench_jump(c: &mut Criterion) {
    let mut group = c.benchmark_group("eviction/jump");

    // resident set left behind by a reader who skipped around a long book
    let resident: Vec<u32> = (1..=10).chain(400..=410).chain([800, 801, 802]).collect();
    for capacity in [10usize, 20] {
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &resident, |b, resident| {
            b.iter(|| select_evictions(black_box(resident.iter().copied()), black_box(801), capacity))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_sequential_reading, bench_jump);
criterion_main!(benches);
