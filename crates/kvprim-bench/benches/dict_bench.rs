//! Dict benchmarks: bulk insertion through growth/rehash, and steady-state
//! lookups on a dict that is not currently rehashing.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use kvprim_core::Dict;

fn bench_insert(c: &mut Criterion) {
    let sizes: &[usize] = &[256, 4096, 65536];
    let mut group = c.benchmark_group("dict_insert");

    for &size in sizes {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("sequential_u64", size), &size, |b, &n| {
            b.iter(|| {
                let mut d: Dict<u64, u64> = Dict::new();
                for i in 0..n as u64 {
                    d.insert(black_box(i), i).unwrap();
                }
                black_box(&d);
            });
        });
    }
    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("dict_get");
    let mut d: Dict<u64, u64> = Dict::new();
    for i in 0..100_000u64 {
        d.insert(i, i).unwrap();
    }
    while d.is_rehashing() {
        d.rehash_step(64);
    }

    group.bench_function("hit", |b| {
        b.iter(|| black_box(d.get(black_box(&50_000))));
    });
    group.bench_function("miss", |b| {
        b.iter(|| black_box(d.get(black_box(&999_999_999))));
    });
    group.finish();
}

criterion_group!(benches, bench_insert, bench_get);
criterion_main!(benches);
