//! IntSet benchmarks: insertion at increasing widths and membership tests.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use kvprim_core::IntSet;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn bench_add(c: &mut Criterion) {
    let sizes: &[usize] = &[16, 256, 4096, 65536];
    let mut group = c.benchmark_group("intset_add");

    for &size in sizes {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("ascending_i16", size), &size, |b, &n| {
            b.iter(|| {
                let mut set = IntSet::new();
                for v in 0..n as i64 {
                    set.add(black_box(v));
                }
                black_box(&set);
            });
        });

        group.bench_with_input(BenchmarkId::new("random_forces_i64", size), &size, |b, &n| {
            let mut rng = ChaCha8Rng::seed_from_u64(1);
            let values: Vec<i64> = (0..n).map(|_| rng.gen_range(i64::MIN..i64::MAX)).collect();
            b.iter(|| {
                let mut set = IntSet::new();
                for &v in &values {
                    set.add(black_box(v));
                }
                black_box(&set);
            });
        });
    }
    group.finish();
}

fn bench_contains(c: &mut Criterion) {
    let mut group = c.benchmark_group("intset_contains");
    let set: IntSet = (0..100_000i64).collect();

    group.bench_function("hit", |b| {
        b.iter(|| black_box(set.contains(black_box(50_000))));
    });
    group.bench_function("miss", |b| {
        b.iter(|| black_box(set.contains(black_box(-1))));
    });
    group.finish();
}

criterion_group!(benches, bench_add, bench_contains);
criterion_main!(benches);
