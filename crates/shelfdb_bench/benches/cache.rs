//! Cache layer benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use shelfdb_core::{CacheConfig, CacheKey, CacheLayer, CollectionKey, StorageId};

fn keys(count: usize) -> Vec<CacheKey> {
    let sid = StorageId::new("records");
    (0..count)
        .map(|i| CacheKey::collection(&sid, &CollectionKey::new(format!("c{i}"))))
        .collect()
}

fn bench_get_hit(c: &mut Criterion) {
    let cache = CacheLayer::new(CacheConfig::default());
    let keys = keys(500);
    for (i, key) in keys.iter().enumerate() {
        cache.set(key.clone(), i);
    }

    c.bench_function("cache/get_hit", |b| {
        let mut i = 0;
        b.iter(|| {
            let key = &keys[i % keys.len()];
            i += 1;
            black_box(cache.get(black_box(key)));
        });
    });
}

fn bench_set_with_eviction(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache/set_evicting");
    for capacity in [100usize, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &capacity, |b, &cap| {
            let cache = CacheLayer::new(CacheConfig::default().with_capacity(cap));
            let keys = keys(cap * 2);
            let mut i = 0;
            b.iter(|| {
                cache.set(keys[i % keys.len()].clone(), i);
                i += 1;
            });
        });
    }
    group.finish();
}

fn bench_invalidate_prefix(c: &mut Criterion) {
    let keys = keys(1_000);
    let sid = StorageId::new("records");
    let target = CollectionKey::new("c42");

    c.bench_function("cache/invalidate_prefix_1000", |b| {
        let cache = CacheLayer::new(CacheConfig::default());
        b.iter(|| {
            for (i, key) in keys.iter().enumerate() {
                cache.set(key.clone(), i);
            }
            black_box(cache.invalidate_prefix(&sid, &target));
        });
    });
}

criterion_group!(
    benches,
    bench_get_hit,
    bench_set_with_eviction,
    bench_invalidate_prefix
);
criterion_main!(benches);
