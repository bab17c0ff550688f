//! Query engine benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use shelfdb_bench::{generate_records, BenchRecord};
use shelfdb_core::{field_equals, QueryOptions};

fn bench_filter_sort_page(c: &mut Criterion) {
    let mut group = c.benchmark_group("query/filter_sort_page");
    for size in [100usize, 1_000, 10_000] {
        let records = generate_records(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &records, |b, records| {
            b.iter(|| {
                let options = QueryOptions::new()
                    .filter(|r: &BenchRecord| r.bucket < 8)
                    .sort_by(|a, b| b.value.cmp(&a.value))
                    .offset(10)
                    .limit(25);
                black_box(options.execute(records.clone()));
            });
        });
    }
    group.finish();
}

fn bench_field_equals(c: &mut Criterion) {
    let records = generate_records(1_000);
    c.bench_function("query/field_equals_1000", |b| {
        b.iter(|| {
            let options = QueryOptions::<BenchRecord>::new().filter(field_equals("bucket", 3));
            black_box(options.count(&records));
        });
    });
}

criterion_group!(benches, bench_filter_sort_page, bench_field_equals);
criterion_main!(benches);
