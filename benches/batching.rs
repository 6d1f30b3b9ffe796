use criterion::{black_box, criterion_group, criterion_main, Criterion};
use statsink::batcher::classifier;

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("derive_short_key", |b| {
        b.iter(|| classifier::derive(black_box("app.requests.count")))
    });

    c.bench_function("derive_overflow_key", |b| {
        let key = (0..24)
            .map(|i| format!("segment{i}"))
            .collect::<Vec<_>>()
            .join(".");
        b.iter(|| classifier::derive(black_box(&key)))
    });

    c.bench_function("classifier_id", |b| {
        let row = classifier::derive("app.requests.count");
        b.iter(|| classifier::classifier_id(black_box(&row.classifiers)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
