use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use spatio_algebra::algebra::{Entry, Operand, Series, match_groups, parse};
use spatio_algebra::{
    Config, MapId, MapKind, MemoryMapStore, RelationSet, StdsKind, TemporalAlgebra,
    TemporalExtent, TimeIncrement, TimeUnit,
};
use std::sync::Arc;

fn daily_series(n: i64, len: i64) -> Series {
    let entries = (0..n)
        .map(|i| {
            Entry::new(
                TemporalExtent::relative(i, i + len, TimeUnit::Day).unwrap(),
                Operand::map(MapId::new(format!("m{i}"), "PERMANENT")),
            )
        })
        .collect();
    Series::new(entries)
}

fn algebra_with_dataset(n: usize, config: Config) -> TemporalAlgebra {
    let store = Arc::new(MemoryMapStore::new());
    let algebra = TemporalAlgebra::builder()
        .memory_store(Arc::clone(&store))
        .config(config)
        .build()
        .unwrap();
    let maps: Vec<MapId> = (0..n)
        .map(|i| MapId::new(format!("a{i}"), "PERMANENT"))
        .collect();
    for (i, map) in maps.iter().enumerate() {
        store.put_constant(map, i as f64);
    }
    algebra
        .registrar()
        .register_existing(
            StdsKind::Strds,
            "A",
            "mean",
            &maps,
            TemporalExtent::parse_absolute("2001-01-01", "2001-01-02").unwrap(),
            &TimeIncrement::new(1, TimeUnit::Day),
        )
        .unwrap();
    algebra
}

fn benchmark_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");

    group.bench_function("simple", |b| {
        b.iter(|| parse(black_box("R = A + B")).unwrap())
    });

    group.bench_function("nested", |b| {
        b.iter(|| {
            parse(black_box(
                r#"R = if({during}, start_month(A) > 6 && B {#,contains} C > 1, A {+,during,l} buff_t(B, "1 day"), A[-1] * 2)"#,
            ))
            .unwrap()
        })
    });

    group.finish();
}

fn benchmark_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("matching");
    let during = RelationSet::parse("during").unwrap();

    for n in [100i64, 1000] {
        let a = daily_series(n, 1);
        let b = daily_series(n / 10, 10);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("during_groups", n), &n, |bench, _| {
            bench.iter(|| match_groups(black_box(&a), black_box(&b), &during))
        });
    }

    group.finish();
}

fn benchmark_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");

    for n in [10usize, 100] {
        let algebra = algebra_with_dataset(n, Config::default());
        group.bench_with_input(BenchmarkId::new("chained_operators", n), &n, |b, _| {
            b.iter(|| {
                algebra
                    .evaluate(black_box("R = A {*,equal} A {+,equal} A[1]"), MapKind::Raster)
                    .unwrap()
            })
        });
    }

    group.finish();
}

fn benchmark_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("run");

    for n in [10usize, 100] {
        let algebra = algebra_with_dataset(n, Config::default().with_overwrite(true));
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("register", n), &n, |b, _| {
            b.iter(|| algebra.run(black_box("R = (A + 1) * 2"), MapKind::Raster).unwrap())
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_parse,
    benchmark_matching,
    benchmark_evaluate,
    benchmark_run
);
criterion_main!(benches);
