//! Collector throughput benchmarks

use std::hint::black_box;

use arms_core::{AllocatorKind, Collector, CollectorOptions, TypeOperations};
use criterion::{criterion_group, criterion_main, Criterion};

fn bench_allocate_and_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocate_sweep_1000");

    for (name, allocator) in [
        ("system", AllocatorKind::System),
        ("slab", AllocatorKind::Slab),
    ] {
        group.bench_function(name, |b| {
            let mut collector = Collector::new(CollectorOptions {
                allocator,
                ..CollectorOptions::default()
            });
            collector.startup().unwrap();
            let ty = collector
                .register_foreign_value_type("bench.Blob", 32, TypeOperations::none(), None)
                .unwrap();

            b.iter(|| {
                for _ in 0..1000 {
                    black_box(collector.allocate_object(ty).unwrap());
                }
                black_box(collector.run());
            });

            collector.run();
            collector.shutdown().unwrap();
        });
    }

    group.finish();
}

fn bench_locked_survivors(c: &mut Criterion) {
    c.bench_function("mark_locked_1000", |b| {
        let mut collector = Collector::default();
        collector.startup().unwrap();
        let ty = collector
            .register_foreign_value_type("bench.Pinned", 32, TypeOperations::none(), None)
            .unwrap();

        let objects: Vec<_> = (0..1000)
            .map(|_| collector.allocate_object(ty).unwrap())
            .collect();
        for &object in &objects {
            collector.lock(object);
        }

        b.iter(|| {
            black_box(collector.run());
        });

        for &object in &objects {
            collector.unlock(object).unwrap();
        }
        collector.run();
        collector.shutdown().unwrap();
    });
}

criterion_group!(benches, bench_allocate_and_sweep, bench_locked_survivors);
criterion_main!(benches);
