//! Benchmarks for the producer side of the egress pipeline

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::sync::Arc;
use xadc::{BoundedBatchQueue, MetricFormatter, SimulatedMemory, DEFAULT_MEMORY_CEILING};

fn bench_formatting(c: &mut Criterion) {
    let mut group = c.benchmark_group("formatting");
    let formatter = MetricFormatter::new("zynq-01");

    group.throughput(Throughput::Elements(1000));

    group.bench_function("format_1000_lines", |b| {
        b.iter(|| {
            for i in 0..1000 {
                let line = formatter.line("VCCINT", 0.99 + i as f64 * 1e-4, 0.0);
                black_box(line).ok();
            }
        })
    });

    group.finish();
}

fn bench_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue");
    let formatter = MetricFormatter::new("zynq-01");
    let lines: Vec<String> = (0..1000)
        .filter_map(|i| formatter.line("TEMP", 40.0 + i as f64 * 0.01, 0.0).ok())
        .collect();

    group.throughput(Throughput::Elements(1000));

    group.bench_function("offer_take_commit_1000", |b| {
        b.iter(|| {
            let queue = BoundedBatchQueue::new(
                "bench",
                Arc::new(SimulatedMemory::new(0)),
                DEFAULT_MEMORY_CEILING,
            );
            for line in &lines {
                queue.offer(line.clone());
            }
            while queue.len() >= 100 {
                let batch = queue.take_prefix(100);
                black_box(batch.join("\n"));
                queue.commit(batch.len());
            }
        })
    });

    group.finish();
}

criterion_group!(benches, bench_formatting, bench_queue);
criterion_main!(benches);
