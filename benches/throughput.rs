//! Command submission and completion throughput

use commands_queue::prelude::*;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn fire_and_forget(c: &mut Criterion) {
    let mut group = c.benchmark_group("fire_and_forget");

    for executors in [1, 2, 4, 8].iter() {
        let queue = CommandsQueue::new(*executors).unwrap();
        queue.start().unwrap();

        group.bench_with_input(
            BenchmarkId::new("executors", executors),
            executors,
            |b, _| {
                b.iter(|| {
                    for i in 0..1_000u64 {
                        queue.add(move |_| {
                            black_box(i * 2);
                        })
                        .unwrap();
                    }
                    queue.join();
                });
            },
        );

        queue.shutdown();
    }

    group.finish();
}

fn waitable_round_trip(c: &mut Criterion) {
    let queue = CommandsQueue::new(2).unwrap();
    queue.start().unwrap();

    c.bench_function("waitable_round_trip", |b| {
        b.iter(|| {
            let cmd = queue.add_waitable(|ctx| {
                black_box(ctx.thread_index());
            })
            .unwrap();
            cmd.join().unwrap();
        });
    });

    queue.shutdown();
}

criterion_group!(benches, fire_and_forget, waitable_round_trip);
criterion_main!(benches);
