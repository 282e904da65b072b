//! Stress tests for the commands queue

use commands_queue::prelude::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
#[ignore] // Run with --ignored flag
fn stress_test_many_small_commands() {
    let queue = CommandsQueue::new(8).unwrap();
    queue.start().unwrap();
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..100_000 {
        let counter = counter.clone();
        queue
            .add(move |_| {
                counter.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
    }

    queue.join();
    assert_eq!(counter.load(Ordering::Relaxed), 100_000);
}

#[test]
#[ignore]
fn stress_test_many_joiners() {
    let queue = Arc::new(CommandsQueue::new(4).unwrap());
    queue.start().unwrap();

    let gate = Arc::new(Mutex::new(()));
    let guard = gate.lock();

    let cmd = {
        let gate = gate.clone();
        queue
            .add_waitable(move |_| {
                drop(gate.lock());
            })
            .unwrap()
    };

    let joiners: Vec<_> = (0..32)
        .map(|_| {
            let cmd = cmd.clone();
            thread::spawn(move || cmd.join())
        })
        .collect();

    thread::sleep(Duration::from_millis(20));
    drop(guard);

    for joiner in joiners {
        joiner.join().unwrap().unwrap();
    }
}

#[test]
#[ignore]
fn stress_test_repeated_cancel_clear_cycles() {
    let queue = CommandsQueue::new(4).unwrap();

    for i in 0..50 {
        let counter = Arc::new(AtomicUsize::new(0));
        queue.start().unwrap();

        for _ in 0..1_000 {
            let counter = counter.clone();
            queue
                .add(move |ctx| {
                    if !ctx.is_cancelled() {
                        counter.fetch_add(1, Ordering::Relaxed);
                    }
                })
                .unwrap();
        }

        if i % 2 == 0 {
            queue.join();
            assert_eq!(counter.load(Ordering::Relaxed), 1_000, "iteration {}", i);
        }

        queue.cancel();
        assert_eq!(queue.active_commands(), 0, "iteration {}", i);
        queue.clear().unwrap();
    }
}

#[test]
#[ignore]
fn stress_test_cancel_commands_under_load() {
    let queue = Arc::new(CommandsQueue::new(4).unwrap());
    queue.start().unwrap();
    let executed = Arc::new(AtomicUsize::new(0));

    let producer = {
        let queue = queue.clone();
        let executed = executed.clone();
        thread::spawn(move || {
            for _ in 0..50_000 {
                let executed = executed.clone();
                queue
                    .add(move |_| {
                        executed.fetch_add(1, Ordering::Relaxed);
                    })
                    .unwrap();
            }
        })
    };

    let mut discarded = 0;
    while !producer.is_finished() {
        discarded += queue.cancel_commands();
        thread::yield_now();
    }
    producer.join().unwrap();
    queue.join();

    assert_eq!(executed.load(Ordering::Relaxed) + discarded, 50_000);
    assert_eq!(queue.stats().discarded as usize, discarded);
}
