use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use spool::HandoffQueue;
use std::sync::Arc;
use std::thread;

const ITEMS_PER_PRODUCER: usize = 10_000;

fn run_mpmc(queue: Arc<HandoffQueue<usize>>, producers: usize, consumers: usize) {
    let mut handles = Vec::with_capacity(producers + consumers);

    for p in 0..producers {
        let q = queue.clone();
        handles.push(thread::spawn(move || {
            for i in 0..ITEMS_PER_PRODUCER {
                q.push(p * ITEMS_PER_PRODUCER + i).unwrap();
            }
        }));
    }

    let total = producers * ITEMS_PER_PRODUCER;
    let per_consumer = total / consumers;
    for _ in 0..consumers {
        let q = queue.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..per_consumer {
                q.pop().unwrap();
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
}

fn bench_handoff(c: &mut Criterion) {
    let mut group = c.benchmark_group("handoff_queue");

    for &(producers, consumers) in &[(1usize, 1usize), (2, 2), (4, 4)] {
        let total = producers * ITEMS_PER_PRODUCER;
        group.throughput(Throughput::Elements(total as u64));
        group.bench_with_input(
            BenchmarkId::new("mpmc", format!("{}p{}c", producers, consumers)),
            &(producers, consumers),
            |b, &(producers, consumers)| {
                b.iter(|| {
                    let queue = Arc::new(HandoffQueue::new(1024));
                    run_mpmc(queue, producers, consumers);
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_handoff);
criterion_main!(benches);
