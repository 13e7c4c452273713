#![cfg(not(loom))]
//! Integration tests for draining pipelines on manual and pooled executors.

use std::{
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use relaycore::{
    pipeline::{DrainingPipelineQueue, Executor, LanePool, LaneToken, Visitable},
    queue::QueueConfig,
};
use relaycore_testing::ManualExecutor;
use rstest::{fixture, rstest};

/// Visitor that records items and flags overlapping `accept` calls.
#[derive(Default)]
struct Exclusive {
    inside: AtomicBool,
    overlaps: AtomicUsize,
    seen: Mutex<Vec<(u8, u32)>>,
}

impl Exclusive {
    fn seen(&self) -> Vec<(u8, u32)> { self.seen.lock().expect("seen lock").clone() }
}

struct Item {
    producer: u8,
    seq: u32,
}

impl Visitable<Exclusive> for Item {
    fn accept(self, visitor: &Exclusive) {
        if visitor.inside.swap(true, Ordering::SeqCst) {
            visitor.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        visitor
            .seen
            .lock()
            .expect("seen lock")
            .push((self.producer, self.seq));
        thread::yield_now();
        visitor.inside.store(false, Ordering::SeqCst);
    }
}

fn small_config() -> QueueConfig {
    QueueConfig::builder()
        .initial_capacity(2)
        .bucket_size(3)
        .bulk_size(4)
        .build()
        .expect("valid queue config")
}

#[fixture]
fn manual() -> Arc<ManualExecutor> { Arc::new(ManualExecutor::new()) }

#[rstest]
fn drain_task_yields_between_batches(manual: Arc<ManualExecutor>) {
    let visitor = Arc::new(Exclusive::default());
    let executor: Arc<dyn Executor> = manual.clone();
    let pipeline = DrainingPipelineQueue::builder(executor, "conn-1", Arc::clone(&visitor))
        .config(small_config())
        .build();
    for seq in 0..10 {
        pipeline.enqueue(Item { producer: 0, seq });
    }
    assert_eq!(manual.pending(), 1);
    assert_eq!(manual.run_until_idle(), 3);
    assert_eq!(manual.dispatched(), vec![LaneToken::from("conn-1"); 3]);
    assert_eq!(visitor.seen().len(), 10);
}

#[rstest]
fn lanes_interleave_under_manual_control(manual: Arc<ManualExecutor>) {
    let executor: Arc<dyn Executor> = manual.clone();
    let left = Arc::new(Exclusive::default());
    let right = Arc::new(Exclusive::default());
    let a = DrainingPipelineQueue::builder(Arc::clone(&executor), "a", Arc::clone(&left))
        .config(small_config())
        .build();
    let b = DrainingPipelineQueue::builder(executor, "b", Arc::clone(&right))
        .config(small_config())
        .build();
    for seq in 0..8 {
        a.enqueue(Item { producer: 1, seq });
    }
    b.enqueue(Item { producer: 2, seq: 0 });

    assert!(manual.run_next_on(&LaneToken::from("b")));
    assert_eq!(right.seen(), vec![(2, 0)]);
    assert!(left.seen().is_empty());
    manual.run_until_idle();
    assert_eq!(left.seen().len(), 8);
}

#[rstest]
fn growth_past_initial_capacity_keeps_everything(manual: Arc<ManualExecutor>) {
    let visitor = Arc::new(Exclusive::default());
    let executor: Arc<dyn Executor> = manual.clone();
    let pipeline = DrainingPipelineQueue::builder(executor, "grow", Arc::clone(&visitor))
        .config(small_config())
        .started(false)
        .build();
    for seq in 0..3 {
        pipeline.enqueue(Item { producer: 0, seq });
    }
    assert_eq!(pipeline.len(), 3);
    pipeline.start();
    manual.run_until_idle();
    assert_eq!(visitor.seen(), vec![(0, 0), (0, 1), (0, 2)]);
}

#[rstest]
fn close_drops_pending_and_neuters_the_parked_task(manual: Arc<ManualExecutor>) {
    let visitor = Arc::new(Exclusive::default());
    let executor: Arc<dyn Executor> = manual.clone();
    let pipeline = DrainingPipelineQueue::builder(executor, "doomed", Arc::clone(&visitor)).build();
    for seq in 0..5 {
        pipeline.enqueue(Item { producer: 0, seq });
    }
    assert_eq!(pipeline.close(), 5);
    assert_eq!(pipeline.close(), 0);
    manual.run_until_idle();
    assert!(visitor.seen().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_processor_invariant_holds_on_the_pool() {
    let pool: Arc<dyn Executor> = Arc::new(LanePool::current().expect("inside a runtime"));
    let visitor = Arc::new(Exclusive::default());
    let pipeline = DrainingPipelineQueue::builder(pool, "hot", Arc::clone(&visitor))
        .config(small_config())
        .build();

    let producers: Vec<_> = (0..8_u8)
        .map(|producer| {
            let pipeline = pipeline.clone();
            thread::spawn(move || {
                for seq in 0..250 {
                    assert!(pipeline.enqueue(Item { producer, seq }));
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().expect("producer thread");
    }

    tokio::time::timeout(Duration::from_secs(10), async {
        while visitor.seen.lock().expect("seen lock").len() < 2000 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("pipeline drained");

    assert_eq!(visitor.overlaps.load(Ordering::SeqCst), 0);
    let seen = visitor.seen();
    for producer in 0..8 {
        let order: Vec<u32> = seen
            .iter()
            .filter(|(p, _)| *p == producer)
            .map(|(_, seq)| *seq)
            .collect();
        assert_eq!(order, (0..250).collect::<Vec<_>>(), "producer {producer}");
    }
}
