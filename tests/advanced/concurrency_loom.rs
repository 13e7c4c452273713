#![cfg(all(feature = "advanced-tests", loom))]
//! Concurrency tests for the work queue and callback join using loom.
//!
//! These run without Tokio. `loom` explores interleavings of producers,
//! the processor and join completions to check that a processor is never
//! started twice, that no item is stranded without one, and that a join fires
//! exactly once.
//!
//! Run with
//! `RUSTFLAGS="--cfg loom" cargo test --features advanced-tests --test concurrency_loom`.

use std::sync::Arc;

use loom::{
    model,
    sync::atomic::{AtomicUsize, Ordering},
    thread,
};
use relaycore::{
    join::CallbackJoin,
    queue::{QueueConfig, QueueHooks, SingleConsumerQueue},
};

#[derive(Default)]
struct Counting {
    starts: AtomicUsize,
    processed: AtomicUsize,
}

impl QueueHooks<u8> for Counting {
    fn start_processor(&self) { self.starts.fetch_add(1, Ordering::SeqCst); }

    fn process(&self, batch: Vec<u8>) { self.processed.fetch_add(batch.len(), Ordering::SeqCst); }
}

fn small_queue() -> SingleConsumerQueue<u8, Counting> {
    let config = QueueConfig::builder()
        .initial_capacity(1)
        .bucket_size(2)
        .bulk_size(1)
        .build()
        .expect("valid queue config");
    SingleConsumerQueue::new(config, Counting::default())
}

#[test]
fn concurrent_producers_start_one_processor() {
    model(|| {
        let queue = Arc::new(small_queue());
        let producers: Vec<_> = (0..2_u8)
            .map(|n| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || assert!(queue.enqueue(n)))
            })
            .collect();
        for producer in producers {
            producer.join().expect("producer");
        }
        assert_eq!(queue.hooks().starts.load(Ordering::SeqCst), 1);
        assert_eq!(queue.len(), 2);
        assert!(queue.is_processing());
    });
}

#[test]
fn enqueue_racing_release_never_strands_an_item() {
    model(|| {
        let queue = Arc::new(small_queue());
        assert!(queue.enqueue(1));

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || while queue.dequeue() {})
        };
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || assert!(queue.enqueue(2)))
        };
        consumer.join().expect("consumer");
        producer.join().expect("producer");

        let hooks = queue.hooks();
        let starts = hooks.starts.load(Ordering::SeqCst);
        let processed = hooks.processed.load(Ordering::SeqCst);
        assert_eq!(processed + queue.len(), 2);
        if queue.is_empty() {
            assert_eq!(starts, 1);
        } else {
            // The consumer released before the second item landed, so the
            // producer must have claimed a fresh processor.
            assert_eq!(starts, 2);
            assert!(queue.is_processing());
        }
    });
}

#[test]
fn join_fires_once_when_completions_race_unblock() {
    model(|| {
        let fired = Arc::new(AtomicUsize::new(0));
        let join = {
            let fired = Arc::clone(&fired);
            Arc::new(CallbackJoin::<u8, ()>::new(move |outcome| {
                assert!(outcome.success);
                fired.fetch_add(1, Ordering::SeqCst);
            }))
        };
        join.set_number_callbacks(2);

        let members: Vec<_> = (0..2_u8)
            .map(|n| {
                let join = Arc::clone(&join);
                thread::spawn(move || join.done(Ok(n)).expect("outstanding"))
            })
            .collect();
        join.set_blocked(false);
        for member in members {
            member.join().expect("member");
        }

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(join.has_fired());
    });
}

#[test]
fn lone_completion_racing_unblock_fires_once() {
    model(|| {
        let fired = Arc::new(AtomicUsize::new(0));
        let join = {
            let fired = Arc::clone(&fired);
            Arc::new(CallbackJoin::<u8, ()>::new(move |outcome| {
                assert_eq!(outcome.result, Some(0));
                fired.fetch_add(1, Ordering::SeqCst);
            }))
        };
        join.set_number_callbacks(1);

        let member = {
            let join = Arc::clone(&join);
            thread::spawn(move || join.done(Ok(0)).expect("outstanding"))
        };
        join.set_blocked(false);
        member.join().expect("member");

        assert_eq!(fired.load(Ordering::SeqCst), 1, "continuation must fire");
    });
}
