#![cfg(all(feature = "advanced-tests", not(loom)))]
//! Property-based checks of queue ordering under random interleavings.
//!
//! Random sequences of enqueues, processor turns and clears are applied to a
//! [`SingleConsumerQueue`] and to a plain `VecDeque` model; delivered items,
//! pending items and processor starts must agree at every step.

use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use proptest::prelude::*;
use relaycore::queue::{QueueConfig, QueueHooks, SingleConsumerQueue};

#[derive(Debug, Clone)]
enum Action {
    Enqueue(u8),
    Turn,
    Clear,
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        6 => any::<u8>().prop_map(Action::Enqueue),
        3 => Just(Action::Turn),
        1 => Just(Action::Clear),
    ]
}

#[derive(Default)]
struct Delivered {
    starts: AtomicUsize,
    items: Mutex<Vec<u8>>,
}

impl QueueHooks<u8> for Delivered {
    fn start_processor(&self) { self.starts.fetch_add(1, Ordering::SeqCst); }

    fn process(&self, batch: Vec<u8>) {
        assert!(!batch.is_empty(), "empty batch delivered");
        self.items.lock().expect("items lock").extend(batch);
    }

    fn keep_on_clear(&self, item: &u8) -> bool { item % 4 == 0 }
}

#[derive(Default)]
struct Model {
    pending: VecDeque<u8>,
    delivered: Vec<u8>,
    active: bool,
    starts: usize,
}

impl Model {
    fn enqueue(&mut self, item: u8) {
        self.pending.push_back(item);
        if !self.active {
            self.active = true;
            self.starts += 1;
        }
    }

    fn turn(&mut self, bulk: usize) -> bool {
        let take = bulk.min(self.pending.len());
        self.delivered.extend(self.pending.drain(..take));
        self.active = !self.pending.is_empty();
        self.active
    }

    fn clear(&mut self) -> usize {
        let before = self.pending.len();
        self.pending.retain(|item| item % 4 == 0);
        before - self.pending.len()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn queue_matches_fifo_model(
        actions in prop::collection::vec(action(), 0..200),
        capacity in 0_usize..8,
        bucket in 1_usize..8,
        bulk in 1_usize..6,
    ) {
        let config = QueueConfig::builder()
            .initial_capacity(capacity)
            .bucket_size(bucket)
            .bulk_size(bulk)
            .build()
            .expect("valid queue config");
        let queue = SingleConsumerQueue::new(config, Delivered::default());
        let mut model = Model::default();

        for action in actions {
            match action {
                Action::Enqueue(item) => {
                    prop_assert!(queue.enqueue(item));
                    model.enqueue(item);
                }
                // Only the active processor may take a turn.
                Action::Turn if model.active => {
                    prop_assert_eq!(queue.dequeue(), model.turn(bulk));
                }
                Action::Turn => {}
                Action::Clear => prop_assert_eq!(queue.clear(), model.clear()),
            }
            prop_assert_eq!(queue.len(), model.pending.len());
            prop_assert_eq!(queue.is_processing(), model.active);
            prop_assert!(queue.capacity() >= queue.len());
        }

        let hooks = queue.hooks();
        prop_assert_eq!(hooks.starts.load(Ordering::SeqCst), model.starts);
        prop_assert_eq!(&*hooks.items.lock().expect("items lock"), &model.delivered);
    }
}
