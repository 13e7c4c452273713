//! Unit tests for [`DrainingPipelineQueue`] and [`LanePool`].

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use rstest::{fixture, rstest};
use tracing_test::traced_test;

use super::*;

/// Executor that parks tasks until the test runs them.
#[derive(Default)]
struct Parked {
    tasks: Mutex<VecDeque<(LaneToken, Task)>>,
}

impl Parked {
    fn len(&self) -> usize { self.tasks.lock().expect("parked lock").len() }

    fn lanes(&self) -> Vec<LaneToken> {
        self.tasks
            .lock()
            .expect("parked lock")
            .iter()
            .map(|(lane, _)| lane.clone())
            .collect()
    }

    fn run_next(&self) -> bool {
        let next = self.tasks.lock().expect("parked lock").pop_front();
        match next {
            Some((_, task)) => {
                task();
                true
            }
            None => false,
        }
    }

    fn run_all(&self) -> usize {
        let mut runs = 0;
        while self.run_next() {
            runs += 1;
        }
        runs
    }
}

impl Executor for Parked {
    fn dispatch(&self, task: Task, lane: &LaneToken) {
        self.tasks
            .lock()
            .expect("parked lock")
            .push_back((lane.clone(), task));
    }
}

#[derive(Default)]
struct Log(Mutex<Vec<String>>);

impl Log {
    fn entries(&self) -> Vec<String> { self.0.lock().expect("log lock").clone() }
}

enum Op {
    Note(&'static str),
    Urgent(&'static str),
    Seq(&'static str, usize),
}

impl Visitable<Log> for Op {
    fn accept(self, visitor: &Log) {
        let entry = match self {
            Op::Note(text) => text.to_owned(),
            Op::Urgent(text) => format!("!{text}"),
            Op::Seq(tag, n) => format!("{tag}{n}"),
        };
        visitor.0.lock().expect("log lock").push(entry);
    }
}

struct Harness {
    executor: Arc<Parked>,
    log: Arc<Log>,
}

impl Harness {
    fn builder(&self) -> PipelineBuilder<Op, Log> {
        let executor: Arc<dyn Executor> = self.executor.clone();
        let config = QueueConfig::builder()
            .initial_capacity(4)
            .bucket_size(4)
            .bulk_size(2)
            .build()
            .expect("valid queue config");
        DrainingPipelineQueue::builder(executor, "lane-7", Arc::clone(&self.log)).config(config)
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self {
            executor: Arc::new(Parked::default()),
            log: Arc::new(Log::default()),
        }
    }
}

#[fixture]
fn harness() -> Harness { Harness::default() }

#[rstest]
fn first_enqueue_dispatches_one_task_on_the_lane(harness: Harness) {
    let pipeline = harness.builder().build();
    for text in ["a", "b", "c"] {
        assert!(pipeline.enqueue(Op::Note(text)));
    }
    assert_eq!(harness.executor.lanes(), vec![LaneToken::from("lane-7")]);
    assert_eq!(pipeline.lane().as_str(), "lane-7");
    assert!(pipeline.is_processing());
}

#[rstest]
fn drain_task_resubmits_between_batches(harness: Harness) {
    let pipeline = harness.builder().build();
    for text in ["a", "b", "c", "d", "e"] {
        pipeline.enqueue(Op::Note(text));
    }
    assert!(harness.executor.run_next());
    assert_eq!(harness.log.entries(), vec!["a", "b"]);
    assert_eq!(harness.executor.len(), 1);

    assert_eq!(harness.executor.run_all(), 2);
    assert_eq!(harness.log.entries(), vec!["a", "b", "c", "d", "e"]);
    assert!(!pipeline.is_processing());
    assert!(pipeline.is_empty());
}

#[rstest]
fn visitor_sees_each_variant(harness: Harness) {
    let pipeline = harness.builder().build();
    pipeline.enqueue(Op::Note("x"));
    pipeline.enqueue(Op::Urgent("y"));
    harness.executor.run_all();
    assert_eq!(pipeline.visitor().entries(), vec!["x", "!y"]);
}

#[test]
#[traced_test]
fn close_invalidates_a_parked_task() {
    let harness = Harness::default();
    let pipeline = harness.builder().build();
    pipeline.enqueue(Op::Note("lost"));
    assert_eq!(pipeline.close(), 1);
    assert!(pipeline.is_closed());
    assert!(!pipeline.enqueue(Op::Note("late")));

    assert_eq!(harness.executor.run_all(), 1);
    assert!(harness.log.entries().is_empty());
    assert!(logs_contain("drain task invalidated by close"));
}

#[rstest]
fn clear_keeps_protected_items(harness: Harness) {
    let pipeline = harness
        .builder()
        .keep_on_clear(|op| matches!(op, Op::Urgent(_)))
        .build();
    pipeline.enqueue(Op::Note("a"));
    pipeline.enqueue(Op::Urgent("b"));
    pipeline.enqueue(Op::Note("c"));
    assert_eq!(pipeline.clear(), 2);
    harness.executor.run_all();
    assert_eq!(harness.log.entries(), vec!["!b"]);
}

#[rstest]
fn stopped_pipeline_waits_for_start(harness: Harness) {
    let pipeline = harness.builder().started(false).build();
    pipeline.enqueue(Op::Note("a"));
    assert_eq!(harness.executor.len(), 0);

    pipeline.start();
    assert_eq!(harness.executor.len(), 1);
    pipeline.stop();
    harness.executor.run_all();
    assert!(harness.log.entries().is_empty());
    assert_eq!(pipeline.len(), 1);
}

#[rstest]
fn clones_share_one_queue(harness: Harness) {
    let pipeline = harness.builder().build();
    let producer = pipeline.clone();
    producer.enqueue(Op::Note("a"));
    pipeline.enqueue(Op::Note("b"));
    assert_eq!(harness.executor.len(), 1);
    harness.executor.run_all();
    assert_eq!(harness.log.entries(), vec!["a", "b"]);
}

fn recorder(order: &Arc<Mutex<Vec<String>>>, label: String) -> Task {
    let order = Arc::clone(order);
    Box::new(move || order.lock().expect("order lock").push(label))
}

#[tokio::test(flavor = "current_thread")]
async fn lanes_run_serially_and_interleave() {
    let pool = LanePool::current().expect("inside a runtime");
    let order = Arc::new(Mutex::new(Vec::new()));
    let busy = LaneToken::from("busy");
    let quiet = LaneToken::from("quiet");
    for n in 1..=3 {
        pool.dispatch(recorder(&order, format!("busy-{n}")), &busy);
    }
    pool.dispatch(recorder(&order, "quiet-1".to_owned()), &quiet);
    assert_eq!(pool.pending(&busy), 3);

    pool.wait_idle().await;
    assert_eq!(
        *order.lock().expect("order lock"),
        vec!["busy-1", "quiet-1", "busy-2", "busy-3"]
    );
}

#[tokio::test(flavor = "current_thread")]
async fn panicking_task_does_not_stall_its_lane() {
    let pool = LanePool::current().expect("inside a runtime");
    let order = Arc::new(Mutex::new(Vec::new()));
    let lane = LaneToken::from("fragile");
    pool.dispatch(Box::new(|| panic!("handler exploded")), &lane);
    pool.dispatch(recorder(&order, "after".to_owned()), &lane);

    pool.wait_idle().await;
    assert_eq!(pool.panics(), 1);
    assert_eq!(*order.lock().expect("order lock"), vec!["after"]);
}

#[tokio::test(flavor = "current_thread")]
async fn idle_lanes_are_pruned() {
    let pool = LanePool::current().expect("inside a runtime");
    let order = Arc::new(Mutex::new(Vec::new()));
    for name in ["a", "b", "c"] {
        pool.dispatch(recorder(&order, name.to_owned()), &LaneToken::from(name));
    }
    assert_eq!(pool.lane_count(), 3);
    assert_eq!(pool.prune_idle(), 0);

    pool.wait_idle().await;
    assert_eq!(pool.prune_idle(), 3);
    assert_eq!(pool.lane_count(), 0);

    pool.dispatch(recorder(&order, "d".to_owned()), &LaneToken::from("a"));
    pool.wait_idle().await;
    assert_eq!(order.lock().expect("order lock").len(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_idle_waiters_all_return() {
    let pool = LanePool::current().expect("inside a runtime");
    let order = Arc::new(Mutex::new(Vec::new()));
    for round in 0..50 {
        for name in ["a", "b"] {
            pool.dispatch(recorder(&order, format!("{name}-{round}")), &LaneToken::from(name));
        }
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move { pool.wait_idle().await })
            })
            .collect();
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            for waiter in waiters {
                waiter.await.expect("waiter task");
            }
        })
        .await
        .expect("every waiter returned");
        assert_eq!(order.lock().expect("order lock").len(), (round + 1) * 2);
    }

    pool.dispatch(recorder(&order, "late".to_owned()), &LaneToken::from("a"));
    pool.wait_idle().await;
    assert_eq!(order.lock().expect("order lock").last().map(String::as_str), Some("late"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pipeline_on_pool_preserves_per_producer_order() {
    let pool: Arc<dyn Executor> = Arc::new(LanePool::current().expect("inside a runtime"));
    let log = Arc::new(Log::default());
    let pipeline = DrainingPipelineQueue::builder(Arc::clone(&pool), "shared", Arc::clone(&log))
        .build();

    let producers: Vec<_> = ["p", "q"]
        .into_iter()
        .map(|tag| {
            let pipeline = pipeline.clone();
            std::thread::spawn(move || {
                for n in 0..200 {
                    pipeline.enqueue(Op::Seq(tag, n));
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().expect("producer thread");
    }

    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while !pipeline.is_empty() || pipeline.is_processing() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("pipeline drained");

    let entries = log.entries();
    assert_eq!(entries.len(), 400);
    for tag in ["p", "q"] {
        let seen: Vec<usize> = entries
            .iter()
            .filter_map(|entry| entry.strip_prefix(tag))
            .map(|n| n.parse().expect("numeric suffix"))
            .collect();
        assert_eq!(seen, (0..200).collect::<Vec<_>>());
    }
}
