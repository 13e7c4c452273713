//! Work queues drained cooperatively on a shared executor.
//!
//! A [`DrainingPipelineQueue`] binds a [`SingleConsumerQueue`] to an
//! [`Executor`] lane and a visitor. When work arrives the queue dispatches a
//! drain task to the lane; the task processes one batch and, if more items
//! remain, resubmits itself so other lanes get a turn between batches.

pub mod executor;
pub mod lane_pool;

use std::{
    fmt,
    sync::{Arc, Weak},
};

pub use executor::{Executor, LaneToken, Task};
pub use lane_pool::LanePool;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::queue::{QueueConfig, QueueHooks, SingleConsumerQueue};

/// Items that route themselves to the matching visitor method.
///
/// Implementations typically consist of a single `match` on `self`.
pub trait Visitable<V: ?Sized>: Send + 'static {
    /// Hand `self` to the visitor method for its variant.
    fn accept(self, visitor: &V);
}

type KeepFn<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

struct PipelineHooks<T, V> {
    executor: Arc<dyn Executor>,
    lane: LaneToken,
    visitor: Arc<V>,
    keep: Option<KeepFn<T>>,
    cancel: CancellationToken,
    shared: Weak<Shared<T, V>>,
}

struct Shared<T, V> {
    queue: SingleConsumerQueue<T, PipelineHooks<T, V>>,
}

impl<T, V> QueueHooks<T> for PipelineHooks<T, V>
where
    T: Visitable<V>,
    V: Send + Sync + 'static,
{
    fn start_processor(&self) {
        // The pipeline is being torn down if this fails.
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let task = DrainTask {
            shared,
            cancel: self.cancel.clone(),
        };
        self.executor.dispatch(task.into_task(), &self.lane);
    }

    fn process(&self, batch: Vec<T>) {
        trace!(lane = %self.lane, items = batch.len(), "processing batch");
        for item in batch {
            item.accept(&self.visitor);
        }
    }

    fn keep_on_clear(&self, item: &T) -> bool { self.keep.as_ref().is_some_and(|keep| keep(item)) }
}

/// Consumption task for one pipeline.
///
/// Carries a token that [`DrainingPipelineQueue::close`] cancels, turning any
/// copy still queued on the executor into a no-op.
struct DrainTask<T, V> {
    shared: Arc<Shared<T, V>>,
    cancel: CancellationToken,
}

impl<T, V> DrainTask<T, V>
where
    T: Visitable<V>,
    V: Send + Sync + 'static,
{
    fn into_task(self) -> Task { Box::new(move || self.run()) }

    fn run(self) {
        if self.cancel.is_cancelled() {
            trace!("drain task invalidated by close");
            return;
        }
        let queue = &self.shared.queue;
        if queue.dequeue() && !queue.is_closed() {
            let hooks = queue.hooks();
            let executor = Arc::clone(&hooks.executor);
            let lane = hooks.lane.clone();
            executor.dispatch(self.into_task(), &lane);
        }
    }
}

/// FIFO queue whose items are drained by a task on an executor lane.
///
/// Cloning yields another producer handle to the same queue.
///
/// # Examples
///
/// ```
/// use std::sync::{Arc, Mutex};
///
/// use relaycore::pipeline::{DrainingPipelineQueue, Executor, LaneToken, Task, Visitable};
///
/// struct Inline;
///
/// impl Executor for Inline {
///     fn dispatch(&self, task: Task, _lane: &LaneToken) { task(); }
/// }
///
/// #[derive(Default)]
/// struct Sum(Mutex<u32>);
///
/// struct Add(u32);
///
/// impl Visitable<Sum> for Add {
///     fn accept(self, visitor: &Sum) { *visitor.0.lock().expect("sum lock") += self.0; }
/// }
///
/// let sum = Arc::new(Sum::default());
/// let pipeline = DrainingPipelineQueue::builder(Arc::new(Inline), "lane-a", Arc::clone(&sum)).build();
/// pipeline.enqueue(Add(2));
/// pipeline.enqueue(Add(3));
/// assert_eq!(*sum.0.lock().expect("sum lock"), 5);
/// ```
pub struct DrainingPipelineQueue<T, V> {
    shared: Arc<Shared<T, V>>,
}

impl<T, V> Clone for DrainingPipelineQueue<T, V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, V> fmt::Debug for DrainingPipelineQueue<T, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrainingPipelineQueue")
            .field("lane", self.lane())
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl<T, V> DrainingPipelineQueue<T, V>
where
    T: Visitable<V>,
    V: Send + Sync + 'static,
{
    /// Start building a pipeline that drains on `lane` of `executor`.
    #[must_use]
    pub fn builder(
        executor: Arc<dyn Executor>,
        lane: impl Into<LaneToken>,
        visitor: Arc<V>,
    ) -> PipelineBuilder<T, V> {
        PipelineBuilder {
            executor,
            lane: lane.into(),
            visitor,
            config: QueueConfig::default(),
            keep: None,
            started: true,
        }
    }

    /// Append `item`, dispatching a drain task if none is active.
    ///
    /// Returns `false` once the pipeline is closed.
    pub fn enqueue(&self, item: T) -> bool { self.shared.queue.enqueue(item) }

    /// Drop pending items except those protected by the builder's
    /// `keep_on_clear` predicate. Returns the number dropped.
    pub fn clear(&self) -> usize { self.shared.queue.clear() }

    /// Resume draining.
    pub fn start(&self) { self.shared.queue.start_queue(); }

    /// Pause draining after the current batch. Items are still accepted.
    pub fn stop(&self) { self.shared.queue.stop_queue(); }

    /// Close the queue and invalidate any drain task still on the executor.
    ///
    /// Returns the number of pending items discarded.
    pub fn close(&self) -> usize {
        let discarded = self.shared.queue.close();
        self.hooks().cancel.cancel();
        discarded
    }
}

impl<T, V> DrainingPipelineQueue<T, V> {
    fn hooks(&self) -> &PipelineHooks<T, V> { self.shared.queue.hooks() }

    /// Number of pending items.
    #[must_use]
    pub fn len(&self) -> usize { self.shared.queue.len() }

    /// Whether no items are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.shared.queue.is_empty() }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.shared.queue.is_closed() }

    /// Whether a drain task is scheduled or running.
    #[must_use]
    pub fn is_processing(&self) -> bool { self.shared.queue.is_processing() }

    /// Lane the drain task runs on.
    #[must_use]
    pub fn lane(&self) -> &LaneToken { &self.hooks().lane }

    /// Borrow the visitor.
    #[must_use]
    pub fn visitor(&self) -> &Arc<V> { &self.hooks().visitor }
}

/// Builder for [`DrainingPipelineQueue`].
pub struct PipelineBuilder<T, V> {
    executor: Arc<dyn Executor>,
    lane: LaneToken,
    visitor: Arc<V>,
    config: QueueConfig,
    keep: Option<KeepFn<T>>,
    started: bool,
}

impl<T, V> PipelineBuilder<T, V>
where
    T: Visitable<V>,
    V: Send + Sync + 'static,
{
    /// Override the queue sizing.
    #[must_use]
    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    /// Protect items matching `keep` from [`DrainingPipelineQueue::clear`].
    #[must_use]
    pub fn keep_on_clear(mut self, keep: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.keep = Some(Box::new(keep));
        self
    }

    /// Whether the pipeline drains immediately (the default) or waits for
    /// [`DrainingPipelineQueue::start`].
    #[must_use]
    pub fn started(mut self, started: bool) -> Self {
        self.started = started;
        self
    }

    /// Construct the pipeline.
    #[must_use]
    pub fn build(self) -> DrainingPipelineQueue<T, V> {
        let Self {
            executor,
            lane,
            visitor,
            config,
            keep,
            started,
        } = self;
        let shared = Arc::new_cyclic(|weak| {
            let hooks = PipelineHooks {
                executor,
                lane,
                visitor,
                keep,
                cancel: CancellationToken::new(),
                shared: weak.clone(),
            };
            let queue = if started {
                SingleConsumerQueue::new(config, hooks)
            } else {
                SingleConsumerQueue::stopped(config, hooks)
            };
            Shared { queue }
        });
        DrainingPipelineQueue { shared }
    }
}

#[cfg(all(test, not(loom)))]
mod tests;
