//! Multi-producer, single-consumer work queue.
//!
//! [`SingleConsumerQueue`] accepts items from any number of producers and
//! guarantees that at most one consumption task processes them at a time.
//! Producers never run the consumer themselves: the first enqueue that finds
//! no active processor asks [`QueueHooks::start_processor`] to schedule one,
//! and that processor repeatedly calls [`SingleConsumerQueue::dequeue`] until
//! the queue reports it is empty.
//!
//! Batches are handed to [`QueueHooks::process`] outside the queue lock so
//! producers are never blocked by processing.

pub mod config;
pub(crate) mod ring;

#[cfg(not(loom))]
use std::sync::{Mutex, MutexGuard};
use std::sync::PoisonError;

#[cfg(loom)]
use loom::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

pub use config::{
    DEFAULT_BUCKET_SIZE,
    DEFAULT_BULK_SIZE,
    DEFAULT_INITIAL_CAPACITY,
    QueueConfig,
    QueueConfigBuilder,
    QueueConfigError,
};
use ring::RingBuffer;

use crate::metrics::{self, DropReason};

/// Behaviour plugged into a [`SingleConsumerQueue`].
///
/// Hooks are called without the queue lock held, except for
/// [`keep_on_clear`](Self::keep_on_clear), which runs under the lock and must
/// not call back into the queue.
pub trait QueueHooks<T>: Send + Sync {
    /// Schedule a task that will call [`SingleConsumerQueue::dequeue`] until it
    /// returns `false`.
    ///
    /// Invoked at most once per idle-to-busy transition.
    fn start_processor(&self);

    /// Consume one batch of items in FIFO order.
    ///
    /// Panics propagate to the caller of `dequeue`; the queue does not catch
    /// them.
    fn process(&self, batch: Vec<T>);

    /// Whether `item` survives [`SingleConsumerQueue::clear`].
    fn keep_on_clear(&self, _item: &T) -> bool { false }
}

#[derive(Debug)]
struct QueueState<T> {
    ring: RingBuffer<T>,
    closed: bool,
    started: bool,
    processor_active: bool,
}

impl<T> QueueState<T> {
    /// Mark a processor active if one should be spawned now.
    fn claim_processor(&mut self) -> bool {
        if self.started && !self.processor_active && !self.ring.is_empty() {
            self.processor_active = true;
            return true;
        }
        false
    }
}

/// FIFO queue with an exclusive-processor invariant.
///
/// # Examples
///
/// ```
/// use std::sync::Mutex;
///
/// use relaycore::queue::{QueueConfig, QueueHooks, SingleConsumerQueue};
///
/// #[derive(Default)]
/// struct Recorder(Mutex<Vec<u32>>);
///
/// impl QueueHooks<u32> for Recorder {
///     fn start_processor(&self) {}
///     fn process(&self, batch: Vec<u32>) {
///         self.0.lock().expect("recorder lock").extend(batch);
///     }
/// }
///
/// let queue = SingleConsumerQueue::new(QueueConfig::default(), Recorder::default());
/// queue.enqueue(1);
/// queue.enqueue(2);
/// while queue.dequeue() {}
/// assert_eq!(*queue.hooks().0.lock().expect("recorder lock"), vec![1, 2]);
/// ```
#[derive(Debug)]
pub struct SingleConsumerQueue<T, H> {
    state: Mutex<QueueState<T>>,
    hooks: H,
    bulk_size: usize,
}

impl<T, H> SingleConsumerQueue<T, H>
where
    T: Send,
    H: QueueHooks<T>,
{
    /// Create a started queue.
    #[must_use]
    pub fn new(config: QueueConfig, hooks: H) -> Self { Self::with_started(config, hooks, true) }

    /// Create a queue that accepts items but spawns no processor until
    /// [`start_queue`](Self::start_queue) is called.
    #[must_use]
    pub fn stopped(config: QueueConfig, hooks: H) -> Self {
        Self::with_started(config, hooks, false)
    }

    fn with_started(config: QueueConfig, hooks: H, started: bool) -> Self {
        Self {
            state: Mutex::new(QueueState {
                ring: RingBuffer::new(config.initial_capacity(), config.bucket_size()),
                closed: false,
                started,
                processor_active: false,
            }),
            hooks,
            bulk_size: config.bulk_size(),
        }
    }

    /// Append `item`, spawning a processor if none is active.
    ///
    /// Returns `false` if the queue is closed; the item is dropped. This is
    /// not treated as an error, so callers that care about loss should check
    /// [`is_closed`](Self::is_closed).
    pub fn enqueue(&self, item: T) -> bool {
        let spawn = {
            let mut state = self.lock();
            if state.closed {
                drop(state);
                debug!("enqueue on closed queue, item dropped");
                metrics::add_dropped(DropReason::AfterClose, 1);
                return false;
            }
            state.ring.push_back(item);
            state.claim_processor()
        };
        metrics::inc_enqueued();
        if spawn {
            debug!("starting queue processor");
            self.hooks.start_processor();
        }
        true
    }

    /// Remove up to one batch and hand it to [`QueueHooks::process`].
    ///
    /// Only the active processor may call this. Returns `true` when items
    /// remain, in which case the processor stays active and should run again;
    /// `false` means the processor has been released and must stop.
    pub fn dequeue(&self) -> bool {
        let batch = {
            let mut state = self.lock();
            if state.closed || !state.started || state.ring.is_empty() {
                state.processor_active = false;
                return false;
            }
            let take = self.bulk_size.min(state.ring.len());
            let mut batch = Vec::with_capacity(take);
            batch.extend(std::iter::from_fn(|| state.ring.pop_front()).take(take));
            batch
        };

        let guard = ReleaseOnUnwind { queue: self };
        self.hooks.process(batch);
        drop(guard);

        let mut state = self.lock();
        let more = !state.ring.is_empty();
        if !more {
            state.processor_active = false;
        }
        more
    }

    /// Drop pending items except those protected by
    /// [`QueueHooks::keep_on_clear`], preserving the order of survivors.
    ///
    /// Returns the number of items dropped.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let before = state.ring.len();
        let hooks = &self.hooks;
        state.ring.retain(|item| hooks.keep_on_clear(item));
        let dropped = before - state.ring.len();
        drop(state);
        if dropped > 0 {
            debug!(dropped, "queue cleared");
            metrics::add_dropped(DropReason::Cleared, dropped);
        }
        dropped
    }

    /// Resume spawning processors, starting one now if work is pending.
    pub fn start_queue(&self) {
        let spawn = {
            let mut state = self.lock();
            state.started = true;
            state.claim_processor()
        };
        if spawn {
            debug!("starting queue processor after resume");
            self.hooks.start_processor();
        }
    }

    /// Stop spawning processors. Items are still accepted.
    ///
    /// An active processor finishes its current batch and then stops.
    pub fn stop_queue(&self) { self.lock().started = false; }

    /// Close the queue and release its backing store.
    ///
    /// Pending items are discarded and their count returned; a non-zero
    /// result is a data-loss event and is logged. Drain or
    /// [`clear`](Self::clear) the queue first if that matters. Closing twice
    /// returns zero.
    pub fn close(&self) -> usize {
        let discarded = {
            let mut state = self.lock();
            if state.closed {
                return 0;
            }
            state.closed = true;
            state.ring.release()
        };
        let dropped = discarded.len();
        drop(discarded);
        if dropped > 0 {
            warn!(dropped, "queue closed with pending items");
            metrics::add_dropped(DropReason::Closed, dropped);
        }
        dropped
    }
}

impl<T, H> SingleConsumerQueue<T, H> {
    /// Number of pending items.
    #[must_use]
    pub fn len(&self) -> usize { self.lock().ring.len() }

    /// Whether no items are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.lock().ring.is_empty() }

    /// Current slot capacity of the backing store.
    #[must_use]
    pub fn capacity(&self) -> usize { self.lock().ring.capacity() }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.lock().closed }

    /// Whether processors may be spawned.
    #[must_use]
    pub fn is_started(&self) -> bool { self.lock().started }

    /// Whether a processor is currently scheduled or running.
    #[must_use]
    pub fn is_processing(&self) -> bool { self.lock().processor_active }

    /// Borrow the hooks.
    #[must_use]
    pub fn hooks(&self) -> &H { &self.hooks }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        // Bookkeeping sections never panic mid-update; poisoned state is consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the processor slot if `process` unwinds, so a later enqueue can
/// schedule a fresh processor.
struct ReleaseOnUnwind<'a, T, H> {
    queue: &'a SingleConsumerQueue<T, H>,
}

impl<T, H> Drop for ReleaseOnUnwind<'_, T, H> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.queue.lock().processor_active = false;
        }
    }
}
