//! Tokio-backed [`Executor`] with serial, fairly interleaved lanes.
//!
//! Each lane runs at most one task at a time, in submission order. Every task
//! is spawned onto the runtime separately, so a lane with a long backlog
//! yields to other lanes between tasks instead of monopolising a worker.

use std::{
    collections::VecDeque,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use dashmap::DashMap;
use tokio::{
    runtime::{Handle, TryCurrentError},
    sync::Mutex as AsyncMutex,
};
use tokio_util::task::TaskTracker;
use tracing::trace;

use super::executor::{Executor, LaneToken, Task};
use crate::panic::{PanicSite, report_panic};

#[derive(Default)]
struct LaneState {
    tasks: VecDeque<Task>,
    scheduled: bool,
}

#[derive(Default)]
struct Lane {
    state: Mutex<LaneState>,
}

impl Lane {
    fn lock(&self) -> MutexGuard<'_, LaneState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `task`, returning `true` if the caller must schedule a turn.
    fn push(&self, task: Task) -> bool {
        let mut state = self.lock();
        state.tasks.push_back(task);
        !std::mem::replace(&mut state.scheduled, true)
    }

    fn next(&self) -> Option<Task> {
        let mut state = self.lock();
        let task = state.tasks.pop_front();
        if task.is_none() {
            state.scheduled = false;
        }
        task
    }

    /// End a turn, returning `true` if another turn must be scheduled.
    fn finish_turn(&self) -> bool {
        let mut state = self.lock();
        if state.tasks.is_empty() {
            state.scheduled = false;
            return false;
        }
        true
    }

    fn is_idle(&self) -> bool {
        let state = self.lock();
        !state.scheduled && state.tasks.is_empty()
    }

    fn pending(&self) -> usize { self.lock().tasks.len() }
}

struct PoolInner {
    handle: Handle,
    lanes: DashMap<LaneToken, Arc<Lane>>,
    tracker: TaskTracker,
    /// Serialises `wait_idle`, which closes and reopens `tracker`.
    idle_gate: AsyncMutex<()>,
    panics: AtomicU64,
}

impl PoolInner {
    fn dispatch(self: &Arc<Self>, task: Task, token: &LaneToken) {
        // The shard lock is held across the push so `prune_idle` cannot
        // detach a lane between lookup and push.
        let (lane, schedule) = {
            let entry = self.lanes.entry(token.clone()).or_default();
            let lane = Arc::clone(entry.value());
            let schedule = lane.push(task);
            (lane, schedule)
        };
        if schedule {
            self.spawn_turn(lane, token.clone());
        }
    }

    fn spawn_turn(self: &Arc<Self>, lane: Arc<Lane>, token: LaneToken) {
        let pool = Arc::clone(self);
        self.tracker
            .spawn_on(async move { pool.run_turn(lane, token) }, &self.handle);
    }

    fn run_turn(self: &Arc<Self>, lane: Arc<Lane>, token: LaneToken) {
        let Some(task) = lane.next() else {
            return;
        };
        if let Err(panic) = catch_unwind(AssertUnwindSafe(task)) {
            self.panics.fetch_add(1, Ordering::Relaxed);
            report_panic(PanicSite::Lane, &token, &*panic);
        }
        if lane.finish_turn() {
            self.spawn_turn(lane, token);
        } else {
            trace!(lane = %token, "lane drained");
        }
    }
}

/// Lane-scheduled executor running on a tokio runtime.
///
/// Cloning yields another handle to the same pool.
///
/// # Examples
///
/// ```
/// use std::sync::{
///     Arc,
///     atomic::{AtomicUsize, Ordering},
/// };
///
/// use relaycore::pipeline::{Executor, LanePool, LaneToken};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let pool = LanePool::current().expect("inside a runtime");
/// let hits = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&hits);
/// pool.dispatch(
///     Box::new(move || {
///         counter.fetch_add(1, Ordering::SeqCst);
///     }),
///     &LaneToken::from("demo"),
/// );
/// pool.wait_idle().await;
/// assert_eq!(hits.load(Ordering::SeqCst), 1);
/// # }
/// ```
#[derive(Clone)]
pub struct LanePool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for LanePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanePool")
            .field("lanes", &self.inner.lanes.len())
            .field("panics", &self.panics())
            .finish_non_exhaustive()
    }
}

impl LanePool {
    /// Create a pool that spawns onto `handle`.
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                handle,
                lanes: DashMap::new(),
                tracker: TaskTracker::new(),
                idle_gate: AsyncMutex::new(()),
                panics: AtomicU64::new(0),
            }),
        }
    }

    /// Create a pool on the runtime the caller is running in.
    ///
    /// # Errors
    ///
    /// Returns [`TryCurrentError`] when called outside a tokio runtime.
    pub fn current() -> Result<Self, TryCurrentError> { Handle::try_current().map(Self::new) }

    /// Number of lanes currently tracked, idle or not.
    #[must_use]
    pub fn lane_count(&self) -> usize { self.inner.lanes.len() }

    /// Tasks waiting on `lane`, excluding one that is running.
    #[must_use]
    pub fn pending(&self, lane: &LaneToken) -> usize {
        self.inner
            .lanes
            .get(lane)
            .map_or(0, |entry| entry.value().pending())
    }

    /// Number of tasks that panicked since the pool was created.
    #[must_use]
    pub fn panics(&self) -> u64 { self.inner.panics.load(Ordering::Relaxed) }

    /// Forget lanes with no queued or running task.
    ///
    /// Returns the number of lanes removed. A later dispatch to a pruned lane
    /// recreates it.
    pub fn prune_idle(&self) -> usize {
        let before = self.inner.lanes.len();
        self.inner.lanes.retain(|_, lane| !lane.is_idle());
        before.saturating_sub(self.inner.lanes.len())
    }

    /// Wait until every task dispatched so far, and every task those tasks
    /// dispatch in turn, has finished.
    ///
    /// Concurrent callers wait one after another.
    pub async fn wait_idle(&self) {
        let _gate = self.inner.idle_gate.lock().await;
        let tracker = &self.inner.tracker;
        tracker.close();
        tracker.wait().await;
        tracker.reopen();
    }
}

impl Executor for LanePool {
    fn dispatch(&self, task: Task, lane: &LaneToken) { self.inner.dispatch(task, lane); }
}
