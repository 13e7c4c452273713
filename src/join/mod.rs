//! Fan-in completion barrier.
//!
//! A [`CallbackJoin`] lets N asynchronous sub-operations converge on one
//! continuation. Each member reports a completion through
//! [`CallbackJoin::done`]; the continuation fires exactly once, after every
//! registered member has completed and the join has been unblocked.
//!
//! A new join starts blocked so members completing while others are still
//! being registered cannot fire it early. Call
//! [`set_blocked(false)`](CallbackJoin::set_blocked) once registration is
//! finished. A join with no members fires at that point.

pub mod aggregate;

use std::{fmt, mem, sync::Arc};
#[cfg(not(loom))]
use std::sync::{
    Mutex,
    MutexGuard,
    atomic::{AtomicUsize, Ordering},
};
use std::sync::PoisonError;

pub use aggregate::{FirstErrorAggregator, JoinAggregator, JoinOutcome};
#[cfg(loom)]
use loom::sync::{
    Mutex,
    MutexGuard,
    atomic::{AtomicUsize, Ordering},
};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Errors reported by [`CallbackJoin`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum JoinError {
    /// `done` was called more times than callbacks were registered.
    #[error("completion reported with no outstanding callbacks")]
    Overrun,
}

type Continuation<R, E> = Box<dyn FnOnce(JoinOutcome<R, E>) + Send>;

/// Low bit of `state`: the registration gate. The rest: outstanding count.
const BLOCKED: usize = 1;
const ONE_MEMBER: usize = 2;

const fn count_of(state: usize) -> usize { state >> 1 }

/// Barrier firing a continuation once all members have completed.
///
/// # Examples
///
/// ```
/// use std::sync::{Arc, Mutex};
///
/// use relaycore::join::{CallbackJoin, JoinOutcome};
///
/// let seen: Arc<Mutex<Option<JoinOutcome<u32, String>>>> = Arc::default();
/// let sink = Arc::clone(&seen);
/// let join = Arc::new(CallbackJoin::new(move |outcome| {
///     *sink.lock().expect("sink lock") = Some(outcome);
/// }));
///
/// let first = join.register();
/// let second = join.register();
/// join.set_blocked(false);
/// first.complete(Ok(7)).expect("registered");
/// assert!(seen.lock().expect("sink lock").is_none());
/// second.complete(Err("late".to_owned())).expect("registered");
///
/// let outcome = seen.lock().expect("sink lock").take().expect("fired");
/// assert!(!outcome.success);
/// assert_eq!(outcome.result, Some(7));
/// ```
pub struct CallbackJoin<R, E, A = FirstErrorAggregator> {
    state: AtomicUsize,
    aggregate: Mutex<JoinOutcome<R, E>>,
    continuation: Mutex<Option<Continuation<R, E>>>,
    aggregator: A,
}

impl<R, E, A> fmt::Debug for CallbackJoin<R, E, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackJoin")
            .field("remaining", &self.remaining())
            .field("blocked", &self.is_blocked())
            .field("fired", &self.has_fired())
            .finish_non_exhaustive()
    }
}

impl<R, E> CallbackJoin<R, E, FirstErrorAggregator>
where
    R: Send + 'static,
    E: Send + 'static,
{
    /// Create a blocked join with no members that hands its outcome to
    /// `continuation`.
    #[must_use]
    pub fn new(continuation: impl FnOnce(JoinOutcome<R, E>) + Send + 'static) -> Self {
        Self::with_aggregator(FirstErrorAggregator, continuation)
    }

    /// Create a join whose outcome is delivered through a oneshot channel.
    ///
    /// Waiting has no built-in deadline; wrap the receiver in
    /// [`tokio::time::timeout`] where one is needed.
    #[must_use]
    pub fn with_channel() -> (Arc<Self>, oneshot::Receiver<JoinOutcome<R, E>>) {
        let (tx, rx) = oneshot::channel();
        let join = Self::new(move |outcome| {
            if tx.send(outcome).is_err() {
                debug!("join outcome receiver dropped");
            }
        });
        (Arc::new(join), rx)
    }
}

impl<R, E, A> CallbackJoin<R, E, A>
where
    R: Send + 'static,
    E: Send + 'static,
    A: JoinAggregator<R, E>,
{
    /// Create a blocked join using a custom aggregation strategy.
    #[must_use]
    pub fn with_aggregator(
        aggregator: A,
        continuation: impl FnOnce(JoinOutcome<R, E>) + Send + 'static,
    ) -> Self {
        Self {
            state: AtomicUsize::new(BLOCKED),
            aggregate: Mutex::new(JoinOutcome::default()),
            continuation: Mutex::new(Some(Box::new(continuation))),
            aggregator,
        }
    }

    /// Set the number of outstanding callbacks, keeping the gate as it is.
    ///
    /// Setting zero on an unblocked join fires it.
    pub fn set_number_callbacks(&self, count: usize) {
        let previous = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
                Some((count << 1) | (state & BLOCKED))
            })
            .unwrap_or_else(|state| state);
        self.fire_if_settled((count << 1) | (previous & BLOCKED));
    }

    /// Register one more outstanding callback.
    pub fn inc_number_callbacks(&self) { self.state.fetch_add(ONE_MEMBER, Ordering::AcqRel); }

    /// Register a member and return the handle that reports its completion.
    #[must_use]
    pub fn register(self: &Arc<Self>) -> JoinMember<R, E, A> {
        self.inc_number_callbacks();
        JoinMember {
            join: Arc::clone(self),
        }
    }

    /// Close or open the registration gate. Unblocking fires the join if
    /// every member has already completed.
    pub fn set_blocked(&self, blocked: bool) {
        if blocked {
            self.state.fetch_or(BLOCKED, Ordering::AcqRel);
        } else {
            let previous = self.state.fetch_and(!BLOCKED, Ordering::AcqRel);
            self.fire_if_settled(previous & !BLOCKED);
        }
    }

    /// Report one member's completion.
    ///
    /// The completion is folded into the aggregate under the aggregate lock,
    /// which the firing thread must also take, so the continuation always
    /// sees it.
    ///
    /// # Errors
    ///
    /// Returns [`JoinError::Overrun`] if no callbacks are outstanding; the
    /// join is left untouched.
    pub fn done(&self, completion: Result<R, E>) -> Result<(), JoinError> {
        let settled = {
            let mut aggregate = self.lock_aggregate();
            let previous = self
                .state
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
                    (count_of(state) > 0).then(|| state - ONE_MEMBER)
                })
                .map_err(|_| {
                    warn!("join completion overran registered callbacks");
                    JoinError::Overrun
                })?;
            self.aggregator
                .callback_done(&mut aggregate, completion, count_of(previous) == 1);
            previous - ONE_MEMBER
        };
        self.fire_if_settled(settled);
        Ok(())
    }

    /// Fire when `state`, the value this thread's own update produced, shows
    /// no outstanding members and an open gate. Every transition into that
    /// state comes through here, and the continuation slot hands it out once.
    fn fire_if_settled(&self, state: usize) {
        if state != 0 {
            return;
        }
        let Some(continuation) = lock(&self.continuation).take() else {
            return;
        };
        let outcome = mem::take(&mut *self.lock_aggregate());
        debug!(success = outcome.success, "join fired");
        continuation(outcome);
    }
}

impl<R, E, A> CallbackJoin<R, E, A> {
    /// Callbacks still outstanding.
    #[must_use]
    pub fn remaining(&self) -> usize { count_of(self.state.load(Ordering::Acquire)) }

    /// Whether the registration gate is closed.
    #[must_use]
    pub fn is_blocked(&self) -> bool { self.state.load(Ordering::Acquire) & BLOCKED != 0 }

    /// Whether the continuation has been taken.
    #[must_use]
    pub fn has_fired(&self) -> bool { lock(&self.continuation).is_none() }

    fn lock_aggregate(&self) -> MutexGuard<'_, JoinOutcome<R, E>> { lock(&self.aggregate) }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle for one registered join member.
///
/// Dropping a member without calling [`complete`](Self::complete) leaves the
/// join waiting forever.
#[must_use = "a join member must report its completion"]
pub struct JoinMember<R, E, A = FirstErrorAggregator> {
    join: Arc<CallbackJoin<R, E, A>>,
}

impl<R, E, A> fmt::Debug for JoinMember<R, E, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinMember").field("join", &self.join).finish()
    }
}

impl<R, E, A> JoinMember<R, E, A>
where
    R: Send + 'static,
    E: Send + 'static,
    A: JoinAggregator<R, E>,
{
    /// Report this member's completion.
    ///
    /// # Errors
    ///
    /// Returns [`JoinError::Overrun`] if the join's count was reset below
    /// the number of registered members.
    pub fn complete(self, completion: Result<R, E>) -> Result<(), JoinError> {
        self.join.done(completion)
    }
}
