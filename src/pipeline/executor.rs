//! Execution substrate seam used by draining pipelines.

use std::{fmt, sync::Arc};

/// Unit of work submitted to an [`Executor`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Name of the pool lane a task runs on.
///
/// Tasks sharing a lane are grouped for ordering and fairness by the
/// executor; the token itself carries no other meaning.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LaneToken(Arc<str>);

impl LaneToken {
    /// Create a token from any string-like name.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>) -> Self { Self(name.into()) }

    /// Borrow the lane name.
    #[must_use]
    pub fn as_str(&self) -> &str { &self.0 }
}

impl From<&str> for LaneToken {
    fn from(value: &str) -> Self { Self::new(value) }
}

impl From<String> for LaneToken {
    fn from(value: String) -> Self { Self::new(value) }
}

impl fmt::Display for LaneToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Runs tasks eventually, grouped by lane.
///
/// Implementations must not run `task` before `dispatch` returns while
/// holding locks the task might need; running it inline after all locks are
/// released is permitted.
pub trait Executor: Send + Sync + 'static {
    /// Schedule `task` on `lane`.
    fn dispatch(&self, task: Task, lane: &LaneToken);
}

impl<E: Executor + ?Sized> Executor for Arc<E> {
    fn dispatch(&self, task: Task, lane: &LaneToken) { (**self).dispatch(task, lane); }
}
