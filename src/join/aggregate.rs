//! Folding of member completions into a join's outcome.

/// Combined result delivered to a join's continuation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinOutcome<R, E> {
    /// Whether every member succeeded, as judged by the aggregator.
    pub success: bool,
    /// Result retained by the aggregator, if any.
    pub result: Option<R>,
    /// Error retained by the aggregator, if any.
    pub error: Option<E>,
}

impl<R, E> Default for JoinOutcome<R, E> {
    fn default() -> Self {
        Self {
            success: true,
            result: None,
            error: None,
        }
    }
}

impl<R, E> JoinOutcome<R, E> {
    /// Collapse the outcome into a `Result`, preferring the retained error.
    ///
    /// # Errors
    ///
    /// Returns the retained error when one was recorded.
    pub fn into_result(self) -> Result<Option<R>, E> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result),
        }
    }
}

/// Strategy for folding one completion into the running aggregate.
///
/// Called under the join's aggregate lock, once per completion, in the order
/// completions acquire that lock. `is_last` is true for exactly one call.
pub trait JoinAggregator<R, E>: Send + Sync + 'static {
    /// Fold `completion` into `aggregate`.
    fn callback_done(&self, aggregate: &mut JoinOutcome<R, E>, completion: Result<R, E>, is_last: bool);
}

/// Default aggregation: success is the conjunction of all completions, and
/// the first result and first error seen are retained.
#[derive(Clone, Copy, Debug, Default)]
pub struct FirstErrorAggregator;

impl<R, E> JoinAggregator<R, E> for FirstErrorAggregator {
    fn callback_done(&self, aggregate: &mut JoinOutcome<R, E>, completion: Result<R, E>, _is_last: bool) {
        match completion {
            Ok(result) => {
                aggregate.result.get_or_insert(result);
            }
            Err(error) => {
                aggregate.success = false;
                aggregate.error.get_or_insert(error);
            }
        }
    }
}
