//! Step-by-step [`Executor`] for deterministic scheduling tests.

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard},
};

use relaycore::pipeline::{Executor, LaneToken, Task};

/// Executor that queues tasks until the test runs them.
///
/// Tasks run on the calling thread, in dispatch order unless a lane is
/// selected explicitly. Tasks dispatched while another task runs are queued
/// behind it.
#[derive(Default)]
pub struct ManualExecutor {
    tasks: Mutex<VecDeque<(LaneToken, Task)>>,
    dispatched: Mutex<Vec<LaneToken>>,
}

impl std::fmt::Debug for ManualExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualExecutor")
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl ManualExecutor {
    /// Create an executor with nothing queued.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    fn tasks(&self) -> MutexGuard<'_, VecDeque<(LaneToken, Task)>> {
        self.tasks.lock().expect("manual executor lock")
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn pending(&self) -> usize { self.tasks().len() }

    /// Lane of every dispatch so far, in order.
    #[must_use]
    pub fn dispatched(&self) -> Vec<LaneToken> {
        self.dispatched.lock().expect("manual executor lock").clone()
    }

    /// Run the oldest queued task. Returns `false` if none was queued.
    pub fn run_next(&self) -> bool {
        let next = self.tasks().pop_front();
        Self::run(next)
    }

    /// Run the oldest task queued on `lane`.
    pub fn run_next_on(&self, lane: &LaneToken) -> bool {
        let next = {
            let mut tasks = self.tasks();
            tasks
                .iter()
                .position(|(queued, _)| queued == lane)
                .and_then(|index| tasks.remove(index))
        };
        Self::run(next)
    }

    fn run(next: Option<(LaneToken, Task)>) -> bool {
        match next {
            Some((_, task)) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Run tasks until none remain, including ones dispatched meanwhile.
    /// Returns the number run.
    pub fn run_until_idle(&self) -> usize {
        let mut runs = 0;
        while self.run_next() {
            runs += 1;
        }
        runs
    }
}

impl Executor for ManualExecutor {
    fn dispatch(&self, task: Task, lane: &LaneToken) {
        self.dispatched
            .lock()
            .expect("manual executor lock")
            .push(lane.clone());
        self.tasks().push_back((lane.clone(), task));
    }
}
