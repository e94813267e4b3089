//! Executor that drains the task queue.

use crate::runtime::queue::TaskQueue;

use std::sync::Arc;

/// Polls every queued task until the queue is empty.
///
/// Tasks that yield `Pending` are not re-queued here; their waker re-queues
/// them once the awaited operation completes.
pub(crate) struct Executor {
    queue: Arc<TaskQueue>,
}

impl Executor {
    pub(crate) fn new(queue: Arc<TaskQueue>) -> Self {
        Self { queue }
    }

    /// Runs all currently ready tasks to their next suspension point.
    ///
    /// Returns true if at least one task was polled.
    pub(crate) fn run(&self) -> bool {
        let mut ran = false;

        while let Some(task) = self.queue.pop() {
            task.poll();
            ran = true;
        }

        ran
    }
}
