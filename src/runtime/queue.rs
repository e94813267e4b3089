//! FIFO queue of tasks that are ready to be polled.

use crate::task::Runnable;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// A FIFO queue holding tasks ready for execution.
///
/// Tasks are pushed when spawned or woken and popped by the executor in
/// arrival order. The queue is shared between the runtime and every waker,
/// hence the Mutex even though execution itself is single-threaded.
pub(crate) struct TaskQueue {
    queue: Mutex<VecDeque<Arc<dyn Runnable>>>,
}

impl TaskQueue {
    /// Creates a new empty task queue.
    pub(crate) fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Enqueues a task at the back of the queue.
    pub(crate) fn push(&self, task: Arc<dyn Runnable>) {
        self.queue.lock().unwrap().push_back(task);
    }

    /// Dequeues the next ready task, if any.
    pub(crate) fn pop(&self) -> Option<Arc<dyn Runnable>> {
        self.queue.lock().unwrap().pop_front()
    }

    /// Returns true when no tasks are waiting to run.
    pub(crate) fn is_empty(&self) -> bool {
        self.queue.lock().unwrap().is_empty()
    }
}
