//! Waker implementation that re-queues a task when it is awakened.
//!
//! Implements the standard raw-waker protocol: waking a task pushes it back
//! onto its runtime's task queue so the executor polls it again.

use crate::task::{Runnable, Task};

use std::sync::Arc;
use std::task::{RawWaker, RawWakerVTable, Waker};

/// Waker backing store for one task.
pub(crate) struct TaskWaker<T> {
    task: Arc<Task<T>>,
}

impl<T: 'static> TaskWaker<T> {
    fn new(task: Arc<Task<T>>) -> Arc<Self> {
        Arc::new(Self { task })
    }

    /// Re-enqueues the task so the executor polls it again.
    fn wake(self: &Arc<Self>) {
        let runnable: Arc<dyn Runnable> = self.task.clone();
        self.task.queue().push(runnable);
    }

    fn clone_raw(ptr: *const ()) -> RawWaker {
        unsafe {
            let arc = Arc::<TaskWaker<T>>::from_raw(ptr as *const TaskWaker<T>);
            let cloned = arc.clone();
            std::mem::forget(arc);
            RawWaker::new(Arc::into_raw(cloned) as *const (), &Self::VTABLE)
        }
    }

    fn wake_raw(ptr: *const ()) {
        unsafe {
            let arc = Arc::<TaskWaker<T>>::from_raw(ptr as *const TaskWaker<T>);
            arc.wake();
        }
    }

    fn wake_by_ref_raw(ptr: *const ()) {
        unsafe {
            let arc = Arc::<TaskWaker<T>>::from_raw(ptr as *const TaskWaker<T>);
            arc.wake();
            let _ = Arc::into_raw(arc);
        }
    }

    fn drop_raw(ptr: *const ()) {
        unsafe {
            drop(Arc::<TaskWaker<T>>::from_raw(ptr as *const TaskWaker<T>));
        }
    }

    const VTABLE: RawWakerVTable = RawWakerVTable::new(
        Self::clone_raw,
        Self::wake_raw,
        Self::wake_by_ref_raw,
        Self::drop_raw,
    );
}

/// Builds a [`Waker`] that re-queues the given task when called.
pub(crate) fn make_waker<T: 'static>(task: Arc<Task<T>>) -> Waker {
    let waker = TaskWaker::new(task);
    let raw = RawWaker::new(Arc::into_raw(waker) as *const (), &TaskWaker::<T>::VTABLE);
    unsafe { Waker::from_raw(raw) }
}
