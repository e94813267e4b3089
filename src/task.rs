//! Task wrapper that combines futures with waker integration.
//!
//! A task encapsulates a future plus the bookkeeping needed to poll it and
//! wake it when the awaited operation completes. Tasks are spawned with
//! [`Task::spawn`] from inside a runtime context and awaited through the
//! returned [`JoinHandle`].
//!
//! # Teardown
//!
//! A [`JoinHandle`] can also be resolved synchronously with
//! [`JoinHandle::get_value`], which pumps the current thread's scheduler
//! until the task finishes. Destructors that own a background task (such as
//! the TCP accept loop) use this: cancellation is cooperative, so the owner
//! signals its stop flag and then blocks until the task observes it. An
//! in-flight operation is never interrupted; the flag only prevents the next
//! one from being issued.

use crate::reactor::core::with_current_reactor;
use crate::runtime::{CURRENT_QUEUE, TaskQueue, drain_current_queue, make_waker};
use crate::timer;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

/// A spawned task wrapping a future with output type `T`.
///
/// Holds the boxed future, the eventual result, a handle to the task queue
/// for re-scheduling, a completion flag, and the wakers of tasks awaiting
/// this one.
pub struct Task<T> {
    future: Mutex<Option<Pin<Box<dyn Future<Output = T>>>>>,
    result: Mutex<Option<T>>,
    queue: Arc<TaskQueue>,
    completed: AtomicBool,
    waiters: Mutex<Vec<Waker>>,
}

// The future itself need not be Send: execution is single-threaded and the
// Mutex around the future slot makes the shared bookkeeping safe to touch
// from waker clones.
unsafe impl<T> Send for Task<T> {}
unsafe impl<T> Sync for Task<T> {}

impl<T: 'static> Task<T> {
    /// Wraps a future as a task bound to the given queue.
    pub(crate) fn new<F>(fut: F, queue: Arc<TaskQueue>) -> Arc<Self>
    where
        F: Future<Output = T> + 'static,
    {
        Arc::new(Task {
            future: Mutex::new(Some(Box::pin(fut))),
            result: Mutex::new(None),
            queue,
            completed: AtomicBool::new(false),
            waiters: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    /// Polls the task's future once.
    ///
    /// A pending future is stored back for later; a ready one records its
    /// result, marks the task completed, and wakes every waiter.
    pub fn poll(self: &Arc<Self>) {
        let waker = make_waker(self.clone());
        let mut context = Context::from_waker(&waker);

        let mut future_slot = self.future.lock().unwrap();

        if let Some(mut future) = future_slot.take() {
            match future.as_mut().poll(&mut context) {
                Poll::Pending => {
                    *future_slot = Some(future);
                }
                Poll::Ready(val) => {
                    *self.result.lock().unwrap() = Some(val);
                    self.completed.store(true, Ordering::Release);

                    let mut waiters = self.waiters.lock().unwrap();
                    for w in waiters.drain(..) {
                        w.wake();
                    }
                }
            }
        }
    }

    /// Spawns a task on the current runtime context.
    ///
    /// The task runs concurrently with the current one; await the returned
    /// [`JoinHandle`] to observe its result.
    ///
    /// # Panics
    /// Panics if called outside of a runtime context (i.e. not within
    /// [`Runtime::block_on`](crate::Runtime::block_on)).
    pub fn spawn<F>(future: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + 'static,
    {
        CURRENT_QUEUE.with(|current| {
            let queue = current
                .borrow()
                .as_ref()
                .expect("Task::spawn() called outside of a runtime context")
                .clone();

            let task: Arc<Task<T>> = Task::new(future, queue.clone());
            let runnable: Arc<dyn Runnable> = task.clone();

            queue.push(runnable);

            JoinHandle { task }
        })
    }
}

/// Type-erased handle the executor uses to poll heterogeneous tasks.
pub(crate) trait Runnable: Send + Sync {
    fn poll(self: Arc<Self>);
}

impl<T: 'static> Runnable for Task<T> {
    fn poll(self: Arc<Self>) {
        Task::poll(&self);
    }
}

/// A future resolving to the output of a spawned task.
///
/// Returned by [`Task::spawn`]. The stored result is yielded exactly once;
/// awaiting a handle whose result was already consumed panics.
pub struct JoinHandle<T> {
    task: Arc<Task<T>>,
}

impl<T: 'static> JoinHandle<T> {
    /// Blocks the current thread until the task resolves, then returns its
    /// value.
    ///
    /// Pumps the current thread's executor, reactor, and timer driver from
    /// outside the `block_on` loop, so it is usable in destructors. If the
    /// task is suspended on an operation that never completes, this blocks
    /// forever; cancellation here is cooperative only.
    pub fn get_value(self) -> T {
        loop {
            if self.task.completed.load(Ordering::Acquire) {
                return self
                    .task
                    .result
                    .lock()
                    .unwrap()
                    .take()
                    .expect("task completed but result missing");
            }

            let ran = drain_current_queue();

            with_current_reactor(|r| {
                r.poll_events();
                r.wake_ready();
            });

            let timers_pending = timer::process_timers();

            if ran {
                continue;
            }

            // Idle: block briefly on I/O so an in-flight operation can
            // finish, waking periodically for timers.
            let waited = with_current_reactor(|r| {
                r.wait_for_event_with_timeout(100);
                r.handle_events();
                r.wake_ready();
            })
            .is_some();

            if !waited {
                let pause = if timers_pending {
                    timer::next_timer_remaining().unwrap_or(Duration::from_millis(1))
                } else {
                    Duration::from_millis(1)
                };
                std::thread::sleep(pause);
            }
        }
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.task.completed.load(Ordering::SeqCst) {
            let result = self
                .task
                .result
                .lock()
                .unwrap()
                .take()
                .expect("task completed but result missing");

            return Poll::Ready(result);
        }

        let mut ws = self.task.waiters.lock().unwrap();
        ws.push(cx.waker().clone());

        Poll::Pending
    }
}
