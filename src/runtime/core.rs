//! Runtime that executes futures and schedules cooperative tasks.
//!
//! One `Runtime` owns a task queue, an executor, and an epoll reactor. It is
//! strictly single-threaded: exactly one task runs at a time, and a task only
//! yields control at an await point. `block_on` runs the main future to
//! completion, interleaving spawned tasks, I/O readiness, and timers.

use crate::reactor::core::{Reactor, clear_current_reactor, set_current_reactor};
use crate::runtime::context::{Features, enter_context};
use crate::runtime::executor::Executor;
use crate::runtime::queue::TaskQueue;
use crate::task::Task;
use crate::timer;

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

/// Single-threaded cooperative runtime.
///
/// Construct via [`Runtime::new`] for a bare scheduler or through
/// [`RuntimeBuilder`](crate::RuntimeBuilder) to enable the networking and
/// filesystem subsystems.
pub struct Runtime {
    queue: Arc<TaskQueue>,
    executor: Executor,
    reactor: Reactor,
    features: Features,
}

impl Runtime {
    /// Creates a runtime with all optional subsystems disabled.
    pub fn new() -> Self {
        Self::with_features(false, false)
    }

    pub(crate) fn with_features(net_enabled: bool, fs_enabled: bool) -> Self {
        let queue = Arc::new(TaskQueue::new());
        let executor = Executor::new(queue.clone());
        let reactor = Reactor::new();

        Self {
            queue,
            executor,
            reactor,
            features: Features {
                net_enabled,
                fs_enabled,
            },
        }
    }

    /// Spawns a background task onto this runtime's queue.
    ///
    /// The task runs the next time `block_on` drains the queue.
    pub fn spawn<F: Future<Output = ()> + 'static>(&self, fut: F) {
        let task = Task::new(fut, self.queue.clone());
        self.queue.push(task);
    }

    /// Runs the given future to completion, driving spawned tasks alongside.
    ///
    /// Establishes the runtime context for this thread so `Task::spawn` and
    /// the resource constructors work without explicit handles, then loops:
    /// poll the main future, drain ready tasks, deliver I/O completions, fire
    /// expired timers, and block on the reactor when nothing is runnable.
    ///
    /// # Returns
    /// The output of the completed future.
    pub fn block_on<F: Future>(&mut self, fut: F) -> F::Output {
        set_current_reactor(&mut self.reactor);

        let output = enter_context(self.queue.clone(), self.features, || {
            let mut fut = Box::pin(fut);

            // Main-future waker that flips a shared flag on wake, so a
            // yield_now in the main future never blocks on I/O. The flag is
            // reference-counted: clones of this waker may be stashed by tasks
            // that outlive the call, and waking one later must stay sound.
            let notified = Arc::new(AtomicBool::new(false));
            fn clone(ptr: *const ()) -> std::task::RawWaker {
                unsafe { Arc::increment_strong_count(ptr as *const AtomicBool) };
                std::task::RawWaker::new(ptr, &VTABLE)
            }
            fn wake(ptr: *const ()) {
                let flag = unsafe { Arc::from_raw(ptr as *const AtomicBool) };
                flag.store(true, Ordering::Release);
            }
            fn wake_by_ref(ptr: *const ()) {
                unsafe { (*(ptr as *const AtomicBool)).store(true, Ordering::Release) };
            }
            fn drop_flag(ptr: *const ()) {
                unsafe { Arc::from_raw(ptr as *const AtomicBool) };
            }
            static VTABLE: std::task::RawWakerVTable =
                std::task::RawWakerVTable::new(clone, wake, wake_by_ref, drop_flag);
            let raw =
                std::task::RawWaker::new(Arc::into_raw(notified.clone()) as *const (), &VTABLE);
            let waker = unsafe { std::task::Waker::from_raw(raw) };
            let mut cx = Context::from_waker(&waker);

            loop {
                if let Poll::Ready(val) = fut.as_mut().poll(&mut cx) {
                    // Give already-spawned tasks one last chance to finish.
                    self.executor.run();
                    return val;
                }

                // Execute all ready tasks.
                self.executor.run();

                // Deliver I/O completions promptly each tick.
                self.reactor.poll_events();
                self.reactor.wake_ready();

                // Fire any expired timers (wakes sleeping tasks).
                let has_pending_timers = timer::process_timers();

                // The main future asked to be polled again; do not block.
                if notified.swap(false, Ordering::Acquire) {
                    continue;
                }

                if !self.queue.is_empty() {
                    continue;
                }

                // Only timers left: sleep until the next deadline.
                if has_pending_timers {
                    self.reactor.poll_events();
                    self.reactor.wake_ready();

                    if let Some(dur) = timer::next_timer_remaining()
                        && dur > std::time::Duration::from_millis(0)
                    {
                        std::thread::sleep(dur);
                    }
                    continue;
                }

                // Nothing runnable: block until an I/O event arrives.
                self.reactor.wait_for_event();
                self.reactor.handle_events();
                self.reactor.wake_ready();
            }
        });

        clear_current_reactor();
        output
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
