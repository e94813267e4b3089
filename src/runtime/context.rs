//! Thread-local runtime context: task queue and feature switches.
//!
//! `block_on` installs the runtime's task queue and feature set in
//! thread-local storage so that `Task::spawn` and the resource constructors
//! can reach the current runtime without threading explicit handles through
//! every call. The previous context is restored on exit, so runtimes may
//! nest.

use crate::runtime::queue::TaskQueue;

use std::cell::RefCell;
use std::sync::Arc;

/// Feature switches for the current runtime context.
///
/// Gates the networking and filesystem constructors so a runtime only pays
/// for (and permits) the subsystems it was built with.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Features {
    /// Socket constructors are allowed in this context.
    pub(crate) net_enabled: bool,

    /// File constructors are allowed in this context.
    pub(crate) fs_enabled: bool,
}

thread_local! {
    /// Task queue of the runtime currently executing on this thread.
    pub(crate) static CURRENT_QUEUE: RefCell<Option<Arc<TaskQueue>>> = const { RefCell::new(None) };

    /// Feature set of the runtime currently executing on this thread.
    pub(crate) static CURRENT_FEATURES: RefCell<Option<Features>> = const { RefCell::new(None) };
}

/// Enters a runtime context for the duration of `function`.
///
/// Installs `queue` and `features` in thread-local storage, runs the closure,
/// and restores whatever context was active before.
pub(crate) fn enter_context<F, R>(queue: Arc<TaskQueue>, features: Features, function: F) -> R
where
    F: FnOnce() -> R,
{
    CURRENT_QUEUE.with(|current_queue| {
        CURRENT_FEATURES.with(|current_features| {
            let previous_queue = current_queue.borrow_mut().replace(queue.clone());
            let previous_features = current_features.borrow_mut().replace(features);

            let result = function();

            *current_queue.borrow_mut() = previous_queue;
            *current_features.borrow_mut() = previous_features;

            result
        })
    })
}

/// Checks that networking was enabled for the current runtime.
///
/// # Panics
/// Panics if the runtime was not built with `.enable_net()`.
pub(crate) fn ensure_net() {
    ensure_feature(|f| f.net_enabled, "networking", "RuntimeBuilder::enable_net()");
}

/// Checks that filesystem support was enabled for the current runtime.
///
/// # Panics
/// Panics if the runtime was not built with `.enable_fs()`.
pub(crate) fn ensure_fs() {
    ensure_feature(|f| f.fs_enabled, "filesystem", "RuntimeBuilder::enable_fs()");
}

// Checks one feature flag in the current context, panics if absent.
fn ensure_feature(check: impl Fn(&Features) -> bool, name: &str, hint: &str) {
    CURRENT_FEATURES.with(|features| {
        let enabled = features.borrow().as_ref().map(check).unwrap_or(false);

        if !enabled {
            panic!("{} support not enabled. Use {}.", name, hint);
        }
    })
}

/// Polls every task currently queued on this thread's runtime.
///
/// Used by blocking teardown paths (`JoinHandle::get_value`) that must pump
/// the scheduler from outside `block_on`'s own loop. Returns true if at
/// least one task was polled.
pub(crate) fn drain_current_queue() -> bool {
    let queue = CURRENT_QUEUE.with(|cell| cell.borrow().clone());

    let Some(queue) = queue else {
        return false;
    };

    let mut ran = false;
    while let Some(task) = queue.pop() {
        task.poll();
        ran = true;
    }

    ran
}
