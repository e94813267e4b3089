//! Runtime subsystem modules.

pub(crate) mod context;
mod core;
pub(crate) mod executor;
pub(crate) mod queue;
pub(crate) mod waker;
pub mod yield_now;

pub(crate) use context::{CURRENT_QUEUE, drain_current_queue};
pub use self::core::Runtime;
pub(crate) use queue::TaskQueue;
pub(crate) use waker::make_waker;
