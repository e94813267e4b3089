//! Event-driven I/O reactor module.
//!
//! Readiness handling built on Linux epoll:
//! - [`core`]: the reactor itself (waiter maps, event loop integration)
//! - [`event`]: epoll event wrappers
//! - [`future`]: positional read/write futures for file descriptors

pub mod core;
pub mod event;
pub mod future;
