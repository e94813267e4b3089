//! Time utilities: async sleep and deadline-bounded futures.
//!
//! - [`sleep`] for non-blocking delays
//! - [`timeout`] for running a future with a deadline
//!
//! [`TimeError`] is returned by [`timeout`] when the deadline is exceeded.

pub mod timeout;

pub use crate::timer::sleep;
pub use timeout::timeout;

/// Error produced when a deadline elapses before the wrapped future resolves.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum TimeError {
    #[error("deadline elapsed")]
    TimeOut,
}
