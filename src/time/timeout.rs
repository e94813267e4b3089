//! Timeout combinator for async operations.
//!
//! Wraps a future with a deadline. The protocol clients use this for their
//! optional reply timeouts: the underlying receive loops have no timeout of
//! their own, so without a deadline an unresponsive peer suspends the
//! exchange indefinitely.

use crate::time::TimeError;
use crate::timer;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// Wraps a future with a deadline.
///
/// Resolves to `Ok(output)` if the inner future completes in time, or
/// `Err(TimeError::TimeOut)` once the deadline has passed.
pub fn timeout<F>(duration: Duration, future: F) -> Timeout<F>
where
    F: Future,
{
    Timeout::new(duration, future)
}

/// Future returned by [`timeout`].
pub struct Timeout<F> {
    future: F,
    deadline: Instant,
    registered: bool,
}

impl<F> Timeout<F> {
    pub(crate) fn new(duration: Duration, future: F) -> Self {
        Timeout {
            future,
            deadline: Instant::now() + duration,
            registered: false,
        }
    }
}

impl<F: Future> Future for Timeout<F> {
    type Output = Result<F::Output, TimeError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if Instant::now() >= self.deadline {
            return Poll::Ready(Err(TimeError::TimeOut));
        }

        let fut = unsafe { self.as_mut().map_unchecked_mut(|s| &mut s.future) };
        if let Poll::Ready(v) = fut.poll(cx) {
            return Poll::Ready(Ok(v));
        }

        if !self.registered {
            timer::register_timer(self.deadline, cx.waker().clone());

            unsafe {
                self.get_unchecked_mut().registered = true;
            }
        }

        Poll::Pending
    }
}
