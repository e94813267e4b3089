//! Timer driver and sleep futures.
//!
//! Timers are registered once with the thread-local [`TimerDriver`] and
//! fired explicitly by the runtime loop, avoiding busy polling. [`sleep`]
//! creates a future that resolves once its deadline passes.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

thread_local! {
    static TIMER_DRIVER: RefCell<TimerDriver> = RefCell::new(TimerDriver::new());
}

/// Holds (deadline, waker) pairs and wakes those whose deadline passed.
pub(crate) struct TimerDriver {
    timers: Vec<(Instant, Waker)>,
}

impl TimerDriver {
    fn new() -> Self {
        Self { timers: Vec::new() }
    }

    pub(crate) fn register(&mut self, deadline: Instant, waker: Waker) {
        self.timers.push((deadline, waker));
    }

    /// Wakes every expired timer; returns true while timers remain.
    fn fire_expired(&mut self) -> bool {
        let now = Instant::now();
        self.timers.retain(|(deadline, waker)| {
            if now >= *deadline {
                waker.wake_by_ref();
                false
            } else {
                true
            }
        });
        !self.timers.is_empty()
    }

    fn next_remaining(&self) -> Option<Duration> {
        let now = Instant::now();
        self.timers
            .iter()
            .map(|(deadline, _)| deadline.saturating_duration_since(now))
            .min()
    }
}

/// Registers a timer with the current thread's driver.
pub(crate) fn register_timer(deadline: Instant, waker: Waker) {
    TIMER_DRIVER.with(|driver| driver.borrow_mut().register(deadline, waker));
}

/// A future that completes once its deadline has passed.
///
/// Registers with the timer driver on first poll and yields; the runtime
/// loop wakes it when the deadline is reached.
#[derive(Debug)]
pub struct Sleep {
    deadline: Instant,
    registered: bool,
}

impl Sleep {
    pub fn new(duration: Duration) -> Self {
        Self {
            deadline: Instant::now() + duration,
            registered: false,
        }
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if Instant::now() >= self.deadline {
            return Poll::Ready(());
        }

        if !self.registered {
            register_timer(self.deadline, cx.waker().clone());
            self.registered = true;
        }

        Poll::Pending
    }
}

/// Suspends the current task for the given duration.
pub fn sleep(duration: Duration) -> Sleep {
    Sleep::new(duration)
}

/// Fires all expired timers; returns true while timers remain registered.
///
/// Called by the runtime loop and by blocking teardown paths.
pub(crate) fn process_timers() -> bool {
    TIMER_DRIVER.with(|driver| driver.borrow_mut().fire_expired())
}

/// Remaining time until the next timer deadline, if any.
pub(crate) fn next_timer_remaining() -> Option<Duration> {
    TIMER_DRIVER.with(|driver| driver.borrow().next_remaining())
}
