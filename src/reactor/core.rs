//! Readiness reactor backed by epoll.
//!
//! The reactor owns the epoll instance and the wakers of tasks blocked on
//! descriptor readiness. Futures register their waker for one direction of
//! one descriptor; when the kernel reports readiness the waker is moved to a
//! ready list and fired by `wake_ready`, re-queueing the task.

use crate::reactor::event::Event;

use libc::{EPOLL_CLOEXEC, EPOLLIN, EPOLLOUT, close, epoll_create1};
use std::cell::RefCell;
use std::collections::HashMap;
use std::ptr;
use std::task::Waker;

thread_local! {
    /// Pointer to the reactor of the runtime currently active on this thread.
    pub(crate) static CURRENT_REACTOR_PTR: RefCell<*mut Reactor> = const { RefCell::new(ptr::null_mut()) };
}

pub(crate) fn set_current_reactor(r: &mut Reactor) {
    CURRENT_REACTOR_PTR.with(|cell| {
        *cell.borrow_mut() = r as *mut Reactor;
    });
}

/// Clears the thread-local pointer so it cannot dangle past the reactor's
/// borrow.
pub(crate) fn clear_current_reactor() {
    CURRENT_REACTOR_PTR.with(|cell| {
        *cell.borrow_mut() = ptr::null_mut();
    });
}

pub(crate) fn with_current_reactor<R>(f: impl FnOnce(&mut Reactor) -> R) -> Option<R> {
    CURRENT_REACTOR_PTR.with(|cell| {
        let ptr = *cell.borrow();
        if ptr.is_null() {
            None
        } else {
            Some(unsafe { f(&mut *ptr) })
        }
    })
}

pub(crate) struct Reactor {
    epoll_fd: i32,
    events: [Event; 64],
    n_events: i32,
    readers: HashMap<i32, Waker>,
    writers: HashMap<i32, Waker>,
    wakers: Vec<Waker>,
}

impl Reactor {
    pub(crate) fn new() -> Self {
        Self {
            epoll_fd: unsafe { epoll_create1(EPOLL_CLOEXEC) },
            events: [Event::EMPTY; 64],
            n_events: 0,
            readers: HashMap::new(),
            writers: HashMap::new(),
            wakers: Vec::new(),
        }
    }

    /// Parks `waker` until the descriptor becomes readable.
    pub(crate) fn register_read(&mut self, file_descriptor: i32, waker: Waker) {
        self.readers.insert(file_descriptor, waker);
        self.arm(file_descriptor);
    }

    /// Parks `waker` until the descriptor becomes writable.
    pub(crate) fn register_write(&mut self, file_descriptor: i32, waker: Waker) {
        self.writers.insert(file_descriptor, waker);
        self.arm(file_descriptor);
    }

    // Re-arms epoll interest from the current waiter maps.
    fn arm(&mut self, file_descriptor: i32) {
        let mut interest = 0u32;
        if self.readers.contains_key(&file_descriptor) {
            interest |= EPOLLIN as u32;
        }
        if self.writers.contains_key(&file_descriptor) {
            interest |= EPOLLOUT as u32;
        }

        Event::new(file_descriptor, interest).register(self.epoll_fd);
    }

    /// Drops any parked wakers for a descriptor that is closing or leaving
    /// the reactor's care.
    ///
    /// Closing an fd removes its epoll interest, but a waker left behind by
    /// a cancelled future would otherwise fire for whatever descriptor
    /// reuses the number.
    pub(crate) fn deregister(&mut self, file_descriptor: i32) {
        self.readers.remove(&file_descriptor);
        self.writers.remove(&file_descriptor);
    }

    /// Blocks until at least one registered descriptor is ready.
    pub(crate) fn wait_for_event(&mut self) {
        self.n_events = Event::wait(self.epoll_fd, &mut self.events);
    }

    /// Blocks for at most `timeout_ms` waiting for readiness.
    pub(crate) fn wait_for_event_with_timeout(&mut self, timeout_ms: u64) {
        self.n_events = Event::wait_with_timeout(self.epoll_fd, &mut self.events, timeout_ms);
    }

    /// Polls for I/O events without blocking and handles them if present.
    pub(crate) fn poll_events(&mut self) {
        let n_events = Event::try_wait(self.epoll_fd, &mut self.events);
        if n_events <= 0 {
            return;
        }
        self.n_events = n_events;
        self.handle_events();
    }

    /// Fires every waker collected by `handle_events`.
    pub(crate) fn wake_ready(&mut self) {
        for waker in self.wakers.drain(..) {
            waker.wake();
        }
    }

    /// Moves the wakers of all fired events to the ready list.
    pub(crate) fn handle_events(&mut self) {
        for i in 0..self.n_events.max(0) as usize {
            let event = self.events[i];
            let file_descriptor = event.file_descriptor();

            if event.readable()
                && let Some(waker) = self.readers.remove(&file_descriptor)
            {
                self.wakers.push(waker);
            }

            if event.writable()
                && let Some(waker) = self.writers.remove(&file_descriptor)
            {
                self.wakers.push(waker);
            }

            // The other direction may still have a waiter; re-arm for it.
            if self.readers.contains_key(&file_descriptor)
                || self.writers.contains_key(&file_descriptor)
            {
                self.arm(file_descriptor);
            }
        }

        self.n_events = 0;
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        unsafe {
            close(self.epoll_fd);
        }
    }
}
