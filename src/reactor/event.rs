use libc::{
    EEXIST, EPOLL_CTL_ADD, EPOLL_CTL_MOD, EPOLLERR, EPOLLHUP, EPOLLIN, EPOLLONESHOT, EPOLLOUT,
    F_GETFL, F_SETFL, O_NONBLOCK, epoll_ctl, epoll_event, epoll_wait, fcntl,
};
use tracing::warn;

/// Thin wrapper around one `epoll_event`.
///
/// Interest is registered one-shot: each arm delivers at most one readiness
/// notification, after which the descriptor must be re-armed. Error and
/// hang-up conditions count as readiness in both directions so waiting
/// futures get a chance to observe the failing syscall result.
#[derive(Clone, Copy)]
#[repr(transparent)]
pub(crate) struct Event(epoll_event);

impl Event {
    pub(crate) const EMPTY: Self = Self(epoll_event { events: 0, u64: 0 });

    pub(crate) fn new(file_descriptor: i32, interest: u32) -> Self {
        Self(epoll_event {
            events: interest | EPOLLONESHOT as u32,
            u64: file_descriptor as u64,
        })
    }

    pub(crate) fn file_descriptor(&self) -> i32 {
        let raw = self.0;
        raw.u64 as i32
    }

    pub(crate) fn readable(&self) -> bool {
        let raw = self.0;
        raw.events & (EPOLLIN | EPOLLERR | EPOLLHUP) as u32 != 0
    }

    pub(crate) fn writable(&self) -> bool {
        let raw = self.0;
        raw.events & (EPOLLOUT | EPOLLERR | EPOLLHUP) as u32 != 0
    }

    /// Arms this event on the given epoll instance.
    ///
    /// A descriptor that is already in the interest set is re-armed via
    /// `EPOLL_CTL_MOD` (one-shot registrations stay in the set after firing).
    pub(crate) fn register(&mut self, epoll_fd: i32) {
        let file_descriptor = self.file_descriptor();

        let mut ret = unsafe { epoll_ctl(epoll_fd, EPOLL_CTL_ADD, file_descriptor, &mut self.0) };

        if ret < 0 && errno() == EEXIST {
            ret = unsafe { epoll_ctl(epoll_fd, EPOLL_CTL_MOD, file_descriptor, &mut self.0) };
        }

        // A failed registration means the waiting future is never woken;
        // make that diagnosable.
        if ret < 0 {
            warn!(
                fd = file_descriptor,
                error = %std::io::Error::last_os_error(),
                "epoll registration failed"
            );
        }
    }

    /// Blocks until at least one event is ready.
    pub(crate) fn wait(epoll_fd: i32, events: &mut [Event; 64]) -> i32 {
        unsafe {
            epoll_wait(
                epoll_fd,
                events.as_mut_ptr() as *mut epoll_event,
                events.len() as i32,
                -1,
            )
        }
    }

    /// Waits for events with a timeout in milliseconds.
    pub(crate) fn wait_with_timeout(epoll_fd: i32, events: &mut [Event; 64], timeout_ms: u64) -> i32 {
        unsafe {
            epoll_wait(
                epoll_fd,
                events.as_mut_ptr() as *mut epoll_event,
                events.len() as i32,
                timeout_ms.min(i32::MAX as u64) as i32,
            )
        }
    }

    /// Non-blocking poll: returns immediately with any ready events.
    pub(crate) fn try_wait(epoll_fd: i32, events: &mut [Event; 64]) -> i32 {
        unsafe {
            epoll_wait(
                epoll_fd,
                events.as_mut_ptr() as *mut epoll_event,
                events.len() as i32,
                0,
            )
        }
    }

    pub(crate) fn set_nonblocking(file_descriptor: i32) {
        let flags = unsafe { fcntl(file_descriptor, F_GETFL) };

        unsafe {
            fcntl(file_descriptor, F_SETFL, flags | O_NONBLOCK);
        }
    }
}

pub(crate) fn errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}
