//! Positional read and write futures for non-blocking file descriptors.
//!
//! Each future attempts its syscall directly; when the operating system
//! reports `EAGAIN` or `EWOULDBLOCK` the caller's waker is registered with
//! the reactor and the future yields. Once the descriptor is ready again the
//! reactor wakes the task and the operation is retried.

use crate::reactor::core::with_current_reactor;
use crate::reactor::event::errno;

use libc::{EAGAIN, EWOULDBLOCK, pread, pwrite};
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Future performing one positional read (`pread`) at a fixed offset.
///
/// Resolves to the number of bytes read; `Ok(0)` signals end of file.
pub struct ReadFuture<'a> {
    file_descriptor: i32,
    buffer: &'a mut [u8],
    offset: u64,
    registered: bool,
}

impl<'a> ReadFuture<'a> {
    pub(crate) fn new(file_descriptor: i32, buffer: &'a mut [u8], offset: u64) -> Self {
        Self {
            file_descriptor,
            buffer,
            offset,
            registered: false,
        }
    }
}

impl<'a> Future for ReadFuture<'a> {
    type Output = io::Result<usize>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.as_mut().get_mut();

        let result = unsafe {
            pread(
                this.file_descriptor,
                this.buffer.as_mut_ptr() as *mut _,
                this.buffer.len(),
                this.offset as libc::off_t,
            )
        };

        if result >= 0 {
            return Poll::Ready(Ok(result as usize));
        }

        let error = errno();

        if error == EAGAIN || error == EWOULDBLOCK {
            if !this.registered {
                let _ = with_current_reactor(|r| {
                    r.register_read(this.file_descriptor, cx.waker().clone());
                });
                this.registered = true;
            }
            return Poll::Pending;
        }

        Poll::Ready(Err(io::Error::last_os_error()))
    }
}

/// Future performing one positional write (`pwrite`) at a fixed offset.
///
/// Resolves to the number of bytes written, which may be short.
pub struct WriteFuture<'a> {
    file_descriptor: i32,
    buffer: &'a [u8],
    offset: u64,
    registered: bool,
}

impl<'a> WriteFuture<'a> {
    pub(crate) fn new(file_descriptor: i32, buffer: &'a [u8], offset: u64) -> Self {
        Self {
            file_descriptor,
            buffer,
            offset,
            registered: false,
        }
    }
}

impl<'a> Future for WriteFuture<'a> {
    type Output = io::Result<usize>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.as_mut().get_mut();

        let result = unsafe {
            pwrite(
                this.file_descriptor,
                this.buffer.as_ptr() as *const _,
                this.buffer.len(),
                this.offset as libc::off_t,
            )
        };

        if result >= 0 {
            return Poll::Ready(Ok(result as usize));
        }

        let error = errno();

        if error == EAGAIN || error == EWOULDBLOCK {
            if !this.registered {
                let _ = with_current_reactor(|r| {
                    r.register_write(this.file_descriptor, cx.waker().clone());
                });
                this.registered = true;
            }
            return Poll::Pending;
        }

        Poll::Ready(Err(io::Error::last_os_error()))
    }
}
