//! Socket futures: accept, connect, stream and datagram transfer.
//!
//! All futures follow the same pattern as the file futures: try the syscall,
//! resolve on success, register with the reactor and yield on `EAGAIN` or
//! `EWOULDBLOCK`, and surface every other errno as an `io::Error`. Each
//! completion wakes exactly the task that registered for it.

use crate::net::addr::{socketaddr_to_storage, storage_as_sockaddr, storage_to_socketaddr};
use crate::reactor::core::with_current_reactor;
use crate::reactor::event::{Event, errno};

use libc::{
    EAGAIN, EWOULDBLOCK, SO_ERROR, SOL_SOCKET, accept, getsockopt, recv, recvfrom, send, sendto,
    sockaddr, sockaddr_storage, socklen_t,
};
use std::future::Future;
use std::io;
use std::mem;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Future resolving to one accepted connection: `(fd, peer address)`.
///
/// The returned descriptor is already set non-blocking.
pub struct AcceptFuture {
    listen_fd: i32,
    registered: bool,
}

impl AcceptFuture {
    pub fn new(listen_fd: i32) -> Self {
        Self {
            listen_fd,
            registered: false,
        }
    }
}

impl Future for AcceptFuture {
    type Output = io::Result<(i32, SocketAddr)>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
        let mut addr_len = mem::size_of::<sockaddr_storage>() as socklen_t;

        let client_fd = unsafe {
            accept(
                self.listen_fd,
                &mut storage as *mut _ as *mut sockaddr,
                &mut addr_len,
            )
        };

        if client_fd >= 0 {
            Event::set_nonblocking(client_fd);
            let peer = storage_to_socketaddr(&storage)?;
            return Poll::Ready(Ok((client_fd, peer)));
        }

        let error = errno();

        if error == EAGAIN || error == EWOULDBLOCK {
            if !self.registered {
                let _ = with_current_reactor(|r| {
                    r.register_read(self.listen_fd, cx.waker().clone());
                });
                self.registered = true;
            }
            return Poll::Pending;
        }

        Poll::Ready(Err(io::Error::last_os_error()))
    }
}

/// Future resolving once a non-blocking `connect` finishes.
///
/// The connect itself was already issued; this waits for writability and
/// then inspects `SO_ERROR` for the outcome.
pub struct ConnectFuture {
    file_descriptor: i32,
    registered: bool,
}

impl ConnectFuture {
    pub(crate) fn new(file_descriptor: i32) -> Self {
        Self {
            file_descriptor,
            registered: false,
        }
    }
}

impl Future for ConnectFuture {
    type Output = io::Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if !self.registered {
            let _ = with_current_reactor(|r| {
                r.register_write(self.file_descriptor, cx.waker().clone());
            });
            self.registered = true;
            return Poll::Pending;
        }

        let mut error: i32 = 0;
        let mut len = mem::size_of::<i32>() as socklen_t;
        let ret = unsafe {
            getsockopt(
                self.file_descriptor,
                SOL_SOCKET,
                SO_ERROR,
                &mut error as *mut _ as *mut _,
                &mut len,
            )
        };

        if ret < 0 {
            return Poll::Ready(Err(io::Error::last_os_error()));
        }

        if error != 0 {
            return Poll::Ready(Err(io::Error::from_raw_os_error(error)));
        }

        Poll::Ready(Ok(()))
    }
}

/// Future performing one `recv` on a connected socket.
///
/// Resolves to the number of bytes received; `Ok(0)` signals that the peer
/// closed the connection.
pub struct RecvFuture<'a> {
    file_descriptor: i32,
    buffer: &'a mut [u8],
    registered: bool,
}

impl<'a> RecvFuture<'a> {
    pub fn new(file_descriptor: i32, buffer: &'a mut [u8]) -> Self {
        Self {
            file_descriptor,
            buffer,
            registered: false,
        }
    }
}

impl<'a> Future for RecvFuture<'a> {
    type Output = io::Result<usize>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.as_mut().get_mut();

        let result = unsafe {
            recv(
                this.file_descriptor,
                this.buffer.as_mut_ptr() as *mut _,
                this.buffer.len(),
                0,
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

/// Future performing one `send` on a connected socket.
///
/// Resolves to the number of bytes queued, which may be short.
pub struct SendFuture<'a> {
    file_descriptor: i32,
    buffer: &'a [u8],
    registered: bool,
}

impl<'a> SendFuture<'a> {
    pub fn new(file_descriptor: i32, buffer: &'a [u8]) -> Self {
        Self {
            file_descriptor,
            buffer,
            registered: false,
        }
    }
}

impl<'a> Future for SendFuture<'a> {
    type Output = io::Result<usize>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.as_mut().get_mut();

        let result = unsafe {
            send(
                this.file_descriptor,
                this.buffer.as_ptr() as *const _,
                this.buffer.len(),
                0,
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

/// Future receiving one datagram along with its source address.
pub struct RecvFromFuture<'a> {
    file_descriptor: i32,
    buffer: &'a mut [u8],
    registered: bool,
}

impl<'a> RecvFromFuture<'a> {
    pub fn new(file_descriptor: i32, buffer: &'a mut [u8]) -> Self {
        Self {
            file_descriptor,
            buffer,
            registered: false,
        }
    }
}

impl<'a> Future for RecvFromFuture<'a> {
    type Output = io::Result<(usize, SocketAddr)>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.as_mut().get_mut();

        let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
        let mut addr_len = mem::size_of::<sockaddr_storage>() as socklen_t;

        let result = unsafe {
            recvfrom(
                this.file_descriptor,
                this.buffer.as_mut_ptr() as *mut _,
                this.buffer.len(),
                0,
                &mut storage as *mut _ as *mut sockaddr,
                &mut addr_len,
            )
        };

        if result >= 0 {
            let source = storage_to_socketaddr(&storage)?;
            return Poll::Ready(Ok((result as usize, source)));
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

/// Future sending one datagram to a fixed target address.
pub struct SendToFuture<'a> {
    file_descriptor: i32,
    buffer: &'a [u8],
    target: SocketAddr,
    registered: bool,
}

impl<'a> SendToFuture<'a> {
    pub fn new(file_descriptor: i32, buffer: &'a [u8], target: SocketAddr) -> Self {
        Self {
            file_descriptor,
            buffer,
            target,
            registered: false,
        }
    }
}

impl<'a> Future for SendToFuture<'a> {
    type Output = io::Result<usize>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.as_mut().get_mut();

        let (storage, addr_len) = socketaddr_to_storage(&this.target);

        let result = unsafe {
            sendto(
                this.file_descriptor,
                this.buffer.as_ptr() as *const _,
                this.buffer.len(),
                0,
                storage_as_sockaddr(&storage),
                addr_len,
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
