//! TCP connection and listener wrappers.
//!
//! [`TcpSocket`] owns one connected descriptor; [`TcpListenSocket`] owns a
//! listening descriptor plus the background accept-loop task that hands an
//! owned socket to a caller-supplied handler per connection. Every
//! descriptor is closed exactly once, by whichever wrapper owns it when it
//! is dropped.

use crate::net::addr::{socketaddr_to_storage, storage_as_sockaddr, storage_to_socketaddr};
use crate::net::future::{AcceptFuture, ConnectFuture, RecvFuture, SendFuture};
use crate::reactor::core::with_current_reactor;
use crate::reactor::event::{Event, errno};
use crate::runtime::context::ensure_net;
use crate::task::{JoinHandle, Task};

use libc::{
    AF_INET, AF_INET6, EINPROGRESS, SOCK_STREAM, bind, close, connect, getsockname, listen,
    sockaddr, sockaddr_storage, socket, socklen_t,
};
use std::io;
use std::mem;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

const LISTEN_BACKLOG: i32 = 128;

/// One TCP connection, exclusively owning its descriptor.
///
/// Created by [`TcpSocket::connect`] or handed an accepted descriptor by a
/// listener. Transfer of the descriptor (moves, [`Self::into_raw_fd`])
/// leaves no second owner behind, so the close on drop happens exactly once.
/// I/O errors surface as `io::Error` values; nothing here terminates the
/// process.
pub struct TcpSocket {
    file_descriptor: i32,
    peer: SocketAddr,
}

impl TcpSocket {
    /// Connects to `target`.
    ///
    /// Issues a non-blocking connect, suspends until the socket becomes
    /// writable, and checks `SO_ERROR` for the outcome.
    pub async fn connect(target: SocketAddr) -> io::Result<Self> {
        ensure_net();

        let file_descriptor = new_stream_socket(&target)?;

        let (storage, addr_len) = socketaddr_to_storage(&target);
        let ret = unsafe { connect(file_descriptor, storage_as_sockaddr(&storage), addr_len) };

        if ret < 0 && errno() != EINPROGRESS {
            let error = io::Error::last_os_error();
            unsafe {
                close(file_descriptor);
            }
            return Err(error);
        }

        if ret < 0
            && let Err(error) = ConnectFuture::new(file_descriptor).await
        {
            unsafe {
                close(file_descriptor);
            }
            return Err(error);
        }

        debug!(fd = file_descriptor, peer = %target, "tcp open");

        Ok(Self {
            file_descriptor,
            peer: target,
        })
    }

    /// Wraps a descriptor accepted by a listener.
    pub(crate) fn from_accepted(file_descriptor: i32, peer: SocketAddr) -> Self {
        debug!(fd = file_descriptor, %peer, "tcp accepted");

        Self {
            file_descriptor,
            peer,
        }
    }

    /// Address of the remote peer.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Receives into `buffer`, returning the bytes read.
    ///
    /// `Ok(0)` means the peer closed the connection.
    pub async fn recvmsg(&self, buffer: &mut [u8]) -> io::Result<usize> {
        RecvFuture::new(self.file_descriptor, buffer).await
    }

    /// Sends the entire message, retrying short sends.
    pub async fn sendmsg(&self, mut message: &[u8]) -> io::Result<()> {
        while !message.is_empty() {
            let sent = SendFuture::new(self.file_descriptor, message).await?;

            if sent == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "send returned zero bytes",
                ));
            }

            message = &message[sent..];
        }

        Ok(())
    }

    /// Releases ownership of the descriptor without closing it.
    pub fn into_raw_fd(self) -> i32 {
        let file_descriptor = self.file_descriptor;
        let _ = with_current_reactor(|r| r.deregister(file_descriptor));
        std::mem::forget(self);
        file_descriptor
    }
}

impl Drop for TcpSocket {
    fn drop(&mut self) {
        if self.file_descriptor >= 0 {
            debug!(fd = self.file_descriptor, "tcp close");
            // A cancelled read or write may have left a waker parked; drop
            // it before the fd number can be reused.
            let _ = with_current_reactor(|r| r.deregister(self.file_descriptor));
            unsafe {
                close(self.file_descriptor);
            }
        }
    }
}

/// A listening socket driving a background accept loop.
///
/// The loop awaits incoming connections and invokes the handler with an
/// owned [`TcpSocket`] per connection until the stop flag is observed. The
/// flag is checked before each accept, never during one: a pending accept
/// resolves only when the next connection (or an error) arrives. Dropping
/// the listener sets the flag, blocks until the loop task resolves, then
/// closes the listening descriptor.
pub struct TcpListenSocket {
    file_descriptor: i32,
    local: SocketAddr,
    stop: Arc<AtomicBool>,
    accept_loop: Option<JoinHandle<()>>,
}

impl TcpListenSocket {
    /// Binds to `address`, listens, and starts the accept loop.
    ///
    /// Must be called from within a runtime context; the loop runs as a
    /// spawned task on the current runtime.
    pub async fn bind<F>(address: SocketAddr, on_connect: F) -> io::Result<Self>
    where
        F: FnMut(TcpSocket) + 'static,
    {
        ensure_net();

        let file_descriptor = new_stream_socket(&address)?;

        let (storage, addr_len) = socketaddr_to_storage(&address);
        let ret = unsafe { bind(file_descriptor, storage_as_sockaddr(&storage), addr_len) };
        if ret < 0 {
            let error = io::Error::last_os_error();
            unsafe {
                close(file_descriptor);
            }
            return Err(error);
        }

        let ret = unsafe { listen(file_descriptor, LISTEN_BACKLOG) };
        if ret < 0 {
            let error = io::Error::last_os_error();
            unsafe {
                close(file_descriptor);
            }
            return Err(error);
        }

        let local = local_addr_of(file_descriptor)?;
        debug!(fd = file_descriptor, %local, "tcp listen");

        let stop = Arc::new(AtomicBool::new(false));
        let accept_loop = Task::spawn(accept_loop(file_descriptor, stop.clone(), on_connect));

        Ok(Self {
            file_descriptor,
            local,
            stop,
            accept_loop: Some(accept_loop),
        })
    }

    /// Address this listener is bound to (resolves a requested port of 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Requests shutdown of the accept loop.
    ///
    /// The loop observes the flag before issuing its next accept; an accept
    /// already in flight still completes (and its connection is handed to
    /// the handler) before the loop exits.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

impl Drop for TcpListenSocket {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);

        if let Some(handle) = self.accept_loop.take() {
            handle.get_value();
        }

        let _ = with_current_reactor(|r| r.deregister(self.file_descriptor));
        unsafe {
            close(self.file_descriptor);
        }
    }
}

async fn accept_loop<F>(listen_fd: i32, stop: Arc<AtomicBool>, mut on_connect: F)
where
    F: FnMut(TcpSocket),
{
    while !stop.load(Ordering::SeqCst) {
        match AcceptFuture::new(listen_fd).await {
            Ok((client_fd, peer)) => on_connect(TcpSocket::from_accepted(client_fd, peer)),
            Err(error) => {
                warn!(%error, "accept failed, stopping listener");
                break;
            }
        }
    }
}

fn new_stream_socket(address: &SocketAddr) -> io::Result<i32> {
    let family = if address.is_ipv4() { AF_INET } else { AF_INET6 };

    let file_descriptor = unsafe { socket(family, SOCK_STREAM, 0) };
    if file_descriptor < 0 {
        return Err(io::Error::last_os_error());
    }

    Event::set_nonblocking(file_descriptor);
    Ok(file_descriptor)
}

fn local_addr_of(file_descriptor: i32) -> io::Result<SocketAddr> {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
    let mut addr_len = mem::size_of::<sockaddr_storage>() as socklen_t;

    let ret = unsafe {
        getsockname(
            file_descriptor,
            &mut storage as *mut _ as *mut sockaddr,
            &mut addr_len,
        )
    };

    if ret < 0 {
        return Err(io::Error::last_os_error());
    }

    storage_to_socketaddr(&storage)
}
