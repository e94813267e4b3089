//! UDP datagram socket.
//!
//! Unconnected datagram transport used by the DNS and SNTP clients. The
//! socket is bound implicitly by the kernel on first send; receives report
//! the source address so callers can correlate replies with the server they
//! queried.

use crate::net::future::{RecvFromFuture, SendToFuture};
use crate::reactor::core::with_current_reactor;
use crate::reactor::event::Event;
use crate::runtime::context::ensure_net;

use libc::{AF_INET, AF_INET6, SOCK_DGRAM, close, socket};
use std::io;
use std::net::SocketAddr;

/// An exclusively owned UDP socket.
pub struct UdpSocket {
    file_descriptor: i32,
}

impl UdpSocket {
    /// Creates a socket whose address family matches `peer`.
    pub fn for_peer(peer: &SocketAddr) -> io::Result<Self> {
        ensure_net();

        let family = if peer.is_ipv4() { AF_INET } else { AF_INET6 };

        let file_descriptor = unsafe { socket(family, SOCK_DGRAM, 0) };
        if file_descriptor < 0 {
            return Err(io::Error::last_os_error());
        }

        Event::set_nonblocking(file_descriptor);

        Ok(Self { file_descriptor })
    }

    /// Sends one datagram to `target`, returning the bytes sent.
    pub async fn send_to(&self, target: SocketAddr, message: &[u8]) -> io::Result<usize> {
        SendToFuture::new(self.file_descriptor, message, target).await
    }

    /// Receives one datagram, returning its length and source address.
    pub async fn recv_from(&self, buffer: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        RecvFromFuture::new(self.file_descriptor, buffer).await
    }
}

impl Drop for UdpSocket {
    fn drop(&mut self) {
        // A timed-out receive leaves its waker parked; drop it before the
        // fd number can be reused.
        let _ = with_current_reactor(|r| r.deregister(self.file_descriptor));
        unsafe {
            close(self.file_descriptor);
        }
    }
}
