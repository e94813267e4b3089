//! Textual network addresses and sockaddr conversions.
//!
//! [`NetAddr`] is the parse/format front door used in configuration: an IP
//! address with an optional port, whose `Display` output reproduces the
//! parsed text exactly (including bracketed IPv6-with-port forms and RFC
//! 5952 compression). The sockaddr helpers convert between [`SocketAddr`]
//! and the raw structures the libc boundary needs.

use libc::{AF_INET, AF_INET6, sockaddr, sockaddr_in, sockaddr_in6, sockaddr_storage, socklen_t};
use std::fmt;
use std::io;
use std::mem;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

/// An IP address with an optional port.
///
/// Parses `"ip"`, `"ip:port"`, and `"[ipv6]:port"` forms; formatting is an
/// exact round trip of the parsed text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetAddr {
    pub ip: IpAddr,
    pub port: Option<u16>,
}

impl NetAddr {
    /// Resolves to a socket address, filling in `default_port` when the
    /// textual form carried none.
    pub fn socket_addr(&self, default_port: u16) -> SocketAddr {
        SocketAddr::new(self.ip, self.port.unwrap_or(default_port))
    }
}

impl FromStr for NetAddr {
    type Err = io::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // "ip:port" / "[ipv6]:port" first; bare addresses never parse as one.
        if let Ok(with_port) = SocketAddr::from_str(s) {
            return Ok(Self {
                ip: with_port.ip(),
                port: Some(with_port.port()),
            });
        }

        let ip = IpAddr::from_str(s).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "unparseable network address")
        })?;

        Ok(Self { ip, port: None })
    }
}

impl fmt::Display for NetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => SocketAddr::new(self.ip, port).fmt(f),
            None => self.ip.fmt(f),
        }
    }
}

impl From<SocketAddr> for NetAddr {
    fn from(addr: SocketAddr) -> Self {
        Self {
            ip: addr.ip(),
            port: Some(addr.port()),
        }
    }
}

/// Converts a socket address into a `sockaddr_storage` for libc calls.
pub(crate) fn socketaddr_to_storage(addr: &SocketAddr) -> (sockaddr_storage, socklen_t) {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };

    match addr {
        SocketAddr::V4(v4) => {
            let raw = sockaddr_in {
                sin_family: AF_INET as libc::sa_family_t,
                sin_port: v4.port().to_be(),
                sin_addr: libc::in_addr {
                    s_addr: u32::from_ne_bytes(v4.ip().octets()),
                },
                sin_zero: [0; 8],
            };
            unsafe {
                std::ptr::write(&mut storage as *mut _ as *mut sockaddr_in, raw);
            }
            (storage, mem::size_of::<sockaddr_in>() as socklen_t)
        }
        SocketAddr::V6(v6) => {
            let raw = sockaddr_in6 {
                sin6_family: AF_INET6 as libc::sa_family_t,
                sin6_port: v6.port().to_be(),
                sin6_flowinfo: 0,
                sin6_addr: libc::in6_addr {
                    s6_addr: v6.ip().octets(),
                },
                sin6_scope_id: 0,
            };
            unsafe {
                std::ptr::write(&mut storage as *mut _ as *mut sockaddr_in6, raw);
            }
            (storage, mem::size_of::<sockaddr_in6>() as socklen_t)
        }
    }
}

/// Reads a socket address back out of a `sockaddr_storage`.
pub(crate) fn storage_to_socketaddr(storage: &sockaddr_storage) -> io::Result<SocketAddr> {
    match storage.ss_family as i32 {
        AF_INET => {
            let raw = unsafe { *(storage as *const _ as *const sockaddr_in) };
            let ip = std::net::Ipv4Addr::from(raw.sin_addr.s_addr.to_ne_bytes());
            Ok(SocketAddr::new(IpAddr::V4(ip), u16::from_be(raw.sin_port)))
        }
        AF_INET6 => {
            let raw = unsafe { *(storage as *const _ as *const sockaddr_in6) };
            let ip = std::net::Ipv6Addr::from(raw.sin6_addr.s6_addr);
            Ok(SocketAddr::new(IpAddr::V6(ip), u16::from_be(raw.sin6_port)))
        }
        family => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unexpected address family {family}"),
        )),
    }
}

/// Borrows a storage as the `sockaddr` pointer libc expects.
pub(crate) fn storage_as_sockaddr(storage: &sockaddr_storage) -> *const sockaddr {
    storage as *const _ as *const sockaddr
}
