//! Non-blocking network sockets and the protocol clients built on them.

pub mod addr;
pub mod dns;
pub mod http;
pub mod ntp;
pub mod tcp;
pub mod udp;

pub(crate) mod future;

pub use addr::NetAddr;
pub use dns::Resolver;
pub use http::{HttpClient, HttpRequest, HttpResponse, Transport};
pub use ntp::SntpClient;
pub use tcp::{TcpListenSocket, TcpSocket};
pub use udp::UdpSocket;
