//! Culvert is a small single-threaded asynchronous I/O runtime built
//! directly on POSIX primitives.
//!
//! The scheduler is strictly cooperative: one task runs at a time and only
//! hands control back at an await point. An epoll reactor parks the thread
//! while no task is runnable and wakes the task waiting on a descriptor
//! when it becomes ready.
//!
//! On top of the scheduler sit ownership wrappers for files and sockets
//! ([`fs::File`], [`net::TcpSocket`], [`net::TcpListenSocket`],
//! [`net::UdpSocket`]) and three protocol clients: a dual-stack DNS stub
//! resolver, an SNTP client, and a buffered HTTP/1.1 client.
//!
//! ```no_run
//! use culvert::{RuntimeBuilder, net::TcpSocket};
//!
//! let mut runtime = RuntimeBuilder::new().enable_net().build();
//! runtime.block_on(async {
//!     let socket = TcpSocket::connect("127.0.0.1:7000".parse().unwrap())
//!         .await
//!         .unwrap();
//!     socket.sendmsg(b"ping").await.unwrap();
//! });
//! ```

mod builder;
mod error;
mod reactor;
mod runtime;
mod task;
mod timer;

pub mod fs;
pub mod net;
pub mod time;

pub use builder::RuntimeBuilder;
pub use error::Error;
pub use runtime::Runtime;
pub use runtime::yield_now::yield_now;
pub use task::{JoinHandle, Task};
