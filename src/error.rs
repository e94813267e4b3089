//! Error type shared by the protocol clients.
//!
//! The resource wrappers (`File`, `TcpSocket`, `UdpSocket`) stay on plain
//! [`io::Result`]; the protocol layer folds I/O failures and wire-format
//! problems into a single [`Error`] so callers can match on what went wrong
//! instead of terminating the process.

use std::io;

use crate::time::TimeError;

/// Errors produced by the DNS, SNTP, and HTTP clients.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Underlying transport or descriptor failure.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// A message ended before a field could be read.
    #[error("truncated message at offset {offset}")]
    Truncated { offset: usize },

    /// A message violated the wire format in a recoverable way.
    #[error("malformed message: {reason}")]
    Malformed { reason: &'static str },

    /// A DNS label exceeded the 63-byte encoding limit.
    #[error("dns label longer than 63 bytes")]
    LabelTooLong,

    /// A DNS compression pointer chain exceeded the jump budget.
    #[error("dns compression pointer loop")]
    PointerLoop,

    /// An HTTP request was issued while a response was still outstanding.
    #[error("http session already in use")]
    SessionBusy,

    /// The HTTP session hit a fatal condition and cannot send again.
    #[error("http session closed")]
    SessionClosed,

    /// Response headers did not fit the client's fixed buffer.
    #[error("response headers exceed buffer capacity")]
    HeadersTooLarge,

    /// The peer closed the connection before the response head arrived.
    #[error("connection closed before response headers arrived")]
    ConnectionClosed,

    /// A configured deadline elapsed before the exchange completed.
    #[error("operation timed out")]
    TimedOut,
}

impl From<TimeError> for Error {
    fn from(_: TimeError) -> Self {
        Error::TimedOut
    }
}
