//! Buffered HTTP/1.1 client over a caller-supplied transport.
//!
//! One request runs at a time per client. [`HttpClient::send_request`] hands
//! back an [`HttpResponse`] that borrows the client mutably; dropping the
//! response returns the session to the free state so the connection can be
//! reused. Any transport failure or protocol violation marks the session
//! dead and refuses further requests.

use crate::error::Error;
use crate::net::tcp::TcpSocket;

use std::collections::BTreeMap;
use std::io;
use tracing::{debug, trace};

const BUFFER_LEN: usize = 8192;
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Byte stream the HTTP client speaks over.
///
/// Implemented for [`TcpSocket`]; tests substitute scripted transports.
pub trait Transport {
    async fn sendmsg(&self, message: &[u8]) -> io::Result<()>;
    async fn recvmsg(&self, buffer: &mut [u8]) -> io::Result<usize>;
}

impl Transport for TcpSocket {
    async fn sendmsg(&self, message: &[u8]) -> io::Result<()> {
        TcpSocket::sendmsg(self, message).await
    }

    async fn recvmsg(&self, buffer: &mut [u8]) -> io::Result<usize> {
        TcpSocket::recvmsg(self, buffer).await
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SessionState {
    /// Ready to accept a request.
    Free,
    /// A response is outstanding and owns the buffer.
    InUse,
    /// The connection failed; no further requests.
    Dead,
}

/// A request line plus headers. The header map is ordered so serialized
/// requests are byte-for-byte reproducible.
pub struct HttpRequest {
    method: &'static str,
    path: String,
    headers: BTreeMap<String, String>,
    body: Vec<u8>,
}

impl HttpRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self::new("GET", path)
    }

    pub fn post(path: impl Into<String>, body: Vec<u8>) -> Self {
        let mut request = Self::new("POST", path);
        request
            .headers
            .insert("Content-Length".into(), body.len().to_string());
        request.body = body;
        request
    }

    fn new(method: &'static str, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: BTreeMap::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Serializes the request. `Connection: keep-alive` is always emitted
    /// since the client exists to reuse its connection.
    fn encode(&self) -> Vec<u8> {
        let mut wire = Vec::with_capacity(64 + self.body.len());
        wire.extend_from_slice(self.method.as_bytes());
        wire.push(b' ');
        wire.extend_from_slice(self.path.as_bytes());
        wire.extend_from_slice(b" HTTP/1.1\r\n");
        wire.extend_from_slice(b"Connection: keep-alive\r\n");
        for (name, value) in &self.headers {
            wire.extend_from_slice(name.as_bytes());
            wire.extend_from_slice(b": ");
            wire.extend_from_slice(value.as_bytes());
            wire.extend_from_slice(b"\r\n");
        }
        wire.extend_from_slice(b"\r\n");
        wire.extend_from_slice(&self.body);
        wire
    }
}

/// HTTP/1.1 client holding one fixed receive buffer.
///
/// Response heads must fit in the buffer; bodies stream through it.
pub struct HttpClient<T: Transport> {
    transport: T,
    buffer: Box<[u8; BUFFER_LEN]>,
    /// Bytes of the buffer holding received, unconsumed data.
    buffer_size: usize,
    /// Read cursor into the buffered data.
    current_offset: usize,
    state: SessionState,
}

impl<T: Transport> HttpClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            buffer: Box::new([0u8; BUFFER_LEN]),
            buffer_size: 0,
            current_offset: 0,
            state: SessionState::Free,
        }
    }

    /// The transport this client sends over.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Sends `request` and receives the response head.
    ///
    /// Fails with [`Error::SessionBusy`] while a previous response is still
    /// alive and [`Error::SessionClosed`] once the connection has died.
    /// Reads until the blank line ending the head has arrived; a head
    /// larger than the buffer or a connection closing mid-head kills the
    /// session.
    pub async fn send_request(&mut self, request: &HttpRequest) -> Result<HttpResponse<'_, T>, Error> {
        match self.state {
            SessionState::Free => {}
            SessionState::InUse => return Err(Error::SessionBusy),
            SessionState::Dead => return Err(Error::SessionClosed),
        }

        let wire = request.encode();
        trace!(method = request.method, path = %request.path, "http request");
        if let Err(error) = self.transport.sendmsg(&wire).await {
            self.state = SessionState::Dead;
            return Err(error.into());
        }

        self.buffer_size = 0;
        self.current_offset = 0;

        let header_end = loop {
            if let Some(position) = find_terminator(&self.buffer[..self.buffer_size]) {
                break position;
            }
            if self.buffer_size == BUFFER_LEN {
                self.state = SessionState::Dead;
                return Err(Error::HeadersTooLarge);
            }
            let received = match self
                .transport
                .recvmsg(&mut self.buffer[self.buffer_size..])
                .await
            {
                Ok(received) => received,
                Err(error) => {
                    self.state = SessionState::Dead;
                    return Err(error.into());
                }
            };
            if received == 0 {
                self.state = SessionState::Dead;
                return Err(Error::ConnectionClosed);
            }
            self.buffer_size += received;
        };

        let (status, headers) = match parse_head(&self.buffer[..header_end]) {
            Ok(head) => head,
            Err(error) => {
                // The stream is desynchronized once the head is unparseable.
                self.state = SessionState::Dead;
                return Err(error);
            }
        };
        debug!(status, "http response head");

        // Body bytes start after the blank line.
        self.current_offset = header_end + HEADER_TERMINATOR.len();
        self.state = SessionState::InUse;

        Ok(HttpResponse {
            client: self,
            status,
            headers,
        })
    }
}

fn find_terminator(data: &[u8]) -> Option<usize> {
    data.windows(HEADER_TERMINATOR.len())
        .position(|window| window == HEADER_TERMINATOR)
}

/// Parses the status line and header lines of a response head.
///
/// `head` ends just before the blank line. Header names are matched
/// case-insensitively by lowercasing them on the way in.
fn parse_head(head: &[u8]) -> Result<(u16, BTreeMap<String, String>), Error> {
    let mut lines = head.split(|&byte| byte == b'\n').map(|line| {
        line.strip_suffix(b"\r").unwrap_or(line)
    });

    let status_line = lines.next().ok_or(Error::Malformed {
        reason: "empty response head",
    })?;
    let status_line = std::str::from_utf8(status_line).map_err(|_| Error::Malformed {
        reason: "status line is not utf-8",
    })?;

    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or("");
    if !version.starts_with("HTTP/1.") {
        return Err(Error::Malformed {
            reason: "unsupported protocol version",
        });
    }
    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or(Error::Malformed {
            reason: "unparseable status code",
        })?;

    let mut headers = BTreeMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let line = std::str::from_utf8(line).map_err(|_| Error::Malformed {
            reason: "header line is not utf-8",
        })?;
        let (name, value) = line.split_once(':').ok_or(Error::Malformed {
            reason: "header line without separator",
        })?;
        headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    Ok((status, headers))
}

/// A received response head plus streaming access to the body.
///
/// Holds the client mutably borrowed until dropped, at which point the
/// session becomes free for the next request.
pub struct HttpResponse<'a, T: Transport> {
    client: &'a mut HttpClient<T>,
    status: u16,
    headers: BTreeMap<String, String>,
}

impl<'a, T: Transport> HttpResponse<'a, T> {
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// The declared body length, when the server sent one.
    ///
    /// `None` means the length is unknown and the body runs until the
    /// connection closes.
    pub fn content_length(&self) -> Option<usize> {
        self.header("content-length")
            .and_then(|value| value.parse().ok())
    }

    /// Reads body bytes into `buffer`, draining data already buffered
    /// alongside the head before touching the transport. Returns 0 at end
    /// of stream.
    pub async fn read_body(&mut self, buffer: &mut [u8]) -> Result<usize, Error> {
        let buffered = self.client.buffer_size - self.client.current_offset;
        if buffered > 0 {
            let count = buffered.min(buffer.len());
            let start = self.client.current_offset;
            buffer[..count].copy_from_slice(&self.client.buffer[start..start + count]);
            self.client.current_offset += count;
            return Ok(count);
        }

        match self.client.transport.recvmsg(buffer).await {
            Ok(received) => Ok(received),
            Err(error) => {
                self.client.state = SessionState::Dead;
                Err(error.into())
            }
        }
    }

    /// Collects the whole body: exactly `Content-Length` bytes when the
    /// header is present, otherwise everything up to connection close.
    ///
    /// A connection closing before a declared length is satisfied is an
    /// error and kills the session.
    pub async fn read_full_body(&mut self) -> Result<Vec<u8>, Error> {
        let mut body = Vec::new();
        let mut chunk = [0u8; 1024];

        match self.content_length() {
            Some(expected) => {
                while body.len() < expected {
                    let remaining = expected - body.len();
                    let count = remaining.min(chunk.len());
                    let received = self.read_body(&mut chunk[..count]).await?;
                    if received == 0 {
                        self.client.state = SessionState::Dead;
                        return Err(Error::ConnectionClosed);
                    }
                    body.extend_from_slice(&chunk[..received]);
                }
            }
            None => loop {
                let received = self.read_body(&mut chunk).await?;
                if received == 0 {
                    break;
                }
                body.extend_from_slice(&chunk[..received]);
            },
        }

        Ok(body)
    }
}

impl<'a, T: Transport> std::fmt::Debug for HttpResponse<'a, T> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl<'a, T: Transport> Drop for HttpResponse<'a, T> {
    fn drop(&mut self) {
        if self.client.state == SessionState::InUse {
            self.client.state = SessionState::Free;
        }
    }
}
