//! DNS query encoding, reply decoding, and the dual-stack resolver.
//!
//! The wire format is handled with explicit big-endian helpers over a
//! bounds-checked cursor: every read is validated against the message length
//! and failures come back as structured [`Error`]s instead of running past
//! the buffer. Name decoding supports the standard compression
//! back-reference (a length byte of `0xC0` or above combines with the next
//! byte into a 14-bit offset into the message).
//!
//! [`Resolver::resolve`] issues one A and one AAAA query over UDP and
//! collects replies until both answers from the configured server have been
//! observed. There is no timeout unless the caller configures one: an
//! unresponsive server suspends the exchange indefinitely.

use crate::error::Error;
use crate::net::udp::UdpSocket;
use crate::time::timeout;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tracing::{trace, warn};

/// Record types the resolver asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordType {
    A = 0x01,
    Aaaa = 0x1C,
}

const CLASS_IN: u16 = 1;
const TYPE_OPT: u16 = 41;
const EDNS_PAYLOAD_SIZE: u16 = 512;
const HEADER_LEN: usize = 12;
const MAX_DATAGRAM: usize = 576;
const MAX_LABEL_LEN: usize = 63;

// Upper bound on compression back-references followed per name; real
// messages need a handful at most, anything deeper is a pointer loop.
const MAX_POINTER_JUMPS: usize = 16;

const QUERY_ID_A: u16 = 0x4241;
const QUERY_ID_AAAA: u16 = 0x4242;

fn put_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_be_bytes());
}

fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

/// Bounds-checked big-endian reader over a DNS message.
struct Reader<'a> {
    message: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(message: &'a [u8], offset: usize) -> Self {
        Self { message, offset }
    }

    fn truncated(&self) -> Error {
        Error::Truncated {
            offset: self.offset,
        }
    }

    fn u8(&mut self) -> Result<u8, Error> {
        let value = *self.message.get(self.offset).ok_or_else(|| self.truncated())?;
        self.offset += 1;
        Ok(value)
    }

    fn u16(&mut self) -> Result<u16, Error> {
        let end = self.offset.checked_add(2).ok_or_else(|| self.truncated())?;
        let bytes = self
            .message
            .get(self.offset..end)
            .ok_or_else(|| self.truncated())?;
        self.offset = end;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Result<u32, Error> {
        let end = self.offset.checked_add(4).ok_or_else(|| self.truncated())?;
        let bytes = self
            .message
            .get(self.offset..end)
            .ok_or_else(|| self.truncated())?;
        self.offset = end;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn bytes(&mut self, count: usize) -> Result<&'a [u8], Error> {
        let end = self
            .offset
            .checked_add(count)
            .ok_or_else(|| self.truncated())?;
        let bytes = self
            .message
            .get(self.offset..end)
            .ok_or_else(|| self.truncated())?;
        self.offset = end;
        Ok(bytes)
    }

    /// Decodes a (possibly compressed) domain name at the cursor.
    ///
    /// A back-reference suspends the outer cursor (which advances past the
    /// 2-byte pointer) and continues reading labels at the referenced
    /// offset. The jump budget turns pointer loops into [`Error::PointerLoop`].
    fn name(&mut self) -> Result<String, Error> {
        let mut labels: Vec<String> = Vec::new();
        let mut jumps = 0usize;

        // Cursor to restore once the first pointer has been followed.
        let mut resume_at: Option<usize> = None;

        loop {
            let len = self.u8()?;

            if len == 0 {
                break;
            }

            if len as usize >= 0xC0 {
                let low = self.u8()?;
                let target = ((len as usize) << 8 | low as usize) - 0xC000;

                jumps += 1;
                if jumps > MAX_POINTER_JUMPS {
                    return Err(Error::PointerLoop);
                }

                if resume_at.is_none() {
                    resume_at = Some(self.offset);
                }
                self.offset = target;
                continue;
            }

            let raw = self.bytes(len as usize)?;
            labels.push(String::from_utf8_lossy(raw).into_owned());
        }

        if let Some(offset) = resume_at {
            self.offset = offset;
        }

        Ok(labels.join("."))
    }
}

/// Appends a name as length-prefixed labels terminated by a zero byte.
///
/// The empty name encodes as the single root byte. Labels longer than 63
/// bytes cannot be represented and are rejected.
pub fn encode_name(buf: &mut Vec<u8>, name: &str) -> Result<(), Error> {
    for label in name.split('.').filter(|l| !l.is_empty()) {
        if label.len() > MAX_LABEL_LEN {
            return Err(Error::LabelTooLong);
        }
        buf.push(label.len() as u8);
        buf.extend_from_slice(label.as_bytes());
    }
    buf.push(0);
    Ok(())
}

/// Decodes the name at `*offset`, advancing the cursor past it.
///
/// The cursor advances by two bytes for a compression pointer regardless of
/// how long the referenced name is.
pub fn decode_name(message: &[u8], offset: &mut usize) -> Result<String, Error> {
    let mut reader = Reader::new(message, *offset);
    let name = reader.name()?;
    *offset = reader.offset;
    Ok(name)
}

/// Builds one query message: header, a single question, and an EDNS0 OPT
/// record advertising a 512-byte payload.
pub fn encode_query(name: &str, request_id: u16, record_type: RecordType) -> Result<Vec<u8>, Error> {
    let mut req = Vec::with_capacity(HEADER_LEN + name.len() + 16);

    put_u16(&mut req, request_id);
    put_u16(&mut req, 0x0100); // recursion desired
    put_u16(&mut req, 1); // QDCOUNT
    put_u16(&mut req, 0); // ANCOUNT
    put_u16(&mut req, 0); // NSCOUNT
    put_u16(&mut req, 1); // ARCOUNT

    // Question
    encode_name(&mut req, name)?;
    put_u16(&mut req, record_type as u16);
    put_u16(&mut req, CLASS_IN);

    // Additional OPT record (EDNS0)
    encode_name(&mut req, "")?;
    put_u16(&mut req, TYPE_OPT);
    put_u16(&mut req, EDNS_PAYLOAD_SIZE);
    put_u32(&mut req, 0);
    put_u16(&mut req, 0);

    Ok(req)
}

/// Decodes the first answer record of a reply into a socket address.
///
/// Walks past the question section, then reads the answer's owner name,
/// type, class, TTL, and data length. A 4-byte A or 16-byte AAAA payload
/// yields an address carrying `port`; any other type/length combination is
/// logged and discarded. A reply with no answers yields `None`.
pub fn decode_answer(message: &[u8], port: u16) -> Result<Option<SocketAddr>, Error> {
    let mut header = Reader::new(message, 6);
    let answers = header.u16()?;
    if answers == 0 {
        return Ok(None);
    }

    let mut reader = Reader::new(message, HEADER_LEN);

    // Question section: name, type, class.
    reader.name()?;
    reader.u16()?;
    reader.u16()?;

    // Answer record.
    reader.name()?;
    let record_type = reader.u16()?;
    reader.u16()?; // class
    reader.u32()?; // TTL
    let data_length = reader.u16()? as usize;
    let data = reader.bytes(data_length)?;

    match (record_type, data_length) {
        (t, 4) if t == RecordType::A as u16 => {
            let octets: [u8; 4] = data.try_into().expect("length checked");
            Ok(Some(SocketAddr::new(
                IpAddr::V4(Ipv4Addr::from(octets)),
                port,
            )))
        }
        (t, 16) if t == RecordType::Aaaa as u16 => {
            let octets: [u8; 16] = data.try_into().expect("length checked");
            Ok(Some(SocketAddr::new(
                IpAddr::V6(Ipv6Addr::from(octets)),
                port,
            )))
        }
        (record_type, data_length) => {
            warn!(record_type, data_length, "discarding unknown dns record");
            Ok(None)
        }
    }
}

/// Dual-stack stub resolver bound to one upstream server.
///
/// The server address is explicit configuration; there is no process-wide
/// default.
pub struct Resolver {
    server: SocketAddr,
    timeout: Option<Duration>,
}

impl Resolver {
    /// Creates a resolver querying `server` with no reply deadline.
    pub fn new(server: SocketAddr) -> Self {
        Self {
            server,
            timeout: None,
        }
    }

    /// Bounds the whole resolve exchange by `duration`.
    pub fn with_timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Resolves `name`, returning its A and AAAA addresses carrying `port`.
    ///
    /// Sends both queries before listening, then receives datagrams until
    /// exactly two replies whose source matches the configured server have
    /// arrived. Datagrams from other sources are dropped silently; malformed
    /// replies from the server are logged and still counted as that record
    /// type's reply.
    pub async fn resolve(&self, name: &str, port: u16) -> Result<Vec<SocketAddr>, Error> {
        match self.timeout {
            Some(duration) => timeout(duration, self.resolve_inner(name, port)).await?,
            None => self.resolve_inner(name, port).await,
        }
    }

    async fn resolve_inner(&self, name: &str, port: u16) -> Result<Vec<SocketAddr>, Error> {
        let socket = UdpSocket::for_peer(&self.server)?;

        let query_a = encode_query(name, QUERY_ID_A, RecordType::A)?;
        let query_aaaa = encode_query(name, QUERY_ID_AAAA, RecordType::Aaaa)?;

        socket.send_to(self.server, &query_a).await?;
        socket.send_to(self.server, &query_aaaa).await?;

        let mut addresses = Vec::new();
        let mut replies = 0;
        let mut buffer = [0u8; MAX_DATAGRAM];

        while replies < 2 {
            let (length, source) = socket.recv_from(&mut buffer).await?;

            if source != self.server {
                trace!(%source, "dropping datagram from unexpected source");
                continue;
            }

            match decode_answer(&buffer[..length], port) {
                Ok(Some(address)) => addresses.push(address),
                Ok(None) => {}
                Err(error) => warn!(%error, "malformed dns reply"),
            }
            replies += 1;
        }

        Ok(addresses)
    }
}
