//! Minimal SNTP client for measuring the local clock's offset.
//!
//! One 48-byte request, one 48-byte reply, and the standard four-timestamp
//! offset computation. Timestamps cross the crate boundary as microseconds
//! since the Unix epoch; the NTP-era conversion happens at the wire.

use crate::error::Error;
use crate::net::udp::UdpSocket;
use crate::time::timeout;

use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, trace};

const PACKET_LEN: usize = 48;

// Seconds between the NTP era (1900) and the Unix epoch (1970).
const NTP_UNIX_OFFSET_SECS: u64 = 2_208_988_800;

const MICROS_PER_SEC: u64 = 1_000_000;

fn from_ntp_timestamp(timestamp: u64) -> u64 {
    let seconds = (timestamp >> 32).saturating_sub(NTP_UNIX_OFFSET_SECS);
    let fraction = timestamp & 0xFFFF_FFFF;
    seconds * MICROS_PER_SEC + ((fraction * MICROS_PER_SEC) >> 32)
}

/// Builds a client request carrying `transmit` (Unix microseconds) in the
/// transmit-timestamp field.
///
/// The first byte encodes leap indicator 0, version 4, client mode. The
/// transmit value is written raw, not in NTP fixed-point form: the server
/// echoes the field verbatim as the origin timestamp, so the reply check in
/// [`decode_reply`] is an exact byte comparison with no conversion loss.
pub fn encode_request(transmit: u64) -> [u8; PACKET_LEN] {
    let mut packet = [0u8; PACKET_LEN];
    packet[0] = 0x23;
    packet[40..48].copy_from_slice(&transmit.to_be_bytes());
    packet
}

fn read_timestamp(message: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&message[offset..offset + 8]);
    u64::from_be_bytes(bytes)
}

/// Extracts the clock offset in microseconds from a server reply.
///
/// `send_time` and `recv_time` are the client's transmit and receive
/// timestamps, in Unix microseconds. Returns 0 when the reply is shorter
/// than 48 bytes or its origin field does not echo `send_time`: a zero
/// offset leaves the caller's clock untouched.
pub fn decode_reply(message: &[u8], send_time: u64, recv_time: u64) -> i64 {
    if message.len() < PACKET_LEN {
        trace!(length = message.len(), "short sntp reply");
        return 0;
    }

    let origin = read_timestamp(message, 24);
    if origin != send_time {
        trace!(origin, send_time, "sntp origin mismatch");
        return 0;
    }

    let receive = from_ntp_timestamp(read_timestamp(message, 32));
    let transmit = from_ntp_timestamp(read_timestamp(message, 40));

    // offset = ((T2 - T1) + (T3 - T4)) / 2
    let server_sum = receive as i128 + transmit as i128;
    let client_sum = send_time as i128 + recv_time as i128;
    ((server_sum - client_sum) / 2) as i64
}

/// One-shot SNTP client bound to a single server.
pub struct SntpClient {
    server: SocketAddr,
    timeout: Option<Duration>,
}

impl SntpClient {
    /// Creates a client querying `server` with no reply deadline.
    pub fn new(server: SocketAddr) -> Self {
        Self {
            server,
            timeout: None,
        }
    }

    /// Bounds the request/reply exchange by `duration`.
    pub fn with_timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Measures the offset of the local clock against the server, in
    /// microseconds. Positive means the local clock is behind.
    ///
    /// Returns 0 when the server's reply fails validation.
    pub async fn clock_offset(&self) -> Result<i64, Error> {
        match self.timeout {
            Some(duration) => timeout(duration, self.clock_offset_inner()).await?,
            None => self.clock_offset_inner().await,
        }
    }

    async fn clock_offset_inner(&self) -> Result<i64, Error> {
        let socket = UdpSocket::for_peer(&self.server)?;

        let send_time = unix_micros()?;
        let request = encode_request(send_time);
        socket.send_to(self.server, &request).await?;

        let mut reply = [0u8; PACKET_LEN];
        let length = loop {
            let (length, source) = socket.recv_from(&mut reply).await?;
            if source == self.server {
                break length;
            }
            trace!(%source, "dropping datagram from unexpected source");
        };
        let recv_time = unix_micros()?;

        let offset = decode_reply(&reply[..length], send_time, recv_time);
        debug!(offset, server = %self.server, "sntp exchange complete");
        Ok(offset)
    }
}

fn unix_micros() -> Result<u64, Error> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| Error::Malformed {
            reason: "system clock before unix epoch",
        })?;
    Ok(elapsed.as_micros() as u64)
}
