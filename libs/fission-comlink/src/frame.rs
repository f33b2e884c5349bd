//! Datagram frame layer
//!
//! Every datagram exchanged between SCADA nodes carries exactly one frame:
//! a fixed binary header (magic, protocol tag, flags, sequence number,
//! millisecond timestamp), the protocol payload, and an optional truncated
//! HMAC trailer when an authentication key is configured.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::auth::{FrameAuthenticator, MAC_LEN};
use crate::error::{ComLinkError, Result};

/// Frame magic, first two bytes of every datagram
pub const FRAME_MAGIC: u16 = 0xF5CA;

/// Header bytes before the payload: magic(2) + protocol(1) + flags(1) + seq(4) + timestamp(8) + len(2)
pub const HEADER_LEN: usize = 18;

/// Maximum payload carried in one frame
pub const MAX_PAYLOAD: usize = 16 * 1024;

/// Frames older (or newer) than this relative to the local monotonic clock
/// are rejected when authentication is enabled.
pub const MAX_CLOCK_SKEW_MS: u64 = 5_000;

/// Sequence replay window: a frame is accepted iff `seq + REPLAY_WINDOW`
/// is ahead of the last accepted sequence number.
pub const REPLAY_WINDOW: u32 = 16;

const FLAG_AUTHENTICATED: u8 = 0x01;

/// The four wire protocol families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProtocolId {
    /// MODBUS-over-datagram (RTU gateway device traffic)
    Modbus = 0,
    /// Reactor PLC link, status and commands
    Rplc = 1,
    /// Session management: establish, keepalive, close, diagnostics
    ScadaMgmt = 2,
    /// Coordinator/pocket operator data and API
    CoordData = 3,
}

impl ProtocolId {
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(ProtocolId::Modbus),
            1 => Ok(ProtocolId::Rplc),
            2 => Ok(ProtocolId::ScadaMgmt),
            3 => Ok(ProtocolId::CoordData),
            other => Err(ComLinkError::UnknownProtocol(other)),
        }
    }
}

impl std::fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolId::Modbus => write!(f, "MODBUS"),
            ProtocolId::Rplc => write!(f, "RPLC"),
            ProtocolId::ScadaMgmt => write!(f, "SCADA_MGMT"),
            ProtocolId::CoordData => write!(f, "COORD_DATA"),
        }
    }
}

/// A decoded frame. `src`/`dst` are the transport channels the datagram
/// travelled between; they are not part of the encoded bytes.
#[derive(Debug, Clone)]
pub struct Frame {
    pub src: u16,
    pub dst: u16,
    pub protocol: ProtocolId,
    pub seq: u32,
    pub timestamp_ms: u64,
    pub authenticated: bool,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(protocol: ProtocolId, seq: u32, timestamp_ms: u64, payload: Bytes) -> Self {
        Self {
            src: 0,
            dst: 0,
            protocol,
            seq,
            timestamp_ms,
            authenticated: false,
            payload,
        }
    }

    /// Encode to wire bytes. When `auth` is present the frame carries a
    /// truncated HMAC trailer and the authenticated flag.
    pub fn encode(&self, auth: Option<&FrameAuthenticator>) -> Result<Bytes> {
        if self.payload.len() > MAX_PAYLOAD {
            return Err(ComLinkError::protocol(format!(
                "payload too large: {} bytes (max {})",
                self.payload.len(),
                MAX_PAYLOAD
            )));
        }

        let mac_len = if auth.is_some() { MAC_LEN } else { 0 };
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len() + mac_len);

        let mut flags = 0u8;
        if auth.is_some() {
            flags |= FLAG_AUTHENTICATED;
        }

        buf.put_u16(FRAME_MAGIC);
        buf.put_u8(self.protocol as u8);
        buf.put_u8(flags);
        buf.put_u32(self.seq);
        buf.put_u64(self.timestamp_ms);
        buf.put_u16(self.payload.len() as u16);
        buf.put_slice(&self.payload);

        if let Some(auth) = auth {
            let mac = auth.compute(self.seq, self.protocol, self.timestamp_ms, &self.payload);
            buf.put_slice(&mac);
        }

        Ok(buf.freeze())
    }

    /// Decode wire bytes into a frame.
    ///
    /// When `auth` is configured, unauthenticated frames and MAC mismatches
    /// are rejected, and freshness is enforced against `now_ms`. Sequence
    /// windowing is per-session state and enforced by [`SeqWindow`].
    pub fn decode(data: &[u8], auth: Option<&FrameAuthenticator>, now_ms: u64) -> Result<Frame> {
        if data.len() < HEADER_LEN {
            return Err(ComLinkError::decode(format!(
                "frame too short: {} bytes",
                data.len()
            )));
        }

        let mut buf = data;
        let magic = buf.get_u16();
        if magic != FRAME_MAGIC {
            return Err(ComLinkError::decode(format!("bad magic: {:04X}", magic)));
        }

        let protocol = ProtocolId::from_u8(buf.get_u8())?;
        let flags = buf.get_u8();
        let seq = buf.get_u32();
        let timestamp_ms = buf.get_u64();
        let payload_len = buf.get_u16() as usize;

        let authenticated = flags & FLAG_AUTHENTICATED != 0;
        let mac_len = if authenticated { MAC_LEN } else { 0 };

        if buf.remaining() != payload_len + mac_len {
            return Err(ComLinkError::decode(format!(
                "length mismatch: declared {} payload + {} mac, {} remaining",
                payload_len,
                mac_len,
                buf.remaining()
            )));
        }

        let payload = Bytes::copy_from_slice(&buf[..payload_len]);

        if let Some(auth) = auth {
            if !authenticated {
                return Err(ComLinkError::auth("unauthenticated frame, key configured"));
            }
            let mac = &buf[payload_len..payload_len + MAC_LEN];
            if !auth.verify(seq, protocol, timestamp_ms, &payload, mac) {
                return Err(ComLinkError::auth("HMAC mismatch"));
            }
            let skew = now_ms.abs_diff(timestamp_ms);
            if skew > MAX_CLOCK_SKEW_MS {
                return Err(ComLinkError::auth(format!("stale frame: skew {} ms", skew)));
            }
        }

        Ok(Frame {
            src: 0,
            dst: 0,
            protocol,
            seq,
            timestamp_ms,
            authenticated,
            payload,
        })
    }
}

/// Per-session receive sequence tracking.
///
/// Accepts mildly out-of-order delivery (up to [`REPLAY_WINDOW`] behind the
/// newest accepted sequence number) while rejecting replays beyond it.
#[derive(Debug, Default, Clone)]
pub struct SeqWindow {
    last_rx: Option<u32>,
}

impl SeqWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and record an inbound sequence number.
    pub fn accept(&mut self, seq: u32) -> Result<()> {
        match self.last_rx {
            None => {
                self.last_rx = Some(seq);
                Ok(())
            }
            Some(last) => {
                if seq.wrapping_add(REPLAY_WINDOW) <= last && last - seq < u32::MAX / 2 {
                    Err(ComLinkError::Replay { got: seq, last })
                } else {
                    if seq > last || last - seq > u32::MAX / 2 {
                        self.last_rx = Some(seq);
                    }
                    Ok(())
                }
            }
        }
    }

    pub fn last(&self) -> Option<u32> {
        self.last_rx
    }
}

/// Monotonic transmit sequence counter.
#[derive(Debug, Default, Clone)]
pub struct SeqCounter {
    next: u32,
}

impl SeqCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> u32 {
        let seq = self.next;
        self.next = self.next.wrapping_add(1);
        seq
    }
}
