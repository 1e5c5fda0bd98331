//! Fixed frame header
//!
//! Header is 12 bytes:
//! - Bytes 0-1: Magic "TS"
//! - Byte 2: Wire version
//! - Byte 3: Message kind
//! - Bytes 4-7: Sequence number (LE)
//! - Bytes 8-11: Payload length (LE)

use bytes::{Buf, BufMut};

use tracksim_core::{TrackError, TrackResult};

/// Fixed header size in bytes
pub const HEADER_SIZE: usize = 12;

/// Frame magic
pub const MAGIC: [u8; 2] = *b"TS";

/// Current wire protocol version
pub const WIRE_VERSION: u8 = 1;

/// Largest accepted payload
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Message kind identifiers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    /// Server → client pose broadcast
    PoseUpdate = 1,
    /// Client → server record request
    RecordPose = 2,
    /// Server → client acknowledgement
    Ack = 3,
    /// Server → client rejection
    Reject = 4,
}

impl MessageKind {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(MessageKind::PoseUpdate),
            2 => Some(MessageKind::RecordPose),
            3 => Some(MessageKind::Ack),
            4 => Some(MessageKind::Reject),
            _ => None,
        }
    }

    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// Fixed header structure
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub kind: MessageKind,
    /// Request/response correlation (zero for broadcasts)
    pub seq: u32,
    pub payload_len: u32,
}

impl FrameHeader {
    pub fn new(kind: MessageKind, seq: u32, payload_len: u32) -> Self {
        FrameHeader {
            version: WIRE_VERSION,
            kind,
            seq,
            payload_len,
        }
    }

    /// Parse header from bytes
    pub fn parse(buf: &[u8]) -> TrackResult<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(TrackError::BufferTooShort {
                expected: HEADER_SIZE,
                actual: buf.len(),
            });
        }

        let mut buf = &buf[..HEADER_SIZE];
        let mut magic = [0u8; 2];
        buf.copy_to_slice(&mut magic);
        if magic != MAGIC {
            return Err(TrackError::InvalidWireFormat(format!(
                "Bad magic {:02x}{:02x}",
                magic[0], magic[1]
            )));
        }

        let version = buf.get_u8();
        if version != WIRE_VERSION {
            return Err(TrackError::InvalidWireFormat(format!(
                "Unsupported wire version {}",
                version
            )));
        }

        let kind_byte = buf.get_u8();
        let kind =
            MessageKind::from_byte(kind_byte).ok_or(TrackError::UnknownMessageKind(kind_byte))?;
        let seq = buf.get_u32_le();
        let payload_len = buf.get_u32_le();

        if payload_len as usize > MAX_PAYLOAD_SIZE {
            return Err(TrackError::InvalidWireFormat(format!(
                "Payload too large: {} > {}",
                payload_len, MAX_PAYLOAD_SIZE
            )));
        }

        Ok(FrameHeader {
            version,
            kind,
            seq,
            payload_len,
        })
    }

    /// Serialize header into a buffer
    pub fn serialize(&self, buf: &mut impl BufMut) {
        buf.put_slice(&MAGIC);
        buf.put_u8(self.version);
        buf.put_u8(self.kind.to_byte());
        buf.put_u32_le(self.seq);
        buf.put_u32_le(self.payload_len);
    }
}
