//! Messages carried on the subscribe and command channels
//!
//! Pose payload layout (LE):
//! - Key: u16 length + UTF-8 bytes
//! - Time: f64 seconds since the Unix epoch
//! - Transform: u8 flag, then 16 x f64 row-major when the flag is 1
//! - Relative-to: u8 flag, then u16 length + UTF-8 bytes when the flag is 1

use bytes::{Buf, BufMut, Bytes, BytesMut};

use tracksim_core::{
    from_row_major, to_row_major, EntityKey, Timestamp, TimestampedPose, TrackError, TrackResult,
};

use crate::{FrameHeader, MessageKind, HEADER_SIZE, MAX_PAYLOAD_SIZE};

/// A decoded wire message
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    /// Latest pose for one entity, pushed by the server
    PoseUpdate { key: EntityKey, pose: TimestampedPose },
    /// Request that the server record a new pose
    RecordPose {
        seq: u32,
        key: EntityKey,
        pose: TimestampedPose,
    },
    /// Request `seq` was recorded
    Ack { seq: u32 },
    /// Request `seq` was refused
    Reject { seq: u32, reason: String },
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::PoseUpdate { .. } => MessageKind::PoseUpdate,
            Message::RecordPose { .. } => MessageKind::RecordPose,
            Message::Ack { .. } => MessageKind::Ack,
            Message::Reject { .. } => MessageKind::Reject,
        }
    }

    pub fn seq(&self) -> u32 {
        match self {
            Message::PoseUpdate { .. } => 0,
            Message::RecordPose { seq, .. } | Message::Ack { seq } | Message::Reject { seq, .. } => {
                *seq
            }
        }
    }

    /// Serialize into a complete frame (header + payload)
    pub fn encode(&self) -> TrackResult<Bytes> {
        let mut payload = BytesMut::new();
        match self {
            Message::PoseUpdate { key, pose } | Message::RecordPose { key, pose, .. } => {
                put_pose(&mut payload, key, pose)?;
            }
            Message::Ack { .. } => {}
            Message::Reject { reason, .. } => put_str(&mut payload, reason)?,
        }

        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(TrackError::InvalidWireFormat(format!(
                "Payload too large: {} > {}",
                payload.len(),
                MAX_PAYLOAD_SIZE
            )));
        }

        let header = FrameHeader::new(self.kind(), self.seq(), payload.len() as u32);
        let mut frame = BytesMut::with_capacity(HEADER_SIZE + payload.len());
        header.serialize(&mut frame);
        frame.extend_from_slice(&payload);
        Ok(frame.freeze())
    }

    /// Decode a payload whose header has already been parsed
    pub fn decode(header: &FrameHeader, payload: &[u8]) -> TrackResult<Self> {
        if payload.len() != header.payload_len as usize {
            return Err(TrackError::BufferTooShort {
                expected: header.payload_len as usize,
                actual: payload.len(),
            });
        }

        let mut buf = payload;
        let message = match header.kind {
            MessageKind::PoseUpdate => {
                let (key, pose) = get_pose(&mut buf)?;
                Message::PoseUpdate { key, pose }
            }
            MessageKind::RecordPose => {
                let (key, pose) = get_pose(&mut buf)?;
                Message::RecordPose {
                    seq: header.seq,
                    key,
                    pose,
                }
            }
            MessageKind::Ack => Message::Ack { seq: header.seq },
            MessageKind::Reject => Message::Reject {
                seq: header.seq,
                reason: get_str(&mut buf)?,
            },
        };

        if buf.has_remaining() {
            return Err(TrackError::InvalidWireFormat(format!(
                "{} trailing bytes after {:?}",
                buf.remaining(),
                header.kind
            )));
        }

        Ok(message)
    }

    /// Parse a complete frame
    pub fn parse(frame: &[u8]) -> TrackResult<Self> {
        let header = FrameHeader::parse(frame)?;
        let end = HEADER_SIZE + header.payload_len as usize;
        if frame.len() < end {
            return Err(TrackError::BufferTooShort {
                expected: end,
                actual: frame.len(),
            });
        }
        Self::decode(&header, &frame[HEADER_SIZE..end])
    }
}

fn ensure(buf: &[u8], needed: usize) -> TrackResult<()> {
    if buf.remaining() < needed {
        return Err(TrackError::BufferTooShort {
            expected: needed,
            actual: buf.remaining(),
        });
    }
    Ok(())
}

fn put_str(buf: &mut BytesMut, s: &str) -> TrackResult<()> {
    let len = u16::try_from(s.len())
        .map_err(|_| TrackError::InvalidWireFormat(format!("String too long: {}", s.len())))?;
    buf.put_u16_le(len);
    buf.put_slice(s.as_bytes());
    Ok(())
}

fn get_str(buf: &mut &[u8]) -> TrackResult<String> {
    ensure(buf, 2)?;
    let len = buf.get_u16_le() as usize;
    ensure(buf, len)?;
    let s = std::str::from_utf8(&buf[..len])
        .map_err(|e| TrackError::InvalidWireFormat(format!("Invalid UTF-8: {}", e)))?
        .to_string();
    buf.advance(len);
    Ok(s)
}

fn put_pose(buf: &mut BytesMut, key: &EntityKey, pose: &TimestampedPose) -> TrackResult<()> {
    put_str(buf, key.as_str())?;
    buf.put_f64_le(pose.time.as_secs_f64());

    match &pose.transform {
        Some(m) => {
            buf.put_u8(1);
            for v in to_row_major(m) {
                buf.put_f64_le(v);
            }
        }
        None => buf.put_u8(0),
    }

    match &pose.relative_to {
        Some(other) => {
            buf.put_u8(1);
            put_str(buf, other.as_str())?;
        }
        None => buf.put_u8(0),
    }
    Ok(())
}

fn get_flag(buf: &mut &[u8]) -> TrackResult<bool> {
    ensure(buf, 1)?;
    match buf.get_u8() {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(TrackError::InvalidWireFormat(format!(
            "Invalid presence flag {}",
            other
        ))),
    }
}

fn get_pose(buf: &mut &[u8]) -> TrackResult<(EntityKey, TimestampedPose)> {
    let key = EntityKey::new(get_str(buf)?);

    ensure(buf, 8)?;
    let time = Timestamp::from_secs_f64(buf.get_f64_le());

    let transform = if get_flag(buf)? {
        ensure(buf, 16 * 8)?;
        let mut values = [0.0; 16];
        for v in values.iter_mut() {
            *v = buf.get_f64_le();
        }
        Some(from_row_major(&values))
    } else {
        None
    };

    let relative_to = if get_flag(buf)? {
        Some(EntityKey::new(get_str(buf)?))
    } else {
        None
    };

    Ok((
        key,
        TimestampedPose {
            time,
            transform,
            relative_to,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tracksim_core::Matrix4;

    fn sample_pose() -> TimestampedPose {
        let mut m = Matrix4::identity();
        m[(0, 3)] = 12.5;
        m[(2, 1)] = -0.25;
        TimestampedPose::new(Timestamp::from_secs_f64(1_700_000_000.25), Some(m))
    }

    #[test]
    fn test_pose_update_roundtrip() {
        let msg = Message::PoseUpdate {
            key: EntityKey::new("coil"),
            pose: sample_pose().with_relative_to("subject"),
        };
        let bytes = msg.encode().unwrap();
        assert_eq!(Message::parse(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_absent_transform_roundtrip() {
        let msg = Message::RecordPose {
            seq: 9,
            key: EntityKey::new("pointer"),
            pose: TimestampedPose::new(Timestamp::from_secs_f64(3.0), None),
        };
        let bytes = msg.encode().unwrap();
        // header + key(2+7) + time + flag + flag
        assert_eq!(bytes.len(), HEADER_SIZE + 9 + 8 + 1 + 1);
        assert_eq!(Message::parse(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_reject_carries_reason() {
        let msg = Message::Reject {
            seq: 4,
            reason: "unknown tracker".into(),
        };
        let parsed = Message::parse(&msg.encode().unwrap()).unwrap();
        assert_eq!(parsed.seq(), 4);
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_truncated_payload() {
        let bytes = Message::PoseUpdate {
            key: EntityKey::new("coil"),
            pose: sample_pose(),
        }
        .encode()
        .unwrap();
        let truncated = &bytes[..bytes.len() - 5];
        assert!(matches!(
            Message::parse(truncated),
            Err(TrackError::BufferTooShort { .. })
        ));
    }

    #[test]
    fn test_invalid_flag() {
        let mut bytes = Message::PoseUpdate {
            key: EntityKey::new("k"),
            pose: TimestampedPose::new(Timestamp::EPOCH, None),
        }
        .encode()
        .unwrap()
        .to_vec();
        // transform flag follows key (2 + 1) and time (8)
        bytes[HEADER_SIZE + 3 + 8] = 7;
        assert!(matches!(
            Message::parse(&bytes),
            Err(TrackError::InvalidWireFormat(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_parse_never_panics(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = Message::parse(&data);
        }
    }
}
