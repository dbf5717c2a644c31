//! Wire frame header (`spec.md` §4.H, §6): `magic | length | serviceId |
//! objectId | actionId | messageId | messageType | payloadType | payload`.
//! Little-endian throughout.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{codes, CoreError};

/// Identifies the wire format version. Frames whose magic does not match
/// are a protocol violation (`spec.md` §7: "protocol ... closes the
/// offending socket").
pub const MAGIC: u32 = 0x4D45_5631; // "MEV1"

pub const HEADER_LEN: usize = 4 + 4 + 4 + 4 + 4 + 4 + 1 + 1;

/// `spec.md` §3/§4.H: `messageType ∈ {Call, Reply, Error, Post, Event,
/// Capability, Cancel}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageType {
    Call,
    Reply,
    Error,
    Post,
    Event,
    Capability,
    Cancel,
}

impl MessageType {
    fn to_wire(self) -> u8 {
        match self {
            MessageType::Call => 0,
            MessageType::Reply => 1,
            MessageType::Error => 2,
            MessageType::Post => 3,
            MessageType::Event => 4,
            MessageType::Capability => 5,
            MessageType::Cancel => 6,
        }
    }

    fn from_wire(value: u8) -> Result<Self, CoreError> {
        Ok(match value {
            0 => MessageType::Call,
            1 => MessageType::Reply,
            2 => MessageType::Error,
            3 => MessageType::Post,
            4 => MessageType::Event,
            5 => MessageType::Capability,
            6 => MessageType::Cancel,
            other => return Err(CoreError::new(codes::PROTOCOL_ERROR, format!("unknown message type {other}"))),
        })
    }
}

/// One framed message. `payload` is the descriptor-driven encoding produced
/// by `transport::codec`.
#[derive(Clone, Debug)]
pub struct Frame {
    pub service_id: u32,
    pub object_id: u32,
    pub action_id: u32,
    /// Monotonic per-socket id used to correlate a `Reply`/`Error` with the
    /// `Call` that produced it (`spec.md` §4.H).
    pub message_id: u32,
    pub message_type: MessageType,
    /// Wire tag for the payload's `Kind`, letting the dispatcher decode
    /// without first consulting the meta-table (e.g. to recognize `Error`
    /// payloads, which are always `String`).
    pub payload_type: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn encode(&self, out: &mut BytesMut) {
        out.put_u32_le(MAGIC);
        out.put_u32_le(self.payload.len() as u32);
        out.put_u32_le(self.service_id);
        out.put_u32_le(self.object_id);
        out.put_u32_le(self.action_id);
        out.put_u32_le(self.message_id);
        out.put_u8(self.message_type.to_wire());
        out.put_u8(self.payload_type);
        out.put_slice(&self.payload);
    }

    /// Decodes one frame from the front of `buf`, advancing it past the
    /// consumed bytes. Returns `Ok(None)` when `buf` does not yet hold a
    /// complete frame (the caller should read more and retry).
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Frame>, CoreError> {
        if buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let mut header = &buf[..HEADER_LEN];
        let magic = header.get_u32_le();
        if magic != MAGIC {
            return Err(CoreError::new(codes::PROTOCOL_ERROR, format!("bad magic {magic:#x}")));
        }
        let length = header.get_u32_le() as usize;
        let service_id = header.get_u32_le();
        let object_id = header.get_u32_le();
        let action_id = header.get_u32_le();
        let message_id = header.get_u32_le();
        let message_type = MessageType::from_wire(header.get_u8())?;
        let payload_type = header.get_u8();

        if buf.len() < HEADER_LEN + length {
            return Ok(None);
        }
        buf.advance(HEADER_LEN);
        let payload = buf.split_to(length).to_vec();

        Ok(Some(Frame {
            service_id,
            object_id,
            action_id,
            message_id,
            message_type,
            payload_type,
            payload,
        }))
    }
}
