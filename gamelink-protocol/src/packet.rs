use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::compression::decompress_pickle;
use crate::error::ProtocolError;
use crate::ids::HEARTBEAT_MSG_ID;

/// Longest `msg_id` the wire format can carry (length prefix is a single byte).
pub const MAX_MSG_ID_LEN: usize = 255;

/// One application-level message, independent of which transport variant
/// carries it. Immutable once constructed: all fields are set at
/// construction time and never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub msg_id: String,
    /// `0` means push / fire-and-forget; non-zero correlates request and response.
    pub msg_seq: u16,
    pub stage_id: i64,
    /// Only meaningful on inbound packets; always `0` on packets this crate builds for sending.
    pub error_code: u16,
    pub payload: Bytes,
}

impl Packet {
    /// Build a packet, rejecting a `msg_id` that doesn't fit the one-byte length prefix.
    pub fn new(
        msg_id: impl Into<String>,
        msg_seq: u16,
        stage_id: i64,
        payload: impl Into<Bytes>,
    ) -> Result<Self, ProtocolError> {
        let msg_id = msg_id.into();
        if msg_id.len() > MAX_MSG_ID_LEN {
            return Err(ProtocolError::MsgIdTooLong(msg_id.len()));
        }
        Ok(Self {
            msg_id,
            msg_seq,
            stage_id,
            error_code: 0,
            payload: payload.into(),
        })
    }

    /// A fire-and-forget packet (`msg_seq = 0`).
    pub fn push(
        msg_id: impl Into<String>,
        stage_id: i64,
        payload: impl Into<Bytes>,
    ) -> Result<Self, ProtocolError> {
        Self::new(msg_id, 0, stage_id, payload)
    }

    pub fn heartbeat() -> Self {
        Self {
            msg_id: HEARTBEAT_MSG_ID.to_string(),
            msg_seq: 0,
            stage_id: 0,
            error_code: 0,
            payload: Bytes::new(),
        }
    }

    pub fn is_heartbeat(&self) -> bool {
        self.msg_id == HEARTBEAT_MSG_ID
    }

    pub fn is_push(&self) -> bool {
        self.msg_seq == 0
    }

    /// Encode the client -> server content: no length prefix, no
    /// `error_code`/`original_size` fields, payload never compressed.
    pub fn encode_outbound_content(&self) -> Bytes {
        let msg_id_bytes = self.msg_id.as_bytes();
        let mut buf =
            BytesMut::with_capacity(1 + msg_id_bytes.len() + 2 + 8 + self.payload.len());
        buf.put_u8(msg_id_bytes.len() as u8);
        buf.put_slice(msg_id_bytes);
        buf.put_u16_le(self.msg_seq);
        buf.put_i64_le(self.stage_id);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Parse the server -> client content (one frame's worth of bytes, no
    /// length prefix), decompressing the payload if `original_size > 0`.
    pub fn decode_inbound_content(mut content: Bytes) -> Result<Self, ProtocolError> {
        if content.is_empty() {
            return Err(ProtocolError::TruncatedHeader);
        }
        let msg_id_len = content[0] as usize;
        content.advance(1);
        if content.len() < msg_id_len + 2 + 8 + 2 + 4 {
            return Err(ProtocolError::TruncatedHeader);
        }
        let msg_id_bytes = content.split_to(msg_id_len);
        let msg_id = std::str::from_utf8(&msg_id_bytes)?.to_string();
        let msg_seq = content.get_u16_le();
        let stage_id = content.get_i64_le();
        let error_code = content.get_u16_le();
        let original_size = content.get_i32_le();
        let payload = if original_size > 0 {
            decompress_pickle(&content, original_size as usize)?
        } else {
            content
        };
        Ok(Self {
            msg_id,
            msg_seq,
            stage_id,
            error_code,
            payload,
        })
    }

    /// Encode for a message-oriented transport: identical content to the
    /// stream variant, just without the 4-byte length prefix (the transport
    /// itself delimits the message).
    pub fn encode_message(&self) -> Bytes {
        self.encode_outbound_content()
    }

    /// Decode one whole inbound WebSocket message as a single packet.
    pub fn decode_message(content: Bytes) -> Result<Self, ProtocolError> {
        Self::decode_inbound_content(content)
    }
}
