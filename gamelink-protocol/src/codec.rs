use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::packet::Packet;

/// Safety cap on a single frame's content size. A size outside
/// `1..=MAX_FRAME_SIZE` is a protocol violation, not a recoverable condition.
pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
enum DecodeState {
    /// Waiting for the 4-byte content-size prefix.
    Header,
    /// Prefix parsed; waiting for `usize` more bytes of content.
    Body(usize),
}

/// Length-prefixed frame codec for the byte-stream transport variant.
///
/// Implements both [`Decoder`] (parsing inbound server frames, which carry
/// the extra `error_code`/`original_size` fields) and [`Encoder`] (writing
/// outbound client frames, which don't). Drive it with
/// `tokio_util::codec::Framed` over any `AsyncRead + AsyncWrite` transport.
pub struct FrameCodec {
    state: DecodeState,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            state: DecodeState::Header,
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Packet;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, ProtocolError> {
        loop {
            match self.state {
                DecodeState::Header => {
                    if src.len() < 4 {
                        return Ok(None);
                    }
                    let size = i32::from_le_bytes(src[0..4].try_into().unwrap());
                    if size <= 0 || size as usize > MAX_FRAME_SIZE {
                        return Err(ProtocolError::FrameSizeOutOfBounds { size: size as i64 });
                    }
                    src.advance(4);
                    self.state = DecodeState::Body(size as usize);
                }
                DecodeState::Body(size) => {
                    if src.len() < size {
                        src.reserve(size - src.len());
                        return Ok(None);
                    }
                    let content = src.split_to(size).freeze();
                    self.state = DecodeState::Header;
                    return Ok(Some(Packet::decode_inbound_content(content)?));
                }
            }
        }
    }
}

impl Encoder<Packet> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let content = item.encode_outbound_content();
        if content.is_empty() || content.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameSizeOutOfBounds {
                size: content.len() as i64,
            });
        }
        dst.reserve(4 + content.len());
        dst.put_i32_le(content.len() as i32);
        dst.put_slice(&content);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn roundtrip_packet() -> Packet {
        Packet::new("EchoRequest", 7, 42, Bytes::from_static(b"hello")).unwrap()
    }

    #[test]
    fn encode_then_decode_stream_frame() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(roundtrip_packet(), &mut buf).unwrap();

        // Simulate an inbound frame with the extra server-side header fields
        // by building the inbound wire shape directly, since encode() only
        // produces the outbound (client) shape.
        let mut inbound = BytesMut::new();
        let content = {
            let mut c = BytesMut::new();
            c.put_u8(11); // "EchoRequest".len()
            c.put_slice(b"EchoRequest");
            c.put_u16_le(7);
            c.put_i64_le(42);
            c.put_u16_le(0); // error_code
            c.put_i32_le(0); // original_size
            c.put_slice(b"hello");
            c
        };
        inbound.put_i32_le(content.len() as i32);
        inbound.extend_from_slice(&content);

        let mut decode_codec = FrameCodec::new();
        let decoded = decode_codec.decode(&mut inbound).unwrap().unwrap();
        assert_eq!(decoded.msg_id, "EchoRequest");
        assert_eq!(decoded.msg_seq, 7);
        assert_eq!(decoded.stage_id, 42);
        assert_eq!(decoded.error_code, 0);
        assert_eq!(&decoded.payload[..], b"hello");
    }

    #[test]
    fn decode_waits_for_more_bytes() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        buf.put_i32_le(20);
        buf.put_slice(b"short");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn rejects_frame_size_out_of_bounds() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        buf.put_i32_le(-1);
        assert!(codec.decode(&mut buf).is_err());

        let mut codec2 = FrameCodec::new();
        let mut buf2 = BytesMut::new();
        buf2.put_i32_le((MAX_FRAME_SIZE as i32) + 1);
        assert!(codec2.decode(&mut buf2).is_err());
    }

    #[test]
    fn decode_two_frames_in_one_buffer() {
        let mut content_a = BytesMut::new();
        content_a.put_u8(1);
        content_a.put_slice(b"A");
        content_a.put_u16_le(0);
        content_a.put_i64_le(0);
        content_a.put_u16_le(0);
        content_a.put_i32_le(0);

        let mut buf = BytesMut::new();
        buf.put_i32_le(content_a.len() as i32);
        buf.extend_from_slice(&content_a);
        buf.put_i32_le(content_a.len() as i32);
        buf.extend_from_slice(&content_a);

        let mut codec = FrameCodec::new();
        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.msg_id, "A");
        assert_eq!(second.msg_id, "A");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }
}
