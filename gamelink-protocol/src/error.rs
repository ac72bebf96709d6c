use thiserror::Error;

use crate::codec::MAX_FRAME_SIZE;

/// Everything that can go wrong while encoding or decoding a frame.
///
/// Every variant here is treated as fatal by the client: there is no
/// resynchronization strategy for a corrupt stream, the connection is torn
/// down and reopened.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("msg_id is {0} bytes, exceeds the 255 byte limit")]
    MsgIdTooLong(usize),

    #[error("frame size {size} out of bounds (must be in 1..={MAX_FRAME_SIZE})")]
    FrameSizeOutOfBounds { size: i64 },

    #[error("packet header truncated")]
    TruncatedHeader,

    #[error("msg_id is not valid utf-8: {0}")]
    InvalidMsgId(#[from] std::str::Utf8Error),

    #[error("lz4 decompression failed: {0}")]
    Decompression(String),

    #[error("decompressed payload size mismatch: header said {expected}, got {actual}")]
    DecompressedSizeMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
