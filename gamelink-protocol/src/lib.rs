//! Wire format for the game client connector: packet shape, the length-prefixed
//! frame codec, sequence allocation, reserved message identifiers, and LZ4
//! "pickle" payload decompression. Payload-agnostic and networking-free —
//! `gamelink-client` is the crate that owns a socket.

pub mod codec;
pub mod compression;
pub mod error;
pub mod ids;
pub mod packet;
pub mod sequence;

pub use codec::{FrameCodec, MAX_FRAME_SIZE};
pub use error::ProtocolError;
pub use ids::{is_reserved, DEBUG_MSG_ID, HEARTBEAT_MSG_ID, TIMEOUT_MSG_ID};
pub use packet::{Packet, MAX_MSG_ID_LEN};
pub use sequence::SequenceCounter;
