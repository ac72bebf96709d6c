//! Transport abstraction. Concrete variants re-frame the wire format
//! differently (stream re-frames with [`gamelink_protocol::FrameCodec`];
//! message-oriented transports already get one frame per message) but both
//! expose the same split sink/source surface to the rest of the client.
//!
//! Splitting into independent halves up front (rather than one object with
//! `&mut self` send and receive methods) is what lets the reader and writer
//! halves live on separate tasks without fighting the borrow checker over a
//! single `&mut transport` — the same shape `tokio::io::split`/
//! `futures_util::StreamExt::split` give built-in transports.

mod tcp;
mod tls_stream;
mod ws;

pub use tcp::TcpTransport;
pub use ws::WsTransport;

use async_trait::async_trait;
use gamelink_protocol::Packet;

use crate::error::ClientError;

#[async_trait]
pub trait PacketSink: Send {
    async fn send_packet(&mut self, packet: Packet) -> Result<(), ClientError>;
    async fn close(&mut self);
}

#[async_trait]
pub trait PacketSource: Send {
    /// `Ok(None)` means the peer closed the connection cleanly.
    async fn recv_packet(&mut self) -> Result<Option<Packet>, ClientError>;
}

/// A connected transport, ready to be split into independent halves.
pub trait Transport: Send {
    fn split(self: Box<Self>) -> (Box<dyn PacketSink>, Box<dyn PacketSource>);
}
