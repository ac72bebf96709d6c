use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use gamelink_protocol::Packet;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream as WsMaybeTlsStream, WebSocketStream};

use super::{PacketSink, PacketSource, Transport};
use crate::error::ClientError;

type InnerWs = WebSocketStream<WsMaybeTlsStream<TcpStream>>;

/// Message-oriented transport: one binary WebSocket message per packet. Ping
/// frames are not echoed once split, since this protocol relies on its own
/// application-level heartbeat rather than the WebSocket control frames.
pub struct WsTransport {
    stream: InnerWs,
}

impl WsTransport {
    pub async fn connect(url: &str, connect_timeout: Duration) -> Result<Self, ClientError> {
        let (stream, _response) = timeout(connect_timeout, connect_async(url))
            .await
            .map_err(|_| ClientError::ConnectFailed("connect timed out".to_owned()))?
            .map_err(|e| ClientError::ConnectFailed(e.to_string()))?;
        Ok(Self { stream })
    }
}

impl Transport for WsTransport {
    fn split(self: Box<Self>) -> (Box<dyn PacketSink>, Box<dyn PacketSource>) {
        let (sink, stream) = self.stream.split();
        (Box::new(WsSink(sink)), Box::new(WsSource(stream)))
    }
}

struct WsSink(SplitSink<InnerWs, Message>);

#[async_trait]
impl PacketSink for WsSink {
    async fn send_packet(&mut self, packet: Packet) -> Result<(), ClientError> {
        self.0
            .send(Message::Binary(packet.encode_message()))
            .await
            .map_err(|e| ClientError::WriteFailed(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.0.close().await;
    }
}

struct WsSource(SplitStream<InnerWs>);

#[async_trait]
impl PacketSource for WsSource {
    async fn recv_packet(&mut self) -> Result<Option<Packet>, ClientError> {
        loop {
            match self.0.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(Some(Packet::decode_message(data)?)),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Ok(Message::Text(_) | Message::Frame(_))) => {
                    // not part of this protocol; ignore rather than fail the link
                }
                Some(Err(e)) => return Err(ClientError::WriteFailed(e.to_string())),
                None => return Ok(None),
            }
        }
    }
}
