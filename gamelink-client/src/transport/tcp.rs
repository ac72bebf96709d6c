use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use gamelink_protocol::{FrameCodec, Packet};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;

use super::tls_stream::{build_tls_connector, MaybeTlsStream};
use super::{PacketSink, PacketSource, Transport};
use crate::error::ClientError;

type InnerFramed = Framed<MaybeTlsStream, FrameCodec>;

/// Byte-stream transport: plain TCP, or TCP wrapped in TLS via `tokio-rustls`.
pub struct TcpTransport {
    framed: InnerFramed,
}

impl TcpTransport {
    pub async fn connect(
        host: &str,
        port: u16,
        use_tls: bool,
        connect_timeout: Duration,
    ) -> Result<Self, ClientError> {
        let tcp_stream = timeout(connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| ClientError::ConnectFailed("connect timed out".to_owned()))?
            .map_err(|e| ClientError::ConnectFailed(e.to_string()))?;
        let _ = tcp_stream.set_nodelay(true);

        let stream = if use_tls {
            let connector = build_tls_connector();
            let server_name = rustls::pki_types::ServerName::try_from(host.to_owned())
                .map_err(|e| ClientError::ConnectFailed(e.to_string()))?;
            let tls_stream = timeout(connect_timeout, connector.connect(server_name, tcp_stream))
                .await
                .map_err(|_| ClientError::ConnectFailed("tls handshake timed out".to_owned()))?
                .map_err(|e| ClientError::ConnectFailed(e.to_string()))?;
            MaybeTlsStream::Tls(Box::new(tls_stream))
        } else {
            MaybeTlsStream::Plain(tcp_stream)
        };

        Ok(Self {
            framed: Framed::new(stream, FrameCodec::new()),
        })
    }
}

impl Transport for TcpTransport {
    fn split(self: Box<Self>) -> (Box<dyn PacketSink>, Box<dyn PacketSource>) {
        let (sink, stream) = self.framed.split();
        (Box::new(TcpSink(sink)), Box::new(TcpSource(stream)))
    }
}

struct TcpSink(SplitSink<InnerFramed, Packet>);

#[async_trait]
impl PacketSink for TcpSink {
    async fn send_packet(&mut self, packet: Packet) -> Result<(), ClientError> {
        self.0
            .send(packet)
            .await
            .map_err(|e| ClientError::WriteFailed(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.0.close().await;
    }
}

struct TcpSource(SplitStream<InnerFramed>);

#[async_trait]
impl PacketSource for TcpSource {
    async fn recv_packet(&mut self) -> Result<Option<Packet>, ClientError> {
        match self.0.next().await {
            Some(Ok(packet)) => Ok(Some(packet)),
            Some(Err(e)) => Err(ClientError::Protocol(e)),
            None => Ok(None),
        }
    }
}
