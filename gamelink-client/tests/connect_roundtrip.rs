//! End-to-end harness: a raw `TcpListener` plays the server side of the wire
//! protocol, so these tests exercise the real `Client` against real sockets
//! rather than mocked transport traits.
//!
//! The client's own `FrameCodec` only ever decodes the *inbound* (server ->
//! client) shape and only ever encodes the *outbound* (client -> server)
//! shape, so the mock server below speaks both shapes by hand rather than
//! reusing that codec for its own reads/writes.

use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use gamelink_client::{Client, ClientConfig};
use gamelink_protocol::Packet;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn bind_loopback() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// Read one client -> server frame (the outbound shape: no `error_code`, no
/// `original_size`).
async fn read_outbound_frame(stream: &mut TcpStream) -> Packet {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.unwrap();
    let len = i32::from_le_bytes(len_buf) as usize;
    let mut content = vec![0u8; len];
    stream.read_exact(&mut content).await.unwrap();
    let mut content = Bytes::from(content);

    let msg_id_len = content[0] as usize;
    content.advance(1);
    let msg_id_bytes = content.split_to(msg_id_len);
    let msg_id = std::str::from_utf8(&msg_id_bytes).unwrap().to_owned();
    let msg_seq = content.get_u16_le();
    let stage_id = content.get_i64_le();
    let payload = content;
    Packet {
        msg_id,
        msg_seq,
        stage_id,
        error_code: 0,
        payload,
    }
}

/// Write one server -> client frame (the inbound shape: carries `error_code`
/// and an uncompressed `original_size` of `0`).
async fn write_inbound_frame(stream: &mut TcpStream, packet: &Packet) {
    let msg_id_bytes = packet.msg_id.as_bytes();
    let mut content = BytesMut::new();
    content.put_u8(msg_id_bytes.len() as u8);
    content.put_slice(msg_id_bytes);
    content.put_u16_le(packet.msg_seq);
    content.put_i64_le(packet.stage_id);
    content.put_u16_le(packet.error_code);
    content.put_i32_le(0); // original_size: never compressed in these tests
    content.put_slice(&packet.payload);

    let mut frame = BytesMut::new();
    frame.put_i32_le(content.len() as i32);
    frame.extend_from_slice(&content);
    stream.write_all(&frame).await.unwrap();
}

fn test_config(request_timeout_ms: u64) -> ClientConfig {
    let mut cfg = ClientConfig::default();
    cfg.request_timeout_ms = request_timeout_ms;
    // Disable the background monitor's own heartbeat/idle teardown so it
    // doesn't race with what each test is specifically checking.
    cfg.heartbeat_interval_ms = 0;
    cfg.heartbeat_timeout_ms = 0;
    cfg.connection_idle_timeout_ms = 0;
    cfg
}

#[tokio::test]
async fn request_resolves_with_server_response() {
    let (listener, port) = bind_loopback().await;

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let request = read_outbound_frame(&mut stream).await;
        assert_eq!(request.msg_id, "Ping");
        let mut response = Packet::new(
            "Ping",
            request.msg_seq,
            request.stage_id,
            Bytes::from_static(b"pong"),
        )
        .unwrap();
        response.error_code = 0;
        write_inbound_frame(&mut stream, &response).await;
        // Keep the socket open long enough for the client to read the reply.
        tokio::time::sleep(Duration::from_millis(100)).await;
    });

    let client = Client::new(test_config(2_000)).unwrap();
    client.connect("127.0.0.1", port).await.unwrap();

    let response = client.request("Ping", 7, Bytes::new()).await.unwrap();
    assert_eq!(&response.payload[..], b"pong");
    assert_eq!(response.stage_id, 7);

    server.await.unwrap();
}

#[tokio::test]
async fn request_times_out_when_server_never_replies() {
    let (listener, port) = bind_loopback().await;

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _request = read_outbound_frame(&mut stream).await;
        // Never reply; hold the connection open until the test ends.
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let client = Client::new(test_config(100)).unwrap();
    client.connect("127.0.0.1", port).await.unwrap();

    let err = client.request("Slow", 1, Bytes::new()).await.unwrap_err();
    assert_eq!(err.code(), Some(gamelink_client::codes::REQUEST_TIMEOUT));

    server.abort();
}

#[tokio::test]
async fn unintentional_disconnect_fires_on_disconnect_with_false() {
    let (listener, port) = bind_loopback().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        drop(stream);
    });

    let client = Client::new(test_config(2_000)).unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel();
    let tx = std::sync::Mutex::new(Some(tx));
    client.on_disconnect(move |intentional, _cause| {
        if let Some(tx) = tx.lock().unwrap().take() {
            let _ = tx.send(intentional);
        }
    });

    client.connect("127.0.0.1", port).await.unwrap();
    let intentional = tokio::time::timeout(Duration::from_secs(2), rx)
        .await
        .expect("disconnect event did not fire")
        .unwrap();
    assert!(!intentional);

    server.await.unwrap();
}

#[tokio::test]
async fn intentional_disconnect_does_not_fire_event() {
    let (listener, port) = bind_loopback().await;
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        drop(stream);
    });

    let client = Client::new(test_config(2_000)).unwrap();
    let fired = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let fired2 = fired.clone();
    client.on_disconnect(move |_, _| {
        fired2.store(true, std::sync::atomic::Ordering::SeqCst);
    });

    client.connect("127.0.0.1", port).await.unwrap();
    client.disconnect().await;
    assert!(!client.is_connected());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!fired.load(std::sync::atomic::Ordering::SeqCst));

    server.abort();
}

#[tokio::test]
async fn push_without_msg_seq_reaches_on_receive() {
    let (listener, port) = bind_loopback().await;

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let push = Packet::push("ScoreUpdate", 3, Bytes::from_static(b"42")).unwrap();
        write_inbound_frame(&mut stream, &push).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
    });

    let client = Client::new(test_config(2_000)).unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel();
    let tx = std::sync::Mutex::new(Some(tx));
    client.on_receive(move |stage_id, packet| {
        if let Some(tx) = tx.lock().unwrap().take() {
            let _ = tx.send((stage_id, packet));
        }
    });

    client.connect("127.0.0.1", port).await.unwrap();
    let (stage_id, packet) = tokio::time::timeout(Duration::from_secs(2), rx)
        .await
        .expect("push never arrived")
        .unwrap();
    assert_eq!(stage_id, 3);
    assert_eq!(&packet.payload[..], b"42");

    server.abort();
}
