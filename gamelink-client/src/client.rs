//! Public client API: `connect`/`disconnect`, `send`/`request`/`authenticate`
//! in both future and callback form, event subscriptions, and
//! `main_thread_action`.

use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use bytes::Bytes;
use gamelink_protocol::Packet;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, ReconnectPolicy};
use crate::dispatcher::Dispatcher;
use crate::endpoint::Endpoint;
use crate::error::{codes, ClientError};
use crate::heartbeat::{KeepAliveMonitor, TickAction};
use crate::pending::{PendingTable, RequestOutcome};
use crate::state::StateMachine;
use crate::transport::{PacketSink, PacketSource, TcpTransport, Transport, WsTransport};

const MONITOR_TICK_INTERVAL: Duration = Duration::from_millis(250);
const OUTBOUND_CHANNEL_CAPACITY: usize = 256;
const DISCONNECT_POLL_INTERVAL: Duration = Duration::from_millis(100);

struct ConnectionHandles {
    outbound_tx: mpsc::Sender<Packet>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

struct ClientInner {
    config: ClientConfig,
    state: StateMachine,
    pending: PendingTable,
    dispatcher: Dispatcher,
    monitor: KeepAliveMonitor,
    runtime: tokio::runtime::Handle,
    conn: StdMutex<Option<ConnectionHandles>>,
}

impl ClientInner {
    fn outbound_sender(&self) -> Option<mpsc::Sender<Packet>> {
        self.conn.lock().unwrap().as_ref().map(|h| h.outbound_tx.clone())
    }

    async fn enqueue(&self, packet: Packet) -> Result<(), ClientError> {
        let Some(tx) = self.outbound_sender() else {
            return Err(ClientError::Disconnected);
        };
        tx.send(packet).await.map_err(|_| ClientError::Disconnected)
    }

    async fn teardown_connection(&self) {
        let handles = self.conn.lock().unwrap().take();
        if let Some(handles) = handles {
            let _ = handles.shutdown_tx.send(true);
            drop(handles.outbound_tx);
            for task in handles.tasks {
                task.abort();
            }
        }
    }
}

/// An inbound packet was classified as a push or a response and handled
/// accordingly; heartbeats are dropped silently after updating the clock.
async fn handle_inbound(inner: &std::sync::Arc<ClientInner>, packet: Packet) {
    inner.monitor.record_activity();
    if packet.is_heartbeat() {
        return;
    }
    if packet.msg_seq != 0 {
        let response = packet.clone();
        let authenticated_now = inner.pending.complete(packet.msg_seq, response).await;
        if authenticated_now {
            inner.state.mark_authenticated();
            info!(msg_id = %packet.msg_id, "authenticated");
        }
        if packet.error_code != 0 {
            warn!(
                msg_id = %packet.msg_id,
                error_code = packet.error_code,
                stage_id = packet.stage_id,
                "application error"
            );
            inner
                .dispatcher
                .dispatch_error(packet.stage_id, packet.error_code, packet);
        }
    } else {
        debug!(msg_id = %packet.msg_id, stage_id = packet.stage_id, "push received");
        inner.dispatcher.dispatch_receive(packet.stage_id, packet);
    }
}

/// Link lost, decode error, or dead-peer detection: tear the connection down,
/// fail every pending request, and fire `OnDisconnect` with `intentional = false`.
async fn handle_link_lost(inner: &std::sync::Arc<ClientInner>, cause: Option<String>) {
    warn!(cause = ?cause, "link lost");
    inner.teardown_connection().await;
    inner.state.link_lost();
    inner.pending.cancel_all().await;
    inner.dispatcher.dispatch_disconnect(false, cause);
}

/// The public client handle. Cheap to clone — every clone shares the same
/// underlying connection and state.
#[derive(Clone)]
pub struct Client {
    inner: std::sync::Arc<ClientInner>,
}

impl Client {
    /// Construct the client. There is no separate `Init` step: the act of
    /// building a `Client` value *is* one-time initialization in Rust's
    /// ownership model. Must be called from within a Tokio runtime context.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| ClientError::ConnectFailed("no Tokio runtime in scope".to_owned()))?;
        let monitor = KeepAliveMonitor::new(&config);
        let dispatcher = Dispatcher::new(config.use_main_thread_callback);
        // Swept mode only makes sense alongside main-thread-driven callbacks;
        // otherwise nothing would ever call `main_thread_action` to sweep it.
        let pending = PendingTable::with_timer_mode(
            config.background_timers || !config.use_main_thread_callback,
        );
        Ok(Self {
            inner: std::sync::Arc::new(ClientInner {
                config,
                state: StateMachine::new(),
                pending,
                dispatcher,
                monitor,
                runtime,
                conn: StdMutex::new(None),
            }),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.is_connected()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.is_authenticated()
    }

    pub fn on_connect(&self, handler: impl Fn(bool) + Send + Sync + 'static) {
        self.inner.dispatcher.on_connect(handler);
    }

    pub fn on_receive(&self, handler: impl Fn(i64, Packet) + Send + Sync + 'static) {
        self.inner.dispatcher.on_receive(handler);
    }

    pub fn on_error(&self, handler: impl Fn(i64, u16, Packet) + Send + Sync + 'static) {
        self.inner.dispatcher.on_error(handler);
    }

    pub fn on_disconnect(&self, handler: impl Fn(bool, Option<String>) + Send + Sync + 'static) {
        self.inner.dispatcher.on_disconnect(handler);
    }

    fn build_uri(&self, host: &str, port: u16) -> String {
        let scheme = match (self.inner.config.use_websocket, self.inner.config.use_ssl) {
            (true, true) => "wss",
            (true, false) => "ws",
            (false, true) => "tls",
            (false, false) => "tcp",
        };
        format!("{scheme}://{host}:{port}")
    }

    /// `Connect(host, port)`. Fails synchronously (the returned future
    /// resolves to `Err`) if a transport-level connect or handshake fails.
    pub async fn connect(&self, host: &str, port: u16) -> Result<bool, ClientError> {
        let uri = self.build_uri(host, port);
        self.connect_uri(&uri).await
    }

    /// Connect to an explicit `tcp://`/`tls://`/`ws://`/`wss://` URI, for
    /// callers that need a WebSocket path beyond `host:port`.
    pub async fn connect_uri(&self, uri: &str) -> Result<bool, ClientError> {
        self.inner.state.begin_connect()?;
        let endpoint = match Endpoint::parse(uri) {
            Ok(ep) => ep,
            Err(e) => {
                self.inner.state.connect_failed();
                self.inner.dispatcher.dispatch_connect(false);
                return Err(e);
            }
        };
        match self.open_transport(&endpoint).await {
            Ok(transport) => {
                self.inner.state.connect_succeeded();
                self.inner.monitor.reset_clocks();
                self.spawn_io(transport);
                info!(%uri, "connected");
                self.inner.dispatcher.dispatch_connect(true);
                Ok(true)
            }
            Err(e) => {
                warn!(%uri, error = %e, "connect failed");
                self.inner.state.connect_failed();
                self.inner.dispatcher.dispatch_connect(false);
                Err(e)
            }
        }
    }

    /// `ConnectFireAndForget(host, port)`: spawns the connect attempt and
    /// reports its outcome only through `OnConnect`.
    pub fn connect_fire_and_forget(&self, host: &str, port: u16) {
        let client = self.clone();
        let host = host.to_owned();
        self.inner.runtime.spawn(async move {
            let _ = client.connect(&host, port).await;
        });
    }

    async fn open_transport(&self, endpoint: &Endpoint) -> Result<Box<dyn Transport>, ClientError> {
        let connect_timeout = self.inner.config.connect_timeout();
        match endpoint {
            Endpoint::Stream { host, port, tls } => {
                let transport = TcpTransport::connect(host, *port, *tls, connect_timeout).await?;
                Ok(Box::new(transport))
            }
            Endpoint::WebSocket { url, .. } => {
                let transport = WsTransport::connect(url, connect_timeout).await?;
                Ok(Box::new(transport))
            }
        }
    }

    fn spawn_io(&self, transport: Box<dyn Transport>) {
        let (mut sink, mut source): (Box<dyn PacketSink>, Box<dyn PacketSource>) =
            transport.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Packet>(OUTBOUND_CHANNEL_CAPACITY);
        let (shutdown_tx, mut shutdown_rx_writer) = watch::channel(false);
        let mut shutdown_rx_reader = shutdown_rx_writer.clone();

        let writer_task = self.inner.runtime.spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx_writer.changed() => break,
                    maybe_packet = outbound_rx.recv() => {
                        match maybe_packet {
                            Some(packet) => {
                                if sink.send_packet(packet).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                }
            }
            sink.close().await;
        });

        let inner_reader = self.inner.clone();
        let reader_task = self.inner.runtime.spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx_reader.changed() => break,
                    result = source.recv_packet() => {
                        match result {
                            Ok(Some(packet)) => handle_inbound(&inner_reader, packet).await,
                            Ok(None) => {
                                handle_link_lost(&inner_reader, None).await;
                                break;
                            }
                            Err(e) => {
                                handle_link_lost(&inner_reader, Some(e.to_string())).await;
                                break;
                            }
                        }
                    }
                }
            }
        });

        let mut tasks = vec![writer_task, reader_task];

        if !self.inner.config.use_main_thread_callback {
            let inner_monitor = self.inner.clone();
            let mut shutdown_rx_monitor = shutdown_tx.subscribe();
            let monitor_task = self.inner.runtime.spawn(async move {
                let mut interval = tokio::time::interval(MONITOR_TICK_INTERVAL);
                loop {
                    tokio::select! {
                        biased;
                        _ = shutdown_rx_monitor.changed() => break,
                        _ = interval.tick() => {
                            if run_monitor_tick(&inner_monitor).await {
                                break;
                            }
                        }
                    }
                }
            });
            tasks.push(monitor_task);
        }

        *self.inner.conn.lock().unwrap() = Some(ConnectionHandles {
            outbound_tx,
            shutdown_tx,
            tasks,
        });
    }

    /// `Disconnect()`: idempotent, marks the cause as intentional so
    /// `OnDisconnect` is suppressed.
    pub async fn disconnect(&self) {
        if !self.inner.state.begin_intentional_disconnect() {
            return;
        }
        info!("disconnecting");
        self.inner.teardown_connection().await;
        self.inner.pending.cancel_all().await;
        self.inner.state.intentional_disconnect_complete();
    }

    /// Auto-reconnect helper (supplemented convenience, not required for the
    /// correctness of any other operation): repeatedly `connect`s with capped
    /// exponential backoff after every *unintentional* disconnect. Returns
    /// `Ok(())` once a disconnect is observed to be intentional, or the last
    /// connect error once `policy.max_attempts` is exhausted.
    pub async fn run_with_reconnect(
        &self,
        host: &str,
        port: u16,
        policy: ReconnectPolicy,
    ) -> Result<(), ClientError> {
        let mut attempt: u32 = 0;
        loop {
            match self.connect(host, port).await {
                Ok(_) => {
                    attempt = 0;
                    self.wait_until_disconnected().await;
                    if self.inner.state.take_was_intentional() {
                        return Ok(());
                    }
                }
                Err(e) => {
                    attempt += 1;
                    if attempt > policy.max_attempts {
                        return Err(e);
                    }
                }
            }
            tokio::time::sleep(policy.backoff_delay(attempt.max(1))).await;
        }
    }

    async fn wait_until_disconnected(&self) {
        while self.is_connected() {
            tokio::time::sleep(DISCONNECT_POLL_INTERVAL).await;
        }
    }

    /// Fire-and-forget send (`msg_seq = 0`).
    pub async fn send(
        &self,
        msg_id: impl Into<String>,
        stage_id: i64,
        payload: impl Into<Bytes>,
    ) -> Result<(), ClientError> {
        self.require_send_gate()?;
        let packet = Packet::new(msg_id, 0, stage_id, payload)?;
        self.inner.enqueue(packet).await
    }

    /// `Request(packet, stage_id) -> future<response>`.
    pub async fn request(
        &self,
        msg_id: impl Into<String>,
        stage_id: i64,
        payload: impl Into<Bytes>,
    ) -> Result<Packet, ClientError> {
        self.require_send_gate()?;
        self.run_tracked_request(msg_id, stage_id, payload, false)
            .await
    }

    /// `Send`/`Request` are gated behind `require_connected`, and additionally
    /// behind authentication when `ClientConfig::require_authentication` is set.
    fn require_send_gate(&self) -> Result<(), ClientError> {
        if self.inner.config.require_authentication {
            self.inner.state.require_authenticated()
        } else {
            self.inner.state.require_connected()
        }
    }

    /// `Authenticate(packet) -> future<response>`.
    pub async fn authenticate(
        &self,
        msg_id: impl Into<String>,
        stage_id: i64,
        payload: impl Into<Bytes>,
    ) -> Result<Packet, ClientError> {
        self.inner.state.begin_authenticate()?;
        self.run_tracked_request(msg_id, stage_id, payload, true)
            .await
    }

    async fn run_tracked_request(
        &self,
        msg_id: impl Into<String>,
        stage_id: i64,
        payload: impl Into<Bytes>,
        is_authenticate: bool,
    ) -> Result<Packet, ClientError> {
        let seq = self.inner.pending.allocate_seq();
        let packet = Packet::new(msg_id, seq, stage_id, payload)?;
        let request_echo = packet.clone();
        let started_at = Instant::now();
        let rx = self
            .inner
            .pending
            .track(
                seq,
                packet.clone(),
                is_authenticate,
                self.inner.config.request_timeout(),
            )
            .await;
        if let Err(e) = self.inner.enqueue(packet).await {
            self.inner
                .pending
                .fail(seq, RequestOutcome::Disconnected)
                .await;
            return Err(e);
        }
        let outcome = rx.await.unwrap_or(RequestOutcome::Disconnected);
        if self.inner.config.enable_logging_response_time {
            info!(
                msg_id = %request_echo.msg_id,
                stage_id,
                msg_seq = seq,
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                "request completed"
            );
        }
        if let RequestOutcome::Timeout = outcome {
            // Application failures already notify OnError inside pending::complete's
            // caller (handle_inbound); timeouts are only observed here.
            warn!(msg_id = %request_echo.msg_id, stage_id, msg_seq = seq, "request timed out");
            self.inner
                .dispatcher
                .dispatch_error(stage_id, codes::REQUEST_TIMEOUT, request_echo);
        }
        outcome.into_result()
    }

    /// Callback form of `Request`. Runs the success/error callback through
    /// the dispatcher, so it obeys the same immediate/main-thread mode as
    /// subscribed events.
    pub fn request_with_callback(
        &self,
        msg_id: impl Into<String> + Send + 'static,
        stage_id: i64,
        payload: impl Into<Bytes> + Send + 'static,
        on_success: impl Fn(Packet) + Send + Sync + 'static,
        on_error: impl Fn(i64, u16, Packet) + Send + Sync + 'static,
    ) -> Result<(), ClientError> {
        self.require_send_gate()?;
        let client = self.clone();
        self.inner.runtime.spawn(async move {
            client
                .run_callback_request(msg_id, stage_id, payload, false, on_success, on_error)
                .await;
        });
        Ok(())
    }

    /// Callback form of `Authenticate`.
    pub fn authenticate_with_callback(
        &self,
        msg_id: impl Into<String> + Send + 'static,
        stage_id: i64,
        payload: impl Into<Bytes> + Send + 'static,
        on_success: impl Fn(Packet) + Send + Sync + 'static,
        on_error: impl Fn(i64, u16, Packet) + Send + Sync + 'static,
    ) -> Result<(), ClientError> {
        self.inner.state.begin_authenticate()?;
        let client = self.clone();
        self.inner.runtime.spawn(async move {
            client
                .run_callback_request(msg_id, stage_id, payload, true, on_success, on_error)
                .await;
        });
        Ok(())
    }

    async fn run_callback_request(
        &self,
        msg_id: impl Into<String>,
        stage_id: i64,
        payload: impl Into<Bytes>,
        is_authenticate: bool,
        on_success: impl Fn(Packet) + Send + Sync + 'static,
        on_error: impl Fn(i64, u16, Packet) + Send + Sync + 'static,
    ) {
        // Build the request up front purely so a failure (e.g. an oversized
        // msg_id) has a packet to hand back to the error callback.
        let request = match Packet::new(msg_id, 0, stage_id, payload) {
            Ok(p) => p,
            Err(_) => {
                self.inner
                    .dispatcher
                    .schedule(move || on_error(stage_id, codes::REQUEST_TIMEOUT, Packet::heartbeat()));
                return;
            }
        };
        let echo = request.clone();
        let result = self
            .run_tracked_request(request.msg_id, stage_id, request.payload, is_authenticate)
            .await;
        match result {
            Ok(response) => self.inner.dispatcher.schedule(move || on_success(response)),
            Err(ClientError::Application { error_code, .. }) => self
                .inner
                .dispatcher
                .schedule(move || on_error(stage_id, error_code, echo)),
            Err(_) => self
                .inner
                .dispatcher
                .schedule(move || on_error(stage_id, codes::REQUEST_TIMEOUT, echo)),
        }
    }

    /// Drains the callback queue (main-thread mode only) and runs one tick
    /// of the keep-alive/idle monitor. Safe to call from any thread; it
    /// never blocks on network I/O.
    pub fn main_thread_action(&self) {
        self.inner.dispatcher.drain();
        {
            let inner = self.inner.clone();
            self.inner.runtime.spawn(async move { inner.pending.sweep().await });
        }
        let authenticated = self.inner.state.is_authenticated();
        match self.inner.monitor.tick(authenticated) {
            TickAction::Idle => {}
            TickAction::SendHeartbeat => {
                if let Some(tx) = self.inner.outbound_sender() {
                    let _ = tx.try_send(Packet::heartbeat());
                }
            }
            TickAction::DeclareDead => {
                let inner = self.inner.clone();
                self.inner.runtime.spawn(async move {
                    handle_link_lost(&inner, Some("heartbeat/idle timeout".to_owned())).await;
                });
            }
        }
    }
}

/// Runs one monitor tick from an async context (the background monitor
/// task). Returns `true` if the link was declared dead and the task should
/// stop.
async fn run_monitor_tick(inner: &std::sync::Arc<ClientInner>) -> bool {
    let authenticated = inner.state.is_authenticated();
    match inner.monitor.tick(authenticated) {
        TickAction::Idle => false,
        TickAction::SendHeartbeat => {
            if let Some(tx) = inner.outbound_sender() {
                let _ = tx.send(Packet::heartbeat()).await;
            }
            false
        }
        TickAction::DeclareDead => {
            handle_link_lost(inner, Some("heartbeat/idle timeout".to_owned())).await;
            true
        }
    }
}
