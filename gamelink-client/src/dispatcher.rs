//! Callback dispatcher: delivers connect/receive/error/disconnect events
//! either inline on the I/O worker (immediate mode) or via an
//! application-drained FIFO queue (main-thread mode), grounded in the same
//! "one task pushes, the designated consumer drains" shape used by the
//! broadcast-fanout writers elsewhere in this codebase.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};

use gamelink_protocol::Packet;

pub type ConnectHandler = dyn Fn(bool) + Send + Sync;
pub type ReceiveHandler = dyn Fn(i64, Packet) + Send + Sync;
pub type ErrorHandler = dyn Fn(i64, u16, Packet) + Send + Sync;
pub type DisconnectHandler = dyn Fn(bool, Option<String>) + Send + Sync;

#[derive(Default)]
struct Handlers {
    on_connect: RwLock<Option<Arc<ConnectHandler>>>,
    on_receive: RwLock<Option<Arc<ReceiveHandler>>>,
    on_error: RwLock<Option<Arc<ErrorHandler>>>,
    on_disconnect: RwLock<Option<Arc<DisconnectHandler>>>,
}

type QueuedTask = Box<dyn FnOnce() + Send>;

/// Delivers client events, either immediately or via a queue drained by
/// `MainThreadAction`.
pub struct Dispatcher {
    handlers: Handlers,
    queue: Option<Mutex<VecDeque<QueuedTask>>>,
}

impl Dispatcher {
    pub fn new(use_main_thread_callback: bool) -> Self {
        Self {
            handlers: Handlers::default(),
            queue: use_main_thread_callback.then(|| Mutex::new(VecDeque::new())),
        }
    }

    pub fn on_connect(&self, handler: impl Fn(bool) + Send + Sync + 'static) {
        *self.handlers.on_connect.write().unwrap() = Some(Arc::new(handler));
    }

    pub fn on_receive(&self, handler: impl Fn(i64, Packet) + Send + Sync + 'static) {
        *self.handlers.on_receive.write().unwrap() = Some(Arc::new(handler));
    }

    pub fn on_error(&self, handler: impl Fn(i64, u16, Packet) + Send + Sync + 'static) {
        *self.handlers.on_error.write().unwrap() = Some(Arc::new(handler));
    }

    pub fn on_disconnect(&self, handler: impl Fn(bool, Option<String>) + Send + Sync + 'static) {
        *self.handlers.on_disconnect.write().unwrap() = Some(Arc::new(handler));
    }

    pub fn dispatch_connect(&self, success: bool) {
        if let Some(handler) = self.handlers.on_connect.read().unwrap().clone() {
            self.run(move || handler(success));
        }
    }

    pub fn dispatch_receive(&self, stage_id: i64, packet: Packet) {
        if let Some(handler) = self.handlers.on_receive.read().unwrap().clone() {
            self.run(move || handler(stage_id, packet));
        }
    }

    pub fn dispatch_error(&self, stage_id: i64, error_code: u16, request: Packet) {
        if let Some(handler) = self.handlers.on_error.read().unwrap().clone() {
            self.run(move || handler(stage_id, error_code, request));
        }
    }

    /// Suppressed entirely for intentional disconnects — the caller decides
    /// whether to invoke this at all.
    pub fn dispatch_disconnect(&self, was_intentional: bool, cause: Option<String>) {
        if let Some(handler) = self.handlers.on_disconnect.read().unwrap().clone() {
            self.run(move || handler(was_intentional, cause));
        }
    }

    fn run(&self, task: impl FnOnce() + Send + 'static) {
        match &self.queue {
            Some(queue) => queue.lock().unwrap().push_back(Box::new(task)),
            None => task(),
        }
    }

    /// Schedule an arbitrary one-off task (e.g. a per-call `Request` callback)
    /// with the same immediate/main-thread semantics as the subscribed events.
    pub fn schedule(&self, task: impl FnOnce() + Send + 'static) {
        self.run(task);
    }

    /// Drain and execute every queued task in FIFO order. A no-op in
    /// immediate mode, since nothing is ever queued there.
    pub fn drain(&self) {
        let Some(queue) = &self.queue else {
            return;
        };
        loop {
            let task = queue.lock().unwrap().pop_front();
            match task {
                Some(task) => task(),
                None => break,
            }
        }
    }

    pub fn is_main_thread_mode(&self) -> bool {
        self.queue.is_some()
    }
}
