//! Async client for the framed binary / WebSocket game-server protocol
//! defined by `gamelink-protocol`.
//!
//! The typical lifecycle: build a [`Client`] inside a Tokio runtime, call
//! [`Client::connect`], subscribe to events or issue [`Client::request`]s,
//! and call [`Client::disconnect`] when done. Applications that set
//! `use_main_thread_callback` in [`ClientConfig`] must also call
//! [`Client::main_thread_action`] on a regular cadence from their own main
//! loop.

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod heartbeat;
pub mod pending;
pub mod state;
pub mod transport;

pub use client::Client;
pub use config::{
    load_config_from_path, load_config_from_str, ClientConfig, ClientConfigBuilder, ConfigError,
    ReconnectPolicy,
};
pub use endpoint::Endpoint;
pub use error::{codes, ClientError};
pub use state::ConnectionState;

pub use gamelink_protocol::Packet;
