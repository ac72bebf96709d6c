use thiserror::Error;

use gamelink_protocol::ProtocolError;

/// Numeric codes guaranteed at the API boundary, stable across versions.
pub mod codes {
    pub const DISCONNECTED: u16 = 60201;
    pub const REQUEST_TIMEOUT: u16 = 60202;
    pub const UNAUTHENTICATED: u16 = 60203;
}

/// Everything a caller of the public client API can observe.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("not connected")]
    Disconnected,

    #[error("request timed out waiting for a response")]
    RequestTimeout,

    #[error("operation requires authentication")]
    Unauthenticated,

    #[error("illegal operation in the current connection state: {0}")]
    IllegalState(&'static str),

    #[error("msg_id exceeds 255 bytes")]
    MsgIdTooLong,

    #[error("server reported error_code={error_code} for stage_id={stage_id}")]
    Application {
        error_code: u16,
        stage_id: i64,
        msg_seq: u16,
    },

    #[error("transport connect failed: {0}")]
    ConnectFailed(String),

    #[error("transport write failed: {0}")]
    WriteFailed(String),

    #[error("endpoint could not be parsed: {0}")]
    InvalidEndpoint(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("already initialized")]
    AlreadyInitialized,

    #[error("config error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl ClientError {
    /// The numeric code this error surfaces as, where the spec defines one.
    pub fn code(&self) -> Option<u16> {
        match self {
            ClientError::Disconnected => Some(codes::DISCONNECTED),
            ClientError::RequestTimeout => Some(codes::REQUEST_TIMEOUT),
            ClientError::Unauthenticated => Some(codes::UNAUTHENTICATED),
            _ => None,
        }
    }
}
