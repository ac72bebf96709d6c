//! Client configuration loading.
//!
//! TOML is the sole file-based config source; callers that don't need a file
//! can use [`ClientConfig::default`] or a `ClientConfigBuilder` directly.
//! All fields have defaults, so an empty TOML document is valid.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Config type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub use_websocket: bool,
    pub use_ssl: bool,
    pub connect_timeout_ms: u64,
    pub connection_idle_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub heartbeat_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub use_main_thread_callback: bool,
    pub enable_logging_response_time: bool,
    pub reconnect: Option<ReconnectPolicy>,
    /// When `true`, `send`/`request` are gated behind authentication: they
    /// fail fast with `ClientError::Unauthenticated` instead of reaching the
    /// wire. `false` (the default) leaves gating to the application.
    pub require_authentication: bool,
    /// When `true` (the default), the pending-request table and the
    /// keep-alive monitor each arm their own background timer task. Set to
    /// `false` to drive both purely off calls to `Client::main_thread_action`
    /// instead — only meaningful alongside `use_main_thread_callback`.
    pub background_timers: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl ReconnectPolicy {
    /// Capped exponential backoff for the given 1-based attempt number.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let delay_ms = (self.base_delay_ms as f64 * factor) as u64;
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            use_websocket: false,
            use_ssl: false,
            connect_timeout_ms: 10_000,
            connection_idle_timeout_ms: 30_000,
            heartbeat_interval_ms: 10_000,
            heartbeat_timeout_ms: 30_000,
            request_timeout_ms: 30_000,
            use_main_thread_callback: false,
            enable_logging_response_time: false,
            reconnect: None,
            require_authentication: false,
            background_timers: true,
        }
    }
}

impl ClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_ms > 0).then(|| Duration::from_millis(self.heartbeat_interval_ms))
    }

    pub fn heartbeat_timeout(&self) -> Option<Duration> {
        (self.heartbeat_timeout_ms > 0).then(|| Duration::from_millis(self.heartbeat_timeout_ms))
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.connection_idle_timeout_ms > 0)
            .then(|| Duration::from_millis(self.connection_idle_timeout_ms))
    }
}

// ---------------------------------------------------------------------------
// Builder (for programmatic construction without a TOML file)
// ---------------------------------------------------------------------------

/// Chainable builder over [`ClientConfig`], starting from its defaults.
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

impl ClientConfigBuilder {
    pub fn use_websocket(mut self, value: bool) -> Self {
        self.config.use_websocket = value;
        self
    }

    pub fn use_ssl(mut self, value: bool) -> Self {
        self.config.use_ssl = value;
        self
    }

    pub fn connect_timeout_ms(mut self, value: u64) -> Self {
        self.config.connect_timeout_ms = value;
        self
    }

    pub fn connection_idle_timeout_ms(mut self, value: u64) -> Self {
        self.config.connection_idle_timeout_ms = value;
        self
    }

    pub fn heartbeat_interval_ms(mut self, value: u64) -> Self {
        self.config.heartbeat_interval_ms = value;
        self
    }

    pub fn heartbeat_timeout_ms(mut self, value: u64) -> Self {
        self.config.heartbeat_timeout_ms = value;
        self
    }

    pub fn request_timeout_ms(mut self, value: u64) -> Self {
        self.config.request_timeout_ms = value;
        self
    }

    pub fn use_main_thread_callback(mut self, value: bool) -> Self {
        self.config.use_main_thread_callback = value;
        self
    }

    pub fn enable_logging_response_time(mut self, value: bool) -> Self {
        self.config.enable_logging_response_time = value;
        self
    }

    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.config.reconnect = Some(policy);
        self
    }

    pub fn require_authentication(mut self, value: bool) -> Self {
        self.config.require_authentication = value;
        self
    }

    pub fn background_timers(mut self, value: bool) -> Self {
        self.config.background_timers = value;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

// ---------------------------------------------------------------------------
// Raw TOML deserialization type (all fields optional)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct RawClientConfig {
    use_websocket: Option<bool>,
    use_ssl: Option<bool>,
    connect_timeout_ms: Option<u64>,
    connection_idle_timeout_ms: Option<u64>,
    heartbeat_interval_ms: Option<u64>,
    heartbeat_timeout_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
    use_main_thread_callback: Option<bool>,
    enable_logging_response_time: Option<bool>,
    reconnect: Option<RawReconnectPolicy>,
    require_authentication: Option<bool>,
    background_timers: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawReconnectPolicy {
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    multiplier: Option<f64>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

pub fn load_config_from_path(path: &Path) -> Result<ClientConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {}", path.display(), e)))?;
    load_config_from_str(&toml_str)
}

pub fn load_config_from_str(toml_str: &str) -> Result<ClientConfig, ConfigError> {
    let raw: RawClientConfig =
        toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    let defaults = ClientConfig::default();

    let reconnect = match raw.reconnect {
        Some(r) => {
            let max_attempts = r.max_attempts.unwrap_or(5);
            let multiplier = r.multiplier.unwrap_or(2.0);
            if multiplier < 1.0 {
                return Err(ConfigError::InvalidValue(
                    "reconnect.multiplier must be >= 1.0".to_owned(),
                ));
            }
            Some(ReconnectPolicy {
                max_attempts,
                base_delay_ms: r.base_delay_ms.unwrap_or(500),
                max_delay_ms: r.max_delay_ms.unwrap_or(30_000),
                multiplier,
            })
        }
        None => None,
    };

    Ok(ClientConfig {
        use_websocket: raw.use_websocket.unwrap_or(defaults.use_websocket),
        use_ssl: raw.use_ssl.unwrap_or(defaults.use_ssl),
        connect_timeout_ms: raw.connect_timeout_ms.unwrap_or(defaults.connect_timeout_ms),
        connection_idle_timeout_ms: raw
            .connection_idle_timeout_ms
            .unwrap_or(defaults.connection_idle_timeout_ms),
        heartbeat_interval_ms: raw
            .heartbeat_interval_ms
            .unwrap_or(defaults.heartbeat_interval_ms),
        heartbeat_timeout_ms: raw
            .heartbeat_timeout_ms
            .unwrap_or(defaults.heartbeat_timeout_ms),
        request_timeout_ms: raw.request_timeout_ms.unwrap_or(defaults.request_timeout_ms),
        use_main_thread_callback: raw
            .use_main_thread_callback
            .unwrap_or(defaults.use_main_thread_callback),
        enable_logging_response_time: raw
            .enable_logging_response_time
            .unwrap_or(defaults.enable_logging_response_time),
        reconnect,
        require_authentication: raw
            .require_authentication
            .unwrap_or(defaults.require_authentication),
        background_timers: raw.background_timers.unwrap_or(defaults.background_timers),
    })
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(s) => write!(f, "IO error: {}", s),
            ConfigError::Parse(s) => write!(f, "Parse error: {}", s),
            ConfigError::InvalidValue(s) => write!(f, "Invalid config value: {}", s),
        }
    }
}

impl std::error::Error for ConfigError {}
