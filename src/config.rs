//! Configuration for llm-stream
//!
//! CLI arguments and environment variable handling using clap, plus the
//! plain config structs the library consumes.

use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::retry::RetryPolicy;
use crate::transport::grpc::DEFAULT_METHOD_PATH;

/// Whether reconnects keep the logical session identity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum IdentityPolicy {
    /// One token per supervisor, reused across reconnects
    #[default]
    Stable,
    /// Fresh token for every rebuilt session
    PerSession,
}

/// Settings for one [`StreamSession`](crate::session::StreamSession)
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Engine type sent as the handshake tag
    pub engine: String,
    /// Credential carried by the engine init envelope
    pub user_code: String,
    pub handshake_timeout: Duration,
    pub heartbeat_interval: Duration,
    /// Deadline for one request/response round trip
    pub request_timeout: Duration,
    pub identity: IdentityPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            engine: "llm".to_string(),
            user_code: String::new(),
            handshake_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(10),
            request_timeout: Duration::from_secs(300),
            identity: IdentityPolicy::Stable,
        }
    }
}

impl SessionConfig {
    pub fn new(engine: impl Into<String>, user_code: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            user_code: user_code.into(),
            ..Self::default()
        }
    }
}

/// llm-stream - persistent session client for the LLM compute service
#[derive(Parser, Debug, Clone)]
#[command(name = "llm-stream")]
#[command(about = "Persistent bidirectional gRPC session client for the LLM compute service")]
pub struct Args {
    /// Server address (`host:port` uses TLS; `http://` or `https://` URLs are taken as given)
    #[arg(long, env = "LLM_SERVER_URL")]
    pub server_url: String,

    /// User code sent with the engine init message
    #[arg(long, env = "LLM_USER_CODE")]
    pub user_code: String,

    /// Engine type used as the handshake tag
    #[arg(long, env = "LLM_ENGINE", default_value = "llm")]
    pub engine: String,

    /// gRPC method path of the bidirectional message RPC
    #[arg(long, env = "LLM_METHOD_PATH", default_value = DEFAULT_METHOD_PATH)]
    pub method_path: String,

    /// Session identity across reconnects
    #[arg(long, env = "LLM_IDENTITY", value_enum, default_value_t = IdentityPolicy::Stable)]
    pub identity: IdentityPolicy,

    /// Handshake timeout in seconds
    #[arg(long, env = "HANDSHAKE_TIMEOUT_SECS", default_value = "10")]
    pub handshake_timeout_secs: u64,

    /// Heartbeat interval in seconds
    #[arg(long, env = "HEARTBEAT_INTERVAL_SECS", default_value = "10")]
    pub heartbeat_interval_secs: u64,

    /// Overall request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "300")]
    pub request_timeout_secs: u64,

    /// Delay before the first retry in seconds
    #[arg(long, env = "RETRY_INITIAL_DELAY_SECS", default_value = "5")]
    pub retry_initial_delay_secs: u64,

    /// Maximum backoff delay in seconds
    #[arg(long, env = "RETRY_MAX_DELAY_SECS", default_value = "60")]
    pub retry_max_delay_secs: u64,

    /// Random extra delay as a fraction of the backoff
    #[arg(long, env = "RETRY_JITTER", default_value = "0.1")]
    pub retry_jitter: f64,

    /// Attempts before giving up (0 = retry forever)
    #[arg(long, env = "RETRY_MAX_ATTEMPTS", default_value = "20")]
    pub retry_max_attempts: u32,

    /// Timeout for blob reference downloads in seconds
    #[arg(long, env = "BLOB_TIMEOUT_SECS", default_value = "60")]
    pub blob_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

impl Args {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.server_url.trim().is_empty() {
            return Err("LLM_SERVER_URL must not be empty".to_string());
        }
        if self.engine.is_empty() {
            return Err("LLM_ENGINE must not be empty".to_string());
        }
        if !self.method_path.starts_with('/') {
            return Err(format!("LLM_METHOD_PATH must start with '/': {}", self.method_path));
        }
        if self.handshake_timeout_secs == 0 || self.request_timeout_secs == 0 {
            return Err("timeouts must be greater than zero".to_string());
        }
        if self.heartbeat_interval_secs == 0 {
            return Err("HEARTBEAT_INTERVAL_SECS must be greater than zero".to_string());
        }
        if self.retry_max_delay_secs < self.retry_initial_delay_secs {
            return Err("RETRY_MAX_DELAY_SECS must be >= RETRY_INITIAL_DELAY_SECS".to_string());
        }
        if !(0.0..=1.0).contains(&self.retry_jitter) {
            return Err(format!("RETRY_JITTER must be within 0.0..=1.0: {}", self.retry_jitter));
        }
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::from(self)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(self)
    }

    pub fn blob_timeout(&self) -> Duration {
        Duration::from_secs(self.blob_timeout_secs)
    }
}

impl From<&Args> for SessionConfig {
    fn from(args: &Args) -> Self {
        Self {
            engine: args.engine.clone(),
            user_code: args.user_code.clone(),
            handshake_timeout: Duration::from_secs(args.handshake_timeout_secs),
            heartbeat_interval: Duration::from_secs(args.heartbeat_interval_secs),
            request_timeout: Duration::from_secs(args.request_timeout_secs),
            identity: args.identity,
        }
    }
}

impl From<&Args> for RetryPolicy {
    fn from(args: &Args) -> Self {
        Self {
            initial_delay: Duration::from_secs(args.retry_initial_delay_secs),
            max_delay: Duration::from_secs(args.retry_max_delay_secs),
            multiplier: 2.0,
            jitter: args.retry_jitter,
            max_attempts: (args.retry_max_attempts > 0).then_some(args.retry_max_attempts),
        }
    }
}
