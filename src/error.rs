//! Error types for llm-stream
//!
//! One enum per layer: frame decoding, transports, sessions, and the client
//! surface. Lower layers convert into higher ones with `From`.

use std::time::Duration;

use thiserror::Error;

use crate::session::ConnectionState;

/// Violations of the frame codec contract (`MalformedFrame`)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Buffer ended before an integer's terminal group
    #[error("malformed frame: truncated integer at offset {0}")]
    Truncated(usize),

    /// Integer does not fit in 32 bits
    #[error("malformed frame: integer overflows 32 bits at offset {0}")]
    VarintOverflow(usize),

    /// Declared string length runs past the end of the buffer
    #[error("malformed frame: declared length {declared} exceeds {remaining} remaining bytes")]
    LengthOutOfBounds { declared: usize, remaining: usize },

    /// String too long for a 32-bit length prefix
    #[error("string of {0} bytes exceeds the frame length limit")]
    StringTooLong(usize),

    /// String bytes are not valid UTF-8
    #[error("malformed frame: invalid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

/// Errors reported by a [`Transport`](crate::transport::Transport) or its streams
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("invalid endpoint: {0}")]
    Endpoint(String),

    #[error("failed to open stream: {0}")]
    Open(String),

    #[error("stream failed: {0}")]
    Failed(String),

    #[error("stream closed")]
    Closed,
}

/// Errors from a single [`StreamSession`](crate::session::StreamSession)
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A newer request on the same session took over the pending slot
    #[error("pending response superseded by a newer request")]
    Superseded,

    #[error("session is not connected (state: {0})")]
    NotConnected(ConnectionState),

    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Errors surfaced to callers of the supervisor, dispatcher and client
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last_error: Box<SessionError>,
    },

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("response to '{0}' carried no payload")]
    MissingPayload(String),

    #[error("blob fetch failed: {0}")]
    Blob(String),
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        Self::Session(SessionError::Transport(err))
    }
}

/// Result type alias for session operations
pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
