//! llm-stream - persistent session client for the LLM compute service
//!
//! Keeps one long-lived bidirectional gRPC session open to the service and
//! recovers from transport failure without losing caller requests.
//!
//! ## Layers
//!
//! - **Codec**: variable-length integers and length-prefixed strings used in
//!   request payloads
//! - **Envelope**: type tag + opaque payload, the unit carried on a stream
//! - **Transport**: factory for duplex streams (gRPC or in-process)
//! - **Session**: main + heartbeat stream, handshake, keepalive, one
//!   outstanding request at a time
//! - **Supervisor**: builds sessions with retry and replaces broken ones
//! - **Dispatcher**: resubmits a request until it succeeds
//! - **Client**: `ask` / `embed` verbs and response decoding

pub mod client;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod retry;
pub mod session;
pub mod supervisor;
pub mod transport;

pub use client::{ChatRequest, EmbeddingRequest, LlmClient, LlmSimpleOutput};
pub use codec::{FrameReader, FrameWriter};
pub use config::{Args, IdentityPolicy, SessionConfig};
pub use dispatcher::Dispatcher;
pub use envelope::{Envelope, Verb};
pub use error::{ClientError, FrameError, Result, SessionError, TransportError};
pub use retry::RetryPolicy;
pub use session::{ConnectionState, SessionEvent, SessionStatus, SessionToken, StreamSession};
pub use supervisor::SessionSupervisor;
pub use transport::{GrpcTransport, MemoryTransport, Transport};
