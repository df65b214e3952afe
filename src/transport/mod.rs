//! Transport layer
//!
//! A [`Transport`] is the factory for logical duplex streams to one remote
//! endpoint. It may share one underlying connection across every stream it
//! opens; each stream is owned exclusively by the session that opened it.
//!
//! - [`GrpcTransport`]: bidirectional gRPC calls over a shared tonic channel
//! - [`MemoryTransport`]: in-process streams with a scriptable server side

pub mod grpc;
pub mod memory;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::envelope::Envelope;
use crate::error::TransportError;

pub use grpc::GrpcTransport;
pub use memory::{MemoryServer, MemoryTransport, ServerStream};

/// Inbound half of a duplex stream
pub type EnvelopeStream = BoxStream<'static, Result<Envelope, TransportError>>;

/// Outbound half of a duplex stream
#[async_trait]
pub trait EnvelopeSink: Send {
    /// Write one envelope
    async fn send(&mut self, envelope: Envelope) -> Result<(), TransportError>;

    /// Half-close: tell the remote no more envelopes follow
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Tear the stream down without a graceful close
    fn abort(&mut self);
}

/// One logical bidirectional stream
pub struct DuplexStream {
    pub sink: Box<dyn EnvelopeSink>,
    pub inbound: EnvelopeStream,
}

/// Factory for duplex streams to one remote endpoint
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn open(&self) -> Result<DuplexStream, TransportError>;
}
