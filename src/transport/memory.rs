//! In-process transport
//!
//! Every stream opened on a [`MemoryTransport`] shows up on the paired
//! [`MemoryServer`] as a [`ServerStream`], in open order. The server side can
//! reply, stay silent, end the stream, refuse further writes, or inject a
//! stream failure. Session recovery is exercised over it without a network.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::trace;

use super::{DuplexStream, EnvelopeSink, Transport};
use crate::envelope::Envelope;
use crate::error::TransportError;

/// Buffered envelopes per direction per stream
const STREAM_BUFFER: usize = 64;

/// Client side of the in-process transport
pub struct MemoryTransport {
    acceptor: mpsc::UnboundedSender<ServerStream>,
    /// Number of upcoming `open` calls to refuse
    refuse: AtomicUsize,
    opened: AtomicUsize,
}

impl MemoryTransport {
    /// Create a transport and the server that receives its streams
    pub fn pair() -> (Self, MemoryServer) {
        let (acceptor, incoming) = mpsc::unbounded_channel();
        let transport = Self {
            acceptor,
            refuse: AtomicUsize::new(0),
            opened: AtomicUsize::new(0),
        };
        (transport, MemoryServer { incoming })
    }

    /// Fail the next `count` stream opens
    pub fn refuse_next(&self, count: usize) {
        self.refuse.store(count, Ordering::SeqCst);
    }

    /// Streams successfully opened so far
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self) -> Result<DuplexStream, TransportError> {
        let refused = self
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(TransportError::Open("connection refused".into()));
        }

        let (client_tx, server_rx) = mpsc::channel::<Envelope>(STREAM_BUFFER);
        let (server_tx, client_rx) = mpsc::channel::<Result<Envelope, TransportError>>(STREAM_BUFFER);

        let id = self.opened.fetch_add(1, Ordering::SeqCst);
        let server_side = ServerStream {
            id,
            inbound: server_rx,
            outbound: server_tx,
        };
        self.acceptor
            .send(server_side)
            .map_err(|_| TransportError::Open("memory server dropped".into()))?;

        trace!(stream = id, "Opened memory stream");

        Ok(DuplexStream {
            sink: Box::new(MemorySink {
                tx: Some(client_tx),
            }),
            inbound: ReceiverStream::new(client_rx).boxed(),
        })
    }
}

/// Server side of the in-process transport
pub struct MemoryServer {
    incoming: mpsc::UnboundedReceiver<ServerStream>,
}

impl MemoryServer {
    /// Wait for the next opened stream; `None` once the transport is dropped
    pub async fn accept(&mut self) -> Option<ServerStream> {
        self.incoming.recv().await
    }
}

/// Remote end of one in-process stream
pub struct ServerStream {
    id: usize,
    inbound: mpsc::Receiver<Envelope>,
    outbound: mpsc::Sender<Result<Envelope, TransportError>>,
}

impl ServerStream {
    /// Position of this stream in the transport's open order
    pub fn id(&self) -> usize {
        self.id
    }

    /// Next envelope written by the client; `None` after the client closes
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.inbound.recv().await
    }

    /// Deliver an envelope to the client; `false` if the client is gone
    pub async fn send(&self, envelope: Envelope) -> bool {
        self.outbound.send(Ok(envelope)).await.is_ok()
    }

    /// Stop accepting client writes while still delivering to the client.
    ///
    /// Envelopes already written can still be received.
    pub fn stop_reading(&mut self) {
        self.inbound.close();
    }

    /// Make the client's inbound stream yield a transport failure
    pub async fn fail(&self, reason: &str) -> bool {
        self.outbound
            .send(Err(TransportError::Failed(reason.to_string())))
            .await
            .is_ok()
    }
}

struct MemorySink {
    tx: Option<mpsc::Sender<Envelope>>,
}

#[async_trait]
impl EnvelopeSink for MemorySink {
    async fn send(&mut self, envelope: Envelope) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(envelope).await.map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.tx.take() {
            Some(tx) if !tx.is_closed() => Ok(()),
            _ => Err(TransportError::Closed),
        }
    }

    fn abort(&mut self) {
        self.tx = None;
    }
}
