//! gRPC transport
//!
//! Each stream is one call to the bidirectional `BidirectionalMessage` RPC.
//! Messages use a minimal protobuf wrapper matching the service schema:
//!
//! ```text
//! message SimpleMessage {
//!     string mtype = 1;
//!     bytes payload = 2;
//! }
//! ```
//!
//! The call is driven by a background task so that opening a stream never
//! waits on response headers; some servers hold headers until the first reply,
//! which only comes after the handshake has been written.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tracing::debug;

use super::{DuplexStream, EnvelopeSink, Transport};
use crate::envelope::Envelope;
use crate::error::TransportError;

/// Default RPC path of the message service
pub const DEFAULT_METHOD_PATH: &str = "/Messages/BidirectionalMessage";

/// Buffered envelopes per direction per stream
const STREAM_BUFFER: usize = 64;

/// How long a half-closed call may take to end before it is aborted
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Wire form of an [`Envelope`]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SimpleMessage {
    #[prost(string, tag = "1")]
    pub mtype: String,
    #[prost(bytes = "bytes", tag = "2")]
    pub payload: Bytes,
}

impl From<Envelope> for SimpleMessage {
    fn from(envelope: Envelope) -> Self {
        let (mtype, payload) = envelope.into_parts();
        Self { mtype, payload }
    }
}

impl From<SimpleMessage> for Envelope {
    fn from(msg: SimpleMessage) -> Self {
        Envelope::new(msg.mtype, msg.payload)
    }
}

impl From<tonic::Status> for TransportError {
    fn from(status: tonic::Status) -> Self {
        TransportError::Failed(format!("{:?}: {}", status.code(), status.message()))
    }
}

/// gRPC transport sharing one channel across all sessions
#[derive(Clone)]
pub struct GrpcTransport {
    channel: Channel,
    path: PathAndQuery,
}

impl GrpcTransport {
    /// Build a transport without connecting.
    ///
    /// `server_url` may omit the scheme (`host:port`), in which case TLS is
    /// used. Connection errors surface when the first stream is opened.
    pub fn connect_lazy(server_url: &str, method_path: &str) -> Result<Self, TransportError> {
        let uri = normalize_url(server_url);
        let mut endpoint = Endpoint::from_shared(uri.clone())
            .map_err(|e| TransportError::Endpoint(format!("{}: {}", uri, e)))?;

        if uri.starts_with("https://") {
            endpoint = endpoint
                .tls_config(ClientTlsConfig::new())
                .map_err(|e| TransportError::Endpoint(format!("TLS config: {}", e)))?;
        }

        let path = PathAndQuery::try_from(method_path.to_string())
            .map_err(|e| TransportError::Endpoint(format!("method path {}: {}", method_path, e)))?;

        debug!("gRPC transport configured for {} ({})", uri, method_path);

        Ok(Self {
            channel: endpoint.connect_lazy(),
            path,
        })
    }
}

#[async_trait]
impl Transport for GrpcTransport {
    async fn open(&self) -> Result<DuplexStream, TransportError> {
        let (out_tx, out_rx) = mpsc::channel::<SimpleMessage>(STREAM_BUFFER);
        let (in_tx, in_rx) = mpsc::channel::<Result<Envelope, TransportError>>(STREAM_BUFFER);

        let mut grpc = Grpc::new(self.channel.clone());
        grpc.ready()
            .await
            .map_err(|e| TransportError::Open(e.to_string()))?;

        let path = self.path.clone();
        let call = tokio::spawn(async move {
            let codec: ProstCodec<SimpleMessage, SimpleMessage> = ProstCodec::default();
            let request = tonic::Request::new(ReceiverStream::new(out_rx));

            let mut inbound = match grpc.streaming(request, path, codec).await {
                Ok(response) => response.into_inner(),
                Err(status) => {
                    let _ = in_tx.send(Err(status.into())).await;
                    return;
                }
            };

            loop {
                match inbound.message().await {
                    Ok(Some(msg)) => {
                        if in_tx.send(Ok(msg.into())).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(status) => {
                        let _ = in_tx.send(Err(status.into())).await;
                        break;
                    }
                }
            }
        });

        Ok(DuplexStream {
            sink: Box::new(GrpcSink {
                tx: Some(out_tx),
                call,
            }),
            inbound: ReceiverStream::new(in_rx).boxed(),
        })
    }
}

/// Outbound half of one gRPC call; dropping it aborts the call
struct GrpcSink {
    tx: Option<mpsc::Sender<SimpleMessage>>,
    call: JoinHandle<()>,
}

#[async_trait]
impl EnvelopeSink for GrpcSink {
    async fn send(&mut self, envelope: Envelope) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(envelope.into())
            .await
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.call.is_finished() {
            return Err(TransportError::Closed);
        }
        // Dropping the sender ends the request stream (done writing).
        self.tx.take().map(drop).ok_or(TransportError::Closed)?;

        if timeout(CLOSE_GRACE, &mut self.call).await.is_err() {
            debug!("Server kept the stream open after half-close, aborting call");
            self.call.abort();
        }
        Ok(())
    }

    fn abort(&mut self) {
        self.tx = None;
        self.call.abort();
    }
}

impl Drop for GrpcSink {
    fn drop(&mut self) {
        self.call.abort();
    }
}

/// Prefix bare `host:port` targets with `https://`
fn normalize_url(server_url: &str) -> String {
    if server_url.contains("://") {
        server_url.to_string()
    } else {
        format!("https://{}", server_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("llm.example.com:443"), "https://llm.example.com:443");
        assert_eq!(normalize_url("http://localhost:50051"), "http://localhost:50051");
    }

    #[test]
    fn test_simple_message_wire_layout() {
        let msg = SimpleMessage::from(Envelope::new("ask", Bytes::from_static(b"\x01")));
        let encoded = msg.encode_to_vec();
        // field 1 (string), len 3, "ask"; field 2 (bytes), len 1, 0x01
        assert_eq!(encoded, vec![0x0A, 0x03, b'a', b's', b'k', 0x12, 0x01, 0x01]);

        let decoded = SimpleMessage::decode(encoded.as_slice()).unwrap();
        assert_eq!(Envelope::from(decoded), Envelope::new("ask", Bytes::from_static(b"\x01")));
    }

    #[test]
    fn test_status_maps_to_failed() {
        let err: TransportError = tonic::Status::unavailable("gone").into();
        assert_eq!(err, TransportError::Failed("Unavailable: gone".to_string()));
    }

    /// Sink over a call that never ends; `released` resolves once the call is dropped
    fn sink_over_open_call() -> (GrpcSink, tokio::sync::oneshot::Receiver<()>) {
        let (tx, _rx) = mpsc::channel(1);
        let (guard, released) = tokio::sync::oneshot::channel::<()>();
        let call = tokio::spawn(async move {
            let _guard = guard;
            std::future::pending::<()>().await
        });
        (GrpcSink { tx: Some(tx), call }, released)
    }

    #[tokio::test]
    async fn test_dropped_sink_aborts_call() {
        let (sink, released) = sink_over_open_call();
        drop(sink);
        assert!(released.await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_aborts_call_left_open_by_server() {
        let (mut sink, released) = sink_over_open_call();
        let started = tokio::time::Instant::now();

        sink.close().await.unwrap();
        assert!(started.elapsed() >= CLOSE_GRACE);
        assert!(released.await.is_err());
        assert_eq!(sink.close().await, Err(TransportError::Closed));
    }

    #[tokio::test]
    async fn test_invalid_method_path_rejected() {
        let result = GrpcTransport::connect_lazy("http://localhost:50051", "not a path");
        assert!(matches!(result, Err(TransportError::Endpoint(_))));
    }
}
