//! Per-stream reader task

use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::{SessionEvent, Signals, StreamHalf};
use crate::error::{SessionError, TransportError};
use crate::transport::EnvelopeStream;

/// Pull inbound envelopes into the stream's slot until the stream ends.
///
/// A failed or ended stream releases the pending awaiter, marks the session
/// Disconnected and publishes the matching [`SessionEvent`].
pub(super) fn spawn(
    half: Arc<StreamHalf>,
    mut inbound: EnvelopeStream,
    signals: Arc<Signals>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let stream = half.kind();

        while let Some(item) = inbound.next().await {
            match item {
                Ok(envelope) => {
                    let kind = envelope.kind().to_string();
                    if !half.slot().resolve(envelope) {
                        trace!(%stream, kind = %kind, "Dropping unmatched envelope");
                    }
                }
                Err(e) => {
                    if !signals.is_closing() {
                        warn!(%stream, "Session stream failed: {}", e);
                    }
                    half.slot().fail(SessionError::Transport(e.clone()));
                    signals.mark_disconnected();
                    signals.publish(SessionEvent::StreamFailed {
                        stream,
                        reason: e.to_string(),
                    });
                    return;
                }
            }
        }

        debug!(%stream, "Session stream ended");
        half.slot().fail(SessionError::Transport(TransportError::Closed));
        signals.mark_disconnected();
        signals.publish(SessionEvent::StreamEnded { stream });
    })
}
