//! Keepalive loop for the heartbeat stream

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use super::{ConnectionState, SessionEvent, SessionToken, Signals, StreamHalf};
use crate::envelope::Envelope;

/// Write a heartbeat every `interval` while the session is Connected.
///
/// The first tick fires one interval from now. A failed write marks the
/// session Disconnected and ends the loop; reconnecting is left to the
/// supervisor.
pub(super) fn spawn(
    half: Arc<StreamHalf>,
    token: SessionToken,
    interval: Duration,
    signals: Arc<Signals>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if signals.state() != ConnectionState::Connected {
                debug!(token = %token, "Session no longer connected, stopping heartbeat");
                break;
            }

            match half.write(Envelope::heartbeat(&token)).await {
                Ok(()) => trace!(token = %token, "Heartbeat sent"),
                Err(e) => {
                    warn!(token = %token, "Heartbeat failed: {}", e);
                    signals.mark_disconnected();
                    signals.publish(SessionEvent::HeartbeatFailed {
                        reason: e.to_string(),
                    });
                    break;
                }
            }
        }
    })
}
