//! Session supervisor
//!
//! Builds connected [`StreamSession`]s with retry and replaces broken ones.
//! The supervisor owns the logical session identity: with
//! [`IdentityPolicy::Stable`] every rebuilt session presents the same token,
//! so the server can resume its state for this client.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{IdentityPolicy, SessionConfig};
use crate::error::{ClientError, Result};
use crate::retry::RetryPolicy;
use crate::session::{SessionToken, StreamSession};
use crate::transport::Transport;

pub struct SessionSupervisor {
    transport: Arc<dyn Transport>,
    config: SessionConfig,
    retry: RetryPolicy,
    /// Supervisor-scoped token, used under the stable identity policy
    identity: SessionToken,
    current: Arc<StreamSession>,
    replacements: u64,
}

impl SessionSupervisor {
    /// Build and connect the first session, retrying per `retry`
    pub async fn create(
        transport: Arc<dyn Transport>,
        config: SessionConfig,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let identity = SessionToken::generate();
        let current = connect_with_retry(&transport, &config, &retry, &identity).await?;

        Ok(Self {
            transport,
            config,
            retry,
            identity,
            current,
            replacements: 0,
        })
    }

    /// Close the current session (best effort) and build a new one
    pub async fn replace(&mut self) -> Result<Arc<StreamSession>> {
        let old = Arc::clone(&self.current);
        info!(token = %old.token(), state = %old.state(), "Replacing session");
        old.close().await;

        self.current =
            connect_with_retry(&self.transport, &self.config, &self.retry, &self.identity).await?;
        self.replacements += 1;

        Ok(Arc::clone(&self.current))
    }

    /// The current session
    pub fn session(&self) -> Arc<StreamSession> {
        Arc::clone(&self.current)
    }

    /// Token presented by the current session
    pub fn token(&self) -> &SessionToken {
        self.current.token()
    }

    /// Successful replacements since creation
    pub fn replacements(&self) -> u64 {
        self.replacements
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub async fn close(&self) {
        self.current.close().await;
    }
}

async fn connect_with_retry(
    transport: &Arc<dyn Transport>,
    config: &SessionConfig,
    retry: &RetryPolicy,
    identity: &SessionToken,
) -> Result<Arc<StreamSession>> {
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        let token = match config.identity {
            IdentityPolicy::Stable => identity.clone(),
            IdentityPolicy::PerSession => SessionToken::generate(),
        };
        let session = Arc::new(StreamSession::new(
            token,
            config.clone(),
            Arc::clone(transport),
        ));

        match session.connect().await {
            Ok(()) => {
                info!(engine = %config.engine, token = %session.token(), attempt, "Session connected");
                return Ok(session);
            }
            Err(e) => {
                warn!(engine = %config.engine, attempt, "Failed to connect session: {}", e);
                session.close().await;

                match retry.delay_for(attempt) {
                    Some(delay) => {
                        warn!(attempt, "Retrying session connect in {:?}", delay);
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        return Err(ClientError::RetriesExhausted {
                            attempts: attempt,
                            last_error: Box::new(e),
                        });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::{SessionError, TransportError};
    use crate::transport::MemoryTransport;

    #[tokio::test(start_paused = true)]
    async fn test_create_gives_up_at_ceiling() {
        let (transport, _server) = MemoryTransport::pair();
        transport.refuse_next(10);

        let retry = RetryPolicy::fixed(Duration::from_secs(5)).with_max_attempts(Some(3));
        let started = tokio::time::Instant::now();
        let result =
            SessionSupervisor::create(Arc::new(transport), SessionConfig::default(), retry).await;

        match result {
            Err(ClientError::RetriesExhausted {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(
                    *last_error,
                    SessionError::Transport(TransportError::Open(_))
                ));
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("expected create to fail"),
        }
        // Two waits between three attempts
        assert!(started.elapsed() >= Duration::from_secs(10));
    }
}
