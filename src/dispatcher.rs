//! Reliable request dispatch
//!
//! [`Dispatcher::send_surely`] keeps resubmitting a request until one attempt
//! succeeds: every failed attempt replaces the session and backs off before
//! the identical envelope is sent again. Requests are serialized by holding
//! the supervisor lock across each attempt, which keeps the session's single
//! response slot unambiguous.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::envelope::Envelope;
use crate::error::{ClientError, Result, SessionError};
use crate::retry::RetryPolicy;
use crate::session::{SessionToken, StreamSession};
use crate::supervisor::SessionSupervisor;

pub struct Dispatcher {
    supervisor: Mutex<SessionSupervisor>,
    /// Overall deadline for one attempt
    timeout: Duration,
    retry: RetryPolicy,
}

impl Dispatcher {
    /// Dispatch through `supervisor`, reusing its request timeout and retry policy
    pub fn new(supervisor: SessionSupervisor) -> Self {
        let timeout = supervisor.config().request_timeout;
        let retry = supervisor.retry_policy().clone();
        Self {
            supervisor: Mutex::new(supervisor),
            timeout,
            retry,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Send `envelope` until an attempt succeeds.
    ///
    /// Returns the response when `expect_response` is set; otherwise the
    /// acknowledgment is awaited and discarded. Fails only once the retry
    /// ceiling is reached or a replacement session cannot be built.
    pub async fn send_surely(
        &self,
        envelope: &Envelope,
        expect_response: bool,
    ) -> Result<Option<Envelope>> {
        let mut supervisor = self.supervisor.lock().await;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let session = supervisor.session();

            let outcome = match timeout(self.timeout, session.send_receive(envelope.clone())).await {
                Ok(result) => result,
                Err(_) => Err(SessionError::Timeout(self.timeout)),
            };

            let error = match outcome {
                Ok(response) => {
                    debug!(kind = envelope.kind(), attempt, "Request completed");
                    return Ok(expect_response.then_some(response));
                }
                Err(e) => e,
            };

            warn!(kind = envelope.kind(), attempt, "Request failed: {}", error);

            let Some(delay) = self.retry.delay_for(attempt) else {
                return Err(ClientError::RetriesExhausted {
                    attempts: attempt,
                    last_error: Box::new(error),
                });
            };

            supervisor.replace().await?;
            warn!(kind = envelope.kind(), attempt, "Resubmitting request in {:?}", delay);
            tokio::time::sleep(delay).await;
        }
    }

    /// Session currently used for dispatch
    pub async fn session(&self) -> Arc<StreamSession> {
        self.supervisor.lock().await.session()
    }

    pub async fn token(&self) -> SessionToken {
        self.supervisor.lock().await.token().clone()
    }

    pub async fn replacements(&self) -> u64 {
        self.supervisor.lock().await.replacements()
    }

    pub async fn close(&self) {
        self.supervisor.lock().await.close().await;
    }
}
