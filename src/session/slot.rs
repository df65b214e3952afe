//! Single-occupancy response slot
//!
//! The wire carries no correlation id, so each stream honors exactly one
//! outstanding request. Attaching a new awaiter evicts the previous one with
//! [`SessionError::Superseded`]; an incoming envelope with no awaiter is
//! dropped.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::envelope::Envelope;
use crate::error::{SessionError, SessionResult};

type Awaiter = oneshot::Sender<SessionResult<Envelope>>;

#[derive(Default)]
pub struct PendingSlot {
    awaiter: Mutex<Option<Awaiter>>,
}

impl PendingSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a fresh awaiter, superseding any previous one
    pub fn attach(&self) -> oneshot::Receiver<SessionResult<Envelope>> {
        let (tx, rx) = oneshot::channel();
        if let Some(previous) = self.lock().replace(tx) {
            let _ = previous.send(Err(SessionError::Superseded));
        }
        rx
    }

    /// Hand `envelope` to the current awaiter.
    ///
    /// Returns `false` when nobody was waiting (the envelope is dropped).
    pub fn resolve(&self, envelope: Envelope) -> bool {
        match self.lock().take() {
            Some(tx) => tx.send(Ok(envelope)).is_ok(),
            None => false,
        }
    }

    /// Release the current awaiter with an error
    pub fn fail(&self, error: SessionError) -> bool {
        match self.lock().take() {
            Some(tx) => tx.send(Err(error)).is_ok(),
            None => false,
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.lock().as_ref().is_some_and(|tx| !tx.is_closed())
    }

    fn lock(&self) -> MutexGuard<'_, Option<Awaiter>> {
        self.awaiter.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;

    #[tokio::test]
    async fn test_resolve_delivers_to_awaiter() {
        let slot = PendingSlot::new();
        let rx = slot.attach();
        assert!(slot.is_occupied());

        assert!(slot.resolve(Envelope::new("ok", "")));
        assert_eq!(rx.await.unwrap().unwrap().kind(), "ok");
        assert!(!slot.is_occupied());
    }

    #[tokio::test]
    async fn test_attach_supersedes_previous() {
        let slot = PendingSlot::new();
        let first = slot.attach();
        let second = slot.attach();

        assert!(matches!(first.await.unwrap(), Err(SessionError::Superseded)));

        slot.resolve(Envelope::new("reply", ""));
        assert_eq!(second.await.unwrap().unwrap().kind(), "reply");
    }

    #[test]
    fn test_unmatched_envelope_is_dropped() {
        let slot = PendingSlot::new();
        assert!(!slot.resolve(Envelope::new("stray", "")));
        assert!(!slot.is_occupied());
    }

    #[tokio::test]
    async fn test_fail_releases_awaiter() {
        let slot = PendingSlot::new();
        let rx = slot.attach();
        assert!(slot.fail(SessionError::Transport(TransportError::Closed)));
        assert!(matches!(
            rx.await.unwrap(),
            Err(SessionError::Transport(TransportError::Closed))
        ));
        assert!(!slot.fail(SessionError::Superseded));
    }
}
