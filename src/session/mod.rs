//! Stream session
//!
//! A [`StreamSession`] owns one main stream and one heartbeat stream for a
//! single client identity (engine type + [`SessionToken`]). Each stream has a
//! reader task that resolves the stream's [`PendingSlot`]; the heartbeat task
//! keeps the session alive while it is connected.
//!
//! Sessions are built and replaced by the
//! [`SessionSupervisor`](crate::supervisor::SessionSupervisor); a session
//! never reconnects by itself.

mod heartbeat;
mod reader;
mod slot;
mod state;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, trace};

use crate::config::SessionConfig;
use crate::envelope::{Envelope, FRESH_SESSION};
use crate::error::{SessionError, SessionResult, TransportError};
use crate::transport::{EnvelopeSink, Transport};

pub use slot::PendingSlot;
pub use state::{ConnectionState, SessionEvent, SessionStatus, SessionToken, StreamKind};

/// Buffered events per subscriber
const EVENT_CAPACITY: usize = 32;

/// State and event publication shared with the background tasks
pub(crate) struct Signals {
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<SessionEvent>,
    closing: AtomicBool,
}

impl Signals {
    fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state,
            events,
            closing: AtomicBool::new(false),
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    /// Connecting/Connected -> Disconnected; never overrides a close in progress
    pub(crate) fn mark_disconnected(&self) -> bool {
        self.state.send_if_modified(|state| {
            if state.accepts_requests() {
                *state = ConnectionState::Disconnected;
                true
            } else {
                false
            }
        })
    }

    /// Connecting -> Connected
    fn mark_connected(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == ConnectionState::Connecting {
                *state = ConnectionState::Connected;
                true
            } else {
                false
            }
        })
    }

    pub(crate) fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Broadcast an event unless the session is shutting down
    pub(crate) fn publish(&self, event: SessionEvent) {
        if !self.is_closing() {
            let _ = self.events.send(event);
        }
    }
}

/// Write half and response slot of one session stream
pub(crate) struct StreamHalf {
    kind: StreamKind,
    sink: Mutex<Option<Box<dyn EnvelopeSink>>>,
    slot: PendingSlot,
}

impl StreamHalf {
    fn new(kind: StreamKind) -> Self {
        Self {
            kind,
            sink: Mutex::new(None),
            slot: PendingSlot::new(),
        }
    }

    pub(crate) fn kind(&self) -> StreamKind {
        self.kind
    }

    pub(crate) fn slot(&self) -> &PendingSlot {
        &self.slot
    }

    async fn install(&self, sink: Box<dyn EnvelopeSink>) {
        *self.sink.lock().await = Some(sink);
    }

    pub(crate) async fn write(&self, envelope: Envelope) -> SessionResult<()> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(TransportError::Closed)?;
        sink.send(envelope).await?;
        Ok(())
    }

    /// Attach an awaiter, write `envelope`, and wait for the next inbound
    /// envelope on this stream
    async fn exchange(&self, envelope: Envelope, deadline: Duration) -> SessionResult<Envelope> {
        let response = self.slot.attach();
        self.write(envelope).await?;

        match timeout(deadline, response).await {
            Ok(Ok(result)) => result,
            // Awaiter dropped without a verdict: the session was torn down
            Ok(Err(_)) => Err(TransportError::Closed.into()),
            Err(_) => Err(SessionError::Timeout(deadline)),
        }
    }

    /// Half-close gracefully, falling back to a hard abort
    async fn shutdown(&self) {
        let Some(mut sink) = self.sink.lock().await.take() else {
            return;
        };
        if let Err(e) = sink.close().await {
            debug!(stream = %self.kind, "Graceful close failed ({}), aborting", e);
            sink.abort();
        }
    }
}

#[derive(Default)]
struct Tasks {
    readers: Vec<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
}

/// One logical client session over two duplex streams
pub struct StreamSession {
    token: SessionToken,
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    signals: Arc<Signals>,
    main: Arc<StreamHalf>,
    heartbeat: Arc<StreamHalf>,
    status: OnceLock<SessionStatus>,
    tasks: Arc<Mutex<Tasks>>,
    started: AtomicBool,
}

impl StreamSession {
    pub fn new(token: SessionToken, config: SessionConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            token,
            config,
            transport,
            signals: Arc::new(Signals::new()),
            main: Arc::new(StreamHalf::new(StreamKind::Main)),
            heartbeat: Arc::new(StreamHalf::new(StreamKind::Heartbeat)),
            status: OnceLock::new(),
            tasks: Arc::new(Mutex::new(Tasks::default())),
            started: AtomicBool::new(false),
        }
    }

    /// Open both streams, handshake, start heartbeats and initialize the engine.
    ///
    /// A session connects at most once. On error the session is left
    /// Disconnected and should be closed by the caller.
    pub async fn connect(&self) -> SessionResult<()> {
        if self.state() == ConnectionState::Connected {
            return Ok(());
        }
        if self.signals.is_closing() || self.started.swap(true, Ordering::SeqCst) {
            return Err(SessionError::NotConnected(self.state()));
        }

        let result = self.establish().await;
        if result.is_err() {
            self.signals.mark_disconnected();
        }
        result
    }

    async fn establish(&self) -> SessionResult<()> {
        self.signals.set(ConnectionState::Connecting);
        info!(engine = %self.config.engine, token = %self.token, "Connecting session");

        let main = self.transport.open().await?;
        let heartbeat = self.transport.open().await?;

        self.main.install(main.sink).await;
        self.heartbeat.install(heartbeat.sink).await;
        {
            let mut tasks = self.tasks.lock().await;
            tasks.readers.push(reader::spawn(
                Arc::clone(&self.main),
                main.inbound,
                Arc::clone(&self.signals),
            ));
            tasks.readers.push(reader::spawn(
                Arc::clone(&self.heartbeat),
                heartbeat.inbound,
                Arc::clone(&self.signals),
            ));
        }

        let hello = Envelope::hello(&self.config.engine, &self.token);
        let reply = self
            .main
            .exchange(hello, self.config.handshake_timeout)
            .await
            .map_err(|e| match e {
                SessionError::Timeout(after) => SessionError::HandshakeTimeout(after),
                other => other,
            })?;

        let status = if reply.kind() == FRESH_SESSION {
            SessionStatus::Fresh
        } else {
            SessionStatus::Resumed
        };
        let _ = self.status.set(status);
        info!(token = %self.token, ?status, "Handshake complete");

        self.heartbeat.write(Envelope::heartbeat(&self.token)).await?;

        if !self.signals.mark_connected() {
            return Err(SessionError::NotConnected(self.state()));
        }
        self.tasks.lock().await.heartbeat = Some(heartbeat::spawn(
            Arc::clone(&self.heartbeat),
            self.token.clone(),
            self.config.heartbeat_interval,
            Arc::clone(&self.signals),
        ));

        let init = Envelope::init_engine(&self.config.user_code)?;
        self.main.exchange(init, self.config.request_timeout).await?;
        debug!(engine = %self.config.engine, "Engine initialized");

        Ok(())
    }

    /// Send one request on the main stream and await its response.
    ///
    /// Only one request may be outstanding; a second call supersedes the first.
    pub async fn send_receive(&self, envelope: Envelope) -> SessionResult<Envelope> {
        self.ensure_accepting()?;
        trace!(kind = envelope.kind(), "Sending request");
        self.main.exchange(envelope, self.config.request_timeout).await
    }

    /// Round-trip a heartbeat on the keepalive stream
    pub async fn ping(&self) -> SessionResult<Envelope> {
        self.ensure_accepting()?;
        self.heartbeat
            .exchange(Envelope::heartbeat(&self.token), self.config.request_timeout)
            .await
    }

    fn ensure_accepting(&self) -> SessionResult<()> {
        let state = self.state();
        if state.accepts_requests() {
            Ok(())
        } else {
            Err(SessionError::NotConnected(state))
        }
    }

    /// Stop heartbeats, close both streams and stop the readers.
    ///
    /// Teardown runs on its own task, so it completes even if the caller's
    /// future is dropped. Every call, including repeated ones, waits for the
    /// session to reach Closed.
    pub async fn close(&self) {
        if !self.signals.closing.swap(true, Ordering::SeqCst) {
            self.signals.set(ConnectionState::Disconnected);
            tokio::spawn(teardown(
                self.token.clone(),
                Arc::clone(&self.signals),
                [Arc::clone(&self.main), Arc::clone(&self.heartbeat)],
                Arc::clone(&self.tasks),
            ));
        }

        let mut changes = self.state_changes();
        let _ = changes.wait_for(|s| *s == ConnectionState::Closed).await;
    }

    pub fn state(&self) -> ConnectionState {
        self.signals.state()
    }

    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    pub fn engine(&self) -> &str {
        &self.config.engine
    }

    /// Handshake outcome, once the handshake has completed
    pub fn status(&self) -> Option<SessionStatus> {
        self.status.get().copied()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Receive reader and heartbeat events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.signals.events.subscribe()
    }

    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.signals.state.subscribe()
    }
}

async fn teardown(
    token: SessionToken,
    signals: Arc<Signals>,
    halves: [Arc<StreamHalf>; 2],
    tasks: Arc<Mutex<Tasks>>,
) {
    let (heartbeat, readers) = {
        let mut tasks = tasks.lock().await;
        (tasks.heartbeat.take(), std::mem::take(&mut tasks.readers))
    };
    if let Some(task) = heartbeat {
        task.abort();
        let _ = task.await;
    }

    signals.set(ConnectionState::Closing);
    for half in &halves {
        half.shutdown().await;
    }

    for reader in readers {
        reader.abort();
        let _ = reader.await;
    }
    for half in &halves {
        half.slot.fail(TransportError::Closed.into());
    }

    signals.set(ConnectionState::Closed);
    info!(token = %token, "Session closed");
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        // A running teardown owns the handles it took
        let Ok(mut tasks) = self.tasks.try_lock() else {
            return;
        };
        if let Some(task) = tasks.heartbeat.take() {
            task.abort();
        }
        for reader in tasks.readers.drain(..) {
            reader.abort();
        }
    }
}
