//! Reconnection controller
//!
//! `RealtimeClient` owns at most one session task. The task opens a
//! transport, drives it until it closes, and applies the retry policy.
//! Every state write and every publish first checks the session's
//! generation under the session lock, so a task that has been replaced or
//! disconnected can never touch state or reach subscribers again.
//!
//! Lock order is always `gate` (reentrant, held across a publish) and then
//! `session`. Subscribers may call `connect`/`disconnect` from inside a
//! callback.

use crate::core::connection_state::*;
use crate::core::registry::{SubscriberRegistry, Subscription};
use crate::traits::*;
use crossbeam_channel::Receiver;
use parking_lot::{Mutex, ReentrantMutex};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Result of a session as seen by `connect` callers
#[derive(Debug, Clone)]
enum Outcome {
    Pending,
    Opened,
    Failed(NotifyError),
}

struct Session {
    identity: Identity,
    cancel: watch::Sender<bool>,
    outcome: watch::Receiver<Outcome>,
    handle: JoinHandle<()>,
}

struct SessionSlot {
    generation: u64,
    current: Option<Session>,
    /// Task of a disconnected session that may still be closing its transport
    draining: Option<JoinHandle<()>>,
    reconnect: ReconnectState,
}

/// How a driven connection ended
enum Exit {
    Cancelled,
    Closed(DisconnectReason),
    Rejected(String),
}

pub(crate) struct Shared {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) credentials: Arc<dyn CredentialProvider>,
    pub(crate) classifier: Arc<dyn FrameClassifier>,
    pub(crate) strategy: Arc<dyn ReconnectionStrategy>,
    pub(crate) registry: SubscriberRegistry,
    pub(crate) heartbeat_timeout: Duration,
    pub(crate) connect_timeout: Duration,
    state: AtomicConnectionState,
    metrics: AtomicMetrics,
    gate: ReentrantMutex<()>,
    session: Mutex<SessionSlot>,
}

impl Shared {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialProvider>,
        classifier: Arc<dyn FrameClassifier>,
        strategy: Arc<dyn ReconnectionStrategy>,
        registry: SubscriberRegistry,
        heartbeat_timeout: Duration,
        connect_timeout: Duration,
    ) -> Self {
        let max_attempts = strategy.max_attempts();
        Self {
            transport,
            credentials,
            classifier,
            strategy,
            registry,
            heartbeat_timeout,
            connect_timeout,
            state: AtomicConnectionState::default(),
            metrics: AtomicMetrics::new(),
            gate: ReentrantMutex::new(()),
            session: Mutex::new(SessionSlot {
                generation: 0,
                current: None,
                draining: None,
                reconnect: ReconnectState::new(max_attempts),
            }),
        }
    }

    fn start(self: &Arc<Self>, identity: Identity) -> Result<watch::Receiver<Outcome>> {
        let _gate = self.gate.lock();
        let mut slot = self.session.lock();

        if let Some(current) = &slot.current {
            if current.identity == identity && self.state.get().is_live() {
                debug!(
                    "[Realtime] connect({}) joins the live session ({})",
                    identity,
                    self.state.get()
                );
                return Ok(current.outcome.clone());
            }
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            NotifyError::Configuration("connect must be called inside a tokio runtime".to_string())
        })?;

        let mut replaced = None;
        let previous = match slot.current.take() {
            Some(old) => {
                let _ = old.cancel.send(true);
                if old.identity != identity && self.state.get().is_live() {
                    info!(
                        "[Realtime] Identity changed {} -> {}, closing previous session",
                        old.identity, identity
                    );
                    self.state.set(ConnectionState::Closing);
                    replaced = Some(old.identity);
                }
                Some(old.handle)
            }
            None => slot.draining.take(),
        };

        slot.generation += 1;
        let generation = slot.generation;
        slot.reconnect = ReconnectState::new(self.strategy.max_attempts());

        self.state.set(ConnectionState::Connecting);

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (outcome_tx, outcome_rx) = watch::channel(Outcome::Pending);

        let handle = runtime.spawn(Arc::clone(self).run(
            identity.clone(),
            generation,
            previous,
            cancel_rx,
            outcome_tx,
        ));

        info!("[Realtime] Connecting as {} via {}", identity, self.transport.name());
        slot.current = Some(Session {
            identity,
            cancel: cancel_tx,
            outcome: outcome_rx.clone(),
            handle,
        });
        drop(slot);

        if let Some(old_identity) = replaced {
            self.registry.publish(&ClassifiedEvent::ConnectionClosed {
                identity: old_identity,
                reason: DisconnectReason::IdentityChanged,
                retry_in: None,
            });
        }

        Ok(outcome_rx)
    }

    fn stop(&self) {
        let _gate = self.gate.lock();
        let mut slot = self.session.lock();

        slot.generation += 1;
        // No retry budget until the next connect
        slot.reconnect = ReconnectState::new(0);

        let Some(session) = slot.current.take() else {
            self.state.set(ConnectionState::ClosedTerminal);
            return;
        };

        let previous = self.state.replace(ConnectionState::Closing);
        let _ = session.cancel.send(true);
        slot.draining = Some(session.handle);
        self.state.set(ConnectionState::ClosedTerminal);
        drop(slot);

        if previous != ConnectionState::ClosedTerminal {
            info!("[Realtime] Disconnected {}", session.identity);
            self.registry.publish(&ClassifiedEvent::ConnectionClosed {
                identity: session.identity,
                reason: DisconnectReason::Requested,
                retry_in: None,
            });
        }
    }

    /// Cancel the session without publishing: the client is going away
    fn abandon(&self) {
        let mut slot = self.session.lock();
        slot.generation += 1;
        if let Some(session) = slot.current.take() {
            let _ = session.cancel.send(true);
            self.state.set(ConnectionState::ClosedTerminal);
        }
    }

    async fn run(
        self: Arc<Self>,
        identity: Identity,
        generation: u64,
        previous: Option<JoinHandle<()>>,
        mut cancel: watch::Receiver<bool>,
        outcome: watch::Sender<Outcome>,
    ) {
        if let Some(previous) = previous {
            let _ = previous.await;
        }

        loop {
            if !self.set_state(generation, ConnectionState::Connecting) {
                return;
            }

            let opened = tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => return,
                opened = self.open(&identity) => opened,
            };

            let reason = match opened {
                Ok(mut connection) => {
                    if !self.on_open(generation, &identity, &outcome) {
                        self.close(connection.as_mut()).await;
                        return;
                    }
                    let exit = self.drive(connection.as_mut(), generation, &mut cancel).await;
                    self.close(connection.as_mut()).await;
                    drop(connection);

                    match exit {
                        Exit::Cancelled => return,
                        Exit::Rejected(message) => {
                            self.on_rejected(generation, &identity, message, &outcome);
                            return;
                        }
                        Exit::Closed(reason) => reason,
                    }
                }
                Err(NotifyError::AuthenticationFailure(message)) => {
                    self.on_rejected(generation, &identity, message, &outcome);
                    return;
                }
                Err(e) if !e.is_retryable() => {
                    self.on_fatal(generation, &identity, e, &outcome);
                    return;
                }
                Err(e) => {
                    warn!("[Realtime] Failed to open {} transport: {}", self.transport.name(), e);
                    DisconnectReason::from_error(&e)
                }
            };

            let Some(delay) = self.schedule_retry(generation, &identity, reason, &outcome) else {
                return;
            };

            tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn open(&self, identity: &Identity) -> Result<Box<dyn Connection>> {
        let credential = self.credentials.credential(identity).await?.ok_or_else(|| {
            NotifyError::AuthenticationFailure(format!("no credential available for {}", identity))
        })?;

        let request = OpenRequest {
            identity: identity.clone(),
            credential,
        };

        match tokio::time::timeout(self.connect_timeout, self.transport.open(&request)).await {
            Ok(result) => result,
            Err(_) => Err(NotifyError::Timeout(format!(
                "{} open did not complete within {:?}",
                self.transport.name(),
                self.connect_timeout
            ))),
        }
    }

    async fn drive(
        &self,
        connection: &mut dyn Connection,
        generation: u64,
        cancel: &mut watch::Receiver<bool>,
    ) -> Exit {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancelled(cancel) => return Exit::Cancelled,
                next = tokio::time::timeout(self.heartbeat_timeout, connection.next_frame()) => next,
            };

            let frame = match next {
                Err(_) => {
                    warn!(
                        "[Realtime] No frame for {:?}, treating connection as dead",
                        self.heartbeat_timeout
                    );
                    return Exit::Closed(DisconnectReason::LivenessTimeout(self.heartbeat_timeout));
                }
                Ok(None) => {
                    info!("[Realtime] Stream ended by peer");
                    return Exit::Closed(DisconnectReason::StreamEnded);
                }
                Ok(Some(Err(NotifyError::AuthenticationFailure(message)))) => {
                    return Exit::Rejected(message);
                }
                Ok(Some(Err(e))) => {
                    warn!("[Realtime] Connection error: {}", e);
                    return Exit::Closed(DisconnectReason::from_error(&e));
                }
                Ok(Some(Ok(frame))) => frame,
            };

            self.metrics.increment_received();

            match self.classifier.classify(&frame) {
                Classification::KeepAlive => {
                    trace!("[Realtime] Keep-alive on '{}'", frame.event);
                }
                Classification::Init => {
                    debug!("[Realtime] Init frame dropped: {}", frame.data.trim());
                }
                Classification::Malformed(e) => {
                    self.metrics.increment_dropped();
                    warn!("[Realtime] Dropping frame on '{}': {}", frame.event, e);
                }
                Classification::Event(event) => {
                    debug!("[Realtime] {} on '{}'", event.kind(), frame.event);
                    if !self.publish_current(generation, &event) {
                        return Exit::Cancelled;
                    }
                    if event.as_notification().is_some() {
                        self.metrics.increment_published();
                    }
                }
            }
        }
    }

    async fn close(&self, connection: &mut dyn Connection) {
        if tokio::time::timeout(self.connect_timeout, connection.close())
            .await
            .is_err()
        {
            debug!("[Realtime] Transport close timed out, dropping it");
        }
    }

    fn set_state(&self, generation: u64, state: ConnectionState) -> bool {
        let slot = self.session.lock();
        if slot.generation != generation {
            return false;
        }
        self.state.set(state);
        true
    }

    fn publish_current(&self, generation: u64, event: &ClassifiedEvent) -> bool {
        let _gate = self.gate.lock();
        if self.session.lock().generation != generation {
            return false;
        }
        self.registry.publish(event);
        true
    }

    fn on_open(&self, generation: u64, identity: &Identity, outcome: &watch::Sender<Outcome>) -> bool {
        let _gate = self.gate.lock();
        {
            let mut slot = self.session.lock();
            if slot.generation != generation {
                return false;
            }
            slot.reconnect.reset();
            self.state.set(ConnectionState::Open);
        }

        self.metrics.increment_opened();
        outcome.send_replace(Outcome::Opened);
        info!("[Realtime] Connected as {} via {}", identity, self.transport.name());
        self.registry.publish(&ClassifiedEvent::ConnectionEstablished {
            identity: identity.clone(),
        });
        true
    }

    /// Apply the retry policy after a close. Returns the delay to wait, or
    /// `None` when the session is over.
    fn schedule_retry(
        &self,
        generation: u64,
        identity: &Identity,
        reason: DisconnectReason,
        outcome: &watch::Sender<Outcome>,
    ) -> Option<Duration> {
        let _gate = self.gate.lock();
        let mut slot = self.session.lock();
        if slot.generation != generation {
            return None;
        }

        let attempt = slot.reconnect.attempt_count;
        if let Some(delay) = self.strategy.next_delay(attempt) {
            slot.reconnect.attempt_count = attempt + 1;
            slot.reconnect.next_delay = Some(delay);
            self.state.set(ConnectionState::ClosedRetrying);
            drop(slot);

            self.metrics.increment_reconnects();
            outcome.send_replace(Outcome::Pending);
            warn!(
                "[Realtime] Connection closed ({}), retry {}/{} in {:?}",
                reason,
                attempt + 1,
                self.strategy.max_attempts(),
                delay
            );
            self.registry.publish(&ClassifiedEvent::ConnectionClosed {
                identity: identity.clone(),
                reason,
                retry_in: Some(delay),
            });
            return Some(delay);
        }

        slot.reconnect.next_delay = None;
        self.state.set(ConnectionState::ClosedTerminal);
        drop(slot);

        let error = NotifyError::MaxRetriesExceeded {
            attempts: attempt,
            reason: reason.to_string(),
        };
        error!("[Realtime] {}", error);
        outcome.send_replace(Outcome::Failed(error.clone()));
        self.registry.publish(&ClassifiedEvent::ConnectionClosed {
            identity: identity.clone(),
            reason,
            retry_in: None,
        });
        self.registry.publish(&ClassifiedEvent::FatalError {
            identity: identity.clone(),
            error,
        });
        None
    }

    fn on_rejected(
        &self,
        generation: u64,
        identity: &Identity,
        message: String,
        outcome: &watch::Sender<Outcome>,
    ) {
        let _gate = self.gate.lock();
        {
            let mut slot = self.session.lock();
            if slot.generation != generation {
                return;
            }
            slot.reconnect.next_delay = None;
            self.state.set(ConnectionState::ClosedTerminal);
        }

        error!("[Realtime] Authentication failed for {}: {}", identity, message);
        outcome.send_replace(Outcome::Failed(NotifyError::AuthenticationFailure(message.clone())));
        self.registry.publish(&ClassifiedEvent::AuthError {
            identity: identity.clone(),
            message,
        });
    }

    fn on_fatal(
        &self,
        generation: u64,
        identity: &Identity,
        error: NotifyError,
        outcome: &watch::Sender<Outcome>,
    ) {
        let _gate = self.gate.lock();
        {
            let mut slot = self.session.lock();
            if slot.generation != generation {
                return;
            }
            slot.reconnect.next_delay = None;
            self.state.set(ConnectionState::ClosedTerminal);
        }

        error!("[Realtime] Giving up on {}: {}", identity, error);
        outcome.send_replace(Outcome::Failed(error.clone()));
        self.registry.publish(&ClassifiedEvent::FatalError {
            identity: identity.clone(),
            error,
        });
    }
}

/// Resolves once the session is cancelled (or its cancel handle is gone)
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            return;
        }
    }
}

async fn wait_for_outcome(mut outcome: watch::Receiver<Outcome>) -> Result<()> {
    loop {
        let current = outcome.borrow_and_update().clone();
        match current {
            Outcome::Opened => return Ok(()),
            Outcome::Failed(e) => return Err(e),
            Outcome::Pending => {}
        }
        if outcome.changed().await.is_err() {
            let last = outcome.borrow().clone();
            return match last {
                Outcome::Opened => Ok(()),
                Outcome::Failed(e) => Err(e),
                Outcome::Pending => Err(NotifyError::Cancelled(
                    "session ended before the connection opened".to_string(),
                )),
            };
        }
    }
}

/// Realtime notification client
///
/// One instance holds one authoritative connection state. Build it with
/// [`RealtimeClientBuilder`](crate::core::builder::RealtimeClientBuilder).
/// Dropping the client cancels its session.
pub struct RealtimeClient {
    shared: Arc<Shared>,
}

impl RealtimeClient {
    pub(crate) fn from_shared(shared: Shared) -> Self {
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Open the realtime channel for `identity`
    ///
    /// Side effects happen immediately; the returned future only reports the
    /// outcome and need not be awaited for the session to run. It resolves
    /// `Ok(())` once the channel is open and `Err` when the session fails for
    /// good (rejected credential, retries exhausted) or is cancelled by
    /// `disconnect` or an identity switch.
    ///
    /// Calling `connect` again for the identity of a live session (open,
    /// connecting or waiting to retry) does nothing but join that session.
    /// Calling it for another identity closes the current session first.
    pub fn connect(
        &self,
        identity: impl Into<Identity>,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        let started = self.shared.start(identity.into());
        async move {
            match started {
                Ok(outcome) => wait_for_outcome(outcome).await,
                Err(e) => Err(e),
            }
        }
    }

    /// Close the channel and cancel any pending retry
    ///
    /// Emits `ConnectionClosed` with reason `Requested` when a session was
    /// live. No further attempt happens until the next `connect`.
    pub fn disconnect(&self) {
        self.shared.stop();
    }

    /// Register an event callback
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ClassifiedEvent) -> Result<()> + Send + Sync + 'static,
    {
        self.shared.registry.subscribe(callback)
    }

    /// Receive events through a channel instead of a callback
    pub fn subscribe_channel(&self) -> Receiver<ClassifiedEvent> {
        self.shared.registry.subscribe_channel()
    }

    pub fn registry(&self) -> &SubscriberRegistry {
        &self.shared.registry
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state.get()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state.is_open()
    }

    /// Identity of the current session, cleared by `disconnect`
    pub fn identity(&self) -> Option<Identity> {
        self.shared
            .session
            .lock()
            .current
            .as_ref()
            .map(|session| session.identity.clone())
    }

    pub fn reconnect_state(&self) -> ReconnectState {
        self.shared.session.lock().reconnect
    }

    pub fn metrics(&self) -> Metrics {
        self.shared.metrics.snapshot(self.shared.state.get())
    }

    pub fn transport_name(&self) -> &'static str {
        self.shared.transport.name()
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        self.shared.abandon();
    }
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("transport", &self.shared.transport.name())
            .field("state", &self.state())
            .field("identity", &self.identity())
            .finish()
    }
}
