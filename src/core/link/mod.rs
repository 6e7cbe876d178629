// src/core/link/mod.rs

//! The connection lifecycle manager.
//!
//! A `ConnectionManager` owns at most one live store connection, at most one
//! in-flight connection attempt, and the last error that has not been
//! superseded by a successful connect. Callers:
//!
//! - `connect` to start (or join) an attempt,
//! - `get_client` to obtain the live `StoreHandle` without waiting,
//! - `disconnect` to shut the connection down gracefully.
//!
//! Concurrent `connect` calls converge on a single shared future, so only one
//! handshake ever runs at a time. The attempt itself and the graceful quit run
//! in spawned tasks: a caller that stops awaiting does not abort the I/O, and
//! the outcome still lands in the shared state.

use crate::config::ConnectOptions;
use crate::core::LinkError;
use crate::core::client::{ClientEvent, EventSink, RespConnector, StoreConnector};
use crate::core::handle::StoreHandle;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

pub mod state;

pub use state::{ConnectAttempt, LinkStatus};
use state::{LinkState, PendingAttempt};

struct ManagerInner {
    connector: Box<dyn StoreConnector>,
    state: Mutex<LinkState>,
    next_session_id: AtomicU64,
}

/// Owns the single logical connection to the store.
///
/// Cloning yields another handle onto the same manager. Separate instances are
/// fully independent, which keeps tests isolated from one another.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::resp()
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("status", &self.status())
            .finish()
    }
}

impl ConnectionManager {
    /// Creates a manager that builds its clients with `connector`.
    pub fn new(connector: impl StoreConnector) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                connector: Box::new(connector),
                state: Mutex::new(LinkState::default()),
                next_session_id: AtomicU64::new(1),
            }),
        }
    }

    /// Creates a manager that talks RESP over TCP.
    pub fn resp() -> Self {
        Self::new(RespConnector)
    }

    /// Starts a connection attempt, or joins the one already in flight.
    ///
    /// Returns an already-resolved future when a live connection exists. A
    /// bare `&str`/`String` is taken as a connection URL, and
    /// `ConnectOptions::default()` uses the client defaults. Every caller that
    /// joins the same attempt observes the same outcome.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(&self, options: impl Into<ConnectOptions>) -> ConnectAttempt {
        let mut state = self.inner.state.lock();

        if state.open_handle().is_some() {
            return futures::future::ready(Ok(())).boxed().shared();
        }

        if let Some(attempt) = &state.pending {
            debug!(
                "Joining in-flight connection attempt (session {}).",
                attempt.session_id
            );
            return attempt.future.clone();
        }

        state.last_error = None;
        let session_id = self.inner.next_session_id.fetch_add(1, Ordering::Relaxed);
        let future = self.inner.spawn_attempt(session_id, options.into());
        state.pending = Some(PendingAttempt {
            session_id,
            future: future.clone(),
        });
        future
    }

    /// Returns the live handle without waiting.
    ///
    /// Fails with `Unavailable` once an attempt has failed or the connection
    /// dropped, `StillConnecting` while an attempt is in flight, and
    /// `NotConnected` otherwise. Never starts a connection.
    pub fn get_client(&self) -> Result<StoreHandle, LinkError> {
        let state = self.inner.state.lock();
        if let Some(handle) = state.open_handle() {
            return Ok(handle.clone());
        }
        if let Some(err) = &state.last_error {
            return Err(LinkError::Unavailable(Arc::new(err.clone())));
        }
        if state.pending.is_some() {
            return Err(LinkError::StillConnecting);
        }
        Err(LinkError::NotConnected)
    }

    /// Gracefully closes the live connection, if there is one.
    ///
    /// Any in-flight attempt is forgotten immediately; if it later succeeds it
    /// still publishes its handle. The live handle is unpublished before the
    /// quit starts, so a `connect` issued meanwhile opens a fresh connection.
    /// Disconnecting while nothing is connected is a successful no-op that
    /// also clears the recorded error.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn disconnect(&self) -> BoxFuture<'static, Result<(), LinkError>> {
        let captured = {
            let mut state = self.inner.state.lock();
            state.pending = None;
            match state.active.take().filter(StoreHandle::is_open) {
                Some(handle) => handle,
                None => {
                    state.last_error = None;
                    return futures::future::ready(Ok(())).boxed();
                }
            }
        };

        let inner = self.inner.clone();
        let task = tokio::spawn(async move { inner.finish_disconnect(captured).await });
        async move {
            task.await
                .map_err(|e| LinkError::Internal(format!("disconnect task failed: {e}")))?
        }
        .boxed()
    }

    pub fn status(&self) -> LinkStatus {
        self.inner.state.lock().status()
    }

    /// The error currently explaining why no connection is available.
    pub fn last_error(&self) -> Option<LinkError> {
        self.inner.state.lock().last_error.clone()
    }
}

impl ManagerInner {
    /// Spawns the attempt task and wraps its join handle in a shared future.
    ///
    /// Called with the state lock held; the task itself only takes the lock
    /// after the handshake settles.
    fn spawn_attempt(self: &Arc<Self>, session_id: u64, options: ConnectOptions) -> ConnectAttempt {
        info!("Starting store connection attempt (session {session_id}).");
        let inner = self.clone();
        let task = tokio::spawn(async move { inner.run_attempt(session_id, options).await });

        async move {
            task.await
                .map_err(|e| LinkError::Internal(format!("connection attempt task failed: {e}")))?
        }
        .boxed()
        .shared()
    }

    async fn run_attempt(
        self: Arc<Self>,
        session_id: u64,
        options: ConnectOptions,
    ) -> Result<(), LinkError> {
        let events = self.event_sink(session_id);
        let client = match self.connector.create(&options, events) {
            Ok(client) => client,
            Err(e) => return Err(self.state.lock().fail_attempt(session_id, e)),
        };

        if let Err(e) = client.connect().await {
            return Err(self.state.lock().fail_attempt(session_id, e));
        }

        let handle = StoreHandle::new(client, session_id);
        let replaced = {
            let mut state = self.state.lock();
            // The connection may already have dropped between the handshake
            // and this point; its End event found nothing to clear.
            if !handle.is_open() {
                return Err(state.fail_attempt(session_id, LinkError::ConnectionClosed));
            }
            state.complete_attempt(handle)
        };
        info!("Store connection ready (session {session_id}).");

        if let Some(previous) = replaced {
            retire(previous);
        }
        Ok(())
    }

    /// Builds the event sink for one session. It holds the manager weakly so a
    /// client outliving its manager does not keep it alive.
    fn event_sink(self: &Arc<Self>, session_id: u64) -> EventSink {
        let manager: Weak<ManagerInner> = Arc::downgrade(self);
        Arc::new(move |event: ClientEvent| {
            if let Some(inner) = manager.upgrade() {
                inner.state.lock().apply_event(session_id, event);
            }
        })
    }

    async fn finish_disconnect(&self, handle: StoreHandle) -> Result<(), LinkError> {
        let session_id = handle.session_id();
        debug!("Disconnecting store connection (session {session_id}).");

        match handle.client().quit().await {
            Ok(()) => {
                self.state.lock().complete_disconnect(session_id);
                info!("Store connection closed (session {session_id}).");
                Ok(())
            }
            Err(e) => {
                warn!("Graceful disconnect failed (session {session_id}): {e}");
                Err(self.state.lock().fail_disconnect(session_id, e))
            }
        }
    }
}

/// Closes a handle that a newer session replaced, so only one connection stays
/// open.
fn retire(previous: StoreHandle) {
    warn!(
        "Session {} replaced by a newer connection; closing it.",
        previous.session_id()
    );
    tokio::spawn(async move {
        if let Err(e) = previous.client().quit().await {
            debug!(
                "Closing superseded session {} failed: {e}",
                previous.session_id()
            );
        }
    });
}
