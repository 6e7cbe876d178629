// src/core/link/state.rs

//! The lifecycle state shared by every caller of one `ConnectionManager`, and
//! the transitions applied to it.
//!
//! All mutation goes through the methods below while the manager's mutex is
//! held. Each transition carries the session id of the attempt it concerns and
//! only touches the `active` or `pending` slot when that slot still belongs to
//! the same session, so a late event or settlement from a superseded client
//! cannot clobber a newer one.

use crate::core::LinkError;
use crate::core::client::ClientEvent;
use crate::core::handle::StoreHandle;
use futures::future::{BoxFuture, Shared};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The future shared by every caller of one connection attempt.
pub type ConnectAttempt = Shared<BoxFuture<'static, Result<(), LinkError>>>;

/// Coarse view of the manager's state, with the same precedence `get_client`
/// uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// A live handle is published.
    Ready,
    /// An attempt is in flight and nothing has failed yet.
    Connecting,
    /// The last attempt failed or the connection dropped unexpectedly.
    Failed,
    /// Never connected, or cleanly disconnected.
    Disconnected,
}

/// A connection attempt that has not settled yet.
pub(crate) struct PendingAttempt {
    pub(crate) session_id: u64,
    pub(crate) future: ConnectAttempt,
}

#[derive(Default)]
pub(crate) struct LinkState {
    pub(crate) active: Option<StoreHandle>,
    pub(crate) pending: Option<PendingAttempt>,
    pub(crate) last_error: Option<LinkError>,
}

impl LinkState {
    /// The published handle, if its connection is still open.
    pub(crate) fn open_handle(&self) -> Option<&StoreHandle> {
        self.active.as_ref().filter(|handle| handle.is_open())
    }

    pub(crate) fn status(&self) -> LinkStatus {
        if self.open_handle().is_some() {
            LinkStatus::Ready
        } else if self.last_error.is_some() {
            LinkStatus::Failed
        } else if self.pending.is_some() {
            LinkStatus::Connecting
        } else {
            LinkStatus::Disconnected
        }
    }

    fn is_active_session(&self, session_id: u64) -> bool {
        self.active
            .as_ref()
            .is_some_and(|handle| handle.session_id() == session_id)
    }

    fn is_pending_session(&self, session_id: u64) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|attempt| attempt.session_id == session_id)
    }

    /// Clears `active` if it still belongs to `session_id`. Returns whether it did.
    pub(crate) fn clear_active_if(&mut self, session_id: u64) -> bool {
        if self.is_active_session(session_id) {
            self.active = None;
            true
        } else {
            false
        }
    }

    /// Clears `pending` if it still holds the attempt for `session_id`.
    pub(crate) fn clear_pending_if(&mut self, session_id: u64) {
        if self.is_pending_session(session_id) {
            self.pending = None;
        }
    }

    /// Reacts to one notification from the client created for `session_id`.
    pub(crate) fn apply_event(&mut self, session_id: u64, event: ClientEvent) {
        let is_current = self.is_active_session(session_id) || self.is_pending_session(session_id);

        match event {
            ClientEvent::Error(err) => {
                if !is_current {
                    debug!("Ignoring error from superseded session {session_id}: {err}");
                    return;
                }
                warn!("Store client error on session {session_id}: {err}");
                self.clear_active_if(session_id);
                self.last_error = Some(err);
            }
            ClientEvent::Connect => {
                debug!("Session {session_id}: transport connected.");
            }
            ClientEvent::Ready => {
                debug!("Session {session_id}: handshake complete.");
            }
            ClientEvent::End => {
                let was_active = self.clear_active_if(session_id);
                self.clear_pending_if(session_id);
                if was_active {
                    info!("Store connection for session {session_id} ended.");
                    // A more specific error recorded earlier wins.
                    if self.last_error.is_none() {
                        self.last_error = Some(LinkError::ConnectionClosed);
                    }
                } else {
                    debug!("Session {session_id}: connection ended.");
                }
            }
        }
    }

    /// Publishes the handle of a successful attempt. Returns the handle it
    /// replaced, if that belonged to a different session.
    pub(crate) fn complete_attempt(&mut self, handle: StoreHandle) -> Option<StoreHandle> {
        let session_id = handle.session_id();
        let replaced = self
            .active
            .replace(handle)
            .filter(|previous| previous.session_id() != session_id);
        self.last_error = None;
        self.clear_pending_if(session_id);
        replaced
    }

    /// Records the failure of the attempt for `session_id` and returns the
    /// error its callers should see.
    pub(crate) fn fail_attempt(&mut self, session_id: u64, cause: LinkError) -> LinkError {
        let err = match cause {
            already @ LinkError::ConnectFailure(_) => already,
            other => LinkError::ConnectFailure(Arc::new(other)),
        };
        self.clear_active_if(session_id);
        // Once a newer attempt owns the slot, this failure says nothing about it.
        if self.pending.is_none() || self.is_pending_session(session_id) {
            self.last_error = Some(err.clone());
        }
        self.clear_pending_if(session_id);
        err
    }

    /// Settles a graceful quit of `session_id` that succeeded.
    ///
    /// An error tagged as a disconnection survives. Once a newer session is
    /// active or pending, the error slot is left to that session.
    pub(crate) fn complete_disconnect(&mut self, session_id: u64) {
        self.clear_active_if(session_id);
        if self.active.is_some() || self.pending.is_some() {
            return;
        }
        if !self
            .last_error
            .as_ref()
            .is_some_and(LinkError::is_disconnection)
        {
            self.last_error = None;
        }
    }

    /// Records a failed graceful quit of `session_id` and returns the error
    /// its caller should see.
    pub(crate) fn fail_disconnect(&mut self, session_id: u64, cause: LinkError) -> LinkError {
        let err = LinkError::DisconnectFailure(Arc::new(cause));
        self.clear_active_if(session_id);
        self.last_error = Some(err.clone());
        err
    }
}
