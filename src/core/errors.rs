// src/core/errors.rs

//! Defines the primary error type for the whole library.

use std::sync::Arc;
use thiserror::Error;

/// Every failure the connection manager, the store client, or the structured
/// value codec can surface.
///
/// The enum is `Clone` so a single attempt outcome can be handed to every
/// caller awaiting the same shared connect future. Causes are kept behind an
/// `Arc` so cloning stays cheap.
#[derive(Error, Debug, Clone)]
pub enum LinkError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Incomplete data in stream")]
    IncompleteData,

    #[error("Syntax error")]
    SyntaxError,

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The store answered with a RESP error reply.
    #[error("Server error: {0}")]
    Server(String),

    #[error("Unexpected reply to '{command}': {reply}")]
    UnexpectedReply { command: String, reply: String },

    #[error("Timed out while {0}")]
    Timeout(String),

    #[error("Invalid connection options: {0}")]
    InvalidConfig(String),

    /// A command was issued on a client whose connection has already ended.
    #[error("The client is closed")]
    ClientClosed,

    /// An established connection ended without being asked to.
    #[error("Store connection closed")]
    ConnectionClosed,

    // --- Lifecycle errors surfaced by `ConnectionManager::get_client` ---
    #[error("Store client is not connected. Call connect() first.")]
    NotConnected,

    #[error("Store client is still connecting. Await connect() before calling get_client().")]
    StillConnecting,

    #[error("Store connection unavailable: {0}")]
    Unavailable(Arc<LinkError>),

    // --- Lifecycle phase failures ---
    #[error("Failed to connect to store: {0}")]
    ConnectFailure(Arc<LinkError>),

    #[error("Failed to disconnect from store: {0}")]
    DisconnectFailure(Arc<LinkError>),

    // --- Structured value codec ---
    #[error("Failed to serialize structured value: {0}")]
    Serialization(String),

    #[error("Failed to parse structured value: {0}")]
    Deserialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LinkError {
    /// True when this error was produced by a graceful disconnect. The manager
    /// keeps such errors when a later quit succeeds instead of erasing them.
    pub fn is_disconnection(&self) -> bool {
        matches!(self, LinkError::DisconnectFailure(_))
    }

    /// Unwraps lifecycle wrappers down to the error that started the chain.
    pub fn root_cause(&self) -> &LinkError {
        match self {
            LinkError::Unavailable(inner)
            | LinkError::ConnectFailure(inner)
            | LinkError::DisconnectFailure(inner) => inner.root_cause(),
            other => other,
        }
    }
}

// Required by `tokio_util::codec` for the encoder/decoder error type.
impl From<std::io::Error> for LinkError {
    fn from(e: std::io::Error) -> Self {
        LinkError::Io(Arc::new(e))
    }
}
