// src/core/client/mod.rs

//! The capability set the connection manager needs from an underlying store
//! client, plus the default RESP-over-TCP implementation.
//!
//! The manager never talks to a socket itself. It asks a `StoreConnector` for a
//! fresh `StoreClient`, handing over an `EventSink` through which the client
//! reports low-level errors, connection progress, and the end of the
//! connection. Everything else (framing, handshake, command round trips) is
//! the client's business.

use crate::config::ConnectOptions;
use crate::core::LinkError;
use crate::core::protocol::RespFrame;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

pub mod resp_client;

pub use resp_client::{RespClient, RespConnector};

/// Notifications a client emits over its lifetime.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A transport or protocol failure. The client may still answer commands
    /// that were already in flight.
    Error(LinkError),
    /// The transport is up; the handshake has not run yet.
    Connect,
    /// The handshake finished and commands can be issued.
    Ready,
    /// The connection is gone, whether asked for or not.
    End,
}

/// Callback registered with a client before its handshake starts.
pub type EventSink = Arc<dyn Fn(ClientEvent) + Send + Sync>;

/// Builds store clients. One is created per connection attempt.
pub trait StoreConnector: Send + Sync + 'static {
    fn create(
        &self,
        options: &ConnectOptions,
        events: EventSink,
    ) -> Result<Arc<dyn StoreClient>, LinkError>;
}

/// A single logical connection to the store.
#[async_trait]
pub trait StoreClient: Send + Sync + 'static {
    /// Opens the transport and runs the handshake.
    async fn connect(&self) -> Result<(), LinkError>;

    /// Graceful shutdown. The `End` event fires before this returns.
    async fn quit(&self) -> Result<(), LinkError>;

    fn is_open(&self) -> bool;

    /// Sends one command and returns the raw reply frame, error frames included.
    async fn execute(&self, args: Vec<Bytes>) -> Result<RespFrame, LinkError>;

    /// `GET key`. A null reply means the key is absent.
    async fn get(&self, key: &[u8]) -> Result<Option<Bytes>, LinkError> {
        let args = vec![Bytes::from_static(b"GET"), Bytes::copy_from_slice(key)];
        match self.execute(args).await? {
            RespFrame::BulkString(value) => Ok(Some(value)),
            RespFrame::Null => Ok(None),
            RespFrame::Error(msg) => Err(LinkError::Server(msg)),
            other => Err(unexpected("GET", &other)),
        }
    }

    /// `SET key value [options]`. Returns the status reply, or `None` when an
    /// NX/XX condition kept the value from being written.
    async fn set(
        &self,
        key: &[u8],
        value: Bytes,
        options: &SetOptions,
    ) -> Result<Option<String>, LinkError> {
        let mut args = vec![
            Bytes::from_static(b"SET"),
            Bytes::copy_from_slice(key),
            value,
        ];
        options.append_args(&mut args);
        match self.execute(args).await? {
            RespFrame::SimpleString(status) => Ok(Some(status)),
            RespFrame::Null => Ok(None),
            RespFrame::Error(msg) => Err(LinkError::Server(msg)),
            other => Err(unexpected("SET", &other)),
        }
    }
}

pub(crate) fn unexpected(command: &str, reply: &RespFrame) -> LinkError {
    LinkError::UnexpectedReply {
        command: command.to_string(),
        reply: reply.kind().to_string(),
    }
}

/// Expiration attached to a `SET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// `EX seconds`
    Seconds(u64),
    /// `PX milliseconds`
    Milliseconds(u64),
    /// `EXAT unix-seconds`
    UnixSeconds(u64),
    /// `PXAT unix-milliseconds`
    UnixMilliseconds(u64),
}

/// Write condition attached to a `SET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetCondition {
    /// `NX`: only write when the key does not exist.
    IfAbsent,
    /// `XX`: only write when the key already exists.
    IfPresent,
}

/// Options passed through to the store's `SET` command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOptions {
    pub expiry: Option<Expiry>,
    pub condition: Option<SetCondition>,
    pub keep_ttl: bool,
}

impl SetOptions {
    /// Expire after `ttl`, at millisecond precision.
    pub fn expire_in(ttl: Duration) -> Self {
        Self {
            expiry: Some(Expiry::Milliseconds(ttl.as_millis() as u64)),
            ..Self::default()
        }
    }

    pub fn if_absent(mut self) -> Self {
        self.condition = Some(SetCondition::IfAbsent);
        self
    }

    pub fn if_present(mut self) -> Self {
        self.condition = Some(SetCondition::IfPresent);
        self
    }

    pub fn keep_ttl(mut self) -> Self {
        self.keep_ttl = true;
        self
    }

    /// Appends the option tokens in the order the store expects them.
    pub fn append_args(&self, args: &mut Vec<Bytes>) {
        match self.condition {
            Some(SetCondition::IfAbsent) => args.push(Bytes::from_static(b"NX")),
            Some(SetCondition::IfPresent) => args.push(Bytes::from_static(b"XX")),
            None => {}
        }
        if let Some(expiry) = self.expiry {
            let (token, amount): (&'static [u8], u64) = match expiry {
                Expiry::Seconds(n) => (b"EX", n),
                Expiry::Milliseconds(n) => (b"PX", n),
                Expiry::UnixSeconds(n) => (b"EXAT", n),
                Expiry::UnixMilliseconds(n) => (b"PXAT", n),
            };
            args.push(Bytes::from_static(token));
            args.push(Bytes::from(amount.to_string()));
        } else if self.keep_ttl {
            args.push(Bytes::from_static(b"KEEPTTL"));
        }
    }
}
