// src/core/handle.rs

//! Defines `StoreHandle`, the connected client handed out by the manager.

use crate::core::LinkError;
use crate::core::client::{SetOptions, StoreClient, unexpected};
use crate::core::codec;
use crate::core::protocol::{RespFrame, RespValue};
use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::warn;

/// A connected store client together with the structured value operations.
///
/// Handles are only built from clients whose handshake succeeded, and each one
/// is tagged with the session id of the attempt that produced it. Cloning is
/// cheap and every clone talks to the same connection.
#[derive(Clone)]
pub struct StoreHandle {
    client: Arc<dyn StoreClient>,
    session_id: u64,
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("session_id", &self.session_id)
            .field("open", &self.is_open())
            .finish()
    }
}

impl StoreHandle {
    pub(crate) fn new(client: Arc<dyn StoreClient>, session_id: u64) -> Self {
        Self { client, session_id }
    }

    /// Identifier of the connect attempt this handle came from.
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn is_open(&self) -> bool {
        self.client.is_open()
    }

    /// True when both handles wrap the very same client.
    pub fn ptr_eq(&self, other: &StoreHandle) -> bool {
        Arc::ptr_eq(&self.client, &other.client)
    }

    pub(crate) fn client(&self) -> &Arc<dyn StoreClient> {
        &self.client
    }

    // --- Raw passthrough ---

    /// Runs an arbitrary command. Error replies become `LinkError::Server`.
    pub async fn command<I, A>(&self, args: I) -> Result<RespValue, LinkError>
    where
        I: IntoIterator<Item = A>,
        A: Into<Bytes>,
    {
        let args: Vec<Bytes> = args.into_iter().map(Into::into).collect();
        let reply = self.client.execute(args).await?;
        RespValue::try_from(reply)
    }

    pub async fn ping(&self) -> Result<String, LinkError> {
        match self.client.execute(vec![Bytes::from_static(b"PING")]).await? {
            RespFrame::SimpleString(s) => Ok(s),
            RespFrame::Error(msg) => Err(LinkError::Server(msg)),
            other => Err(unexpected("PING", &other)),
        }
    }

    pub async fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<Bytes>, LinkError> {
        self.client.get(key.as_ref()).await
    }

    pub async fn set(
        &self,
        key: impl AsRef<[u8]>,
        value: impl Into<Bytes>,
        options: &SetOptions,
    ) -> Result<Option<String>, LinkError> {
        self.client.set(key.as_ref(), value.into(), options).await
    }

    /// Deletes the given keys and returns how many existed.
    pub async fn del<K: AsRef<[u8]>>(&self, keys: &[K]) -> Result<i64, LinkError> {
        self.integer_command("DEL", keys).await
    }

    pub async fn exists(&self, key: impl AsRef<[u8]>) -> Result<bool, LinkError> {
        Ok(self.integer_command("EXISTS", &[key]).await? > 0)
    }

    async fn integer_command<K: AsRef<[u8]>>(
        &self,
        name: &'static str,
        keys: &[K],
    ) -> Result<i64, LinkError> {
        let mut args = Vec::with_capacity(keys.len() + 1);
        args.push(Bytes::from_static(name.as_bytes()));
        args.extend(keys.iter().map(|k| Bytes::copy_from_slice(k.as_ref())));
        match self.client.execute(args).await? {
            RespFrame::Integer(n) => Ok(n),
            RespFrame::Error(msg) => Err(LinkError::Server(msg)),
            other => Err(unexpected(name, &other)),
        }
    }

    // --- Structured values ---

    /// Stores `value` as JSON text under `key`, passing `options` through to
    /// `SET`. Serialization and write failures are returned as-is.
    pub async fn set_structured<T: Serialize + ?Sized>(
        &self,
        key: impl AsRef<[u8]>,
        value: &T,
        options: &SetOptions,
    ) -> Result<Option<String>, LinkError> {
        let encoded = codec::encode(value)?;
        self.client.set(key.as_ref(), encoded, options).await
    }

    /// Reads and decodes the JSON value under `key`.
    ///
    /// Returns `Ok(None)` when the key is absent and also when the stored text
    /// cannot be decoded as `T`; the latter is logged and otherwise dropped.
    /// Decoding into `serde_json::Value` keeps a stored `null` as
    /// `Some(Value::Null)`. Failures of the read itself are returned.
    pub async fn get_structured<T: DeserializeOwned>(
        &self,
        key: impl AsRef<[u8]>,
    ) -> Result<Option<T>, LinkError> {
        let key = key.as_ref();
        let Some(raw) = self.client.get(key).await? else {
            return Ok(None);
        };
        match codec::decode(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(
                    "Ignoring unreadable structured value at '{}': {}",
                    String::from_utf8_lossy(key),
                    e
                );
                Ok(None)
            }
        }
    }
}
