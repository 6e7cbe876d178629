// src/lib.rs

//! A lifecycle-managed single connection to a RESP key-value store.
//!
//! ```no_run
//! use spinel_link::{ConnectOptions, ConnectionManager, SetOptions};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), spinel_link::LinkError> {
//! let manager = ConnectionManager::resp();
//! manager.connect(ConnectOptions::default().with_database(0)).await?;
//!
//! let client = manager.get_client()?;
//! client
//!     .set_structured("user:1", &json!({"name": "Alice", "age": 30}), &SetOptions::default())
//!     .await?;
//! let user: Option<serde_json::Value> = client.get_structured("user:1").await?;
//! assert!(user.is_some());
//!
//! manager.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;

// Re-export
pub use crate::config::ConnectOptions;
pub use crate::core::client::{
    ClientEvent, EventSink, Expiry, RespConnector, SetCondition, SetOptions, StoreClient,
    StoreConnector,
};
pub use crate::core::handle::StoreHandle;
pub use crate::core::link::{ConnectAttempt, ConnectionManager, LinkStatus};
pub use crate::core::{LinkError, RespValue};

/// Crate version, overridable at build time through `SPINEL_LINK_VERSION`.
pub const VERSION: &str = env!("SPINEL_LINK_VERSION");
