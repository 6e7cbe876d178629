// src/core/mod.rs

//! The connection manager, the store client it drives, and the pieces both
//! share.

pub mod client;
pub mod codec;
pub mod errors;
pub mod handle;
pub mod link;
pub mod protocol;

pub use errors::LinkError;
pub use protocol::RespValue;
