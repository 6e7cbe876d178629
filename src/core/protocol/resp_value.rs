// src/core/protocol/resp_value.rs

//! Defines the reply type handed back to callers of raw store commands.

use super::RespFrame;
use crate::core::LinkError;
use bytes::Bytes;

/// `RespValue` is a reply with RESP error frames already split off.
///
/// Raw commands issued through a `StoreHandle` return this type; an error reply
/// from the store becomes `LinkError::Server` instead of a value.
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    SimpleString(String),
    BulkString(Bytes),
    Integer(i64),
    Array(Vec<RespValue>),
    Null,
    NullArray,
}

impl RespValue {
    /// Returns the payload of a simple or bulk string, if this is one.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RespValue::SimpleString(s) => Some(s.as_bytes()),
            RespValue::BulkString(b) => Some(b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RespValue::Null | RespValue::NullArray)
    }
}

impl TryFrom<RespFrame> for RespValue {
    type Error = LinkError;

    /// Fails on the first error frame found, including ones nested in arrays.
    fn try_from(frame: RespFrame) -> Result<Self, Self::Error> {
        match frame {
            RespFrame::SimpleString(s) => Ok(RespValue::SimpleString(s)),
            RespFrame::Error(msg) => Err(LinkError::Server(msg)),
            RespFrame::Integer(i) => Ok(RespValue::Integer(i)),
            RespFrame::BulkString(b) => Ok(RespValue::BulkString(b)),
            RespFrame::Null => Ok(RespValue::Null),
            RespFrame::NullArray => Ok(RespValue::NullArray),
            RespFrame::Array(frames) => frames
                .into_iter()
                .map(RespValue::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(RespValue::Array),
        }
    }
}

impl From<RespValue> for RespFrame {
    fn from(val: RespValue) -> Self {
        match val {
            RespValue::SimpleString(s) => RespFrame::SimpleString(s),
            RespValue::BulkString(b) => RespFrame::BulkString(b),
            RespValue::Integer(i) => RespFrame::Integer(i),
            RespValue::Array(arr) => RespFrame::Array(arr.into_iter().map(Into::into).collect()),
            RespValue::Null => RespFrame::Null,
            RespValue::NullArray => RespFrame::NullArray,
        }
    }
}
