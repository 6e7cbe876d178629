// src/core/protocol/resp_frame.rs

//! RESP2 frames as they travel between the client and the store, together with
//! the `tokio_util` codec used by the connection task.

use crate::core::LinkError;
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const CRLF: &[u8] = b"\r\n";
const CRLF_LEN: usize = 2;

// Replies larger than this are treated as a broken stream rather than buffered.
const MAX_FRAME_ELEMENTS: usize = 1_024 * 1_024;
const MAX_BULK_STRING_SIZE: usize = 512 * 1024 * 1024;
const MAX_RECURSION_DEPTH: usize = 256;

/// A single RESP2 frame.
#[derive(Debug, Clone, PartialEq)]
pub enum RespFrame {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Bytes),
    Null,
    NullArray,
    Array(Vec<RespFrame>),
}

impl RespFrame {
    /// Builds the array-of-bulk-strings frame every command request is sent as.
    pub fn command<I, A>(args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Bytes>,
    {
        RespFrame::Array(
            args.into_iter()
                .map(|arg| RespFrame::BulkString(arg.into()))
                .collect(),
        )
    }

    /// Short type label used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            RespFrame::SimpleString(_) => "simple string",
            RespFrame::Error(_) => "error",
            RespFrame::Integer(_) => "integer",
            RespFrame::BulkString(_) => "bulk string",
            RespFrame::Null => "null",
            RespFrame::NullArray => "null array",
            RespFrame::Array(_) => "array",
        }
    }

    /// Encodes the frame into a standalone byte vector.
    pub fn encode_to_vec(&self) -> Result<Vec<u8>, LinkError> {
        let mut buf = BytesMut::new();
        RespFrameCodec.encode(self.clone(), &mut buf)?;
        Ok(buf.to_vec())
    }
}

/// Stateless RESP2 encoder/decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct RespFrameCodec;

impl Encoder<RespFrame> for RespFrameCodec {
    type Error = LinkError;

    fn encode(&mut self, item: RespFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            RespFrame::SimpleString(s) => write_line(dst, b'+', s.as_bytes()),
            RespFrame::Error(s) => write_line(dst, b'-', s.as_bytes()),
            RespFrame::Integer(i) => write_line(dst, b':', i.to_string().as_bytes()),
            RespFrame::BulkString(b) => {
                write_line(dst, b'$', b.len().to_string().as_bytes());
                dst.extend_from_slice(&b);
                dst.extend_from_slice(CRLF);
            }
            RespFrame::Null => dst.extend_from_slice(b"$-1\r\n"),
            RespFrame::NullArray => dst.extend_from_slice(b"*-1\r\n"),
            RespFrame::Array(frames) => {
                write_line(dst, b'*', frames.len().to_string().as_bytes());
                for frame in frames {
                    self.encode(frame, dst)?;
                }
            }
        }
        Ok(())
    }
}

impl Decoder for RespFrameCodec {
    type Item = RespFrame;
    type Error = LinkError;

    /// Returns `Ok(None)` until a complete frame is buffered; only then is the
    /// source advanced.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut cursor = &src[..];
        match parse_frame(&mut cursor, 0) {
            Ok(frame) => {
                let consumed = src.len() - cursor.len();
                src.advance(consumed);
                Ok(Some(frame))
            }
            Err(LinkError::IncompleteData) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn write_line(dst: &mut BytesMut, prefix: u8, body: &[u8]) {
    dst.reserve(body.len() + 1 + CRLF_LEN);
    dst.extend_from_slice(&[prefix]);
    dst.extend_from_slice(body);
    dst.extend_from_slice(CRLF);
}

fn parse_frame(cursor: &mut &[u8], depth: usize) -> Result<RespFrame, LinkError> {
    if depth > MAX_RECURSION_DEPTH {
        return Err(LinkError::Protocol(
            "reply nesting exceeds the recursion limit".to_string(),
        ));
    }

    let Some(&prefix) = cursor.first() else {
        return Err(LinkError::IncompleteData);
    };
    *cursor = &cursor[1..];

    match prefix {
        b'+' => Ok(RespFrame::SimpleString(lossy(read_line(cursor)?))),
        b'-' => Ok(RespFrame::Error(lossy(read_line(cursor)?))),
        b':' => Ok(RespFrame::Integer(read_length(cursor)?)),
        b'$' => parse_bulk_string(cursor),
        b'*' => parse_array(cursor, depth),
        _ => Err(LinkError::SyntaxError),
    }
}

fn parse_bulk_string(cursor: &mut &[u8]) -> Result<RespFrame, LinkError> {
    let len = read_length(cursor)?;
    if len == -1 {
        return Ok(RespFrame::Null);
    }
    let len = usize::try_from(len).map_err(|_| LinkError::SyntaxError)?;
    if len > MAX_BULK_STRING_SIZE {
        return Err(LinkError::SyntaxError);
    }
    if cursor.len() < len + CRLF_LEN {
        return Err(LinkError::IncompleteData);
    }
    if &cursor[len..len + CRLF_LEN] != CRLF {
        return Err(LinkError::SyntaxError);
    }

    let data = Bytes::copy_from_slice(&cursor[..len]);
    *cursor = &cursor[len + CRLF_LEN..];
    Ok(RespFrame::BulkString(data))
}

fn parse_array(cursor: &mut &[u8], depth: usize) -> Result<RespFrame, LinkError> {
    let len = read_length(cursor)?;
    if len == -1 {
        return Ok(RespFrame::NullArray);
    }
    let len = usize::try_from(len).map_err(|_| LinkError::SyntaxError)?;
    if len > MAX_FRAME_ELEMENTS {
        return Err(LinkError::SyntaxError);
    }

    let mut frames = Vec::with_capacity(len.min(64));
    for _ in 0..len {
        frames.push(parse_frame(cursor, depth + 1)?);
    }
    Ok(RespFrame::Array(frames))
}

/// Reads up to the next CRLF and advances past it.
fn read_line<'a>(cursor: &mut &'a [u8]) -> Result<&'a [u8], LinkError> {
    let pos = cursor
        .windows(CRLF_LEN)
        .position(|window| window == CRLF)
        .ok_or(LinkError::IncompleteData)?;
    let line = &cursor[..pos];
    *cursor = &cursor[pos + CRLF_LEN..];
    Ok(line)
}

fn read_length(cursor: &mut &[u8]) -> Result<i64, LinkError> {
    let line = read_line(cursor)?;
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(LinkError::SyntaxError)
}

fn lossy(line: &[u8]) -> String {
    String::from_utf8_lossy(line).into_owned()
}
