//! Wire codec for the request and reply message shapes.
//!
//! Requests travel as a fixed-width little-endian header followed by a
//! variable `args` field; replies as an id followed by a NUL-terminated
//! answer. Decoding from a partial buffer yields `Ok(None)` so callers can
//! accumulate more bytes and retry.

use crate::shared::protocol::{ClientMessage, ReplyMessage, RequestType, MAX_ARGS_LEN};
use thiserror::Error;

/// Stateless encoder/decoder over byte buffers.
///
/// `decode` returns the decoded item together with the number of bytes
/// consumed, or `None` when the buffer does not yet hold a full frame.
pub trait Codec: Send {
    type Item: Send;
    type Error: std::error::Error + Send;

    fn decode(&mut self, buf: &[u8]) -> Result<Option<(Self::Item, usize)>, Self::Error>;

    /// Writes `item` into `buf`, returning the encoded length.
    fn encode(&mut self, item: &Self::Item, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("args field is {len} bytes (max: {max})")]
    FrameTooLarge { len: usize, max: usize },

    #[error("output buffer too small")]
    BufferTooSmall,

    #[error("unknown request kind on the wire: {0}")]
    UnknownKind(i32),

    #[error("negative args size on the wire: {0}")]
    NegativeSize(i32),

    #[error("payload is not valid UTF-8")]
    InvalidUtf8,
}

/// Fixed header: id, s_addr, sin_port, key, kind, record_timestamp, size.
const REQUEST_HEADER_LEN: usize = 4 + 4 + 2 + 4 + 4 + 1 + 4;

/// Codec for [`ClientMessage`] frames.
#[derive(Debug, Default)]
pub struct RequestCodec;

impl Codec for RequestCodec {
    type Item = ClientMessage;
    type Error = CodecError;

    fn decode(&mut self, buf: &[u8]) -> Result<Option<(ClientMessage, usize)>, CodecError> {
        if buf.len() < REQUEST_HEADER_LEN {
            return Ok(None);
        }

        let id = i32::from_le_bytes(buf[0..4].try_into().unwrap());
        let s_addr = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        let sin_port = u16::from_le_bytes(buf[8..10].try_into().unwrap());
        let key = i32::from_le_bytes(buf[10..14].try_into().unwrap());
        let raw_kind = i32::from_le_bytes(buf[14..18].try_into().unwrap());
        let record_timestamp = buf[18] != 0;
        let size = i32::from_le_bytes(buf[19..23].try_into().unwrap());

        if size < 0 {
            return Err(CodecError::NegativeSize(size));
        }
        let size = size as usize;
        if size > MAX_ARGS_LEN {
            return Err(CodecError::FrameTooLarge {
                len: size,
                max: MAX_ARGS_LEN,
            });
        }
        let kind = RequestType::from_wire(raw_kind).ok_or(CodecError::UnknownKind(raw_kind))?;

        if buf.len() < REQUEST_HEADER_LEN + size {
            return Ok(None);
        }
        let args = std::str::from_utf8(&buf[REQUEST_HEADER_LEN..REQUEST_HEADER_LEN + size])
            .map_err(|_| CodecError::InvalidUtf8)?
            .to_string();

        Ok(Some((
            ClientMessage {
                id,
                s_addr,
                sin_port,
                key,
                kind,
                record_timestamp,
                args,
            },
            REQUEST_HEADER_LEN + size,
        )))
    }

    fn encode(&mut self, item: &ClientMessage, buf: &mut [u8]) -> Result<usize, CodecError> {
        let args = item.args.as_bytes();
        if args.len() > MAX_ARGS_LEN {
            return Err(CodecError::FrameTooLarge {
                len: args.len(),
                max: MAX_ARGS_LEN,
            });
        }
        let frame_len = REQUEST_HEADER_LEN + args.len();
        if buf.len() < frame_len {
            return Err(CodecError::BufferTooSmall);
        }

        buf[0..4].copy_from_slice(&item.id.to_le_bytes());
        buf[4..8].copy_from_slice(&item.s_addr.to_le_bytes());
        buf[8..10].copy_from_slice(&item.sin_port.to_le_bytes());
        buf[10..14].copy_from_slice(&item.key.to_le_bytes());
        buf[14..18].copy_from_slice(&item.kind.as_wire().to_le_bytes());
        buf[18] = item.record_timestamp as u8;
        buf[19..23].copy_from_slice(&(args.len() as i32).to_le_bytes());
        buf[REQUEST_HEADER_LEN..frame_len].copy_from_slice(args);

        Ok(frame_len)
    }
}

/// Codec for [`ReplyMessage`] frames: `id:i32` + NUL-terminated answer.
#[derive(Debug, Default)]
pub struct ReplyCodec;

impl Codec for ReplyCodec {
    type Item = ReplyMessage;
    type Error = CodecError;

    fn decode(&mut self, buf: &[u8]) -> Result<Option<(ReplyMessage, usize)>, CodecError> {
        if buf.len() < 4 {
            return Ok(None);
        }
        let id = i32::from_le_bytes(buf[0..4].try_into().unwrap());

        let Some(terminator) = buf[4..].iter().position(|&b| b == 0) else {
            return Ok(None);
        };
        let answer = std::str::from_utf8(&buf[4..4 + terminator])
            .map_err(|_| CodecError::InvalidUtf8)?
            .to_string();

        Ok(Some((ReplyMessage { id, answer }, 4 + terminator + 1)))
    }

    fn encode(&mut self, item: &ReplyMessage, buf: &mut [u8]) -> Result<usize, CodecError> {
        let answer = item.answer.as_bytes();
        let frame_len = 4 + answer.len() + 1;
        if buf.len() < frame_len {
            return Err(CodecError::BufferTooSmall);
        }

        buf[0..4].copy_from_slice(&item.id.to_le_bytes());
        buf[4..4 + answer.len()].copy_from_slice(answer);
        buf[4 + answer.len()] = 0;

        Ok(frame_len)
    }
}
