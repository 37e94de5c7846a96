//! Pluggable payload codecs.
//!
//! The engine never interprets message payload bytes itself: a complete,
//! dechunked payload is handed to a [`MessageCodec`] which produces a
//! [`RequestMessage`]. The wire format is a per-deployment concern; the
//! default [`BincodeCodec`] uses bincode's big-endian, fixed-width integer
//! configuration so encoded payloads are stable across platforms.

use bincode::{
    config::{self, BigEndian, Configuration, Fixint},
    decode_from_slice, encode_to_vec,
    error::{DecodeError, EncodeError},
};
use thiserror::Error;

use crate::message::RequestMessage;

/// Errors produced while encoding or decoding a message payload.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The payload bytes do not form a valid message.
    #[error("message decode failed: {0}")]
    Decode(#[from] DecodeError),
    /// The message could not be serialised.
    #[error("message encode failed: {0}")]
    Encode(#[from] EncodeError),
    /// The payload decoded, but trailing bytes remained.
    #[error("message payload has {remaining} trailing bytes")]
    TrailingBytes {
        /// Number of unconsumed bytes after the message.
        remaining: usize,
    },
}

/// Converts complete payload byte sequences to and from [`RequestMessage`]s.
///
/// Implementations must be pure with respect to chunking: the dechunker
/// guarantees the payload is complete, so a codec never sees partial input.
pub trait MessageCodec: Send + Sync + 'static {
    /// Decode one message from a complete payload.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] when the payload is malformed or does not
    /// consume the whole input.
    fn decode(&self, payload: &[u8]) -> Result<RequestMessage, CodecError>;

    /// Encode one message into payload bytes (before chunking).
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] when serialisation fails.
    fn encode(&self, message: &RequestMessage) -> Result<Vec<u8>, CodecError>;
}

fn wire_config() -> Configuration<BigEndian, Fixint> {
    config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
}

/// Default codec over bincode's big-endian fixed-int configuration.
#[derive(Clone, Copy, Debug, Default)]
pub struct BincodeCodec;

impl MessageCodec for BincodeCodec {
    fn decode(&self, payload: &[u8]) -> Result<RequestMessage, CodecError> {
        let (message, consumed) = decode_from_slice(payload, wire_config())?;
        if consumed != payload.len() {
            return Err(CodecError::TrailingBytes {
                remaining: payload.len() - consumed,
            });
        }
        Ok(message)
    }

    fn encode(&self, message: &RequestMessage) -> Result<Vec<u8>, CodecError> {
        Ok(encode_to_vec(message, wire_config())?)
    }
}
