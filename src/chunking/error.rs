//! Error types for the chunked framing layer.

use thiserror::Error;

use crate::codec::CodecError;

/// Signals that the downstream message receiver is gone.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("message sink closed")]
pub struct SinkClosed;

/// Fatal framing failures.
///
/// Any of these ends framing on the connection permanently: the dechunker
/// poisons itself and the caller must close the channel. A framing failure
/// is never delivered downstream as a message.
#[derive(Debug, Error)]
pub enum FramingError {
    /// The reassembled payload did not decode into a message.
    #[error("message payload decode failed: {0}")]
    Decode(#[from] CodecError),
    /// The worker-side message receiver has been dropped.
    #[error(transparent)]
    SinkClosed(#[from] SinkClosed),
    /// A previous fatal error already ended framing on this connection.
    #[error("framing halted by an earlier fatal error")]
    Poisoned,
}
