//! Chunked message framing.
//!
//! On the wire a message is one or more chunks, each a 2-byte big-endian
//! length prefix followed by that many payload bytes, ended by a zero-length
//! terminator chunk. [`Dechunker`] reassembles messages from arbitrarily
//! fragmented input: a single `handle` call may carry part of a length
//! header, several whole messages, or anything in between, and delivery to
//! the sink is exactly-once and in arrival order.

mod error;

use std::{fmt, sync::Arc};

use bytes::BytesMut;

pub use error::{FramingError, SinkClosed};

use crate::{codec::MessageCodec, message::RequestMessage};

/// Width of the chunk length prefix. A literal wire constant.
pub const CHUNK_HEADER_LEN: usize = 2;

/// Largest payload a single chunk can carry.
pub const MAX_CHUNK_LEN: usize = u16::MAX as usize;

/// Receives each reassembled message exactly once, in arrival order.
pub trait MessageSink: Send {
    /// Accept one decoded message.
    ///
    /// # Errors
    ///
    /// Returns [`SinkClosed`] when the downstream receiver is gone, which
    /// the dechunker escalates to a fatal framing error.
    fn on_message(&mut self, message: RequestMessage) -> Result<(), SinkClosed>;
}

/// Where the dechunker's cursor sits between `handle` calls.
#[derive(Clone, Copy, Debug)]
enum Cursor {
    /// Awaiting a 2-byte chunk length; `high` holds the first header byte
    /// when the header itself was split across deliveries.
    Header { high: Option<u8> },
    /// Awaiting `remaining` payload bytes of the current chunk.
    Payload { remaining: usize },
}

/// Incremental chunk reassembler for one connection.
///
/// Lives for the connection's duration, accumulating payload bytes across
/// calls. A zero-length chunk triggers codec decoding of the accumulated
/// payload and delivery to the sink before `handle` returns. Decode and
/// delivery failures poison the dechunker; framing never resumes.
pub struct Dechunker<S> {
    codec: Arc<dyn MessageCodec>,
    sink: S,
    cursor: Cursor,
    payload: BytesMut,
    poisoned: bool,
}

impl<S: MessageSink> Dechunker<S> {
    /// Create a dechunker delivering decoded messages to `sink`.
    pub fn new(codec: Arc<dyn MessageCodec>, sink: S) -> Self {
        Self {
            codec,
            sink,
            cursor: Cursor::Header { high: None },
            payload: BytesMut::new(),
            poisoned: false,
        }
    }

    /// Consume an arbitrary-length slice of inbound bytes.
    ///
    /// Every message completed by these bytes is decoded and handed to the
    /// sink before this call returns.
    ///
    /// # Errors
    ///
    /// Returns a [`FramingError`] on decode or delivery failure, after which
    /// every further call fails with [`FramingError::Poisoned`].
    pub fn handle(&mut self, input: &[u8]) -> Result<(), FramingError> {
        if self.poisoned {
            return Err(FramingError::Poisoned);
        }
        self.consume(input).inspect_err(|error| {
            self.poisoned = true;
            tracing::error!(%error, "fatal framing error; dechunker poisoned");
        })
    }

    fn consume(&mut self, mut input: &[u8]) -> Result<(), FramingError> {
        while !input.is_empty() {
            match self.cursor {
                Cursor::Header { high: None } => {
                    if input.len() < CHUNK_HEADER_LEN {
                        self.cursor = Cursor::Header {
                            high: Some(input[0]),
                        };
                        return Ok(());
                    }
                    let size = usize::from(u16::from_be_bytes([input[0], input[1]]));
                    input = &input[CHUNK_HEADER_LEN..];
                    self.begin_chunk(size)?;
                }
                Cursor::Header { high: Some(high) } => {
                    let size = usize::from(u16::from_be_bytes([high, input[0]]));
                    input = &input[1..];
                    self.begin_chunk(size)?;
                }
                Cursor::Payload { remaining } => {
                    let take = remaining.min(input.len());
                    self.payload.extend_from_slice(&input[..take]);
                    input = &input[take..];
                    self.cursor = if take == remaining {
                        Cursor::Header { high: None }
                    } else {
                        Cursor::Payload {
                            remaining: remaining - take,
                        }
                    };
                }
            }
        }
        Ok(())
    }

    fn begin_chunk(&mut self, size: usize) -> Result<(), FramingError> {
        if size == 0 {
            self.finish_message()?;
            self.cursor = Cursor::Header { high: None };
        } else {
            self.cursor = Cursor::Payload { remaining: size };
        }
        Ok(())
    }

    fn finish_message(&mut self) -> Result<(), FramingError> {
        if self.payload.is_empty() {
            // A lone terminator carries no message; clients send these to
            // keep idle connections alive.
            tracing::trace!("keepalive chunk");
            return Ok(());
        }
        let payload = self.payload.split();
        let message = self.codec.decode(&payload)?;
        tracing::trace!(message = %message, bytes = payload.len(), "message reassembled");
        self.sink.on_message(message)?;
        Ok(())
    }
}

impl<S> fmt::Debug for Dechunker<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dechunker")
            .field("cursor", &self.cursor)
            .field("buffered", &self.payload.len())
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}

/// Encode `payload` as chunks of at most `max_chunk` bytes plus the
/// terminator, appending to `dst`.
///
/// # Panics
///
/// Panics when `max_chunk` is zero or exceeds [`MAX_CHUNK_LEN`].
pub fn chunk_message(payload: &[u8], max_chunk: usize, dst: &mut BytesMut) {
    assert!(
        (1..=MAX_CHUNK_LEN).contains(&max_chunk),
        "invalid chunk size limit"
    );
    for chunk in payload.chunks(max_chunk) {
        let len = u16::try_from(chunk.len()).expect("chunk length bounded by max_chunk");
        dst.extend_from_slice(&len.to_be_bytes());
        dst.extend_from_slice(chunk);
    }
    dst.extend_from_slice(&0_u16.to_be_bytes());
}
