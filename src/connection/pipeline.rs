//! Inbound byte path: handshake, then version-specific framing.
//!
//! The pipeline runs on the I/O side. It feeds bytes to the negotiator until
//! a version is chosen, hands the handshake surplus straight to the chosen
//! handler, and thereafter forwards every slice to that handler's dechunker.
//! It never writes to the socket and never executes messages; complete
//! messages cross to the worker through the [`InboundQueue`].

use std::sync::Arc;

use thiserror::Error;

use super::handle::InboundQueue;
use crate::{
    chunking::{Dechunker, FramingError},
    codec::MessageCodec,
    handshake::{HandshakeOutcome, Negotiator, ProtocolHandler, ProtocolVersion},
};

/// Why the inbound pipeline stopped accepting bytes.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The handshake resolved to a terminal, non-chosen outcome.
    #[error("handshake failed: {0}")]
    Handshake(&'static str),
    /// Framing or payload decoding failed after the handshake.
    #[error(transparent)]
    Framing(#[from] FramingError),
    /// Bytes arrived after the pipeline already stopped.
    #[error("inbound pipeline closed")]
    Closed,
}

type FramingFailureHandler = Box<dyn Fn(&FramingError) + Send>;

enum Stage {
    Negotiating(Negotiator),
    Established(Box<dyn ProtocolHandler>),
    Closed,
}

/// Per-connection inbound byte handler.
pub struct InboundPipeline {
    stage: Stage,
    on_framing_failure: Option<FramingFailureHandler>,
}

impl InboundPipeline {
    /// Start a pipeline in the negotiating stage.
    #[must_use]
    pub fn new(negotiator: Negotiator) -> Self {
        Self {
            stage: Stage::Negotiating(negotiator),
            on_framing_failure: None,
        }
    }

    /// Register the dedicated callback for fatal framing failures.
    ///
    /// Framing errors must never be handled on the receiving path itself;
    /// they are reported here and the connection is closed.
    #[must_use]
    pub fn on_framing_failure<H>(mut self, handler: H) -> Self
    where
        H: Fn(&FramingError) + Send + 'static,
    {
        self.on_framing_failure = Some(Box::new(handler));
        self
    }

    /// Version chosen for this connection, once established.
    #[must_use]
    pub fn version(&self) -> Option<ProtocolVersion> {
        match &self.stage {
            Stage::Established(handler) => Some(handler.version()),
            _ => None,
        }
    }

    /// Consume newly received bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`PipelineError`] when the handshake fails, framing fails,
    /// or the pipeline was already closed. All errors are terminal: the
    /// caller must close the channel.
    pub fn receive(&mut self, bytes: &[u8]) -> Result<(), PipelineError> {
        match &mut self.stage {
            Stage::Negotiating(negotiator) => match negotiator.perform(bytes) {
                HandshakeOutcome::Partial => Ok(()),
                HandshakeOutcome::Chosen(handler) => {
                    let surplus = negotiator.take_remainder();
                    let mut handler = handler;
                    let established = if surplus.is_empty() {
                        Ok(())
                    } else {
                        handler.handle_inbound(&surplus)
                    };
                    match established {
                        Ok(()) => {
                            self.stage = Stage::Established(handler);
                            Ok(())
                        }
                        Err(error) => Err(self.fail_framing(error)),
                    }
                }
                terminal => {
                    self.stage = Stage::Closed;
                    Err(PipelineError::Handshake(terminal.name()))
                }
            },
            Stage::Established(handler) => match handler.handle_inbound(bytes) {
                Ok(()) => Ok(()),
                Err(error) => Err(self.fail_framing(error)),
            },
            Stage::Closed => Err(PipelineError::Closed),
        }
    }

    fn fail_framing(&mut self, error: FramingError) -> PipelineError {
        if let Some(handler) = self.on_framing_failure.as_ref() {
            handler(&error);
        }
        self.stage = Stage::Closed;
        PipelineError::Framing(error)
    }
}

impl std::fmt::Debug for InboundPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stage = match &self.stage {
            Stage::Negotiating(_) => "negotiating",
            Stage::Established(_) => "established",
            Stage::Closed => "closed",
        };
        f.debug_struct("InboundPipeline")
            .field("stage", &stage)
            .finish_non_exhaustive()
    }
}

/// Default [`ProtocolHandler`]: chunked framing over a pluggable codec,
/// delivering messages to a worker queue.
pub struct ChunkedProtocol {
    version: ProtocolVersion,
    dechunker: Dechunker<InboundQueue>,
}

impl ChunkedProtocol {
    /// Build the handler for one connection.
    #[must_use]
    pub fn new(version: ProtocolVersion, codec: Arc<dyn MessageCodec>, queue: InboundQueue) -> Self {
        Self {
            version,
            dechunker: Dechunker::new(codec, queue),
        }
    }
}

impl ProtocolHandler for ChunkedProtocol {
    fn version(&self) -> ProtocolVersion { self.version }

    fn handle_inbound(&mut self, bytes: &[u8]) -> Result<(), FramingError> {
        self.dechunker.handle(bytes)
    }
}
