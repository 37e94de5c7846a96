//! Per-connection mutable state passed into every transition.

use std::{fmt, sync::Arc};

use crate::{
    message::{Value, ValueMap},
    processor::{Authenticator, Clock, ProcessorError, ResponseSink, StatementProcessor},
    session::ConnectionId,
};

/// The per-connection bag the state machine works through.
///
/// Exactly one instance exists per connection, owned and mutated only by the
/// connection's worker task. The machine never touches the statement
/// processor, sink, or clock except through this context.
pub struct MachineContext {
    /// Identifier of the owning connection.
    pub connection_id: ConnectionId,
    /// Executes statements and owns transactions.
    pub processor: Box<dyn StatementProcessor>,
    /// Delivers responses to the client; the only write path to the socket.
    pub sink: Box<dyn ResponseSink>,
    /// Validates `Hello` credentials.
    pub authenticator: Box<dyn Authenticator>,
    /// Millisecond clock for timing metadata.
    pub clock: Arc<dyn Clock>,
    /// Metadata accumulated for the client: bookmarks, field names, timings.
    pub metadata: ValueMap,
    interrupts: u64,
}

impl MachineContext {
    /// Assemble the context for one connection.
    #[must_use]
    pub fn new(
        connection_id: ConnectionId,
        processor: Box<dyn StatementProcessor>,
        sink: Box<dyn ResponseSink>,
        authenticator: Box<dyn Authenticator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            connection_id,
            processor,
            sink,
            authenticator,
            clock,
            metadata: ValueMap::new(),
            interrupts: 0,
        }
    }

    /// Record a metadata entry and deliver it to the response sink.
    pub fn on_metadata(&mut self, key: &str, value: Value) {
        self.metadata.insert(key.to_owned(), value.clone());
        self.sink.on_metadata(key, value);
    }

    /// Report a recoverable failure to the client.
    ///
    /// The auth-expired marker is derived from the cause so clients honour
    /// it even mid-stream.
    pub fn handle_failure(&mut self, cause: &ProcessorError) {
        tracing::warn!(
            connection_id = %self.connection_id,
            code = cause.code(),
            %cause,
            "request failed"
        );
        self.sink
            .on_failure(cause.code(), &cause.to_string(), cause.is_auth_expired());
    }

    /// Number of `Reset` messages still required to leave `Interrupted`.
    #[must_use]
    pub const fn pending_interrupts(&self) -> u64 { self.interrupts }

    /// Note one more interrupt to drain. Never decreases the count.
    pub(crate) const fn raise_interrupt(&mut self) { self.interrupts += 1; }

    /// Consume one interrupt, returning how many remain.
    pub(crate) const fn settle_interrupt(&mut self) -> u64 {
        self.interrupts = self.interrupts.saturating_sub(1);
        self.interrupts
    }
}

impl fmt::Debug for MachineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineContext")
            .field("connection_id", &self.connection_id)
            .field("metadata", &self.metadata)
            .field("interrupts", &self.interrupts)
            .finish_non_exhaustive()
    }
}
