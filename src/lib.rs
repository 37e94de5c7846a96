//! Public API for the `graphwire` library.
//!
//! This crate provides the client-facing session protocol engine of a graph
//! database server: version-negotiation handshake, chunked message framing,
//! and the per-connection state machine that sequences requests through
//! query-execution phases. Statement execution, storage, and transport
//! security are external collaborators consumed through narrow traits.

pub mod chunking;
pub mod codec;
pub mod connection;
pub mod handshake;
pub mod machine;
pub mod message;
pub mod processor;
pub mod session;

pub use chunking::{Dechunker, FramingError, MessageSink, chunk_message};
pub use codec::{BincodeCodec, CodecError, MessageCodec};
pub use connection::{
    ChunkedProtocol,
    ConnectionHandle,
    ConnectionWorker,
    InboundPipeline,
    InboundQueue,
    PipelineError,
};
pub use handshake::{
    HANDSHAKE_LEN,
    HANDSHAKE_MAGIC,
    HandshakeOutcome,
    Negotiator,
    ProtocolHandler,
    ProtocolRegistry,
    ProtocolVersion,
    SecurityRequirement,
};
pub use machine::{ConnectionState, Fatal, MachineContext, StateMachine};
pub use message::{Bookmark, RequestMessage, TransactionOptions, Value, ValueMap};
pub use processor::{
    Authenticator,
    Clock,
    ProcessorError,
    ResponseSink,
    StatementOutcome,
    StatementProcessor,
    StreamMode,
    StreamSpec,
    SystemClock,
};
pub use session::{ConnectionId, SessionRegistry};
