//! Per-connection plumbing: inbound pipeline, worker task, control handle.
//!
//! Byte reception and message processing are decoupled: the
//! [`InboundPipeline`] may run on the I/O thread, while the
//! [`ConnectionWorker`], the only place that executes messages or writes
//! responses, runs as a dedicated task per connection.

mod handle;
mod pipeline;
mod worker;

pub use handle::{ConnectionHandle, InboundQueue};
pub(crate) use handle::HandleInner;
pub use pipeline::{ChunkedProtocol, InboundPipeline, PipelineError};
pub use worker::ConnectionWorker;
