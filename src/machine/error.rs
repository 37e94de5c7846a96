//! Fatal errors that close a connection.

use thiserror::Error;

use super::state::ConnectionState;
use crate::processor::ProcessorError;

/// Errors the fail-safe wrapper does not absorb.
///
/// Everything else raised during message processing is intercepted, reported
/// through the context, and converted into a `Failed` transition; these
/// variants instead end the connection.
#[derive(Debug, Error)]
pub enum Fatal {
    /// The message is not valid in the current state, e.g. `Commit` while
    /// `Ready`.
    #[error("{message} is not allowed in the {state} state")]
    ProtocolViolation {
        /// State the machine was in.
        state: ConnectionState,
        /// Name of the offending message.
        message: &'static str,
    },
    /// `Hello` credentials were rejected.
    #[error("authentication failed")]
    AuthenticationFailed(#[source] ProcessorError),
    /// The machine reset attempted after the interrupt counter drained
    /// could not release the processor's resources.
    #[error("machine reset failed")]
    ResetFailed(#[source] ProcessorError),
}
