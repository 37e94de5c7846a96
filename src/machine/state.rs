//! Named states of the connection state machine.

use std::fmt;

/// Where a connection sits in the query-execution lifecycle.
///
/// Terminal closure is not a state: a fatal error from
/// [`StateMachine::process`](super::StateMachine::process) signals it.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ConnectionState {
    /// Negotiated but not yet authenticated; only `Hello` is valid.
    Connected,
    /// Authenticated and idle.
    Ready,
    /// A statement ran outside a transaction; its result awaits streaming.
    Streaming,
    /// An explicit transaction is open and idle.
    TxReady,
    /// A statement ran inside a transaction; its result awaits streaming.
    TxStreaming,
    /// A recoverable failure was reported; ordinary requests are ignored
    /// until the client resets.
    Failed,
    /// The client preempted the session; requests are ignored until the
    /// interrupt counter drains through `Reset`.
    Interrupted,
}

impl ConnectionState {
    /// Stable state name used in logs and protocol-violation reports.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Connected => "CONNECTED",
            Self::Ready => "READY",
            Self::Streaming => "STREAMING",
            Self::TxReady => "TX_READY",
            Self::TxStreaming => "TX_STREAMING",
            Self::Failed => "FAILED",
            Self::Interrupted => "INTERRUPTED",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}
