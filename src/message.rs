//! Request messages decoded from the wire.
//!
//! A [`RequestMessage`] is the unit handed from the dechunker to the
//! connection state machine. Parameter values use a small self-contained
//! [`Value`] model so the engine never depends on the query engine's own
//! type system.

use std::{collections::BTreeMap, fmt};

use bincode::{Decode, Encode};

/// Ordered map used for query parameters, auth tokens, and metadata.
pub type ValueMap = BTreeMap<String, Value>;

/// Parameter and metadata values carried inside request messages.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub enum Value {
    /// Absent value.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Ordered list of values.
    List(Vec<Value>),
    /// String-keyed map of values.
    Map(ValueMap),
}

impl From<&str> for Value {
    fn from(value: &str) -> Self { Self::String(value.to_owned()) }
}

impl From<String> for Value {
    fn from(value: String) -> Self { Self::String(value) }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self { Self::Integer(value) }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self { Self::Bool(value) }
}

/// Opaque token marking the most recent committed transaction position.
///
/// Returned to the client after a commit (or a completed top-level stream) so
/// it can establish causal ordering across connections.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Encode, Decode)]
pub struct Bookmark(pub String);

impl From<&str> for Bookmark {
    fn from(value: &str) -> Self { Self(value.to_owned()) }
}

impl fmt::Display for Bookmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Transaction options carried by `Run` and `Begin`.
#[derive(Clone, Debug, Default, PartialEq, Encode, Decode)]
pub struct TransactionOptions {
    /// Bookmarks the transaction must wait for before starting.
    pub bookmarks: Vec<Bookmark>,
    /// Transaction timeout in milliseconds, enforced by the statement
    /// processor rather than by this engine.
    pub tx_timeout_millis: Option<u64>,
    /// Client-supplied transaction metadata.
    pub tx_metadata: ValueMap,
}

/// A decoded client request.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub enum RequestMessage {
    /// Opens the session: identifies the client and authenticates.
    Hello {
        /// Client identification string.
        user_agent: String,
        /// Credentials, interpreted by the
        /// [`Authenticator`](crate::processor::Authenticator).
        auth_token: ValueMap,
    },
    /// Submits a statement for execution.
    Run {
        /// Statement text.
        statement: String,
        /// Statement parameters.
        parameters: ValueMap,
        /// Bookmarks, timeout, and metadata for an auto-commit transaction.
        options: TransactionOptions,
    },
    /// Requests all remaining records of the open result.
    PullAll,
    /// Discards all remaining records of the open result.
    DiscardAll,
    /// Opens an explicit transaction.
    Begin {
        /// Bookmarks, timeout, and metadata for the transaction.
        options: TransactionOptions,
    },
    /// Commits the open explicit transaction.
    Commit,
    /// Rolls back the open explicit transaction.
    Rollback,
    /// Clears a `Failed`/`Interrupted` condition once interrupts drain.
    Reset,
    /// Out-of-band preemption signal; jumps the ordinary message queue.
    Interrupt,
}

impl RequestMessage {
    /// Stable message name used in logs and protocol-violation reports.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "HELLO",
            Self::Run { .. } => "RUN",
            Self::PullAll => "PULL_ALL",
            Self::DiscardAll => "DISCARD_ALL",
            Self::Begin { .. } => "BEGIN",
            Self::Commit => "COMMIT",
            Self::Rollback => "ROLLBACK",
            Self::Reset => "RESET",
            Self::Interrupt => "INTERRUPT",
        }
    }
}

impl fmt::Display for RequestMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}
