//! External collaborator interfaces consumed by the state machine.
//!
//! The engine never executes statements, writes to sockets, or reads the
//! system clock directly; it drives these seams. Embedders supply the
//! implementations, and the test suite supplies fakes.

use async_trait::async_trait;
use thiserror::Error;

use crate::message::{Bookmark, TransactionOptions, Value, ValueMap};

/// Failures raised by the statement processor or authenticator.
///
/// Every variant is recoverable at the protocol level: the fail-safe wrapper
/// reports it to the client and moves the machine to `Failed` instead of
/// closing the connection.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProcessorError {
    /// A query-level failure such as a syntax error or constraint violation.
    #[error("{code}: {message}")]
    Query {
        /// Machine-readable status code, e.g. `SyntaxError`.
        code: String,
        /// Human-readable description.
        message: String,
    },
    /// Credentials were valid once but have since expired.
    #[error("authorization expired: {0}")]
    AuthExpired(String),
    /// Any other execution failure. Deliberately still recoverable: errors
    /// never propagate out of message processing.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProcessorError {
    /// Whether the failure must be reported with the auth-expired marker,
    /// which clients honour even mid-stream.
    #[must_use]
    pub const fn is_auth_expired(&self) -> bool { matches!(self, Self::AuthExpired(_)) }

    /// Status code surfaced to the client.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::Query { code, .. } => code,
            Self::AuthExpired(_) => "AuthorizationExpired",
            Self::Internal(_) => "Internal",
        }
    }
}

/// Result metadata available as soon as a statement starts executing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatementOutcome {
    /// Names of the fields each record will carry.
    pub fields: Vec<String>,
}

/// How a result stream should be consumed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamMode {
    /// Deliver records to the sink.
    Pull,
    /// Drop records, reporting only the summary.
    Discard,
}

/// A single pull or discard request against the open result.
///
/// `limit: None` means the whole remaining stream. A bounded limit leaves the
/// stream resumable: the processor must stop after `limit` records and honour
/// a later [`StreamSpec`] for the remainder without blocking the I/O thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamSpec {
    /// Pull or discard.
    pub mode: StreamMode,
    /// Maximum number of records to consume, or `None` for unlimited.
    pub limit: Option<u64>,
}

impl StreamSpec {
    /// Consume the whole remaining stream, delivering records.
    #[must_use]
    pub const fn pull_all() -> Self {
        Self {
            mode: StreamMode::Pull,
            limit: None,
        }
    }

    /// Consume the whole remaining stream, discarding records.
    #[must_use]
    pub const fn discard_all() -> Self {
        Self {
            mode: StreamMode::Discard,
            limit: None,
        }
    }
}

/// Executes statements and owns transaction lifecycles.
///
/// Calls may block or take arbitrary time; they run on the connection's
/// worker task, never on the I/O thread.
#[async_trait]
pub trait StatementProcessor: Send {
    /// Start executing a statement, returning its field names.
    async fn run(
        &mut self,
        statement: &str,
        parameters: &ValueMap,
        options: &TransactionOptions,
    ) -> Result<StatementOutcome, ProcessorError>;

    /// Stream or discard records of the open result through `sink`.
    ///
    /// Returns the bookmark for the completed work when the stream finished
    /// outside an explicit transaction, `None` otherwise.
    async fn stream_result(
        &mut self,
        spec: StreamSpec,
        sink: &mut dyn ResponseSink,
    ) -> Result<Option<Bookmark>, ProcessorError>;

    /// Open an explicit transaction.
    async fn begin_transaction(
        &mut self,
        options: &TransactionOptions,
    ) -> Result<(), ProcessorError>;

    /// Commit the open explicit transaction, returning its bookmark.
    async fn commit_transaction(&mut self) -> Result<Bookmark, ProcessorError>;

    /// Roll back the open explicit transaction.
    async fn rollback_transaction(&mut self) -> Result<(), ProcessorError>;

    /// Release any held statement or transaction resources.
    ///
    /// Called when the interrupt counter drains to zero; failure is treated
    /// as fatal by the machine and closes the connection.
    async fn reset(&mut self) -> Result<(), ProcessorError>;

    /// Whether an explicit transaction is currently open.
    fn has_transaction(&self) -> bool;
}

/// Delivers responses, records, and summaries back to the client.
///
/// Owned by the per-connection context, so all writes originate from the
/// worker task.
pub trait ResponseSink: Send {
    /// Attach a metadata entry to the pending response summary.
    fn on_metadata(&mut self, key: &str, value: Value);

    /// Deliver a batch of pulled records.
    fn on_pull_records(&mut self, records: Vec<Vec<Value>>);

    /// Report how many records a discard consumed.
    fn on_discard_records(&mut self, count: u64);

    /// Complete the pending request successfully.
    fn on_success(&mut self);

    /// Report a request failure to the client.
    fn on_failure(&mut self, code: &str, message: &str, auth_expired: bool);

    /// Acknowledge a request that was ignored (`Failed`/`Interrupted`).
    fn on_ignored(&mut self);
}

/// Authenticates `Hello` credentials. The scheme is a deployment concern.
pub trait Authenticator: Send {
    /// Validate the token, returning a description of the failure otherwise.
    ///
    /// # Errors
    ///
    /// Returns a [`ProcessorError`] when the credentials are rejected; the
    /// machine treats this as fatal during connect.
    fn authenticate(&mut self, user_agent: &str, token: &ValueMap) -> Result<(), ProcessorError>;
}

/// Millisecond wall clock, injectable for deterministic tests.
pub trait Clock: Send + Sync {
    /// Milliseconds since an arbitrary fixed epoch.
    fn millis(&self) -> u64;
}

/// [`Clock`] backed by [`std::time::SystemTime`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn millis(&self) -> u64 {
        u64::try_from(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis(),
        )
        .unwrap_or(u64::MAX)
    }
}
