//! Per-connection state machine sequencing decoded requests.
//!
//! One dispatcher drives the fixed state set: it honours `Interrupt` before
//! any state's own logic, applies the fail-safe policy uniformly (recoverable
//! errors become a `Failed` transition, never a propagated panic or a closed
//! connection), and delegates to one handler function per state. The
//! streaming handler is shared: it carries its return target as data, so the
//! same logic drives top-level and in-transaction result streaming.

mod context;
mod error;
mod state;

pub use context::MachineContext;
pub use error::Fatal;
pub use state::ConnectionState;

use crate::{
    message::{RequestMessage, TransactionOptions, Value, ValueMap},
    processor::{ProcessorError, StreamSpec},
};

/// A state handler either transitions, fails recoverably, or fails fatally.
enum StateError {
    Recoverable(ProcessorError),
    Fatal(Fatal),
}

impl From<ProcessorError> for StateError {
    fn from(error: ProcessorError) -> Self { Self::Recoverable(error) }
}

type Transition = Result<ConnectionState, StateError>;

/// Streaming behaviour, parameterised by where to go once the result is
/// consumed and whether completion yields a bookmark.
#[derive(Clone, Copy)]
struct StreamTarget {
    return_to: ConnectionState,
    attach_bookmark: bool,
}

impl StreamTarget {
    /// Auto-commit results return to `Ready` and publish a bookmark.
    const TOP_LEVEL: Self = Self {
        return_to: ConnectionState::Ready,
        attach_bookmark: true,
    };
    /// In-transaction results return to `TxReady`; the bookmark arrives at
    /// commit instead.
    const IN_TRANSACTION: Self = Self {
        return_to: ConnectionState::TxReady,
        attach_bookmark: false,
    };
}

/// The connection state machine.
///
/// Processes at most one message at a time and always yields a definite next
/// state or a fatal signal; it never silently drops a message.
#[derive(Debug)]
pub struct StateMachine {
    state: ConnectionState,
}

impl Default for StateMachine {
    fn default() -> Self { Self::new() }
}

impl StateMachine {
    /// A machine for a freshly negotiated connection.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: ConnectionState::Connected,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState { self.state }

    /// Process one decoded message, returning the state entered.
    ///
    /// # Errors
    ///
    /// Returns a [`Fatal`] when the connection must close: a message invalid
    /// for the current state, rejected `Hello` credentials, or a failed
    /// machine reset. Recoverable failures never surface here; the fail-safe
    /// wrapper reports them and transitions to `Failed`.
    pub async fn process(
        &mut self,
        message: RequestMessage,
        ctx: &mut MachineContext,
    ) -> Result<ConnectionState, Fatal> {
        tracing::trace!(
            connection_id = %ctx.connection_id,
            state = %self.state,
            message = %message,
            "processing message"
        );

        // Interrupt preempts whatever the current state would do with it.
        if matches!(message, RequestMessage::Interrupt) {
            ctx.raise_interrupt();
            self.state = ConnectionState::Interrupted;
            return Ok(self.state);
        }

        let outcome = match self.state {
            ConnectionState::Connected => {
                Self::failsafe(Self::process_connected(message, ctx), ctx)
            }
            ConnectionState::Ready => Self::failsafe(Self::process_ready(message, ctx).await, ctx),
            ConnectionState::Streaming => Self::failsafe(
                Self::process_streaming(StreamTarget::TOP_LEVEL, self.state, message, ctx).await,
                ctx,
            ),
            ConnectionState::TxReady => {
                Self::failsafe(Self::process_tx_ready(message, ctx).await, ctx)
            }
            ConnectionState::TxStreaming => Self::failsafe(
                Self::process_streaming(StreamTarget::IN_TRANSACTION, self.state, message, ctx)
                    .await,
                ctx,
            ),
            ConnectionState::Failed => Self::process_failed(message, ctx),
            ConnectionState::Interrupted => Self::process_interrupted(message, ctx).await,
        };

        match outcome {
            Ok(next) => {
                if next != self.state {
                    tracing::trace!(
                        connection_id = %ctx.connection_id,
                        from = %self.state,
                        to = %next,
                        "state transition"
                    );
                }
                self.state = next;
                Ok(next)
            }
            Err(fatal) => {
                tracing::error!(
                    connection_id = %ctx.connection_id,
                    state = %self.state,
                    error = %fatal,
                    "fatal transition; closing connection"
                );
                Err(fatal)
            }
        }
    }

    /// The uniform fail-safe policy: recoverable errors are reported through
    /// the context and become a `Failed` transition instead of propagating.
    fn failsafe(outcome: Transition, ctx: &mut MachineContext) -> Result<ConnectionState, Fatal> {
        match outcome {
            Ok(next) => Ok(next),
            Err(StateError::Fatal(fatal)) => Err(fatal),
            Err(StateError::Recoverable(cause)) => {
                ctx.handle_failure(&cause);
                Ok(ConnectionState::Failed)
            }
        }
    }

    fn violation(state: ConnectionState, message: &RequestMessage) -> StateError {
        StateError::Fatal(Fatal::ProtocolViolation {
            state,
            message: message.name(),
        })
    }

    fn process_connected(message: RequestMessage, ctx: &mut MachineContext) -> Transition {
        match message {
            RequestMessage::Hello {
                user_agent,
                auth_token,
            } => {
                if let Err(cause) = ctx.authenticator.authenticate(&user_agent, &auth_token) {
                    ctx.handle_failure(&cause);
                    return Err(StateError::Fatal(Fatal::AuthenticationFailed(cause)));
                }
                let connection_id = ctx.connection_id.to_string();
                ctx.on_metadata("connection_id", Value::String(connection_id));
                ctx.metadata
                    .insert("user_agent".to_owned(), Value::String(user_agent));
                ctx.sink.on_success();
                Ok(ConnectionState::Ready)
            }
            other => Err(Self::violation(ConnectionState::Connected, &other)),
        }
    }

    async fn process_ready(message: RequestMessage, ctx: &mut MachineContext) -> Transition {
        match message {
            RequestMessage::Run {
                statement,
                parameters,
                options,
            } => {
                Self::run_statement(ctx, &statement, &parameters, &options).await?;
                Ok(ConnectionState::Streaming)
            }
            RequestMessage::Begin { options } => {
                ctx.processor.begin_transaction(&options).await?;
                ctx.sink.on_success();
                Ok(ConnectionState::TxReady)
            }
            other => Err(Self::violation(ConnectionState::Ready, &other)),
        }
    }

    async fn process_tx_ready(message: RequestMessage, ctx: &mut MachineContext) -> Transition {
        match message {
            RequestMessage::Run {
                statement,
                parameters,
                options,
            } => {
                Self::run_statement(ctx, &statement, &parameters, &options).await?;
                Ok(ConnectionState::TxStreaming)
            }
            RequestMessage::Commit => {
                let bookmark = ctx.processor.commit_transaction().await?;
                ctx.on_metadata("bookmark", Value::String(bookmark.0));
                ctx.sink.on_success();
                Ok(ConnectionState::Ready)
            }
            RequestMessage::Rollback => {
                ctx.processor.rollback_transaction().await?;
                ctx.sink.on_success();
                Ok(ConnectionState::Ready)
            }
            other => Err(Self::violation(ConnectionState::TxReady, &other)),
        }
    }

    async fn process_streaming(
        target: StreamTarget,
        current: ConnectionState,
        message: RequestMessage,
        ctx: &mut MachineContext,
    ) -> Transition {
        let spec = match message {
            RequestMessage::PullAll => StreamSpec::pull_all(),
            RequestMessage::DiscardAll => StreamSpec::discard_all(),
            other => return Err(Self::violation(current, &other)),
        };

        let bookmark = ctx.processor.stream_result(spec, ctx.sink.as_mut()).await?;
        if target.attach_bookmark
            && let Some(bookmark) = bookmark
        {
            ctx.on_metadata("bookmark", Value::String(bookmark.0));
        }
        ctx.sink.on_success();
        Ok(target.return_to)
    }

    fn process_failed(
        message: RequestMessage,
        ctx: &mut MachineContext,
    ) -> Result<ConnectionState, Fatal> {
        match message {
            RequestMessage::Run { .. }
            | RequestMessage::PullAll
            | RequestMessage::DiscardAll
            | RequestMessage::Commit
            | RequestMessage::Rollback => {
                ctx.sink.on_ignored();
                Ok(ConnectionState::Failed)
            }
            other => Err(Fatal::ProtocolViolation {
                state: ConnectionState::Failed,
                message: other.name(),
            }),
        }
    }

    async fn process_interrupted(
        message: RequestMessage,
        ctx: &mut MachineContext,
    ) -> Result<ConnectionState, Fatal> {
        match message {
            RequestMessage::Reset => {
                let remaining = ctx.settle_interrupt();
                if remaining > 0 {
                    // More interrupts are in flight; this reset belongs to an
                    // earlier one and is acknowledged as ignored.
                    ctx.sink.on_ignored();
                    return Ok(ConnectionState::Interrupted);
                }
                match ctx.processor.reset().await {
                    Ok(()) => {
                        ctx.sink.on_success();
                        Ok(ConnectionState::Ready)
                    }
                    Err(cause) => Err(Fatal::ResetFailed(cause)),
                }
            }
            RequestMessage::Run { .. }
            | RequestMessage::PullAll
            | RequestMessage::DiscardAll
            | RequestMessage::Commit
            | RequestMessage::Rollback => {
                ctx.sink.on_ignored();
                Ok(ConnectionState::Interrupted)
            }
            other => Err(Fatal::ProtocolViolation {
                state: ConnectionState::Interrupted,
                message: other.name(),
            }),
        }
    }

    /// Start a statement and record its timing metadata.
    async fn run_statement(
        ctx: &mut MachineContext,
        statement: &str,
        parameters: &ValueMap,
        options: &TransactionOptions,
    ) -> Result<(), ProcessorError> {
        let started = ctx.clock.millis();
        let outcome = ctx.processor.run(statement, parameters, options).await?;
        let available_after = ctx.clock.millis().saturating_sub(started);

        let fields = outcome.fields.into_iter().map(Value::String).collect();
        ctx.on_metadata("fields", Value::List(fields));
        ctx.on_metadata(
            "result_available_after",
            Value::Integer(i64::try_from(available_after).unwrap_or(i64::MAX)),
        );
        ctx.sink.on_success();
        Ok(())
    }
}
