//! The per-connection worker task.
//!
//! Exactly one worker owns each connection's state machine and context. It
//! drains a biased `tokio::select!` over cancellation, the interrupt channel,
//! and the ordinary message FIFO, in that priority order, so a client's
//! interrupt preempts a long-running pull even though message processing may
//! block for arbitrary time. Socket writes happen only here, through the
//! context's response sink.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::handle::{ConnectionHandle, InboundQueue};
use crate::{
    chunking::{MessageSink, SinkClosed},
    machine::{MachineContext, StateMachine},
    message::RequestMessage,
};

impl MessageSink for InboundQueue {
    fn on_message(&mut self, message: RequestMessage) -> Result<(), SinkClosed> {
        if matches!(message, RequestMessage::Interrupt) {
            return if self.handle.interrupt() {
                Ok(())
            } else {
                Err(SinkClosed)
            };
        }
        self.messages.send(message).map_err(|_| SinkClosed)
    }
}

/// Drives one connection's state machine until close or a fatal error.
pub struct ConnectionWorker {
    machine: StateMachine,
    ctx: MachineContext,
    messages: mpsc::UnboundedReceiver<RequestMessage>,
    interrupts: mpsc::UnboundedReceiver<()>,
    cancel: CancellationToken,
}

impl ConnectionWorker {
    /// Wire up a worker and the queue/handle pair that feeds it.
    #[must_use]
    pub fn new(ctx: MachineContext) -> (Self, InboundQueue, ConnectionHandle) {
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let (interrupt_tx, interrupt_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = ConnectionHandle::new(interrupt_tx, cancel.clone());
        let queue = InboundQueue {
            messages: message_tx,
            handle: handle.clone(),
        };
        let worker = Self {
            machine: StateMachine::new(),
            ctx,
            messages: message_rx,
            interrupts: interrupt_rx,
            cancel: cancel.clone(),
        };
        (worker, queue, handle)
    }

    /// Current machine state, for tests and diagnostics.
    #[must_use]
    pub const fn state(&self) -> crate::machine::ConnectionState { self.machine.state() }

    /// Run until the connection closes.
    ///
    /// Exits when cancellation is requested, all queue senders are dropped,
    /// or a fatal transition occurs. Any open transaction is rolled back on
    /// the way out.
    pub async fn run(mut self) {
        let mut interrupts_open = true;
        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => break,

                interrupt = self.interrupts.recv(), if interrupts_open => {
                    match interrupt {
                        Some(()) => {
                            if !self.feed(RequestMessage::Interrupt).await {
                                break;
                            }
                        }
                        None => interrupts_open = false,
                    }
                }

                message = self.messages.recv() => {
                    match message {
                        Some(message) => {
                            if !self.feed(message).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
        self.teardown().await;
    }

    /// Process one message; `false` means the connection must close.
    async fn feed(&mut self, message: RequestMessage) -> bool {
        match self.machine.process(message, &mut self.ctx).await {
            Ok(_) => true,
            Err(_) => {
                // Already logged by the machine; stop accepting input.
                self.cancel.cancel();
                false
            }
        }
    }

    async fn teardown(&mut self) {
        if self.ctx.processor.has_transaction() {
            if let Err(error) = self.ctx.processor.rollback_transaction().await {
                tracing::warn!(
                    connection_id = %self.ctx.connection_id,
                    %error,
                    "rollback during teardown failed"
                );
            }
        }
        tracing::debug!(connection_id = %self.ctx.connection_id, "connection worker stopped");
    }
}
