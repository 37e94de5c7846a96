//! Out-of-band control handle for a live connection.

use std::sync::{Arc, Weak};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::message::RequestMessage;

/// Shared state behind [`ConnectionHandle`].
#[derive(Debug)]
pub(crate) struct HandleInner {
    pub(crate) interrupts: mpsc::UnboundedSender<()>,
    pub(crate) cancel: CancellationToken,
}

/// Cheap, cloneable handle for interrupting or closing a connection.
///
/// The I/O side and out-of-band tasks hold handles; the worker holds the
/// receiving ends. Interrupts bypass the ordinary message FIFO.
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    inner: Arc<HandleInner>,
}

impl ConnectionHandle {
    pub(crate) fn new(
        interrupts: mpsc::UnboundedSender<()>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner { interrupts, cancel }),
        }
    }

    /// Signal an interrupt ahead of all queued ordinary messages.
    ///
    /// Returns `false` when the worker is already gone.
    pub fn interrupt(&self) -> bool { self.inner.interrupts.send(()).is_ok() }

    /// Forcibly close the connection. The worker rolls back any open
    /// transaction before exiting.
    pub fn close(&self) { self.inner.cancel.cancel(); }

    /// Whether close has been requested.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.inner.cancel.is_cancelled() }

    pub(crate) fn downgrade(&self) -> Weak<HandleInner> { Arc::downgrade(&self.inner) }

    pub(crate) fn from_arc(inner: Arc<HandleInner>) -> Self { Self { inner } }
}

/// Sink side of the worker queues: routes [`RequestMessage::Interrupt`] onto
/// the preemption channel and everything else onto the FIFO.
#[derive(Clone, Debug)]
pub struct InboundQueue {
    pub(crate) messages: mpsc::UnboundedSender<RequestMessage>,
    pub(crate) handle: ConnectionHandle,
}
