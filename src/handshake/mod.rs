//! One-shot protocol version negotiation.
//!
//! A connection opens with a 20-byte handshake: the 4-byte magic preamble
//! followed by four 4-byte big-endian version proposals in descending
//! preference, zero-padded. [`Negotiator::perform`] is called as bytes
//! arrive and tolerates arbitrary fragmentation, including splits inside the
//! magic or a version word. Exactly one terminal outcome occurs per
//! connection; afterwards the negotiator is discarded.

mod registry;
mod version;

use std::{fmt, sync::Arc};

use bytes::{Buf, BytesMut};

pub use registry::{ProtocolHandler, ProtocolRegistry};
pub use version::ProtocolVersion;

/// Magic preamble opening every handshake. A literal wire constant shared by
/// all implementations of the protocol.
pub const HANDSHAKE_MAGIC: [u8; 4] = [0x60, 0x60, 0xB0, 0x17];

/// Number of version proposals in a handshake.
pub const PROPOSAL_COUNT: usize = 4;

/// Total handshake length: magic plus four 4-byte proposals.
pub const HANDSHAKE_LEN: usize = HANDSHAKE_MAGIC.len() + PROPOSAL_COUNT * 4;

/// Transport security the server requires before negotiating.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SecurityRequirement {
    /// Accept both plaintext and encrypted connections.
    #[default]
    Optional,
    /// Refuse to negotiate unless the transport is encrypted.
    Required,
}

/// Resolution of one [`Negotiator::perform`] call.
pub enum HandshakeOutcome {
    /// Fewer than 20 bytes have arrived; call again with more.
    Partial,
    /// The magic preamble did not match. Permanent; no retry.
    Invalid,
    /// The transport does not meet the configured security requirement.
    Insecure,
    /// None of the proposed versions is supported.
    NoApplicableProtocol,
    /// A version was selected and its handler constructed.
    Chosen(Box<dyn ProtocolHandler>),
}

impl HandshakeOutcome {
    /// Stable outcome name for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Partial => "partial",
            Self::Invalid => "invalid",
            Self::Insecure => "insecure",
            Self::NoApplicableProtocol => "no applicable protocol",
            Self::Chosen(_) => "chosen",
        }
    }

    /// Whether this outcome ends negotiation for the connection.
    #[must_use]
    pub const fn is_terminal(&self) -> bool { !matches!(self, Self::Partial) }
}

impl fmt::Debug for HandshakeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chosen(handler) => f
                .debug_tuple("Chosen")
                .field(&handler.version())
                .finish(),
            other => f.write_str(other.name()),
        }
    }
}

/// Incremental handshake reader and version chooser.
///
/// Created once per connection and discarded after the first terminal
/// outcome. Bytes beyond the 20-byte handshake are retained untouched and
/// belong to the chosen version's framing layer; fetch them with
/// [`take_remainder`](Self::take_remainder).
pub struct Negotiator {
    registry: Arc<ProtocolRegistry>,
    requirement: SecurityRequirement,
    transport_encrypted: bool,
    buffer: BytesMut,
    resolved: bool,
}

impl Negotiator {
    /// Create a negotiator for one connection.
    ///
    /// `transport_encrypted` reports whether the underlying transport is
    /// secured; this engine only consults the flag, it never terminates TLS.
    #[must_use]
    pub fn new(
        registry: Arc<ProtocolRegistry>,
        requirement: SecurityRequirement,
        transport_encrypted: bool,
    ) -> Self {
        Self {
            registry,
            requirement,
            transport_encrypted,
            buffer: BytesMut::with_capacity(HANDSHAKE_LEN),
            resolved: false,
        }
    }

    /// Consume newly arrived bytes and attempt to resolve the handshake.
    ///
    /// Returns [`HandshakeOutcome::Partial`] until 20 bytes are buffered;
    /// every other outcome is terminal. Calling again after a terminal
    /// outcome is a caller bug: debug builds assert, release builds report
    /// [`HandshakeOutcome::Invalid`].
    pub fn perform(&mut self, bytes: &[u8]) -> HandshakeOutcome {
        if self.resolved {
            debug_assert!(false, "negotiator invoked after terminal outcome");
            return HandshakeOutcome::Invalid;
        }

        self.buffer.extend_from_slice(bytes);
        if self.buffer.len() < HANDSHAKE_LEN {
            return HandshakeOutcome::Partial;
        }

        let outcome = self.resolve();
        self.resolved = true;
        tracing::debug!(outcome = outcome.name(), "handshake resolved");
        outcome
    }

    /// Bytes received beyond the handshake, owed to the next layer.
    ///
    /// Only meaningful after [`HandshakeOutcome::Chosen`].
    #[must_use]
    pub fn take_remainder(&mut self) -> BytesMut { self.buffer.split() }

    fn resolve(&mut self) -> HandshakeOutcome {
        if self.buffer[..HANDSHAKE_MAGIC.len()] != HANDSHAKE_MAGIC {
            tracing::warn!(
                preamble = ?&self.buffer[..HANDSHAKE_MAGIC.len()],
                "handshake rejected: bad magic preamble"
            );
            return HandshakeOutcome::Invalid;
        }

        if self.requirement == SecurityRequirement::Required && !self.transport_encrypted {
            tracing::warn!("handshake rejected: encryption required but transport is plaintext");
            return HandshakeOutcome::Insecure;
        }

        let proposals = self.read_proposals();
        for version in proposals {
            if version.is_none() {
                continue;
            }
            if let Some(handler) = self.registry.create(version) {
                // Consume exactly the handshake; surplus bytes stay buffered
                // for the chosen version's framing layer.
                self.buffer.advance(HANDSHAKE_LEN);
                tracing::info!(%version, "protocol version chosen");
                return HandshakeOutcome::Chosen(handler);
            }
        }

        tracing::warn!(
            proposed = ?self.read_proposals(),
            supported = ?self.registry.versions(),
            "handshake rejected: no applicable protocol"
        );
        HandshakeOutcome::NoApplicableProtocol
    }

    fn read_proposals(&self) -> [ProtocolVersion; PROPOSAL_COUNT] {
        let mut proposals = [ProtocolVersion::NONE; PROPOSAL_COUNT];
        for (slot, version) in proposals.iter_mut().enumerate() {
            let start = HANDSHAKE_MAGIC.len() + slot * 4;
            let word: [u8; 4] = self.buffer[start..start + 4]
                .try_into()
                .expect("proposal slot is exactly four bytes");
            *version = ProtocolVersion::new(u32::from_be_bytes(word));
        }
        proposals
    }
}

impl fmt::Debug for Negotiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Negotiator")
            .field("buffered", &self.buffer.len())
            .field("resolved", &self.resolved)
            .finish_non_exhaustive()
    }
}
