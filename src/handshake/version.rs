//! Protocol version identifiers proposed during the handshake.

use std::fmt;

/// A protocol version as carried on the wire: an unsigned 32-bit integer,
/// big-endian encoded. The full range is meaningful, including
/// `0xFFFF_FFFF`; zero marks an unused proposal slot.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ProtocolVersion(pub u32);

impl ProtocolVersion {
    /// The reserved "no version" value used to pad unused proposal slots.
    pub const NONE: Self = Self(0);

    /// Create a version from its wire value.
    #[must_use]
    pub const fn new(value: u32) -> Self { Self(value) }

    /// Return the wire value.
    #[must_use]
    pub const fn as_u32(self) -> u32 { self.0 }

    /// Whether this is the padding value rather than a real proposal.
    #[must_use]
    pub const fn is_none(self) -> bool { self.0 == 0 }
}

impl From<u32> for ProtocolVersion {
    fn from(value: u32) -> Self { Self(value) }
}

impl From<ProtocolVersion> for u32 {
    fn from(value: ProtocolVersion) -> Self { value.0 }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}
