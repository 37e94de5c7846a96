//! Registry mapping supported protocol versions to handler factories.

use std::collections::HashMap;

use super::version::ProtocolVersion;
use crate::chunking::FramingError;

/// A version-specific inbound byte handler produced once a version is chosen.
///
/// The handler owns the dechunker and codec for its version and everything
/// downstream of them. Bytes left over from the handshake, and all bytes that
/// follow, are fed through [`handle_inbound`](Self::handle_inbound).
pub trait ProtocolHandler: Send {
    /// The version this handler speaks.
    fn version(&self) -> ProtocolVersion;

    /// Consume raw inbound bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`FramingError`] when framing or payload decoding fails;
    /// the connection must then be closed without further framing attempts.
    fn handle_inbound(&mut self, bytes: &[u8]) -> Result<(), FramingError>;
}

type HandlerFactory = Box<dyn Fn() -> Box<dyn ProtocolHandler> + Send + Sync>;

/// Supported-version lookup used by the negotiator.
///
/// One registry is built at server startup and shared by every connection;
/// each successful handshake invokes the matching factory to build that
/// connection's handler.
#[derive(Default)]
pub struct ProtocolRegistry {
    factories: HashMap<ProtocolVersion, HandlerFactory>,
}

impl ProtocolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register a factory for `version`, replacing any previous entry.
    pub fn register<F, H>(&mut self, version: ProtocolVersion, factory: F)
    where
        F: Fn() -> H + Send + Sync + 'static,
        H: ProtocolHandler + 'static,
    {
        let boxed: HandlerFactory =
            Box::new(move || Box::new(factory()) as Box<dyn ProtocolHandler>);
        self.factories.insert(version, boxed);
    }

    /// Whether `version` has a registered handler factory.
    #[must_use]
    pub fn supports(&self, version: ProtocolVersion) -> bool {
        self.factories.contains_key(&version)
    }

    /// Build a handler for `version`, if supported.
    #[must_use]
    pub fn create(&self, version: ProtocolVersion) -> Option<Box<dyn ProtocolHandler>> {
        self.factories.get(&version).map(|factory| factory())
    }

    /// Versions currently registered, in no particular order.
    #[must_use]
    pub fn versions(&self) -> Vec<ProtocolVersion> { self.factories.keys().copied().collect() }
}

impl std::fmt::Debug for ProtocolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolRegistry")
            .field("versions", &self.versions())
            .finish()
    }
}
