//! Registry of active connection control handles.
//!
//! `SessionRegistry` stores non-owning weak references to
//! [`ConnectionHandle`]s, letting out-of-band tasks interrupt or forcibly
//! close live connections without keeping dead ones alive. Stale entries are
//! pruned opportunistically or lazily at lookup time.

use std::sync::Weak;

use dashmap::DashMap;

use crate::connection::ConnectionHandle;

/// Identifier assigned to a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl From<u64> for ConnectionId {
    fn from(value: u64) -> Self { Self(value) }
}

impl ConnectionId {
    /// Create a new [`ConnectionId`] with the provided value.
    #[must_use]
    pub const fn new(id: u64) -> Self { Self(id) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub const fn as_u64(&self) -> u64 { self.0 }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "connection-{}", self.0)
    }
}

type WeakHandle = Weak<crate::connection::HandleInner>;

/// Concurrent registry of connection handles keyed by [`ConnectionId`].
#[derive(Default)]
pub struct SessionRegistry(DashMap<ConnectionId, WeakHandle>);

impl SessionRegistry {
    /// Retrieve a handle for `id` if the connection is still alive.
    ///
    /// A dead entry found here is evicted; a concurrent re-insert under the
    /// same id wins over the eviction.
    #[must_use]
    pub fn get(&self, id: &ConnectionId) -> Option<ConnectionHandle> {
        // The map guard is released inside `and_then`, before any eviction.
        let upgraded = self.0.get(id).and_then(|entry| entry.value().upgrade());
        if upgraded.is_none() {
            self.0.remove_if(id, |_, weak| weak.strong_count() == 0);
        }
        upgraded.map(ConnectionHandle::from_arc)
    }

    /// Insert a handle for a newly established connection.
    pub fn insert(&self, id: ConnectionId, handle: &ConnectionHandle) {
        self.0.insert(id, handle.downgrade());
    }

    /// Remove a handle, typically on connection teardown.
    pub fn remove(&self, id: &ConnectionId) { self.0.remove(id); }

    /// Interrupt the connection, if it is still alive.
    ///
    /// Returns `true` when the signal reached a live worker.
    pub fn interrupt(&self, id: &ConnectionId) -> bool {
        self.get(id).is_some_and(|handle| handle.interrupt())
    }

    /// Request closure of the connection, if it is still alive.
    pub fn close(&self, id: &ConnectionId) {
        if let Some(handle) = self.get(id) {
            handle.close();
        }
    }

    /// Remove all stale weak references.
    pub fn prune(&self) { self.0.retain(|_, weak| weak.strong_count() > 0); }

    /// Prune stale references, then return the IDs of live connections.
    #[must_use]
    pub fn active_ids(&self) -> Vec<ConnectionId> {
        let mut ids = Vec::with_capacity(self.0.len());
        self.0.retain(|id, weak| {
            if weak.strong_count() > 0 {
                ids.push(*id);
                true
            } else {
                false
            }
        });
        ids
    }
}
