//! Identifier allocation for router connections.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

/// Identifier assigned to an accepted connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl From<u64> for ConnectionId {
    fn from(value: u64) -> Self { Self(value) }
}

impl ConnectionId {
    /// Create a new [`ConnectionId`] with the provided value.
    #[must_use]
    pub fn new(id: u64) -> Self { Self(id) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "conn-{}", self.0) }
}

/// Monotonic source of [`ConnectionId`]s.
///
/// One generator is created per server and shared by `Arc`; identifiers are
/// unique for the generator's lifetime and start at one.
///
/// ```
/// use relaycore::id::IdGenerator;
///
/// let ids = IdGenerator::new();
/// assert_eq!(ids.next_id().as_u64(), 1);
/// assert_eq!(ids.next_id().as_u64(), 2);
/// ```
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl Default for IdGenerator {
    fn default() -> Self { Self::new() }
}

impl IdGenerator {
    /// Create a generator whose first identifier is one.
    #[must_use]
    pub const fn new() -> Self { Self::starting_at(1) }

    /// Create a generator whose first identifier is `first`.
    #[must_use]
    pub const fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Allocate the next identifier.
    pub fn next_id(&self) -> ConnectionId {
        ConnectionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Arc, thread};

    use super::*;

    #[test]
    fn identifiers_are_unique_across_threads() {
        let ids = Arc::new(IdGenerator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = Arc::clone(&ids);
                thread::spawn(move || (0..250).map(|_| ids.next_id()).collect::<Vec<_>>())
            })
            .collect();
        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().expect("worker thread") {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 1000);
    }

    #[test]
    fn display_uses_connection_prefix() {
        assert_eq!(IdGenerator::starting_at(7).next_id().to_string(), "conn-7");
    }
}
