//! Stores own the authoritative local collections and mediate every mutation
//! through the persistence service. A collection is mutated only inside its
//! own store's methods; the in-memory copies are caches patched from the rows
//! the service returns.

pub mod categories;
pub mod groups;
pub mod tasks;

pub use categories::CategoryStore;
pub use groups::GroupStore;
pub use tasks::{TaskScope, TaskStore};

use std::collections::HashSet;

/// Suppresses duplicate submission of the same mutation while one is
/// outstanding, keyed per (operation, target identifier). Applied uniformly
/// to every mutating store method.
///
/// With exclusive `&mut` access to a store the duplicate branch is
/// unreachable; it only fires once a store is driven through a shared handle
/// (interior mutability, an actor loop) where calls can overlap.
#[derive(Debug, Default)]
pub(crate) struct InflightGuard {
    keys: HashSet<String>,
}

impl InflightGuard {
    /// Returns false when an identical mutation is already outstanding.
    pub fn begin(&mut self, key: &str) -> bool {
        self.keys.insert(key.to_string())
    }

    pub fn end(&mut self, key: &str) {
        self.keys.remove(key);
    }
}
