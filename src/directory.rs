//! Identity store boundary
//!
//! The relay core does not own authentication; it only needs to resolve an
//! identity to its decoration when stamping outgoing records. This module
//! is the in-process stand-in for that store: identities are registered by
//! the session layer and assigned a random decoration, and lookups at
//! broadcast time fail for identities that were never registered.

use std::collections::HashMap;

use parking_lot::Mutex;
use rand::seq::SliceRandom;

use crate::types::Identity;

/// Decorations assigned to identities at registration, opaque to the relay.
pub const DECORATIONS: [&str; 5] = [
    r##"<svg viewBox="0 0 100 100" xmlns="http://www.w3.org/2000/svg"><circle cx="50" cy="50" r="50" fill="#ff7f50"/></svg>"##,
    r##"<svg viewBox="0 0 100 100" xmlns="http://www.w3.org/2000/svg"><circle cx="50" cy="50" r="50" fill="#6495ed"/></svg>"##,
    r##"<svg viewBox="0 0 100 100" xmlns="http://www.w3.org/2000/svg"><circle cx="50" cy="50" r="50" fill="#9acd32"/></svg>"##,
    r##"<svg viewBox="0 0 100 100" xmlns="http://www.w3.org/2000/svg"><circle cx="50" cy="50" r="50" fill="#ee82ee"/></svg>"##,
    r##"<svg viewBox="0 0 100 100" xmlns="http://www.w3.org/2000/svg"><circle cx="50" cy="50" r="50" fill="#ffdab9"/></svg>"##,
];

/// In-memory identity directory
///
/// Maps each known identity to its decoration. Shared across all
/// connections; its lock is independent of the registry and room locks.
#[derive(Debug, Default)]
pub struct Directory {
    entries: Mutex<HashMap<Identity, String>>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an identity, assigning a decoration if it is new
    ///
    /// Idempotent: re-registering keeps the existing decoration.
    pub fn register(&self, identity: &Identity) -> String {
        let mut entries = self.entries.lock();
        entries
            .entry(identity.clone())
            .or_insert_with(|| {
                let mut rng = rand::thread_rng();
                DECORATIONS
                    .choose(&mut rng)
                    .copied()
                    .unwrap_or_default()
                    .to_string()
            })
            .clone()
    }

    /// Resolve an identity to its decoration
    pub fn lookup(&self, identity: &Identity) -> Option<String> {
        self.entries.lock().get(identity).cloned()
    }
}
