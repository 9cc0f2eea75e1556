//! Table of outstanding corrective writes.
//!
//! The cookie store reports a write as a removal followed by an addition.
//! While a key is locked the engine ignores the removal half of its own
//! write; the confirming addition unlocks it.

use crate::cookies::canonical_cookie::canonical_domain;
use std::collections::HashSet;

/// Composite (name, domain) key. The domain is stored canonicalized so
/// `example.com` and `.example.com` share one key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey {
    pub name: String,
    pub domain: String,
}

impl LockKey {
    pub fn new(name: impl Into<String>, domain: &str) -> Self {
        Self {
            name: name.into(),
            domain: canonical_domain(domain),
        }
    }
}

/// Set of locked keys. Owned by one engine; never persisted.
#[derive(Debug, Default, Clone)]
pub struct MutationLock {
    keys: HashSet<LockKey>,
}

impl MutationLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self, name: &str, domain: &str) -> bool {
        self.keys.contains(&LockKey::new(name, domain))
    }

    /// Lock a key. Locking twice is the same as locking once.
    pub fn lock(&mut self, name: &str, domain: &str) {
        let key = LockKey::new(name, domain);
        tracing::trace!(name = %key.name, domain = %key.domain, "lock");
        self.keys.insert(key);
    }

    /// Unlock a key. Unlocking an absent key is a no-op.
    pub fn unlock(&mut self, name: &str, domain: &str) {
        let key = LockKey::new(name, domain);
        if self.keys.remove(&key) {
            tracing::trace!(name = %key.name, domain = %key.domain, "unlock");
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    pub fn keys(&self) -> impl Iterator<Item = &LockKey> + '_ {
        self.keys.iter()
    }
}
