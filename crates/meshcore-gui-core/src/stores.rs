//! Persistence collaborator interfaces
//!
//! Pinned contacts and room credentials live outside the bridge. The worker
//! only needs membership queries and key-value access, so both are traits;
//! the in-memory implementations back tests and act as defaults when no
//! persistent store is wired in.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Set of contact keys the user has pinned
pub trait PinnedContacts: Send + Sync {
    fn is_pinned(&self, pubkey: &str) -> bool;

    /// All pinned keys
    fn pinned(&self) -> Vec<String>;
}

/// Per-contact secrets, e.g. room server passwords
pub trait CredentialStore: Send + Sync {
    fn get(&self, pubkey: &str) -> Option<String>;
    fn set(&self, pubkey: &str, secret: &str);
    fn remove(&self, pubkey: &str);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ----------------------------------------------------------------------------
// In-memory Implementations
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryPinStore {
    keys: Mutex<BTreeSet<String>>,
}

impl MemoryPinStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pinned<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: Mutex::new(keys.into_iter().map(Into::into).collect()),
        }
    }

    /// Returns false if the key was already pinned
    pub fn pin(&self, pubkey: impl Into<String>) -> bool {
        lock(&self.keys).insert(pubkey.into())
    }

    pub fn unpin(&self, pubkey: &str) -> bool {
        lock(&self.keys).remove(pubkey)
    }
}

impl PinnedContacts for MemoryPinStore {
    fn is_pinned(&self, pubkey: &str) -> bool {
        lock(&self.keys).contains(pubkey)
    }

    fn pinned(&self) -> Vec<String> {
        lock(&self.keys).iter().cloned().collect()
    }
}

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    secrets: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.secrets).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, pubkey: &str) -> Option<String> {
        lock(&self.secrets).get(pubkey).cloned()
    }

    fn set(&self, pubkey: &str, secret: &str) {
        lock(&self.secrets).insert(pubkey.to_string(), secret.to_string());
    }

    fn remove(&self, pubkey: &str) {
        lock(&self.secrets).remove(pubkey);
    }
}
