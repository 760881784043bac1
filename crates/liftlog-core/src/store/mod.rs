//! Namespaced local persistence.
//!
//! The engine consumes a [`KeyValueStore`] capability and layers the
//! account-namespace lifecycle on top: keys are scoped as
//! `<logical-key>__<namespace>`, one namespace is active at a time, and
//! handles from a switched-away namespace lose the ability to write.

mod sqlite;

pub use sqlite::SqliteStore;

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// Well-known logical keys for persisted collections.
pub mod keys {
    /// Workout sessions cached for the active account
    pub const SESSIONS: &str = "workout_sessions";
    /// Pending outbox mutations
    pub const OUTBOX: &str = "sync_outbox";
    /// Personal-record cache
    pub const RECORDS: &str = "personal_records";
}

/// Capability trait for flat key-value persistence.
///
/// Read/write are synchronous from the engine's perspective.
pub trait KeyValueStore: Send + Sync {
    /// Read a raw value, `None` when absent.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a raw value.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key if present.
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory store used by tests and guest mode before any disk path exists.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// Account-scoped storage partition. Exactly one is active at a time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Local-only mode, no signed-in account
    Guest,
    /// A signed-in account
    Account(String),
}

impl Namespace {
    /// Build a namespace from an optional account id.
    #[must_use]
    pub fn from_account(account_id: Option<String>) -> Self {
        match crate::util::normalize_text_option(account_id) {
            Some(id) => Self::Account(id),
            None => Self::Guest,
        }
    }

    /// Suffix appended to logical keys for this namespace.
    #[must_use]
    pub fn as_key(&self) -> &str {
        match self {
            Self::Guest => "guest",
            Self::Account(id) => id,
        }
    }

    /// The account id, `None` in guest mode.
    #[must_use]
    pub fn account_id(&self) -> Option<&str> {
        match self {
            Self::Guest => None,
            Self::Account(id) => Some(id),
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_key())
    }
}

/// Generation-stamped grant to read and write one namespace.
///
/// A handle issued before a [`NamespaceStore::switch_namespace`] call is
/// stale afterwards; the store rejects its writes so a slow in-flight
/// pass from a previous account can never land data in the new one.
#[derive(Debug, Clone)]
pub struct NamespaceHandle {
    namespace: Namespace,
    generation: u64,
}

impl NamespaceHandle {
    /// The namespace this handle grants access to.
    #[must_use]
    pub const fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// The account id, `None` in guest mode.
    #[must_use]
    pub fn account_id(&self) -> Option<&str> {
        self.namespace.account_id()
    }
}

/// Namespace-scoped view over a [`KeyValueStore`], with a read cache that
/// is invalidated (not merely left stale) on every namespace switch.
pub struct NamespaceStore<S> {
    store: S,
    active: RwLock<(Namespace, u64)>,
    cache: Mutex<HashMap<String, String>>,
}

impl<S: KeyValueStore> NamespaceStore<S> {
    /// Wrap a key-value store, starting in the guest namespace.
    pub fn new(store: S) -> Self {
        Self {
            store,
            active: RwLock::new((Namespace::Guest, 0)),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Handle for the currently-active namespace.
    pub fn handle(&self) -> NamespaceHandle {
        let active = self
            .active
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        NamespaceHandle {
            namespace: active.0.clone(),
            generation: active.1,
        }
    }

    /// Activate `next`, invalidating cached views and all previously
    /// issued handles. Synchronous and ordered before any subsequent
    /// read/write: once this returns, only `next`'s data is observable.
    pub fn switch_namespace(&self, next: Namespace) -> NamespaceHandle {
        let mut active = self
            .active
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        active.0 = next.clone();
        active.1 += 1;
        let generation = active.1;
        drop(active);

        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        tracing::debug!("switched to namespace {next}");

        NamespaceHandle {
            namespace: next,
            generation,
        }
    }

    /// Whether a handle still refers to the active namespace.
    pub fn is_current(&self, handle: &NamespaceHandle) -> bool {
        let active = self
            .active
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        active.1 == handle.generation
    }

    fn ensure_current(&self, handle: &NamespaceHandle) -> Result<()> {
        if self.is_current(handle) {
            Ok(())
        } else {
            Err(Error::StaleNamespace(handle.namespace.to_string()))
        }
    }

    fn storage_key(handle: &NamespaceHandle, logical_key: &str) -> String {
        format!("{logical_key}__{}", handle.namespace.as_key())
    }

    /// Read a raw value for the handle's namespace.
    pub fn read_raw(&self, handle: &NamespaceHandle, logical_key: &str) -> Result<Option<String>> {
        self.ensure_current(handle)?;
        let key = Self::storage_key(handle, logical_key);

        {
            let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(value) = cache.get(&key) {
                return Ok(Some(value.clone()));
            }
        }

        let value = self.store.get(&key)?;
        if let Some(value) = &value {
            let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            cache.insert(key, value.clone());
        }
        Ok(value)
    }

    /// Write a raw value for the handle's namespace. Rejected with
    /// [`Error::StaleNamespace`] once the namespace has been switched away.
    pub fn write_raw(&self, handle: &NamespaceHandle, logical_key: &str, value: &str) -> Result<()> {
        self.ensure_current(handle)?;
        let key = Self::storage_key(handle, logical_key);
        self.store.set(&key, value)?;
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.insert(key, value.to_string());
        Ok(())
    }

    /// Read a serialized collection. Absent, unreadable, or corrupt data
    /// degrades to an empty collection; only a stale handle is an error.
    pub fn read_collection<T: DeserializeOwned>(
        &self,
        handle: &NamespaceHandle,
        logical_key: &str,
    ) -> Result<Vec<T>> {
        let raw = match self.read_raw(handle, logical_key) {
            Ok(raw) => raw,
            Err(Error::StaleNamespace(ns)) => return Err(Error::StaleNamespace(ns)),
            Err(error) => {
                tracing::warn!("read of {logical_key} failed, treating as empty: {error}");
                return Ok(Vec::new());
            }
        };

        let Some(raw) = raw else {
            return Ok(Vec::new());
        };

        match serde_json::from_str(&raw) {
            Ok(values) => Ok(values),
            Err(error) => {
                tracing::warn!("corrupt data under {logical_key}, treating as empty: {error}");
                Ok(Vec::new())
            }
        }
    }

    /// Serialize and write a collection for the handle's namespace.
    pub fn write_collection<T: Serialize>(
        &self,
        handle: &NamespaceHandle,
        logical_key: &str,
        values: &[T],
    ) -> Result<()> {
        let raw = serde_json::to_string(values)?;
        self.write_raw(handle, logical_key, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn scoped_keys_do_not_collide() {
        let store = NamespaceStore::new(MemoryStore::new());
        let guest = store.handle();
        store.write_raw(&guest, "k", "guest-value").unwrap();

        let alice = store.switch_namespace(Namespace::Account("alice".to_string()));
        assert_eq!(store.read_raw(&alice, "k").unwrap(), None);

        store.write_raw(&alice, "k", "alice-value").unwrap();
        assert_eq!(
            store.read_raw(&alice, "k").unwrap(),
            Some("alice-value".to_string())
        );
    }

    #[test]
    fn stale_handle_cannot_write_after_switch() {
        let store = NamespaceStore::new(MemoryStore::new());
        let alice = store.switch_namespace(Namespace::Account("alice".to_string()));
        let bob = store.switch_namespace(Namespace::Account("bob".to_string()));

        let result = store.write_raw(&alice, "k", "late-write");
        assert!(matches!(result, Err(Error::StaleNamespace(_))));

        // Nothing visible under either namespace.
        assert_eq!(store.read_raw(&bob, "k").unwrap(), None);
        let alice_again = store.switch_namespace(Namespace::Account("alice".to_string()));
        assert_eq!(store.read_raw(&alice_again, "k").unwrap(), None);
    }

    #[test]
    fn corrupt_collection_degrades_to_empty() {
        let store = NamespaceStore::new(MemoryStore::new());
        let handle = store.handle();
        store.write_raw(&handle, keys::SESSIONS, "{not json").unwrap();

        let sessions: Vec<crate::models::WorkoutSession> =
            store.read_collection(&handle, keys::SESSIONS).unwrap();
        assert!(sessions.is_empty());
    }

    #[test]
    fn collections_round_trip() {
        let store = NamespaceStore::new(MemoryStore::new());
        let handle = store.handle();

        let session = crate::models::WorkoutSession::new();
        store
            .write_collection(&handle, keys::SESSIONS, std::slice::from_ref(&session))
            .unwrap();

        let loaded: Vec<crate::models::WorkoutSession> =
            store.read_collection(&handle, keys::SESSIONS).unwrap();
        assert_eq!(loaded, vec![session]);
    }

    #[test]
    fn namespace_from_account_normalizes() {
        assert_eq!(Namespace::from_account(None), Namespace::Guest);
        assert_eq!(
            Namespace::from_account(Some("  ".to_string())),
            Namespace::Guest
        );
        assert_eq!(
            Namespace::from_account(Some("alice".to_string())),
            Namespace::Account("alice".to_string())
        );
    }
}
