// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! In-memory prefs store with a call journal and injectable faults.

use gvs_app_core::config::{ConfigError, ConfigStore, Prefs};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// One call made against an [`InMemoryConfigStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    /// `load_raw(key)`.
    Load(String),
    /// `save_raw(key, ..)`.
    Save(String),
}

/// Failure mode of an [`InMemoryConfigStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreFault {
    /// Every call succeeds.
    #[default]
    Healthy,
    /// Loads fail; saves still land.
    Unreadable,
    /// Saves fail; loads still work.
    ReadOnly,
}

/// `ConfigStore` fake. Clones share documents, journal and fault, so a test
/// hands one clone to a `ConfigService` and inspects another.
///
/// ```
/// use gvs_app_core::config::{ConfigService, Prefs, PrefsSource};
/// use gvs_app_core::prefs::ClientPrefs;
/// use gvs_dry_tests::InMemoryConfigStore;
///
/// let store = InMemoryConfigStore::new();
/// let service = ConfigService::new(store.clone());
///
/// let (prefs, source) = service.load_or_init::<ClientPrefs>();
/// assert_eq!(prefs, ClientPrefs::default());
/// assert_eq!(source, PrefsSource::Initialized);
/// assert!(store.document(ClientPrefs::KEY).is_some());
/// ```
#[derive(Clone, Default)]
pub struct InMemoryConfigStore {
    inner: Arc<Mutex<Shelf>>,
}

#[derive(Default)]
struct Shelf {
    documents: BTreeMap<String, Vec<u8>>,
    journal: Vec<StoreCall>,
    fault: StoreFault,
}

impl InMemoryConfigStore {
    /// Empty, healthy store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed raw bytes under `key`. Not journaled.
    #[must_use]
    pub fn with_document(self, key: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.shelf().documents.insert(key.to_string(), bytes.into());
        self
    }

    /// Seed `prefs` encoded the way `ConfigService` writes them.
    #[must_use]
    pub fn with_prefs<P: Prefs>(self, prefs: &P) -> Self {
        let bytes = serde_json::to_vec_pretty(prefs).unwrap_or_default();
        self.with_document(P::KEY, bytes)
    }

    fn shelf(&self) -> MutexGuard<'_, Shelf> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Switch the failure mode for subsequent calls.
    pub fn set_fault(&self, fault: StoreFault) {
        self.shelf().fault = fault;
    }

    /// Calls made so far, failed ones included, oldest first.
    pub fn journal(&self) -> Vec<StoreCall> {
        self.shelf().journal.clone()
    }

    /// Number of `save_raw` attempts.
    pub fn save_attempts(&self) -> usize {
        self.shelf()
            .journal
            .iter()
            .filter(|call| matches!(call, StoreCall::Save(_)))
            .count()
    }

    /// Bytes currently stored under `key`.
    pub fn document(&self, key: &str) -> Option<Vec<u8>> {
        self.shelf().documents.get(key).cloned()
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn load_raw(&self, key: &str) -> Result<Option<Vec<u8>>, ConfigError> {
        let mut shelf = self.shelf();
        shelf.journal.push(StoreCall::Load(key.to_string()));
        if shelf.fault == StoreFault::Unreadable {
            return Err(ConfigError::Unavailable(format!("load {key}: injected")));
        }
        Ok(shelf.documents.get(key).cloned())
    }

    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
        let mut shelf = self.shelf();
        shelf.journal.push(StoreCall::Save(key.to_string()));
        if shelf.fault == StoreFault::ReadOnly {
            return Err(ConfigError::Unavailable(format!("save {key}: injected")));
        }
        shelf.documents.insert(key.to_string(), data.to_vec());
        Ok(())
    }
}
