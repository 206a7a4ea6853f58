// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Prefs persistence: a raw blob store port and the JSON service on top.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Storage port for raw prefs documents, keyed by [`Prefs::KEY`].
pub trait ConfigStore {
    /// Stored bytes for `key`, or `None` if nothing was ever saved.
    fn load_raw(&self, key: &str) -> Result<Option<Vec<u8>>, ConfigError>;
    /// Replace the bytes stored under `key`.
    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError>;
}

/// A prefs document with a fixed storage key.
pub trait Prefs: Serialize + DeserializeOwned + Default {
    /// Key the document is stored under.
    const KEY: &'static str;
}

/// Error type for prefs storage.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Filesystem failure in a store.
    #[error("config io: {0}")]
    Io(#[from] std::io::Error),
    /// A stored document is not valid JSON for its type.
    #[error("prefs `{key}` is malformed: {source}")]
    Malformed {
        /// Key of the offending document.
        key: &'static str,
        /// Decoder error.
        source: serde_json::Error,
    },
    /// The platform has no per-user config directory.
    #[error("no user config directory on this platform")]
    NoConfigDir,
    /// The store refused the operation.
    #[error("config store unavailable: {0}")]
    Unavailable(String),
}

/// How [`ConfigService::load_or_init`] obtained its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefsSource {
    /// Decoded from the store.
    Stored,
    /// Nothing was stored; defaults were written back.
    Initialized,
    /// Defaults used after a store or decode failure; nothing was written.
    Defaulted,
}

/// Encodes [`Prefs`] as pretty JSON over a [`ConfigStore`].
pub struct ConfigService<S> {
    store: S,
}

impl<S: ConfigStore> ConfigService<S> {
    /// Service over `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Stored prefs of type `P`. An absent or empty document is `Ok(None)`.
    pub fn load<P: Prefs>(&self) -> Result<Option<P>, ConfigError> {
        match self.store.load_raw(P::KEY)? {
            Some(bytes) if !bytes.is_empty() => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|source| ConfigError::Malformed {
                    key: P::KEY,
                    source,
                }),
            _ => Ok(None),
        }
    }

    /// Persist `prefs` under `P::KEY`.
    pub fn save<P: Prefs>(&self, prefs: &P) -> Result<(), ConfigError> {
        let data = serde_json::to_vec_pretty(prefs).map_err(|source| ConfigError::Malformed {
            key: P::KEY,
            source,
        })?;
        self.store.save_raw(P::KEY, &data)
    }

    /// Prefs for startup. Never fails: a missing document is initialized with
    /// defaults, and any store or decode error falls back to defaults with a
    /// warning.
    pub fn load_or_init<P: Prefs>(&self) -> (P, PrefsSource) {
        match self.load::<P>() {
            Ok(Some(prefs)) => {
                debug!(key = P::KEY, "loaded prefs");
                (prefs, PrefsSource::Stored)
            }
            Ok(None) => {
                let prefs = P::default();
                match self.save(&prefs) {
                    Ok(()) => {
                        debug!(key = P::KEY, "wrote default prefs");
                        (prefs, PrefsSource::Initialized)
                    }
                    Err(err) => {
                        warn!(key = P::KEY, %err, "could not persist default prefs");
                        (prefs, PrefsSource::Defaulted)
                    }
                }
            }
            Err(err) => {
                warn!(key = P::KEY, %err, "could not load prefs; using defaults");
                (P::default(), PrefsSource::Defaulted)
            }
        }
    }
}
