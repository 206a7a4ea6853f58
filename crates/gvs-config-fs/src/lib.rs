// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Filesystem-backed `ConfigStore` for gvs tools (uses platform config dir).

use directories::ProjectDirs;
use gvs_app_core::config::{ConfigError, ConfigStore};
use std::fs;
use std::path::{Path, PathBuf};

/// Store configs as JSON files under a base directory.
pub struct FsConfigStore {
    base: PathBuf,
}

impl FsConfigStore {
    /// Create a store rooted at the user config directory (e.g., `~/.config/gvs`).
    pub fn new() -> Result<Self, ConfigError> {
        let proj = ProjectDirs::from("dev", "flyingrobots", "gvs")
            .ok_or(ConfigError::NoConfigDir)?;
        Self::with_base(proj.config_dir())
    }

    /// Create a store rooted at `base`, creating the directory if needed.
    pub fn with_base(base: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let base = base.as_ref().to_path_buf();
        fs::create_dir_all(&base)?;
        Ok(Self { base })
    }

    /// Directory the store writes into.
    pub fn base(&self) -> &Path {
        &self.base
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base.join(format!("{key}.json"))
    }
}

impl ConfigStore for FsConfigStore {
    fn load_raw(&self, key: &str) -> Result<Option<Vec<u8>>, ConfigError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, data)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use gvs_app_core::config::{ConfigService, Prefs, PrefsSource};
    use gvs_app_core::prefs::ClientPrefs;

    #[test]
    fn missing_key_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsConfigStore::with_base(dir.path()).unwrap();
        assert!(store.load_raw("nope").unwrap().is_none());
    }

    #[test]
    fn prefs_persist_as_json_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsConfigStore::with_base(dir.path().join("nested")).unwrap();
        let service = ConfigService::new(store);

        let prefs = ClientPrefs {
            client_name: "inspector".into(),
            latest_only: true,
            ..ClientPrefs::default()
        };
        service.save(&prefs).unwrap();
        assert!(dir.path().join("nested/gvs_client.json").exists());

        let loaded: Option<ClientPrefs> = service.load().unwrap();
        assert_eq!(loaded, Some(prefs));
    }

    #[test]
    fn load_or_init_writes_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let service = ConfigService::new(FsConfigStore::with_base(dir.path()).unwrap());
        let (prefs, source) = service.load_or_init::<ClientPrefs>();
        assert_eq!(prefs, ClientPrefs::default());
        assert_eq!(source, PrefsSource::Initialized);
        assert!(dir.path().join("gvs_client.json").exists());

        let (_, source) = service.load_or_init::<ClientPrefs>();
        assert_eq!(source, PrefsSource::Stored);
    }

    #[test]
    fn hand_edited_garbage_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("{}.json", ClientPrefs::KEY));
        fs::write(&path, b"{ client_name: oops").unwrap();
        let service = ConfigService::new(FsConfigStore::with_base(dir.path()).unwrap());

        let (prefs, source) = service.load_or_init::<ClientPrefs>();
        assert_eq!(prefs, ClientPrefs::default());
        assert_eq!(source, PrefsSource::Defaulted);
        // the user's file is left for them to fix
        assert_eq!(fs::read(&path).unwrap(), b"{ client_name: oops");
    }
}
