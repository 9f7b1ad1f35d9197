//! Persisted integer settings.
//!
//! The workspace switcher remembers the last active workspace across
//! sessions through a `SettingsStore`. The shell uses a plist file
//! (`(:active-workspace 1)`); tests and `--no-persist` use memory.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::sexp;

/// Integer key-value store injected into components.
pub trait SettingsStore {
    fn get_int(&self, key: &str) -> Option<i64>;
    fn set_int(&mut self, key: &str, value: i64) -> anyhow::Result<()>;
}

impl<T: SettingsStore + ?Sized> SettingsStore for Box<T> {
    fn get_int(&self, key: &str) -> Option<i64> {
        (**self).get_int(key)
    }

    fn set_int(&mut self, key: &str, value: i64) -> anyhow::Result<()> {
        (**self).set_int(key, value)
    }
}

// ── Memory store ────────────────────────────────────────────

/// Volatile store; nothing survives the process.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: BTreeMap<String, i64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemoryStore {
    fn get_int(&self, key: &str) -> Option<i64> {
        self.values.get(key).copied()
    }

    fn set_int(&mut self, key: &str, value: i64) -> anyhow::Result<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}

// ── File store ──────────────────────────────────────────────

/// Plist-backed store, rewritten in full on every `set_int`.
#[derive(Debug)]
pub struct SexpFileStore {
    path: PathBuf,
    values: BTreeMap<String, i64>,
}

impl SexpFileStore {
    /// Open the store at `path`. A missing or malformed file yields an
    /// empty store; non-integer entries are dropped.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(text) => Self::parse(&text).unwrap_or_else(|| {
                warn!(?path, "malformed settings file, using defaults");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(?path, "no settings file yet");
                BTreeMap::new()
            }
            Err(e) => {
                warn!(?path, "failed to read settings file: {}", e);
                BTreeMap::new()
            }
        };
        info!(?path, entries = values.len(), "settings store opened");
        Self { path, values }
    }

    fn parse(text: &str) -> Option<BTreeMap<String, i64>> {
        let value = lexpr::from_str(text).ok()?;
        let mut values = BTreeMap::new();
        for (key, val) in sexp::plist_pairs(&value) {
            match val.as_i64() {
                Some(n) => {
                    values.insert(key, n);
                }
                None => warn!(key = %key, "ignoring non-integer setting"),
            }
        }
        Some(values)
    }

    fn render(&self) -> String {
        let body: Vec<String> = self
            .values
            .iter()
            .map(|(k, v)| format!(":{} {}", k, v))
            .collect();
        format!("({})\n", body.join(" "))
    }

    /// Default location: `$XDG_STATE_HOME/ewwm/vr-shell.el`, falling
    /// back to `~/.local/state`.
    pub fn default_path() -> PathBuf {
        let state_dir = std::env::var("XDG_STATE_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/state")
            });
        state_dir.join("ewwm").join("vr-shell.el")
    }
}

impl SettingsStore for SexpFileStore {
    fn get_int(&self, key: &str) -> Option<i64> {
        self.values.get(key).copied()
    }

    fn set_int(&mut self, key: &str, value: i64) -> anyhow::Result<()> {
        self.values.insert(key.to_string(), value);
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating settings dir {:?}", dir))?;

        // Temp file in the same directory so the rename stays on one filesystem.
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("creating temp file in {:?}", dir))?;
        tmp.write_all(self.render().as_bytes())
            .with_context(|| format!("writing settings file {:?}", self.path))?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|e| e.error)
            .with_context(|| format!("replacing settings file {:?}", self.path))?;
        debug!(key, value, path = ?self.path, "setting persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let mut store = MemoryStore::new();
        assert_eq!(store.get_int("active-workspace"), None);
        store.set_int("active-workspace", 2).unwrap();
        assert_eq!(store.get_int("active-workspace"), Some(2));
    }

    #[test]
    fn test_file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.el");

        let mut store = SexpFileStore::open(&path);
        assert_eq!(store.get_int("active-workspace"), None);
        store.set_int("active-workspace", 1).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.trim(), "(:active-workspace 1)");

        let reopened = SexpFileStore::open(&path);
        assert_eq!(reopened.get_int("active-workspace"), Some(1));
    }

    #[test]
    fn test_file_store_replaces_file_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.el");
        std::fs::write(&path, "(:active-workspace 0)").unwrap();

        let mut store = SexpFileStore::open(&path);
        store.set_int("active-workspace", 2).unwrap();
        store.set_int("launch-count", 7).unwrap();

        let reopened = SexpFileStore::open(&path);
        assert_eq!(reopened.get_int("active-workspace"), Some(2));
        assert_eq!(reopened.get_int("launch-count"), Some(7));

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("settings.el")]);
    }

    #[test]
    fn test_file_store_malformed_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.el");
        std::fs::write(&path, "(:active-workspace").unwrap();

        let store = SexpFileStore::open(&path);
        assert_eq!(store.get_int("active-workspace"), None);
    }

    #[test]
    fn test_file_store_drops_non_integer_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.el");
        std::fs::write(&path, "(:active-workspace :work :volume 7)").unwrap();

        let store = SexpFileStore::open(&path);
        assert_eq!(store.get_int("active-workspace"), None);
        assert_eq!(store.get_int("volume"), Some(7));
    }

    #[test]
    fn test_boxed_store_delegates() {
        let mut store: Box<dyn SettingsStore> = Box::new(MemoryStore::new());
        store.set_int("k", 5).unwrap();
        assert_eq!(store.get_int("k"), Some(5));
    }
}
