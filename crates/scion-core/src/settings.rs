use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::SettingsError;

/// Process-wide string-to-string settings store shared by every unit.
///
/// Units never see this type directly: each [`HostApi`](crate::shim::HostApi)
/// prefixes keys with `"{unit_id}:"` so units cannot collide. Last write wins.
///
/// When opened with a path, every write is flushed to a JSON file so settings
/// survive a suite reload.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    inner: Arc<Mutex<BTreeMap<String, String>>>,
    path: Option<PathBuf>,
}

impl SettingsStore {
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BTreeMap::new())),
            path: None,
        }
    }

    /// Open a file-backed store, loading existing values if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        let values = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            BTreeMap::new()
        };
        tracing::debug!(path = %path.display(), entries = values.len(), "Settings store opened");
        Ok(Self {
            inner: Arc::new(Mutex::new(values)),
            path: Some(path),
        })
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".scion")
            .join("settings.json")
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    /// Store a value. A failed flush is logged, never surfaced: units rely on
    /// settings writes being infallible.
    pub fn set(&self, key: &str, value: &str) {
        let snapshot = {
            let mut values = self.lock();
            values.insert(key.to_string(), value.to_string());
            self.path.as_ref().map(|_| values.clone())
        };
        if let Some(values) = snapshot
            && let Err(e) = self.write_file(&values)
        {
            tracing::warn!(key, error = %e, "Failed to persist settings");
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Write the current contents to disk. No-op for in-memory stores.
    pub fn flush(&self) -> Result<(), SettingsError> {
        if self.path.is_none() {
            return Ok(());
        }
        let values = self.lock().clone();
        self.write_file(&values)
    }

    fn write_file(&self, values: &BTreeMap<String, String>) -> Result<(), SettingsError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(values)?)?;
        Ok(())
    }

    // A panic while holding the lock cannot leave the map half-written, so a
    // poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::in_memory()
    }
}
