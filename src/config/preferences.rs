//! Local UI preferences
//!
//! Purely local settings (advanced mode, device auto-discovery) that never go
//! to the device. They are read once when a draft is created and written back
//! whenever one of the `interface.*` fields changes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{error, info};

use crate::constants::paths;
use crate::settings::{FieldPath, FieldValue, ValueSet};

/// Persisted local preferences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalPreferences {
    /// Advanced mode; shows the detailed skeleton toggles
    #[serde(default, alias = "debug")]
    pub devmode: bool,
    #[serde(default = "default_watch_new_devices")]
    pub watch_new_devices: bool,
}

fn default_watch_new_devices() -> bool {
    true
}

impl Default for LocalPreferences {
    fn default() -> Self {
        Self {
            devmode: false,
            watch_new_devices: default_watch_new_devices(),
        }
    }
}

impl LocalPreferences {
    /// Read the `interface.*` fields of a draft, keeping current values for missing ones
    pub fn updated_from(&self, values: &ValueSet) -> Self {
        Self {
            devmode: values.bool(FieldPath::Devmode).unwrap_or(self.devmode),
            watch_new_devices: values
                .bool(FieldPath::WatchNewDevices)
                .unwrap_or(self.watch_new_devices),
        }
    }

    /// Write these preferences into the `interface.*` fields of a draft
    pub fn apply_to(&self, values: &mut ValueSet) {
        values.insert(FieldPath::Devmode, FieldValue::Bool(self.devmode));
        values.insert(
            FieldPath::WatchNewDevices,
            FieldValue::Bool(self.watch_new_devices),
        );
    }
}

/// Key-value store backing [`LocalPreferences`]
pub trait PreferenceStore: Send {
    /// Load preferences. Never fails; unreadable stores yield defaults.
    fn load(&self) -> LocalPreferences;

    fn save(&mut self, preferences: &LocalPreferences) -> Result<()>;
}

/// Preferences stored as pretty JSON on disk
#[derive(Debug, Clone)]
pub struct FilePreferences {
    path: PathBuf,
}

impl FilePreferences {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// `<config_dir>/settings-sync/preferences.json`
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(paths::APP_DIR);
        path.push(paths::PREFERENCES_FILENAME);
        path
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferenceStore for FilePreferences {
    fn load(&self) -> LocalPreferences {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No preferences file, using defaults");
                return LocalPreferences::default();
            }
            Err(e) => {
                error!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to read preferences file, using defaults"
                );
                return LocalPreferences::default();
            }
        };

        match serde_json::from_str::<LocalPreferences>(&contents) {
            Ok(preferences) => {
                info!(path = %self.path.display(), "Loaded local preferences");
                preferences
            }
            Err(e) => {
                error!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to parse preferences file, using defaults"
                );
                LocalPreferences::default()
            }
        }
    }

    fn save(&mut self, preferences: &LocalPreferences) -> Result<()> {
        // Ensure config directory exists
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }

        let json = serde_json::to_string_pretty(preferences)
            .context("Failed to serialize preferences to JSON")?;

        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write preferences to {:?}", self.path))?;

        info!("Saved preferences to {:?}", self.path);
        Ok(())
    }
}

/// In-memory store, shared between clones
#[derive(Debug, Clone, Default)]
pub struct MemoryPreferences {
    inner: Arc<Mutex<LocalPreferences>>,
}

impl MemoryPreferences {
    pub fn new(preferences: LocalPreferences) -> Self {
        Self {
            inner: Arc::new(Mutex::new(preferences)),
        }
    }

    pub fn current(&self) -> LocalPreferences {
        *self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PreferenceStore for MemoryPreferences {
    fn load(&self) -> LocalPreferences {
        self.current()
    }

    fn save(&mut self, preferences: &LocalPreferences) -> Result<()> {
        *self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = *preferences;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::defaults;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePreferences::new(dir.path().join("missing.json"));
        assert_eq!(store.load(), LocalPreferences::default());
        assert!(store.load().watch_new_devices);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FilePreferences::new(dir.path().join("sub").join("prefs.json"));

        let prefs = LocalPreferences {
            devmode: true,
            watch_new_devices: false,
        };
        store.save(&prefs).unwrap();

        assert_eq!(store.load(), prefs);
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(&path, "{ not json").unwrap();

        let store = FilePreferences::new(path);
        assert_eq!(store.load(), LocalPreferences::default());
    }

    #[test]
    fn test_unreadable_path_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        // A directory exists at the path, so reading fails with something other than NotFound
        let path = dir.path().join("prefs.json");
        fs::create_dir(&path).unwrap();

        let store = FilePreferences::new(path);
        assert_eq!(store.load(), LocalPreferences::default());
    }

    #[test]
    fn test_partial_file_uses_field_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        // Older files used "debug" for the advanced-mode flag
        fs::write(&path, r#"{"debug": true}"#).unwrap();

        let prefs = FilePreferences::new(path).load();
        assert!(prefs.devmode);
        assert!(prefs.watch_new_devices);
    }

    #[test]
    fn test_apply_and_read_back_interface_fields() {
        let prefs = LocalPreferences {
            devmode: true,
            watch_new_devices: false,
        };
        let mut values = defaults();
        prefs.apply_to(&mut values);

        assert_eq!(values.bool(FieldPath::Devmode), Some(true));
        assert_eq!(LocalPreferences::default().updated_from(&values), prefs);
    }

    #[test]
    fn test_memory_store_shared_between_clones() {
        let store = MemoryPreferences::default();
        let mut writer = store.clone();
        writer
            .save(&LocalPreferences {
                devmode: true,
                watch_new_devices: true,
            })
            .unwrap();

        assert!(store.load().devmode);
    }
}
