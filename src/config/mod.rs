//! Configuration management for settings-sync
//!
//! Two kinds of configuration live here:
//! - **SyncConfig**: runtime knobs for a sync session (socket, commit window)
//! - **preferences**: local UI preferences persisted as JSON

pub mod preferences;

pub use preferences::{FilePreferences, LocalPreferences, MemoryPreferences, PreferenceStore};

use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::sync;

/// Runtime settings for a sync session
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Device socket to connect to (or serve on)
    pub socket_path: PathBuf,
    /// Local preferences file
    pub preferences_path: PathBuf,
    /// Quiet period after the last local edit before committing
    pub commit_window: Duration,
    /// How long to wait for the device to answer
    pub response_timeout: Duration,
}

impl SyncConfig {
    /// Defaults resolved from the environment (XDG runtime dir, config dir)
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            socket_path: crate::ipc::default_socket_path()?,
            preferences_path: FilePreferences::default_path(),
            commit_window: Duration::from_millis(sync::COMMIT_WINDOW_MS),
            response_timeout: Duration::from_millis(sync::RESPONSE_TIMEOUT_MS),
        })
    }

    pub fn with_socket(mut self, socket_path: Option<PathBuf>) -> Self {
        if let Some(path) = socket_path {
            self.socket_path = path;
        }
        self
    }

    pub fn with_preferences(mut self, preferences_path: Option<PathBuf>) -> Self {
        if let Some(path) = preferences_path {
            self.preferences_path = path;
        }
        self
    }

    pub fn with_commit_window_ms(mut self, window_ms: Option<u64>) -> Self {
        if let Some(ms) = window_ms {
            self.commit_window = Duration::from_millis(ms);
        }
        self
    }
}
