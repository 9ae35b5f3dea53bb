//! Application-wide constants
//!
//! This module contains all magic numbers and string literals used throughout
//! the application, providing a single source of truth for constant values.

/// Commit coalescing constants
pub mod sync {
    /// Quiet period after the last local edit before the draft is committed
    pub const COMMIT_WINDOW_MS: u64 = 250;

    /// How long CLI commands wait for the device to answer
    pub const RESPONSE_TIMEOUT_MS: u64 = 5_000;
}

/// IPC framing constants
pub mod ipc {
    /// Maximum message size (10 MB) to prevent DoS via memory exhaustion
    pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;
}

/// File and directory names
pub mod paths {
    /// Directory under the runtime/config dirs used by this application
    pub const APP_DIR: &str = "settings-sync";

    /// Device socket file name
    pub const SOCKET_FILENAME: &str = "device.sock";

    /// Local UI preferences file name
    pub const PREFERENCES_FILENAME: &str = "preferences.json";
}
