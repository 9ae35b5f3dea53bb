#![forbid(unsafe_code)]

//! Keeps a local settings draft in sync with a remote device.
//!
//! Edits land in the draft immediately and are committed to the device after a
//! short quiet period. Snapshots pushed by the device are merged back into the
//! draft without triggering another commit.

pub mod config;
pub mod constants;
pub mod device;
pub mod ipc;
pub mod settings;
pub mod sync;
