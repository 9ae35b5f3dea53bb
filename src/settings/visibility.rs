//! View-scoped field gating
//!
//! Some fields only matter while advanced mode is on. Hidden fields are
//! neither displayed nor overwritten by remote snapshots.

use serde::{Deserialize, Serialize};

use super::schema::{FieldPath, ValueSet};

/// Which field groups are currently active
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityMode {
    pub advanced: bool,
}

impl VisibilityMode {
    pub const fn basic() -> Self {
        Self { advanced: false }
    }

    pub const fn advanced() -> Self {
        Self { advanced: true }
    }
}

/// Detailed skeleton-structure toggles are advanced-only
pub const fn is_advanced_only(path: FieldPath) -> bool {
    matches!(
        path,
        FieldPath::ExtendedSpine | FieldPath::ExtendedPelvis | FieldPath::ExtendedKnee
    )
}

pub const fn is_relevant(path: FieldPath, mode: VisibilityMode) -> bool {
    mode.advanced || !is_advanced_only(path)
}

/// Subset of `values` the presentation layer may show and edit under `mode`
pub fn relevant_view(values: &ValueSet, mode: VisibilityMode) -> ValueSet {
    values.filtered(|path| is_relevant(path, mode))
}
