//! Merging device snapshots into the draft

use std::collections::BTreeMap;
use tracing::debug;

use crate::ipc::SettingsResponse;
use crate::settings::{default_value, is_relevant, FieldPath, ValueSet, VisibilityMode};

/// Partial configuration as reported by the device.
///
/// Values are kept raw so malformed entries reach the merge step, where they
/// are replaced by defaults instead of failing the whole message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteSnapshot {
    values: BTreeMap<FieldPath, serde_json::Value>,
}

impl RemoteSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flatten a settings response; unknown keys are skipped
    pub fn from_response(response: &SettingsResponse) -> Self {
        let mut snapshot = Self::new();
        for (group, raw) in response.groups() {
            for (key, value) in raw {
                match FieldPath::from_group_key(group, key) {
                    Some(path) => {
                        snapshot.insert(path, value.clone());
                    }
                    None => {
                        debug!(
                            group = group.as_str(),
                            key = %key,
                            "Ignoring unknown field in settings response"
                        );
                    }
                }
            }
        }
        snapshot
    }

    pub fn insert(&mut self, path: FieldPath, raw: serde_json::Value) {
        self.values.insert(path, raw);
    }

    pub fn get(&self, path: FieldPath) -> Option<&serde_json::Value> {
        self.values.get(&path)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldPath, &serde_json::Value)> + '_ {
        self.values.iter().map(|(path, raw)| (*path, raw))
    }
}

impl FromIterator<(FieldPath, serde_json::Value)> for RemoteSnapshot {
    fn from_iter<I: IntoIterator<Item = (FieldPath, serde_json::Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Compute the next draft from a device snapshot.
///
/// - fields hidden under `mode` and local-only fields keep their current value
/// - reported fields take the reported value when it is in domain, otherwise
///   the default for that field
/// - fields the snapshot does not mention keep their current value
pub fn merge(snapshot: &RemoteSnapshot, current: &ValueSet, mode: VisibilityMode) -> ValueSet {
    let mut next = current.clone();

    for (path, raw) in snapshot.iter() {
        if path.is_local_only() {
            debug!(path = %path, "Ignoring local-only field reported by device");
            continue;
        }
        if !is_relevant(path, mode) {
            debug!(path = %path, "Keeping hidden field, device value ignored");
            continue;
        }

        let value = match path.domain().coerce(raw) {
            Some(value) => value,
            None => {
                let fallback = default_value(path);
                debug!(
                    path = %path,
                    reported = %raw,
                    fallback = %fallback,
                    "Device value malformed, using default"
                );
                fallback
            }
        };
        next.insert(path, value);
    }

    next
}
