//! Draft store: the single editable copy of the device configuration

use crate::settings::{defaults, FieldError, FieldPath, FieldValue, ValueSet};

/// Where a draft mutation came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// A user edit through `set_field`
    Local,
    /// A merge of a device snapshot
    Remote,
}

/// Change notification raised once per successful mutation
#[derive(Debug, Clone, PartialEq)]
pub struct DraftChange {
    pub origin: ChangeOrigin,
    /// Fields whose value differs from before the mutation
    pub changed: Vec<FieldPath>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Observer = Box<dyn FnMut(&DraftChange, &ValueSet) + Send>;

/// Owns the draft and notifies observers after every mutation.
///
/// The draft is always complete: it starts from the defaults (or a complete
/// seed) and mutations only ever overwrite existing fields.
pub struct DraftStore {
    draft: ValueSet,
    observers: Vec<(ObserverId, Observer)>,
    next_observer: u64,
    revision: u64,
}

impl DraftStore {
    pub fn new() -> Self {
        Self::with_values(ValueSet::new())
    }

    /// Start from `seed`, backfilling every missing field from the defaults
    pub fn with_values(seed: ValueSet) -> Self {
        let mut draft = defaults();
        for (path, value) in seed.iter() {
            draft.insert(path, value);
        }
        Self {
            draft,
            observers: Vec::new(),
            next_observer: 0,
            revision: 0,
        }
    }

    pub fn get(&self) -> &ValueSet {
        &self.draft
    }

    /// Number of mutations applied so far
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn subscribe(
        &mut self,
        observer: impl FnMut(&DraftChange, &ValueSet) + Send + 'static,
    ) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Returns false if `id` was not registered
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(observer_id, _)| *observer_id != id);
        self.observers.len() != before
    }

    /// Set one field after checking it against the field's domain.
    ///
    /// Out-of-domain values are rejected and the draft is left untouched.
    pub fn set_field(
        &mut self,
        path: FieldPath,
        value: FieldValue,
    ) -> Result<DraftChange, FieldError> {
        let domain = path.domain();
        if !domain.contains(&value) {
            return Err(FieldError::InvalidFieldValue {
                path,
                value,
                reason: domain.describe(),
            });
        }

        let previous = self.draft.insert(path, value);
        let changed = if previous == Some(value) {
            Vec::new()
        } else {
            vec![path]
        };

        let change = DraftChange {
            origin: ChangeOrigin::Local,
            changed,
        };
        self.commit_mutation(&change);
        Ok(change)
    }

    /// Overwrite the fields present in `partial`, leaving all others untouched
    pub fn apply_merge(&mut self, partial: &ValueSet, origin: ChangeOrigin) -> DraftChange {
        let mut changed = Vec::new();
        for (path, value) in partial.iter() {
            if self.draft.insert(path, value) != Some(value) {
                changed.push(path);
            }
        }

        let change = DraftChange { origin, changed };
        self.commit_mutation(&change);
        change
    }

    fn commit_mutation(&mut self, change: &DraftChange) {
        self.revision += 1;
        for (_, observer) in self.observers.iter_mut() {
            observer(change, &self.draft);
        }
    }
}

impl Default for DraftStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder(store: &mut DraftStore) -> Arc<Mutex<Vec<(DraftChange, ValueSet)>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        store.subscribe(move |change, draft| {
            sink.lock().unwrap().push((change.clone(), draft.clone()));
        });
        seen
    }

    #[test]
    fn test_new_draft_starts_from_defaults() {
        let store = DraftStore::new();
        assert_eq!(store.get(), &defaults());
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn test_seed_is_backfilled() {
        let seed: ValueSet = [(FieldPath::Devmode, FieldValue::Bool(true))]
            .into_iter()
            .collect();
        let store = DraftStore::with_values(seed);

        assert!(store.get().is_complete());
        assert_eq!(store.get().bool(FieldPath::Devmode), Some(true));
    }

    #[test]
    fn test_set_field_notifies_after_mutation() {
        let mut store = DraftStore::new();
        let seen = recorder(&mut store);

        let change = store
            .set_field(FieldPath::FilteringAmount, FieldValue::Number(0.5))
            .unwrap();
        assert_eq!(change.origin, ChangeOrigin::Local);
        assert_eq!(change.changed, vec![FieldPath::FilteringAmount]);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        // Observer sees the post-mutation draft
        assert_eq!(seen[0].1.number(FieldPath::FilteringAmount), Some(0.5));
    }

    #[test]
    fn test_invalid_value_rejected_without_notification() {
        let mut store = DraftStore::new();
        let seen = recorder(&mut store);

        let err = store
            .set_field(FieldPath::TapResetDelay, FieldValue::Number(5.0))
            .unwrap_err();
        assert!(matches!(
            err,
            FieldError::InvalidFieldValue {
                path: FieldPath::TapResetDelay,
                ..
            }
        ));

        let err = store
            .set_field(FieldPath::FloorClip, FieldValue::Number(1.0))
            .unwrap_err();
        assert!(matches!(err, FieldError::InvalidFieldValue { .. }));

        assert_eq!(store.get(), &defaults());
        assert_eq!(store.revision(), 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_setting_same_value_still_notifies() {
        let mut store = DraftStore::new();
        let seen = recorder(&mut store);

        let change = store
            .set_field(FieldPath::FloorClip, FieldValue::Bool(false))
            .unwrap();
        assert!(change.changed.is_empty());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_apply_merge_only_touches_present_paths() {
        let mut store = DraftStore::new();
        store
            .set_field(FieldPath::TrackerWaist, FieldValue::Bool(true))
            .unwrap();
        let seen = recorder(&mut store);

        let partial: ValueSet = [
            (FieldPath::FloorClip, FieldValue::Bool(true)),
            (FieldPath::FilteringType, FieldValue::Choice(0)),
        ]
        .into_iter()
        .collect();
        let change = store.apply_merge(&partial, ChangeOrigin::Remote);

        assert_eq!(change.origin, ChangeOrigin::Remote);
        // filtering.type already held 0, so only floorClip changed
        assert_eq!(change.changed, vec![FieldPath::FloorClip]);
        assert_eq!(store.get().bool(FieldPath::TrackerWaist), Some(true));
        assert_eq!(store.get().bool(FieldPath::FloorClip), Some(true));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let mut store = DraftStore::new();
        let count = Arc::new(Mutex::new(0));
        let sink = count.clone();
        let id = store.subscribe(move |_, _| *sink.lock().unwrap() += 1);

        store
            .set_field(FieldPath::FloorClip, FieldValue::Bool(true))
            .unwrap();
        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store
            .set_field(FieldPath::FloorClip, FieldValue::Bool(false))
            .unwrap();

        assert_eq!(*count.lock().unwrap(), 1);
    }
}
