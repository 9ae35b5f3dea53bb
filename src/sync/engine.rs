//! Settings synchronization engine
//!
//! Ties the draft store, merge step and commit debouncer to a message channel.
//! All calls are expected from a single owner; see [`super::session`] for the
//! async driver that serializes them.

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{LocalPreferences, PreferenceStore};
use crate::ipc::{ChangeSettingsRequest, ClientMessage, ServerMessage};
use crate::settings::{
    is_relevant, relevant_view, FieldError, FieldPath, FieldValue, ValueSet, VisibilityMode,
};

use super::channel::MessageChannel;
use super::commit::{CommitDebouncer, CommitState, RemoteMergeKind};
use super::draft::{ChangeOrigin, DraftStore};
use super::merge::{merge, RemoteSnapshot};

pub struct SyncEngine<C: MessageChannel> {
    draft: DraftStore,
    debouncer: CommitDebouncer,
    mode: VisibilityMode,
    channel: C,
    preferences: Box<dyn PreferenceStore>,
    local_preferences: LocalPreferences,
    snapshots_received: u64,
}

impl<C: MessageChannel> SyncEngine<C> {
    /// Create the draft from the defaults and local preferences, then ask the
    /// device for its current settings
    pub fn start(
        channel: C,
        preferences: Box<dyn PreferenceStore>,
        commit_window: std::time::Duration,
    ) -> Self {
        let local_preferences = preferences.load();
        let mut seed = ValueSet::new();
        local_preferences.apply_to(&mut seed);

        let mut engine = Self {
            draft: DraftStore::with_values(seed),
            debouncer: CommitDebouncer::new(commit_window),
            mode: VisibilityMode {
                advanced: local_preferences.devmode,
            },
            channel,
            preferences,
            local_preferences,
            snapshots_received: 0,
        };

        info!(
            advanced = engine.mode.advanced,
            window_ms = commit_window.as_millis() as u64,
            "Starting settings sync"
        );
        if let Err(e) = engine.channel.send(ClientMessage::SettingsRequest) {
            warn!(error = ?e, "Failed to request settings from device");
        }
        engine
    }

    /// Complete current draft, hidden fields included
    pub fn draft(&self) -> &ValueSet {
        self.draft.get()
    }

    /// Draft fields the presentation layer may show and edit
    pub fn visible_draft(&self) -> ValueSet {
        relevant_view(self.draft.get(), self.mode)
    }

    pub fn revision(&self) -> u64 {
        self.draft.revision()
    }

    pub fn mode(&self) -> VisibilityMode {
        self.mode
    }

    pub fn commit_state(&self) -> CommitState {
        self.debouncer.state()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    pub fn commits_sent(&self) -> u64 {
        self.debouncer.commits_sent()
    }

    pub fn echoes_received(&self) -> u64 {
        self.debouncer.echoes_received()
    }

    pub fn snapshots_received(&self) -> u64 {
        self.snapshots_received
    }

    /// Apply a user edit.
    ///
    /// Device fields arm the commit window; `interface.*` fields go to the
    /// local preferences store instead.
    pub fn set_field(
        &mut self,
        path: FieldPath,
        value: FieldValue,
        now: Instant,
    ) -> Result<(), FieldError> {
        if !is_relevant(path, self.mode) {
            return Err(FieldError::Hidden(path));
        }

        let change = self.draft.set_field(path, value)?;
        debug!(path = %path, value = %value, changed = !change.changed.is_empty(), "Local edit");

        if path.is_local_only() {
            self.store_local_preferences();
        } else {
            self.debouncer.on_local_change(path, now);
        }
        Ok(())
    }

    /// Parse and apply a user edit given as strings
    pub fn set_field_str(
        &mut self,
        path: &str,
        input: &str,
        now: Instant,
    ) -> Result<(), FieldError> {
        let path: FieldPath = path.parse()?;
        let value = path.parse_value(input)?;
        self.set_field(path, value, now)
    }

    pub fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::SettingsResponse(response) => {
                self.handle_snapshot(&RemoteSnapshot::from_response(&response));
            }
        }
    }

    /// Merge a device snapshot into the draft. Never triggers a commit.
    pub fn handle_snapshot(&mut self, snapshot: &RemoteSnapshot) {
        self.snapshots_received += 1;

        let mut next = merge(snapshot, self.draft.get(), self.mode);
        // Edits not yet sent win over whatever the device reported
        for path in self.debouncer.dirty_paths() {
            if let Some(value) = self.draft.get().get(path) {
                next.insert(path, value);
            }
        }

        let change = self.draft.apply_merge(&next, ChangeOrigin::Remote);
        let kind = self.debouncer.on_remote_merge();
        match kind {
            RemoteMergeKind::Echo => {
                debug!(changed = change.changed.len(), "Commit acknowledged by device");
            }
            RemoteMergeKind::Unsolicited => {
                info!(
                    reported = snapshot.len(),
                    changed = change.changed.len(),
                    "Applied settings from device"
                );
            }
            RemoteMergeKind::DuringPendingCommit => {
                debug!(
                    changed = change.changed.len(),
                    "Applied device settings around pending edits"
                );
            }
        }
    }

    /// Send the draft if the coalescing window has expired
    pub fn poll(&mut self, now: Instant) {
        if !self.debouncer.poll(now) {
            return;
        }

        let request = ChangeSettingsRequest::from_values(self.draft.get());
        match self.channel.send(ClientMessage::ChangeSettings(request)) {
            Ok(()) => {
                info!(commit = self.debouncer.commits_sent(), "Committed settings to device");
            }
            Err(e) => {
                // Not retried: the next edit or device push resynchronizes
                warn!(error = ?e, "Failed to send settings to device");
                self.debouncer.on_send_failed();
            }
        }
    }

    /// Cancel the pending commit window. Queued edits are not sent.
    pub fn shutdown(&mut self) {
        if self.debouncer.deadline().is_some() {
            info!("Discarding unsent local edits on shutdown");
        }
        self.debouncer.cancel();
    }

    fn store_local_preferences(&mut self) {
        let updated = self.local_preferences.updated_from(self.draft.get());
        if updated == self.local_preferences {
            return;
        }

        // Mode follows the advanced flag; no merge or commit is triggered
        self.mode = VisibilityMode {
            advanced: updated.devmode,
        };
        self.local_preferences = updated;
        if let Err(e) = self.preferences.save(&updated) {
            warn!(error = ?e, "Failed to save local preferences");
        }
    }
}
