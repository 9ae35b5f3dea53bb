//! Commit debouncing and echo suppression
//!
//! Rapid local edits are coalesced into a single commit of the whole draft.
//! Device snapshots never schedule a commit; one that arrives while a commit
//! is outstanding is taken as its acknowledgement.
//!
//! Time is passed in by the caller, so the state machine is deterministic.

use std::collections::BTreeSet;
use std::time::Duration;
use tokio::time::Instant;

use crate::settings::FieldPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitState {
    /// Draft and device agree as far as we know
    Idle,
    /// Local edits are waiting for the coalescing window to expire
    PendingCommit { deadline: Instant },
    /// A commit was sent and its echo has not arrived yet
    AwaitingEcho,
}

/// What a remote merge meant to the debouncer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteMergeKind {
    /// Acknowledgement of the commit we sent
    Echo,
    /// Device-initiated change
    Unsolicited,
    /// Arrived while local edits are still queued
    DuringPendingCommit,
}

#[derive(Debug, Clone)]
pub struct CommitDebouncer {
    window: Duration,
    state: CommitState,
    /// Fields edited locally since the last commit was sent
    dirty: BTreeSet<FieldPath>,
    commits_sent: u64,
    echoes_received: u64,
}

impl CommitDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: CommitState::Idle,
            dirty: BTreeSet::new(),
            commits_sent: 0,
            echoes_received: 0,
        }
    }

    pub fn state(&self) -> CommitState {
        self.state
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// When the pending window expires, if one is armed
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            CommitState::PendingCommit { deadline } => Some(deadline),
            _ => None,
        }
    }

    pub fn dirty_paths(&self) -> impl Iterator<Item = FieldPath> + '_ {
        self.dirty.iter().copied()
    }

    pub fn commits_sent(&self) -> u64 {
        self.commits_sent
    }

    pub fn echoes_received(&self) -> u64 {
        self.echoes_received
    }

    /// A local edit landed in the draft: cancel any armed window and start a new one
    pub fn on_local_change(&mut self, path: FieldPath, now: Instant) {
        self.dirty.insert(path);
        self.state = CommitState::PendingCommit {
            deadline: now + self.window,
        };
    }

    /// Returns true exactly once per expired window. The caller must then
    /// send the whole draft; the debouncer assumes it did.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.state {
            CommitState::PendingCommit { deadline } if now >= deadline => {
                self.state = CommitState::AwaitingEcho;
                self.dirty.clear();
                self.commits_sent += 1;
                true
            }
            _ => false,
        }
    }

    /// The commit could not be handed to the channel; no echo will come
    pub fn on_send_failed(&mut self) {
        if self.state == CommitState::AwaitingEcho {
            self.state = CommitState::Idle;
        }
    }

    /// A device snapshot was merged into the draft. Never schedules a commit.
    pub fn on_remote_merge(&mut self) -> RemoteMergeKind {
        match self.state {
            CommitState::AwaitingEcho => {
                self.state = CommitState::Idle;
                self.echoes_received += 1;
                RemoteMergeKind::Echo
            }
            CommitState::Idle => RemoteMergeKind::Unsolicited,
            CommitState::PendingCommit { .. } => RemoteMergeKind::DuringPendingCommit,
        }
    }

    /// Drop any armed window (teardown)
    pub fn cancel(&mut self) {
        if let CommitState::PendingCommit { .. } = self.state {
            self.state = CommitState::Idle;
        }
        self.dirty.clear();
    }
}
