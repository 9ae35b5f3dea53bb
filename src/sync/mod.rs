//! Settings synchronization
//!
//! Local edits flow draft → debouncer → channel → device.
//! Device snapshots flow channel → merge → draft, and never re-enter the
//! commit path.

mod channel;
pub mod commit;
pub mod draft;
pub mod engine;
pub mod merge;
pub mod session;

pub use channel::MessageChannel;
pub use commit::{CommitDebouncer, CommitState, RemoteMergeKind};
pub use draft::{ChangeOrigin, DraftChange, DraftStore, ObserverId};
pub use engine::SyncEngine;
pub use merge::{merge, RemoteSnapshot};
pub use session::{spawn, DraftView, SessionError, SessionHandle};
