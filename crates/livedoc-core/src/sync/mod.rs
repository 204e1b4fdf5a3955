//! Live synchronization of a locally edited document with its remote copy.
//!
//! A [`SyncSession`] owns two timers: a debounce that persists local edits once
//! they settle, and a poll that checks whether someone else changed the remote
//! copy. Remote changes replace the local model wholesale (last writer wins),
//! but never while local edits are unsaved, a save is in flight, or the user is
//! in the middle of a stroke or drag.

mod clock;
mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use session::SyncSession;

use crate::document::Timestamp;
use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};

/// A document that can be kept in sync by a [`SyncSession`].
pub trait SyncDocument: Send + 'static {
    /// Produce the payload to persist.
    fn serialize_content(&self) -> SyncResult<String>;

    /// Replace the whole model with a remote payload. On error the model is untouched.
    fn replace_content(&mut self, content: &str) -> SyncResult<()>;

    /// Report (and reset) whether the model changed since the last call.
    fn take_changed(&mut self) -> bool;

    /// Whether an interaction that must not be disturbed by a replace is in progress.
    fn is_interaction_active(&self) -> bool {
        false
    }
}

/// Save state for a status indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SaveStatus {
    /// Everything local has been persisted.
    #[default]
    Saved,
    /// Local edits are waiting for the debounce to expire.
    Pending,
    /// A save is in flight.
    Saving,
    /// The last save failed; edits are kept and retried on the next change.
    Unsaved,
}

/// Notable things that happened in a session, drained with `poll_events`.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Status changed.
    Status(SaveStatus),
    /// Local content was persisted.
    Saved { at: Timestamp },
    /// A save failed.
    SaveFailed { error: SyncError },
    /// A newer remote version was seen but could not be applied yet.
    RefetchDeferred { remote: Timestamp },
    /// The model was replaced by the remote version.
    RemoteReplaced { remote: Option<Timestamp> },
    /// A remote version could not be fetched or applied; local state was kept.
    ReplaceFailed { error: SyncError },
    /// A save finished after a reload had already replaced the model.
    StaleWriteDropped { error: SyncError },
    /// Checking for remote updates failed.
    PollFailed { error: SyncError },
}
