//! Row types for the two login tables.

use credsync_records::{Guid, LoginContent};

/// A login as surfaced to the hosting application.
///
/// This is the merged view: overlay content when a pending local change
/// exists, mirror content otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Login {
    /// Record identifier.
    pub guid: Guid,
    /// Content fields.
    pub content: LoginContent,
    /// When this login was created, ms since epoch.
    pub time_created: i64,
    /// When this login was last filled, ms since epoch. Never decreases.
    pub time_last_used: i64,
    /// When the password last changed, ms since epoch. Never decreases.
    pub time_password_changed: i64,
}

/// One row of the mirror table: the last state known to both client and
/// server for a guid.
#[derive(Debug, Clone)]
pub struct MirrorRow {
    /// Record identifier.
    pub guid: Guid,
    /// Content fields.
    pub content: LoginContent,
    /// Creation time, ms since epoch.
    pub time_created: i64,
    /// Last-use time, ms since epoch.
    pub time_last_used: i64,
    /// Last password change, ms since epoch.
    pub time_password_changed: i64,
    /// Server modification time of this revision, ms since epoch.
    pub server_modified: i64,
    /// True when an overlay row shadows this one.
    pub is_overridden: bool,
}

/// One row of the overlay table: a pending local mutation.
#[derive(Debug, Clone)]
pub struct OverlayRow {
    /// Record identifier. `None` only for a login never yet uploaded.
    pub guid: Option<Guid>,
    /// Content fields. Empty strings for a local tombstone.
    pub content: LoginContent,
    /// Creation time, ms since epoch.
    pub time_created: i64,
    /// Last-use time, ms since epoch.
    pub time_last_used: i64,
    /// Last password change, ms since epoch.
    pub time_password_changed: i64,
    /// Client clock at the time of the mutation. Diagnostic only.
    pub local_modified: Option<i64>,
    /// Local tombstone marker.
    pub is_deleted: bool,
    /// True whenever this row represents unconfirmed local state.
    pub should_upload: bool,
}

/// A new revision to write into the mirror table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorUpdate {
    /// Record identifier.
    pub guid: Guid,
    /// Content fields of the new revision.
    pub content: LoginContent,
    /// Server modification time of the incoming record, ms since epoch.
    pub server_modified: i64,
}

/// One reconciled write against the two tables.
///
/// Produced by the reconciler (a pure function) and applied by the store
/// inside a single transaction per batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconciledChange {
    /// Adopt the incoming revision into the mirror. Any overlay row for the
    /// guid is cleared; nothing is re-uploaded.
    Adopt(MirrorUpdate),
    /// Write a merged revision into the mirror and queue the residual local
    /// difference for upload.
    MergeWithResidual {
        /// Merged revision for the mirror table.
        mirror: MirrorUpdate,
        /// Content that still differs from the server and must re-upload.
        residual: LoginContent,
    },
    /// The record was deleted remotely: drop both rows for the guid.
    Delete(Guid),
}

impl ReconciledChange {
    /// The guid this change applies to.
    pub fn guid(&self) -> &Guid {
        match self {
            Self::Adopt(update) => &update.guid,
            Self::MergeWithResidual { mirror, .. } => &mirror.guid,
            Self::Delete(guid) => guid,
        }
    }

    /// Returns true if applying this change leaves local state identical to
    /// the server's view (no residual upload queued).
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::MergeWithResidual { .. })
    }
}
