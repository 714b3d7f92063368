//! Sync eligibility.

use std::fmt;

/// Why a cycle did not start. Not an error; the caller should stay silent
/// and try again later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotSyncReason {
    /// No account is signed in to sync against.
    NoAccount,
    /// The device is offline.
    Offline,
    /// The server asked for backoff that has not yet elapsed.
    Backoff,
    /// Another cycle for this collection is already in flight.
    AlreadyInProgress,
}

impl fmt::Display for NotSyncReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::NoAccount => "no account",
            Self::Offline => "offline",
            Self::Backoff => "server backoff in effect",
            Self::AlreadyInProgress => "sync already in progress",
        };
        f.write_str(reason)
    }
}

/// Decides whether a sync cycle may run.
///
/// The engine consults the policy once, at the start of each cycle. Account
/// state, scheduling and backoff bookkeeping all live behind this trait.
pub trait SyncPolicy {
    /// Returns the reason not to sync right now, or `None` when a cycle may
    /// proceed.
    fn reason_to_not_sync(&self) -> Option<NotSyncReason>;
}

/// A policy that always permits syncing.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysSync;

impl SyncPolicy for AlwaysSync {
    fn reason_to_not_sync(&self) -> Option<NotSyncReason> {
        None
    }
}
