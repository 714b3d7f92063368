//! Sync cycle state machine.

use crate::client::RecordClient;
use crate::error::{SyncError, SyncResult};
use crate::policy::{NotSyncReason, SyncPolicy};
use crate::reconcile::reconcile;
use credsync_store::LoginStore;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// The current state of a sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No cycle has run yet.
    Idle,
    /// Consulting the eligibility policy.
    CheckingEligibility,
    /// Fetching incoming records since the watermark.
    Downloading,
    /// Reconciling and applying the downloaded batch.
    Applying,
    /// Uploading pending local changes.
    Uploading,
    /// The last cycle completed successfully.
    Completed,
    /// The last cycle failed.
    Failed,
}

impl SyncState {
    /// Returns true while a cycle is in flight.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncState::CheckingEligibility
                | SyncState::Downloading
                | SyncState::Applying
                | SyncState::Uploading
        )
    }

    /// Returns true if a new cycle may start.
    pub fn can_start(&self) -> bool {
        !self.is_active()
    }
}

/// Counters for one completed cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// Incoming records reconciled and applied.
    pub applied: usize,
    /// Incoming records skipped because their payload failed validation.
    pub skipped_invalid: usize,
    /// Local records uploaded.
    pub uploaded: usize,
}

/// The outcome of one cycle. This is the whole result surface: a cycle
/// either completed, never started, or failed — there is no partial result.
#[derive(Debug)]
pub enum SyncOutcome {
    /// Both phases succeeded and the watermark advanced.
    Completed(CycleStats),
    /// The cycle was not eligible to run. Not an error.
    NotStarted(NotSyncReason),
    /// The cycle failed; the watermark is unchanged and a later cycle may
    /// retry from it.
    Failed(SyncError),
}

impl SyncOutcome {
    /// Returns true for a successful cycle.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Orchestrates sync cycles for one collection of login records.
///
/// A cycle is a sequential pipeline: eligibility check, download, apply,
/// upload, watermark advance. At most one cycle is in flight at a time; the
/// store stays available to local CRUD while the synchronizer waits on the
/// network.
pub struct Synchronizer<C: RecordClient, P: SyncPolicy> {
    client: C,
    policy: P,
    state: RwLock<SyncState>,
    interrupted: AtomicBool,
}

impl<C: RecordClient, P: SyncPolicy> Synchronizer<C, P> {
    /// Creates a new synchronizer.
    pub fn new(client: C, policy: P) -> Self {
        Self {
            client,
            policy,
            state: RwLock::new(SyncState::Idle),
            interrupted: AtomicBool::new(false),
        }
    }

    /// The current cycle state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Requests that an in-flight cycle stop at the next stage boundary.
    ///
    /// Applying is never interrupted mid-batch: once it has begun the batch
    /// runs to completion or explicit failure.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    fn check_interrupted(&self) -> SyncResult<()> {
        if self.interrupted.load(Ordering::SeqCst) {
            Err(SyncError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Runs one sync cycle against the store.
    ///
    /// On failure the watermark is left unchanged, so the next cycle
    /// re-downloads from the same point; applying already-applied records is
    /// a no-op by construction of the reconciler.
    pub fn sync(&self, store: &mut LoginStore) -> SyncOutcome {
        {
            let mut state = self.state.write();
            if state.is_active() {
                return SyncOutcome::NotStarted(NotSyncReason::AlreadyInProgress);
            }
            *state = SyncState::CheckingEligibility;
        }
        self.interrupted.store(false, Ordering::SeqCst);

        if let Some(reason) = self.policy.reason_to_not_sync() {
            info!(%reason, "sync not started");
            self.set_state(SyncState::Idle);
            return SyncOutcome::NotStarted(reason);
        }

        match self.run_cycle(store) {
            Ok(stats) => {
                self.set_state(SyncState::Completed);
                SyncOutcome::Completed(stats)
            }
            Err(error) => {
                warn!(%error, "sync cycle failed");
                self.set_state(SyncState::Failed);
                SyncOutcome::Failed(error)
            }
        }
    }

    fn run_cycle(&self, store: &mut LoginStore) -> SyncResult<CycleStats> {
        let watermark = store.last_sync()?;

        self.set_state(SyncState::Downloading);
        let batch = self.client.get_since(watermark)?;
        info!(
            incoming = batch.records.len(),
            watermark, "downloaded incoming records"
        );

        self.check_interrupted()?;
        self.set_state(SyncState::Applying);
        let mut stats = CycleStats::default();
        let mut changes = Vec::with_capacity(batch.records.len());
        for raw in &batch.records {
            let record = match raw.clone().into_record() {
                Ok(record) => record,
                Err(error) => {
                    warn!(guid = %raw.guid, %error, "skipping malformed incoming record");
                    stats.skipped_invalid += 1;
                    continue;
                }
            };
            let mirror = store.get_mirror(&record.guid)?;
            let overlay = store.get_overlay(&record.guid)?;
            let change = reconcile(mirror.as_ref(), overlay.as_ref(), &record);
            debug!(guid = %record.guid, settled = change.is_settled(), "reconciled incoming record");
            changes.push(change);
        }
        store.apply_incoming(&changes)?;
        stats.applied = changes.len();

        self.check_interrupted()?;
        self.set_state(SyncState::Uploading);
        let outgoing = store.pending_uploads()?;
        let mut new_watermark = batch.last_modified;
        if !outgoing.is_empty() {
            let response = self.client.put(&outgoing)?;
            let confirmed = store.mark_as_synchronized(&response.succeeded, response.modified)?;
            new_watermark = new_watermark.max(confirmed);
            if !response.failed.is_empty() {
                // The rejected rows are still pending; the watermark must not
                // advance past them.
                return Err(SyncError::Server(format!(
                    "server rejected {} of {} uploaded records",
                    response.failed.len(),
                    outgoing.len()
                )));
            }
            stats.uploaded = outgoing.len();
        }

        store.set_last_sync(new_watermark)?;
        info!(
            applied = stats.applied,
            skipped = stats.skipped_invalid,
            uploaded = stats.uploaded,
            new_watermark,
            "sync cycle completed"
        );
        Ok(stats)
    }
}
