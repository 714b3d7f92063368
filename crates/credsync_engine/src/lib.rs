//! # CredSync Engine
//!
//! Sync cycle orchestration and three-way reconciliation for saved logins.
//!
//! This crate provides:
//! - [`reconcile`] — the pure three-way merge over (mirror, overlay,
//!   incoming) per record
//! - [`Synchronizer`] — the cycle state machine (eligibility → download →
//!   apply → upload → watermark advance)
//! - [`RecordClient`] — the remote collection abstraction, with
//!   [`MockRecordClient`] for tests
//! - [`SyncPolicy`] — the eligibility hook
//!
//! ## Architecture
//!
//! One cycle is a sequential pipeline. Incoming records are validated at the
//! boundary, reconciled one by one (decisions are independent per guid) and
//! applied in a single store transaction; pending local changes upload
//! afterwards. The persisted watermark advances exactly once, after both
//! phases succeed, so a failed cycle can always be retried from the same
//! watermark.
//!
//! ## Key Invariants
//!
//! - The reconciler performs no I/O; the store applies its decisions.
//! - A batch is applied atomically or not at all.
//! - The watermark never advances past an incompletely applied batch.
//! - At most one cycle per collection is in flight.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod error;
mod policy;
mod reconcile;
mod sync;

pub use client::{FetchBatch, MockRecordClient, PutResponse, RecordClient};
pub use error::{SyncError, SyncResult};
pub use policy::{AlwaysSync, NotSyncReason, SyncPolicy};
pub use reconcile::reconcile;
pub use sync::{CycleStats, SyncOutcome, SyncState, Synchronizer};
