//! # CredSync Store
//!
//! Two-tier SQLite persistence for saved logins.
//!
//! The store keeps two tables per collection:
//! - **mirror** — the last state known to both this client and the server,
//!   one row per guid, with an `is_overridden` flag marking rows shadowed by
//!   a pending local change;
//! - **overlay** — unconfirmed local mutations: edits, new logins and local
//!   tombstones that still have to be uploaded.
//!
//! Every mutating operation runs inside one SQLite transaction spanning both
//! tables. The store is the only writer of either table; the sync engine
//! hands it [`ReconciledChange`] values to apply and never touches SQL
//! itself.
//!
//! ## Key Invariants
//!
//! - Mirror guids are unique; an overlay guid references a mirror row or
//!   belongs to a login the server has never seen.
//! - An overlay row exists iff the login has unconfirmed local state.
//! - `time_last_used` and `time_password_changed` never decrease.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod login;
mod schema;
mod store;

pub use error::{StoreError, StoreResult};
pub use login::{Login, MirrorRow, MirrorUpdate, OverlayRow, ReconciledChange};
pub use store::LoginStore;

/// Current time as milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}
