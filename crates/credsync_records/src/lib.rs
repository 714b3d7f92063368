//! # CredSync Records
//!
//! Wire-level record types for the CredSync engine.
//!
//! This crate provides:
//! - [`Guid`] — unique record identifiers
//! - [`LoginPayload`] — the validated payload variant (content or tombstone)
//! - [`Record`] / [`RawRecord`] — the record envelope before and after
//!   payload validation
//!
//! ## Architecture
//!
//! Payloads arrive from the remote collection as loosely-typed JSON. They are
//! validated **once** at the boundary ([`LoginPayload::validate`]) into a
//! tagged variant; downstream code never re-checks field presence. The types
//! in this crate perform no I/O.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod guid;
mod payload;
mod record;

pub use error::{PayloadError, PayloadResult};
pub use guid::Guid;
pub use payload::{LoginContent, LoginPayload};
pub use record::{RawRecord, Record};
