//! Record identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A globally unique identifier for one record in a collection.
///
/// Guids are opaque strings: either assigned by the server or generated
/// locally (v4 UUID) for records created on this device. Once assigned a
/// guid never changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Guid(String);

impl Guid {
    /// Wraps an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random identifier.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the identifier is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Guid {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for Guid {
    fn from(id: String) -> Self {
        Self(id)
    }
}
