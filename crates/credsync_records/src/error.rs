//! Error types for record validation.

use thiserror::Error;

/// Result type for payload validation.
pub type PayloadResult<T> = Result<T, PayloadError>;

/// Errors produced while validating a wire record or its payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    /// The payload is not a JSON object.
    #[error("payload is not a JSON object")]
    NotAnObject,

    /// A required field is absent.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// A field is present but not of the expected type.
    #[error("field `{field}` is not a {expected}")]
    MistypedField {
        /// Field name.
        field: &'static str,
        /// Expected JSON type.
        expected: &'static str,
    },

    /// The record identifier is empty.
    #[error("record identifier is empty")]
    EmptyGuid,
}
