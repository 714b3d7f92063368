//! The record envelope.

use crate::error::{PayloadError, PayloadResult};
use crate::guid::Guid;
use crate::payload::{LoginContent, LoginPayload};
use serde_json::{json, Value};

/// A record as received from the remote collection, before payload
/// validation.
///
/// The envelope fields (`id`, `modified`, `sortindex`) are parsed eagerly;
/// the payload stays raw so that one malformed payload can be skipped
/// without discarding the rest of a batch.
#[derive(Debug, Clone)]
pub struct RawRecord {
    /// Record identifier.
    pub guid: Guid,
    /// Server modification time, in milliseconds.
    pub server_modified: i64,
    /// Server-side sort hint.
    pub sort_index: i64,
    /// Unvalidated payload.
    pub payload: Value,
}

impl RawRecord {
    /// Parses the envelope of one wire record.
    pub fn from_wire(raw: &Value) -> PayloadResult<Self> {
        let obj = raw.as_object().ok_or(PayloadError::NotAnObject)?;

        let guid = match obj.get("id") {
            None | Some(Value::Null) => return Err(PayloadError::MissingField("id")),
            Some(Value::String(s)) => Guid::new(s.clone()),
            Some(_) => {
                return Err(PayloadError::MistypedField {
                    field: "id",
                    expected: "string",
                })
            }
        };
        if guid.is_empty() {
            return Err(PayloadError::EmptyGuid);
        }

        let server_modified = obj
            .get("modified")
            .and_then(Value::as_i64)
            .ok_or(PayloadError::MissingField("modified"))?;

        let sort_index = obj.get("sortindex").and_then(Value::as_i64).unwrap_or(0);

        let payload = obj.get("payload").cloned().unwrap_or_else(|| raw.clone());

        Ok(Self {
            guid,
            server_modified,
            sort_index,
            payload,
        })
    }

    /// Validates the payload, producing a fully typed [`Record`].
    pub fn into_record(self) -> PayloadResult<Record> {
        let payload = LoginPayload::validate(&self.payload)?;
        Ok(Record {
            guid: self.guid,
            payload,
            server_modified: self.server_modified,
            sort_index: self.sort_index,
        })
    }
}

/// A fully validated record: envelope plus typed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Record identifier, immutable once assigned.
    pub guid: Guid,
    /// Validated payload.
    pub payload: LoginPayload,
    /// Server modification time, in milliseconds. Zero for records that have
    /// never been uploaded.
    pub server_modified: i64,
    /// Server-side sort hint.
    pub sort_index: i64,
}

impl Record {
    /// Builds a content record for upload.
    pub fn content(guid: Guid, content: LoginContent) -> Self {
        Self {
            guid,
            payload: LoginPayload::Content(content),
            server_modified: 0,
            sort_index: 0,
        }
    }

    /// Builds a tombstone record for upload.
    pub fn tombstone(guid: Guid) -> Self {
        Self {
            guid,
            payload: LoginPayload::Tombstone,
            server_modified: 0,
            sort_index: 0,
        }
    }

    /// Returns true if the payload is a tombstone.
    pub fn is_tombstone(&self) -> bool {
        self.payload.is_tombstone()
    }

    /// Serializes the payload for upload, embedding the record identifier.
    pub fn payload_to_wire(&self) -> Value {
        match &self.payload {
            LoginPayload::Tombstone => json!({
                "id": self.guid.as_str(),
                "deleted": true,
            }),
            LoginPayload::Content(content) => {
                // serde derives camelCase names matching the wire format
                let mut value = serde_json::to_value(content)
                    .unwrap_or_else(|_| Value::Object(Default::default()));
                if let Some(obj) = value.as_object_mut() {
                    obj.insert("id".into(), json!(self.guid.as_str()));
                }
                value
            }
        }
    }

    /// Serializes the full envelope for upload.
    pub fn to_wire(&self) -> Value {
        json!({
            "id": self.guid.as_str(),
            "modified": self.server_modified,
            "sortindex": self.sort_index,
            "payload": self.payload_to_wire(),
        })
    }
}
