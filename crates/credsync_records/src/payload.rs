//! Validated login payloads.

use crate::error::{PayloadError, PayloadResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The content fields of one saved login.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginContent {
    /// Origin the login was saved for.
    pub hostname: String,
    /// Saved username.
    pub username: String,
    /// Saved password.
    pub password: String,
    /// Name of the form field the username was filled into.
    pub username_field: String,
    /// Name of the form field the password was filled into.
    pub password_field: String,
    /// Submission URL of the form, when saved from a form.
    #[serde(rename = "formSubmitURL", skip_serializing_if = "Option::is_none")]
    pub form_submit_url: Option<String>,
    /// HTTP auth realm, when saved from an HTTP auth prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_realm: Option<String>,
}

// Equality deliberately covers only the five required fields.
// `form_submit_url` and `http_realm` do not participate, so two logins that
// differ only in an optional field compare equal.
impl PartialEq for LoginContent {
    fn eq(&self, other: &Self) -> bool {
        self.hostname == other.hostname
            && self.username == other.username
            && self.password == other.password
            && self.username_field == other.username_field
            && self.password_field == other.password_field
    }
}

impl Eq for LoginContent {}

/// A validated record payload: either login content or a tombstone marking
/// that the record was deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginPayload {
    /// A live login.
    Content(LoginContent),
    /// The record was deleted; no content fields are carried.
    Tombstone,
}

impl LoginPayload {
    /// Validates a raw JSON payload into a typed variant.
    ///
    /// A payload is valid iff it is a tombstone (`deleted: true`, which
    /// short-circuits all other checks), or every required field is present
    /// and is a string. Validation never mutates its input.
    pub fn validate(raw: &Value) -> PayloadResult<Self> {
        let obj = raw.as_object().ok_or(PayloadError::NotAnObject)?;

        if obj.get("deleted").and_then(Value::as_bool).unwrap_or(false) {
            return Ok(Self::Tombstone);
        }

        Ok(Self::Content(LoginContent {
            hostname: required_string(obj, "hostname")?,
            username: required_string(obj, "username")?,
            password: required_string(obj, "password")?,
            username_field: required_string(obj, "usernameField")?,
            password_field: required_string(obj, "passwordField")?,
            form_submit_url: optional_string(obj, "formSubmitURL")?,
            http_realm: optional_string(obj, "httpRealm")?,
        }))
    }

    /// Returns true if this payload is a tombstone.
    pub fn is_tombstone(&self) -> bool {
        matches!(self, Self::Tombstone)
    }

    /// Returns the content fields, if this is not a tombstone.
    pub fn content(&self) -> Option<&LoginContent> {
        match self {
            Self::Content(content) => Some(content),
            Self::Tombstone => None,
        }
    }
}

fn required_string(obj: &Map<String, Value>, field: &'static str) -> PayloadResult<String> {
    match obj.get(field) {
        None | Some(Value::Null) => Err(PayloadError::MissingField(field)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(PayloadError::MistypedField {
            field,
            expected: "string",
        }),
    }
}

fn optional_string(obj: &Map<String, Value>, field: &'static str) -> PayloadResult<Option<String>> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(PayloadError::MistypedField {
            field,
            expected: "string",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn content_json() -> Value {
        json!({
            "hostname": "https://example.com",
            "username": "alice",
            "password": "hunter2",
            "usernameField": "user",
            "passwordField": "pass",
        })
    }

    #[test]
    fn validates_content_payload() {
        let payload = LoginPayload::validate(&content_json()).unwrap();
        let content = payload.content().unwrap();
        assert_eq!(content.hostname, "https://example.com");
        assert_eq!(content.username, "alice");
        assert!(content.form_submit_url.is_none());
        assert!(!payload.is_tombstone());
    }

    #[test]
    fn missing_required_field_is_invalid() {
        for field in ["hostname", "username", "password", "usernameField", "passwordField"] {
            let mut raw = content_json();
            raw.as_object_mut().unwrap().remove(field);
            match LoginPayload::validate(&raw) {
                Err(PayloadError::MissingField(reported)) => assert_eq!(reported, field),
                other => panic!("field {field} should be required, got {other:?}"),
            }
        }
    }

    #[test]
    fn mistyped_required_field_is_invalid() {
        let mut raw = content_json();
        raw.as_object_mut()
            .unwrap()
            .insert("password".into(), json!(42));
        assert!(matches!(
            LoginPayload::validate(&raw),
            Err(PayloadError::MistypedField { field: "password", .. })
        ));
    }

    #[test]
    fn tombstone_is_valid_without_content_fields() {
        let raw = json!({ "id": "guid123", "deleted": true });
        let payload = LoginPayload::validate(&raw).unwrap();
        assert!(payload.is_tombstone());
    }

    #[test]
    fn deleted_false_does_not_make_a_tombstone() {
        let mut raw = content_json();
        raw.as_object_mut()
            .unwrap()
            .insert("deleted".into(), json!(false));
        assert!(!LoginPayload::validate(&raw).unwrap().is_tombstone());
    }

    #[test]
    fn non_object_payload_is_invalid() {
        assert_eq!(
            LoginPayload::validate(&json!("nope")),
            Err(PayloadError::NotAnObject)
        );
    }

    #[test]
    fn tombstones_always_equal() {
        assert_eq!(LoginPayload::Tombstone, LoginPayload::Tombstone);
    }

    #[test]
    fn content_equality_ignores_optional_fields() {
        let a = LoginPayload::validate(&content_json()).unwrap();
        let mut raw = content_json();
        raw.as_object_mut()
            .unwrap()
            .insert("formSubmitURL".into(), json!("https://example.com/login"));
        let b = LoginPayload::validate(&raw).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn content_equality_requires_all_required_fields() {
        let a = LoginPayload::validate(&content_json()).unwrap();
        let mut raw = content_json();
        raw.as_object_mut()
            .unwrap()
            .insert("password".into(), json!("different"));
        let b = LoginPayload::validate(&raw).unwrap();
        assert_ne!(a, b);

        let tombstone = LoginPayload::Tombstone;
        assert_ne!(a, tombstone);
    }
}
