use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

/// Store-assigned, monotonically increasing event identifier.
pub type EventId = u64;

/// Actor identifier as reported by the producer.
pub type UserId = i64;

/// Metadata key carrying the scenario-execution identifier.
pub const SESSION_ID_KEY: &str = "session_id";

/// An event as submitted by a producer, before the store assigns an id.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewEvent {
    pub scenario: String,
    pub step: String,
    pub user_id: UserId,
    /// Opaque payload, stored verbatim even when it is not an object.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: Value,
    pub occurred_at: DateTime<Utc>,
}

/// An immutable entry in the append-only step event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StepEvent {
    pub event_id: EventId,
    pub user_id: UserId,
    pub scenario: String,
    pub step: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: Value,
    pub occurred_at: DateTime<Utc>,
    /// Extracted from `metadata` at append time.
    #[serde(default)]
    pub session_id: Option<String>,
}

impl StepEvent {
    /// Build a stored event from a producer submission.
    pub fn from_new(event_id: EventId, event: NewEvent) -> Self {
        let session_id = session_id_of(&event.metadata);
        Self {
            event_id,
            user_id: event.user_id,
            scenario: event.scenario,
            step: event.step,
            metadata: event.metadata,
            occurred_at: event.occurred_at,
            session_id,
        }
    }

    /// Look up a dot-separated path in the metadata object.
    ///
    /// Malformed or absent metadata reads as a missing field.
    pub fn metadata_path(&self, path: &str) -> Option<Value> {
        let object = metadata_object(&self.metadata)?;
        let mut segments = path.split('.').filter(|s| !s.is_empty());
        let first = segments.next()?;
        let mut current = object.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current.clone())
    }
}

/// Interpret a raw metadata payload as a JSON object.
///
/// Objects are used directly. Strings holding a serialized object (legacy
/// double-encoded payloads) are parsed. Anything else has no fields.
pub fn metadata_object(metadata: &Value) -> Option<Cow<'_, Map<String, Value>>> {
    match metadata {
        Value::Object(map) => Some(Cow::Borrowed(map)),
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Some(Cow::Owned(map)),
            _ => None,
        },
        _ => None,
    }
}

/// Extract the session identifier from a metadata payload.
pub fn session_id_of(metadata: &Value) -> Option<String> {
    let object = metadata_object(metadata)?;
    match object.get(SESSION_ID_KEY)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

/// Render a metadata value as a grouping key. Null and composite values
/// have no key.
pub fn attribute_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
