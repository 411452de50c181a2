//! Decoding of inbound transport payloads into events

use rand::rng;
use serde_json::{Map, Value};

use super::generator::SyntheticEvents;
use crate::config::ValidationMode;
use crate::types::{AttendanceAction, AttendanceEvent, AttendanceStatus, IngressError};
use crate::utils::current_timestamp_ms;

/// Turn a raw "new event" payload into an event
///
/// Permissive mode accepts any JSON object: absent strings become empty, a
/// missing id is generated, scalars are stringified and unrecognized enum
/// values are kept as received. Strict mode requires every field and recognized
/// enum values.
pub fn decode_event(payload: Value, mode: ValidationMode) -> Result<AttendanceEvent, IngressError> {
    let Value::Object(fields) = payload else {
        return Err(IngressError::NotAnObject);
    };

    match mode {
        ValidationMode::Permissive => Ok(decode_permissive(&fields)),
        ValidationMode::Strict => decode_strict(&fields),
    }
}

fn decode_permissive(fields: &Map<String, Value>) -> AttendanceEvent {
    let text = |key: &str| fields.get(key).and_then(scalar_text).unwrap_or_default();

    let id = match text("id") {
        id if id.is_empty() => generated_id(),
        id => id,
    };
    let action = AttendanceAction::from(text("action"));
    let status = AttendanceStatus::from(text("status"));

    AttendanceEvent {
        id,
        employee_name: text("employeeName"),
        action,
        timestamp: text("timestamp"),
        status,
        message: text("message"),
    }
}

fn decode_strict(fields: &Map<String, Value>) -> Result<AttendanceEvent, IngressError> {
    let id = required_text(fields, "id")?;
    let employee_name = required_text(fields, "employeeName")?;
    let action = required_text(fields, "action")?;
    let action = action
        .parse::<AttendanceAction>()
        .map_err(|value| IngressError::UnrecognizedValue { field: "action", value })?;
    let status = required_text(fields, "status")?;
    let status = status
        .parse::<AttendanceStatus>()
        .map_err(|value| IngressError::UnrecognizedValue { field: "status", value })?;

    Ok(AttendanceEvent {
        id,
        employee_name,
        action,
        timestamp: string_field(fields, "timestamp")?,
        status,
        message: string_field(fields, "message")?,
    })
}

/// Non-empty string field
fn required_text(fields: &Map<String, Value>, key: &'static str) -> Result<String, IngressError> {
    match string_field(fields, key)? {
        value if value.is_empty() => Err(IngressError::MissingField(key)),
        value => Ok(value),
    }
}

/// Present string field, possibly empty
fn string_field(fields: &Map<String, Value>, key: &'static str) -> Result<String, IngressError> {
    match fields.get(key) {
        None | Some(Value::Null) => Err(IngressError::MissingField(key)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(IngressError::WrongType(key)),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn generated_id() -> String {
    let mut source = SyntheticEvents::with_rng(rng());
    format!("{}-{}", current_timestamp_ms(), source.id_suffix())
}
