//! Structured chat message
//!
//! The chat channel receives exactly nine string fields. The set is fixed;
//! downstream workflows map them by name.

use serde::Serialize;
use serde_json::Value;

use super::{CompositionError, NotificationPayload};

/// Field names of a chat message, in rendering order
pub const CHAT_FIELDS: [&str; 9] = [
    "alarm_name",
    "timestamp",
    "resource_details",
    "metrics_type",
    "metrics_url",
    "processes_type",
    "top_processes",
    "advice",
    "actions_taken",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub alarm_name: String,
    pub timestamp: String,
    pub resource_details: String,
    pub metrics_type: String,
    pub metrics_url: String,
    pub processes_type: String,
    pub top_processes: String,
    pub advice: String,
    pub actions_taken: String,
}

impl From<&NotificationPayload> for ChatMessage {
    fn from(payload: &NotificationPayload) -> Self {
        Self {
            alarm_name: payload.alarm_name.clone(),
            timestamp: payload.timestamp.clone(),
            resource_details: payload.resource_details.clone(),
            metrics_type: payload.category.label().to_string(),
            metrics_url: payload.metrics_url.clone(),
            processes_type: payload.category.label().to_string(),
            top_processes: payload.top_processes.clone(),
            advice: payload.advice.clone(),
            actions_taken: payload.actions_taken.clone(),
        }
    }
}

impl ChatMessage {
    /// Serialize and check the message still carries exactly the chat fields
    pub fn to_payload(&self) -> Result<Value, CompositionError> {
        let value = serde_json::to_value(self)
            .map_err(|e| CompositionError::Serialization(e.to_string()))?;
        verify_fields(&value)?;
        Ok(value)
    }
}

pub fn verify_fields(value: &Value) -> Result<(), CompositionError> {
    let Value::Object(object) = value else {
        return Err(CompositionError::NotAnObject);
    };

    let mut keys: Vec<&str> = object.keys().map(String::as_str).collect();
    keys.sort_unstable();

    let mut expected = CHAT_FIELDS.to_vec();
    expected.sort_unstable();

    if keys != expected {
        return Err(CompositionError::FieldMismatch(
            keys.into_iter().map(str::to_string).collect(),
        ));
    }

    if let Some((key, _)) = object.iter().find(|(_, v)| !v.is_string()) {
        return Err(CompositionError::NonTextField(key.clone()));
    }

    Ok(())
}
