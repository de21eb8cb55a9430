//! Plain-text broadcast copy of a notification

use std::collections::HashMap;

use super::NotificationPayload;
use crate::{
    collaborators::BroadcastMessage,
    event::{ECHO_PREFIX, REMEDIATION_SOURCE, SOURCE_ATTRIBUTE},
};

pub fn subject(payload: &NotificationPayload) -> String {
    format!("[Alert] Alarm: {}", payload.alarm_name)
}

/// Body of the broadcast; always starts with [`ECHO_PREFIX`]
pub fn body(payload: &NotificationPayload) -> String {
    let label = payload.category.label();

    format!(
        "{ECHO_PREFIX} {name}\n\
         Time: {time}\n\n\
         Resource Details:\n{details}\n\n\
         {label} Metrics Console:\n{url}\n\n\
         Top 5 {label} Processes:\n{processes}\n\n\
         General Remediation Advice:\n{advice}\n\n\
         === Actions Taken by AI ===\n{actions}\n",
        name = payload.alarm_name,
        time = payload.timestamp,
        details = payload.resource_details,
        url = payload.metrics_url,
        processes = payload.top_processes,
        advice = payload.advice,
        actions = payload.actions_taken,
    )
}

/// Message attributes marking the broadcast as our own output
pub fn attributes() -> HashMap<String, String> {
    HashMap::from([
        (SOURCE_ATTRIBUTE.to_string(), REMEDIATION_SOURCE.to_string()),
        ("slack".to_string(), "true".to_string()),
    ])
}

pub fn compose(payload: &NotificationPayload, topic: &str) -> BroadcastMessage {
    BroadcastMessage {
        topic: topic.to_string(),
        subject: subject(payload),
        body: body(payload),
        attributes: attributes(),
    }
}
