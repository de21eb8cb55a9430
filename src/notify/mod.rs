//! Notification composition and delivery
//!
//! One remediation run produces one [`NotificationPayload`], rendered twice:
//! as a structured [`ChatMessage`](chat::ChatMessage) posted to the chat
//! webhook, then as a plain-text broadcast tagged with the remediation
//! marker so the hub recognizes it when it comes back around.
//!
//! Delivery failures are logged and reported, never escalated. The only
//! error leaving this module is a [`CompositionError`], raised before
//! anything has been sent.

pub mod broadcast;
pub mod chat;

use std::fmt;

use tracing::{debug, error, info, instrument, warn};

use crate::{
    actions::{ExecutionOutcome, ExecutionRecord},
    advisory::AdvisoryResult,
    collaborators::Collaborators,
    diagnostics::{ResourceSnapshot, UNAVAILABLE},
    event::{AlarmCategory, AlarmEvent},
    retry::{Attempt, RetryOutcome, RetryPolicy},
};

use self::chat::ChatMessage;

/// Narrative used when a run neither executed nor deferred anything
pub const NO_ACTIONS: &str = "No automated actions were taken.";

/// Errors detected while composing a notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompositionError {
    /// The chat message did not serialize to an object
    NotAnObject,

    /// The chat message field set differs from the fixed nine fields
    FieldMismatch(Vec<String>),

    /// A chat field is not text
    NonTextField(String),

    Serialization(String),
}

impl fmt::Display for CompositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompositionError::NotAnObject => write!(f, "chat message is not a JSON object"),
            CompositionError::FieldMismatch(fields) => {
                write!(f, "chat message has unexpected fields: {}", fields.join(", "))
            }
            CompositionError::NonTextField(field) => {
                write!(f, "chat message field '{}' is not text", field)
            }
            CompositionError::Serialization(msg) => {
                write!(f, "failed to serialize chat message: {}", msg)
            }
        }
    }
}

impl std::error::Error for CompositionError {}

/// Read-only projection of a run, shared by both renderings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPayload {
    pub alarm_name: String,
    pub timestamp: String,
    pub category: AlarmCategory,
    pub resource_details: String,
    pub metrics_url: String,
    pub top_processes: String,
    pub advice: String,
    pub actions_taken: String,
}

impl NotificationPayload {
    pub fn compose(
        event: &AlarmEvent,
        snapshot: &ResourceSnapshot,
        advisory: &AdvisoryResult,
        outcome: &ExecutionOutcome,
        metrics_url: String,
    ) -> Self {
        Self {
            alarm_name: event.alarm_name.clone(),
            timestamp: event.timestamp.clone(),
            category: event.category,
            resource_details: snapshot.render_details(),
            metrics_url,
            top_processes: snapshot.process_listing.clone(),
            advice: advisory.advice.clone(),
            actions_taken: render_actions(outcome),
        }
    }
}

/// Metric console link for the resource, `N/A` without one
pub fn metrics_url(
    template: &str,
    region: &str,
    resource_id: Option<&str>,
    category: AlarmCategory,
) -> String {
    match resource_id {
        Some(resource_id) => template
            .replace("{region}", region)
            .replace("{resource_id}", resource_id)
            .replace("{category}", category.slug()),
        None => UNAVAILABLE.to_string(),
    }
}

fn render_record(record: &ExecutionRecord) -> String {
    let commands: Vec<String> = record.commands.iter().map(|c| format!("`{c}`")).collect();

    format!(
        "- Description: {}\n  Commands: {}\n  Status: {}\n  Justification: {}",
        record.description,
        commands.join(", "),
        record.status,
        record.justification
    )
}

/// Human-readable narrative of executed and deferred actions
pub fn render_actions(outcome: &ExecutionOutcome) -> String {
    if outcome.is_empty() {
        return NO_ACTIONS.to_string();
    }

    outcome
        .records
        .iter()
        .chain(outcome.deferred.iter())
        .map(render_record)
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatDelivery {
    Delivered { attempts: u32 },
    Failed,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastDelivery {
    Published { topic: String },
    Failed(String),
    NoTopic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub chat: ChatDelivery,
    pub broadcast: BroadcastDelivery,
}

pub struct Notifier<'a> {
    collaborators: &'a Collaborators,
    chat_retry: &'a RetryPolicy,
    default_topic: Option<&'a str>,
}

impl<'a> Notifier<'a> {
    pub fn new(
        collaborators: &'a Collaborators,
        chat_retry: &'a RetryPolicy,
        default_topic: Option<&'a str>,
    ) -> Self {
        Self {
            collaborators,
            chat_retry,
            default_topic,
        }
    }

    /// Send the chat message, then the broadcast
    #[instrument(skip_all, fields(alarm = %payload.alarm_name))]
    pub async fn deliver(
        &self,
        payload: &NotificationPayload,
        inbound_topic: Option<&str>,
    ) -> Result<DeliveryReport, CompositionError> {
        let chat_payload = ChatMessage::from(payload).to_payload()?;
        let message_topic = inbound_topic.or(self.default_topic);

        let chat = self.send_chat(&chat_payload).await;
        let broadcast = self.send_broadcast(payload, message_topic).await;

        Ok(DeliveryReport { chat, broadcast })
    }

    async fn send_chat(&self, chat_payload: &serde_json::Value) -> ChatDelivery {
        let Some(sink) = &self.collaborators.chat else {
            info!("chat webhook not configured, skipping chat delivery");
            return ChatDelivery::Disabled;
        };

        let outcome: RetryOutcome<u32, ()> = self
            .chat_retry
            .run(|attempt| async move {
                match sink.post_chat(chat_payload).await {
                    Ok(()) => Attempt::Ready(attempt + 1),
                    Err(e) => {
                        warn!("chat delivery attempt {} failed: {e}", attempt + 1);
                        Attempt::Pending(None)
                    }
                }
            })
            .await;

        match outcome {
            RetryOutcome::Ready(attempts) => {
                debug!("chat message delivered after {attempts} attempt(s)");
                ChatDelivery::Delivered { attempts }
            }
            RetryOutcome::Exhausted(_) | RetryOutcome::Failed(()) => {
                error!("giving up on chat delivery");
                ChatDelivery::Failed
            }
        }
    }

    async fn send_broadcast(
        &self,
        payload: &NotificationPayload,
        topic: Option<&str>,
    ) -> BroadcastDelivery {
        let Some(topic) = topic else {
            warn!("no broadcast topic known, skipping broadcast");
            return BroadcastDelivery::NoTopic;
        };

        let message = broadcast::compose(payload, topic);
        match self.collaborators.broadcaster.publish(message).await {
            Ok(()) => {
                info!("broadcast published to {topic}");
                BroadcastDelivery::Published {
                    topic: topic.to_string(),
                }
            }
            Err(e) => {
                error!("failed to publish broadcast: {e}");
                BroadcastDelivery::Failed(e.to_string())
            }
        }
    }
}
