//! Inbound notification classification and loop guard
//!
//! Every message delivered to the hub goes through [`classify`] first. Only a
//! genuine transition *into* the firing state starts a remediation run;
//! everything else is skipped before any collaborator is touched.
//!
//! ```text
//! source == "remediation"        → SelfEcho(Tagged)
//! body is alarm JSON:
//!   prior != ALARM, new == ALARM → NewTransition
//!   otherwise                    → Unknown(NotATransition)
//! body starts with "Alarm:"      → SelfEcho(Plaintext)
//! anything else                  → Unknown(Unparseable)
//! ```

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;
use tracing::trace;

/// Attribute carrying the origin marker
pub const SOURCE_ATTRIBUTE: &str = "source";

/// Marker value for messages published by the hub itself
pub const REMEDIATION_SOURCE: &str = "remediation";

/// Literal prefix of every broadcast body the hub publishes
pub const ECHO_PREFIX: &str = "Alarm:";

/// Dimension holding the affected resource identifier
const RESOURCE_DIMENSION: &str = "InstanceId";

/// A notification as delivered to the handler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundNotification {
    /// Raw message body
    pub message: String,

    /// String message attributes
    pub attributes: HashMap<String, String>,

    /// Channel the message arrived on, if known
    pub topic: Option<String>,
}

impl InboundNotification {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Extract the first record of a pub/sub delivery envelope
    ///
    /// Attribute values are accepted both as `Value` and `StringValue`.
    pub fn from_envelope(envelope: &serde_json::Value) -> Result<Self, EnvelopeError> {
        let envelope = Envelope::deserialize(envelope)
            .map_err(|e| EnvelopeError::Malformed(e.to_string()))?;

        let record = envelope
            .records
            .into_iter()
            .next()
            .ok_or(EnvelopeError::MissingRecord)?;

        let attributes = record
            .sns
            .attributes
            .into_iter()
            .filter_map(|(key, attr)| attr.value.map(|value| (key, value)))
            .collect();

        Ok(Self {
            message: record.sns.message,
            attributes,
            topic: record.sns.topic,
        })
    }

    fn source(&self) -> Option<&str> {
        self.attributes.get(SOURCE_ATTRIBUTE).map(String::as_str)
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "Records")]
    records: Vec<EnvelopeRecord>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeRecord {
    #[serde(rename = "Sns")]
    sns: SnsRecord,
}

#[derive(Debug, Deserialize)]
struct SnsRecord {
    #[serde(rename = "Message", default)]
    message: String,

    #[serde(rename = "MessageAttributes", default)]
    attributes: HashMap<String, AttributeValue>,

    #[serde(rename = "TopicArn")]
    topic: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AttributeValue {
    #[serde(rename = "Value", alias = "StringValue")]
    value: Option<String>,
}

/// Errors while unwrapping a delivery envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The envelope has no records
    MissingRecord,

    /// The envelope does not have the expected shape
    Malformed(String),
}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvelopeError::MissingRecord => write!(f, "envelope contains no records"),
            EnvelopeError::Malformed(msg) => write!(f, "malformed envelope: {}", msg),
        }
    }
}

impl std::error::Error for EnvelopeError {}

/// State of a monitored alarm
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmState {
    Ok,
    /// The firing/breaching state
    Alarm,
    InsufficientData,
    Other(String),
}

impl AlarmState {
    pub fn is_firing(&self) -> bool {
        matches!(self, AlarmState::Alarm)
    }

    pub fn as_str(&self) -> &str {
        match self {
            AlarmState::Ok => "OK",
            AlarmState::Alarm => "ALARM",
            AlarmState::InsufficientData => "INSUFFICIENT_DATA",
            AlarmState::Other(other) => other,
        }
    }
}

impl From<&str> for AlarmState {
    fn from(value: &str) -> Self {
        match value {
            "OK" => AlarmState::Ok,
            "ALARM" => AlarmState::Alarm,
            "INSUFFICIENT_DATA" => AlarmState::InsufficientData,
            other => AlarmState::Other(other.to_string()),
        }
    }
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Only a change *into* the firing state qualifies for remediation.
pub fn is_firing_transition(prior: &AlarmState, new: &AlarmState) -> bool {
    !prior.is_firing() && new.is_firing()
}

/// Resource dimension an alarm watches
///
/// Derived from the alarm name: a name containing `memory`
/// (case-insensitive) is a memory alarm, everything else is treated as CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmCategory {
    Cpu,
    Memory,
}

impl AlarmCategory {
    pub fn from_alarm_name(name: &str) -> Self {
        if name.to_lowercase().contains("memory") {
            AlarmCategory::Memory
        } else {
            AlarmCategory::Cpu
        }
    }

    /// Upper-case label used in notifications (`CPU` / `MEMORY`)
    pub fn label(&self) -> &'static str {
        match self {
            AlarmCategory::Cpu => "CPU",
            AlarmCategory::Memory => "MEMORY",
        }
    }

    /// Lower-case slug used in metric links
    pub fn slug(&self) -> &'static str {
        match self {
            AlarmCategory::Cpu => "cpu",
            AlarmCategory::Memory => "memory",
        }
    }

    /// Process listing column the category is sorted by
    pub fn unit(&self) -> &'static str {
        match self {
            AlarmCategory::Cpu => "%CPU",
            AlarmCategory::Memory => "%MEM",
        }
    }

    /// Shell command listing the header plus the top 5 consumers
    pub fn introspection_command(&self) -> &'static str {
        match self {
            AlarmCategory::Cpu => "ps -eo pid,comm,%cpu --sort=-%cpu | head -n6",
            AlarmCategory::Memory => "ps -eo pid,comm,%mem --sort=-%mem | head -n6",
        }
    }
}

/// A parsed alarm transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmEvent {
    pub alarm_name: String,
    pub prior_state: AlarmState,
    pub new_state: AlarmState,
    pub timestamp: String,
    pub category: AlarmCategory,
    pub resource_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlarmPayload {
    #[serde(rename = "AlarmName")]
    alarm_name: Option<String>,

    #[serde(rename = "OldStateValue")]
    old_state: Option<String>,

    #[serde(rename = "NewStateValue")]
    new_state: Option<String>,

    #[serde(rename = "StateChangeTime")]
    state_change_time: Option<String>,

    #[serde(rename = "Trigger", alias = "trigger")]
    trigger: Option<Trigger>,
}

#[derive(Debug, Default, Deserialize)]
struct Trigger {
    #[serde(rename = "Dimensions", alias = "dimensions", default)]
    dimensions: Vec<Dimension>,
}

#[derive(Debug, Deserialize)]
struct Dimension {
    #[serde(rename = "Name", alias = "name")]
    name: Option<String>,

    #[serde(rename = "Value", alias = "value")]
    value: Option<String>,
}

impl AlarmPayload {
    fn resource_id(&self) -> Option<String> {
        self.trigger
            .as_ref()?
            .dimensions
            .iter()
            .find(|d| d.name.as_deref() == Some(RESOURCE_DIMENSION))?
            .value
            .clone()
    }

    fn into_event(self) -> AlarmEvent {
        let resource_id = self.resource_id();
        let alarm_name = self.alarm_name.unwrap_or_else(|| "UnknownAlarm".to_string());

        AlarmEvent {
            category: AlarmCategory::from_alarm_name(&alarm_name),
            prior_state: AlarmState::from(self.old_state.as_deref().unwrap_or_default()),
            new_state: AlarmState::from(self.new_state.as_deref().unwrap_or_default()),
            timestamp: self
                .state_change_time
                .unwrap_or_else(|| "UnknownTime".to_string()),
            alarm_name,
            resource_id,
        }
    }
}

/// How a self-echo was recognized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoKind {
    /// The `source` attribute carries the remediation marker
    Tagged,

    /// The body has the shape of our own broadcast output
    Plaintext,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnknownReason {
    /// Valid alarm data, but not a transition into the firing state
    NotATransition { prior: AlarmState, new: AlarmState },

    /// Neither alarm data nor a self-echo
    Unparseable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    NewTransition(AlarmEvent),
    SelfEcho(EchoKind),
    Unknown(UnknownReason),
}

/// Classify an inbound notification. Pure; never fails.
pub fn classify(notification: &InboundNotification) -> Classification {
    if notification.source() == Some(REMEDIATION_SOURCE) {
        trace!("message carries the remediation marker");
        return Classification::SelfEcho(EchoKind::Tagged);
    }

    match serde_json::from_str::<AlarmPayload>(&notification.message) {
        Ok(payload) => {
            let event = payload.into_event();
            if is_firing_transition(&event.prior_state, &event.new_state) {
                Classification::NewTransition(event)
            } else {
                trace!(
                    "alarm {} went {} -> {}, not a firing transition",
                    event.alarm_name, event.prior_state, event.new_state
                );
                Classification::Unknown(UnknownReason::NotATransition {
                    prior: event.prior_state,
                    new: event.new_state,
                })
            }
        }
        Err(_) if notification.message.starts_with(ECHO_PREFIX) => {
            Classification::SelfEcho(EchoKind::Plaintext)
        }
        Err(e) => {
            trace!("message is not alarm data: {e}");
            Classification::Unknown(UnknownReason::Unparseable)
        }
    }
}
