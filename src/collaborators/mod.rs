//! External collaborator interfaces
//!
//! The orchestrator never talks to the outside world directly. Every outbound
//! call goes through one of the traits below, bundled in [`Collaborators`]
//! and handed to the [`Remediator`](crate::orchestrator::Remediator) at
//! construction time. Production code uses the HTTP gateways in [`http`];
//! tests substitute in-process fakes.
//!
//! ## Thread Safety
//!
//! Implementations must be `Send + Sync`: the HTTP surface runs independent
//! remediation runs concurrently against the same collaborator set.

pub mod http;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorResult;

/// Metadata of a monitored resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    #[serde(rename = "Tags", default)]
    pub tags: Vec<ResourceTag>,

    #[serde(rename = "InstanceType")]
    pub instance_type: Option<String>,

    #[serde(rename = "State")]
    pub state: Option<LifecycleState>,

    #[serde(rename = "Placement")]
    pub placement: Option<Placement>,

    #[serde(rename = "LaunchTime")]
    pub launch_time: Option<String>,

    #[serde(rename = "PrivateIpAddress")]
    pub private_ip: Option<String>,

    #[serde(rename = "PublicIpAddress")]
    pub public_ip: Option<String>,
}

impl ResourceMetadata {
    /// Value of the `Name` tag, if present
    pub fn name(&self) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.key == "Name")
            .map(|tag| tag.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTag {
    #[serde(rename = "Key")]
    pub key: String,

    #[serde(rename = "Value")]
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleState {
    #[serde(rename = "Name")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    #[serde(rename = "AvailabilityZone")]
    pub availability_zone: String,
}

/// A remote command to run on a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub resource_id: String,
    pub document: String,
    pub commands: Vec<String>,
    pub timeout_secs: u64,
}

/// Status of a remote command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    Pending,
    InProgress,
    Delayed,
    Success,
    Failed,
    TimedOut,
    Cancelled,
    Other(String),
}

impl CommandStatus {
    /// Whether polling can stop at this status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CommandStatus::Success
                | CommandStatus::Failed
                | CommandStatus::TimedOut
                | CommandStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            CommandStatus::Pending => "Pending",
            CommandStatus::InProgress => "InProgress",
            CommandStatus::Delayed => "Delayed",
            CommandStatus::Success => "Success",
            CommandStatus::Failed => "Failed",
            CommandStatus::TimedOut => "TimedOut",
            CommandStatus::Cancelled => "Cancelled",
            CommandStatus::Other(other) => other,
        }
    }
}

impl From<&str> for CommandStatus {
    fn from(value: &str) -> Self {
        match value {
            "Pending" => CommandStatus::Pending,
            "InProgress" => CommandStatus::InProgress,
            "Delayed" => CommandStatus::Delayed,
            "Success" => CommandStatus::Success,
            "Failed" => CommandStatus::Failed,
            "TimedOut" => CommandStatus::TimedOut,
            "Cancelled" => CommandStatus::Cancelled,
            other => CommandStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observed state of a command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub status: CommandStatus,
    pub stdout: String,
}

/// Text generation request
#[derive(Debug, Clone, PartialEq)]
pub struct AdvisorRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Message published on the broadcast channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastMessage {
    pub topic: String,
    pub subject: String,
    pub body: String,
    pub attributes: HashMap<String, String>,
}

/// Resource metadata lookup
#[async_trait]
pub trait ResourceDirectory: Send + Sync {
    async fn fetch_metadata(&self, resource_id: &str) -> CollaboratorResult<ResourceMetadata>;
}

/// Remote command execution service
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Dispatch a command, returning its command identifier
    async fn run_command(&self, request: CommandRequest) -> CollaboratorResult<String>;

    /// Query an invocation
    ///
    /// Must return [`CollaboratorError::NotRegistered`](crate::error::CollaboratorError::NotRegistered)
    /// while the invocation is not known yet.
    async fn poll_command(
        &self,
        command_id: &str,
        resource_id: &str,
    ) -> CollaboratorResult<CommandInvocation>;
}

/// Generative text advisor; stateless across invocations
#[async_trait]
pub trait Advisor: Send + Sync {
    /// Returns the raw response text (possibly an enveloped JSON object)
    async fn invoke(&self, request: AdvisorRequest) -> CollaboratorResult<String>;
}

/// Chat channel receiving the structured notification
#[async_trait]
pub trait ChatSink: Send + Sync {
    async fn post_chat(&self, payload: &serde_json::Value) -> CollaboratorResult<()>;
}

/// Pub/sub broadcast channel
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn publish(&self, message: BroadcastMessage) -> CollaboratorResult<()>;
}

/// Lightweight reachability check for documentation links
#[async_trait]
pub trait LinkChecker: Send + Sync {
    async fn is_reachable(&self, url: &str) -> bool;
}

/// The full capability set a remediation run needs
#[derive(Clone)]
pub struct Collaborators {
    pub resources: Arc<dyn ResourceDirectory>,
    pub commands: Arc<dyn CommandRunner>,
    pub advisor: Arc<dyn Advisor>,
    /// `None` disables chat delivery
    pub chat: Option<Arc<dyn ChatSink>>,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub links: Arc<dyn LinkChecker>,
}
