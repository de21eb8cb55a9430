//! Diagnostic collection for the affected resource
//!
//! Gathers resource metadata and the top consuming processes. Every failure
//! path yields a (possibly degraded) [`ResourceSnapshot`]; nothing in here
//! ever aborts a run.
//!
//! ```text
//! fetch metadata ──(error)──→ N/A placeholders
//! run introspection command ──(error)──→ "Error fetching processes ..."
//! poll invocation (bounded):
//!   not registered yet → retry
//!   terminal status    → stop
//!   other error        → stop, error text
//! ```

use tracing::{debug, instrument, trace, warn};

use crate::{
    collaborators::{CommandInvocation, CommandRequest, CommandStatus, Collaborators, ResourceMetadata},
    config::DiagnosticSettings,
    event::AlarmCategory,
    retry::{Attempt, RetryOutcome},
};

/// Placeholder for metadata that could not be retrieved
pub const UNAVAILABLE: &str = "N/A";

/// Human-readable metadata of the affected resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDetails {
    pub resource_id: String,
    pub name: String,
    pub instance_type: String,
    pub state: String,
    pub availability_zone: String,
    pub launched: String,
    pub private_ip: String,
    pub public_ip: String,
}

impl ResourceDetails {
    fn unavailable(resource_id: &str) -> Self {
        Self {
            resource_id: resource_id.to_string(),
            name: UNAVAILABLE.to_string(),
            instance_type: UNAVAILABLE.to_string(),
            state: UNAVAILABLE.to_string(),
            availability_zone: UNAVAILABLE.to_string(),
            launched: UNAVAILABLE.to_string(),
            private_ip: UNAVAILABLE.to_string(),
            public_ip: UNAVAILABLE.to_string(),
        }
    }

    fn from_metadata(resource_id: &str, metadata: &ResourceMetadata) -> Self {
        let or_na = |value: Option<&str>| value.unwrap_or(UNAVAILABLE).to_string();

        Self {
            resource_id: resource_id.to_string(),
            name: or_na(metadata.name()),
            instance_type: or_na(metadata.instance_type.as_deref()),
            state: or_na(metadata.state.as_ref().map(|s| s.name.as_str())),
            availability_zone: or_na(
                metadata
                    .placement
                    .as_ref()
                    .map(|p| p.availability_zone.as_str()),
            ),
            launched: or_na(metadata.launch_time.as_deref()),
            private_ip: or_na(metadata.private_ip.as_deref()),
            public_ip: or_na(metadata.public_ip.as_deref()),
        }
    }
}

/// Point-in-time evidence about the affected resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSnapshot {
    /// `None` when the alarm did not name a resource
    pub details: Option<ResourceDetails>,

    /// Raw process listing, or a description of why it is missing
    pub process_listing: String,

    /// Name of the single top consumer, if it could be resolved
    pub top_consumer: Option<String>,
}

impl ResourceSnapshot {
    /// Snapshot for an alarm without a resource identifier
    pub fn unresolved() -> Self {
        Self {
            details: None,
            process_listing: "Not available".to_string(),
            top_consumer: None,
        }
    }

    pub fn resource_id(&self) -> Option<&str> {
        self.details.as_ref().map(|d| d.resource_id.as_str())
    }

    /// Multi-line resource block used in notifications
    pub fn render_details(&self) -> String {
        match &self.details {
            Some(d) => format!(
                "Name: {}\nInstanceId: {}\nType: {}\nState: {}\nAZ: {}\nLaunched: {}\nPrivate IP: {}\nPublic IP: {}",
                d.name,
                d.resource_id,
                d.instance_type,
                d.state,
                d.availability_zone,
                d.launched,
                d.private_ip,
                d.public_ip
            ),
            None => "No resource identifier found in alarm.".to_string(),
        }
    }
}

/// Name of the top consumer: second column of the first data row
pub fn parse_top_consumer(listing: &str) -> Option<String> {
    listing
        .lines()
        .nth(1)?
        .split_whitespace()
        .nth(1)
        .map(str::to_string)
}

pub struct DiagnosticCollector<'a> {
    collaborators: &'a Collaborators,
    settings: &'a DiagnosticSettings,
}

impl<'a> DiagnosticCollector<'a> {
    pub fn new(collaborators: &'a Collaborators, settings: &'a DiagnosticSettings) -> Self {
        Self {
            collaborators,
            settings,
        }
    }

    /// Build a snapshot of the resource; never fails
    #[instrument(skip(self))]
    pub async fn collect(
        &self,
        resource_id: Option<&str>,
        category: AlarmCategory,
    ) -> ResourceSnapshot {
        let Some(resource_id) = resource_id else {
            debug!("alarm carries no resource identifier, skipping diagnostics");
            return ResourceSnapshot::unresolved();
        };

        let details = self.fetch_details(resource_id).await;
        let (process_listing, top_consumer) = self.capture_processes(resource_id, category).await;

        debug!("top consumer: {top_consumer:?}");

        ResourceSnapshot {
            details: Some(details),
            process_listing,
            top_consumer,
        }
    }

    async fn fetch_details(&self, resource_id: &str) -> ResourceDetails {
        match self.collaborators.resources.fetch_metadata(resource_id).await {
            Ok(metadata) => ResourceDetails::from_metadata(resource_id, &metadata),
            Err(e) => {
                warn!("failed to fetch metadata for {resource_id}: {e}");
                ResourceDetails::unavailable(resource_id)
            }
        }
    }

    async fn capture_processes(
        &self,
        resource_id: &str,
        category: AlarmCategory,
    ) -> (String, Option<String>) {
        let request = CommandRequest {
            resource_id: resource_id.to_string(),
            document: self.settings.document.clone(),
            commands: vec![category.introspection_command().to_string()],
            timeout_secs: self.settings.command_timeout_secs,
        };

        let command_id = match self.collaborators.commands.run_command(request).await {
            Ok(command_id) => command_id,
            Err(e) => {
                warn!("failed to dispatch introspection command: {e}");
                return (format!("Error fetching processes via remote command: {e}"), None);
            }
        };

        trace!("introspection command {command_id} dispatched");

        let commands = &self.collaborators.commands;
        let command_id = command_id.as_str();

        let outcome = self
            .settings
            .poll
            .run(|attempt| async move {
                trace!("polling {command_id} (attempt {})", attempt + 1);
                match commands.poll_command(command_id, resource_id).await {
                    Ok(invocation) if invocation.status.is_terminal() => Attempt::Ready(invocation),
                    Ok(invocation) => Attempt::Pending(Some(invocation)),
                    Err(e) if e.is_retryable() => Attempt::Pending(None),
                    Err(e) => Attempt::Failed(e),
                }
            })
            .await;

        match outcome {
            RetryOutcome::Ready(CommandInvocation {
                status: CommandStatus::Success,
                stdout,
            }) => {
                let listing = stdout.trim().to_string();
                let top_consumer = parse_top_consumer(&listing);
                (listing, top_consumer)
            }
            RetryOutcome::Ready(invocation) | RetryOutcome::Exhausted(Some(invocation)) => {
                warn!("introspection command ended with status {}", invocation.status);
                (format!("Remote command status: {}", invocation.status), None)
            }
            RetryOutcome::Exhausted(None) => {
                warn!("introspection command never became visible");
                ("Remote command did not complete".to_string(), None)
            }
            RetryOutcome::Failed(e) => {
                warn!("failed to poll introspection command: {e}");
                (format!("Error fetching processes via remote command: {e}"), None)
            }
        }
    }
}
