//! Execution of advisor-proposed actions
//!
//! Execution happens in two steps. [`triage`] is pure: it drops actions that
//! cannot be run remotely, moves destructive actions into the single deferred
//! slot and normalizes placeholder commands. [`ActionExecutor`] then
//! dispatches what is left, in plan order, one action at a time.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, instrument, warn};

use crate::{
    advisory::{ActionKind, ActionPlan, ProposedAction, terminate_command},
    collaborators::{CommandRequest, Collaborators},
    config::ActionPolicy,
};

/// Unresolved process handle placeholders such as `<stress_pid>`
static PID_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<[^<>\s]*pid>").expect("placeholder pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// Accepted by the remote command service
    Sent,

    /// Dispatch failed
    Failed(String),

    /// Destructive; withheld from immediate execution
    Deferred,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Sent => write!(f, "SENT"),
            ExecutionStatus::Failed(detail) => write!(f, "FAILED: {detail}"),
            ExecutionStatus::Deferred => write!(f, "PENDING"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRecord {
    pub description: String,
    pub commands: Vec<String>,
    pub command_id: Option<String>,
    pub status: ExecutionStatus,
    pub justification: String,
}

impl ExecutionRecord {
    fn deferred(action: ProposedAction) -> Self {
        Self {
            description: action.description,
            commands: action.commands,
            command_id: None,
            status: ExecutionStatus::Deferred,
            justification: action.justification,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub records: Vec<ExecutionRecord>,
    pub deferred: Option<ExecutionRecord>,
}

impl ExecutionOutcome {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.deferred.is_none()
    }
}

/// Actions split by how they will be handled
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Triage {
    /// Safe to run now, commands already normalized
    pub runnable: Vec<ProposedAction>,

    /// Latest destructive action
    pub deferred: Option<ProposedAction>,
}

fn references_unresolved_handle(command: &str, top_consumer: &str) -> bool {
    PID_PLACEHOLDER.is_match(command) || command.contains(&format!("grep {top_consumer}"))
}

/// Replace placeholder commands with a direct termination of the top consumer
///
/// Commands stay verbatim when the top consumer's name is not safe to put on
/// a command line.
pub fn normalize_commands(commands: Vec<String>, top_consumer: Option<&str>) -> Vec<String> {
    match top_consumer {
        Some(top) if commands.iter().any(|c| references_unresolved_handle(c, top)) => {
            terminate_command(top).map_or(commands, |command| vec![command])
        }
        _ => commands,
    }
}

/// Split a plan into runnable and deferred actions. Pure.
pub fn triage(plan: &ActionPlan, policy: &ActionPolicy, top_consumer: Option<&str>) -> Triage {
    let mut triage = Triage::default();

    for action in &plan.actions {
        if let ActionKind::Other(kind) = &action.kind {
            warn!("skipping action '{}' of unsupported type '{kind}'", action.description);
            continue;
        }

        let is_destructive = |commands: &[String]| commands.iter().any(|c| policy.is_destructive(c));

        if is_destructive(&action.commands) {
            triage.defer(action.clone());
            continue;
        }

        let normalized = ProposedAction {
            commands: normalize_commands(action.commands.clone(), top_consumer),
            ..action.clone()
        };

        // the top consumer's name ends up on the command line as well
        if is_destructive(&normalized.commands) {
            triage.defer(normalized);
            continue;
        }

        triage.runnable.push(normalized);
    }

    triage
}

impl Triage {
    fn defer(&mut self, action: ProposedAction) {
        let description = action.description.clone();
        if let Some(replaced) = self.deferred.replace(action) {
            warn!(
                "deferred action '{}' replaced by '{description}'",
                replaced.description
            );
        }
    }
}

pub struct ActionExecutor<'a> {
    collaborators: &'a Collaborators,
    policy: &'a ActionPolicy,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(collaborators: &'a Collaborators, policy: &'a ActionPolicy) -> Self {
        Self {
            collaborators,
            policy,
        }
    }

    #[instrument(skip(self, plan))]
    pub async fn execute(
        &self,
        plan: &ActionPlan,
        resource_id: Option<&str>,
        top_consumer: Option<&str>,
    ) -> ExecutionOutcome {
        let Triage { runnable, deferred } = triage(plan, self.policy, top_consumer);

        // without a resource nothing can run now or later
        let Some(resource_id) = resource_id else {
            if !runnable.is_empty() || deferred.is_some() {
                warn!(
                    "no resource to run {} action(s) on",
                    runnable.len() + usize::from(deferred.is_some())
                );
            }
            return ExecutionOutcome::default();
        };

        let deferred = deferred.map(ExecutionRecord::deferred);

        let mut records = Vec::with_capacity(runnable.len());
        for action in runnable {
            records.push(self.dispatch(action, resource_id).await);
        }

        ExecutionOutcome { records, deferred }
    }

    /// Dispatch a previously deferred action
    pub async fn run_deferred(
        &self,
        deferred: &ExecutionRecord,
        resource_id: &str,
    ) -> ExecutionRecord {
        let action = ProposedAction {
            kind: ActionKind::RemoteCommand,
            description: deferred.description.clone(),
            commands: deferred.commands.clone(),
            justification: deferred.justification.clone(),
        };
        self.dispatch(action, resource_id).await
    }

    async fn dispatch(&self, action: ProposedAction, resource_id: &str) -> ExecutionRecord {
        let request = CommandRequest {
            resource_id: resource_id.to_string(),
            document: self.policy.document.clone(),
            commands: action.commands.clone(),
            timeout_secs: self.policy.timeout_secs,
        };

        let (command_id, status) = match self.collaborators.commands.run_command(request).await {
            Ok(command_id) => {
                info!("dispatched '{}' as {command_id}", action.description);
                (Some(command_id), ExecutionStatus::Sent)
            }
            Err(e) => {
                warn!("failed to dispatch '{}': {e}", action.description);
                (None, ExecutionStatus::Failed(e.to_string()))
            }
        };

        ExecutionRecord {
            description: action.description,
            commands: action.commands,
            command_id,
            status,
            justification: action.justification,
        }
    }
}
