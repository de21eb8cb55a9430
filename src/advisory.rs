//! Remediation advice and action plans from the text advisor
//!
//! The advisor answers in two marked sections: a free-text advice paragraph
//! after [`ADVICE_MARKER`] and a JSON plan after [`PLAN_MARKER`]. Its output
//! is treated as untrusted text; anything that does not parse degrades to an
//! empty plan rather than an error.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, trace, warn};

use crate::{
    collaborators::{AdvisorRequest, Collaborators, LinkChecker},
    config::AdvisorSettings,
    diagnostics::ResourceSnapshot,
    event::{AlarmCategory, AlarmEvent},
};

pub const ADVICE_MARKER: &str = "###ADVICE###";
pub const PLAN_MARKER: &str = "###PLAN###";

/// Advice used when the advisor cannot be reached
pub const FALLBACK_ADVICE: &str = "Advisor unavailable; defaulting to terminate the top process.";

/// Command a remediation step is executed with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    /// Shell commands run through the remote command service
    RemoteCommand,

    /// Anything else the advisor came up with; never executed
    Other(String),
}

impl From<&str> for ActionKind {
    fn from(value: &str) -> Self {
        match value {
            "remote_command" | "ssm_command" => ActionKind::RemoteCommand,
            other => ActionKind::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposedAction {
    pub kind: ActionKind,
    pub description: String,
    pub commands: Vec<String>,
    pub justification: String,
}

/// Ordered list of proposed remediation steps
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionPlan {
    pub actions: Vec<ProposedAction>,
}

impl ActionPlan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Single-step plan terminating the top consumer
    ///
    /// `None` when the process name is not safe to put on a command line.
    pub fn terminate(process: &str, category: AlarmCategory) -> Option<Self> {
        let command = terminate_command(process)?;
        Some(Self {
            actions: vec![ProposedAction {
                kind: ActionKind::RemoteCommand,
                description: format!("Kill top process '{process}' to reduce load"),
                commands: vec![command],
                justification: format!(
                    "Killing '{process}' will immediately reduce {} usage.",
                    category.label()
                ),
            }],
        })
    }
}

/// Process names accepted verbatim on a remote command line
static PROCESS_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._:-]+$").expect("process name pattern is valid"));

pub fn is_safe_process_name(process: &str) -> bool {
    PROCESS_NAME.is_match(process)
}

/// Command terminating every process with the given name
///
/// Returns `None` for names carrying shell metacharacters.
pub fn terminate_command(process: &str) -> Option<String> {
    if !is_safe_process_name(process) {
        warn!("refusing to build a command for process name '{process}'");
        return None;
    }
    Some(format!("sudo pkill -9 {process}"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvisoryResult {
    pub advice: String,
    pub plan: ActionPlan,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCommands {
    One(String),
    Many(Vec<String>),
}

impl Default for RawCommands {
    fn default() -> Self {
        RawCommands::Many(Vec::new())
    }
}

impl From<RawCommands> for Vec<String> {
    fn from(value: RawCommands) -> Self {
        match value {
            RawCommands::One(command) => vec![command],
            RawCommands::Many(commands) => commands,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawAction {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    commands: RawCommands,
    justification: Option<String>,
}

/// Unwrap `{"completion": "..."}` style responses
pub fn unwrap_envelope(raw: String) -> String {
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(mut object)) => match object.remove("completion") {
            Some(Value::String(completion)) => completion,
            _ => raw,
        },
        _ => raw,
    }
}

fn plan_object(section: &str) -> Option<Value> {
    let section = section.trim();

    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(section) {
        return Some(value);
    }

    // prose or code fences around the object
    let start = section.find('{')?;
    let end = section.rfind('}')?;
    if end <= start {
        return None;
    }

    serde_json::from_str(&section[start..=end])
        .ok()
        .filter(Value::is_object)
}

/// Parse a plan section; malformed input yields an empty plan
pub fn parse_plan(section: &str) -> ActionPlan {
    let Some(mut object) = plan_object(section) else {
        debug!("plan section is not a JSON object");
        return ActionPlan::default();
    };

    let justifications: Vec<String> = object
        .get_mut("justifications")
        .map(Value::take)
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();

    let Some(Value::Array(raw_actions)) = object.get_mut("actions").map(Value::take) else {
        return ActionPlan::default();
    };

    let actions = raw_actions
        .into_iter()
        .enumerate()
        .filter_map(|(idx, value)| match serde_json::from_value::<RawAction>(value) {
            Ok(raw) => Some(ProposedAction {
                kind: ActionKind::from(raw.kind.as_str()),
                description: raw.description,
                commands: raw.commands.into(),
                justification: raw
                    .justification
                    .or_else(|| justifications.get(idx).cloned())
                    .unwrap_or_default(),
            }),
            Err(e) => {
                warn!("ignoring malformed plan action {idx}: {e}");
                None
            }
        })
        .collect();

    ActionPlan { actions }
}

/// Split a response into advice and plan
pub fn split_response(text: &str) -> (String, ActionPlan) {
    match text.split_once(PLAN_MARKER) {
        Some((advice, plan)) if text.contains(ADVICE_MARKER) => (
            advice.replace(ADVICE_MARKER, "").trim().to_string(),
            parse_plan(plan),
        ),
        _ => (text.to_string(), ActionPlan::default()),
    }
}

pub fn build_prompt(event: &AlarmEvent, snapshot: &ResourceSnapshot) -> String {
    let unit = event.category.unit();
    let top = snapshot.top_consumer.as_deref().unwrap_or("Unknown");

    format!(
        "Human: A monitoring alarm '{name}' for resource {resource} fired at {time} \
         due to high {label} usage.\n\n\
         The top process consuming {unit} is: '{top}'.\n\
         Here are the top 5 processes by {unit}:\n{listing}\n\n\
         {ADVICE_MARKER}\n\
         Please provide a clear, concise paragraph of human-friendly advice for a cloud \
         engineer explaining what to check and how to fix this.\n\n\
         {PLAN_MARKER}\n\
         Now output a JSON object with:\n  \
         \"actions\": [ {{ \"type\": \"remote_command\", \"description\": \"...\", \"commands\": [\"...\"] }}, ... ],\n  \
         \"justifications\": [ \"...\", \"...\" ]\n\
         Do not output anything except those two sections, separated by the markers above.\n\
         Assistant:",
        name = event.alarm_name,
        resource = event.resource_id.as_deref().unwrap_or("Unknown"),
        time = event.timestamp,
        label = event.category.label(),
        listing = snapshot.process_listing,
    )
}

/// Keep reachable documentation links and move them below the advice
pub async fn curate_links(advice: String, pattern: &Regex, checker: &dyn LinkChecker) -> String {
    let candidates: Vec<String> = pattern
        .find_iter(&advice)
        .map(|found| found.as_str().to_string())
        .collect();

    let mut reachable = Vec::new();
    for url in candidates {
        if checker.is_reachable(&url).await {
            reachable.push(url);
        } else {
            trace!("dropping unreachable link {url}");
        }
    }

    let Some(first) = reachable.first() else {
        return advice;
    };

    let body = advice
        .split_once(first.as_str())
        .map_or(advice.as_str(), |(before, _)| before)
        .trim();

    format!("{body}\n\nDocumentation Links:\n{}", reachable.join("\n"))
}

pub struct AdvisoryRequester<'a> {
    collaborators: &'a Collaborators,
    settings: &'a AdvisorSettings,
    trusted_links: &'a Regex,
}

impl<'a> AdvisoryRequester<'a> {
    pub fn new(
        collaborators: &'a Collaborators,
        settings: &'a AdvisorSettings,
        trusted_links: &'a Regex,
    ) -> Self {
        Self {
            collaborators,
            settings,
            trusted_links,
        }
    }

    /// Ask the advisor for advice and a plan; never fails
    #[instrument(skip_all, fields(alarm = %event.alarm_name))]
    pub async fn advise(&self, event: &AlarmEvent, snapshot: &ResourceSnapshot) -> AdvisoryResult {
        let request = AdvisorRequest {
            prompt: build_prompt(event, snapshot),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };

        let raw = match self.collaborators.advisor.invoke(request).await {
            Ok(raw) => unwrap_envelope(raw),
            Err(e) => {
                warn!("advisor invocation failed: {e}");
                format!("{ADVICE_MARKER}\n{FALLBACK_ADVICE}\n\n{PLAN_MARKER}\n{{}}")
            }
        };

        let (advice, mut plan) = split_response(&raw);

        if plan.is_empty()
            && let Some(top) = &snapshot.top_consumer
            && let Some(fallback) = ActionPlan::terminate(top, event.category)
        {
            debug!("no usable plan, falling back to terminating '{top}'");
            plan = fallback;
        }

        let advice = curate_links(advice, self.trusted_links, self.collaborators.links.as_ref()).await;

        AdvisoryResult { advice, plan }
    }
}
