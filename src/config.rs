use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use regex::Regex;
use tracing::trace;

use crate::retry::RetryPolicy;

/// Hub configuration as read from the JSON config file
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Region used when building metric console links
    #[serde(default = "default_region")]
    pub region: String,

    /// Broadcast topic used when the inbound message did not name one
    pub topic: Option<String>,

    pub endpoints: Endpoints,

    #[serde(default)]
    pub advisor: AdvisorConfig,

    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,

    #[serde(default)]
    pub actions: ActionsConfig,

    #[serde(default)]
    pub links: LinksConfig,

    #[serde(default)]
    pub chat: ChatConfig,

    /// Link to the metric console; `{region}`, `{resource_id}` and
    /// `{category}` are substituted
    #[serde(default = "default_metrics_url_template")]
    pub metrics_url_template: String,

    /// HTTP surface (optional - defaults to 0.0.0.0:8080 without auth)
    pub api: Option<ApiSection>,
}

/// Base URLs of the collaborator gateways
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Endpoints {
    pub resources: String,
    pub commands: String,
    pub advisor: String,
    pub broadcast: String,

    /// Chat webhook; `SLACK_WEBHOOK_URL` takes precedence
    pub chat_webhook: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct AdvisorConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_advisor_timeout")]
    pub timeout_secs: u64,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_advisor_timeout(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct DiagnosticsConfig {
    #[serde(default = "default_document")]
    pub document: String,
    #[serde(default = "default_introspection_timeout")]
    pub command_timeout_secs: u64,
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            document: default_document(),
            command_timeout_secs: default_introspection_timeout(),
            poll_attempts: default_poll_attempts(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ActionsConfig {
    /// Case-insensitive substrings marking a command as destructive
    #[serde(default = "default_destructive_terms")]
    pub destructive_terms: Vec<String>,
    #[serde(default = "default_action_timeout")]
    pub timeout_secs: u64,
    /// Dispatch the deferred destructive action once notifications are out
    #[serde(default)]
    pub run_deferred_after_notify: bool,
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            destructive_terms: default_destructive_terms(),
            timeout_secs: default_action_timeout(),
            run_deferred_after_notify: false,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct LinksConfig {
    /// Regex matching documentation links worth keeping
    #[serde(default = "default_trusted_links")]
    pub trusted_pattern: String,
    #[serde(default = "default_link_timeout")]
    pub timeout_secs: u64,
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self {
            trusted_pattern: default_trusted_links(),
            timeout_secs: default_link_timeout(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ChatConfig {
    /// Retries after the first failed delivery
    #[serde(default = "default_chat_retries")]
    pub retries: u32,
    #[serde(default = "default_chat_backoff")]
    pub backoff_base_ms: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            retries: default_chat_retries(),
            backoff_base_ms: default_chat_backoff(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiSection {
    pub bind: Option<SocketAddr>,
    pub token: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_model() -> String {
    "anthropic.claude-v2".to_string()
}

fn default_max_tokens() -> u32 {
    400
}

fn default_temperature() -> f32 {
    0.5
}

fn default_advisor_timeout() -> u64 {
    60
}

fn default_document() -> String {
    "AWS-RunShellScript".to_string()
}

fn default_introspection_timeout() -> u64 {
    30
}

fn default_poll_attempts() -> u32 {
    8
}

fn default_poll_interval() -> u64 {
    2
}

fn default_destructive_terms() -> Vec<String> {
    vec![
        "reboot".to_string(),
        "shutdown".to_string(),
        "poweroff".to_string(),
    ]
}

fn default_action_timeout() -> u64 {
    60
}

fn default_trusted_links() -> String {
    r"https?://(?:docs\.aws\.amazon\.com|aws\.amazon\.com)/\S+".to_string()
}

fn default_link_timeout() -> u64 {
    5
}

fn default_chat_retries() -> u32 {
    2
}

fn default_chat_backoff() -> u64 {
    1000
}

fn default_metrics_url_template() -> String {
    "https://{region}.console.aws.amazon.com/cloudwatch/home?region={region}\
     #resource-health:dashboards/ec2/{resource_id}?~(leadingMetric~'*22{category}-utilization*22)"
        .to_string()
}

/// Runtime settings of a remediation run, resolved from [`Config`]
#[derive(Debug, Clone)]
pub struct Settings {
    pub region: String,
    pub default_topic: Option<String>,
    pub metrics_url_template: String,
    pub diagnostics: DiagnosticSettings,
    pub advisor: AdvisorSettings,
    pub actions: ActionPolicy,
    pub trusted_links: Regex,
    pub chat_retry: RetryPolicy,
}

#[derive(Debug, Clone)]
pub struct DiagnosticSettings {
    pub document: String,
    pub command_timeout_secs: u64,
    pub poll: RetryPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdvisorSettings {
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionPolicy {
    pub document: String,
    pub destructive_terms: Vec<String>,
    pub timeout_secs: u64,
    pub run_deferred_after_notify: bool,
}

impl ActionPolicy {
    /// Whether a command contains one of the destructive terms
    pub fn is_destructive(&self, command: &str) -> bool {
        let command = command.to_lowercase();
        self.destructive_terms
            .iter()
            .any(|term| command.contains(&term.to_lowercase()))
    }
}

impl Default for Settings {
    fn default() -> Self {
        let defaults = ActionsConfig::default();
        Self {
            region: default_region(),
            default_topic: None,
            metrics_url_template: default_metrics_url_template(),
            diagnostics: DiagnosticSettings {
                document: default_document(),
                command_timeout_secs: default_introspection_timeout(),
                poll: RetryPolicy::fixed(
                    default_poll_attempts(),
                    Duration::from_secs(default_poll_interval()),
                ),
            },
            advisor: AdvisorSettings {
                max_tokens: default_max_tokens(),
                temperature: default_temperature(),
            },
            actions: ActionPolicy {
                document: default_document(),
                destructive_terms: defaults.destructive_terms,
                timeout_secs: defaults.timeout_secs,
                run_deferred_after_notify: defaults.run_deferred_after_notify,
            },
            trusted_links: Regex::new(&default_trusted_links())
                .expect("default link pattern is valid"),
            chat_retry: RetryPolicy::exponential(
                default_chat_retries() + 1,
                Duration::from_millis(default_chat_backoff()),
            ),
        }
    }
}

impl Config {
    /// Resolve the file configuration into runtime settings
    pub fn resolve(&self) -> anyhow::Result<Settings> {
        let trusted_links = Regex::new(&self.links.trusted_pattern)
            .with_context(|| format!("invalid link pattern '{}'", self.links.trusted_pattern))?;

        if self.diagnostics.poll_attempts == 0 {
            anyhow::bail!("diagnostics.poll_attempts must be at least 1");
        }

        Ok(Settings {
            region: self.region.clone(),
            default_topic: self.topic.clone(),
            metrics_url_template: self.metrics_url_template.clone(),
            diagnostics: DiagnosticSettings {
                document: self.diagnostics.document.clone(),
                command_timeout_secs: self.diagnostics.command_timeout_secs,
                poll: RetryPolicy::fixed(
                    self.diagnostics.poll_attempts,
                    Duration::from_secs(self.diagnostics.poll_interval_secs),
                ),
            },
            advisor: AdvisorSettings {
                max_tokens: self.advisor.max_tokens,
                temperature: self.advisor.temperature,
            },
            actions: ActionPolicy {
                document: self.diagnostics.document.clone(),
                destructive_terms: self.actions.destructive_terms.clone(),
                timeout_secs: self.actions.timeout_secs,
                run_deferred_after_notify: self.actions.run_deferred_after_notify,
            },
            trusted_links,
            chat_retry: RetryPolicy::exponential(
                self.chat.retries + 1,
                Duration::from_millis(self.chat.backoff_base_ms),
            ),
        })
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
