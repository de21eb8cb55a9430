//! HTTP gateways for the collaborator traits
//!
//! Each gateway speaks a small JSON dialect modelled on the cloud APIs it
//! stands in for (instance lookup, remote command service, text model,
//! pub/sub topic, chat webhook).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, trace, warn};

use super::{
    Advisor, AdvisorRequest, BroadcastMessage, Broadcaster, ChatSink, Collaborators,
    CommandInvocation, CommandRequest, CommandRunner, CommandStatus, LinkChecker,
    ResourceDirectory, ResourceMetadata,
};
use crate::{
    config::Config,
    error::{CollaboratorError, CollaboratorResult},
    util,
};

/// Marker the command service uses for invocations it does not know yet
const INVOCATION_DOES_NOT_EXIST: &str = "InvocationDoesNotExist";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

fn client(timeout: Duration) -> anyhow::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

fn trim_base(base: &str) -> String {
    base.trim_end_matches('/').to_string()
}

async fn rejection(response: Response) -> CollaboratorError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    CollaboratorError::Rejected { status, body }
}

pub struct HttpResourceDirectory {
    client: Client,
    base: String,
}

impl HttpResourceDirectory {
    pub fn new(client: Client, base: &str) -> Self {
        Self {
            client,
            base: trim_base(base),
        }
    }
}

#[async_trait]
impl ResourceDirectory for HttpResourceDirectory {
    async fn fetch_metadata(&self, resource_id: &str) -> CollaboratorResult<ResourceMetadata> {
        let url = format!("{}/instances/{resource_id}", self.base);
        trace!("fetching metadata from {url}");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        Ok(response.json().await?)
    }
}

#[derive(Debug, Deserialize)]
struct SendCommandResponse {
    #[serde(rename = "Command")]
    command: SentCommand,
}

#[derive(Debug, Deserialize)]
struct SentCommand {
    #[serde(rename = "CommandId")]
    command_id: String,
}

#[derive(Debug, Deserialize)]
struct InvocationResponse {
    #[serde(rename = "Status")]
    status: String,

    #[serde(rename = "StandardOutputContent", default)]
    stdout: String,
}

pub struct HttpCommandRunner {
    client: Client,
    base: String,
}

impl HttpCommandRunner {
    pub fn new(client: Client, base: &str) -> Self {
        Self {
            client,
            base: trim_base(base),
        }
    }
}

#[async_trait]
impl CommandRunner for HttpCommandRunner {
    async fn run_command(&self, request: CommandRequest) -> CollaboratorResult<String> {
        let url = format!("{}/commands", self.base);
        let payload = json!({
            "InstanceIds": [request.resource_id],
            "DocumentName": request.document,
            "Parameters": { "commands": request.commands },
            "TimeoutSeconds": request.timeout_secs,
        });

        let response = self.client.post(&url).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        let sent: SendCommandResponse = response.json().await?;
        debug!("command {} accepted", sent.command.command_id);
        Ok(sent.command.command_id)
    }

    async fn poll_command(
        &self,
        command_id: &str,
        resource_id: &str,
    ) -> CollaboratorResult<CommandInvocation> {
        let url = format!(
            "{}/commands/{command_id}/invocations/{resource_id}",
            self.base
        );

        let response = self.client.get(&url).send().await?;
        let status = response.status();

        if status.is_success() {
            let invocation: InvocationResponse = response.json().await?;
            return Ok(CommandInvocation {
                status: CommandStatus::from(invocation.status.as_str()),
                stdout: invocation.stdout,
            });
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND || body.contains(INVOCATION_DOES_NOT_EXIST) {
            return Err(CollaboratorError::NotRegistered(command_id.to_string()));
        }

        Err(CollaboratorError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

pub struct HttpAdvisor {
    client: Client,
    endpoint: String,
    model: String,
}

impl HttpAdvisor {
    pub fn new(client: Client, endpoint: &str, model: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl Advisor for HttpAdvisor {
    async fn invoke(&self, request: AdvisorRequest) -> CollaboratorResult<String> {
        let payload = json!({
            "modelId": self.model,
            "prompt": request.prompt,
            "max_tokens_to_sample": request.max_tokens,
            "temperature": request.temperature,
        });

        let response = self.client.post(&self.endpoint).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        Ok(response.text().await?)
    }
}

/// Chat delivery through an incoming webhook
pub struct SlackWebhook {
    client: Client,
    url: String,
}

impl SlackWebhook {
    pub fn new(client: Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl ChatSink for SlackWebhook {
    async fn post_chat(&self, payload: &serde_json::Value) -> CollaboratorResult<()> {
        let response = self.client.post(&self.url).json(payload).send().await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        Ok(())
    }
}

pub struct HttpBroadcaster {
    client: Client,
    endpoint: String,
}

impl HttpBroadcaster {
    pub fn new(client: Client, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl Broadcaster for HttpBroadcaster {
    async fn publish(&self, message: BroadcastMessage) -> CollaboratorResult<()> {
        let attributes: HashMap<_, _> = message
            .attributes
            .iter()
            .map(|(key, value)| {
                (
                    key.clone(),
                    json!({ "DataType": "String", "StringValue": value }),
                )
            })
            .collect();

        let payload = json!({
            "TopicArn": message.topic,
            "Subject": message.subject,
            "Message": message.body,
            "MessageAttributes": attributes,
        });

        let response = self.client.post(&self.endpoint).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        Ok(())
    }
}

/// Treats any 2xx/3xx answer to a `HEAD` request as reachable
pub struct HeadLinkChecker {
    client: Client,
}

impl HeadLinkChecker {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl LinkChecker for HeadLinkChecker {
    async fn is_reachable(&self, url: &str) -> bool {
        match self.client.head(url).send().await {
            Ok(response) => {
                let status = response.status();
                status.is_success() || status.is_redirection()
            }
            Err(e) => {
                trace!("link {url} unreachable: {e}");
                false
            }
        }
    }
}

/// Wire up the HTTP gateways named in the configuration
pub fn build_collaborators(config: &Config) -> anyhow::Result<Collaborators> {
    let endpoints = &config.endpoints;
    let shared = client(DEFAULT_TIMEOUT)?;
    let advisor_client = client(Duration::from_secs(config.advisor.timeout_secs))?;

    let chat_url = util::get_chat_webhook().or_else(|| {
        endpoints
            .chat_webhook
            .clone()
            .filter(|url| !url.trim().is_empty())
    });

    let chat: Option<Arc<dyn ChatSink>> = match chat_url {
        Some(url) => {
            info!("chat delivery enabled");
            Some(Arc::new(SlackWebhook::new(shared.clone(), &url)))
        }
        None => {
            warn!("no chat webhook configured, chat delivery disabled");
            None
        }
    };

    Ok(Collaborators {
        resources: Arc::new(HttpResourceDirectory::new(shared.clone(), &endpoints.resources)),
        commands: Arc::new(HttpCommandRunner::new(shared.clone(), &endpoints.commands)),
        advisor: Arc::new(HttpAdvisor::new(
            advisor_client,
            &endpoints.advisor,
            &config.advisor.model,
        )),
        chat,
        broadcaster: Arc::new(HttpBroadcaster::new(shared, &endpoints.broadcast)),
        links: Arc::new(HeadLinkChecker::new(Duration::from_secs(
            config.links.timeout_secs,
        ))?),
    })
}
