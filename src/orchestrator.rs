//! The remediation run
//!
//! [`Remediator`] wires the components together for one inbound
//! notification:
//!
//! ```text
//! classify ──(new transition)──→ collect diagnostics
//!          ──→ request advice ──→ execute actions
//!          ──→ notify (chat, then tagged broadcast)
//! ```
//!
//! Self-echoes and non-transitions end the run right after classification,
//! before any collaborator is called.

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use crate::{
    actions::ActionExecutor,
    advisory::AdvisoryRequester,
    collaborators::Collaborators,
    config::Settings,
    diagnostics::DiagnosticCollector,
    event::{AlarmEvent, Classification, EchoKind, InboundNotification, UnknownReason, classify},
    notify::{self, NotificationPayload, Notifier},
};

/// Result handed back to whoever delivered the notification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandlerResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: Value,
}

impl HandlerResponse {
    pub fn ok() -> Self {
        Self {
            status_code: 200,
            body: json!({ "status": "ok" }),
        }
    }

    pub fn skipped(reason: Option<&str>) -> Self {
        let body = match reason {
            Some(reason) => json!({ "status": "skipped", "reason": reason }),
            None => json!({ "status": "skipped" }),
        };
        Self {
            status_code: 200,
            body,
        }
    }

    pub fn rejected(reason: &str) -> Self {
        Self {
            status_code: 400,
            body: json!({ "status": "rejected", "reason": reason }),
        }
    }

    pub fn status(&self) -> Option<&str> {
        self.body.get("status").and_then(Value::as_str)
    }
}

pub struct Remediator {
    settings: Settings,
    collaborators: Collaborators,
}

impl Remediator {
    pub fn new(settings: Settings, collaborators: Collaborators) -> Self {
        Self {
            settings,
            collaborators,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Handle a raw delivery envelope
    pub async fn handle_envelope(&self, envelope: &Value) -> anyhow::Result<HandlerResponse> {
        match InboundNotification::from_envelope(envelope) {
            Ok(notification) => self.handle(&notification).await,
            Err(e) => {
                warn!("rejecting envelope: {e}");
                Ok(HandlerResponse::rejected("malformed envelope"))
            }
        }
    }

    /// Handle one inbound notification
    ///
    /// Fails only when the notification could not be composed; collaborator
    /// failures degrade the content of the run instead.
    #[instrument(skip_all)]
    pub async fn handle(&self, notification: &InboundNotification) -> anyhow::Result<HandlerResponse> {
        match classify(notification) {
            Classification::SelfEcho(EchoKind::Tagged) => {
                debug!("ignoring tagged self-echo");
                Ok(HandlerResponse::skipped(None))
            }
            Classification::SelfEcho(EchoKind::Plaintext) => {
                debug!("ignoring plaintext self-echo");
                Ok(HandlerResponse::skipped(Some("plaintext echo")))
            }
            Classification::Unknown(UnknownReason::NotATransition { prior, new }) => {
                debug!("ignoring {prior} -> {new}");
                Ok(HandlerResponse::skipped(Some("non-transition")))
            }
            Classification::Unknown(UnknownReason::Unparseable) => {
                warn!("rejecting notification of unknown format");
                Ok(HandlerResponse::rejected("unknown format"))
            }
            Classification::NewTransition(event) => {
                self.remediate(&event, notification.topic.as_deref()).await?;
                Ok(HandlerResponse::ok())
            }
        }
    }

    #[instrument(skip(self, event), fields(alarm = %event.alarm_name, resource = ?event.resource_id))]
    async fn remediate(&self, event: &AlarmEvent, topic: Option<&str>) -> anyhow::Result<()> {
        info!("remediating {} ({})", event.alarm_name, event.category.label());

        let resource_id = event.resource_id.as_deref();

        let snapshot = DiagnosticCollector::new(&self.collaborators, &self.settings.diagnostics)
            .collect(resource_id, event.category)
            .await;

        let advisory = AdvisoryRequester::new(
            &self.collaborators,
            &self.settings.advisor,
            &self.settings.trusted_links,
        )
        .advise(event, &snapshot)
        .await;

        let executor = ActionExecutor::new(&self.collaborators, &self.settings.actions);
        let outcome = executor
            .execute(&advisory.plan, resource_id, snapshot.top_consumer.as_deref())
            .await;

        let metrics_url = notify::metrics_url(
            &self.settings.metrics_url_template,
            &self.settings.region,
            resource_id,
            event.category,
        );
        let payload =
            NotificationPayload::compose(event, &snapshot, &advisory, &outcome, metrics_url);

        let report = Notifier::new(
            &self.collaborators,
            &self.settings.chat_retry,
            self.settings.default_topic.as_deref(),
        )
        .deliver(&payload, topic)
        .await?;

        debug!("delivery report: {report:?}");

        if self.settings.actions.run_deferred_after_notify
            && let (Some(deferred), Some(resource_id)) = (&outcome.deferred, resource_id)
        {
            info!("running deferred action '{}'", deferred.description);
            let record = executor.run_deferred(deferred, resource_id).await;
            info!("deferred action finished with {}", record.status);
        }

        Ok(())
    }
}
