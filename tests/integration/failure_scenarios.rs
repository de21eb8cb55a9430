//! Degradation tests
//!
//! These tests verify that collaborator failures degrade only their own
//! step:
//! - Diagnostics failures still yield a complete notification
//! - Advisor failures fall back to fixed advice
//! - Dispatch failures are recorded and do not stop later actions
//! - Delivery failures are retried and never escalate

use std::sync::{Arc, atomic::Ordering};

use pretty_assertions::assert_eq;
use remediation_hub::{
    InboundNotification, Remediator,
    advisory::FALLBACK_ADVICE,
    collaborators::{CommandInvocation, CommandStatus},
    error::CollaboratorError,
    notify::{NO_ACTIONS, chat::CHAT_FIELDS},
};
use serde_json::Value;

use crate::helpers::*;

async fn run(fakes: &Fakes, resource_id: Option<&str>) -> Value {
    let remediator = Remediator::new(test_settings(), fakes.collaborators());
    let notification =
        InboundNotification::new(alarm_message("cpu-high", "OK", "ALARM", resource_id))
            .with_topic(INBOUND_TOPIC);

    let response = remediator.handle(&notification).await.unwrap();
    assert_eq!(response.status_code, 200);

    let delivered = fakes.chat.delivered();
    assert_eq!(delivered.len(), 1);
    delivered[0].clone()
}

fn assert_complete(chat: &Value) {
    let object = chat.as_object().unwrap();
    assert_eq!(object.len(), CHAT_FIELDS.len());
    for field in CHAT_FIELDS {
        assert!(object[field].is_string(), "{field}");
    }
}

#[tokio::test]
async fn test_introspection_dispatch_failure() {
    let fakes = Fakes {
        commands: Arc::new(FakeCommands {
            failing_commands: vec!["ps -eo".to_string()],
            ..FakeCommands::with_listing()
        }),
        advisor: Arc::new(FakeAdvisor::answering("Check the host.")),
        ..Default::default()
    };

    let chat = run(&fakes, Some(RESOURCE_ID)).await;

    assert_complete(&chat);
    assert!(
        chat["top_processes"]
            .as_str()
            .unwrap()
            .starts_with("Error fetching processes via remote command: ")
    );
    assert_eq!(chat["actions_taken"], NO_ACTIONS);
    assert_eq!(fakes.commands.polls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_invocation_never_registered() {
    let fakes = Fakes {
        commands: Arc::new(FakeCommands {
            default_poll: || Err(CollaboratorError::NotRegistered("cmd-1".to_string())),
            ..FakeCommands::with_listing()
        }),
        ..Default::default()
    };

    let chat = run(&fakes, Some(RESOURCE_ID)).await;

    assert_complete(&chat);
    assert_eq!(chat["top_processes"], "Remote command did not complete");
    assert_eq!(fakes.commands.polls.load(Ordering::SeqCst), 8);
}

#[tokio::test]
async fn test_invocation_stuck_in_progress() {
    let fakes = Fakes {
        commands: Arc::new(FakeCommands {
            default_poll: || {
                Ok(CommandInvocation {
                    status: CommandStatus::InProgress,
                    stdout: String::new(),
                })
            },
            ..FakeCommands::with_listing()
        }),
        ..Default::default()
    };

    let chat = run(&fakes, Some(RESOURCE_ID)).await;

    assert_eq!(chat["top_processes"], "Remote command status: InProgress");
}

#[tokio::test]
async fn test_invocation_failed() {
    let fakes = Fakes {
        commands: Arc::new(FakeCommands {
            default_poll: || {
                Ok(CommandInvocation {
                    status: CommandStatus::Failed,
                    stdout: "permission denied".to_string(),
                })
            },
            ..FakeCommands::with_listing()
        }),
        advisor: Arc::new(FakeAdvisor::unavailable()),
        ..Default::default()
    };

    let chat = run(&fakes, Some(RESOURCE_ID)).await;

    assert_eq!(chat["top_processes"], "Remote command status: Failed");
    assert_eq!(fakes.commands.polls.load(Ordering::SeqCst), 1);
    // no top consumer, no fallback action
    assert_eq!(chat["actions_taken"], NO_ACTIONS);
    assert!(fakes.commands.remediation_requests().is_empty());
}

#[tokio::test]
async fn test_fatal_poll_error_stops_polling() {
    let fakes = Fakes {
        commands: Arc::new(FakeCommands {
            default_poll: || {
                Err(CollaboratorError::Rejected {
                    status: 403,
                    body: "AccessDenied".to_string(),
                })
            },
            ..FakeCommands::with_listing()
        }),
        ..Default::default()
    };

    let chat = run(&fakes, Some(RESOURCE_ID)).await;

    assert_eq!(
        chat["top_processes"],
        "Error fetching processes via remote command: request rejected with status 403: AccessDenied"
    );
    assert_eq!(fakes.commands.polls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_metadata_failure_uses_placeholders() {
    let fakes = Fakes {
        resources: Arc::new(FakeResources::default()),
        ..Default::default()
    };

    let chat = run(&fakes, Some(RESOURCE_ID)).await;

    assert_complete(&chat);
    assert_eq!(
        chat["resource_details"],
        "Name: N/A\nInstanceId: r-1\nType: N/A\nState: N/A\nAZ: N/A\nLaunched: N/A\nPrivate IP: N/A\nPublic IP: N/A"
    );
    assert_eq!(chat["top_processes"], CPU_LISTING);
}

#[tokio::test]
async fn test_advisor_failure_with_top_consumer() {
    let fakes = Fakes {
        advisor: Arc::new(FakeAdvisor::unavailable()),
        ..Default::default()
    };

    let chat = run(&fakes, Some(RESOURCE_ID)).await;

    assert_eq!(chat["advice"], FALLBACK_ADVICE);

    let dispatched = fakes.commands.remediation_requests();
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].commands, vec!["sudo pkill -9 stress".to_string()]);

    let actions = chat["actions_taken"].as_str().unwrap();
    assert!(actions.contains("Kill top process 'stress' to reduce load"));
    assert!(actions.contains("Killing 'stress' will immediately reduce CPU usage."));
}

#[tokio::test]
async fn test_no_resource_identifier() {
    let fakes = Fakes {
        advisor: Arc::new(FakeAdvisor::unavailable()),
        ..Default::default()
    };

    let chat = run(&fakes, None).await;

    assert_complete(&chat);
    assert_eq!(chat["resource_details"], "No resource identifier found in alarm.");
    assert_eq!(chat["metrics_url"], "N/A");
    assert_eq!(chat["top_processes"], "Not available");
    assert_eq!(chat["actions_taken"], NO_ACTIONS);
    assert_eq!(fakes.resources.calls.load(Ordering::SeqCst), 0);
    assert!(fakes.commands.requests().is_empty());
}

#[tokio::test]
async fn test_destructive_action_without_resource_is_not_deferred() {
    let plan = "###ADVICE###\nReboot it.\n###PLAN###\n{\"actions\":[\
        {\"type\":\"remote_command\",\"description\":\"Reboot host\",\"commands\":[\"sudo reboot\"]}]}";

    let fakes = Fakes {
        advisor: Arc::new(FakeAdvisor::answering(plan)),
        ..Default::default()
    };

    let chat = run(&fakes, None).await;

    assert_complete(&chat);
    assert_eq!(chat["actions_taken"], NO_ACTIONS);
    assert!(fakes.commands.requests().is_empty());
}

#[tokio::test]
async fn test_unsafe_top_consumer_is_never_put_on_a_command_line() {
    let fakes = Fakes {
        commands: Arc::new(FakeCommands {
            default_poll: || {
                Ok(CommandInvocation {
                    status: CommandStatus::Success,
                    stdout: "PID COMMAND %CPU\n4242 x;reboot 99.0\n".to_string(),
                })
            },
            ..FakeCommands::with_listing()
        }),
        advisor: Arc::new(FakeAdvisor::unavailable()),
        ..Default::default()
    };

    let chat = run(&fakes, Some(RESOURCE_ID)).await;

    assert_complete(&chat);
    assert_eq!(chat["advice"], FALLBACK_ADVICE);
    assert_eq!(chat["actions_taken"], NO_ACTIONS);
    assert!(fakes.commands.remediation_requests().is_empty());
}

#[tokio::test]
async fn test_dispatch_failure_is_recorded() {
    let plan = "###ADVICE###\nTwo steps.\n###PLAN###\n{\"actions\":[\
        {\"type\":\"remote_command\",\"description\":\"Flush\",\"commands\":[\"sync; echo 3 > /proc/sys/vm/drop_caches\"]},\
        {\"type\":\"remote_command\",\"description\":\"Stop stress\",\"commands\":[\"pkill stress\"]}]}";

    let fakes = Fakes {
        commands: Arc::new(FakeCommands {
            failing_commands: vec!["drop_caches".to_string()],
            ..FakeCommands::with_listing()
        }),
        advisor: Arc::new(FakeAdvisor::answering(plan)),
        ..Default::default()
    };

    let chat = run(&fakes, Some(RESOURCE_ID)).await;

    assert_eq!(fakes.commands.remediation_requests().len(), 2);

    let actions = chat["actions_taken"].as_str().unwrap();
    assert!(actions.contains("Status: FAILED: request rejected with status 400: InvalidInstanceId"));
    assert!(actions.contains("- Description: Stop stress\n  Commands: `pkill stress`\n  Status: SENT"));
}

#[tokio::test]
async fn test_chat_retried_until_delivered() {
    let fakes = Fakes {
        chat: Arc::new(FakeChat::failing(2)),
        ..Default::default()
    };

    run(&fakes, Some(RESOURCE_ID)).await;

    assert_eq!(fakes.chat.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(fakes.broadcaster.published().len(), 1);
}

#[tokio::test]
async fn test_chat_failure_does_not_block_broadcast() {
    let fakes = Fakes {
        chat: Arc::new(FakeChat::failing(usize::MAX)),
        ..Default::default()
    };
    let remediator = Remediator::new(test_settings(), fakes.collaborators());

    let notification =
        InboundNotification::new(alarm_message("cpu-high", "OK", "ALARM", Some(RESOURCE_ID)));
    let response = remediator.handle(&notification).await.unwrap();

    assert_eq!(response.status(), Some("ok"));
    assert_eq!(fakes.chat.attempts.load(Ordering::SeqCst), 3);
    assert!(fakes.chat.delivered().is_empty());
    assert_eq!(fakes.broadcaster.published().len(), 1);
}

#[tokio::test]
async fn test_broadcast_failure_is_not_escalated() {
    let fakes = Fakes {
        broadcaster: Arc::new(FakeBroadcaster {
            fail: true,
            ..Default::default()
        }),
        ..Default::default()
    };

    run(&fakes, Some(RESOURCE_ID)).await;

    assert_eq!(fakes.broadcaster.published().len(), 1);
}

#[tokio::test]
async fn test_chat_disabled_still_broadcasts() {
    let fakes = Fakes::default();
    let mut collaborators = fakes.collaborators();
    collaborators.chat = None;
    let remediator = Remediator::new(test_settings(), collaborators);

    let notification =
        InboundNotification::new(alarm_message("cpu-high", "OK", "ALARM", Some(RESOURCE_ID)));
    let response = remediator.handle(&notification).await.unwrap();

    assert_eq!(response.status(), Some("ok"));
    assert_eq!(fakes.chat.attempts.load(Ordering::SeqCst), 0);
    assert_eq!(fakes.broadcaster.published().len(), 1);
}
