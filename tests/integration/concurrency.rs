//! Concurrent remediation runs
//!
//! Independent alarms share one remediator and one collaborator set; each
//! run must still produce exactly one chat message and one broadcast.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use remediation_hub::Remediator;

use crate::helpers::*;

#[tokio::test]
async fn test_concurrent_alarms_are_independent_runs() {
    let fakes = Fakes::default();
    let remediator = Arc::new(Remediator::new(test_settings(), fakes.collaborators()));

    let runs = (0..5).map(|i| {
        let remediator = remediator.clone();
        async move {
            let resource = format!("r-{i}");
            let message = alarm_message(&format!("cpu-high-{i}"), "OK", "ALARM", Some(resource.as_str()));
            remediator
                .handle_envelope(&envelope(&message, None, INBOUND_TOPIC))
                .await
        }
    });

    for response in join_all(runs).await {
        assert_eq!(response.unwrap().status(), Some("ok"));
    }

    let chat = fakes.chat.delivered();
    assert_eq!(chat.len(), 5);
    let names: HashSet<_> = chat
        .iter()
        .map(|c| c["alarm_name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names.len(), 5);

    let published = fakes.broadcaster.published();
    assert_eq!(published.len(), 5);

    // one action per resource
    let targets: HashSet<_> = fakes
        .commands
        .remediation_requests()
        .into_iter()
        .map(|r| r.resource_id)
        .collect();
    assert_eq!(targets.len(), 5);
}

#[tokio::test]
async fn test_spawned_runs_share_the_remediator() {
    let fakes = Fakes::default();
    let remediator = Arc::new(Remediator::new(test_settings(), fakes.collaborators()));

    let handles: Vec<_> = (0..3)
        .map(|i| {
            let remediator = remediator.clone();
            tokio::spawn(async move {
                let message =
                    alarm_message("cpu-high", "OK", "ALARM", Some(format!("r-{i}").as_str()));
                remediator
                    .handle_envelope(&envelope(&message, None, INBOUND_TOPIC))
                    .await
                    .map(|r| r.status_code)
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), 200);
    }

    // replaying every broadcast is a no-op
    let before = fakes.total_calls();
    for message in fakes.broadcaster.published() {
        let response = remediator.handle_envelope(&replay(&message)).await.unwrap();
        assert_eq!(response.status(), Some("skipped"));
    }
    assert_eq!(fakes.total_calls(), before);
}
