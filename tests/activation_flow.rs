use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use serde_json::json;

use checkout_activation::activation::{
    ActivationOrchestrator, ActivationOutcome, ActivationPhase, ConsoleSession, CredentialStore,
    HttpBillingGateway,
};
use checkout_activation::config::ActivationPolicy;

fn fast_policy(max_attempts: u32) -> ActivationPolicy {
    ActivationPolicy {
        max_attempts,
        retry_delay: Duration::from_millis(1),
    }
}

fn console(
    server: &MockServer,
    credentials: CredentialStore,
) -> (Arc<HttpBillingGateway>, Arc<ConsoleSession>) {
    let gateway =
        Arc::new(HttpBillingGateway::new(server.base_url(), credentials.clone()).unwrap());
    let session = Arc::new(ConsoleSession::new(gateway.clone(), credentials));
    (gateway, session)
}

#[tokio::test]
async fn settled_checkout_activates_and_refreshes_the_session() {
    let server = MockServer::start_async().await;

    let profile_mock = server.mock(|when, then| {
        when.method(GET)
            .path("/billing/profile")
            .header("authorization", "Bearer panel-token");
        then.status(200).json_body(json!({
            "tenant": { "status": "active", "planCode": "starter" },
            "user": { "id": "u-1", "email": "owner@example.com", "role": "admin" }
        }));
    });
    let finalize_mock = server.mock(|when, then| {
        when.method(POST).path("/billing/checkout/finalize");
        then.status(200);
    });

    let (gateway, session) = console(&server, CredentialStore::with_token("panel-token"));
    session.record_usage(42).await;
    let orchestrator =
        ActivationOrchestrator::with_policy(gateway, session.clone(), fast_policy(12));

    let (mut snapshots, completion, _cancel) =
        orchestrator.start(Some("cs_live_123".into())).into_parts();
    let outcome = completion.await.unwrap();

    assert_eq!(outcome, Some(ActivationOutcome::Activated));
    let mut phases = Vec::new();
    while let Some(snapshot) = snapshots.recv().await {
        phases.push(snapshot.phase);
    }
    assert_eq!(phases.last(), Some(&ActivationPhase::Completed));

    // The webhook had already landed, so the pre-flight probe settles the run
    // and the profile refresh accounts for the second hit.
    profile_mock.assert_hits(2);
    finalize_mock.assert_hits(0);
    assert!(session.profile().await.is_some());
    assert!(session.usage_is_stale().await);
    assert_eq!(session.consumed_credits().await, Some(42));
}

#[tokio::test]
async fn pending_webhook_exhausts_the_budget() {
    let server = MockServer::start_async().await;

    let profile_mock = server.mock(|when, then| {
        when.method(GET).path("/billing/profile");
        then.status(200).json_body(json!({
            "tenant": { "status": "pending", "planCode": null },
            "user": { "id": "u-1", "email": "owner@example.com" }
        }));
    });
    let finalize_mock = server.mock(|when, then| {
        when.method(POST).path("/billing/checkout/finalize");
        then.status(200);
    });
    let status_mock = server.mock(|when, then| {
        when.method(GET).path("/billing/checkout/cs_live_123/status");
        then.status(200)
            .json_body(json!({ "found": false, "isActive": false }));
    });

    let (gateway, session) = console(&server, CredentialStore::with_token("panel-token"));
    let orchestrator =
        ActivationOrchestrator::with_policy(gateway, session.clone(), fast_policy(2));

    let (mut snapshots, completion, _cancel) =
        orchestrator.start(Some("cs_live_123".into())).into_parts();
    let outcome = completion.await.unwrap();

    assert_eq!(
        outcome,
        Some(ActivationOutcome::Failed {
            reason: "still processing, please retry".into()
        })
    );
    let mut last = None;
    while let Some(snapshot) = snapshots.recv().await {
        last = Some(snapshot);
    }
    let terminal = last.expect("run should emit snapshots");
    assert_eq!(terminal.phase, ActivationPhase::Failed);
    assert_eq!(terminal.attempt, 2);

    finalize_mock.assert_hits(2);
    profile_mock.assert_hits(3);
    status_mock.assert_hits(1);
    assert!(session.profile().await.is_none());
    assert!(!session.usage_is_stale().await);
}

#[tokio::test]
async fn anonymous_shell_lands_on_needs_login() {
    let server = MockServer::start_async().await;

    let profile_mock = server.mock(|when, then| {
        when.method(GET).path("/billing/profile");
        then.status(200);
    });
    let finalize_mock = server.mock(|when, then| {
        when.method(POST).path("/billing/checkout/finalize");
        then.status(200);
    });
    let status_mock = server.mock(|when, then| {
        when.method(GET).path("/billing/checkout/cs_live_123/status");
        then.status(200)
            .json_body(json!({ "found": true, "isActive": true }));
    });

    let (gateway, session) = console(&server, CredentialStore::new());
    let orchestrator =
        ActivationOrchestrator::with_policy(gateway, session.clone(), fast_policy(12));

    let (mut snapshots, completion, _cancel) =
        orchestrator.start(Some("cs_live_123".into())).into_parts();
    let outcome = completion.await.unwrap();

    assert_eq!(outcome, Some(ActivationOutcome::NeedsLogin));
    let mut last = None;
    while let Some(snapshot) = snapshots.recv().await {
        last = Some(snapshot);
    }
    let terminal = last.expect("run should emit snapshots");
    assert!(terminal.needs_login);
    assert_eq!(terminal.attempt, 1);

    status_mock.assert_hits(1);
    profile_mock.assert_hits(0);
    finalize_mock.assert_hits(0);
}

#[tokio::test]
async fn expiring_session_degrades_to_the_public_probe() {
    let server = MockServer::start_async().await;

    let profile_mock = server.mock(|when, then| {
        when.method(GET).path("/billing/profile");
        then.status(200).json_body(json!({
            "tenant": { "status": "pending", "planCode": null },
            "user": { "id": "u-1", "email": "owner@example.com" }
        }));
    });
    let finalize_mock = server.mock(|when, then| {
        when.method(POST).path("/billing/checkout/finalize");
        then.status(401).json_body(json!({ "error": "session_expired" }));
    });
    let status_mock = server.mock(|when, then| {
        when.method(GET).path("/billing/checkout/cs_live_123/status");
        then.status(200)
            .json_body(json!({ "found": true, "isActive": true }));
    });

    let (gateway, session) = console(&server, CredentialStore::with_token("panel-token"));
    let orchestrator =
        ActivationOrchestrator::with_policy(gateway, session.clone(), fast_policy(12));

    let (mut snapshots, completion, _cancel) =
        orchestrator.start(Some("cs_live_123".into())).into_parts();
    let outcome = completion.await.unwrap();

    assert_eq!(outcome, Some(ActivationOutcome::NeedsLogin));
    let mut last = None;
    while let Some(snapshot) = snapshots.recv().await {
        last = Some(snapshot);
    }
    assert!(last.expect("run should emit snapshots").needs_login);

    // One probe before the loop, one rejected finalize, then public only.
    profile_mock.assert_hits(1);
    finalize_mock.assert_hits(1);
    status_mock.assert_hits(1);
    assert!(session.profile().await.is_none());
}
