//! Polling, cancellation and interrupt handling.

use std::time::Duration;

use futures::future::join_all;
use pretty_assertions::assert_eq;
use quarry::error::FailureKind;
use quarry::service::{QueryState, QueryService, QueryTarget, MockQueryService};
use quarry::{ConfigOverrides, Origin, Params, QuarryError};
use tokio_util::sync::CancellationToken;

use super::common::{fast_config, sample_service, uncached_client, Caches};

/// Cancels `token` after a short delay, while the query is being polled.
fn cancel_soon(token: &CancellationToken) {
    let token = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });
}

#[tokio::test]
async fn test_polls_through_pending_states() {
    let service = sample_service().with_states([QueryState::Queued, QueryState::Running, QueryState::Running]);
    let client = uncached_client(&service, fast_config());

    let handle = client.submit("SELECT 1", Params::None).await.unwrap();
    let info = handle.join().await.unwrap();

    assert_eq!(info.state, QueryState::Succeeded);
    assert_eq!(service.count("GetQueryExecution"), 4);
    assert_eq!(
        service.request_log(),
        vec![
            "StartQueryExecution",
            "GetQueryExecution",
            "GetQueryExecution",
            "GetQueryExecution",
            "GetQueryExecution",
        ]
    );
}

#[tokio::test]
async fn test_interrupt_cancels_execution_once() {
    let service = MockQueryService::new().hanging();
    let token = CancellationToken::new();
    let client = uncached_client(&service, fast_config()).with_cancellation(token.clone());

    let handle = client.submit("SELECT 1", Params::None).await.unwrap();
    cancel_soon(&token);

    let err = handle.get_results().await.unwrap_err();
    assert!(matches!(err, QuarryError::Interrupted { ref execution_id } if execution_id == handle.execution_id()));

    // Waiting again does not send a second cancel.
    let err = handle.join().await.unwrap_err();
    assert!(matches!(err, QuarryError::Interrupted { .. }));
    assert_eq!(service.cancellations(), 1);

    let info = service.get_status(handle.execution_id()).await.unwrap();
    assert_eq!(info.state, QueryState::Cancelled);
}

#[tokio::test]
async fn test_interrupt_without_kill_leaves_execution_running() {
    let service = MockQueryService::new().hanging();
    let token = CancellationToken::new();
    let client = uncached_client(&service, fast_config())
        .with_cancellation(token.clone())
        .using(&ConfigOverrides::new().kill_on_interrupt(false));

    let handle = client.submit("SELECT 1", Params::None).await.unwrap();
    cancel_soon(&token);

    let err = handle.join().await.unwrap_err();
    assert!(matches!(err, QuarryError::Interrupted { .. }));
    assert_eq!(service.cancellations(), 0);
    assert_eq!(
        service.get_status(handle.execution_id()).await.unwrap().state,
        QueryState::Running
    );
}

#[tokio::test]
async fn test_interrupt_with_failing_cancel() {
    let service = MockQueryService::new().hanging().with_failing_cancel();
    let token = CancellationToken::new();
    let client = uncached_client(&service, fast_config()).with_cancellation(token.clone());

    let handle = client.submit("SELECT 1", Params::None).await.unwrap();
    cancel_soon(&token);

    // The cancel failure is logged; the caller still sees the interrupt.
    let err = handle.join().await.unwrap_err();
    assert!(matches!(err, QuarryError::Interrupted { .. }));
    assert_eq!(service.cancellations(), 1);
}

#[tokio::test]
async fn test_interrupt_during_submission() {
    let caches = Caches::new();
    let service = MockQueryService::new().hanging();
    let token = CancellationToken::new();
    token.cancel();
    let client = caches.client(&service, fast_config()).with_cancellation(token);

    let err = client.submit("SELECT 1", Params::None).await.unwrap_err();

    assert!(matches!(err, QuarryError::Interrupted { .. }));
    assert_eq!(service.submissions(), 1);
    assert_eq!(service.cancellations(), 1);
    // The interrupted execution is not offered to other clients.
    assert!(caches.remote.keys().is_empty());
}

#[tokio::test]
async fn test_handle_token_interrupts_only_that_handle() {
    let service = sample_service();
    let client = uncached_client(&service, fast_config());

    let first = client.submit("SELECT 1", Params::None).await.unwrap();
    let second = client.submit("SELECT 2", Params::None).await.unwrap();
    first.cancellation_token().cancel();

    assert!(matches!(first.join().await.unwrap_err(), QuarryError::Interrupted { .. }));
    tokio_test::assert_ok!(second.join().await);
}

#[tokio::test]
async fn test_failed_query_is_classified() {
    let service = MockQueryService::new()
        .with_states([QueryState::Running])
        .with_failure("TABLE_NOT_FOUND: line 1:15: Table 'awsdatacatalog.db.missing' does not exist");
    let client = uncached_client(&service, fast_config());

    let err = client.execute("SELECT * FROM missing", Params::None).await.unwrap_err();

    let failure = err.as_failure().unwrap();
    assert_eq!(failure.kind, FailureKind::TableNotFound);
    assert_eq!(err.category(), "Query Failed");
    assert!(err.to_string().contains("does not exist"));
    assert_eq!(service.count("GetQueryResults"), 0);
}

#[tokio::test]
async fn test_missing_database_is_classified() {
    let service = MockQueryService::new().with_failure("SCHEMA_NOT_FOUND: line 1:15: Schema 'nope' does not exist");
    let client = uncached_client(&service, fast_config());

    let err = client.execute("SELECT * FROM nope.t", Params::None).await.unwrap_err();

    assert_eq!(err.as_failure().unwrap().kind, FailureKind::DatabaseNotFound);
}

#[tokio::test]
async fn test_remote_cancellation() {
    let service = MockQueryService::new().hanging();
    let client = uncached_client(&service, fast_config());
    let handle = client.submit("SELECT 1", Params::None).await.unwrap();

    // Someone else stops the execution.
    service.cancel(handle.execution_id()).await.unwrap();

    let err = handle.get_results().await.unwrap_err();
    assert!(matches!(err, QuarryError::QueryCancelled { .. }));
}

#[tokio::test]
async fn test_get_query_attaches_by_id() {
    let service = sample_service();
    let execution_id = service.submit("SELECT 1", &QueryTarget::default()).await.unwrap();
    let client = uncached_client(&service, fast_config());

    let handle = client.get_query(execution_id.clone());
    assert_eq!(handle.origin(), Origin::Attached);
    assert!(handle.fingerprint().is_none());

    let info = handle.get_info().await.unwrap();
    assert_eq!(info.execution_id, execution_id);
    assert_eq!(handle.get_results().await.unwrap().len(), 1);
    assert_eq!(service.submissions(), 1);
}

#[tokio::test]
async fn test_get_query_caches_results_by_id() {
    let caches = Caches::new();
    let service = sample_service();
    let execution_id = service.submit("SELECT 1", &QueryTarget::default()).await.unwrap();

    let first = caches.local_client(&service, fast_config()).get_query(execution_id.as_str());
    first.get_results().await.unwrap();
    let second = caches.local_client(&service, fast_config()).get_query(execution_id.as_str());
    second.get_results().await.unwrap();

    assert_eq!(service.count("GetQueryResults"), 1);
    assert_eq!(caches.local.keys(), vec![format!("results-{execution_id}.csv")]);
}

#[tokio::test]
async fn test_concurrent_waits_share_results() {
    let service = sample_service().with_states([QueryState::Running]);
    let client = uncached_client(&service, fast_config());
    let handle = client.submit("SELECT 1", Params::None).await.unwrap();

    let waits = (0..4).map(|_| {
        let handle = handle.clone();
        async move { handle.get_results().await }
    });
    let results = join_all(waits).await;

    assert_eq!(results.len(), 4);
    for result in &results {
        assert_eq!(result.as_ref().unwrap().len(), 1);
    }
    assert_eq!(service.count("GetQueryResults"), 1);
}

#[tokio::test]
async fn test_explicit_kill() {
    let service = MockQueryService::new().hanging();
    let client = uncached_client(&service, fast_config());
    let handle = client.submit("SELECT 1", Params::None).await.unwrap();

    assert_eq!(handle.get_info().await.unwrap().state, QueryState::Running);
    handle.kill().await.unwrap();

    let err = handle.join().await.unwrap_err();
    assert!(matches!(err, QuarryError::QueryCancelled { .. }));
    assert_eq!(service.cancellations(), 1);
}
