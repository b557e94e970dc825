//! Cache precedence and write-through tests.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use quarry::cache::{Fingerprint, LocalEntry};
use quarry::error::FailureKind;
use quarry::query::QueryController;
use quarry::service::{ExecutionId, MockExecution, MockQueryService, QueryInfo, QueryState, RawResultSet, ColumnMetadata};
use quarry::storage::{FileStorage, Storage};
use quarry::{params, Client, ConfigOverrides, Origin, Params, QuarryError, Value};
use tempfile::TempDir;

use super::common::{fast_config, sample_service, Caches};

const SQL: &str = "SELECT %s id, %s name, %s value";

fn fingerprint_of(sql: &str, params: &Params) -> Fingerprint {
    QueryController::prepare(sql, params, &fast_config())
        .unwrap()
        .fingerprint
}

#[tokio::test]
async fn test_fresh_client_reads_shared_local_cache() {
    let dir = TempDir::new().unwrap();
    let cache_path = dir.path().join("cache");

    let first_service = sample_service();
    let first = Client::with_storage(
        Arc::new(first_service.clone()),
        fast_config(),
        Some(Arc::new(FileStorage::new(&cache_path)) as Arc<dyn Storage>),
        None,
    );
    let results = first.execute(SQL, params![1, "foo", 3.14]).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(first_service.submissions(), 1);

    // A new process: fresh client, fresh service, same cache directory.
    let second_service = MockQueryService::new();
    let mut config = fast_config();
    config.cache.local = Some(cache_path.display().to_string());
    let second = Client::new(Arc::new(second_service.clone()), config).unwrap();

    let handle = second.submit(SQL, params![1, "foo", 3.14]).await.unwrap();
    assert_eq!(handle.origin(), Origin::CachedLocal);
    let cached = handle.get_results().await.unwrap();

    assert_eq!(cached, results);
    assert_eq!(
        cached.get(0).unwrap(),
        &vec![Value::Int(1), Value::from("foo"), Value::Float(3.14)]
    );
    assert!(second_service.request_log().is_empty());
}

#[tokio::test]
async fn test_local_cache_checked_before_remote() {
    let caches = Caches::new();
    let first_service = sample_service();
    caches
        .client(&first_service, fast_config())
        .execute(SQL, params![1, "foo", 3.14])
        .await
        .unwrap();

    // Point the remote entry at an execution the next service does not know.
    // Consulting it would fail with a service error.
    let fingerprint = fingerprint_of(SQL, &params![1, "foo", 3.14]);
    caches
        .remote
        .set(&fingerprint.query_key(), "unknown-execution")
        .await
        .unwrap();

    let second_service = MockQueryService::new();
    let results = caches
        .client(&second_service, fast_config())
        .execute(SQL, params![1, "foo", 3.14])
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert!(second_service.request_log().is_empty());
}

#[tokio::test]
async fn test_remote_hit_attaches_without_submitting() {
    let caches = Caches::new();
    let first_service = sample_service();
    let handle = caches
        .remote_client(&first_service, fast_config())
        .submit(SQL, params![1, "foo", 3.14])
        .await
        .unwrap();
    let execution_id = handle.execution_id().clone();

    let fingerprint = fingerprint_of(SQL, &params![1, "foo", 3.14]);
    assert_eq!(
        caches.remote.get(&fingerprint.query_key()).await.unwrap(),
        Some(execution_id.to_string())
    );

    // Another machine: its service knows the execution, but nothing is local.
    let second_service = MockQueryService::new();
    let raw = RawResultSet {
        columns: vec![ColumnMetadata::new("id", "integer")],
        rows: vec![vec![Some("id".into())], vec![Some("7".into())]],
    };
    second_service.insert_execution(execution_id.clone(), MockExecution::succeeded("SELECT ...", raw));

    let handle = caches
        .remote_client(&second_service, fast_config())
        .submit(SQL, params![1, "foo", 3.14])
        .await
        .unwrap();
    assert_eq!(handle.origin(), Origin::CachedRemote);
    assert_eq!(handle.execution_id(), &execution_id);

    let results = handle.get_results().await.unwrap();
    assert_eq!(results.get(0).unwrap(), &vec![Value::Int(7)]);
    assert_eq!(second_service.submissions(), 0);
}

#[tokio::test]
async fn test_remote_failed_execution_ignored_without_reuse() {
    let caches = Caches::new();
    let fingerprint = fingerprint_of("SELECT 1", &Params::None);
    caches
        .remote
        .set(&fingerprint.query_key(), "old-failure")
        .await
        .unwrap();

    let service = sample_service();
    service.insert_execution("old-failure", MockExecution::failed("SELECT 1", "Query exhausted resources"));

    let handle = caches
        .remote_client(&service, fast_config())
        .submit("SELECT 1", Params::None)
        .await
        .unwrap();

    assert_eq!(handle.origin(), Origin::Submitted);
    assert_eq!(service.count("GetQueryExecution"), 1);
    assert_eq!(service.submissions(), 1);
    // The new execution replaces the failed one.
    assert_eq!(
        caches.remote.get(&fingerprint.query_key()).await.unwrap(),
        Some(handle.execution_id().to_string())
    );
}

#[tokio::test]
async fn test_remote_failed_execution_reused_when_allowed() {
    let caches = Caches::new();
    let fingerprint = fingerprint_of("SELECT 1", &Params::None);
    caches
        .remote
        .set(&fingerprint.query_key(), "old-failure")
        .await
        .unwrap();

    let service = MockQueryService::new();
    service.insert_execution(
        "old-failure",
        MockExecution::failed("SELECT 1", "TABLE_NOT_FOUND: Table 'x' does not exist"),
    );

    let client = caches
        .client(&service, fast_config())
        .using(&ConfigOverrides::new().reuse_failed(true));
    let err = client.execute("SELECT 1", Params::None).await.unwrap_err();

    let failure = err.as_failure().unwrap();
    assert_eq!(failure.execution_id, ExecutionId::new("old-failure"));
    assert_eq!(failure.kind, FailureKind::TableNotFound);
    assert_eq!(service.submissions(), 0);

    // The failure is now cached locally too.
    let entry: LocalEntry = serde_json::from_str(
        &caches
            .local
            .get(&fingerprint.execution_key())
            .await
            .unwrap()
            .unwrap(),
    )
    .unwrap();
    assert_eq!(entry.state(), QueryState::Failed);
}

#[tokio::test]
async fn test_failed_query_resubmitted_without_reuse() {
    let caches = Caches::new();
    let service = MockQueryService::new().with_failure("SYNTAX_ERROR: line 1:8: mismatched input 'FORM'");
    let client = caches.local_client(&service, fast_config());

    for _ in 0..2 {
        let err = client.execute("SELECT * FORM t", Params::None).await.unwrap_err();
        assert_eq!(err.as_failure().unwrap().kind, FailureKind::Syntax);
    }
    assert_eq!(service.submissions(), 2);
    assert!(caches.local.keys().is_empty());
}

#[tokio::test]
async fn test_failed_query_served_from_cache_with_reuse() {
    let caches = Caches::new();
    let config = fast_config().with_overrides(&ConfigOverrides::new().reuse_failed(true));

    let first_service = MockQueryService::new().with_failure("SYNTAX_ERROR: line 1:8: mismatched input 'FORM'");
    let first_err = caches
        .local_client(&first_service, config.clone())
        .execute("SELECT * FORM t", Params::None)
        .await
        .unwrap_err();

    let second_service = MockQueryService::new();
    let handle = caches
        .local_client(&second_service, config)
        .submit("SELECT * FORM t", Params::None)
        .await
        .unwrap();
    assert_eq!(handle.origin(), Origin::CachedLocal);

    let second_err = handle.get_results().await.unwrap_err();
    assert_eq!(second_err.as_failure(), first_err.as_failure());
    assert!(second_service.request_log().is_empty());
}

#[tokio::test]
async fn test_cached_failure_ignored_once_reuse_disabled() {
    let caches = Caches::new();
    let failing = MockQueryService::new().with_failure("Query exhausted resources");
    let reuse = ConfigOverrides::new().reuse_failed(true);
    caches
        .local_client(&failing, fast_config())
        .execute_with("SELECT 1", Params::None, &reuse)
        .await
        .unwrap_err();

    let service = sample_service();
    let results = caches
        .local_client(&service, fast_config())
        .execute("SELECT 1", Params::None)
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(service.submissions(), 1);
}

#[tokio::test]
async fn test_non_select_statements_not_cached() {
    let caches = Caches::new();
    let service = MockQueryService::new();
    let client = caches.client(&service, fast_config());

    for _ in 0..2 {
        client
            .execute("CREATE TABLE t AS SELECT 1 x", Params::None)
            .await
            .unwrap();
    }

    assert_eq!(service.submissions(), 2);
    assert!(caches.local.keys().is_empty());
    assert!(caches.remote.keys().is_empty());
}

#[tokio::test]
async fn test_leading_comment_select_is_cached() {
    let caches = Caches::new();
    let service = sample_service();
    let client = caches.client(&service, fast_config());
    let sql = "-- daily report\nSELECT 1";

    client.execute(sql, Params::None).await.unwrap();
    client.execute(sql, Params::None).await.unwrap();

    assert_eq!(service.submissions(), 1);
}

#[tokio::test]
async fn test_cache_disabled_per_call() {
    let caches = Caches::new();
    let service = sample_service();
    let client = caches.client(&service, fast_config());
    let no_cache = ConfigOverrides::new().cache_enabled(false);

    client.execute_with("SELECT 1", Params::None, &no_cache).await.unwrap();
    client.execute_with("SELECT 1", Params::None, &no_cache).await.unwrap();

    assert_eq!(service.submissions(), 2);
    assert!(caches.local.keys().is_empty());
    assert!(caches.remote.keys().is_empty());
    assert!(client.config().cache.enabled);
}

#[tokio::test]
async fn test_cache_write_only() {
    let caches = Caches::new();
    let service = sample_service();
    let client = caches
        .client(&service, fast_config())
        .using(&ConfigOverrides::new().cache_read(false));

    client.execute("SELECT 1", Params::None).await.unwrap();
    client.execute("SELECT 1", Params::None).await.unwrap();

    assert_eq!(service.submissions(), 2);
    let fingerprint = fingerprint_of("SELECT 1", &Params::None);
    assert!(caches.local.has(&fingerprint.execution_key()).await.unwrap());
}

#[tokio::test]
async fn test_cache_read_only() {
    let caches = Caches::new();
    let service = sample_service();
    caches
        .client(&service, fast_config())
        .execute_with("SELECT 1", Params::None, &ConfigOverrides::new().cache_write(false))
        .await
        .unwrap();

    assert!(caches.local.keys().is_empty());
    assert!(caches.remote.keys().is_empty());
}

#[tokio::test]
async fn test_corrupt_local_record_is_a_miss() {
    let caches = Caches::new();
    let fingerprint = fingerprint_of("SELECT 1", &Params::None);
    caches
        .local
        .set(&fingerprint.execution_key(), "not json at all")
        .await
        .unwrap();

    let service = sample_service();
    let results = caches
        .local_client(&service, fast_config())
        .execute("SELECT 1", Params::None)
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(service.submissions(), 1);
    // Rewritten with a valid record.
    let text = caches.local.get(&fingerprint.execution_key()).await.unwrap().unwrap();
    assert!(serde_json::from_str::<LocalEntry>(&text).is_ok());
}

#[tokio::test]
async fn test_local_record_without_results_is_a_miss() {
    let caches = Caches::new();
    let fingerprint = fingerprint_of("SELECT 1", &Params::None);
    let entry = LocalEntry::new(QueryInfo::new(
        ExecutionId::new("lost"),
        "SELECT 1",
        QueryState::Succeeded,
    ));
    caches
        .local
        .set(&fingerprint.execution_key(), &serde_json::to_string(&entry).unwrap())
        .await
        .unwrap();

    let service = sample_service();
    let handle = caches
        .local_client(&service, fast_config())
        .submit("SELECT 1", Params::None)
        .await
        .unwrap();

    assert_eq!(handle.origin(), Origin::Submitted);
}

#[tokio::test]
async fn test_storage_failure_propagates() {
    let dir = TempDir::new().unwrap();
    // A regular file where the cache directory should be.
    let blocked = dir.path().join("cache");
    std::fs::write(&blocked, "").unwrap();

    let service = sample_service();
    let client = Client::with_storage(
        Arc::new(service.clone()),
        fast_config(),
        None,
        Some(Arc::new(FileStorage::new(&blocked)) as Arc<dyn Storage>),
    );

    let err = client.submit("SELECT 1", Params::None).await.unwrap_err();
    assert!(matches!(err, QuarryError::Storage { .. }));
}
