//! End-to-end tests of the client facade.

use pretty_assertions::assert_eq;
use quarry::service::MockQueryService;
use quarry::{params, ConfigOverrides, Params, QuarryError, Value};

use super::common::{fast_config, sample_service, uncached_client, Caches};

#[tokio::test]
async fn test_execute_binds_and_decodes() {
    let service = sample_service();
    let client = uncached_client(&service, fast_config());

    let handle = client
        .submit("SELECT %s id, %s name, %s value", params![1, "foo", 3.14])
        .await
        .unwrap();
    let results = handle.get_results().await.unwrap();

    assert_eq!(
        service.submitted_sql(handle.execution_id()).as_deref(),
        Some("SELECT 1 id, 'foo' name, 3.14 value")
    );
    assert_eq!(results.column_names(), vec!["id", "name", "value"]);
    assert_eq!(results.len(), 1);
    assert_eq!(
        results.get(0).unwrap(),
        &vec![Value::Int(1), Value::String("foo".into()), Value::Float(3.14)]
    );
    assert_eq!(results.value(0, "name").and_then(Value::as_str), Some("foo"));
}

#[tokio::test]
async fn test_single_positional_parameter() {
    let service = MockQueryService::new().with_rows(&[("_col0", "integer")], &[&[Some("5")]]);
    let client = uncached_client(&service, fast_config());

    let handle = client.submit("SELECT %s", params![5]).await.unwrap();

    assert_eq!(service.submitted_sql(handle.execution_id()).as_deref(), Some("SELECT 5"));
    assert_eq!(handle.get_results().await.unwrap().value(0, "_col0"), Some(&Value::Int(5)));
}

#[tokio::test]
async fn test_named_parameters() {
    let service = sample_service();
    let client = uncached_client(&service, fast_config());

    let params = Params::named([("day", "2024-01-31"), ("name", "it's")]);
    let handle = client
        .submit("SELECT * FROM t WHERE day = %(day)s AND name = %(name)s", params)
        .await
        .unwrap();

    assert_eq!(
        service.submitted_sql(handle.execution_id()).as_deref(),
        Some("SELECT * FROM t WHERE day = '2024-01-31' AND name = 'it''s'")
    );
}

#[tokio::test]
async fn test_percent_passthrough_without_parameters() {
    let service = sample_service();
    let client = uncached_client(&service, fast_config());
    let sql = "SELECT * FROM t WHERE name LIKE 'A%'";

    let handle = client.submit(sql, Params::None).await.unwrap();

    assert_eq!(service.submitted_sql(handle.execution_id()).as_deref(), Some(sql));
}

#[tokio::test]
async fn test_parameter_error_before_any_request() {
    let caches = Caches::new();
    let service = sample_service();
    let client = caches.client(&service, fast_config());

    let err = client.execute("SELECT %s, %s", params![1]).await.unwrap_err();

    assert!(matches!(err, QuarryError::Parameter(_)));
    assert!(service.request_log().is_empty());
    assert!(caches.local.keys().is_empty());
    assert!(caches.remote.keys().is_empty());
}

#[tokio::test]
async fn test_normalization() {
    let service = sample_service();
    let client = uncached_client(&service, fast_config());
    let sql = "\n        SELECT id\n        FROM t\n    ";

    let normalized = client.submit(sql, Params::None).await.unwrap();
    let raw = client
        .submit_with(sql, Params::None, &ConfigOverrides::new().normalize(false))
        .await
        .unwrap();

    assert_eq!(
        service.submitted_sql(normalized.execution_id()).as_deref(),
        Some("SELECT id\nFROM t")
    );
    assert_eq!(service.submitted_sql(raw.execution_id()).as_deref(), Some(sql));
    assert_ne!(normalized.fingerprint(), raw.fingerprint());
}

#[tokio::test]
async fn test_indentation_does_not_change_cache_key() {
    let caches = Caches::new();
    let service = sample_service();
    let client = caches.client(&service, fast_config());

    client.execute("SELECT id\nFROM t", Params::None).await.unwrap();
    let handle = client.submit("    SELECT id\n    FROM t\n", Params::None).await.unwrap();

    assert_eq!(handle.origin(), quarry::Origin::CachedLocal);
    assert_eq!(service.submissions(), 1);
}

#[tokio::test]
async fn test_database_override() {
    let caches = Caches::new();
    let service = sample_service();
    let client = caches.client(&service, fast_config());

    let default_db = client.submit("SELECT 1", Params::None).await.unwrap();
    let other_db = client
        .submit_with("SELECT 1", Params::None, &ConfigOverrides::new().database("analytics"))
        .await
        .unwrap();

    // Same SQL against another database is a different query.
    assert_eq!(service.submissions(), 2);
    assert_ne!(default_db.fingerprint(), other_db.fingerprint());
    assert_eq!(
        other_db.get_info().await.unwrap().database.as_deref(),
        Some("analytics")
    );
    assert_eq!(default_db.get_info().await.unwrap().database, None);
    assert_eq!(client.config().query.database, None);
}

#[tokio::test]
async fn test_float_spellings_decode_alike() {
    let service = MockQueryService::new().with_rows(
        &[("a", "real"), ("b", "float"), ("c", "double")],
        &[&[Some("1.5"), Some("1.5"), Some("1.5")]],
    );
    let client = uncached_client(&service, fast_config());

    let results = client.execute("SELECT 1.5 a, 1.5 b, 1.5 c", Params::None).await.unwrap();

    assert_eq!(results.columns()[0].native_type, results.columns()[1].native_type);
    assert_eq!(results.get(0).unwrap(), &vec![Value::Float(1.5); 3]);
}

#[tokio::test]
async fn test_nulls_and_types() {
    let service = MockQueryService::new().with_rows(
        &[
            ("flag", "boolean"),
            ("amount", "decimal(10,2)"),
            ("day", "date"),
            ("tags", "array(varchar)"),
            ("missing", "varchar"),
        ],
        &[&[Some("true"), Some("12.50"), Some("2024-01-31"), Some("[a, b]"), None]],
    );
    let client = uncached_client(&service, fast_config());

    let results = client.execute("SELECT ...", Params::None).await.unwrap();
    let row = results.get(0).unwrap();

    assert_eq!(row[0], Value::Bool(true));
    assert_eq!(row[1], Value::Decimal("12.50".into()));
    assert_eq!(row[2].to_display_string(), "2024-01-31");
    assert_eq!(row[3], Value::Array(vec!["a".into(), "b".into()]));
    assert!(row[4].is_null());
}

#[tokio::test]
async fn test_unmapped_column_type() {
    let service = MockQueryService::new().with_rows(
        &[("span", "interval day to second")],
        &[&[Some("2 00:00:00.000")]],
    );
    let client = uncached_client(&service, fast_config());

    let err = client.execute("SELECT ...", Params::None).await.unwrap_err();

    assert!(matches!(err, QuarryError::TypeMapping { ref column_type } if column_type == "interval day to second"));
}

#[tokio::test]
async fn test_undecodable_value() {
    let service = MockQueryService::new().with_rows(&[("n", "integer")], &[&[Some("twelve")]]);
    let client = uncached_client(&service, fast_config());

    let err = client.execute("SELECT ...", Params::None).await.unwrap_err();

    assert!(matches!(err, QuarryError::ResultDecoding { row: 0, column: 0, .. }));
}

#[tokio::test]
async fn test_using_leaves_original_client_unchanged() {
    let service = sample_service();
    let client = uncached_client(&service, fast_config());

    let derived = client.using(&ConfigOverrides::new().workgroup("etl").reuse_failed(true));

    assert_eq!(derived.config().query.workgroup.as_deref(), Some("etl"));
    assert!(derived.config().cache.reuse_failed);
    assert_eq!(client.config().query.workgroup, None);
    assert!(!client.config().cache.reuse_failed);
}
