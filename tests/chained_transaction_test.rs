//! Integration tests for chained transactions against SQLite.
//!
//! Tests verify that:
//! - Later statements see earlier results through `#name#` placeholders
//! - Unknown placeholders become NULL
//! - A failing statement rolls back the whole batch and frees its connection
//! - Built INSERT/UPDATE statements run through the gateway
//! - Pool exhaustion surfaces as an error instead of hanging

use chainsql::db::{ConnectionPool, QueryGateway};
use chainsql::models::{QueryOutput, SqlValue, Statement};
use chainsql::sql::{Fields, build_insert, build_update};
use chainsql::{DbConfig, DbError};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

/// Create a SQLite database file with a `users` table and return its config.
async fn setup_db() -> DbConfig {
    let temp_file = NamedTempFile::new().unwrap();
    // Keep the temp file alive - prevent deletion when function returns
    let db_path = temp_file
        .into_temp_path()
        .keep()
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let config = DbConfig::sqlite(db_path).with_max_connections(4);

    let gateway = QueryGateway::new(config.clone());
    gateway
        .query("CREATE TABLE users (id INTEGER PRIMARY KEY, first_name TEXT, last_name TEXT, age INTEGER)")
        .await
        .unwrap();
    gateway.close().await;

    config
}

async fn seed_users(gateway: &QueryGateway, count: i64) {
    let statements: Vec<Statement> = (1..=count)
        .map(|i| {
            Statement::new(
                "INSERT INTO users (id, first_name, last_name) VALUES ($1, $2, $3)",
                vec![
                    SqlValue::Int(i),
                    SqlValue::from(format!("first{}", i)),
                    SqlValue::from(format!("last{}", i)),
                ],
            )
        })
        .collect();
    gateway.transaction(statements).await.unwrap();
}

/// Wait until every connection has been handed back to the pool.
async fn wait_for_idle(pool: &ConnectionPool) {
    for _ in 0..50 {
        if pool.status().in_use() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("connections still checked out: {:?}", pool.status());
}

async fn count_users(gateway: &QueryGateway) -> i64 {
    let result = gateway.query("SELECT COUNT(*) AS n FROM users").await.unwrap();
    result.get("n").and_then(|v| v.as_i64()).unwrap()
}

#[tokio::test]
async fn test_placeholder_uses_earlier_result() {
    let gateway = QueryGateway::new(setup_db().await);

    let results = gateway
        .transaction([
            "INSERT INTO users (id, first_name) VALUES (3, 'ada') RETURNING id",
            "SELECT * FROM users WHERE id = #id#",
        ])
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].get("id"), Some(&json!(3)));
    assert_eq!(results[1].row_count(), 1);
    assert_eq!(results[1].get("id"), Some(&json!(3)));
    assert_eq!(results[1].get("first_name"), Some(&json!("ada")));
}

#[tokio::test]
async fn test_placeholder_lookup_is_case_insensitive() {
    let gateway = QueryGateway::new(setup_db().await);

    let results = gateway
        .transaction([
            "INSERT INTO users (id, first_name) VALUES (7, 'grace') RETURNING first_name",
            "SELECT id FROM users WHERE first_name = #FIRST_NAME#",
        ])
        .await
        .unwrap();

    assert_eq!(results[1].get("id"), Some(&json!(7)));
}

#[tokio::test]
async fn test_text_placeholder_is_quoted() {
    let gateway = QueryGateway::new(setup_db().await);

    let results = gateway
        .transaction([
            "INSERT INTO users (id, first_name) VALUES (1, 'O''Brien') RETURNING first_name",
            "INSERT INTO users (id, first_name) VALUES (2, #first_name#) RETURNING first_name",
        ])
        .await
        .unwrap();

    assert_eq!(results[1].get("first_name"), Some(&json!("O'Brien")));
}

#[tokio::test]
async fn test_missing_placeholder_resolves_to_null() {
    let gateway = QueryGateway::new(setup_db().await);

    let results = gateway
        .transaction([
            "INSERT INTO users (id, first_name) VALUES (1, 'office1') RETURNING *",
            "UPDATE users SET first_name = 'wont_set' WHERE first_name = #no_exist# RETURNING *",
            "SELECT #no_exist# AS v",
        ])
        .await
        .unwrap();

    assert_eq!(results[1].row_count(), 0);
    assert_eq!(results[2].get("v"), Some(&json!(null)));
}

#[tokio::test]
async fn test_unbound_step_may_hold_several_statements() {
    let gateway = QueryGateway::new(setup_db().await);

    let results = gateway
        .transaction([
            "INSERT INTO users (id, first_name) VALUES (1, 'ada'); \
             INSERT INTO users (id, first_name) VALUES (2, 'grace')",
            "SELECT MAX(id) AS id FROM users",
            "SELECT first_name FROM users WHERE id = #id#",
        ])
        .await
        .unwrap();

    assert_eq!(results[0].rows_affected, 2);
    assert_eq!(results[2].get("first_name"), Some(&json!("grace")));
    assert_eq!(count_users(&gateway).await, 2);
}

#[tokio::test]
async fn test_single_statement_is_not_resolved() {
    let gateway = QueryGateway::new(setup_db().await);

    let result = gateway.query("SELECT '#id#' AS raw").await.unwrap();
    assert_eq!(result.get("raw"), Some(&json!("#id#")));
}

#[tokio::test]
async fn test_failed_statement_rolls_back_everything() {
    let config = setup_db().await;
    let pool = ConnectionPool::new(&config).unwrap();
    let gateway = QueryGateway::with_pool(pool.clone());

    let err = gateway
        .transaction([
            "INSERT INTO users (id, first_name) VALUES (1, 'a')",
            "INSERT INTO users (id, first_name) VALUES (2, 'b')",
            "INSERT INTO no_such_table VALUES (1)",
            "INSERT INTO users (id, first_name) VALUES (3, 'c')",
        ])
        .await
        .unwrap_err();

    match &err {
        DbError::Statement { index, .. } => assert_eq!(*index, Some(2)),
        other => panic!("expected statement error, got {:?}", other),
    }
    assert_eq!(err.statement_index(), Some(2));
    assert!(err.to_string().contains("no_such_table"));

    wait_for_idle(&pool).await;
    assert_eq!(count_users(&gateway).await, 0);
}

#[tokio::test]
async fn test_connection_reusable_after_rollback() {
    let config = setup_db().await.with_max_connections(1);
    let pool = ConnectionPool::new(&config).unwrap();
    let gateway = QueryGateway::with_pool(pool.clone());

    for _ in 0..3 {
        let result = gateway
            .transaction(["INSERT INTO users (id) VALUES (1)", "SELECT * FROM nope"])
            .await;
        assert!(matches!(result, Err(DbError::Statement { .. })));
    }

    // The single connection is back and has no open transaction
    gateway
        .transaction(["INSERT INTO users (id) VALUES (1)"])
        .await
        .unwrap();
    assert_eq!(count_users(&gateway).await, 1);
    wait_for_idle(&pool).await;
}

#[tokio::test]
async fn test_empty_batch_returns_no_results() {
    let gateway = QueryGateway::new(setup_db().await);

    let output = gateway.execute(Vec::<Statement>::new()).await.unwrap();
    assert_eq!(output, QueryOutput::Batch(Vec::new()));
}

#[tokio::test]
async fn test_execute_routes_by_input_shape() {
    let gateway = QueryGateway::new(setup_db().await);

    let single = gateway.execute("SELECT (1+1) AS sum").await.unwrap();
    assert_eq!(
        single.into_single().and_then(|r| r.get("sum").cloned()),
        Some(json!(2))
    );

    let batch = gateway
        .execute(vec!["SELECT 1 AS a", "SELECT #a# + 1 AS b"])
        .await
        .unwrap()
        .into_batch();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[1].get("b"), Some(&json!(2)));
}

#[tokio::test]
async fn test_pool_exhaustion_times_out() {
    let config = setup_db().await.with_max_connections(1).with_acquire_timeout(1);
    let pool = ConnectionPool::new(&config).unwrap();
    let gateway = QueryGateway::with_pool(pool.clone());

    let held = pool.acquire().await.unwrap();
    let err = gateway.query("SELECT 1").await.unwrap_err();
    assert!(matches!(err, DbError::PoolExhausted { timeout_secs: 1 }));

    pool.release(held);
    gateway.query("SELECT 1").await.unwrap();
}

#[tokio::test]
async fn test_concurrent_single_statements() {
    let config = setup_db().await;
    let gateway = Arc::new(QueryGateway::new(config));
    seed_users(&gateway, 8).await;

    let handles: Vec<_> = (1..=8)
        .map(|i| {
            let gateway = gateway.clone();
            tokio::spawn(async move {
                gateway
                    .query(
                        Statement::raw("SELECT first_name FROM users WHERE id = $1")
                            .with_value(i as i64),
                    )
                    .await
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.get("first_name"), Some(&json!(format!("first{}", i + 1))));
    }
}

#[tokio::test]
async fn test_built_update_changes_only_matching_row() {
    let gateway = QueryGateway::new(setup_db().await);
    seed_users(&gateway, 6).await;

    let stmt = build_update(
        "users",
        Fields::new().field("firstName", "a").field("lastName", "b"),
        Some(("id", SqlValue::Int(5))),
    )
    .unwrap();
    assert_eq!(
        stmt.text,
        "UPDATE users SET first_name = $1, last_name = $2 WHERE id = $3"
    );

    let result = gateway.query(stmt).await.unwrap();
    assert_eq!(result.rows_affected, 1);

    let rows = gateway
        .query("SELECT id, first_name, last_name FROM users ORDER BY id")
        .await
        .unwrap()
        .rows;
    for row in rows {
        let id = row["id"].as_i64().unwrap();
        if id == 5 {
            assert_eq!(row["first_name"], json!("a"));
            assert_eq!(row["last_name"], json!("b"));
        } else {
            assert_eq!(row["first_name"], json!(format!("first{}", id)));
            assert_eq!(row["last_name"], json!(format!("last{}", id)));
        }
    }
}

#[tokio::test]
async fn test_built_insert_skips_undefined_fields() {
    let gateway = QueryGateway::new(setup_db().await);

    let stmt = build_insert(
        "users",
        Fields::new()
            .field("firstName", "ada")
            .maybe("lastName", None::<String>)
            .field("age", SqlValue::Null),
    )
    .unwrap();
    assert_eq!(stmt.values.len(), 2);

    gateway.query(stmt).await.unwrap();
    let result = gateway
        .query("SELECT first_name, last_name, age FROM users")
        .await
        .unwrap();
    assert_eq!(result.get("first_name"), Some(&json!("ada")));
    assert_eq!(result.get("last_name"), Some(&json!(null)));
    assert_eq!(result.get("age"), Some(&json!(null)));
}

#[tokio::test]
async fn test_mixed_chain_with_built_statement() {
    let gateway = QueryGateway::new(setup_db().await);

    let results = gateway
        .transaction(vec![
            Statement::raw("CREATE TABLE accounts (name TEXT, _meta INT)"),
            Statement::raw("INSERT INTO accounts (name) VALUES ('baz')"),
            Statement::raw("INSERT INTO accounts (name, _meta) VALUES ('foo', 3) RETURNING *"),
            Statement::raw("UPDATE accounts SET name = 'bar' WHERE name = #name#"),
            build_update(
                "accounts",
                [("_meta", Some(SqlValue::Int(36)))],
                Some(("_meta", SqlValue::Int(3))),
            )
            .unwrap(),
            Statement::raw("SELECT * FROM accounts WHERE name = 'bar'"),
        ])
        .await
        .unwrap();

    let last = &results[5];
    assert_eq!(last.row_count(), 1);
    assert_eq!(last.get("name"), Some(&json!("bar")));
    assert_eq!(last.get("_meta"), Some(&json!(36)));
}

#[tokio::test]
async fn test_lazy_init_reports_configuration_error() {
    let gateway = QueryGateway::new(DbConfig {
        user: Some("app".to_string()),
        ..Default::default()
    });

    let err = gateway.query("SELECT 1").await.unwrap_err();
    assert!(matches!(err, DbError::Configuration { .. }));
    assert!(err.to_string().starts_with("Database improperly configured"));
}
