use std::sync::Arc;

use batch_domain::{NaturalKey, RecordRepository};
use batch_errors::BatchError;
use batch_infrastructure::{DatabaseManager, DatabaseType};

async fn setup() -> (DatabaseManager, Arc<dyn RecordRepository>) {
    let manager = DatabaseManager::from_url("sqlite::memory:", 4)
        .await
        .expect("Failed to open in-memory sqlite");
    assert_eq!(manager.database_type(), DatabaseType::SQLite);
    let repo = manager.record_repository();
    repo.ensure_schema().await.expect("Failed to create schema");
    (manager, repo)
}

#[tokio::test]
async fn test_ensure_schema_is_idempotent() {
    let (manager, repo) = setup().await;

    repo.ensure_schema().await.unwrap();
    repo.ensure_schema().await.unwrap();
    assert_eq!(repo.count().await.unwrap(), 0);

    manager.close().await;
}

#[tokio::test]
async fn test_insert_and_read_back() {
    let (manager, repo) = setup().await;
    let key = NaturalKey::from(42);

    assert!(!repo.exists(&key).await.unwrap());
    let id = repo.insert(Some(&key), r#"{"orderId":42}"#).await.unwrap();
    assert!(id > 0);
    assert!(repo.exists(&key).await.unwrap());

    let record = repo.find_by_key(&key).await.unwrap().expect("record missing");
    assert_eq!(record.id, id);
    assert_eq!(record.natural_key, Some(key.clone()));
    assert_eq!(record.payload, r#"{"orderId":42}"#);
    assert_eq!(repo.count_by_key(&key).await.unwrap(), 1);

    manager.close().await;
}

#[tokio::test]
async fn test_duplicate_key_is_rejected_by_constraint() {
    let (manager, repo) = setup().await;
    let key = NaturalKey::from(5);

    repo.insert(Some(&key), r#"{"orderId":5}"#).await.unwrap();
    let err = repo
        .insert(Some(&key), r#"{"orderId":5}"#)
        .await
        .expect_err("second insert must conflict");

    match err {
        BatchError::DuplicateKey { key } => assert_eq!(key, "5"),
        other => panic!("Expected DuplicateKey, got {other:?}"),
    }
    assert_eq!(repo.count_by_key(&key).await.unwrap(), 1);
    assert_eq!(repo.count().await.unwrap(), 1);

    manager.close().await;
}

#[tokio::test]
async fn test_keyless_records_are_plain_inserts() {
    let (manager, repo) = setup().await;

    let first = repo.insert(None, r#"{"note":"a"}"#).await.unwrap();
    let second = repo.insert(None, r#"{"note":"a"}"#).await.unwrap();

    assert_ne!(first, second);
    assert_eq!(repo.count().await.unwrap(), 2);

    manager.close().await;
}

#[tokio::test]
async fn test_concurrent_inserts_for_same_key_keep_one_row() {
    let (manager, repo) = setup().await;
    let key = NaturalKey::from(77);

    let attempts = (0..10).map(|_| {
        let repo = Arc::clone(&repo);
        let key = key.clone();
        async move { repo.insert(Some(&key), r#"{"orderId":77}"#).await }
    });
    let results = futures::future::join_all(attempts).await;

    let inserted = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(BatchError::DuplicateKey { .. })))
        .count();
    assert_eq!(inserted, 1);
    assert_eq!(conflicts, 9);
    assert_eq!(repo.count_by_key(&key).await.unwrap(), 1);

    manager.close().await;
}

#[tokio::test]
async fn test_operations_before_schema_fail_as_storage_errors() {
    let manager = DatabaseManager::from_url("sqlite::memory:", 1).await.unwrap();
    let repo = manager.record_repository();

    let err = repo.count().await.expect_err("table does not exist yet");
    assert!(matches!(err, BatchError::Storage(_)));
    assert!(!err.is_transient());

    manager.close().await;
}
