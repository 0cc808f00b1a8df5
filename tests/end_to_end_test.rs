use batch_config::AppConfig;
use batch_domain::{NaturalKey, OutcomeKind, RecordRepository, VecItemSource};
use batch_processor::{Application, ShutdownManager};
use sqlx::sqlite::SqlitePoolOptions;
use tempfile::TempDir;

fn memory_config(count: usize) -> AppConfig {
    let mut config = AppConfig::default();
    config.database.url = "sqlite::memory:".to_string();
    config.worker.source_count = count;
    config
}

#[tokio::test]
async fn test_reference_batch_of_2000_orders() {
    let app = Application::new(memory_config(2000)).await.unwrap();
    let shutdown = ShutdownManager::new();

    let summary = app.run(shutdown.subscribe()).await.unwrap();

    assert_eq!(summary.total_items, 2000);
    assert_eq!(summary.dispatched, 2000);
    assert_eq!(summary.succeeded, 2000);
    assert_eq!(summary.skipped_invalid, 0);
    assert_eq!(summary.failed, 0);
    assert!(summary.peak_concurrency <= 20);
    assert!(summary.is_clean());
    assert_eq!(app.repository().count().await.unwrap(), 2000);

    app.shutdown().await;
}

#[tokio::test]
async fn test_malformed_payload_leaves_no_row() {
    let app = Application::new(memory_config(0)).await.unwrap();
    let source = VecItemSource::new(["not json"]);

    let (summary, outcomes) = app
        .run_source(&source, ShutdownManager::new().subscribe())
        .await
        .unwrap();

    assert_eq!(summary.skipped_invalid, 1);
    assert_eq!(outcomes[0].kind, OutcomeKind::SkippedInvalid);
    assert_eq!(outcomes[0].attempts, 1);
    assert_eq!(app.repository().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_same_order_twice_stored_once() {
    let app = Application::new(memory_config(0)).await.unwrap();
    let source = VecItemSource::new([r#"{"orderId": 77}"#, r#"{"orderId": 77}"#]);

    let (summary, _) = app
        .run_source(&source, ShutdownManager::new().subscribe())
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 2);
    let repository = app.repository();
    assert_eq!(repository.count().await.unwrap(), 1);
    assert_eq!(
        repository
            .count_by_key(&NaturalKey::from(77))
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_rerun_against_file_database_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}", dir.path().join("batch.db").display());

    let mut config = AppConfig::default();
    config.database.url = url.clone();
    config.worker.source_count = 300;

    for _ in 0..2 {
        let app = Application::new(config.clone()).await.unwrap();
        let summary = app.run(ShutdownManager::new().subscribe()).await.unwrap();
        assert_eq!(summary.succeeded, 300);
        app.shutdown().await;
    }

    let pool = SqlitePoolOptions::new().connect(&url).await.unwrap();
    let (rows, distinct): (i64, i64) =
        sqlx::query_as("SELECT COUNT(*), COUNT(DISTINCT natural_key) FROM processed_records")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(rows, 300);
    assert_eq!(distinct, 300);
    pool.close().await;
}

#[tokio::test]
async fn test_shutdown_before_run_dispatches_nothing() {
    let app = Application::new(memory_config(50)).await.unwrap();
    let shutdown = ShutdownManager::new();
    shutdown.shutdown().await;

    let summary = app.run(shutdown.subscribe()).await.unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.dispatched, 0);
    assert_eq!(summary.not_dispatched, 50);
    assert_eq!(app.repository().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_memory_backend_from_config() {
    let mut config = AppConfig::default();
    config.database.url = "memory".to_string();
    config.worker.source_count = 25;
    config.worker.max_concurrency = 5;

    let app = Application::new(config).await.unwrap();
    let summary = app.run(ShutdownManager::new().subscribe()).await.unwrap();

    assert_eq!(summary.succeeded, 25);
    assert!(summary.peak_concurrency <= 5);
    assert_eq!(app.repository().count().await.unwrap(), 25);
}
