use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use batch_config::DatabaseConfig;
use batch_domain::RecordRepository;
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::info;

use super::postgres::PostgresRecordRepository;
use super::sqlite::SqliteRecordRepository;

/// 数据库类型检测
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseType {
    PostgreSQL,
    SQLite,
}

impl DatabaseType {
    pub fn from_url(url: &str) -> Self {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            DatabaseType::PostgreSQL
        } else {
            DatabaseType::SQLite
        }
    }
}

/// 数据库连接池
pub enum DatabasePool {
    PostgreSQL(sqlx::PgPool),
    SQLite(sqlx::SqlitePool),
}

impl DatabasePool {
    /// 根据配置创建连接池，自动识别数据库类型
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        match DatabaseType::from_url(&config.url) {
            DatabaseType::PostgreSQL => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .min_connections(config.min_connections)
                    .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
                    .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
                    .connect(&config.url)
                    .await
                    .with_context(|| format!("连接PostgreSQL失败: {}", config.url))?;
                Ok(DatabasePool::PostgreSQL(pool))
            }
            DatabaseType::SQLite => {
                let options = SqliteConnectOptions::from_str(&config.url)
                    .with_context(|| format!("无效的SQLite连接串: {}", config.url))?
                    .create_if_missing(true)
                    .busy_timeout(Duration::from_secs(5));

                // Every connection to `sqlite::memory:` opens its own empty
                // database, so an in-memory pool must stay at one connection
                // that is never recycled.
                let connected = if is_sqlite_memory(&config.url) {
                    SqlitePoolOptions::new()
                        .max_connections(1)
                        .min_connections(1)
                        .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
                        .idle_timeout(None)
                        .max_lifetime(None)
                        .connect_with(options)
                        .await
                } else {
                    SqlitePoolOptions::new()
                        .max_connections(config.max_connections)
                        .min_connections(config.min_connections)
                        .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
                        .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
                        .connect_with(options)
                        .await
                };
                let pool =
                    connected.with_context(|| format!("连接SQLite失败: {}", config.url))?;
                Ok(DatabasePool::SQLite(pool))
            }
        }
    }

    pub fn database_type(&self) -> DatabaseType {
        match self {
            DatabasePool::PostgreSQL(_) => DatabaseType::PostgreSQL,
            DatabasePool::SQLite(_) => DatabaseType::SQLite,
        }
    }

    pub async fn health_check(&self) -> Result<()> {
        match self {
            DatabasePool::PostgreSQL(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
            DatabasePool::SQLite(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
        }
        Ok(())
    }

    pub async fn close(&self) {
        match self {
            DatabasePool::PostgreSQL(pool) => pool.close().await,
            DatabasePool::SQLite(pool) => pool.close().await,
        }
    }
}

fn is_sqlite_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// 统一的数据库管理器
pub struct DatabaseManager {
    pool: DatabasePool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = DatabasePool::new(config).await?;
        info!(
            database_type = ?pool.database_type(),
            max_connections = config.max_connections,
            "数据库连接池已创建"
        );
        Ok(Self { pool })
    }

    /// 仅凭 URL 创建管理器，供测试和工具使用
    pub async fn from_url(url: &str, max_connections: u32) -> Result<Self> {
        let config = DatabaseConfig {
            url: url.to_string(),
            max_connections,
            min_connections: max_connections.min(1),
            ..DatabaseConfig::default()
        };
        Self::new(&config).await
    }

    pub fn database_type(&self) -> DatabaseType {
        self.pool.database_type()
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        self.pool.health_check().await
    }

    pub async fn close(&self) {
        self.pool.close().await
    }

    /// 创建记录仓储的工厂方法
    pub fn record_repository(&self) -> Arc<dyn RecordRepository> {
        match &self.pool {
            DatabasePool::PostgreSQL(pool) => {
                Arc::new(PostgresRecordRepository::new(pool.clone()))
            }
            DatabasePool::SQLite(pool) => Arc::new(SqliteRecordRepository::new(pool.clone())),
        }
    }
}
