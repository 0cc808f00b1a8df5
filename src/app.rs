use std::sync::Arc;

use anyhow::{Context, Result};
use batch_config::AppConfig;
use batch_domain::{ItemSource, ProcessingOutcome, RecordRepository, RunSummary, SyntheticOrderSource};
use batch_infrastructure::{create_record_repository, DatabaseManager};
use batch_worker::{BatchRunner, OrderItemProcessor};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// 主应用程序：持有配置与存储连接，负责组装批处理运行器
pub struct Application {
    config: AppConfig,
    repository: Arc<dyn RecordRepository>,
    database: Option<DatabaseManager>,
}

impl Application {
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!(database_url = %config.database.url, "初始化应用程序");

        let (repository, database) = create_record_repository(&config.database)
            .await
            .context("创建记录仓储失败")?;

        Ok(Self {
            config,
            repository,
            database,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn repository(&self) -> Arc<dyn RecordRepository> {
        Arc::clone(&self.repository)
    }

    /// 按配置构建运行器；每次运行使用新的准入池
    pub fn runner(&self, cancel: CancellationToken) -> Result<BatchRunner> {
        let processor = Arc::new(OrderItemProcessor::new(self.repository()));
        let runner = BatchRunner::builder(processor)
            .with_config(&self.config.worker, &self.config.retry)
            .cancellation_token(cancel)
            .build()?;
        Ok(runner)
    }

    /// 处理内置的模拟订单来源
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunSummary> {
        let source = SyntheticOrderSource::new(self.config.worker.source_count);
        let (summary, _) = self.run_source(&source, cancel).await?;
        Ok(summary)
    }

    pub async fn run_source(
        &self,
        source: &dyn ItemSource,
        cancel: CancellationToken,
    ) -> Result<(RunSummary, Vec<ProcessingOutcome>)> {
        let runner = self.runner(cancel)?;
        let result = runner
            .run_collect(source)
            .await
            .context("批处理运行失败")?;
        Ok(result)
    }

    /// 关闭数据库连接池
    pub async fn shutdown(self) {
        if let Some(database) = self.database {
            database.close().await;
            info!("数据库连接已关闭");
        }
    }
}
