pub mod database;
pub mod error_handling;
pub mod in_memory_repository;

use std::sync::Arc;

use anyhow::Result;
use batch_config::DatabaseConfig;
use batch_domain::RecordRepository;

pub use database::*;
pub use error_handling::{
    is_transient_code, RecordOperationContext, RepositoryErrorHelpers, RepositoryOperation,
};
pub use in_memory_repository::InMemoryRecordRepository;

/// 根据配置创建记录仓储；`memory` 使用进程内实现
///
/// 使用数据库后端时，调用方须持有返回的管理器并负责关闭。
pub async fn create_record_repository(
    config: &DatabaseConfig,
) -> Result<(Arc<dyn RecordRepository>, Option<DatabaseManager>)> {
    if config.is_memory() {
        return Ok((Arc::new(InMemoryRecordRepository::new()), None));
    }

    let manager = DatabaseManager::new(config).await?;
    manager.health_check().await?;
    Ok((manager.record_repository(), Some(manager)))
}
