//! 领域仓储抽象
//!
//! 定义数据访问的抽象接口，遵循依赖倒置原则

use async_trait::async_trait;
use batch_errors::BatchResult;

use crate::entities::PersistedRecord;
use crate::value_objects::NaturalKey;

/// 处理结果记录仓储
///
/// 实现必须以 `BatchError::DuplicateKey` 拒绝同一业务键的第二条记录，
/// 并将瞬时存储错误报告为 `BatchError::TransientResource`。
#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// 按需创建数据表，可重复调用
    async fn ensure_schema(&self) -> BatchResult<()>;
    async fn exists(&self, key: &NaturalKey) -> BatchResult<bool>;
    /// 返回新记录的标识
    async fn insert(&self, key: Option<&NaturalKey>, payload: &str) -> BatchResult<i64>;
    async fn find_by_key(&self, key: &NaturalKey) -> BatchResult<Option<PersistedRecord>>;
    async fn count_by_key(&self, key: &NaturalKey) -> BatchResult<u64>;
    async fn count(&self) -> BatchResult<u64>;
}
