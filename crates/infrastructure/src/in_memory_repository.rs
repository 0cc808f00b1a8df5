use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use batch_domain::{NaturalKey, PersistedRecord, RecordRepository};
use batch_errors::{BatchError, BatchResult};
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

/// 内存记录仓储
///
/// 与数据库实现遵循相同的契约：业务键唯一，重复插入返回 `DuplicateKey`；
/// 在 `ensure_schema` 之前的任何读写都会失败，行为与缺表的数据库一致。
#[derive(Debug, Default)]
pub struct InMemoryRecordRepository {
    state: RwLock<InMemoryState>,
    schema_init_calls: AtomicU32,
}

#[derive(Debug, Default)]
struct InMemoryState {
    schema_ready: bool,
    next_id: i64,
    records: Vec<PersistedRecord>,
    by_key: HashMap<NaturalKey, usize>,
}

impl InMemoryState {
    fn require_schema(&self) -> BatchResult<()> {
        if self.schema_ready {
            Ok(())
        } else {
            Err(BatchError::storage("processed_records 表不存在"))
        }
    }
}

impl InMemoryRecordRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// `ensure_schema` 的调用次数
    pub fn schema_init_calls(&self) -> u32 {
        self.schema_init_calls.load(Ordering::SeqCst)
    }

    pub async fn records(&self) -> Vec<PersistedRecord> {
        self.state.read().await.records.clone()
    }
}

#[async_trait]
impl RecordRepository for InMemoryRecordRepository {
    async fn ensure_schema(&self) -> BatchResult<()> {
        self.schema_init_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.write().await;
        state.schema_ready = true;
        Ok(())
    }

    async fn exists(&self, key: &NaturalKey) -> BatchResult<bool> {
        let state = self.state.read().await;
        state.require_schema()?;
        Ok(state.by_key.contains_key(key))
    }

    async fn insert(&self, key: Option<&NaturalKey>, payload: &str) -> BatchResult<i64> {
        let mut state = self.state.write().await;
        state.require_schema()?;

        if let Some(key) = key {
            if state.by_key.contains_key(key) {
                return Err(BatchError::duplicate_key(key.to_string()));
            }
        }

        state.next_id += 1;
        let id = state.next_id;
        let index = state.records.len();
        state.records.push(PersistedRecord {
            id,
            natural_key: key.cloned(),
            payload: payload.to_string(),
            created_at: Utc::now(),
        });
        if let Some(key) = key {
            state.by_key.insert(key.clone(), index);
        }

        debug!(id, natural_key = ?key, "插入内存记录成功");
        Ok(id)
    }

    async fn find_by_key(&self, key: &NaturalKey) -> BatchResult<Option<PersistedRecord>> {
        let state = self.state.read().await;
        state.require_schema()?;
        Ok(state
            .by_key
            .get(key)
            .map(|&index| state.records[index].clone()))
    }

    async fn count_by_key(&self, key: &NaturalKey) -> BatchResult<u64> {
        let state = self.state.read().await;
        state.require_schema()?;
        Ok(state
            .records
            .iter()
            .filter(|record| record.natural_key.as_ref() == Some(key))
            .count() as u64)
    }

    async fn count(&self) -> BatchResult<u64> {
        let state = self.state.read().await;
        state.require_schema()?;
        Ok(state.records.len() as u64)
    }
}
