use std::sync::Arc;

use async_trait::async_trait;
use batch_domain::{Disposition, NaturalKey, RecordRepository, WorkItem};
use batch_errors::{BatchError, BatchResult};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// 默认的业务键字段
pub const DEFAULT_KEY_FIELD: &str = "orderId";

/// 单个工作项的处理单元
///
/// 重试执行器可能对同一工作项多次调用 `process`，实现必须是幂等的。
#[async_trait]
pub trait ItemProcessor: Send + Sync {
    /// 一次性准备工作，在派发第一个工作项之前执行
    async fn prepare(&self) -> BatchResult<()> {
        Ok(())
    }

    /// 处理单个工作项，返回本次处理的结果
    async fn process(&self, item: &WorkItem) -> BatchResult<Disposition>;
}

/// 解析订单消息并幂等地写入记录仓储
pub struct OrderItemProcessor {
    repository: Arc<dyn RecordRepository>,
    key_field: String,
    schema_ready: OnceCell<()>,
}

impl OrderItemProcessor {
    /// 创建使用默认业务键字段 `orderId` 的处理器
    pub fn new(repository: Arc<dyn RecordRepository>) -> Self {
        Self {
            repository,
            key_field: DEFAULT_KEY_FIELD.to_string(),
            schema_ready: OnceCell::new(),
        }
    }

    /// 设置业务键字段名
    pub fn with_key_field<S: Into<String>>(mut self, field: S) -> Self {
        self.key_field = field.into();
        self
    }

    /// 获取记录仓储
    pub fn repository(&self) -> Arc<dyn RecordRepository> {
        Arc::clone(&self.repository)
    }

    /// 有业务键时先查重再写入；无业务键时直接写入
    async fn persist(&self, key: Option<&NaturalKey>, payload: &str) -> BatchResult<Disposition> {
        let Some(key) = key else {
            self.repository.insert(None, payload).await?;
            return Ok(Disposition::Inserted);
        };

        if self.repository.exists(key).await? {
            debug!(order_id = %key, "record already present, skipping insert");
            return Ok(Disposition::AlreadyPresent);
        }

        match self.repository.insert(Some(key), payload).await {
            Ok(_) => Ok(Disposition::Inserted),
            // 同一业务键的并发写入已先完成
            Err(BatchError::DuplicateKey { .. }) => Ok(Disposition::AlreadyPresent),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ItemProcessor for OrderItemProcessor {
    async fn prepare(&self) -> BatchResult<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                self.repository.ensure_schema().await?;
                info!("record schema ready");
                Ok::<(), BatchError>(())
            })
            .await?;
        Ok(())
    }

    async fn process(&self, item: &WorkItem) -> BatchResult<Disposition> {
        self.prepare().await?;

        let parsed = match extract_natural_key(item.payload(), &self.key_field) {
            Ok(key) => key,
            Err(e) => {
                warn!(
                    sequence = item.sequence(),
                    payload = item.payload(),
                    reason = %e,
                    "invalid message, skipped"
                );
                return Ok(Disposition::SkippedInvalid {
                    reason: e.to_string(),
                });
            }
        };
        let key = item.natural_key().cloned().or(parsed);

        let disposition = self.persist(key.as_ref(), item.payload()).await?;
        info!(
            sequence = item.sequence(),
            order_id = key.as_ref().map(NaturalKey::as_str),
            inserted = disposition == Disposition::Inserted,
            "message processed"
        );
        Ok(disposition)
    }
}

/// 从 JSON 载荷中提取业务键
///
/// 字段缺失时返回 `Ok(None)`；只接受 32 位范围内的 JSON 整数，
/// 字符串、小数、越界整数及其他类型均视为无效载荷。
pub fn extract_natural_key(payload: &str, field: &str) -> BatchResult<Option<NaturalKey>> {
    let document: Value = serde_json::from_str(payload)
        .map_err(|e| BatchError::invalid_payload(format!("不是有效的JSON: {e}")))?;

    let object = document
        .as_object()
        .ok_or_else(|| BatchError::invalid_payload("消息必须是JSON对象"))?;

    match object.get(field) {
        None => Ok(None),
        Some(Value::Number(number)) => number
            .as_i64()
            .and_then(|value| i32::try_from(value).ok())
            .map(|value| Some(NaturalKey::from(i64::from(value))))
            .ok_or_else(|| {
                BatchError::invalid_payload(format!("{field} 必须是32位整数, 实际为 {number}"))
            }),
        Some(other) => Err(BatchError::invalid_payload(format!(
            "{field} 必须是整数, 实际为 {other}"
        ))),
    }
}
