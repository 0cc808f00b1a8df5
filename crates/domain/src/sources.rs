use async_trait::async_trait;
use batch_errors::BatchResult;

use crate::entities::WorkItem;

/// 工作项来源：提供有限且有序的工作项序列
#[async_trait]
pub trait ItemSource: Send + Sync {
    async fn items(&self) -> BatchResult<Vec<WorkItem>>;
}

/// 固定的内存载荷列表
#[derive(Debug, Clone, Default)]
pub struct VecItemSource {
    payloads: Vec<String>,
}

impl VecItemSource {
    pub fn new<I, S>(payloads: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            payloads: payloads.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }
}

#[async_trait]
impl ItemSource for VecItemSource {
    async fn items(&self) -> BatchResult<Vec<WorkItem>> {
        Ok(self
            .payloads
            .iter()
            .enumerate()
            .map(|(sequence, payload)| WorkItem::new(sequence as u64, payload.clone()))
            .collect())
    }
}

/// 生成 `{"orderId": i}` 形式的模拟订单消息, i ∈ [0, count)
#[derive(Debug, Clone, Copy)]
pub struct SyntheticOrderSource {
    count: usize,
}

impl SyntheticOrderSource {
    pub fn new(count: usize) -> Self {
        Self { count }
    }
}

#[async_trait]
impl ItemSource for SyntheticOrderSource {
    async fn items(&self) -> BatchResult<Vec<WorkItem>> {
        Ok((0..self.count)
            .map(|i| WorkItem::new(i as u64, serde_json::json!({ "orderId": i }).to_string()))
            .collect())
    }
}
