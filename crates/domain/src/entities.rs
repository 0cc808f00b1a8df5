use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{NaturalKey, OutcomeKind};

/// 待处理的工作项，创建后不可变
///
/// 克隆开销很小，载荷是共享的。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    sequence: u64,
    payload: Arc<str>,
    natural_key: Option<NaturalKey>,
}

impl WorkItem {
    pub fn new<S: Into<String>>(sequence: u64, payload: S) -> Self {
        Self {
            sequence,
            payload: Arc::from(payload.into()),
            natural_key: None,
        }
    }

    /// 附加预先已知的业务键，优先于载荷中的业务键
    pub fn with_natural_key(mut self, key: NaturalKey) -> Self {
        self.natural_key = Some(key);
        self
    }

    /// 工作项在数据源中的位置
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn natural_key(&self) -> Option<&NaturalKey> {
        self.natural_key.as_ref()
    }
}

/// 单个工作项的最终处理结果，每个被派发的工作项恰好产生一次
#[derive(Debug, Clone)]
pub struct ProcessingOutcome {
    pub item: WorkItem,
    pub kind: OutcomeKind,
    /// 该工作项调用处理器的次数
    pub attempts: u32,
    pub error: Option<String>,
}

impl ProcessingOutcome {
    pub fn success(item: WorkItem, attempts: u32) -> Self {
        Self {
            item,
            kind: OutcomeKind::Success,
            attempts,
            error: None,
        }
    }

    pub fn skipped_invalid<S: Into<String>>(item: WorkItem, attempts: u32, reason: S) -> Self {
        Self {
            item,
            kind: OutcomeKind::SkippedInvalid,
            attempts,
            error: Some(reason.into()),
        }
    }

    pub fn failed_final<S: Into<String>>(item: WorkItem, attempts: u32, error: S) -> Self {
        Self {
            item,
            kind: OutcomeKind::FailedFinal,
            attempts,
            error: Some(error.into()),
        }
    }
}

/// 持久化后的记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub id: i64,
    pub natural_key: Option<NaturalKey>,
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

/// 一次批处理运行的汇总结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_items: u64,
    pub dispatched: u64,
    pub succeeded: u64,
    pub skipped_invalid: u64,
    pub failed: u64,
    /// 因运行先被取消而未获准入的工作项数
    pub not_dispatched: u64,
    pub cancelled: bool,
    pub peak_concurrency: usize,
    pub elapsed_ms: u64,
}

impl RunSummary {
    pub fn count(&self, kind: OutcomeKind) -> u64 {
        match kind {
            OutcomeKind::Success => self.succeeded,
            OutcomeKind::SkippedInvalid => self.skipped_invalid,
            OutcomeKind::FailedFinal => self.failed,
        }
    }

    /// 所有工作项均为 Success 或 SkippedInvalid 时为 true
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && !self.cancelled && self.not_dispatched == 0
    }
}
