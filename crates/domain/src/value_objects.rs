use std::fmt;

use serde::{Deserialize, Serialize};

/// 用于去重的业务键（例如订单号）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NaturalKey(String);

impl NaturalKey {
    pub fn new<S: Into<String>>(value: S) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for NaturalKey {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for NaturalKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// 单个工作项的最终状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutcomeKind {
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "SKIPPED_INVALID")]
    SkippedInvalid,
    #[serde(rename = "FAILED_FINAL")]
    FailedFinal,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Success => "success",
            OutcomeKind::SkippedInvalid => "skipped_invalid",
            OutcomeKind::FailedFinal => "failed_final",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次成功的处理器调用对工作项做了什么
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// 写入了新记录
    Inserted,
    /// 已存在相同业务键的记录
    AlreadyPresent,
    /// 载荷不可用，未写入任何内容
    SkippedInvalid { reason: String },
}
