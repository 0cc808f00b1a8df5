use thiserror::Error;

/// 批处理统一错误类型
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("无效的消息载荷: {0}")]
    InvalidPayload(String),
    #[error("存储资源暂时不可用: {0}")]
    TransientResource(String),
    #[error("存储错误: {0}")]
    Storage(String),
    #[error("业务键重复: {key}")]
    DuplicateKey { key: String },
    #[error("重试次数已耗尽 ({attempts} 次尝试): {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
    #[error("操作已取消")]
    Cancelled,
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type BatchResult<T> = Result<T, BatchError>;

/// 重试执行器对失败的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// 预期可自行恢复，总是允许重试
    Transient,
    /// 未识别为瞬时错误，仅在策略允许时重试
    Unclassified,
    /// 从不重试
    Fatal,
}

impl BatchError {
    pub fn invalid_payload<S: Into<String>>(msg: S) -> Self {
        Self::InvalidPayload(msg.into())
    }
    pub fn transient<S: Into<String>>(msg: S) -> Self {
        Self::TransientResource(msg.into())
    }
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }
    pub fn duplicate_key<S: Into<String>>(key: S) -> Self {
        Self::DuplicateKey { key: key.into() }
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn classify(&self) -> ErrorClass {
        match self {
            BatchError::TransientResource(_) => ErrorClass::Transient,
            BatchError::InvalidPayload(_)
            | BatchError::Cancelled
            | BatchError::Configuration(_)
            | BatchError::RetriesExhausted { .. } => ErrorClass::Fatal,
            BatchError::Storage(_)
            | BatchError::DuplicateKey { .. }
            | BatchError::Serialization(_)
            | BatchError::Internal(_) => ErrorClass::Unclassified,
        }
    }
    pub fn is_transient(&self) -> bool {
        self.classify() == ErrorClass::Transient
    }
    pub fn is_fatal(&self) -> bool {
        self.classify() == ErrorClass::Fatal
    }
}

impl From<serde_json::Error> for BatchError {
    fn from(err: serde_json::Error) -> Self {
        BatchError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for BatchError {
    fn from(err: anyhow::Error) -> Self {
        BatchError::Internal(err.to_string())
    }
}
