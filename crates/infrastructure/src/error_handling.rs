//! 记录仓储操作的错误辅助工具
//!
//! 将 sqlx 错误映射到批处理错误分类：可自行恢复的存储错误码映射为
//! `BatchError::TransientResource`，唯一键冲突映射为 `BatchError::DuplicateKey`，
//! 其余错误一律报告为 `BatchError::Storage`。

use std::fmt;

use batch_domain::NaturalKey;
use batch_errors::BatchError;
use sqlx::Error as SqlxError;
use tracing::{debug, instrument, warn};

/// 视为瞬时错误的 PostgreSQL SQLSTATE 错误码
pub const POSTGRES_TRANSIENT_CODES: [&str; 7] = [
    "40P01", // deadlock_detected
    "40001", // serialization_failure
    "55P03", // lock_not_available (lock_timeout)
    "57014", // query_canceled (statement_timeout)
    "57P01", // admin_shutdown
    "57P02", // crash_shutdown
    "57P03", // cannot_connect_now
];

/// 视为瞬时错误的 SQLSTATE 类别：连接异常与资源不足
pub const POSTGRES_TRANSIENT_CLASSES: [&str; 2] = ["08", "53"];

/// 视为瞬时错误的 SQLite 主错误码及扩展错误码
pub const SQLITE_TRANSIENT_CODES: [&str; 6] = [
    "5",   // SQLITE_BUSY
    "6",   // SQLITE_LOCKED
    "261", // SQLITE_BUSY_RECOVERY
    "262", // SQLITE_LOCKED_SHAREDCACHE
    "517", // SQLITE_BUSY_SNAPSHOT
    "773", // SQLITE_BUSY_TIMEOUT
];

/// 判断存储错误码是否属于瞬时错误
pub fn is_transient_code(code: &str) -> bool {
    POSTGRES_TRANSIENT_CODES.contains(&code)
        || SQLITE_TRANSIENT_CODES.contains(&code)
        || (code.len() == 5
            && POSTGRES_TRANSIENT_CLASSES
                .iter()
                .any(|class| code.starts_with(class)))
}

/// 仓储操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryOperation {
    EnsureSchema,
    Exists,
    Insert,
    Read,
    Count,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryOperation::EnsureSchema => write!(f, "初始化表结构"),
            RepositoryOperation::Exists => write!(f, "检查存在"),
            RepositoryOperation::Insert => write!(f, "插入"),
            RepositoryOperation::Read => write!(f, "查询"),
            RepositoryOperation::Count => write!(f, "统计"),
        }
    }
}

/// 记录仓储操作的上下文信息
#[derive(Debug, Clone)]
pub struct RecordOperationContext {
    pub operation: RepositoryOperation,
    pub natural_key: Option<NaturalKey>,
}

impl RecordOperationContext {
    pub fn new(operation: RepositoryOperation) -> Self {
        Self {
            operation,
            natural_key: None,
        }
    }

    pub fn with_key(mut self, key: Option<&NaturalKey>) -> Self {
        self.natural_key = key.cloned();
        self
    }

    pub fn entity_description(&self) -> String {
        match &self.natural_key {
            Some(key) => format!("记录 (业务键: {key})"),
            None => "记录".to_string(),
        }
    }
}

/// 记录仓储操作的错误辅助工具
pub struct RepositoryErrorHelpers;

impl RepositoryErrorHelpers {
    #[instrument(skip_all, fields(
        operation = %context.operation,
        natural_key = ?context.natural_key,
    ))]
    pub fn record_database_error(context: &RecordOperationContext, error: SqlxError) -> BatchError {
        let entity_desc = context.entity_description();
        let operation_desc = context.operation.to_string();

        match &error {
            SqlxError::Database(db_error) => {
                if db_error.is_unique_violation() {
                    let key = context
                        .natural_key
                        .as_ref()
                        .map(|key| key.to_string())
                        .unwrap_or_default();
                    debug!(constraint = ?db_error.constraint(), "{operation_desc}{entity_desc}时发生唯一约束冲突");
                    return BatchError::duplicate_key(key);
                }

                let code = db_error.code().map(|code| code.into_owned());
                let msg = format!("{operation_desc}{entity_desc}时发生数据库错误: {db_error}");
                match code.as_deref() {
                    Some(code) if is_transient_code(code) => {
                        warn!(error = %error, code, "{}", msg);
                        BatchError::transient(msg)
                    }
                    _ => {
                        warn!(error = %error, code = ?code, "{}", msg);
                        BatchError::storage(msg)
                    }
                }
            }
            SqlxError::PoolTimedOut => {
                let msg = format!("{operation_desc}{entity_desc}时数据库连接池超时");
                warn!(error = %error, "{}", msg);
                BatchError::transient(msg)
            }
            SqlxError::Io(io_error) => {
                let msg = format!("{operation_desc}{entity_desc}时数据库连接中断: {io_error}");
                warn!(error = %error, "{}", msg);
                BatchError::transient(msg)
            }
            SqlxError::PoolClosed => {
                let msg = format!("{operation_desc}{entity_desc}时数据库连接池已关闭");
                warn!(error = %error, "{}", msg);
                BatchError::storage(msg)
            }
            _ => {
                let msg = format!("{operation_desc}{entity_desc}时发生未知数据库错误: {error}");
                warn!(error = %error, "{}", msg);
                BatchError::storage(msg)
            }
        }
    }
}
