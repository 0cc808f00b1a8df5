use serde::{Deserialize, Serialize};

use crate::validation::{ConfigValidator, ValidationUtils};
use crate::ConfigResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// 准入槽位数，即同时处理的工作项数
    pub max_concurrency: usize,
    /// 内置数据源生成的模拟订单数量
    pub source_count: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 20,
            source_count: 2000,
        }
    }
}

impl ConfigValidator for WorkerConfig {
    fn validate(&self) -> ConfigResult<()> {
        ValidationUtils::validate_positive(self.max_concurrency, "worker.max_concurrency")?;
        Ok(())
    }
}
