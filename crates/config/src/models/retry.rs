use serde::{Deserialize, Serialize};

use crate::validation::{ConfigValidator, ValidationUtils};
use crate::{ConfigError, ConfigResult};

/// 单条消息的重试配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// 首次尝试之后的最大重试次数
    pub max_retries: u32,
    /// 第 k 次重试前等待 `2^k * base_delay_ms` 毫秒
    pub base_delay_ms: u64,
    /// 单次等待上限，未设置则不封顶
    pub max_delay_ms: Option<u64>,
    /// 未识别为瞬时错误的失败是否同样重试
    pub retry_unclassified: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: None,
            retry_unclassified: true,
        }
    }
}

impl ConfigValidator for RetryConfig {
    fn validate(&self) -> ConfigResult<()> {
        ValidationUtils::validate_positive(self.base_delay_ms, "retry.base_delay_ms")?;

        if self.max_retries > 30 {
            return Err(ConfigError::Validation(format!(
                "retry.max_retries must be at most 30, got {}",
                self.max_retries
            )));
        }

        if let Some(max_delay_ms) = self.max_delay_ms {
            if max_delay_ms < self.base_delay_ms {
                return Err(ConfigError::Validation(
                    "retry.max_delay_ms cannot be smaller than retry.base_delay_ms".to_string(),
                ));
            }
        }

        Ok(())
    }
}
