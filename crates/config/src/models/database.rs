use serde::{Deserialize, Serialize};

use crate::validation::{ConfigValidator, ValidationUtils};
use crate::{ConfigError, ConfigResult};

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `sqlite://...`、`postgres://...`，或使用进程内存储的 `memory`
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://batch.db".to_string(),
            max_connections: 100,
            min_connections: 1,
            connection_timeout_seconds: 30,
            idle_timeout_seconds: 600,
        }
    }
}

impl DatabaseConfig {
    pub fn is_memory(&self) -> bool {
        self.url == "memory"
    }
}

impl ConfigValidator for DatabaseConfig {
    fn validate(&self) -> ConfigResult<()> {
        ValidationUtils::validate_not_empty(&self.url, "database.url")?;

        let supported = self.is_memory()
            || self.url.starts_with("sqlite:")
            || self.url.starts_with("postgres://")
            || self.url.starts_with("postgresql://");
        if !supported {
            return Err(ConfigError::Validation(format!(
                "database.url must be a sqlite, postgres or memory url, got {}",
                self.url
            )));
        }

        ValidationUtils::validate_positive(self.max_connections, "database.max_connections")?;
        if self.min_connections > self.max_connections {
            return Err(ConfigError::Validation(
                "database.min_connections cannot exceed database.max_connections".to_string(),
            ));
        }
        ValidationUtils::validate_positive(
            self.connection_timeout_seconds,
            "database.connection_timeout_seconds",
        )?;

        Ok(())
    }
}
