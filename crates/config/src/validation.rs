use crate::{ConfigError, ConfigResult};

/// 配置校验接口
pub trait ConfigValidator {
    fn validate(&self) -> ConfigResult<()>;
}

/// 通用校验工具
pub struct ValidationUtils;

impl ValidationUtils {
    pub fn validate_not_empty(value: &str, field: &str) -> ConfigResult<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!("{field} cannot be empty")));
        }
        Ok(())
    }

    pub fn validate_positive<T>(value: T, field: &str) -> ConfigResult<()>
    where
        T: PartialOrd + Default + std::fmt::Display,
    {
        if value <= T::default() {
            return Err(ConfigError::Validation(format!(
                "{field} must be greater than 0, got {value}"
            )));
        }
        Ok(())
    }

    pub fn validate_one_of(value: &str, allowed: &[&str], field: &str) -> ConfigResult<()> {
        if !allowed.contains(&value) {
            return Err(ConfigError::Validation(format!(
                "Invalid {field}: {value}. Valid values: {allowed:?}"
            )));
        }
        Ok(())
    }
}
