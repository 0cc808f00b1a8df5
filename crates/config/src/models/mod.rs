pub mod app_config;
pub mod database;
pub mod observability;
pub mod retry;
pub mod worker;

pub use app_config::AppConfig;
pub use database::DatabaseConfig;
pub use observability::ObservabilityConfig;
pub use retry::RetryConfig;
pub use worker::WorkerConfig;
