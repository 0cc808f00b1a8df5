//! 批处理 Worker
//!
//! 准入控制、带退避的重试执行以及批次运行器。

pub mod components;
pub mod service;

pub use components::{
    extract_natural_key, ItemProcessor, OrderItemProcessor, RetryExecutor, RetryPolicy, Slot,
    WorkerPool, DEFAULT_KEY_FIELD,
};
pub use service::{BatchRunner, BatchRunnerBuilder};
