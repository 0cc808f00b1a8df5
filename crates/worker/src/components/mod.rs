pub mod admission;
pub mod item_processor;
pub mod retry_executor;

pub use admission::{Slot, WorkerPool};
pub use item_processor::{extract_natural_key, ItemProcessor, OrderItemProcessor, DEFAULT_KEY_FIELD};
pub use retry_executor::{RetryExecutor, RetryPolicy};
