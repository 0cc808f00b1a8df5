pub mod entities;
pub mod repositories;
pub mod sources;
pub mod value_objects;

pub use batch_errors::{BatchError, BatchResult, ErrorClass};
pub use entities::*;
pub use repositories::*;
pub use sources::*;
pub use value_objects::*;
