mod builder;
mod error;
mod formatting_layer;
mod storage;

pub use builder::StructLogBuilder;
pub use error::SetupError;
pub use formatting_layer::JsonLogLayer;
pub use storage::{FieldStorage, MASK, MASKED_FIELDS, StorageLayer};
