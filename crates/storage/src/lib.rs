pub mod backend;
pub mod error;
pub mod manager;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod registry;
pub mod rotation;
pub mod writer;

pub use backend::PartitionStore;
pub use error::StoreError;
pub use manager::{EnsureReport, PartitionManager};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use query::QueryEngine;
pub use registry::{PartitionRecord, PartitionRegistry};
pub use rotation::{RotationFailure, RotationManager, RotationReport, DEFAULT_ROTATE_AFTER};
pub use writer::SampleWriter;
