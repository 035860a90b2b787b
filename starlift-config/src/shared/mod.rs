//! Shared configuration types for the pipeline binaries.

mod connection;
mod pipeline;

pub use connection::{PgConnectionConfig, ValidationError};
pub use pipeline::{PipelineConfig, StorageConfig};
