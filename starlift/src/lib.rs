//! Watermark-driven incremental pipeline from an operational database into a
//! star-schema warehouse.
//!
//! Data moves through three stages, each independently invocable:
//! extraction snapshots changed source rows into run-scoped CSV objects,
//! transformation reshapes the latest run into dimension and fact tables
//! stored as parquet, and load applies the processed run to the warehouse
//! and promotes the watermark.

pub mod error;
pub mod extract;
pub mod load;
pub mod macros;
pub mod pipeline;
pub mod processed;
pub mod source;
pub mod staging;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod transform;
pub mod types;
pub mod watermark;
