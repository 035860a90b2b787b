//! SQL database capability and its implementations.

pub mod base;
pub mod memory;
pub mod postgres;

pub use base::{QueryResponse, SqlDatabase};
pub use memory::MemoryDatabase;
pub use postgres::PgDatabase;
