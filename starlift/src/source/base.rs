//! Relational database capability for the source and warehouse engines.

use std::future::Future;

use crate::error::PipelineResult;
use crate::types::{Cell, TableRow};

/// Result of a catalog or data query: column names plus rows in result
/// order.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    pub columns: Vec<String>,
    pub rows: Vec<TableRow>,
}

/// Trait for SQL engines the pipeline talks to.
///
/// Table identifiers cannot be bound parameters, so any caller-supplied
/// table name must pass the catalog allow-list check before being
/// interpolated into query text; see
/// [`crate::extract::ChangeExtractor::list_allowed_tables`]. Row values, by
/// contrast, always travel as bound parameters through [`Self::execute`].
///
/// Connections are scoped to a single stage invocation and released when the
/// implementation is dropped, on every exit path.
pub trait SqlDatabase {
    /// Lists the base table names of the engine's own catalog, before any
    /// allow-list filtering.
    fn list_base_tables(&self) -> impl Future<Output = PipelineResult<Vec<String>>> + Send;

    /// Runs a read query and returns all rows in result order.
    fn run_query(&self, sql: &str) -> impl Future<Output = PipelineResult<QueryResponse>> + Send;

    /// Executes a statement with bound parameters, returning the number of
    /// rows the statement reports back (the loader appends `RETURNING *` so
    /// this count reflects rows actually applied).
    fn execute(
        &self,
        sql: &str,
        params: &[Cell],
    ) -> impl Future<Output = PipelineResult<u64>> + Send;
}
