//! In-memory database double for tests and development.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{ErrorKind, PipelineResult};
use crate::pipeline_error;
use crate::source::base::{QueryResponse, SqlDatabase};
use crate::types::{Cell, TableData};

/// A statement recorded by [`MemoryDatabase::execute`], for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedStatement {
    pub sql: String,
    pub params: Vec<Cell>,
}

#[derive(Debug, Default)]
struct Inner {
    tables: BTreeMap<String, TableData>,
    statements: Vec<RecordedStatement>,
    fail_execute: bool,
}

/// Database double backed by registered [`TableData`] snapshots.
///
/// `run_query` only understands the shape the pipeline actually issues,
/// `SELECT * FROM {table};`, and answers it from the registered snapshot.
/// Executed statements are recorded verbatim so tests can assert on the
/// rendered SQL and bound parameters.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table snapshot under its name.
    pub async fn insert_table(&self, table: TableData) {
        let mut inner = self.inner.lock().await;
        inner.tables.insert(table.name().to_string(), table);
    }

    /// Makes every subsequent `execute` fail with a database error.
    pub async fn set_fail_execute(&self, fail: bool) {
        self.inner.lock().await.fail_execute = fail;
    }

    /// Returns every statement executed so far.
    pub async fn statements(&self) -> Vec<RecordedStatement> {
        self.inner.lock().await.statements.clone()
    }
}

impl SqlDatabase for MemoryDatabase {
    async fn list_base_tables(&self) -> PipelineResult<Vec<String>> {
        let inner = self.inner.lock().await;
        Ok(inner.tables.keys().cloned().collect())
    }

    async fn run_query(&self, sql: &str) -> PipelineResult<QueryResponse> {
        let table_name = sql
            .trim()
            .strip_prefix("SELECT * FROM ")
            .and_then(|rest| rest.strip_suffix(';'))
            .ok_or_else(|| {
                pipeline_error!(ErrorKind::DatabaseError, "unsupported query shape", sql)
            })?;

        let inner = self.inner.lock().await;
        let table = inner.tables.get(table_name).ok_or_else(|| {
            pipeline_error!(
                ErrorKind::DatabaseError,
                "relation does not exist",
                table_name
            )
        })?;

        Ok(QueryResponse {
            columns: table.columns().to_vec(),
            rows: table.rows().to_vec(),
        })
    }

    async fn execute(&self, sql: &str, params: &[Cell]) -> PipelineResult<u64> {
        let mut inner = self.inner.lock().await;
        if inner.fail_execute {
            return Err(pipeline_error!(
                ErrorKind::DatabaseError,
                "statement rejected by database"
            ));
        }

        // Each bound tuple in the rendered statement opens with `($`.
        let applied = sql.matches("($").count() as u64;
        inner.statements.push(RecordedStatement {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        Ok(applied)
    }
}
