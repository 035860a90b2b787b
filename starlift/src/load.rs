//! Loading processed tables into the warehouse.
//!
//! The loader discovers the latest processed run by prefix listing, reads
//! each parquet object back into a table and applies it with parameterized
//! multi-row inserts, batched below the protocol's parameter ceiling.
//! `ON CONFLICT DO NOTHING`
//! combined with `RETURNING *` makes re-applying an already-loaded run a
//! no-op that reports zero applied rows instead of duplicating facts.

use tracing::info;

use crate::error::{ErrorKind, PipelineResult};
use crate::processed::table_from_parquet;
use crate::source::SqlDatabase;
use crate::staging::{RunContext, BOOTSTRAP_SEGMENT};
use crate::store::ObjectStore;
use crate::types::{parse_timestamp, Cell, TableData, TableRow};
use crate::{bail, pipeline_error};

/// Upper bound on bound parameters per statement. The extended query
/// protocol encodes the bind parameter count as a 16-bit integer, so a
/// statement can never carry more than this many.
const MAX_STATEMENT_PARAMS: usize = 65_535;

/// The fixed warehouse table set. Nothing outside this list is ever named in
/// statement text.
pub const WAREHOUSE_TABLES: [&str; 8] = [
    "dim_date",
    "dim_staff",
    "dim_currency",
    "dim_design",
    "dim_location",
    "dim_counterparty",
    "fact_sales_order",
    "fact_purchase_order",
];

/// Outcome of loading one warehouse table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// At least one new row was applied.
    Loaded,
    /// The statement ran but every row was already present.
    AlreadyLoaded,
    /// The table failed; the error is in the message.
    Failed,
}

/// Per-table load report, one per processed object of the run.
#[derive(Debug, Clone)]
pub struct LoadResult {
    pub table: String,
    pub status: LoadStatus,
    pub message: String,
}

impl LoadResult {
    pub fn succeeded(&self) -> bool {
        self.status != LoadStatus::Failed
    }
}

/// A processed run discovered by prefix listing: its context plus the
/// parquet keys it holds.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedRun {
    pub run: RunContext,
    pub keys: Vec<String>,
}

/// Applies the latest processed run to the warehouse.
#[derive(Debug, Clone)]
pub struct WarehouseLoader<S, D> {
    store: S,
    db: D,
    processed_area: String,
}

impl<S: ObjectStore, D: SqlDatabase> WarehouseLoader<S, D> {
    pub fn new(store: S, db: D, processed_area: impl Into<String>) -> Self {
        Self {
            store,
            db,
            processed_area: processed_area.into(),
        }
    }

    /// Discovers the most recent processed run: the lexicographically
    /// greatest timestamp-shaped segment, falling back to the bootstrap
    /// segment when no incremental run has been processed yet.
    pub async fn latest_processed_run(&self) -> PipelineResult<ProcessedRun> {
        let prefix = format!("{}/", self.processed_area);
        let keys = self.store.list_objects(&prefix).await?;

        let segments: Vec<&str> = keys
            .iter()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter_map(|rest| rest.split('/').next())
            .collect();

        let latest = segments
            .iter()
            .filter(|segment| parse_timestamp(segment).is_some())
            .max()
            .map(|segment| RunContext::Run(segment.to_string()));
        let run = match latest {
            Some(run) => run,
            None if segments.contains(&BOOTSTRAP_SEGMENT) => RunContext::Bootstrap,
            None => {
                bail!(
                    ErrorKind::NoSuchObject,
                    "no processed runs to load",
                    prefix
                );
            }
        };

        let run_prefix = format!("{prefix}{}/", run.segment());
        let keys = keys
            .into_iter()
            .filter(|key| key.starts_with(&run_prefix))
            .collect();

        Ok(ProcessedRun { run, keys })
    }

    /// Reads one processed object and applies it to its warehouse table.
    pub async fn load_object(&self, key: &str) -> PipelineResult<LoadResult> {
        let entity = table_for_key(key)?;
        let body = self.store.get_object(key).await?;
        let table = table_from_parquet(entity, body)?;
        self.load_table(&table).await
    }

    /// Applies one table with parameterized inserts, batched so no single
    /// statement exceeds the protocol's parameter ceiling.
    pub async fn load_table(&self, table: &TableData) -> PipelineResult<LoadResult> {
        check_warehouse_table(table.name())?;

        if table.is_empty() {
            return Ok(LoadResult {
                table: table.name().to_string(),
                status: LoadStatus::AlreadyLoaded,
                message: "no rows to load".to_string(),
            });
        }

        let mut applied = 0;
        for rows in table.rows().chunks(rows_per_statement(table.columns().len())) {
            let (sql, params) = insert_rows(table, rows);
            applied += self.db.execute(&sql, &params).await?;
        }

        info!(table = table.name(), rows = table.len(), applied, "loaded table");
        let status = if applied > 0 {
            LoadStatus::Loaded
        } else {
            LoadStatus::AlreadyLoaded
        };
        Ok(LoadResult {
            table: table.name().to_string(),
            status,
            message: format!("{applied} of {} rows applied", table.len()),
        })
    }
}

/// Resolves a processed object key to its warehouse table via the file stem,
/// rechecking the fixed table set before the name reaches statement text.
pub fn table_for_key(key: &str) -> PipelineResult<&str> {
    let entity = key
        .rsplit('/')
        .next()
        .and_then(|file| file.strip_suffix(".parquet"))
        .ok_or_else(|| {
            pipeline_error!(
                ErrorKind::MalformedInput,
                "processed key is not a parquet object",
                key
            )
        })?;
    check_warehouse_table(entity)?;
    Ok(entity)
}

fn check_warehouse_table(name: &str) -> PipelineResult<()> {
    if !WAREHOUSE_TABLES.contains(&name) {
        bail!(
            ErrorKind::UnknownTable,
            "table is not part of the warehouse schema",
            name
        );
    }
    Ok(())
}

/// How many rows fit in one statement without overflowing the parameter
/// ceiling.
fn rows_per_statement(width: usize) -> usize {
    (MAX_STATEMENT_PARAMS / width.max(1)).max(1)
}

/// Builds the parameterized insert for a whole table: one `($n, …)` tuple
/// per row, `ON CONFLICT DO NOTHING` for idempotence and `RETURNING *` so
/// the applied row count excludes conflicts.
pub fn insert_statement(table: &TableData) -> (String, Vec<Cell>) {
    insert_rows(table, table.rows())
}

/// Builds the parameterized insert for one batch of a table's rows.
///
/// Fact tables carry an explicit column list; their record identifier is a
/// warehouse-side key and the processed column order must bind by name, not
/// position.
fn insert_rows(table: &TableData, rows: &[TableRow]) -> (String, Vec<Cell>) {
    let width = table.columns().len();
    let tuples: Vec<String> = (0..rows.len())
        .map(|row| {
            let placeholders: Vec<String> = (1..=width)
                .map(|column| format!("${}", row * width + column))
                .collect();
            format!("({})", placeholders.join(", "))
        })
        .collect();

    let sql = format!(
        "INSERT INTO {}{} VALUES {} ON CONFLICT DO NOTHING RETURNING *;",
        table.name(),
        fact_column_list(table),
        tuples.join(", ")
    );
    let params = rows
        .iter()
        .flat_map(|row| row.values().iter().cloned())
        .collect();
    (sql, params)
}

/// The explicit column list fact tables bind by name; empty for dimensions.
fn fact_column_list(table: &TableData) -> String {
    if table.name().starts_with("fact_") {
        format!(" ({})", table.columns().join(", "))
    } else {
        String::new()
    }
}

/// Renders a table as literal insert text, for inspection and dry runs.
/// Values are escaped with postgres literal quoting; nulls render as `NULL`.
pub fn render_insert(table: &TableData) -> String {
    let tuples: Vec<String> = table
        .rows()
        .iter()
        .map(|row| {
            let values: Vec<String> = row.values().iter().map(render_literal).collect();
            format!("({})", values.join(", "))
        })
        .collect();

    format!(
        "INSERT INTO {}{} VALUES {} RETURNING *;",
        table.name(),
        fact_column_list(table),
        tuples.join(", ")
    )
}

fn render_literal(cell: &Cell) -> String {
    match cell {
        Cell::Null => "NULL".to_string(),
        Cell::Bool(value) => if *value { "TRUE" } else { "FALSE" }.to_string(),
        Cell::I64(value) => value.to_string(),
        Cell::F64(value) => value.to_string(),
        other => pg_escape::quote_literal(&other.to_csv_field()).to_string(),
    }
}
