//! Watermark-guarded incremental extraction from the source database.

use std::collections::BTreeSet;

use tracing::debug;

use crate::error::{ErrorKind, PipelineResult};
use crate::source::SqlDatabase;
use crate::types::TableData;
use crate::watermark::Watermark;
use crate::{bail, pipeline_error};

/// Name prefixes reserved by the engine or by convention; tables carrying
/// them never leave the catalog boundary.
const INTERNAL_PREFIXES: [&str; 3] = ["pg_", "sql_", "_"];

/// The rows of one source table that changed since the watermark.
///
/// `changed = false` is a legitimate "nothing new" outcome, distinct from
/// any error.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet {
    pub data: TableData,
    pub changed: bool,
}

/// Extracts per-table change sets from the source database.
///
/// Table identifiers cannot be bound parameters in the underlying driver,
/// so the catalog-derived allow-list is the safety boundary: any
/// caller-supplied name is validated against it before being interpolated
/// into query text.
#[derive(Debug, Clone)]
pub struct ChangeExtractor<D> {
    db: D,
}

impl<D: SqlDatabase> ChangeExtractor<D> {
    pub fn new(db: D) -> Self {
        Self { db }
    }

    /// Queries the source catalog for base tables, excluding
    /// internal-prefixed names.
    pub async fn list_allowed_tables(&self) -> PipelineResult<BTreeSet<String>> {
        let tables = self.db.list_base_tables().await?;
        Ok(tables
            .into_iter()
            .filter(|name| !INTERNAL_PREFIXES.iter().any(|prefix| name.starts_with(prefix)))
            .collect())
    }

    /// Extracts the rows of `table` whose `last_updated` strictly exceeds
    /// the watermark, preserving source order.
    pub async fn extract(&self, table: &str, watermark: &Watermark) -> PipelineResult<ChangeSet> {
        let allowed = self.list_allowed_tables().await?;
        if !allowed.contains(table) {
            bail!(
                ErrorKind::UnknownTable,
                "table is not in the source catalog",
                table
            );
        }

        let response = self.db.run_query(&format!("SELECT * FROM {table};")).await?;
        let full = TableData::with_rows(table, response.columns, response.rows)?;

        // The modification filter runs client-side over the full snapshot.
        let last_updated = full.require_column("last_updated")?;
        let mut data = TableData::new(table, full.columns().to_vec());
        for (position, row) in full.rows().iter().enumerate() {
            let modified_at = row.values()[last_updated].as_timestamp().ok_or_else(|| {
                pipeline_error!(
                    ErrorKind::MalformedInput,
                    "last_updated is not a timestamp",
                    format!("table `{table}`, row {position}")
                )
            })?;

            let keep = match watermark {
                Watermark::Epoch => true,
                Watermark::At(boundary) => modified_at > *boundary,
            };
            if keep {
                data.push_row(row.clone())?;
            }
        }

        let changed = !data.is_empty();
        debug!(table, rows = data.len(), changed, "extracted change set");
        Ok(ChangeSet { data, changed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemoryDatabase;
    use crate::types::{parse_timestamp, Cell, TableRow};

    fn design_table() -> TableData {
        let columns = vec![
            "design_id".to_string(),
            "design_name".to_string(),
            "last_updated".to_string(),
        ];
        TableData::with_rows(
            "design",
            columns,
            vec![
                TableRow::new(vec![
                    Cell::I64(1),
                    Cell::String("Wooden".into()),
                    Cell::String("2024-05-01 08:00:00.000000".into()),
                ]),
                TableRow::new(vec![
                    Cell::I64(2),
                    Cell::String("Steel".into()),
                    Cell::String("2024-05-20 09:30:00.000000".into()),
                ]),
            ],
        )
        .unwrap()
    }

    async fn database() -> MemoryDatabase {
        let db = MemoryDatabase::new();
        db.insert_table(design_table()).await;
        db.insert_table(TableData::new("pg_stats", vec!["x".into()]))
            .await;
        db.insert_table(TableData::new("sql_features", vec!["x".into()]))
            .await;
        db.insert_table(TableData::new("_migrations", vec!["x".into()]))
            .await;
        db
    }

    #[tokio::test]
    async fn allow_list_excludes_internal_prefixes() {
        let extractor = ChangeExtractor::new(database().await);
        let allowed = extractor.list_allowed_tables().await.unwrap();

        assert!(allowed.contains("design"));
        assert!(!allowed.contains("pg_stats"));
        assert!(!allowed.contains("sql_features"));
        assert!(!allowed.contains("_migrations"));
    }

    #[tokio::test]
    async fn unknown_table_is_rejected_before_query() {
        let extractor = ChangeExtractor::new(database().await);
        let err = extractor
            .extract("design; DROP TABLE design", &Watermark::Epoch)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::UnknownTable);
    }

    #[tokio::test]
    async fn epoch_watermark_takes_the_full_table() {
        let extractor = ChangeExtractor::new(database().await);
        let change_set = extractor.extract("design", &Watermark::Epoch).await.unwrap();

        assert!(change_set.changed);
        assert_eq!(change_set.data.len(), 2);
    }

    #[tokio::test]
    async fn rows_at_or_before_the_watermark_are_filtered_out() {
        let extractor = ChangeExtractor::new(database().await);
        let boundary = Watermark::At(parse_timestamp("2024-05-01 08:00:00.000000").unwrap());

        let change_set = extractor.extract("design", &boundary).await.unwrap();

        assert!(change_set.changed);
        assert_eq!(change_set.data.len(), 1);
        assert_eq!(
            change_set.data.value(0, 1),
            &Cell::String("Steel".to_string())
        );
    }

    #[tokio::test]
    async fn no_new_rows_is_not_an_error() {
        let extractor = ChangeExtractor::new(database().await);
        let boundary = Watermark::At(parse_timestamp("2024-06-01 00:00:00.000000").unwrap());

        let change_set = extractor.extract("design", &boundary).await.unwrap();

        assert!(!change_set.changed);
        assert!(change_set.data.is_empty());
    }
}
