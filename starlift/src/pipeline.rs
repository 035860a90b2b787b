//! The three pipeline stages, wired together from injected capabilities.
//!
//! Each stage is constructed from the stores and databases it needs and
//! exposes one `run` entry point. Failures of a single table or entity are
//! caught, recorded in the stage summary and never abort the remaining
//! items; only environmental failures (an unreachable store, an unreadable
//! watermark) fail the stage as a whole.

use chrono::NaiveDateTime;
use tracing::{error, info};

use crate::error::{PipelineError, PipelineResult};
use crate::extract::ChangeExtractor;
use crate::load::{LoadResult, LoadStatus, WarehouseLoader};
use crate::processed::ProcessedWriter;
use crate::source::SqlDatabase;
use crate::staging::{RunContext, StagingWriter};
use crate::store::ObjectStore;
use crate::transform::{registry, SnapshotTransformer, TransformOutput};
use crate::watermark::WatermarkStore;

/// One item the stage could not complete.
#[derive(Debug)]
pub struct StageFailure {
    /// The table or entity that failed.
    pub item: String,
    pub error: PipelineError,
}

/// What one extraction invocation did.
#[derive(Debug)]
pub struct ExtractSummary {
    pub run: RunContext,
    /// Keys of the staged snapshots, in table order.
    pub staged: Vec<String>,
    /// Tables with no rows past the watermark.
    pub unchanged: Vec<String>,
    pub failures: Vec<StageFailure>,
}

/// Extraction: snapshot every allow-listed source table past the watermark
/// into a new staging run, then write the run completion marker.
pub struct ExtractStage<D, S> {
    extractor: ChangeExtractor<D>,
    watermarks: WatermarkStore<S>,
    staging: StagingWriter<S>,
    tables: Option<Vec<String>>,
}

impl<D: SqlDatabase, S: ObjectStore + Clone> ExtractStage<D, S> {
    pub fn new(db: D, store: S, staging_area: impl Into<String>) -> Self {
        let staging_area = staging_area.into();
        Self {
            extractor: ChangeExtractor::new(db),
            watermarks: WatermarkStore::new(store.clone(), staging_area.clone()),
            staging: StagingWriter::new(store, staging_area),
            tables: None,
        }
    }

    /// Restricts extraction to the named tables instead of the full
    /// allow-list. Names still pass the per-table allow-list check, so a
    /// configured internal table fails rather than being silently read.
    pub fn with_tables(mut self, tables: Vec<String>) -> Self {
        self.tables = Some(tables);
        self
    }

    pub async fn run(&self, started_at: NaiveDateTime) -> PipelineResult<ExtractSummary> {
        let watermark = self.watermarks.get().await?;
        let run = RunContext::for_extraction(&watermark, started_at);
        info!(segment = run.segment(), "starting extraction run");

        let mut summary = ExtractSummary {
            run: run.clone(),
            staged: Vec::new(),
            unchanged: Vec::new(),
            failures: Vec::new(),
        };

        let tables = match &self.tables {
            Some(tables) => tables.clone(),
            None => self
                .extractor
                .list_allowed_tables()
                .await?
                .into_iter()
                .collect(),
        };

        for table in tables {
            let change_set = match self.extractor.extract(&table, &watermark).await {
                Ok(change_set) => change_set,
                Err(err) => {
                    error!(table, error = %err, "extraction failed for table");
                    summary.failures.push(StageFailure { item: table, error: err });
                    continue;
                }
            };

            // The bootstrap dump stages every table, even empty ones; the
            // full history has to be complete, not merely non-empty.
            if !change_set.changed && !run.is_bootstrap() {
                summary.unchanged.push(table);
                continue;
            }

            match self.staging.write_table(&run, &change_set.data).await {
                Ok(key) => summary.staged.push(key),
                Err(err) => {
                    error!(table, error = %err, "staging failed for table");
                    summary.failures.push(StageFailure { item: table, error: err });
                }
            }
        }

        self.staging.finish_run(&run, started_at).await?;
        info!(
            staged = summary.staged.len(),
            unchanged = summary.unchanged.len(),
            failed = summary.failures.len(),
            "extraction run finished"
        );
        Ok(summary)
    }
}

/// What one transformation invocation did.
#[derive(Debug)]
pub struct TransformSummary {
    pub run: RunContext,
    /// Keys of the processed parquet objects.
    pub written: Vec<String>,
    /// Entities reporting themselves already current.
    pub skipped: Vec<String>,
    pub failures: Vec<StageFailure>,
}

/// Transformation: apply every registry rule to the latest staged run and
/// write the results as parquet into the processed area.
pub struct TransformStage<S> {
    transformer: SnapshotTransformer<S>,
    processed: ProcessedWriter<S>,
    watermarks: WatermarkStore<S>,
}

impl<S: ObjectStore + Clone> TransformStage<S> {
    pub fn new(
        store: S,
        staging_area: impl Into<String>,
        processed_area: impl Into<String>,
    ) -> Self {
        let staging_area = staging_area.into();
        Self {
            transformer: SnapshotTransformer::new(store.clone(), staging_area.clone()),
            processed: ProcessedWriter::new(store.clone(), processed_area),
            watermarks: WatermarkStore::new(store, staging_area),
        }
    }

    pub async fn run(&self) -> PipelineResult<TransformSummary> {
        let watermark = self.watermarks.get().await?;
        let discovered = self.transformer.latest_run(&watermark).await?;
        info!(segment = discovered.run.segment(), "starting transformation run");

        let mut summary = TransformSummary {
            run: discovered.run.clone(),
            written: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
        };

        for rule in registry() {
            let output = match self.transformer.transform_entity(&discovered.run, rule).await {
                Ok(output) => output,
                Err(err) => {
                    error!(entity = rule.entity, error = %err, "transform failed for entity");
                    summary.failures.push(StageFailure {
                        item: rule.entity.to_string(),
                        error: err,
                    });
                    continue;
                }
            };

            match output {
                TransformOutput::AlreadyCurrent => summary.skipped.push(rule.entity.to_string()),
                TransformOutput::Table(table) => {
                    match self.processed.write_table(&discovered.run, &table).await {
                        Ok(key) => summary.written.push(key),
                        Err(err) => {
                            error!(entity = rule.entity, error = %err, "processed write failed");
                            summary.failures.push(StageFailure {
                                item: rule.entity.to_string(),
                                error: err,
                            });
                        }
                    }
                }
            }
        }

        info!(
            written = summary.written.len(),
            skipped = summary.skipped.len(),
            failed = summary.failures.len(),
            "transformation run finished"
        );
        Ok(summary)
    }
}

/// What one load invocation did.
#[derive(Debug)]
pub struct LoadSummary {
    pub run: RunContext,
    pub results: Vec<LoadResult>,
    /// Whether the watermark was promoted to this run's timestamp.
    pub promoted: bool,
}

impl LoadSummary {
    pub fn loaded(&self) -> usize {
        self.results
            .iter()
            .filter(|result| result.status == LoadStatus::Loaded)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.results
            .iter()
            .filter(|result| result.status == LoadStatus::Failed)
            .count()
    }
}

/// Load: apply the latest processed run to the warehouse and, once at least
/// one table has been applied, promote the watermark so the next extraction
/// starts past this run.
pub struct LoadStage<S, D> {
    loader: WarehouseLoader<S, D>,
    watermarks: WatermarkStore<S>,
}

impl<S: ObjectStore + Clone, D: SqlDatabase> LoadStage<S, D> {
    pub fn new(
        store: S,
        db: D,
        staging_area: impl Into<String>,
        processed_area: impl Into<String>,
    ) -> Self {
        Self {
            loader: WarehouseLoader::new(store.clone(), db, processed_area),
            watermarks: WatermarkStore::new(store, staging_area),
        }
    }

    pub async fn run(&self) -> PipelineResult<LoadSummary> {
        let processed = self.loader.latest_processed_run().await?;
        info!(segment = processed.run.segment(), "starting load run");

        let mut results = Vec::with_capacity(processed.keys.len());
        for key in &processed.keys {
            match self.loader.load_object(key).await {
                Ok(result) => results.push(result),
                Err(err) => {
                    error!(key = %key, error = %err, "load failed for object");
                    results.push(LoadResult {
                        table: key.clone(),
                        status: LoadStatus::Failed,
                        message: err.to_string(),
                    });
                }
            }
        }

        // Promotion requires at least one applied table: an all-failure run
        // must stay replayable under the current watermark.
        let promoted = results.iter().any(LoadResult::succeeded);
        if promoted {
            self.watermarks.promote(&processed.run).await?;
        }

        let summary = LoadSummary {
            run: processed.run,
            results,
            promoted,
        };
        info!(
            loaded = summary.loaded(),
            failed = summary.failed(),
            promoted = summary.promoted,
            "load run finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemoryDatabase;
    use crate::store::MemoryObjectStore;
    use crate::types::{parse_timestamp, Cell, TableData, TableRow};

    fn currency_snapshot() -> TableData {
        TableData::with_rows(
            "currency",
            vec![
                "currency_id".into(),
                "currency_code".into(),
                "created_at".into(),
                "last_updated".into(),
            ],
            vec![TableRow::new(vec![
                Cell::I64(1),
                Cell::String("GBP".into()),
                Cell::String("2022-11-03 14:20:49.962000".into()),
                Cell::String("2022-11-03 14:20:49.962000".into()),
            ])],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn first_extraction_is_the_bootstrap_dump() {
        let db = MemoryDatabase::new();
        db.insert_table(currency_snapshot()).await;
        let store = MemoryObjectStore::new();
        let stage = ExtractStage::new(db, store.clone(), "staging");
        let started_at = parse_timestamp("2024-05-20 12:10:03.998128").unwrap();

        let summary = stage.run(started_at).await.unwrap();

        assert!(summary.run.is_bootstrap());
        assert_eq!(
            summary.staged,
            vec!["staging/ingested_data/original_data_dump/currency.csv".to_string()]
        );
        assert!(store
            .get_object("staging/ingested_data/original_data_dump/last_ran_at.csv")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn transform_failures_do_not_abort_remaining_entities() {
        // Stage only the currency snapshot; every other entity's input is
        // missing and must fail individually.
        let store = MemoryObjectStore::new();
        let db = MemoryDatabase::new();
        db.insert_table(currency_snapshot()).await;
        ExtractStage::new(db, store.clone(), "staging")
            .run(parse_timestamp("2024-05-20 12:10:03.998128").unwrap())
            .await
            .unwrap();

        let stage = TransformStage::new(store, "staging", "processed");
        let summary = stage.run().await.unwrap();

        // dim_currency from the snapshot, dim_date generated on bootstrap.
        assert_eq!(summary.written.len(), 2);
        assert_eq!(summary.failures.len(), 6);
        assert!(summary
            .written
            .iter()
            .any(|key| key.ends_with("dim_currency.parquet")));
        assert!(summary
            .written
            .iter()
            .any(|key| key.ends_with("dim_date.parquet")));
    }

    #[tokio::test]
    async fn all_failed_loads_leave_the_watermark_alone() {
        let store = MemoryObjectStore::new();
        store
            .put_object(
                "processed/original_data_dump/dim_currency.parquet",
                bytes::Bytes::from_static(b"not parquet"),
            )
            .await
            .unwrap();
        let db = MemoryDatabase::new();
        let stage = LoadStage::new(store.clone(), db, "staging", "processed");

        let summary = stage.run().await.unwrap();

        assert_eq!(summary.failed(), 1);
        assert!(!summary.promoted);
        assert!(store.get_object("staging/last_ran_at.csv").await.is_err());
    }
}
