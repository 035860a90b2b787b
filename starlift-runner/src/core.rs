use anyhow::Context;
use chrono::Utc;
use starlift::load::{render_insert, table_for_key, WarehouseLoader};
use starlift::pipeline::{ExtractStage, LoadStage, StageFailure, TransformStage};
use starlift::processed::table_from_parquet;
use starlift::source::{MemoryDatabase, PgDatabase};
use starlift::store::{FsObjectStore, ObjectStore};
use starlift_config::load_config;
use starlift_config::shared::PipelineConfig;
use tracing::info;

use crate::Command;

/// Runs one stage against the configured source, warehouse and store.
pub async fn run(command: Command) -> anyhow::Result<()> {
    let config: PipelineConfig = load_config().context("loading configuration")?;
    config.validate().context("validating configuration")?;

    let store = FsObjectStore::new(&config.storage.root).context("opening object store")?;
    let staging = config.storage.staging_area.clone();
    let processed = config.storage.processed_area.clone();

    match command {
        Command::Extract => {
            let db = PgDatabase::connect(&config.source)
                .await
                .context("connecting to source database")?;
            let mut stage = ExtractStage::new(db, store, staging);
            if !config.source_tables.is_empty() {
                stage = stage.with_tables(config.source_tables.clone());
            }
            let summary = stage
                .run(Utc::now().naive_utc())
                .await
                .context("running extraction")?;

            info!(
                segment = summary.run.segment(),
                staged = summary.staged.len(),
                unchanged = summary.unchanged.len(),
                "extraction complete"
            );
            check_failures("extraction", &summary.failures)
        }
        Command::Transform => {
            let summary = TransformStage::new(store, staging, processed)
                .run()
                .await
                .context("running transformation")?;

            info!(
                segment = summary.run.segment(),
                written = summary.written.len(),
                skipped = summary.skipped.len(),
                "transformation complete"
            );
            check_failures("transformation", &summary.failures)
        }
        Command::Load { dry_run: true } => dry_run_load(store, &processed).await,
        Command::Load { dry_run: false } => {
            let db = PgDatabase::connect(&config.warehouse)
                .await
                .context("connecting to warehouse database")?;
            let summary = LoadStage::new(store, db, staging, processed)
                .run()
                .await
                .context("running load")?;

            info!(
                segment = summary.run.segment(),
                loaded = summary.loaded(),
                promoted = summary.promoted,
                "load complete"
            );
            if summary.failed() > 0 {
                anyhow::bail!("load finished with {} failed tables", summary.failed());
            }
            Ok(())
        }
    }
}

/// Prints the literal insert text of the latest processed run without
/// touching the warehouse.
async fn dry_run_load(store: FsObjectStore, processed_area: &str) -> anyhow::Result<()> {
    // The database half of the loader is never exercised on a dry run.
    let loader = WarehouseLoader::new(store.clone(), MemoryDatabase::new(), processed_area);
    let run = loader
        .latest_processed_run()
        .await
        .context("discovering processed run")?;

    for key in &run.keys {
        let entity = table_for_key(key)?;
        let body = store.get_object(key).await?;
        let table = table_from_parquet(entity, body)?;
        println!("{}", render_insert(&table));
    }
    Ok(())
}

fn check_failures(stage: &str, failures: &[StageFailure]) -> anyhow::Result<()> {
    if failures.is_empty() {
        return Ok(());
    }

    let items: Vec<&str> = failures
        .iter()
        .map(|failure| failure.item.as_str())
        .collect();
    anyhow::bail!("{stage} finished with failures: {}", items.join(", "));
}
