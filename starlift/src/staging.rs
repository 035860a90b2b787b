//! Run-scoped staging of extracted snapshots as delimited text.
//!
//! Every object of one run shares the `{staging_area}/ingested_data/{segment}`
//! prefix, which is what lets the transform stage discover "everything from
//! the latest run" with a plain prefix listing instead of a manifest file.
//! Staged objects are write-once: a corrected run gets a new segment and the
//! prior run stays behind as an audit trail.

use chrono::NaiveDateTime;
use tracing::info;

use crate::error::{ErrorKind, PipelineResult};
use crate::pipeline_error;
use crate::store::ObjectStore;
use crate::types::{Cell, TableData, TableRow, TIMESTAMP_FORMAT};
use crate::watermark::{Watermark, MARKER_FILE};

/// Path segment of the one-time full bootstrap dump.
pub const BOOTSTRAP_SEGMENT: &str = "original_data_dump";

/// Subdirectory of the staging area holding run snapshots.
pub const INGESTED_DIR: &str = "ingested_data";

/// Identifies one extraction execution inside the staging layout.
///
/// The bootstrap variant marks the authoritative full history dump of the
/// first-ever run; ordinary runs are keyed by their start timestamp, whose
/// string ordering is chronological.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunContext {
    Bootstrap,
    Run(String),
}

impl RunContext {
    /// Derives the run context for an extraction starting at `started_at`
    /// under the given watermark: the epoch sentinel selects the bootstrap
    /// dump, anything else an incremental run keyed by the start time.
    pub fn for_extraction(watermark: &Watermark, started_at: NaiveDateTime) -> Self {
        if watermark.is_epoch() {
            RunContext::Bootstrap
        } else {
            RunContext::Run(started_at.format(TIMESTAMP_FORMAT).to_string())
        }
    }

    pub fn is_bootstrap(&self) -> bool {
        matches!(self, RunContext::Bootstrap)
    }

    /// The path segment binding together everything this run produced.
    pub fn segment(&self) -> &str {
        match self {
            RunContext::Bootstrap => BOOTSTRAP_SEGMENT,
            RunContext::Run(timestamp) => timestamp,
        }
    }
}

/// Key of one staged table snapshot.
pub fn staged_table_key(staging_area: &str, run: &RunContext, table: &str) -> String {
    format!("{staging_area}/{INGESTED_DIR}/{}/{table}.csv", run.segment())
}

/// Key of a run's completion marker. It shares the run prefix and its body
/// is what [`crate::watermark::WatermarkStore::promote`] copies forward.
pub fn run_marker_key(staging_area: &str, run: &RunContext) -> String {
    format!(
        "{staging_area}/{INGESTED_DIR}/{}/{MARKER_FILE}",
        run.segment()
    )
}

/// Writes per-run table snapshots and the run completion marker.
#[derive(Debug, Clone)]
pub struct StagingWriter<S> {
    store: S,
    staging_area: String,
}

impl<S: ObjectStore> StagingWriter<S> {
    pub fn new(store: S, staging_area: impl Into<String>) -> Self {
        Self {
            store,
            staging_area: staging_area.into(),
        }
    }

    /// Serializes one table's changed rows at its run-scoped key.
    pub async fn write_table(&self, run: &RunContext, table: &TableData) -> PipelineResult<String> {
        let key = staged_table_key(&self.staging_area, run, table.name());
        let body = table_to_csv(table)?;
        self.store.put_object(&key, body.into()).await?;

        info!(key = %key, rows = table.len(), "staged table snapshot");
        Ok(key)
    }

    /// Writes the run completion marker recording the extraction start time.
    ///
    /// The marker records the real start time even for the bootstrap run:
    /// the dump is complete as of that instant, so promoting it keeps the
    /// next run incremental instead of re-dumping the full history.
    pub async fn finish_run(
        &self,
        run: &RunContext,
        started_at: NaiveDateTime,
    ) -> PipelineResult<()> {
        let key = run_marker_key(&self.staging_area, run);
        let body = format!(
            "last_ran_at\n{}\n",
            started_at.format(TIMESTAMP_FORMAT)
        );
        self.store.put_object(&key, body.into_bytes().into()).await
    }
}

/// Encodes a table as CSV: header row of column names, then one record per
/// row with nulls as empty fields.
pub fn table_to_csv(table: &TableData) -> PipelineResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer.write_record(table.columns()).map_err(|err| {
        pipeline_error!(
            ErrorKind::SerializationError,
            "failed to encode csv header",
            table.name(),
            source: err
        )
    })?;

    for row in table.rows() {
        let fields: Vec<String> = row.values().iter().map(Cell::to_csv_field).collect();
        writer.write_record(&fields).map_err(|err| {
            pipeline_error!(
                ErrorKind::SerializationError,
                "failed to encode csv row",
                table.name(),
                source: err
            )
        })?;
    }

    writer.into_inner().map_err(|err| {
        pipeline_error!(
            ErrorKind::SerializationError,
            "failed to finish csv encoding",
            table.name(),
            source: err
        )
    })
}

/// Decodes a staged CSV body back into a table, inferring cell types per
/// field.
pub fn table_from_csv(name: &str, body: &[u8]) -> PipelineResult<TableData> {
    let mut reader = csv::Reader::from_reader(body);

    let columns: Vec<String> = reader
        .headers()
        .map_err(|err| {
            pipeline_error!(
                ErrorKind::DeserializationError,
                "failed to read csv header",
                name,
                source: err
            )
        })?
        .iter()
        .map(|column| column.to_string())
        .collect();

    let mut table = TableData::new(name, columns);
    for record in reader.records() {
        let record = record.map_err(|err| {
            pipeline_error!(
                ErrorKind::DeserializationError,
                "failed to read csv row",
                name,
                source: err
            )
        })?;
        let values = record.iter().map(Cell::from_csv_field).collect();
        table.push_row(TableRow::new(values))?;
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryObjectStore;
    use crate::types::parse_timestamp;

    fn currency() -> TableData {
        TableData::with_rows(
            "currency",
            vec!["currency_id".into(), "currency_code".into()],
            vec![
                TableRow::new(vec![Cell::I64(1), Cell::String("GBP".into())]),
                TableRow::new(vec![Cell::I64(2), Cell::String("USD".into())]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn bootstrap_and_incremental_resolve_to_distinct_segments() {
        let started_at = parse_timestamp("2024-05-20 12:10:03.998128").unwrap();

        let bootstrap = RunContext::for_extraction(&Watermark::Epoch, started_at);
        assert_eq!(bootstrap.segment(), "original_data_dump");

        let previous = Watermark::At(parse_timestamp("2024-05-19 00:00:00").unwrap());
        let incremental = RunContext::for_extraction(&previous, started_at);
        assert_eq!(incremental.segment(), "2024-05-20 12:10:03.998128");
    }

    #[test]
    fn csv_round_trips_rows_and_nulls() {
        let mut table = currency();
        table
            .push_row(TableRow::new(vec![Cell::I64(3), Cell::Null]))
            .unwrap();

        let body = table_to_csv(&table).unwrap();
        let restored = table_from_csv("currency", &body).unwrap();

        assert_eq!(restored, table);
    }

    #[tokio::test]
    async fn staged_reads_are_idempotent() {
        let store = MemoryObjectStore::new();
        let writer = StagingWriter::new(store.clone(), "staging");
        let run = RunContext::Bootstrap;

        let key = writer.write_table(&run, &currency()).await.unwrap();
        assert_eq!(key, "staging/ingested_data/original_data_dump/currency.csv");

        let first = store.get_object(&key).await.unwrap();
        let second = store.get_object(&key).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn run_marker_records_the_start_time() {
        let store = MemoryObjectStore::new();
        let writer = StagingWriter::new(store.clone(), "staging");
        let run = RunContext::Bootstrap;
        let started_at = parse_timestamp("2024-05-20 12:10:03.998128").unwrap();

        writer.finish_run(&run, started_at).await.unwrap();

        let marker = store
            .get_object("staging/ingested_data/original_data_dump/last_ran_at.csv")
            .await
            .unwrap();
        let text = String::from_utf8(marker.to_vec()).unwrap();
        assert_eq!(text.lines().nth(1), Some("2024-05-20 12:10:03.998128"));
    }
}
