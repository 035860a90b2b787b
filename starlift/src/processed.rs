//! Columnar encoding of transformed tables into the processed area.
//!
//! Staged CSV is untyped, so this is where authoritative typing happens:
//! each column's arrow type is inferred from its cells, with text as the
//! fallback for anything ambiguous. The processed layout mirrors the staging
//! layout, one `{processed_area}/{segment}/{entity}.parquet` object per
//! entity per run.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Date32Array, Float64Array, Int64Array, StringArray,
    Time64MicrosecondArray, TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{Duration, NaiveDate, NaiveTime};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use tracing::info;

use crate::error::{ErrorKind, PipelineResult};
use crate::pipeline_error;
use crate::staging::RunContext;
use crate::store::ObjectStore;
use crate::types::{Cell, TableData, TableRow};

/// Key of one processed entity table.
pub fn processed_table_key(processed_area: &str, run: &RunContext, entity: &str) -> String {
    format!("{processed_area}/{}/{entity}.parquet", run.segment())
}

/// Writes warehouse-ready tables as parquet objects in the processed area.
#[derive(Debug, Clone)]
pub struct ProcessedWriter<S> {
    store: S,
    processed_area: String,
}

impl<S: ObjectStore> ProcessedWriter<S> {
    pub fn new(store: S, processed_area: impl Into<String>) -> Self {
        Self {
            store,
            processed_area: processed_area.into(),
        }
    }

    /// Encodes and stores one entity table under its run-scoped key.
    pub async fn write_table(&self, run: &RunContext, table: &TableData) -> PipelineResult<String> {
        let key = processed_table_key(&self.processed_area, run, table.name());
        let body = table_to_parquet(table)?;
        self.store.put_object(&key, body.into()).await?;

        info!(key = %key, rows = table.len(), "wrote processed table");
        Ok(key)
    }
}

/// Encodes a table as a single-row-group parquet file.
pub fn table_to_parquet(table: &TableData) -> PipelineResult<Vec<u8>> {
    let mut fields = Vec::with_capacity(table.columns().len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(table.columns().len());

    for (index, column) in table.columns().iter().enumerate() {
        let data_type = infer_column_type(table, index);
        let array = build_array(table, index, &data_type)?;
        fields.push(Field::new(column, data_type, true));
        arrays.push(array);
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), arrays).map_err(|err| {
        pipeline_error!(
            ErrorKind::SerializationError,
            "failed to assemble record batch",
            table.name(),
            source: err
        )
    })?;

    let mut buffer = Vec::new();
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(&mut buffer, schema, Some(props)).map_err(|err| {
        pipeline_error!(
            ErrorKind::SerializationError,
            "failed to create parquet writer",
            table.name(),
            source: err
        )
    })?;
    writer.write(&batch).map_err(|err| {
        pipeline_error!(
            ErrorKind::SerializationError,
            "failed to write record batch",
            table.name(),
            source: err
        )
    })?;
    writer.close().map_err(|err| {
        pipeline_error!(
            ErrorKind::SerializationError,
            "failed to finish parquet file",
            table.name(),
            source: err
        )
    })?;

    Ok(buffer)
}

/// Decodes a processed parquet body back into a table.
pub fn table_from_parquet(name: &str, body: bytes::Bytes) -> PipelineResult<TableData> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(body).map_err(|err| {
        pipeline_error!(
            ErrorKind::DeserializationError,
            "failed to open parquet body",
            name,
            source: err
        )
    })?;
    let columns = builder
        .schema()
        .fields()
        .iter()
        .map(|field| field.name().clone())
        .collect();
    let reader = builder.build().map_err(|err| {
        pipeline_error!(
            ErrorKind::DeserializationError,
            "failed to build parquet reader",
            name,
            source: err
        )
    })?;

    let mut table = TableData::new(name, columns);
    for batch in reader {
        let batch = batch.map_err(|err| {
            pipeline_error!(
                ErrorKind::DeserializationError,
                "failed to read record batch",
                name,
                source: err
            )
        })?;
        append_batch(&mut table, &batch)?;
    }

    Ok(table)
}

/// Picks the narrowest arrow type every non-null cell of a column fits.
fn infer_column_type(table: &TableData, column: usize) -> DataType {
    let mut inferred: Option<DataType> = None;

    for row in table.rows() {
        let cell_type = match &row.values()[column] {
            Cell::Null => continue,
            Cell::Bool(_) => DataType::Boolean,
            Cell::I64(_) => DataType::Int64,
            Cell::F64(_) => DataType::Float64,
            Cell::String(_) => DataType::Utf8,
            Cell::Date(_) => DataType::Date32,
            Cell::Time(_) => DataType::Time64(TimeUnit::Microsecond),
            Cell::Timestamp(_) => DataType::Timestamp(TimeUnit::Microsecond, None),
        };

        inferred = Some(match inferred {
            None => cell_type,
            Some(current) if current == cell_type => current,
            // Integers widen to floats; any other mix degrades to text.
            Some(DataType::Int64) if cell_type == DataType::Float64 => DataType::Float64,
            Some(DataType::Float64) if cell_type == DataType::Int64 => DataType::Float64,
            Some(_) => DataType::Utf8,
        });
    }

    inferred.unwrap_or(DataType::Utf8)
}

fn build_array(table: &TableData, column: usize, data_type: &DataType) -> PipelineResult<ArrayRef> {
    let cells = table.rows().iter().map(|row| &row.values()[column]);

    let array: ArrayRef = match data_type {
        DataType::Boolean => {
            let values: Vec<Option<bool>> = cells
                .map(|cell| match cell {
                    Cell::Bool(value) => Some(*value),
                    _ => None,
                })
                .collect();
            Arc::new(BooleanArray::from(values))
        }
        DataType::Int64 => {
            let values: Vec<Option<i64>> = cells.map(Cell::as_i64).collect();
            Arc::new(Int64Array::from(values))
        }
        DataType::Float64 => {
            let values: Vec<Option<f64>> = cells
                .map(|cell| match cell {
                    Cell::F64(value) => Some(*value),
                    Cell::I64(value) => Some(*value as f64),
                    _ => None,
                })
                .collect();
            Arc::new(Float64Array::from(values))
        }
        DataType::Date32 => {
            let values: Vec<Option<i32>> = cells
                .map(|cell| match cell {
                    Cell::Date(value) => Some(days_since_epoch(*value)),
                    _ => None,
                })
                .collect();
            Arc::new(Date32Array::from(values))
        }
        DataType::Time64(TimeUnit::Microsecond) => {
            let values: Vec<Option<i64>> = cells
                .map(|cell| match cell {
                    Cell::Time(value) => value
                        .signed_duration_since(NaiveTime::MIN)
                        .num_microseconds(),
                    _ => None,
                })
                .collect();
            Arc::new(Time64MicrosecondArray::from(values))
        }
        DataType::Timestamp(TimeUnit::Microsecond, None) => {
            let values: Vec<Option<i64>> = cells
                .map(|cell| match cell {
                    Cell::Timestamp(value) => Some(value.and_utc().timestamp_micros()),
                    _ => None,
                })
                .collect();
            Arc::new(TimestampMicrosecondArray::from(values))
        }
        _ => {
            let values: Vec<Option<String>> = cells
                .map(|cell| match cell {
                    Cell::Null => None,
                    other => Some(other.to_csv_field()),
                })
                .collect();
            Arc::new(StringArray::from(values))
        }
    };

    Ok(array)
}

fn append_batch(table: &mut TableData, batch: &RecordBatch) -> PipelineResult<()> {
    let mut columns = Vec::with_capacity(batch.num_columns());
    for (field, array) in batch.schema().fields().iter().zip(batch.columns()) {
        columns.push(read_column(table.name(), field.name(), array)?);
    }

    for row in 0..batch.num_rows() {
        let values = columns.iter().map(|column| column[row].clone()).collect();
        table.push_row(TableRow::new(values))?;
    }
    Ok(())
}

fn read_column(table: &str, column: &str, array: &ArrayRef) -> PipelineResult<Vec<Cell>> {
    fn cells<A: Array, T>(
        array: &A,
        value: impl Fn(&A, usize) -> T,
        wrap: impl Fn(T) -> Cell,
    ) -> Vec<Cell> {
        (0..array.len())
            .map(|row| {
                if array.is_null(row) {
                    Cell::Null
                } else {
                    wrap(value(array, row))
                }
            })
            .collect()
    }

    let unsupported = || {
        pipeline_error!(
            ErrorKind::DeserializationError,
            "unsupported parquet column type",
            format!("table `{table}`, column `{column}`, type {}", array.data_type())
        )
    };

    let cells = match array.data_type() {
        DataType::Boolean => {
            let array = array
                .as_any()
                .downcast_ref::<BooleanArray>()
                .ok_or_else(unsupported)?;
            cells(array, |a, i| a.value(i), Cell::Bool)
        }
        DataType::Int64 => {
            let array = array
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(unsupported)?;
            cells(array, |a, i| a.value(i), Cell::I64)
        }
        DataType::Float64 => {
            let array = array
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(unsupported)?;
            cells(array, |a, i| a.value(i), Cell::F64)
        }
        DataType::Utf8 => {
            let array = array
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(unsupported)?;
            cells(array, |a, i| a.value(i).to_string(), Cell::String)
        }
        DataType::Date32 => {
            let array = array
                .as_any()
                .downcast_ref::<Date32Array>()
                .ok_or_else(unsupported)?;
            cells(array, |a, i| date_from_epoch_days(a.value(i)), Cell::Date)
        }
        DataType::Time64(TimeUnit::Microsecond) => {
            let array = array
                .as_any()
                .downcast_ref::<Time64MicrosecondArray>()
                .ok_or_else(unsupported)?;
            cells(
                array,
                |a, i| NaiveTime::MIN + Duration::microseconds(a.value(i)),
                Cell::Time,
            )
        }
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            let array = array
                .as_any()
                .downcast_ref::<TimestampMicrosecondArray>()
                .ok_or_else(unsupported)?;
            cells(
                array,
                |a, i| {
                    chrono::DateTime::from_timestamp_micros(a.value(i))
                        .map(|value| value.naive_utc())
                },
                |value| value.map(Cell::Timestamp).unwrap_or(Cell::Null),
            )
        }
        _ => return Err(unsupported()),
    };

    Ok(cells)
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()
}

fn days_since_epoch(date: NaiveDate) -> i32 {
    date.signed_duration_since(epoch()).num_days() as i32
}

fn date_from_epoch_days(days: i32) -> NaiveDate {
    epoch() + Duration::days(i64::from(days))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryObjectStore;
    use crate::types::parse_timestamp;

    fn mixed_table() -> TableData {
        TableData::with_rows(
            "dim_currency",
            vec![
                "currency_id".into(),
                "currency_code".into(),
                "rate".into(),
                "valid_from".into(),
            ],
            vec![
                TableRow::new(vec![
                    Cell::I64(1),
                    Cell::String("GBP".into()),
                    Cell::F64(1.0),
                    Cell::Timestamp(parse_timestamp("2024-05-20 12:10:03.998128").unwrap()),
                ]),
                TableRow::new(vec![
                    Cell::I64(2),
                    Cell::String("USD".into()),
                    Cell::Null,
                    Cell::Null,
                ]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn parquet_round_trips_typed_columns_and_nulls() {
        let table = mixed_table();
        let body = table_to_parquet(&table).unwrap();
        let restored = table_from_parquet("dim_currency", bytes::Bytes::from(body)).unwrap();

        assert_eq!(restored, table);
    }

    #[test]
    fn integers_mixed_with_floats_widen_to_float() {
        let table = TableData::with_rows(
            "prices",
            vec!["unit_price".into()],
            vec![
                TableRow::new(vec![Cell::I64(3)]),
                TableRow::new(vec![Cell::F64(2.19)]),
            ],
        )
        .unwrap();

        let body = table_to_parquet(&table).unwrap();
        let restored = table_from_parquet("prices", bytes::Bytes::from(body)).unwrap();

        assert_eq!(restored.value(0, 0), &Cell::F64(3.0));
        assert_eq!(restored.value(1, 0), &Cell::F64(2.19));
    }

    #[test]
    fn empty_column_defaults_to_text() {
        let table = TableData::with_rows(
            "sparse",
            vec!["only_nulls".into()],
            vec![TableRow::new(vec![Cell::Null])],
        )
        .unwrap();

        assert_eq!(infer_column_type(&table, 0), DataType::Utf8);
    }

    #[tokio::test]
    async fn writer_places_tables_under_the_run_segment() {
        let store = MemoryObjectStore::new();
        let writer = ProcessedWriter::new(store.clone(), "processed");
        let run = RunContext::Run("2024-05-21 09:00:00.000000".to_string());

        let key = writer.write_table(&run, &mixed_table()).await.unwrap();

        assert_eq!(
            key,
            "processed/2024-05-21 09:00:00.000000/dim_currency.parquet"
        );
        assert!(store.get_object(&key).await.is_ok());
    }
}
