//! Generated calendar dimension.

use chrono::{Datelike, NaiveDate};

use crate::error::{ErrorKind, PipelineResult};
use crate::pipeline_error;
use crate::staging::RunContext;
use crate::types::{Cell, TableData, TableRow};

use super::TransformOutput;

/// Inclusive range the calendar covers. Wide enough to key every date the
/// operational data carries, including agreed delivery dates in the future.
pub const CALENDAR_START: &str = "2020-01-01";
pub const CALENDAR_END: &str = "2030-01-01";

/// `dim_date`: generated once, on the bootstrap run. The calendar has no
/// staged input and never changes, so incremental runs report it as already
/// current instead of rewriting an identical table.
pub fn calendar(run: &RunContext, _inputs: &[TableData]) -> PipelineResult<TransformOutput> {
    if !run.is_bootstrap() {
        return Ok(TransformOutput::AlreadyCurrent);
    }

    let start = parse_date(CALENDAR_START)?;
    let end = parse_date(CALENDAR_END)?;
    Ok(TransformOutput::Table(build_calendar(start, end)?))
}

/// Builds the calendar rows for every date in `start..=end`.
pub fn build_calendar(start: NaiveDate, end: NaiveDate) -> PipelineResult<TableData> {
    let columns = [
        "date_id",
        "year",
        "month",
        "day",
        "day_of_week",
        "day_name",
        "month_name",
        "quarter",
    ]
    .into_iter()
    .map(String::from)
    .collect();
    let mut table = TableData::new("dim_date", columns);

    let mut date = start;
    while date <= end {
        let row = TableRow::new(vec![
            Cell::Date(date),
            Cell::I64(i64::from(date.year())),
            Cell::I64(i64::from(date.month())),
            Cell::I64(i64::from(date.day())),
            // ISO numbering, Monday = 1.
            Cell::I64(i64::from(date.weekday().number_from_monday())),
            Cell::String(date.format("%A").to_string()),
            Cell::String(date.format("%B").to_string()),
            Cell::I64(i64::from((date.month() - 1) / 3 + 1)),
        ]);
        table.push_row(row)?;
        date = date.succ_opt().ok_or_else(|| {
            pipeline_error!(ErrorKind::InvalidState, "calendar ran off the end of time")
        })?;
    }

    Ok(table)
}

fn parse_date(text: &str) -> PipelineResult<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|err| {
        pipeline_error!(
            ErrorKind::InvalidState,
            "calendar bound is not a date",
            text,
            source: err
        )
    })
}
