//! Core data types shared across pipeline stages.

mod cell;
mod table;

pub use cell::{parse_timestamp, Cell, DATE_FORMAT, TIMESTAMP_FORMAT, TIME_FORMAT};
pub use table::{TableData, TableRow};
