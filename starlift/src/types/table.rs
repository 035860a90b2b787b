//! Named-column tabular data moved between pipeline stages.

use std::collections::HashMap;

use crate::error::{ErrorKind, PipelineResult};
use crate::types::Cell;
use crate::{bail, pipeline_error};

/// A complete row of data from a source or derived table.
///
/// Values are ordered to match the owning [`TableData`]'s column order.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    values: Vec<Cell>,
}

impl TableRow {
    pub fn new(values: Vec<Cell>) -> Self {
        Self { values }
    }

    /// Returns the row values in table column order.
    pub fn values(&self) -> &[Cell] {
        &self.values
    }

    /// Consumes the row and returns its values in table column order.
    pub fn into_values(self) -> Vec<Cell> {
        self.values
    }
}

/// A named table: column names plus rows, the unit every stage passes along.
///
/// The mutating operations below are the vocabulary the per-entity
/// transforms are written in: dropping audit columns, renaming identifiers,
/// appending derived columns and projecting to a fixed output order.
#[derive(Debug, Clone, PartialEq)]
pub struct TableData {
    name: String,
    columns: Vec<String>,
    rows: Vec<TableRow>,
}

impl TableData {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Builds a table and validates that every row matches the column count.
    pub fn with_rows(
        name: impl Into<String>,
        columns: Vec<String>,
        rows: Vec<TableRow>,
    ) -> PipelineResult<Self> {
        let mut table = Self::new(name, columns);
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Appends a row, rejecting width mismatches.
    pub fn push_row(&mut self, row: TableRow) -> PipelineResult<()> {
        if row.values().len() != self.columns.len() {
            bail!(
                ErrorKind::MalformedInput,
                "row width does not match table columns",
                format!(
                    "table `{}` has {} columns, row has {} values",
                    self.name,
                    self.columns.len(),
                    row.values().len()
                )
            );
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Resolves a column index, failing with [`ErrorKind::MalformedInput`]
    /// when the column is absent.
    pub fn require_column(&self, column: &str) -> PipelineResult<usize> {
        self.column_index(column).ok_or_else(|| {
            pipeline_error!(
                ErrorKind::MalformedInput,
                "column missing from table",
                format!("table `{}` has no column `{column}`", self.name)
            )
        })
    }

    /// Returns the cell at a row/column position.
    pub fn value(&self, row: usize, column_index: usize) -> &Cell {
        &self.rows[row].values[column_index]
    }

    /// Drops the named columns from every row. All of them must exist.
    pub fn drop_columns(&mut self, columns: &[&str]) -> PipelineResult<()> {
        let mut indices = Vec::with_capacity(columns.len());
        for column in columns {
            indices.push(self.require_column(column)?);
        }
        indices.sort_unstable();

        for index in indices.iter().rev() {
            self.columns.remove(*index);
            for row in &mut self.rows {
                row.values.remove(*index);
            }
        }
        Ok(())
    }

    pub fn rename_column(&mut self, from: &str, to: &str) -> PipelineResult<()> {
        let index = self.require_column(from)?;
        self.columns[index] = to.to_string();
        Ok(())
    }

    /// Appends a derived column. The value count must match the row count.
    pub fn add_column(&mut self, name: impl Into<String>, values: Vec<Cell>) -> PipelineResult<()> {
        let name = name.into();
        if values.len() != self.rows.len() {
            bail!(
                ErrorKind::MalformedInput,
                "derived column length does not match row count",
                format!(
                    "table `{}`: column `{name}` has {} values for {} rows",
                    self.name,
                    values.len(),
                    self.rows.len()
                )
            );
        }

        self.columns.push(name);
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.values.push(value);
        }
        Ok(())
    }

    /// Projects the table onto the given column order, dropping everything
    /// else. Every requested column must exist.
    pub fn select(&self, order: &[&str]) -> PipelineResult<TableData> {
        let mut indices = Vec::with_capacity(order.len());
        for column in order {
            indices.push(self.require_column(column)?);
        }

        let columns = order.iter().map(|c| c.to_string()).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| TableRow::new(indices.iter().map(|i| row.values[*i].clone()).collect()))
            .collect();

        Ok(TableData {
            name: self.name.clone(),
            columns,
            rows,
        })
    }

    /// Builds an integer-keyed lookup from a column to row indices, the
    /// hash-join side of the dimension denormalizations. Duplicate keys keep
    /// the last row, matching a snapshot where later rows supersede earlier
    /// ones.
    pub fn index_by(&self, column: &str) -> PipelineResult<HashMap<i64, usize>> {
        let key = self.require_column(column)?;
        let mut index = HashMap::with_capacity(self.rows.len());
        for (position, row) in self.rows.iter().enumerate() {
            let value = row.values[key].as_i64().ok_or_else(|| {
                pipeline_error!(
                    ErrorKind::MalformedInput,
                    "join key is not an integer",
                    format!("table `{}`, column `{column}`, row {position}", self.name)
                )
            })?;
            index.insert(value, position);
        }
        Ok(index)
    }
}
