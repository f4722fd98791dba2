//! Row accumulation and table assembly
//!
//! [`RowBuffer`] grows batch by batch while the collector runs. The
//! [`TableBuilder`] consumes it: rows are moved, not copied, so raw rows and
//! the finished [`Table`] are never held at the same time.

use std::collections::HashSet;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::debug;

use crate::error::{BuildError, Result};

/// One native value, passed through from the source untransformed
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Fixed-point value as reported by the source
    Decimal(f64),
    Text(String),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Bytes(Vec<u8>),
}

/// One source row
pub type Row = Vec<CellValue>;

impl CellValue {
    /// Width of the value when shown as text, used for column sizing
    pub fn display_len(&self) -> usize {
        match self {
            CellValue::Null => 0,
            CellValue::Bool(b) => {
                if *b {
                    4
                } else {
                    5
                }
            }
            CellValue::Int(i) => i.to_string().len(),
            CellValue::Float(f) | CellValue::Decimal(f) => f.to_string().len(),
            CellValue::Text(s) => s.chars().count(),
            CellValue::Date(_) => 10,
            CellValue::Time(_) => 8,
            CellValue::DateTime(_) => 19,
            CellValue::Bytes(b) => b.len() * 2,
        }
    }
}

/// Growable accumulation of rows from one result set
#[derive(Debug, Default)]
pub struct RowBuffer {
    rows: Vec<Row>,
    batches: usize,
}

impl RowBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one fetched batch
    pub fn append(&mut self, mut batch: Vec<Row>) {
        self.batches += 1;
        self.rows.append(&mut batch);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of non-empty batches appended
    pub fn batches(&self) -> usize {
        self.batches
    }

    fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

/// Immutable, validated result table
#[derive(Debug)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    /// Column names in descriptor order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row_count(&self) -> u64 {
        self.rows.len() as u64
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

/// Builds a [`Table`] from a descriptor and an accumulated buffer
pub struct TableBuilder;

impl TableBuilder {
    /// Validate and assemble
    ///
    /// Consumes the buffer whether or not the build succeeds.
    ///
    /// # Errors
    /// * [`BuildError::DuplicateColumn`] - a name repeats in the descriptor
    /// * [`BuildError::ArityMismatch`] - a row's length differs from the column count
    pub fn build(columns: Vec<String>, buffer: RowBuffer) -> Result<Table> {
        let mut seen = HashSet::with_capacity(columns.len());
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(BuildError::DuplicateColumn(name.clone()).into());
            }
        }

        let rows = buffer.into_rows();
        let expected = columns.len();
        if let Some((index, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != expected) {
            return Err(BuildError::ArityMismatch {
                row: index + 1,
                expected,
                found: row.len(),
            }
            .into());
        }

        debug!("Built table: {} columns x {} rows", expected, rows.len());
        Ok(Table { columns, rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExportError;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_build_counts_every_batch() {
        let mut buffer = RowBuffer::new();
        buffer.append(vec![vec![CellValue::Int(1), CellValue::Null]; 7]);
        buffer.append(vec![vec![CellValue::Int(2), CellValue::Text("x".into())]; 3]);
        assert_eq!(buffer.batches(), 2);

        let table = TableBuilder::build(cols(&["id", "name"]), buffer).unwrap();
        assert_eq!(table.row_count(), 10);
        assert_eq!(table.columns(), ["id".to_string(), "name".to_string()]);
    }

    #[test]
    fn test_arity_mismatch_reports_row() {
        let mut buffer = RowBuffer::new();
        buffer.append(vec![
            vec![CellValue::Int(1), CellValue::Int(2)],
            vec![CellValue::Int(3)],
        ]);
        let err = TableBuilder::build(cols(&["a", "b"]), buffer).unwrap_err();
        match err {
            ExportError::Build(BuildError::ArityMismatch { row, expected, found }) => {
                assert_eq!((row, expected, found), (2, 2, 1));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let err = TableBuilder::build(cols(&["id", "id"]), RowBuffer::new()).unwrap_err();
        assert!(matches!(err, ExportError::Build(BuildError::DuplicateColumn(ref c)) if c == "id"));
    }

    #[test]
    fn test_display_len() {
        assert_eq!(CellValue::Text("Ñandú".into()).display_len(), 5);
        assert_eq!(CellValue::Int(-120).display_len(), 4);
        assert_eq!(CellValue::Bytes(vec![0xab, 0xcd]).display_len(), 4);
        assert_eq!(CellValue::Null.display_len(), 0);
    }
}
