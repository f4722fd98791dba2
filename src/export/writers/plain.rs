//! Plain workbook engine
//!
//! No header styling. Each column is sized from the longest of its header
//! and its values, within the same bounds as the styled engine.

use std::path::Path;

use rust_xlsxwriter::Workbook;

use crate::error::WriteError;
use crate::export::table::Table;

use super::{CellFormats, column_width, write_rows};

/// Fallback engine
#[derive(Debug, Clone)]
pub struct PlainWriter {
    sheet_name: String,
}

impl PlainWriter {
    pub fn new(sheet_name: impl Into<String>) -> Self {
        Self {
            sheet_name: sheet_name.into(),
        }
    }

    /// Render `table` to `path`
    pub fn render(&self, table: &Table, path: &Path) -> Result<u64, WriteError> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&self.sheet_name)?;

        for (c, name) in table.columns().iter().enumerate() {
            let col = c as u16;
            worksheet.write_string(0, col, name.as_str())?;
            worksheet.set_column_width(col, column_width(content_len(table, c)) as f64)?;
        }

        let truncated = write_rows(worksheet, table, &CellFormats::new())?;
        workbook.save(path)?;
        Ok(truncated)
    }
}

/// Longest of the header and every value in column `index`
fn content_len(table: &Table, index: usize) -> usize {
    let header = table.columns()[index].chars().count();
    table
        .rows()
        .iter()
        .filter_map(|row| row.get(index))
        .map(|cell| cell.display_len())
        .fold(header, usize::max)
}
