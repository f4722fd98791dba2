//! Styled workbook engine
//!
//! Bold, wrapped, top-aligned header cells on a light green fill with thin
//! borders. Column widths follow the header length. The header row is
//! frozen and carries an autofilter.

use std::path::Path;

use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook};

use crate::error::WriteError;
use crate::export::table::Table;

use super::{CellFormats, column_width, write_rows};

const HEADER_FILL: u32 = 0xD7E4BC;

/// Primary engine
#[derive(Debug, Clone)]
pub struct StyledWriter {
    sheet_name: String,
}

impl StyledWriter {
    pub fn new(sheet_name: impl Into<String>) -> Self {
        Self {
            sheet_name: sheet_name.into(),
        }
    }

    fn header_format() -> Format {
        Format::new()
            .set_bold()
            .set_text_wrap()
            .set_align(FormatAlign::Top)
            .set_background_color(Color::RGB(HEADER_FILL))
            .set_border(FormatBorder::Thin)
    }

    /// Render `table` to `path`
    ///
    /// # Arguments
    /// * `table` - Columns and rows to write
    /// * `path` - Destination file, overwritten if present
    ///
    /// # Returns
    /// * `Result<u64, WriteError>` - Text cells truncated, or engine/I/O error
    pub fn render(&self, table: &Table, path: &Path) -> Result<u64, WriteError> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&self.sheet_name)?;

        let header = Self::header_format();
        for (c, name) in table.columns().iter().enumerate() {
            let col = c as u16;
            worksheet.write_string_with_format(0, col, name.as_str(), &header)?;
            worksheet.set_column_width(col, column_width(name.chars().count()) as f64)?;
        }

        let truncated = write_rows(worksheet, table, &CellFormats::new())?;

        if !table.columns().is_empty() {
            let last_col = (table.column_count() - 1) as u16;
            worksheet.autofilter(0, 0, table.row_count() as u32, last_col)?;
            worksheet.set_freeze_panes(1, 0)?;
        }

        workbook.save(path)?;
        Ok(truncated)
    }
}
