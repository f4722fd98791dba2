//! Spreadsheet writers
//!
//! Two engines render the same single-sheet layout:
//! - [`StyledWriter`]: styled header row, frozen header, autofilter
//! - [`PlainWriter`]: no header styling, widths sized from the data
//!
//! The engine is picked once, up front, by [`SheetWriter::probe`]. The styled
//! engine exists only when the `styled` feature is compiled in.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use rust_xlsxwriter::{Format, Worksheet, XlsxError};
use tracing::{debug, info, warn};

use crate::config::{EnginePreference, ExportConfig};
use crate::error::{Result, WriteError};

use super::table::{CellValue, Table};

pub mod plain;
#[cfg(feature = "styled")]
pub mod styled;

pub use plain::PlainWriter;
#[cfg(feature = "styled")]
pub use styled::StyledWriter;

/// Narrowest column width
pub const MIN_COLUMN_WIDTH: usize = 15;

/// Widest column width
pub const MAX_COLUMN_WIDTH: usize = 50;

/// Data rows that fit below the header on one sheet
pub const MAX_DATA_ROWS: u64 = 1_048_575;

/// Columns on one sheet
pub const MAX_COLUMNS: usize = 16_384;

/// Characters one cell can hold; longer text is cut to this length
pub const MAX_CELL_CHARS: usize = 32_767;

/// Largest magnitude an Excel number holds without rounding (2^53)
const MAX_EXACT_INT: u64 = 1 << 53;

/// Column width for content of `len` characters, clamped to `[15, 50]`
pub fn column_width(len: usize) -> usize {
    len.clamp(MIN_COLUMN_WIDTH, MAX_COLUMN_WIDTH)
}

/// The generated file and what went into it
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub generated_at: DateTime<Local>,
    pub row_count: u64,
    /// Text cells cut to [`MAX_CELL_CHARS`]
    pub truncated_cells: u64,
    pub engine: &'static str,
}

/// The engine chosen for this run
#[derive(Debug, Clone)]
pub enum SheetWriter {
    #[cfg(feature = "styled")]
    Styled(StyledWriter),
    Plain(PlainWriter),
}

impl SheetWriter {
    /// Whether the styled engine is compiled in
    pub fn styled_available() -> bool {
        cfg!(feature = "styled")
    }

    /// Pick an engine for `preference`
    pub fn probe(preference: EnginePreference, sheet_name: &str) -> Self {
        match preference {
            EnginePreference::Plain => SheetWriter::Plain(PlainWriter::new(sheet_name)),
            EnginePreference::Auto | EnginePreference::Styled => {
                #[cfg(feature = "styled")]
                {
                    SheetWriter::Styled(StyledWriter::new(sheet_name))
                }
                #[cfg(not(feature = "styled"))]
                {
                    if preference == EnginePreference::Styled {
                        warn!("Styled engine not available, using plain engine");
                    }
                    SheetWriter::Plain(PlainWriter::new(sheet_name))
                }
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            #[cfg(feature = "styled")]
            SheetWriter::Styled(_) => "styled",
            SheetWriter::Plain(_) => "plain",
        }
    }

    /// Render `table` into a workbook at `path`
    ///
    /// Returns the number of text cells that had to be truncated.
    pub fn render(&self, table: &Table, path: &Path) -> std::result::Result<u64, WriteError> {
        match self {
            #[cfg(feature = "styled")]
            SheetWriter::Styled(w) => w.render(table, path),
            SheetWriter::Plain(w) => w.render(table, path),
        }
    }
}

/// Names, places and renders the export file
#[derive(Debug, Clone)]
pub struct SpreadsheetWriter {
    engine: SheetWriter,
    output_dir: PathBuf,
    file_prefix: String,
    extension: String,
}

impl SpreadsheetWriter {
    pub fn new(engine: SheetWriter, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            output_dir: output_dir.into(),
            file_prefix: "afiliados_export".to_string(),
            extension: "xlsx".to_string(),
        }
    }

    /// Build from export configuration, probing the engine
    pub fn from_config(config: &ExportConfig) -> Self {
        let engine = SheetWriter::probe(config.engine, &config.sheet_name);
        Self {
            engine,
            output_dir: config.output_dir.clone(),
            file_prefix: config.file_prefix.clone(),
            extension: config.extension.clone(),
        }
    }

    pub fn engine(&self) -> &SheetWriter {
        &self.engine
    }

    /// `<prefix>_<rootKey>_<YYYYMMDD_HHMMSS>.<ext>`
    pub fn file_name(&self, root_key: &str, at: &DateTime<Local>) -> String {
        export_file_name(&self.file_prefix, root_key, at, &self.extension)
    }

    /// Write `table` and return the artifact
    ///
    /// The workbook is rendered to `<name>.partial` and renamed when
    /// complete; on failure the partial file is removed.
    pub fn write(&self, table: &Table, root_key: &str) -> Result<ExportArtifact> {
        self.write_at(table, root_key, Local::now())
    }

    fn write_at(
        &self,
        table: &Table,
        root_key: &str,
        generated_at: DateTime<Local>,
    ) -> Result<ExportArtifact> {
        if table.row_count() > MAX_DATA_ROWS || table.column_count() > MAX_COLUMNS {
            return Err(WriteError::SheetLimit {
                rows: table.row_count(),
                columns: table.column_count(),
            }
            .into());
        }

        fs::create_dir_all(&self.output_dir).map_err(|e| io_error(&self.output_dir, e))?;

        let path = self.output_dir.join(self.file_name(root_key, &generated_at));
        let partial = partial_path(&path);
        debug!(
            "Rendering {} rows with {} engine to {}",
            table.row_count(),
            self.engine.name(),
            partial.display()
        );

        let truncated_cells = match self.engine.render(table, &partial) {
            Ok(n) => n,
            Err(e) => {
                discard(&partial);
                return Err(e.into());
            }
        };
        if let Err(e) = fs::rename(&partial, &path) {
            discard(&partial);
            return Err(io_error(&path, e).into());
        }

        let size_bytes = fs::metadata(&path).map_err(|e| io_error(&path, e))?.len();
        info!("Wrote {} ({} bytes)", path.display(), size_bytes);

        Ok(ExportArtifact {
            path,
            size_bytes,
            generated_at,
            row_count: table.row_count(),
            truncated_cells,
            engine: self.engine.name(),
        })
    }
}

/// `<prefix>_<rootKey>_<YYYYMMDD_HHMMSS>.<ext>`, with the key made file-name safe
pub fn export_file_name(prefix: &str, root_key: &str, at: &DateTime<Local>, ext: &str) -> String {
    format!(
        "{}_{}_{}.{}",
        prefix,
        sanitize_key(root_key),
        at.format("%Y%m%d_%H%M%S"),
        ext
    )
}

fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

fn discard(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!("Could not remove {}: {}", path.display(), e);
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> WriteError {
    WriteError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Number formats shared by both engines
pub(crate) struct CellFormats {
    date: Format,
    time: Format,
    datetime: Format,
}

impl CellFormats {
    pub(crate) fn new() -> Self {
        Self {
            date: Format::new().set_num_format("yyyy-mm-dd"),
            time: Format::new().set_num_format("hh:mm:ss"),
            datetime: Format::new().set_num_format("yyyy-mm-dd hh:mm:ss"),
        }
    }
}

/// Write data rows below the header, one native value per cell
///
/// Returns the number of text cells truncated to [`MAX_CELL_CHARS`].
pub(crate) fn write_rows(
    worksheet: &mut Worksheet,
    table: &Table,
    formats: &CellFormats,
) -> std::result::Result<u64, XlsxError> {
    let mut truncated = 0;
    for (index, row) in table.rows().iter().enumerate() {
        let r = index as u32 + 1;
        for (c, value) in row.iter().enumerate() {
            if write_cell(worksheet, r, c as u16, value, formats)? {
                warn!(
                    "Text in row {} column '{}' cut to {} characters",
                    r,
                    table.columns()[c],
                    MAX_CELL_CHARS
                );
                truncated += 1;
            }
        }
    }
    Ok(truncated)
}

/// Write one value; `true` when text was truncated

fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: &CellValue,
    formats: &CellFormats,
) -> std::result::Result<bool, XlsxError> {
    match value {
        CellValue::Null => {}
        CellValue::Bool(b) => {
            worksheet.write_boolean(row, col, *b)?;
        }
        CellValue::Int(i) if i.unsigned_abs() > MAX_EXACT_INT => {
            worksheet.write_string(row, col, i.to_string())?;
        }
        CellValue::Int(i) => {
            worksheet.write_number(row, col, *i as f64)?;
        }
        CellValue::Float(f) | CellValue::Decimal(f) => {
            worksheet.write_number(row, col, *f)?;
        }
        CellValue::Text(s) => match s.char_indices().nth(MAX_CELL_CHARS) {
            Some((end, _)) => {
                worksheet.write_string(row, col, &s[..end])?;
                return Ok(true);
            }
            None => {
                worksheet.write_string(row, col, s.as_str())?;
            }
        },
        CellValue::Date(d) => {
            worksheet.write_datetime_with_format(row, col, d, &formats.date)?;
        }
        CellValue::Time(t) => {
            worksheet.write_datetime_with_format(row, col, t, &formats.time)?;
        }
        CellValue::DateTime(dt) => {
            worksheet.write_datetime_with_format(row, col, dt, &formats.datetime)?;
        }
        CellValue::Bytes(b) => {
            worksheet.write_string(row, col, hex::encode(b))?;
        }
    }
    Ok(false)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;

    use calamine::{Data, Reader, Xlsx, open_workbook};

    /// Read a sheet back as strings
    pub fn read_sheet(path: &Path, sheet: &str) -> Vec<Vec<String>> {
        let mut workbook: Xlsx<_> = open_workbook(path).unwrap();
        let range = workbook.worksheet_range(sheet).unwrap();
        range
            .rows()
            .map(|row| {
                row.iter()
                    .map(|cell| match cell {
                        Data::Empty => String::new(),
                        other => other.to_string(),
                    })
                    .collect()
            })
            .collect()
    }
}
