/*!
 * Output dataset writer.
 *
 * Single writer, append-only semantics: terminal rows are appended in
 * completion order and flushed per record so partial progress survives a
 * crash. Opening a writer over an existing output compacts it to the rows
 * retained by resume, which keeps the one-row-per-id invariant when a
 * previously failed record is retried.
 *
 * CSV appends are true file appends. XLSX has no appendable form, so the
 * workbook is rewritten from the retained rows on every flush.
 */

use std::fs::File;
use std::path::{Path, PathBuf};

use rust_xlsxwriter::Workbook;

use crate::errors::DatasetError;
use crate::file_utils::FileManager;

use super::reader::DatasetFormat;
use super::record::OutputRow;

const HEADER: [&str; 5] = ["id", "raw", "edit", "status", "reason"];

enum Sink {
    Csv { writer: csv::Writer<File> },
    Xlsx { rows: Vec<OutputRow> },
}

/// Append-in-completion-order sink for terminal rows
pub struct OutputWriter {
    path: PathBuf,
    sink: Sink,
    appended: u64,
}

impl OutputWriter {
    /// Create (or compact) the output at `path`, seeding it with the rows a
    /// resume pass decided to keep. The file is rewritten from scratch:
    /// dropped rows (previous failures) do not survive.
    pub fn create(path: &Path, retained: Vec<OutputRow>) -> Result<Self, DatasetError> {
        let format = DatasetFormat::detect(path)?;
        if let Some(parent) = path.parent() {
            FileManager::ensure_dir(parent)?;
        }

        let sink = match format {
            DatasetFormat::Csv => {
                let file = File::create(path)?;
                let mut writer = csv::WriterBuilder::new()
                    .delimiter(DatasetFormat::delimiter(path))
                    .from_writer(file);
                writer.write_record(HEADER).map_err(csv_io)?;
                for row in &retained {
                    write_csv_row(&mut writer, row)?;
                }
                writer.flush()?;
                Sink::Csv { writer }
            }
            DatasetFormat::Xlsx => {
                write_workbook(path, &retained)?;
                Sink::Xlsx { rows: retained }
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            sink,
            appended: 0,
        })
    }

    /// Append one terminal row and flush it to disk
    pub fn append(&mut self, row: OutputRow) -> Result<(), DatasetError> {
        match &mut self.sink {
            Sink::Csv { writer } => {
                write_csv_row(writer, &row)?;
                writer.flush()?;
            }
            Sink::Xlsx { rows } => {
                rows.push(row);
                write_workbook(&self.path, rows)?;
            }
        }
        self.appended += 1;
        Ok(())
    }

    /// Rows appended by this writer (retained rows excluded)
    pub fn appended(&self) -> u64 {
        self.appended
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn csv_io(e: csv::Error) -> DatasetError {
    DatasetError::Io(std::io::Error::other(e))
}

fn write_csv_row(writer: &mut csv::Writer<File>, row: &OutputRow) -> Result<(), DatasetError> {
    writer
        .write_record([
            row.id.to_string().as_str(),
            row.raw.as_str(),
            row.edit.as_str(),
            row.status.as_str(),
            row.reason.as_deref().unwrap_or(""),
        ])
        .map_err(csv_io)
}

fn write_workbook(path: &Path, rows: &[OutputRow]) -> Result<(), DatasetError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();

    for (col, name) in HEADER.iter().enumerate() {
        worksheet
            .write_string(0, col as u16, *name)
            .map_err(xlsx_io)?;
    }
    for (i, row) in rows.iter().enumerate() {
        let r = (i + 1) as u32;
        worksheet.write_number(r, 0, row.id as f64).map_err(xlsx_io)?;
        worksheet.write_string(r, 1, &row.raw).map_err(xlsx_io)?;
        worksheet.write_string(r, 2, &row.edit).map_err(xlsx_io)?;
        worksheet
            .write_string(r, 3, row.status.as_str())
            .map_err(xlsx_io)?;
        worksheet
            .write_string(r, 4, row.reason.as_deref().unwrap_or(""))
            .map_err(xlsx_io)?;
    }

    workbook.save(path).map_err(xlsx_io)?;
    Ok(())
}

fn xlsx_io(e: rust_xlsxwriter::XlsxError) -> DatasetError {
    DatasetError::Io(std::io::Error::other(e))
}
