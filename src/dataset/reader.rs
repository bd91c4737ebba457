/*!
 * Input dataset loading.
 *
 * Accepts delimited text (CSV/TSV) and XLSX spreadsheets. Delimited input
 * bytes are decoded through an explicitly declared encoding or, absent one,
 * a detector pass, so legacy exports load without manual conversion.
 * The table must carry `id` and `text` columns; anything less is fatal at
 * job start.
 */

use std::collections::HashSet;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use chardetng::EncodingDetector;
use encoding_rs::Encoding;

use crate::errors::DatasetError;

/// Supported dataset serializations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetFormat {
    /// Delimited text; the delimiter follows the extension (csv or tsv)
    Csv,
    /// XLSX spreadsheet, first worksheet
    Xlsx,
}

impl DatasetFormat {
    /// Detect the serialization from the file extension
    pub fn detect(path: &Path) -> Result<Self, DatasetError> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "csv" | "tsv" | "txt" => Ok(Self::Csv),
            "xlsx" | "xlsm" => Ok(Self::Xlsx),
            other => Err(DatasetError::UnsupportedFormat(format!(
                "{:?} (extension '{}')",
                path, other
            ))),
        }
    }

    /// Column delimiter for delimited text variants
    pub fn delimiter(path: &Path) -> u8 {
        match path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .as_deref()
        {
            Some("tsv") => b'\t',
            _ => b',',
        }
    }
}

/// One input row: a stable identifier and the source text to translate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRecord {
    pub id: u64,
    pub text: String,
}

/// Read the input dataset, validating identifiers along the way.
///
/// `declared_encoding` is an encoding label ("utf-8", "gbk", "shift_jis",
/// ...) for delimited input; when absent the encoding is detected from the
/// raw bytes. Spreadsheets carry their own encoding.
pub fn read_input(
    path: &Path,
    declared_encoding: Option<&str>,
) -> Result<Vec<InputRecord>, DatasetError> {
    let format = DatasetFormat::detect(path)?;
    let records = match format {
        DatasetFormat::Csv => read_delimited(path, declared_encoding)?,
        DatasetFormat::Xlsx => read_spreadsheet(path)?,
    };

    if records.is_empty() {
        return Err(DatasetError::InputFormat(format!(
            "input dataset {:?} contains no rows",
            path
        )));
    }

    // Identity is the id; uniqueness is required within a job
    let mut seen = HashSet::with_capacity(records.len());
    for record in &records {
        if !seen.insert(record.id) {
            return Err(DatasetError::InputFormat(format!(
                "duplicate id {} in input dataset",
                record.id
            )));
        }
    }

    Ok(records)
}

/// Decode raw bytes via the declared encoding, or detect one
fn decode_bytes(bytes: &[u8], declared_encoding: Option<&str>) -> Result<String, DatasetError> {
    let encoding = match declared_encoding {
        Some(label) => Encoding::for_label(label.as_bytes()).ok_or_else(|| {
            DatasetError::InputFormat(format!("unknown encoding label '{}'", label))
        })?,
        None => {
            let mut detector = EncodingDetector::new();
            detector.feed(bytes, true);
            detector.guess(None, true)
        }
    };

    let (decoded, _, had_errors) = encoding.decode(bytes);
    if had_errors && declared_encoding.is_some() {
        return Err(DatasetError::InputFormat(format!(
            "input is not valid {}",
            encoding.name()
        )));
    }
    Ok(decoded.into_owned())
}

fn read_delimited(
    path: &Path,
    declared_encoding: Option<&str>,
) -> Result<Vec<InputRecord>, DatasetError> {
    let bytes = std::fs::read(path)?;
    let decoded = decode_bytes(&bytes, declared_encoding)?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(DatasetFormat::delimiter(path))
        .flexible(true)
        .from_reader(decoded.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| DatasetError::InputFormat(format!("unreadable header row: {}", e)))?
        .clone();
    let id_col = find_column(&headers, "id")?;
    let text_col = find_column(&headers, "text")?;

    let mut records = Vec::new();
    for (row_index, result) in reader.records().enumerate() {
        let row = result
            .map_err(|e| DatasetError::InputFormat(format!("row {}: {}", row_index + 2, e)))?;
        let id = parse_id(row.get(id_col).unwrap_or_default(), row_index)?;
        let text = row.get(text_col).unwrap_or_default().to_string();
        records.push(InputRecord { id, text });
    }
    Ok(records)
}

fn read_spreadsheet(path: &Path) -> Result<Vec<InputRecord>, DatasetError> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| DatasetError::InputFormat(format!("cannot open workbook: {}", e)))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| DatasetError::InputFormat("workbook has no worksheets".to_string()))?
        .map_err(|e| DatasetError::InputFormat(format!("cannot read worksheet: {}", e)))?;

    let mut rows = range.rows();
    let header = rows
        .next()
        .ok_or_else(|| DatasetError::InputFormat("worksheet is empty".to_string()))?;

    let id_col = find_cell_column(header, "id")?;
    let text_col = find_cell_column(header, "text")?;

    let mut records = Vec::new();
    for (row_index, row) in rows.enumerate() {
        let id_cell = row.get(id_col).unwrap_or(&Data::Empty);
        if matches!(id_cell, Data::Empty) {
            continue; // trailing blank rows are common in hand-edited sheets
        }
        let id = parse_id(&cell_to_string(id_cell), row_index)?;
        let text = row.get(text_col).map(cell_to_string).unwrap_or_default();
        records.push(InputRecord { id, text });
    }
    Ok(records)
}

fn find_column(headers: &csv::StringRecord, name: &str) -> Result<usize, DatasetError> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
        .ok_or_else(|| DatasetError::InputFormat(format!("missing required column '{}'", name)))
}

fn find_cell_column(header: &[Data], name: &str) -> Result<usize, DatasetError> {
    header
        .iter()
        .position(|c| cell_to_string(c).trim().eq_ignore_ascii_case(name))
        .ok_or_else(|| DatasetError::InputFormat(format!("missing required column '{}'", name)))
}

fn parse_id(raw: &str, row_index: usize) -> Result<u64, DatasetError> {
    let trimmed = raw.trim();
    // Spreadsheet numeric cells render as floats ("12.0")
    let normalized = trimmed.strip_suffix(".0").unwrap_or(trimmed);
    normalized.parse::<u64>().map_err(|_| {
        DatasetError::InputFormat(format!(
            "row {}: id '{}' is not a non-negative integer",
            row_index + 2,
            raw
        ))
    })
}

pub(crate) fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.as_f64().to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("{:?}", e),
        Data::Empty => String::new(),
    }
}
