/*!
 * Resume reconciliation.
 *
 * The persisted output is the only source of truth for what a previous run
 * accomplished. Rows marked done are never redone (no duplicate spend on
 * paid APIs); rows marked failed are dropped so the next run retries them.
 * A damaged or missing output never blocks a run, it only costs redone work.
 */

use std::collections::BTreeSet;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use log::warn;

use crate::errors::DatasetError;

use super::reader::{cell_to_string, DatasetFormat};
use super::record::{OutputRow, RowStatus};

/// What a previous run left behind, reconciled for the next one
#[derive(Debug, Default)]
pub struct ResumeState {
    /// Identifiers already translated; excluded from the pending set
    pub completed: BTreeSet<u64>,
    /// The done rows themselves, re-seeded into the compacted output
    pub retained: Vec<OutputRow>,
    /// Rows that failed last time and will be retried
    pub retriable: u64,
}

/// Loads the existing output dataset, if any, and computes the set of
/// record identifiers already completed.
pub struct ResumeStore;

impl ResumeStore {
    /// Never fails: corruption degrades to a warning and a fresh state.
    pub fn load(path: &Path) -> ResumeState {
        if !path.exists() {
            return ResumeState::default();
        }

        match Self::read_rows(path) {
            Ok(rows) => {
                let mut state = ResumeState::default();
                for row in rows {
                    match row.status {
                        RowStatus::Done => {
                            // First occurrence wins if an older file carries
                            // duplicate ids
                            if state.completed.insert(row.id) {
                                state.retained.push(row);
                            }
                        }
                        RowStatus::Failed => state.retriable += 1,
                    }
                }
                state
            }
            Err(e) => {
                warn!(
                    "Existing output {:?} is unreadable ({}); starting fresh",
                    path, e
                );
                ResumeState::default()
            }
        }
    }

    fn read_rows(path: &Path) -> Result<Vec<OutputRow>, DatasetError> {
        match DatasetFormat::detect(path)? {
            DatasetFormat::Csv => Self::read_csv_rows(path),
            DatasetFormat::Xlsx => Self::read_xlsx_rows(path),
        }
    }

    fn read_csv_rows(path: &Path) -> Result<Vec<OutputRow>, DatasetError> {
        let bytes = std::fs::read(path)?;
        let decoded = String::from_utf8_lossy(&bytes).into_owned();

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(DatasetFormat::delimiter(path))
            .flexible(true)
            .from_reader(decoded.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| DatasetError::ResumeCorruption(e.to_string()))?
            .clone();
        let col = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        let (Some(id_col), Some(status_col)) = (col("id"), col("status")) else {
            return Err(DatasetError::ResumeCorruption(
                "output is missing id/status columns".to_string(),
            ));
        };
        let raw_col = col("raw");
        let edit_col = col("edit");
        let reason_col = col("reason");

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = match result {
                Ok(r) => r,
                Err(e) => {
                    warn!("Skipping malformed output row: {}", e);
                    continue;
                }
            };
            let Some(row) =
                parse_row(&record, id_col, raw_col, edit_col, status_col, reason_col)
            else {
                continue;
            };
            rows.push(row);
        }
        Ok(rows)
    }

    fn read_xlsx_rows(path: &Path) -> Result<Vec<OutputRow>, DatasetError> {
        let mut workbook = open_workbook_auto(path)
            .map_err(|e| DatasetError::ResumeCorruption(e.to_string()))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| DatasetError::ResumeCorruption("workbook has no worksheets".into()))?
            .map_err(|e| DatasetError::ResumeCorruption(e.to_string()))?;

        let mut cells = range.rows();
        let header: Vec<String> = cells
            .next()
            .ok_or_else(|| DatasetError::ResumeCorruption("worksheet is empty".into()))?
            .iter()
            .map(|c| cell_to_string(c).trim().to_lowercase())
            .collect();
        let col = |name: &str| header.iter().position(|h| h == name);
        let (Some(id_col), Some(status_col)) = (col("id"), col("status")) else {
            return Err(DatasetError::ResumeCorruption(
                "output is missing id/status columns".to_string(),
            ));
        };
        let raw_col = col("raw");
        let edit_col = col("edit");
        let reason_col = col("reason");

        let mut rows = Vec::new();
        for cells_row in cells {
            let get = |idx: Option<usize>| {
                idx.and_then(|i| cells_row.get(i))
                    .map(cell_to_string)
                    .unwrap_or_default()
            };
            let id_text = get(Some(id_col));
            if id_text.trim().is_empty() {
                continue;
            }
            let Ok(id) = id_text
                .trim()
                .trim_end_matches(".0")
                .parse::<u64>()
            else {
                warn!("Skipping output row with unreadable id '{}'", id_text);
                continue;
            };
            let Ok(status) = get(Some(status_col)).parse::<RowStatus>() else {
                warn!("Skipping output row {} with unknown status", id);
                continue;
            };
            let reason = get(reason_col);
            rows.push(OutputRow {
                id,
                raw: get(raw_col),
                edit: get(edit_col),
                status,
                reason: if reason.is_empty() { None } else { Some(reason) },
            });
        }
        Ok(rows)
    }
}

fn parse_row(
    record: &csv::StringRecord,
    id_col: usize,
    raw_col: Option<usize>,
    edit_col: Option<usize>,
    status_col: usize,
    reason_col: Option<usize>,
) -> Option<OutputRow> {
    let id_text = record.get(id_col).unwrap_or_default();
    let Ok(id) = id_text.trim().parse::<u64>() else {
        warn!("Skipping output row with unreadable id '{}'", id_text);
        return None;
    };
    let status_text = record.get(status_col).unwrap_or_default();
    let Ok(status) = status_text.parse::<RowStatus>() else {
        warn!("Skipping output row {} with unknown status '{}'", id, status_text);
        return None;
    };
    let field = |idx: Option<usize>| {
        idx.and_then(|i| record.get(i))
            .unwrap_or_default()
            .to_string()
    };
    let reason = field(reason_col);
    Some(OutputRow {
        id,
        raw: field(raw_col),
        edit: field(edit_col),
        status,
        reason: if reason.is_empty() { None } else { Some(reason) },
    })
}
