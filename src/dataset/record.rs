/*!
 * Record model shared by the scheduler and the datasets.
 */

use std::str::FromStr;

/// Processing status of a record during a run.
/// Transitions only move forward: Pending → InProgress → {Done, Failed}.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Pending,
    InProgress,
    Done,
    Failed,
}

impl RecordStatus {
    /// True for the two states a record can end a run in
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// One unit of source text plus its translation outcome, keyed by a stable
/// identifier. Mutated only by the scheduler.
#[derive(Debug, Clone)]
pub struct Record {
    pub id: u64,
    pub source_text: String,
    pub status: RecordStatus,
    pub raw_output: Option<String>,
    pub edited_output: Option<String>,
}

impl Record {
    pub fn new(id: u64, source_text: impl Into<String>) -> Self {
        Self {
            id,
            source_text: source_text.into(),
            status: RecordStatus::Pending,
            raw_output: None,
            edited_output: None,
        }
    }

    /// Advance the status, ignoring any attempt to move backward
    pub fn advance(&mut self, status: RecordStatus) {
        let order = |s: RecordStatus| match s {
            RecordStatus::Pending => 0,
            RecordStatus::InProgress => 1,
            RecordStatus::Done | RecordStatus::Failed => 2,
        };
        if order(status) >= order(self.status) {
            self.status = status;
        }
    }
}

/// Terminal status as persisted in the output dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    Done,
    Failed,
}

impl RowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for RowStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // "completed" kept for outputs written by earlier releases
        match s.trim().to_lowercase().as_str() {
            "done" | "completed" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for RowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted output row: columns `id, raw, edit, status, reason`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRow {
    pub id: u64,
    /// Source text as read from the input
    pub raw: String,
    /// Translated text; empty for failed records
    pub edit: String,
    pub status: RowStatus,
    /// Failure reason; empty for done records
    pub reason: Option<String>,
}

impl OutputRow {
    pub fn done(id: u64, raw: impl Into<String>, edit: impl Into<String>) -> Self {
        Self {
            id,
            raw: raw.into(),
            edit: edit.into(),
            status: RowStatus::Done,
            reason: None,
        }
    }

    pub fn failed(id: u64, raw: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id,
            raw: raw.into(),
            edit: String::new(),
            status: RowStatus::Failed,
            reason: Some(reason.into()),
        }
    }
}
