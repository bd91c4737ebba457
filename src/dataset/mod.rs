/*!
 * Tabular dataset handling.
 *
 * Input and output datasets are plain tables keyed by a numeric `id`.
 * This module contains:
 * - `record`: the in-memory record model and the persisted output row
 * - `reader`: input loading for delimited text and spreadsheets, with
 *   encoding detection
 * - `writer`: the single-writer, append-in-completion-order output sink
 * - `resume`: reconciliation of an existing output with remaining work
 */

pub mod reader;
pub mod record;
pub mod resume;
pub mod writer;

pub use reader::{read_input, DatasetFormat, InputRecord};
pub use record::{OutputRow, Record, RecordStatus, RowStatus};
pub use resume::{ResumeState, ResumeStore};
pub use writer::OutputWriter;
