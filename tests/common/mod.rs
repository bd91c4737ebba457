/*!
 * Common test utilities for the aibridge test suite
 */

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tempfile::TempDir;

use aibridge::app_config::BatchConfig;
use aibridge::credentials::CredentialPool;
use aibridge::dataset::{OutputRow, RowStatus};
use aibridge::job::{BatchScheduler, SchedulerOptions};
use aibridge::providers::ProviderClient;
use aibridge::retry::RetryPolicy;


/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Write an input dataset with `id` and `text` columns
pub fn write_input_csv(dir: &Path, filename: &str, rows: &[(u64, &str)]) -> PathBuf {
    let mut content = String::from("id,text\n");
    for (id, text) in rows {
        content.push_str(&format!("{},{}\n", id, text));
    }
    let path = dir.join(filename);
    std::fs::write(&path, content).expect("write input csv");
    path
}

/// Read every row of an output CSV back, failed rows included
pub fn read_output_csv(path: &Path) -> Vec<OutputRow> {
    let content = std::fs::read_to_string(path).expect("read output csv");
    let mut reader = csv::Reader::from_reader(content.as_bytes());
    let headers = reader.headers().expect("output headers").clone();
    let col = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .unwrap_or_else(|| panic!("missing output column '{}'", name))
    };
    let (id_col, raw_col, edit_col, status_col, reason_col) =
        (col("id"), col("raw"), col("edit"), col("status"), col("reason"));

    reader
        .records()
        .map(|record| {
            let record = record.expect("output row");
            let reason = record.get(reason_col).unwrap_or_default().to_string();
            OutputRow {
                id: record.get(id_col).unwrap().parse().expect("row id"),
                raw: record.get(raw_col).unwrap_or_default().to_string(),
                edit: record.get(edit_col).unwrap_or_default().to_string(),
                status: record
                    .get(status_col)
                    .unwrap_or_default()
                    .parse::<RowStatus>()
                    .expect("row status"),
                reason: if reason.is_empty() { None } else { Some(reason) },
            }
        })
        .collect()
}

/// Scheduler with test-friendly options: no inter-batch pause, tiny backoff
pub fn test_scheduler(provider: Arc<dyn ProviderClient>, pool: Arc<CredentialPool>) -> BatchScheduler {
    BatchScheduler::new(
        provider,
        pool,
        RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(4)),
        SchedulerOptions {
            model: "test-model".to_string(),
            call_timeout: Duration::from_secs(5),
            batch_pause: Duration::ZERO,
        },
    )
}

/// Batch config over `input` with a bare test prompt
pub fn test_batch_config(input: &Path) -> BatchConfig {
    BatchConfig::new(input, "Translate the following text: {text}")
}
