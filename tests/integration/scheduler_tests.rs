/*!
 * End-to-end scheduler runs over scripted providers.
 *
 * Covers the full run lifecycle: resume reconciliation, credential
 * rotation on throttling, pool exhaustion, cancellation safety, manual
 * dispatch, and terminal summaries.
 */

use std::sync::Arc;
use std::time::Duration;

use aibridge::app_config::DispatchMode;
use aibridge::credentials::CredentialPool;
use aibridge::dataset::RowStatus;
use aibridge::job::{JobEvent, JobState};
use aibridge::providers::mock::{self, ScriptedProvider};
use aibridge::ErrorKind;

use crate::common;

fn pool_of(keys: &[&str]) -> Arc<CredentialPool> {
    Arc::new(CredentialPool::new(
        keys.iter().map(|k| k.to_string()).collect(),
    ))
}

#[tokio::test]
async fn test_run_withWorkingProvider_shouldCompleteAllRecords() {
    let dir = common::create_temp_dir().unwrap();
    let input = common::write_input_csv(dir.path(), "novel_cn.csv", &[(1, "a"), (2, "b"), (3, "c")]);

    let provider = Arc::new(ScriptedProvider::working());
    let scheduler = common::test_scheduler(provider.clone(), pool_of(&["k1"]));
    let config = common::test_batch_config(&input);
    let output_path = config.output_path();

    let (handle, _events) = scheduler.start(config);
    let summary = handle.join().await.unwrap();

    assert_eq!(summary.done, 3);
    assert_eq!(summary.failed, 0);
    assert!(!summary.stopped);

    let rows = common::read_output_csv(&output_path);
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.status == RowStatus::Done));
    assert_eq!(rows[0].edit, "[TRANSLATED] a");
}

#[tokio::test]
async fn test_run_withExistingDoneRow_shouldProcessOnlyRemaining() {
    let dir = common::create_temp_dir().unwrap();
    let input = common::write_input_csv(dir.path(), "novel_cn.csv", &[(1, "a"), (2, "b")]);
    let config = common::test_batch_config(&input);

    // A previous run already finished id 1
    std::fs::write(
        config.output_path(),
        "id,raw,edit,status,reason\n1,a,done already,done,\n",
    )
    .unwrap();

    let provider = Arc::new(ScriptedProvider::working());
    let scheduler = common::test_scheduler(provider.clone(), pool_of(&["k1"]));
    let output_path = config.output_path();

    let (handle, _events) = scheduler.start(config);
    let summary = handle.join().await.unwrap();

    // The provider was never re-invoked for the completed id
    assert_eq!(provider.call_count(), 1);
    assert_eq!(provider.calls()[0].source_text, "b");
    assert_eq!(summary.done, 1);

    let rows = common::read_output_csv(&output_path);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].id, 1);
    assert_eq!(rows[0].edit, "done already");
    assert_eq!(rows[1].id, 2);
}

#[tokio::test]
async fn test_run_withRateLimit_shouldRotateCredentialAndQuarantine() {
    let dir = common::create_temp_dir().unwrap();
    let input = common::write_input_csv(dir.path(), "novel_cn.csv", &[(1, "a"), (2, "b")]);

    // id 1 succeeds; id 2 is throttled once, then succeeds on a fresh key
    let provider = Arc::new(ScriptedProvider::with_script(vec![
        mock::ok("t1"),
        mock::rate_limited(),
        mock::ok("t2"),
    ]));
    let pool = pool_of(&["key-a", "key-b"]);
    let scheduler = common::test_scheduler(provider.clone(), Arc::clone(&pool));
    let mut config = common::test_batch_config(&input);
    config.batch_size = 1;
    let output_path = config.output_path();

    let (handle, _events) = scheduler.start(config);
    let summary = handle.join().await.unwrap();

    assert_eq!(summary.done, 2);
    let rows = common::read_output_csv(&output_path);
    assert!(rows.iter().all(|r| r.status == RowStatus::Done));

    // The throttled key is quarantined and the retry used the other one
    assert_eq!(pool.available(), 1);
    let calls = provider.calls();
    assert_eq!(calls.len(), 3);
    assert_ne!(calls[2].api_key, calls[1].api_key);
}

#[tokio::test]
async fn test_run_withAllAuthRejected_shouldFailRecordsAndComplete() {
    let dir = common::create_temp_dir().unwrap();
    let input = common::write_input_csv(dir.path(), "novel_cn.csv", &[(1, "a"), (2, "b")]);

    // Three keys, every request 403s: id 1 burns two keys, id 2 the third.
    // Every record got an attempt, so the run completes rather than stops.
    let provider = Arc::new(ScriptedProvider::always(mock::auth_rejected()));
    let pool = pool_of(&["k1", "k2", "k3"]);
    let scheduler = common::test_scheduler(provider.clone(), Arc::clone(&pool));
    let config = common::test_batch_config(&input);
    let output_path = config.output_path();

    let (handle, _events) = scheduler.start(config);
    let summary = handle.join().await.unwrap();

    assert_eq!(summary.done, 0);
    assert_eq!(summary.failed, 2);
    assert!(!summary.stopped);
    assert_eq!(summary.failed_by_kind[&ErrorKind::Auth.to_string()], 2);

    assert_eq!(pool.available(), 0);
    let rows = common::read_output_csv(&output_path);
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.status == RowStatus::Failed));
    assert!(rows[0].reason.as_ref().unwrap().contains("authentication"));
}

#[tokio::test]
async fn test_run_withExhaustedPoolMidRun_shouldStopWithoutLosingRows() {
    let dir = common::create_temp_dir().unwrap();
    let input = common::write_input_csv(dir.path(), "novel_cn.csv", &[(1, "a"), (2, "b"), (3, "c")]);

    // One key: id 1 succeeds, id 2's 403 kills the only key, id 3 is never
    // dispatched and stays pending for a future resume
    let provider = Arc::new(ScriptedProvider::with_script(vec![
        mock::ok("t1"),
        mock::auth_rejected(),
    ]));
    let pool = pool_of(&["only-key"]);
    let scheduler = common::test_scheduler(provider.clone(), Arc::clone(&pool));
    let config = common::test_batch_config(&input);
    let output_path = config.output_path();

    let (handle, _events) = scheduler.start(config);
    let summary = handle.join().await.unwrap();

    assert!(summary.stopped);
    assert_eq!(summary.done, 1);
    assert_eq!(summary.failed, 1);

    let rows = common::read_output_csv(&output_path);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].status, RowStatus::Done);
    assert_eq!(rows[1].status, RowStatus::Failed);
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test]
async fn test_run_withCancellation_shouldFinishInFlightRecordFirst() {
    let dir = common::create_temp_dir().unwrap();
    let input = common::write_input_csv(dir.path(), "novel_cn.csv", &[(1, "a"), (2, "b"), (3, "c")]);

    let provider = Arc::new(ScriptedProvider::working().delayed(Duration::from_millis(200)));
    let scheduler = common::test_scheduler(provider.clone(), pool_of(&["k1"]));
    let config = common::test_batch_config(&input);
    let output_path = config.output_path();

    let (handle, _events) = scheduler.start(config);
    // Cancel while the first record's call is in flight
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.stop();
    let summary = handle.join().await.unwrap();

    assert!(summary.stopped);
    assert_eq!(summary.done, 1);

    // The in-flight record was persisted before stopping; no partial rows
    let rows = common::read_output_csv(&output_path);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, 1);
    assert_eq!(rows[0].status, RowStatus::Done);
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_run_withStoppedRun_shouldResumeExactlyTheRemainder() {
    let dir = common::create_temp_dir().unwrap();
    let rows_in: &[(u64, &str)] = &[(1, "a"), (2, "b"), (3, "c"), (4, "d")];
    let input = common::write_input_csv(dir.path(), "novel_cn.csv", rows_in);

    // First run: cancel after the first record lands
    let provider = Arc::new(ScriptedProvider::working().delayed(Duration::from_millis(150)));
    let scheduler = common::test_scheduler(provider.clone(), pool_of(&["k1"]));
    let config = common::test_batch_config(&input);
    let output_path = config.output_path();
    let (handle, _events) = scheduler.start(config);
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.stop();
    let first = handle.join().await.unwrap();
    assert!(first.stopped);
    let done_first = first.done;
    assert!(done_first >= 1);

    // Second run over the same paths: processes exactly the remainder
    let provider2 = Arc::new(ScriptedProvider::working());
    let scheduler2 = common::test_scheduler(provider2.clone(), pool_of(&["k1"]));
    let (handle2, _events2) = scheduler2.start(common::test_batch_config(&input));
    let second = handle2.join().await.unwrap();

    assert!(!second.stopped);
    assert_eq!(second.done, rows_in.len() as u64 - done_first);
    assert_eq!(provider2.call_count() as u64, rows_in.len() as u64 - done_first);

    let rows = common::read_output_csv(&output_path);
    assert_eq!(rows.len(), rows_in.len());
    let mut ids: Vec<u64> = rows.iter().map(|r| r.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_run_withIdRange_shouldFilterPendingSet() {
    let dir = common::create_temp_dir().unwrap();
    let input = common::write_input_csv(
        dir.path(),
        "novel_cn.csv",
        &[(10, "a"), (20, "b"), (30, "c"), (40, "d")],
    );

    let provider = Arc::new(ScriptedProvider::working());
    let scheduler = common::test_scheduler(provider.clone(), pool_of(&["k1"]));
    let mut config = common::test_batch_config(&input);
    config.id_range = Some((20, 30));

    let (handle, _events) = scheduler.start(config);
    let summary = handle.join().await.unwrap();

    assert_eq!(summary.done, 2);
    let texts: Vec<String> = provider.calls().iter().map(|c| c.source_text.clone()).collect();
    assert_eq!(texts, vec!["b", "c"]);
}

#[tokio::test]
async fn test_run_withMissingTextColumn_shouldNeverLeaveIdle() {
    let dir = common::create_temp_dir().unwrap();
    let input = dir.path().join("bad.csv");
    std::fs::write(&input, "id,content\n1,a\n").unwrap();

    let provider = Arc::new(ScriptedProvider::working());
    let scheduler = common::test_scheduler(provider.clone(), pool_of(&["k1"]));
    let config = common::test_batch_config(&input);
    let output_path = config.output_path();

    let (handle, _events) = scheduler.start(config);
    // Give the task a moment, then observe it failed without running
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.state(), JobState::Idle);
    assert!(handle.join().await.is_err());
    assert!(!output_path.exists());
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_run_withManualMode_shouldGateBatchesOnConfirmation() {
    let dir = common::create_temp_dir().unwrap();
    let input = common::write_input_csv(dir.path(), "novel_cn.csv", &[(1, "a"), (2, "b")]);

    let provider = Arc::new(ScriptedProvider::working());
    let scheduler = common::test_scheduler(provider.clone(), pool_of(&["k1"]));
    let mut config = common::test_batch_config(&input);
    config.batch_size = 1;
    config.mode = DispatchMode::Manual;

    let (handle, _events) = scheduler.start(config);

    // Only the first batch runs until the operator confirms
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(handle.status().completed, 1);
    assert_eq!(handle.state(), JobState::Running);

    handle.confirm_batch();
    let summary = handle.join().await.unwrap();
    assert_eq!(summary.done, 2);
    assert!(!summary.stopped);
}

#[tokio::test]
async fn test_run_events_shouldArriveInOrderAndEndWithSummary() {
    let dir = common::create_temp_dir().unwrap();
    let input = common::write_input_csv(dir.path(), "novel_cn.csv", &[(1, "a"), (2, "b")]);

    let provider = Arc::new(ScriptedProvider::with_script(vec![
        mock::ok("t1"),
        mock::timed_out(),
        mock::timed_out(),
        mock::timed_out(),
    ]));
    let scheduler = common::test_scheduler(provider.clone(), pool_of(&["k1"]));
    let (handle, mut events) = scheduler.start(common::test_batch_config(&input));
    let summary = handle.join().await.unwrap();

    assert_eq!(summary.done, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failed_by_kind[&ErrorKind::Timeout.to_string()], 1);

    let mut progress_seen = 0u64;
    let mut last_completed = 0u64;
    let mut completed_event = None;
    while let Some(event) = events.recv().await {
        match event {
            JobEvent::Progress(progress) => {
                // Progress counters never move backwards
                assert!(progress.completed >= last_completed);
                last_completed = progress.completed;
                progress_seen += 1;
            }
            JobEvent::Completed(summary) => completed_event = Some(summary),
            _ => {}
        }
    }
    assert_eq!(progress_seen, 2);
    let completed = completed_event.expect("terminal summary event");
    assert_eq!(completed.done, 1);
    assert_eq!(completed.failed, 1);
}

#[tokio::test]
async fn test_run_withFailedRowInOutput_shouldRetryItOnResume() {
    let dir = common::create_temp_dir().unwrap();
    let input = common::write_input_csv(dir.path(), "novel_cn.csv", &[(1, "a"), (2, "b")]);
    let config = common::test_batch_config(&input);

    // Last run: id 1 done, id 2 failed
    std::fs::write(
        config.output_path(),
        "id,raw,edit,status,reason\n1,a,fine,done,\n2,b,,failed,timed out\n",
    )
    .unwrap();

    let provider = Arc::new(ScriptedProvider::working());
    let scheduler = common::test_scheduler(provider.clone(), pool_of(&["k1"]));
    let output_path = config.output_path();
    let (handle, _events) = scheduler.start(config);
    let summary = handle.join().await.unwrap();

    assert_eq!(summary.done, 1);
    assert_eq!(provider.calls()[0].source_text, "b");

    // Exactly one row per id after the retry
    let rows = common::read_output_csv(&output_path);
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.status == RowStatus::Done));
    let mut ids: Vec<u64> = rows.iter().map(|r| r.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2]);
}
