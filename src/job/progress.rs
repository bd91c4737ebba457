/*!
 * Progress counters and the job event channel.
 *
 * The engine never talks to a presentation layer directly. It publishes
 * ordered `JobEvent`s to an unbounded channel; any consumer (a terminal
 * progress bar, a socket, a GUI) drains them on its own schedule. Events
 * are delivered in emission order; a vanished consumer never blocks or
 * fails the engine.
 */

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{log, Level};
use tokio::sync::mpsc;

/// Snapshot of a run's progress. `completed + failed <= total` always.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobProgress {
    /// Records finished as done in this run
    pub completed: u64,
    /// Records finished as failed in this run
    pub failed: u64,
    /// Records pending at run start
    pub total: u64,
    /// 1-based index of the batch currently running
    pub current_batch: u64,
}

/// Process-wide counters for one run; written only by the scheduler,
/// readable from any thread at any time
#[derive(Debug, Default)]
pub struct ProgressCounters {
    completed: AtomicU64,
    failed: AtomicU64,
    total: AtomicU64,
    current_batch: AtomicU64,
}

impl ProgressCounters {
    pub fn reset(&self, total: u64) {
        self.completed.store(0, Ordering::SeqCst);
        self.failed.store(0, Ordering::SeqCst);
        self.total.store(total, Ordering::SeqCst);
        self.current_batch.store(0, Ordering::SeqCst);
    }

    pub fn record_done(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn enter_batch(&self, index: u64) {
        self.current_batch.store(index, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> JobProgress {
        JobProgress {
            completed: self.completed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            total: self.total.load(Ordering::SeqCst),
            current_batch: self.current_batch.load(Ordering::SeqCst),
        }
    }
}

/// Terminal accounting for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobSummary {
    pub done: u64,
    pub failed: u64,
    /// Failure counts keyed by error kind label
    pub failed_by_kind: BTreeMap<String, u64>,
    /// True when the run was halted (cancellation or credential exhaustion)
    /// rather than finishing its pending set
    pub stopped: bool,
}

impl JobSummary {
    pub fn record_failure(&mut self, kind_label: String) {
        self.failed += 1;
        *self.failed_by_kind.entry(kind_label).or_insert(0) += 1;
    }
}

/// Discrete event published by the engine
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// Free-form log line
    Log { level: Level, message: String },
    /// Progress snapshot after a record reached a terminal status
    Progress(JobProgress),
    /// A record failed terminally
    Error { id: Option<u64>, message: String },
    /// The run reached a terminal state
    Completed(JobSummary),
}

/// Receiving half handed to the supervising shell
pub type EventReceiver = mpsc::UnboundedReceiver<JobEvent>;

/// Sending half owned by the scheduler. Mirrors log events onto the `log`
/// facade so headless runs still leave a trace.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<JobEvent>,
}

impl EventSender {
    pub fn channel() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn log(&self, level: Level, message: impl Into<String>) {
        let message = message.into();
        log!(level, "{}", message);
        let _ = self.tx.send(JobEvent::Log { level, message });
    }

    pub fn progress(&self, snapshot: JobProgress) {
        let _ = self.tx.send(JobEvent::Progress(snapshot));
    }

    pub fn error(&self, id: Option<u64>, message: impl Into<String>) {
        let message = message.into();
        log::error!("{}", message);
        let _ = self.tx.send(JobEvent::Error { id, message });
    }

    pub fn completed(&self, summary: JobSummary) {
        let _ = self.tx.send(JobEvent::Completed(summary));
    }
}
