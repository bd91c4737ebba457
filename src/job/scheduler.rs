/*!
 * Batch scheduler.
 *
 * The orchestration core: one background task drives every pending record
 * through the provider client under the retry policy, appends terminal
 * rows to the output as they land, and reports progress over the event
 * channel. The run is a small state machine:
 *
 *   Idle → Running → { Stopped, Completed }
 *
 * Idle→Running happens only after the input dataset validates; a stopped
 * run is resumed by starting a fresh scheduler over the same output, which
 * is exactly the resume path through `ResumeStore`. Cancellation and
 * credential exhaustion are observed at record boundaries only; an
 * in-flight call is never torn down mid-protocol.
 */

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::Level;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::app_config::{BatchConfig, DispatchMode};
use crate::credentials::{CredentialHandle, CredentialOutcome, CredentialPool};
use crate::dataset::{
    read_input, InputRecord, OutputRow, OutputWriter, Record, RecordStatus, ResumeStore,
};
use crate::errors::{AbortReason, AppError, ErrorKind};
use crate::job::progress::{EventReceiver, EventSender, JobProgress, JobSummary, ProgressCounters};
use crate::job::prompts;
use crate::providers::{ProviderClient, ProviderFailure};
use crate::retry::{Decision, RetryPolicy};

/// Lifecycle of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Running,
    /// Halted before the pending set was exhausted (cancellation or
    /// credential exhaustion); resumable
    Stopped,
    /// Pending set exhausted
    Completed,
}

struct StateCell(AtomicU8);

impl StateCell {
    fn new() -> Self {
        Self(AtomicU8::new(0))
    }

    fn set(&self, state: JobState) {
        let value = match state {
            JobState::Idle => 0,
            JobState::Running => 1,
            JobState::Stopped => 2,
            JobState::Completed => 3,
        };
        self.0.store(value, Ordering::SeqCst);
    }

    fn get(&self) -> JobState {
        match self.0.load(Ordering::SeqCst) {
            1 => JobState::Running,
            2 => JobState::Stopped,
            3 => JobState::Completed,
            _ => JobState::Idle,
        }
    }
}

/// Cooperative cancellation flag, checked once per record
#[derive(Clone)]
struct CancelToken {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelToken {
    fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            // Register before the re-check so a cancel() landing in between
            // cannot be missed
            let mut notified = std::pin::pin!(self.notify.notified());
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Why a record terminally failed
#[derive(Debug, Clone)]
pub struct FailReason {
    pub abort: AbortReason,
    /// Last classified provider failure, when one was observed
    pub kind: Option<ErrorKind>,
    pub http_status: Option<u16>,
    pub detail: Option<String>,
}

impl FailReason {
    fn from_failure(abort: AbortReason, failure: &ProviderFailure) -> Self {
        Self {
            abort,
            kind: Some(failure.kind),
            http_status: failure.http_status,
            detail: failure.detail.clone(),
        }
    }

    /// Key used for the failure breakdown in the run summary
    pub fn kind_label(&self) -> String {
        match self.kind {
            Some(kind) => kind.to_string(),
            None => self.abort.to_string(),
        }
    }
}

impl std::fmt::Display for FailReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.abort)?;
        if let Some(kind) = self.kind {
            write!(f, " ({}", kind)?;
            if let Some(status) = self.http_status {
                write!(f, ", HTTP {}", status)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// Fixed parameters of one scheduler, derived from the app config
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Model name forwarded to the provider on every call
    pub model: String,
    /// Per-call deadline
    pub call_timeout: Duration,
    /// Pause between consecutive batches in automatic mode
    pub batch_pause: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            model: String::new(),
            call_timeout: Duration::from_secs(30),
            batch_pause: Duration::from_secs(2),
        }
    }
}

/// Cloneable stop switch, detached from the handle so a signal task can
/// own one while the main task keeps the handle
#[derive(Clone)]
pub struct StopHandle {
    cancel: CancelToken,
}

impl StopHandle {
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

/// Handle to a running job, usable from any task
pub struct JobHandle {
    state: Arc<StateCell>,
    counters: Arc<ProgressCounters>,
    cancel: CancelToken,
    gate: Arc<Notify>,
    handle: JoinHandle<Result<JobSummary, AppError>>,
}

impl JobHandle {
    /// Request cancellation. The in-flight record finishes and persists
    /// first; the run then transitions to `Stopped`.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Progress snapshot, readable at any time
    pub fn status(&self) -> JobProgress {
        self.counters.snapshot()
    }

    pub fn state(&self) -> JobState {
        self.state.get()
    }

    /// Release the next batch when running in manual dispatch mode.
    /// Confirming ahead of the gate is remembered.
    pub fn confirm_batch(&self) {
        self.gate.notify_one();
    }

    /// Detachable stop switch for signal handlers
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            cancel: self.cancel.clone(),
        }
    }

    /// Wait for the run to end and take its summary
    pub async fn join(self) -> Result<JobSummary, AppError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(AppError::Job(format!("job task failed: {}", e))),
        }
    }
}

/// The orchestration core. Owns nothing global: the provider client, the
/// credential pool and the retry policy are injected at construction.
pub struct BatchScheduler {
    provider: Arc<dyn ProviderClient>,
    pool: Arc<CredentialPool>,
    policy: RetryPolicy,
    options: SchedulerOptions,
}

enum RecordOutcome {
    Done(String),
    Failed(FailReason),
    /// No credential could be acquired before the first attempt; the run
    /// halts and the record stays pending for a future resume
    Exhausted,
}

enum Halt {
    None,
    Cancelled,
    CredentialsExhausted,
}

impl BatchScheduler {
    pub fn new(
        provider: Arc<dyn ProviderClient>,
        pool: Arc<CredentialPool>,
        policy: RetryPolicy,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            provider,
            pool,
            policy,
            options,
        }
    }

    /// Spawn the run on a dedicated background task and return immediately.
    /// The returned receiver delivers events in emission order.
    pub fn start(self, config: BatchConfig) -> (JobHandle, EventReceiver) {
        let (events, receiver) = EventSender::channel();
        let state = Arc::new(StateCell::new());
        let counters = Arc::new(ProgressCounters::default());
        let cancel = CancelToken::new();
        let gate = Arc::new(Notify::new());

        let runner = Runner {
            scheduler: self,
            config,
            events,
            state: Arc::clone(&state),
            counters: Arc::clone(&counters),
            cancel: cancel.clone(),
            gate: Arc::clone(&gate),
        };
        let handle = tokio::spawn(async move { runner.run().await });

        (
            JobHandle {
                state,
                counters,
                cancel,
                gate,
                handle,
            },
            receiver,
        )
    }
}

struct Runner {
    scheduler: BatchScheduler,
    config: BatchConfig,
    events: EventSender,
    state: Arc<StateCell>,
    counters: Arc<ProgressCounters>,
    cancel: CancelToken,
    gate: Arc<Notify>,
}

impl Runner {
    async fn run(self) -> Result<JobSummary, AppError> {
        // Everything before Running is fatal-at-start territory: the state
        // machine never leaves Idle on a bad input
        if let Err(e) = self.config.validate() {
            self.events.error(None, format!("Invalid batch config: {}", e));
            return Err(AppError::Job(e.to_string()));
        }

        let input = match read_input(&self.config.input, self.config.encoding.as_deref()) {
            Ok(input) => input,
            Err(e) => {
                self.events.error(None, format!("Cannot read input dataset: {}", e));
                return Err(AppError::Dataset(e));
            }
        };

        let output_path = self.config.output_path();
        let resume = ResumeStore::load(&output_path);
        if !resume.completed.is_empty() {
            self.events.log(
                Level::Info,
                format!(
                    "Resuming: {} record(s) already done, {} failed record(s) will be retried",
                    resume.completed.len(),
                    resume.retriable
                ),
            );
        }

        // Pending work, in stable id order
        let mut pending: Vec<InputRecord> = input
            .into_iter()
            .filter(|r| {
                self.config
                    .id_range
                    .map(|(start, end)| r.id >= start && r.id <= end)
                    .unwrap_or(true)
            })
            .filter(|r| !resume.completed.contains(&r.id))
            .collect();
        pending.sort_by_key(|r| r.id);

        let mut writer = match OutputWriter::create(&output_path, resume.retained) {
            Ok(writer) => writer,
            Err(e) => {
                self.events.error(None, format!("Cannot open output dataset: {}", e));
                return Err(AppError::Dataset(e));
            }
        };

        self.counters.reset(pending.len() as u64);
        self.state.set(JobState::Running);
        self.events.log(
            Level::Info,
            format!(
                "Starting run with {} via {}: {} pending record(s), batch size {}",
                self.scheduler.options.model,
                self.scheduler.provider.name(),
                pending.len(),
                self.config.batch_size
            ),
        );

        let mut summary = JobSummary::default();
        let mut halt = Halt::None;

        'batches: for (batch_index, batch) in pending.chunks(self.config.batch_size).enumerate() {
            if batch_index > 0 && !self.hold_before_batch().await {
                halt = Halt::Cancelled;
                break 'batches;
            }
            self.counters.enter_batch(batch_index as u64 + 1);
            self.events.log(
                Level::Info,
                format!(
                    "Processing batch {} ({} record(s), ids {}-{})",
                    batch_index + 1,
                    batch.len(),
                    batch[0].id,
                    batch[batch.len() - 1].id
                ),
            );

            for input_record in batch {
                // Cancellation is observed only here, never mid-call
                if self.cancel.is_cancelled() {
                    self.events.log(Level::Info, "Cancellation requested; stopping run");
                    halt = Halt::Cancelled;
                    break 'batches;
                }

                let mut record = Record::new(input_record.id, input_record.text.clone());
                match self.process_record(&mut record).await {
                    RecordOutcome::Done(raw_text) => {
                        // Keep the raw model output and the tidied form apart;
                        // only the tidied text is persisted as the translation
                        let edited = prompts::tidy_response(&raw_text);
                        record.raw_output = Some(raw_text);
                        record.edited_output = Some(edited.clone());
                        record.advance(RecordStatus::Done);
                        if let Err(e) =
                            writer.append(OutputRow::done(record.id, &record.source_text, edited))
                        {
                            return self.fail_run(e);
                        }
                        self.counters.record_done();
                        summary.done += 1;
                    }
                    RecordOutcome::Failed(reason) => {
                        record.advance(RecordStatus::Failed);
                        if let Err(e) = writer.append(OutputRow::failed(
                            record.id,
                            &record.source_text,
                            reason.to_string(),
                        )) {
                            return self.fail_run(e);
                        }
                        self.counters.record_failed();
                        summary.record_failure(reason.kind_label());
                        self.events
                            .error(Some(record.id), format!("Record {} failed: {}", record.id, reason));

                        if reason.abort == AbortReason::NoCredentialsAvailable {
                            // The pool is dry; nothing further can dispatch
                            halt = Halt::CredentialsExhausted;
                            self.events.progress(self.counters.snapshot());
                            break 'batches;
                        }
                    }
                    RecordOutcome::Exhausted => {
                        self.events.error(
                            None,
                            "No credentials available; halting dispatch for this provider",
                        );
                        halt = Halt::CredentialsExhausted;
                        break 'batches;
                    }
                }
                self.events.progress(self.counters.snapshot());
            }
        }

        // A halt with no pending work left is still a completed run
        let processed = summary.done + summary.failed;
        let stopped = match halt {
            Halt::None => false,
            Halt::Cancelled | Halt::CredentialsExhausted => processed < pending.len() as u64,
        };
        summary.stopped = stopped;
        self.state.set(if stopped {
            JobState::Stopped
        } else {
            JobState::Completed
        });

        let breakdown = if summary.failed_by_kind.is_empty() {
            String::new()
        } else {
            let parts: Vec<String> = summary
                .failed_by_kind
                .iter()
                .map(|(kind, count)| format!("{}: {}", kind, count))
                .collect();
            format!(" [{}]", parts.join(", "))
        };
        self.events.log(
            Level::Info,
            format!(
                "Run {}: {} done, {} failed{}",
                if stopped { "stopped" } else { "completed" },
                summary.done,
                summary.failed,
                breakdown
            ),
        );
        self.events.completed(summary.clone());
        Ok(summary)
    }

    /// A failed output write means durability is gone; stop rather than
    /// keep translating into the void
    fn fail_run(&self, e: crate::errors::DatasetError) -> Result<JobSummary, AppError> {
        self.events
            .error(None, format!("Cannot persist output row: {}", e));
        self.state.set(JobState::Stopped);
        Err(AppError::Dataset(e))
    }

    /// Gate between batches: operator confirmation in manual mode, the
    /// configured pause otherwise. Returns false when cancelled while held.
    async fn hold_before_batch(&self) -> bool {
        match self.config.mode {
            DispatchMode::Manual => {
                self.events
                    .log(Level::Info, "Awaiting confirmation for the next batch");
                tokio::select! {
                    _ = self.gate.notified() => true,
                    _ = self.cancel.cancelled() => false,
                }
            }
            DispatchMode::Automatic => {
                let pause = self.scheduler.options.batch_pause;
                if pause.is_zero() {
                    return !self.cancel.is_cancelled();
                }
                tokio::select! {
                    _ = sleep(pause) => true,
                    _ = self.cancel.cancelled() => false,
                }
            }
        }
    }

    /// Drive one record to a terminal outcome under the retry policy
    async fn process_record(&self, record: &mut Record) -> RecordOutcome {
        record.advance(RecordStatus::InProgress);
        let needs_credentials = self.scheduler.provider.requires_credentials();

        let mut credential: Option<CredentialHandle> = if needs_credentials {
            match self.scheduler.pool.acquire() {
                Ok(credential) => Some(credential),
                Err(_) => return RecordOutcome::Exhausted,
            }
        } else {
            None
        };

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let key = credential.as_ref().map(|c| c.secret()).unwrap_or("");
            let result = self
                .scheduler
                .provider
                .translate(
                    &record.source_text,
                    &self.config.prompt_template,
                    &self.scheduler.options.model,
                    key,
                    self.scheduler.options.call_timeout,
                )
                .await;

            let failure = match result.into_outcome() {
                Ok(text) => {
                    if let Some(credential) = &credential {
                        self.scheduler
                            .pool
                            .report_outcome(credential, CredentialOutcome::Success);
                    }
                    return RecordOutcome::Done(text);
                }
                Err(failure) => failure,
            };

            self.events.log(
                Level::Warn,
                format!(
                    "Record {} attempt {} failed: {}",
                    record.id, attempts, failure
                ),
            );

            if let Some(credential) = &credential {
                match failure.kind {
                    ErrorKind::Auth => self
                        .scheduler
                        .pool
                        .report_outcome(credential, CredentialOutcome::AuthFailure),
                    ErrorKind::RateLimited => self
                        .scheduler
                        .pool
                        .report_outcome(credential, CredentialOutcome::RateLimitFailure),
                    _ => {}
                }
            }

            match self.scheduler.policy.decide(failure.kind, attempts) {
                Decision::RetrySame { delay } => {
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                }
                Decision::RetryNew => {
                    if !needs_credentials {
                        // No pool to rotate through; treat like a rejection
                        return RecordOutcome::Failed(FailReason::from_failure(
                            AbortReason::ProviderRejected,
                            &failure,
                        ));
                    }
                    match self.scheduler.pool.acquire() {
                        Ok(next) => credential = Some(next),
                        Err(_) => {
                            return RecordOutcome::Failed(FailReason::from_failure(
                                AbortReason::NoCredentialsAvailable,
                                &failure,
                            ));
                        }
                    }
                }
                Decision::Abort(reason) => {
                    return RecordOutcome::Failed(FailReason::from_failure(reason, &failure));
                }
            }
        }
    }
}
