/*!
 * Batch job orchestration.
 *
 * - `progress`: thread-safe counters plus the ordered event channel the
 *   supervising shell consumes
 * - `prompts`: prompt library loading, template rendering, response tidying
 * - `scheduler`: the run state machine that drives records through a
 *   provider under the retry policy and persists terminal results
 */

pub mod progress;
pub mod prompts;
pub mod scheduler;

pub use progress::{EventReceiver, JobEvent, JobProgress, JobSummary};
pub use prompts::PromptLibrary;
pub use scheduler::{BatchScheduler, JobHandle, JobState, SchedulerOptions, StopHandle};
