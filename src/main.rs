// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::too_many_arguments)]

use std::fs::File;
use std::io::BufReader;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use indicatif::{ProgressBar, ProgressStyle};
use log::{warn, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

use aibridge::app_config::{
    self, BackendKind, BatchConfig, Config, DispatchMode, ProviderKind,
};
use aibridge::credentials::CredentialPool;
use aibridge::job::{BatchScheduler, JobEvent, JobState, PromptLibrary, SchedulerOptions};
use aibridge::providers::direct::DirectApiClient;
use aibridge::providers::ProviderClient;
use aibridge::retry::RetryPolicy;

/// CLI Wrapper for ProviderKind to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliProvider {
    Gemini,
    #[value(name = "openai")]
    OpenAi,
    Claude,
    Grok,
    Perplexity,
}

impl From<CliProvider> for ProviderKind {
    fn from(cli_provider: CliProvider) -> Self {
        match cli_provider {
            CliProvider::Gemini => ProviderKind::Gemini,
            CliProvider::OpenAi => ProviderKind::OpenAi,
            CliProvider::Claude => ProviderKind::Claude,
            CliProvider::Grok => ProviderKind::Grok,
            CliProvider::Perplexity => ProviderKind::Perplexity,
        }
    }
}

/// CLI Wrapper for BackendKind to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliBackend {
    Api,
    Web,
}

impl From<CliBackend> for BackendKind {
    fn from(cli_backend: CliBackend) -> Self {
        match cli_backend {
            CliBackend::Api => BackendKind::Api,
            CliBackend::Web => BackendKind::Web,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for LevelFilter {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => LevelFilter::Error,
            CliLogLevel::Warn => LevelFilter::Warn,
            CliLogLevel::Info => LevelFilter::Info,
            CliLogLevel::Debug => LevelFilter::Debug,
            CliLogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate a tabular dataset (default command)
    #[command(alias = "translate")]
    Run(RunArgs),

    /// List configured providers and their key counts
    Providers {
        /// Configuration file path
        #[arg(short, long, default_value = "conf.json")]
        config_path: String,
    },

    /// Generate shell completions for aibridge
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Input dataset (.csv/.tsv/.xlsx) with `id` and `text` columns
    #[arg(value_name = "INPUT_PATH")]
    input_path: PathBuf,

    /// Output dataset path (defaults to <input>_translated.<ext>)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Translation provider to use
    #[arg(short, long, value_enum)]
    provider: Option<CliProvider>,

    /// Backend to reach the provider through
    #[arg(short, long, value_enum)]
    backend: Option<CliBackend>,

    /// Model name to use for translation
    #[arg(short, long)]
    model: Option<String>,

    /// Records per batch
    #[arg(long, default_value_t = 10)]
    batch_size: usize,

    /// Only process ids at or above this value
    #[arg(long)]
    start_id: Option<u64>,

    /// Only process ids at or below this value
    #[arg(long)]
    stop_id: Option<u64>,

    /// Inline prompt template with a {text} placeholder
    #[arg(long, conflicts_with = "prompt_file")]
    prompt_template: Option<String>,

    /// Prompt library file (.csv/.xlsx with a `type` column)
    #[arg(long, requires = "prompt_category")]
    prompt_file: Option<PathBuf>,

    /// Prompt category to pick from the prompt library
    #[arg(long)]
    prompt_category: Option<String>,

    /// Input encoding label (auto-detected when omitted)
    #[arg(long)]
    encoding: Option<String>,

    /// Require confirmation before every batch after the first
    #[arg(long)]
    manual: bool,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

/// aibridge - AI Translation Bridge
///
/// Bulk-translates tabular text records through AI providers, either over
/// their network APIs or by driving their chat web UIs, with credential
/// rotation and crash-safe resume.
#[derive(Parser, Debug)]
#[command(name = "aibridge")]
#[command(author = "aibridge team")]
#[command(version)]
#[command(about = "Bulk AI translation of tabular text records")]
#[command(long_about = "aibridge translates tabular text records (id,text) using AI providers
and writes an output table (id,raw,edit,status) that doubles as a checkpoint:
re-running the same command skips everything already done.

EXAMPLES:
    aibridge run novel_cn.csv --prompt-template 'Translate to Vietnamese: {text}'
    aibridge run novel_cn.csv --prompt-file prompts.xlsx --prompt-category literal
    aibridge run -p claude -m claude-3-haiku-20240307 novel_cn.csv --prompt-template '{text}'
    aibridge run --start-id 100 --stop-id 500 novel_cn.xlsx --prompt-template '{text}'
    aibridge run -b web -p perplexity novel_cn.csv --prompt-template '{text}'
    aibridge providers
    aibridge completions bash > aibridge.bash

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default
    one will be created automatically. API keys go in the config file, several
    per provider; failed keys are quarantined and the rest keep working.

SUPPORTED PROVIDERS:
    gemini      - Google Gemini API
    openai      - OpenAI ChatGPT API
    claude      - Anthropic Claude API
    grok        - xAI Grok API
    perplexity  - Perplexity API
    (all of them also work over the 'web' backend, which drives the chat UI
    on screen; build with --features desktop)")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI color for log level
    fn color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S%.3f");
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {:5} {}\x1B[0m",
                Self::color_for_level(record.level()),
                now,
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the logger once with info level by default.
    // The level is updated after the config is loaded.
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "aibridge", &mut std::io::stdout());
            Ok(())
        }
        Commands::Providers { config_path } => {
            let config = load_or_create_config(&config_path, None)?;
            print_providers(&config);
            Ok(())
        }
        Commands::Run(args) => run_job(args).await,
    }
}

fn load_or_create_config(config_path: &str, log_level: Option<&CliLogLevel>) -> Result<Config> {
    let config = if Path::new(config_path).exists() {
        let file = File::open(config_path)
            .context(format!("Failed to open config file: {}", config_path))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader)
            .context(format!("Failed to parse config file: {}", config_path))?
    } else {
        warn!(
            "Config file not found at '{}', creating default config.",
            config_path
        );
        let config = Config::default();
        let config_json = serde_json::to_string_pretty(&config)
            .context("Failed to serialize default config to JSON")?;
        std::fs::write(config_path, config_json)
            .context(format!("Failed to write default config to file: {}", config_path))?;
        config
    };

    if let Some(level) = log_level {
        log::set_max_level(level.clone().into());
    } else {
        let filter = match config.log_level {
            app_config::LogLevel::Error => LevelFilter::Error,
            app_config::LogLevel::Warn => LevelFilter::Warn,
            app_config::LogLevel::Info => LevelFilter::Info,
            app_config::LogLevel::Debug => LevelFilter::Debug,
            app_config::LogLevel::Trace => LevelFilter::Trace,
        };
        log::set_max_level(filter);
    }

    Ok(config)
}

fn print_providers(config: &Config) {
    println!("Configured providers (active: {}):", config.translation.provider);
    for provider in &config.translation.available_providers {
        println!(
            "  {:<12} model={:<28} keys={}",
            provider.provider_type,
            provider.model,
            provider.api_keys.len()
        );
    }
}

/// Resolve the prompt template from the CLI arguments
fn resolve_prompt(args: &RunArgs, config: &Config) -> Result<String> {
    if let Some(template) = &args.prompt_template {
        return Ok(template.clone());
    }
    if let (Some(file), Some(category)) = (&args.prompt_file, &args.prompt_category) {
        let library = PromptLibrary::load(file)?;
        return library
            .get(category, &config.source_language)
            .map(|t| t.to_string())
            .ok_or_else(|| {
                anyhow!(
                    "No prompt for category '{}' and language '{}' in {:?} (known categories: {})",
                    category,
                    config.source_language,
                    file,
                    library.categories().join(", ")
                )
            });
    }
    Err(anyhow!(
        "A prompt is required: pass --prompt-template or --prompt-file with --prompt-category"
    ))
}

/// Build the provider client for the configured backend
fn build_client(config: &Config) -> Result<Arc<dyn ProviderClient>> {
    let translation = &config.translation;
    match translation.backend {
        BackendKind::Api => Ok(Arc::new(DirectApiClient::new(
            translation.provider,
            translation.get_endpoint(),
            translation.get_generation_params(),
        ))),
        BackendKind::Web => build_web_client(config),
    }
}

#[cfg(feature = "desktop")]
fn build_web_client(config: &Config) -> Result<Arc<dyn ProviderClient>> {
    use aibridge::automation::{AnchorSet, DesktopDriver};
    use aibridge::providers::automation::AutomationClient;

    let kind = config.translation.provider;
    let anchors = AnchorSet::load(&config.automation.anchor_dir, kind)?;
    let driver = DesktopDriver::new().map_err(|e| anyhow!("Cannot open desktop session: {}", e))?;
    Ok(Arc::new(AutomationClient::new(
        driver,
        kind,
        config.automation.clone(),
        anchors,
    )))
}

#[cfg(not(feature = "desktop"))]
fn build_web_client(_config: &Config) -> Result<Arc<dyn ProviderClient>> {
    Err(anyhow!(
        "The web backend drives a real desktop session; rebuild with --features desktop"
    ))
}

async fn run_job(args: RunArgs) -> Result<()> {
    let mut config = load_or_create_config(&args.config_path, args.log_level.as_ref())?;

    // Override config with CLI options if provided
    if let Some(provider) = &args.provider {
        config.translation.provider = provider.clone().into();
    }
    if let Some(backend) = &args.backend {
        config.translation.backend = backend.clone().into();
    }
    if let Some(model) = &args.model {
        let provider_str = config.translation.provider.to_lowercase_string();
        if let Some(provider_config) = config
            .translation
            .available_providers
            .iter_mut()
            .find(|p| p.provider_type == provider_str)
        {
            provider_config.model = model.clone();
        }
    }

    config.validate().context("Configuration validation failed")?;

    let prompt_template = resolve_prompt(&args, &config)?;

    let id_range = match (args.start_id, args.stop_id) {
        (None, None) => None,
        (start, stop) => Some((start.unwrap_or(0), stop.unwrap_or(u64::MAX))),
    };

    let batch_config = BatchConfig {
        input: args.input_path.clone(),
        output: args.output.clone(),
        batch_size: args.batch_size,
        id_range,
        prompt_template,
        mode: if args.manual {
            DispatchMode::Manual
        } else {
            DispatchMode::Automatic
        },
        encoding: args.encoding.clone(),
    };

    let client = build_client(&config)?;
    let pool = Arc::new(CredentialPool::with_thresholds(
        config.translation.get_api_keys(),
        1,
        config.translation.get_rate_limit_quarantine_after(),
    ));
    let policy = RetryPolicy::new(
        config.translation.common.retry_count,
        Duration::from_millis(config.translation.common.retry_backoff_ms),
        Duration::from_millis(config.translation.common.retry_backoff_cap_ms),
    );

    // Per-call deadline differs by backend: a network call answers in
    // seconds, a driven chat session legitimately takes minutes
    let call_timeout = Duration::from_secs(match config.translation.backend {
        BackendKind::Api => config.translation.get_timeout_secs(),
        BackendKind::Web => config.automation.max_wait_secs,
    });
    let options = SchedulerOptions {
        model: config.translation.get_model(),
        call_timeout,
        batch_pause: Duration::from_secs(config.translation.common.batch_pause_secs),
    };

    let scheduler = BatchScheduler::new(client, pool, policy, options);
    let (handle, mut events) = scheduler.start(batch_config);

    // Ctrl-c stops cleanly after the in-flight record
    {
        let stopper = handle.stop_handle();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!();
                warn!("Interrupt received, stopping after the current record...");
                stopper.stop();
            }
        });
    }

    // Drain events into a progress bar
    let bar = ProgressBar::hidden();
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut bar_started = false;
    while let Some(event) = events.recv().await {
        match event {
            JobEvent::Log { .. } => {
                // Engine log events are already mirrored onto the log
                // facade; printing them again here would duplicate them
            }
            JobEvent::Progress(progress) => {
                if !bar_started {
                    bar.set_length(progress.total);
                    bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
                    bar_started = true;
                }
                bar.set_position(progress.completed + progress.failed);
                bar.set_message(format!(
                    "batch {} | done {} failed {}",
                    progress.current_batch, progress.completed, progress.failed
                ));
            }
            JobEvent::Error { .. } => {
                // Already logged through the log facade by the engine
            }
            JobEvent::Completed(summary) => {
                bar.finish_and_clear();
                let state = if summary.stopped { "stopped" } else { "completed" };
                println!("Run {}: {} done, {} failed", state, summary.done, summary.failed);
                for (kind, count) in &summary.failed_by_kind {
                    println!("  {}: {}", kind, count);
                }
            }
        }
    }

    let final_state = handle.state();
    let summary = handle.join().await.map_err(|e| anyhow!(e.to_string()))?;

    if final_state == JobState::Stopped {
        std::process::exit(2);
    }
    if summary.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
