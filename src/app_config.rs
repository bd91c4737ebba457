use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::path::PathBuf;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Source language code of the input records (e.g. "cn", "jp")
    pub source_language: String,

    /// Target language code of the translations
    pub target_language: String,

    /// Translation config
    pub translation: TranslationConfig,

    /// Web automation config (anchors, polling, thresholds)
    #[serde(default)]
    pub automation: AutomationConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Translation provider type
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    // @provider: Google Gemini
    #[default]
    Gemini,
    // @provider: OpenAI ChatGPT
    OpenAi,
    // @provider: Anthropic Claude
    Claude,
    // @provider: xAI Grok
    Grok,
    // @provider: Perplexity
    Perplexity,
}

impl ProviderKind {
    // @returns: Capitalized provider name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Gemini => "Gemini",
            Self::OpenAi => "OpenAI",
            Self::Claude => "Claude",
            Self::Grok => "Grok",
            Self::Perplexity => "Perplexity",
        }
    }

    // @returns: Lowercase provider identifier
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::Gemini => "gemini".to_string(),
            Self::OpenAi => "openai".to_string(),
            Self::Claude => "claude".to_string(),
            Self::Grok => "grok".to_string(),
            Self::Perplexity => "perplexity".to_string(),
        }
    }

    /// All known provider kinds
    pub fn all() -> [ProviderKind; 5] {
        [
            Self::Gemini,
            Self::OpenAi,
            Self::Claude,
            Self::Grok,
            Self::Perplexity,
        ]
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "openai" | "chatgpt" => Ok(Self::OpenAi),
            "claude" | "anthropic" => Ok(Self::Claude),
            "grok" => Ok(Self::Grok),
            "perplexity" => Ok(Self::Perplexity),
            _ => Err(anyhow!("Invalid provider type: {}", s)),
        }
    }
}

/// How a provider is reached: its network API or a driven browser session
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Direct request/response against the provider's HTTP endpoint
    #[default]
    Api,
    /// Simulated user session against the provider's chat web UI
    Web,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Api => write!(f, "api"),
            Self::Web => write!(f, "web"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "api" => Ok(Self::Api),
            "web" | "automation" => Ok(Self::Web),
            _ => Err(anyhow!("Invalid backend type: {}", s)),
        }
    }
}

/// Provider configuration wrapper
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    // @field: Provider type identifier
    #[serde(rename = "type")]
    pub provider_type: String,

    // @field: Model name
    #[serde(default = "String::new")]
    pub model: String,

    // @field: API keys, rotated on failure
    #[serde(default)]
    pub api_keys: Vec<String>,

    // @field: Service URL
    #[serde(default = "String::new")]
    pub endpoint: String,

    // @field: Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    // @field: Nucleus sampling mass
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    // @field: Max tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    // @field: Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    // @field: Rate-limit failures tolerated before a key is quarantined
    #[serde(default = "default_rate_limit_quarantine_after")]
    pub rate_limit_quarantine_after: u32,
}

impl ProviderConfig {
    // @param kind: Provider enum
    // @returns: Provider config with defaults
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            provider_type: kind.to_lowercase_string(),
            model: default_model(kind).to_string(),
            api_keys: Vec::new(),
            endpoint: default_endpoint(kind).to_string(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: match kind {
                ProviderKind::Gemini => 8192,
                _ => default_max_tokens(),
            },
            timeout_secs: default_timeout_secs(),
            rate_limit_quarantine_after: default_rate_limit_quarantine_after(),
        }
    }
}

/// Sampling parameters forwarded to a provider on every call
#[derive(Debug, Clone, Copy)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

/// Translation service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationConfig {
    /// Translation provider to use
    #[serde(default)]
    pub provider: ProviderKind,

    /// How the provider is reached
    #[serde(default)]
    pub backend: BackendKind,

    /// Available translation providers
    #[serde(default)]
    pub available_providers: Vec<ProviderConfig>,

    /// Common translation settings
    #[serde(default)]
    pub common: TranslationCommonConfig,
}

/// Common translation settings applicable to all providers
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationCommonConfig {
    /// Retry count for transient failures (timeouts, unstable UI state)
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Backoff base for retries (in milliseconds), doubled on each attempt
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Cap applied to the exponential backoff (in milliseconds)
    #[serde(default = "default_retry_backoff_cap_ms")]
    pub retry_backoff_cap_ms: u64,

    /// Pause between consecutive batches (in seconds)
    #[serde(default = "default_batch_pause_secs")]
    pub batch_pause_secs: u64,
}

impl Default for TranslationCommonConfig {
    fn default() -> Self {
        Self {
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            retry_backoff_cap_ms: default_retry_backoff_cap_ms(),
            batch_pause_secs: default_batch_pause_secs(),
        }
    }
}

/// How the automation backend decides a response has finished rendering
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompletionSignal {
    /// The busy indicator disappears from the screen
    #[default]
    BusyClears,
    /// A dedicated "response ready" marker appears
    MarkerAppears,
}

/// Configuration for the template-recognition automation backend
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AutomationConfig {
    /// Directory holding one sub-directory of anchor images per provider
    #[serde(default = "default_anchor_dir")]
    pub anchor_dir: PathBuf,

    /// Interval between screen polls while waiting for a response (ms)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Time allowed for the input box anchor to appear at session start (s)
    #[serde(default = "default_bootstrap_timeout_secs")]
    pub bootstrap_timeout_secs: u64,

    /// Maximum time to wait for one response (s)
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,

    /// Minimum normalized correlation score for an anchor match
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,

    /// What marks a response as complete
    #[serde(default)]
    pub completion: CompletionSignal,
}

impl AutomationConfig {
    /// Vertical click offset applied to the input box anchor.
    /// Some chat UIs overlay hint text on the anchor's center.
    pub fn input_click_offset(&self, kind: ProviderKind) -> i32 {
        match kind {
            ProviderKind::Perplexity => -20,
            _ => 0,
        }
    }
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            anchor_dir: default_anchor_dir(),
            poll_interval_ms: default_poll_interval_ms(),
            bootstrap_timeout_secs: default_bootstrap_timeout_secs(),
            max_wait_secs: default_max_wait_secs(),
            match_threshold: default_match_threshold(),
            completion: CompletionSignal::default(),
        }
    }
}

/// How records are dispatched across batches
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Batches run back to back with only the configured pause between them
    #[default]
    Automatic,
    /// The operator confirms each batch after the first
    Manual,
}

/// Per-run parameters supplied by the caller. Immutable for the duration
/// of one run.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Input dataset path (.csv/.tsv or .xlsx)
    pub input: PathBuf,

    /// Output dataset path; derived from the input path when absent
    pub output: Option<PathBuf>,

    /// Records dispatched per batch
    pub batch_size: usize,

    /// Optional inclusive id range filter
    pub id_range: Option<(u64, u64)>,

    /// Instruction template with a `{text}` placeholder
    pub prompt_template: String,

    /// Automatic or operator-confirmed batches
    pub mode: DispatchMode,

    /// Explicit input encoding label; auto-detected when absent
    pub encoding: Option<String>,
}

impl BatchConfig {
    /// Minimal config for a run over `input` with the given prompt
    pub fn new(input: impl Into<PathBuf>, prompt_template: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: None,
            batch_size: default_batch_size(),
            id_range: None,
            prompt_template: prompt_template.into(),
            mode: DispatchMode::default(),
            encoding: None,
        }
    }

    /// Resolved output path: configured, or `<stem>_translated.<ext>` next
    /// to the input
    pub fn output_path(&self) -> PathBuf {
        if let Some(out) = &self.output {
            return out.clone();
        }
        let stem = self
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".to_string());
        let ext = self
            .input
            .extension()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "csv".to_string());
        self.input
            .with_file_name(format!("{}_translated.{}", stem, ext))
    }

    /// Validate per-run parameters before a scheduler accepts them
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(anyhow!("Batch size must be at least 1"));
        }
        if let Some((start, end)) = self.id_range {
            if start > end {
                return Err(anyhow!("Invalid id range: {} > {}", start, end));
            }
        }
        if self.prompt_template.trim().is_empty() {
            return Err(anyhow!("Prompt template must not be empty"));
        }
        Ok(())
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

fn default_batch_size() -> usize {
    10
}

fn default_temperature() -> f32 {
    1.0
}

fn default_top_p() -> f32 {
    1.0
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_rate_limit_quarantine_after() -> u32 {
    1
}

fn default_retry_count() -> u32 {
    3 // Default to 3 attempts for transient failures
}

fn default_retry_backoff_ms() -> u64 {
    1000 // 1 second base backoff time, doubled on each retry
}

fn default_retry_backoff_cap_ms() -> u64 {
    30_000
}

fn default_batch_pause_secs() -> u64 {
    2
}

fn default_anchor_dir() -> PathBuf {
    PathBuf::from("assets/anchors")
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_bootstrap_timeout_secs() -> u64 {
    10
}

fn default_max_wait_secs() -> u64 {
    300
}

fn default_match_threshold() -> f64 {
    0.85
}

fn default_model(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Gemini => "gemini-1.5-flash",
        ProviderKind::OpenAi => "gpt-4o-mini",
        ProviderKind::Claude => "claude-3-haiku-20240307",
        ProviderKind::Grok => "grok-2-latest",
        ProviderKind::Perplexity => "sonar",
    }
}

fn default_endpoint(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Gemini => "https://generativelanguage.googleapis.com",
        ProviderKind::OpenAi => "https://api.openai.com",
        ProviderKind::Claude => "https://api.anthropic.com",
        ProviderKind::Grok => "https://api.x.ai",
        ProviderKind::Perplexity => "https://api.perplexity.ai",
    }
}

impl Config {
    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        if self.source_language.trim().is_empty() || self.target_language.trim().is_empty() {
            return Err(anyhow!("Source and target languages are required"));
        }

        // API backends need at least one key for the active provider
        if self.translation.backend == BackendKind::Api
            && self.translation.get_api_keys().is_empty()
        {
            return Err(anyhow!(
                "At least one API key is required for {} over the API backend",
                self.translation.provider.display_name()
            ));
        }

        if self.translation.get_rate_limit_quarantine_after() == 0 {
            return Err(anyhow!("rate_limit_quarantine_after must be at least 1"));
        }

        if !(0.0..=1.0).contains(&self.automation.match_threshold) {
            return Err(anyhow!("Anchor match threshold must be within 0.0..=1.0"));
        }

        Ok(())
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            source_language: "cn".to_string(),
            target_language: "vi".to_string(),
            translation: TranslationConfig::default(),
            automation: AutomationConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}

impl TranslationConfig {
    /// Get the active provider configuration from the available_providers array
    pub fn get_active_provider_config(&self) -> Option<&ProviderConfig> {
        let provider_str = self.provider.to_lowercase_string();
        self.available_providers
            .iter()
            .find(|p| p.provider_type == provider_str)
    }

    /// Get a specific provider configuration by type
    pub fn get_provider_config(&self, kind: &ProviderKind) -> Option<&ProviderConfig> {
        let provider_str = kind.to_lowercase_string();
        self.available_providers
            .iter()
            .find(|p| p.provider_type == provider_str)
    }

    /// Get the model for the active provider
    pub fn get_model(&self) -> String {
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.model.is_empty() {
                return provider_config.model.clone();
            }
        }
        default_model(self.provider).to_string()
    }

    /// Get the configured API keys for the active provider
    pub fn get_api_keys(&self) -> Vec<String> {
        self.get_active_provider_config()
            .map(|p| p.api_keys.clone())
            .unwrap_or_default()
    }

    /// Get the endpoint for the active provider
    pub fn get_endpoint(&self) -> String {
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.endpoint.is_empty() {
                return provider_config.endpoint.clone();
            }
        }
        default_endpoint(self.provider).to_string()
    }

    /// Get the per-call timeout for the active provider, in seconds
    pub fn get_timeout_secs(&self) -> u64 {
        self.get_active_provider_config()
            .map(|p| p.timeout_secs)
            .unwrap_or_else(default_timeout_secs)
    }

    /// Get the sampling parameters for the active provider
    pub fn get_generation_params(&self) -> GenerationParams {
        if let Some(p) = self.get_active_provider_config() {
            GenerationParams {
                temperature: p.temperature,
                top_p: p.top_p,
                max_tokens: p.max_tokens,
            }
        } else {
            GenerationParams {
                temperature: default_temperature(),
                top_p: default_top_p(),
                max_tokens: default_max_tokens(),
            }
        }
    }

    /// Rate-limit failures tolerated before a key is quarantined
    pub fn get_rate_limit_quarantine_after(&self) -> u32 {
        self.get_active_provider_config()
            .map(|p| p.rate_limit_quarantine_after)
            .unwrap_or_else(default_rate_limit_quarantine_after)
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        let mut config = Self {
            provider: ProviderKind::default(),
            backend: BackendKind::default(),
            available_providers: Vec::new(),
            common: TranslationCommonConfig::default(),
        };

        // Add default providers
        for kind in ProviderKind::all() {
            config.available_providers.push(ProviderConfig::new(kind));
        }

        config
    }
}
