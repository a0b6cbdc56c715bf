use anyhow::{anyhow, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::timeline::WindowLimit;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings. The configuration is built
/// once at startup and passed explicitly to every component.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Language model used for scripts and search phrases
    #[serde(default)]
    pub llm: LlmConfig,

    /// Text-to-speech settings
    #[serde(default)]
    pub narration: NarrationConfig,

    /// Word-level transcription settings
    #[serde(default)]
    pub transcription: TranscriptionConfig,

    /// Stock footage search settings
    #[serde(default)]
    pub footage: FootageConfig,

    /// Timeline tolerances and window limits
    #[serde(default)]
    pub timing: TimingConfig,

    /// Output video settings
    #[serde(default)]
    pub render: RenderConfig,

    /// Retry policy for every collaborator call
    #[serde(default)]
    pub retry: RetryConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Language model provider type (all speak the OpenAI chat completions API)
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    // @provider: Groq
    #[default]
    Groq,
    // @provider: OpenAI
    OpenAI,
    // @provider: LM Studio (OpenAI-compatible local server)
    LMStudio,
}

impl LlmProvider {
    // @returns: Capitalized provider name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Groq => "Groq",
            Self::OpenAI => "OpenAI",
            Self::LMStudio => "LM Studio",
        }
    }

    // @returns: Lowercase provider identifier
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::Groq => "groq".to_string(),
            Self::OpenAI => "openai".to_string(),
            Self::LMStudio => "lmstudio".to_string(),
        }
    }

    // @returns: Environment variable holding the API key, if any
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Self::Groq => Some("GROQ_API_KEY"),
            Self::OpenAI => Some("OPENAI_API_KEY"),
            Self::LMStudio => None,
        }
    }
}

// Implement Display trait for LlmProvider
impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

// Implement FromStr trait for LlmProvider
impl std::str::FromStr for LlmProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "groq" => Ok(Self::Groq),
            "openai" => Ok(Self::OpenAI),
            "lmstudio" => Ok(Self::LMStudio),
            _ => Err(anyhow!("Invalid provider type: {}", s)),
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

    // @field: API key (falls back to the provider's environment variable)
    #[serde(default = "String::new")]
    pub api_key: String,

    // @field: Service URL
    #[serde(default = "String::new")]
    pub endpoint: String,

    // @field: Max concurrent requests
    #[serde(default = "default_concurrent_requests")]
    pub concurrent_requests: usize,

    // @field: Timeout seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProviderConfig {
    // @param provider_type: Provider enum
    // @returns: Provider config with defaults
    pub fn new(provider_type: LlmProvider) -> Self {
        let (model, endpoint) = match provider_type {
            LlmProvider::Groq => (default_groq_model(), default_groq_endpoint()),
            LlmProvider::OpenAI => (default_openai_model(), default_openai_endpoint()),
            LlmProvider::LMStudio => (default_lmstudio_model(), default_lmstudio_endpoint()),
        };
        Self {
            provider_type: provider_type.to_lowercase_string(),
            model,
            api_key: String::new(),
            endpoint,
            concurrent_requests: default_concurrent_requests(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Language model configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LlmConfig {
    /// Provider to use
    #[serde(default)]
    pub provider: LlmProvider,

    /// Available providers
    #[serde(default)]
    pub available_providers: Vec<ProviderConfig>,

    /// Prompt settings shared by all providers
    #[serde(default)]
    pub common: LlmCommonConfig,
}

/// Generation settings applicable to all providers
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LlmCommonConfig {
    /// Target narration length of the story in seconds
    #[serde(default = "default_target_duration_secs")]
    pub target_duration_secs: u32,

    /// Temperature for story writing (higher is more creative)
    #[serde(default = "default_script_temperature")]
    pub script_temperature: f32,

    /// Maximum tokens for the story response
    #[serde(default = "default_script_max_tokens")]
    pub script_max_tokens: u32,

    /// Temperature for search phrase suggestions
    #[serde(default = "default_query_temperature")]
    pub query_temperature: f32,

    /// Maximum tokens for a search phrase response
    #[serde(default = "default_query_max_tokens")]
    pub query_max_tokens: u32,

    /// Number of ranked phrases requested per segment
    #[serde(default = "default_phrases_per_segment")]
    pub phrases_per_segment: usize,
}

impl Default for LlmCommonConfig {
    fn default() -> Self {
        Self {
            target_duration_secs: default_target_duration_secs(),
            script_temperature: default_script_temperature(),
            script_max_tokens: default_script_max_tokens(),
            query_temperature: default_query_temperature(),
            query_max_tokens: default_query_max_tokens(),
            phrases_per_segment: default_phrases_per_segment(),
        }
    }
}

/// Text-to-speech configuration (OpenAI-compatible `/audio/speech`)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NarrationConfig {
    #[serde(default = "default_openai_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_tts_model")]
    pub model: String,

    /// Voice name understood by the speech endpoint
    #[serde(default = "default_voice")]
    pub voice: String,

    /// API key (falls back to OPENAI_API_KEY)
    #[serde(default = "String::new")]
    pub api_key: String,

    /// Narration audio file written for each run
    #[serde(default = "default_audio_file")]
    pub audio_file: String,

    /// ffprobe binary used to measure the narration duration
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_openai_endpoint(),
            model: default_tts_model(),
            voice: default_voice(),
            api_key: String::new(),
            audio_file: default_audio_file(),
            ffprobe_path: default_ffprobe_path(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl NarrationConfig {
    pub fn resolved_api_key(&self) -> String {
        key_or_env(&self.api_key, "OPENAI_API_KEY")
    }
}

/// Transcription configuration (OpenAI-compatible `/audio/transcriptions`)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranscriptionConfig {
    #[serde(default = "default_groq_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_transcription_model")]
    pub model: String,

    /// API key (falls back to GROQ_API_KEY)
    #[serde(default = "String::new")]
    pub api_key: String,

    #[serde(default = "default_transcription_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_groq_endpoint(),
            model: default_transcription_model(),
            api_key: String::new(),
            timeout_secs: default_transcription_timeout_secs(),
        }
    }
}

impl TranscriptionConfig {
    pub fn resolved_api_key(&self) -> String {
        key_or_env(&self.api_key, "GROQ_API_KEY")
    }
}

/// Stock footage search configuration (Pexels video API)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FootageConfig {
    #[serde(default = "default_pexels_endpoint")]
    pub endpoint: String,

    /// API key (falls back to PEXELS_KEY)
    #[serde(default = "String::new")]
    pub api_key: String,

    /// Results requested per search
    #[serde(default = "default_per_page")]
    pub per_page: u32,

    /// Minimum natural duration as a fraction of the required duration
    #[serde(default = "default_min_usable_fraction")]
    pub min_usable_fraction: f64,

    /// Generic phrase tried when every ranked phrase is exhausted
    #[serde(default = "default_fallback_query")]
    pub fallback_query: Option<String>,

    /// Segments resolved concurrently
    #[serde(default = "default_concurrent_requests")]
    pub max_concurrent_requests: usize,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FootageConfig {
    fn default() -> Self {
        Self {
            endpoint: default_pexels_endpoint(),
            api_key: String::new(),
            per_page: default_per_page(),
            min_usable_fraction: default_min_usable_fraction(),
            fallback_query: default_fallback_query(),
            max_concurrent_requests: default_concurrent_requests(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl FootageConfig {
    pub fn resolved_api_key(&self) -> String {
        key_or_env(&self.api_key, "PEXELS_KEY")
    }
}

/// Timeline tolerances and window limits
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TimingConfig {
    /// Allowed timing discrepancy (epsilon) in milliseconds
    #[serde(default = "default_tolerance_ms")]
    pub tolerance_ms: u64,

    /// Longest caption window in milliseconds
    #[serde(default = "default_caption_max_window_ms")]
    pub caption_max_window_ms: u64,

    /// Most words shown in one caption window
    #[serde(default = "default_caption_max_words")]
    pub caption_max_words: usize,

    /// Longest footage segment in milliseconds
    #[serde(default = "default_segment_max_ms")]
    pub segment_max_ms: u64,

    /// When set, split the narration into this many segments instead
    #[serde(default)]
    pub segment_target_count: Option<usize>,

    /// Largest drift the last segment may absorb
    #[serde(default = "default_max_residual_ms")]
    pub max_residual_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tolerance_ms: default_tolerance_ms(),
            caption_max_window_ms: default_caption_max_window_ms(),
            caption_max_words: default_caption_max_words(),
            segment_max_ms: default_segment_max_ms(),
            segment_target_count: None,
            max_residual_ms: default_max_residual_ms(),
        }
    }
}

impl TimingConfig {
    /// Window limit for captions
    pub fn caption_limit(&self) -> WindowLimit {
        WindowLimit::MaxDuration {
            max_ms: self.caption_max_window_ms,
            max_words: self.caption_max_words,
        }
    }

    /// Window limit for footage segments
    pub fn segment_limit(&self) -> WindowLimit {
        match self.segment_target_count {
            Some(count) => WindowLimit::TargetCount(count),
            None => WindowLimit::MaxDuration {
                max_ms: self.segment_max_ms,
                max_words: usize::MAX,
            },
        }
    }
}

/// Video orientation
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

impl Orientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Portrait => "portrait",
            Self::Landscape => "landscape",
        }
    }

    // @returns: Output frame size (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::Portrait => (1080, 1920),
            Self::Landscape => (1920, 1080),
        }
    }

    pub fn font_size(&self) -> u32 {
        match self {
            Self::Portrait => 60,
            Self::Landscape => 80,
        }
    }
}

/// Output video configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RenderConfig {
    #[serde(default)]
    pub orientation: Orientation,

    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Output file used when the command line gives none
    #[serde(default = "default_output_file")]
    pub output_file: String,

    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    /// Caption font size override
    #[serde(default)]
    pub font_size: Option<u32>,

    /// Give up on ffmpeg after this many seconds
    #[serde(default = "default_render_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            orientation: Orientation::default(),
            fps: default_fps(),
            output_file: default_output_file(),
            ffmpeg_path: default_ffmpeg_path(),
            font_size: None,
            timeout_secs: default_render_timeout_secs(),
        }
    }
}

impl RenderConfig {
    /// Duration of one output frame in milliseconds (rounded up)
    pub fn frame_ms(&self) -> u64 {
        let fps = self.fps.max(1) as u64;
        1000_u64.div_ceil(fps)
    }

    pub fn font_size(&self) -> u32 {
        self.font_size.unwrap_or_else(|| self.orientation.font_size())
    }
}

/// Retry settings for collaborator calls
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryConfig {
    /// Retry count for failed requests
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Backoff multiplier for retries (in milliseconds)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Longest single backoff (in milliseconds)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Randomize backoffs slightly
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            jitter: true,
        }
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

fn key_or_env(key: &str, env_var: &str) -> String {
    if key.is_empty() {
        std::env::var(env_var).unwrap_or_default()
    } else {
        key.to_string()
    }
}

fn default_concurrent_requests() -> usize {
    4
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_transcription_timeout_secs() -> u64 {
    120
}

fn default_render_timeout_secs() -> u64 {
    1800
}

fn default_retry_count() -> u32 {
    3 // Default to 3 retries
}

fn default_retry_backoff_ms() -> u64 {
    1000 // 1 second base backoff time, doubled on each retry
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

fn default_target_duration_secs() -> u32 {
    60
}

fn default_script_temperature() -> f32 {
    0.8
}

fn default_script_max_tokens() -> u32 {
    500
}

fn default_query_temperature() -> f32 {
    0.7
}

fn default_query_max_tokens() -> u32 {
    300
}

fn default_phrases_per_segment() -> usize {
    3
}

fn default_groq_endpoint() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_lmstudio_endpoint() -> String {
    // LM Studio default server (OpenAI compatible) runs on port 1234 under /v1
    "http://localhost:1234/v1".to_string()
}

fn default_pexels_endpoint() -> String {
    "https://api.pexels.com".to_string()
}

fn default_groq_model() -> String {
    "llama3-70b-8192".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_lmstudio_model() -> String {
    // Placeholder; users should set to the loaded model name in LM Studio
    "local-model".to_string()
}

fn default_tts_model() -> String {
    "tts-1".to_string()
}

fn default_voice() -> String {
    "onyx".to_string()
}

fn default_audio_file() -> String {
    "story_audio.mp3".to_string()
}

fn default_ffprobe_path() -> String {
    "ffprobe".to_string()
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_transcription_model() -> String {
    "whisper-large-v3".to_string()
}

fn default_per_page() -> u32 {
    20
}

fn default_min_usable_fraction() -> f64 {
    0.5
}

fn default_fallback_query() -> Option<String> {
    Some("cinematic landscape".to_string())
}

fn default_tolerance_ms() -> u64 {
    50
}

fn default_caption_max_window_ms() -> u64 {
    6_000
}

fn default_caption_max_words() -> usize {
    15
}

fn default_segment_max_ms() -> u64 {
    8_000
}

fn default_max_residual_ms() -> u64 {
    1_500
}

fn default_fps() -> u32 {
    30
}

fn default_output_file() -> String {
    "rendered_video.mp4".to_string()
}

impl Config {
    /// Load the configuration file, writing a default one when it does not exist
    pub fn load_or_create(config_path: &str) -> Result<Self> {
        if Path::new(config_path).exists() {
            let file = File::open(config_path)
                .context(format!("Failed to open config file: {}", config_path))?;
            let reader = BufReader::new(file);
            let config: Config = serde_json::from_reader(reader)
                .context(format!("Failed to parse config file: {}", config_path))?;
            return Ok(config);
        }

        warn!("Config file not found at '{}', creating default config.", config_path);
        let config = Config::default();
        let config_json = serde_json::to_string_pretty(&config)
            .context("Failed to serialize default config to JSON")?;
        std::fs::write(config_path, config_json)
            .context(format!("Failed to write default config to file: {}", config_path))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        if self.llm.provider != LlmProvider::LMStudio && self.llm.get_api_key().is_empty() {
            return Err(anyhow!(
                "API key is required for the {} provider (set it in the config or {})",
                self.llm.provider.display_name(),
                self.llm.provider.api_key_env().unwrap_or("the config file")
            ));
        }
        if self.narration.resolved_api_key().is_empty() {
            return Err(anyhow!("Narration API key is required (config or OPENAI_API_KEY)"));
        }
        if self.transcription.resolved_api_key().is_empty() {
            return Err(anyhow!("Transcription API key is required (config or GROQ_API_KEY)"));
        }
        if self.footage.resolved_api_key().is_empty() {
            return Err(anyhow!("Footage API key is required (config or PEXELS_KEY)"));
        }

        self.validate_limits()
    }

    /// Validate numeric limits only
    pub fn validate_limits(&self) -> Result<()> {
        if self.llm.common.phrases_per_segment == 0 {
            return Err(anyhow!("phrases_per_segment must be at least 1"));
        }
        if !(self.footage.min_usable_fraction > 0.0 && self.footage.min_usable_fraction <= 1.0) {
            return Err(anyhow!(
                "min_usable_fraction must be in (0, 1], got {}",
                self.footage.min_usable_fraction
            ));
        }
        if self.footage.max_concurrent_requests == 0 {
            return Err(anyhow!("max_concurrent_requests must be at least 1"));
        }
        if self.timing.caption_max_window_ms == 0 || self.timing.segment_max_ms == 0 {
            return Err(anyhow!("Window limits must be positive"));
        }
        if self.timing.caption_max_words == 0 {
            return Err(anyhow!("caption_max_words must be at least 1"));
        }
        if self.timing.segment_target_count == Some(0) {
            return Err(anyhow!("segment_target_count must be at least 1 when set"));
        }
        if self.render.fps == 0 {
            return Err(anyhow!("fps must be positive"));
        }
        Ok(())
    }
}

impl LlmConfig {
    /// Get the active provider configuration from the available_providers array
    pub fn get_active_provider_config(&self) -> Option<&ProviderConfig> {
        let provider_str = self.provider.to_lowercase_string();
        self.available_providers.iter()
            .find(|p| p.provider_type == provider_str)
    }

    /// Get the model for the active provider
    pub fn get_model(&self) -> String {
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.model.is_empty() {
                return provider_config.model.clone();
            }
        }

        match self.provider {
            LlmProvider::Groq => default_groq_model(),
            LlmProvider::OpenAI => default_openai_model(),
            LlmProvider::LMStudio => default_lmstudio_model(),
        }
    }

    /// Get the API key for the active provider, falling back to its environment variable
    pub fn get_api_key(&self) -> String {
        let configured = self
            .get_active_provider_config()
            .map(|p| p.api_key.clone())
            .unwrap_or_default();
        match self.provider.api_key_env() {
            Some(env_var) => key_or_env(&configured, env_var),
            None => configured,
        }
    }

    /// Get the endpoint for the active provider
    pub fn get_endpoint(&self) -> String {
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.endpoint.is_empty() {
                return provider_config.endpoint.clone();
            }
        }

        match self.provider {
            LlmProvider::Groq => default_groq_endpoint(),
            LlmProvider::OpenAI => default_openai_endpoint(),
            LlmProvider::LMStudio => default_lmstudio_endpoint(),
        }
    }

    pub fn get_timeout_secs(&self) -> u64 {
        self.get_active_provider_config()
            .map(|p| p.timeout_secs)
            .unwrap_or_else(default_timeout_secs)
    }

    pub fn optimal_concurrent_requests(&self) -> usize {
        self.get_active_provider_config()
            .map(|p| p.concurrent_requests.max(1))
            .unwrap_or_else(default_concurrent_requests)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            available_providers: vec![
                ProviderConfig::new(LlmProvider::Groq),
                ProviderConfig::new(LlmProvider::OpenAI),
                ProviderConfig::new(LlmProvider::LMStudio),
            ],
            common: LlmCommonConfig::default(),
        }
    }
}
