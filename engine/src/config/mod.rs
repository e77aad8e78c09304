//! Configuration management
//!
//! This module handles loading, validation, and management of the engine configuration.
//! Configuration is stored in TOML format at ~/.cctdi/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **llm**: LLM provider settings and preferences
//! - **interview**: Round bounds, retry contract, mode and sufficiency thresholds
//! - **batch**: Concurrent virtual-subject runs
//! - **output**: Where transcripts and reports are recorded
//!
//! # Path Expansion
//!
//! `~` is expanded to the user's home directory for `core.data_dir`,
//! `batch.personas_dir` and `output.jsonl_file`. The data directory is
//! created if it doesn't exist.
//!
//! # Examples
//!
//! ```no_run
//! use cctdi_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//!
//! println!("Default provider: {}", config.llm.default_provider);
//! println!("Rounds: {}..={}", config.interview.min_rounds, config.interview.max_rounds);
//! # Ok(())
//! # }
//! ```

use sdk::errors::AssessmentError;
use sdk::types::{MAX_SCORE, MIN_SCORE};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    #[serde(default)]
    pub core: CoreConfig,

    /// LLM provider configuration
    #[serde(default)]
    pub llm: LLMConfig,

    /// Interview controller settings
    #[serde(default)]
    pub interview: InterviewConfig,

    /// Batch evaluation settings
    #[serde(default)]
    pub batch: BatchConfig,

    /// Report sink settings
    #[serde(default)]
    pub output: OutputConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Default LLM provider (ollama, openai, anthropic)
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Per-attempt timeout for cloud providers, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Ollama provider settings
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// OpenAI-compatible provider settings
    #[serde(default)]
    pub openai: OpenAIConfig,

    /// Anthropic provider settings
    #[serde(default)]
    pub anthropic: AnthropicConfig,
}

/// Ollama provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL for Ollama API
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

/// OpenAI-compatible provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    /// Base URL for the chat completions API
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_openai_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,
}

/// Anthropic provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    /// Base URL for Anthropic API
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_anthropic_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_anthropic_key_env")]
    pub api_key_env: String,
}

/// Which sufficiency strategy the diagnostic agent uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticStrategy {
    Heuristic,
    Llm,
}

/// Interview controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewConfig {
    /// Rounds every dimension must reach before it may be scored
    #[serde(default = "default_min_rounds")]
    pub min_rounds: u32,

    /// Hard ceiling on rounds per dimension
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Attempts per external call, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pause between attempts (0 = immediate)
    #[serde(default)]
    pub retry_delay_ms: u64,

    /// Answers shorter than this switch the next round to Encourage
    #[serde(default = "default_short_answer_chars")]
    pub short_answer_chars: usize,

    /// Answers longer than this switch the next round to Probe
    #[serde(default = "default_detailed_answer_chars")]
    pub detailed_answer_chars: usize,

    /// Cumulative answer characters that count as enough evidence
    #[serde(default = "default_evidence_chars")]
    pub evidence_chars: usize,

    /// Sub-facets that must be covered to count as enough evidence
    #[serde(default = "default_required_facets")]
    pub required_facets: usize,

    /// Score used when the judge gives nothing usable
    #[serde(default = "default_fallback_score")]
    pub fallback_score: u32,

    /// Sufficiency strategy
    #[serde(default = "default_diagnostic")]
    pub diagnostic: DiagnosticStrategy,
}

/// Batch evaluation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Sessions interviewed concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Directory of persona files (supports ~ expansion)
    #[serde(default = "default_personas_dir")]
    pub personas_dir: PathBuf,
}

/// Report sink selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Sqlite,
    Jsonl,
    None,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Sink that receives turn records and reports
    #[serde(default = "default_sink")]
    pub sink: SinkKind,

    /// JSON-lines file used by the `jsonl` sink (supports ~ expansion)
    #[serde(default = "default_jsonl_file")]
    pub jsonl_file: PathBuf,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.cctdi")
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com/v1".to_string()
}

fn default_ollama_model() -> String {
    "qwen2.5:7b".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-5-haiku-20241022".to_string()
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_anthropic_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_min_rounds() -> u32 {
    3
}

fn default_max_rounds() -> u32 {
    5
}

fn default_max_attempts() -> u32 {
    3
}

fn default_short_answer_chars() -> usize {
    20
}

fn default_detailed_answer_chars() -> usize {
    100
}

fn default_evidence_chars() -> usize {
    150
}

fn default_required_facets() -> usize {
    2
}

fn default_fallback_score() -> u32 {
    43
}

fn default_diagnostic() -> DiagnosticStrategy {
    DiagnosticStrategy::Heuristic
}

fn default_workers() -> usize {
    5
}

fn default_personas_dir() -> PathBuf {
    PathBuf::from("~/.cctdi/persons")
}

fn default_sink() -> SinkKind {
    SinkKind::Sqlite
}

fn default_jsonl_file() -> PathBuf {
    PathBuf::from("~/.cctdi/user_scores.jsonl")
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            timeout_secs: default_timeout_secs(),
            ollama: OllamaConfig::default(),
            openai: OpenAIConfig::default(),
            anthropic: AnthropicConfig::default(),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
        }
    }
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            api_key_env: default_openai_key_env(),
        }
    }
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            base_url: default_anthropic_base_url(),
            model: default_anthropic_model(),
            api_key_env: default_anthropic_key_env(),
        }
    }
}

impl Default for InterviewConfig {
    fn default() -> Self {
        Self {
            min_rounds: default_min_rounds(),
            max_rounds: default_max_rounds(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: 0,
            short_answer_chars: default_short_answer_chars(),
            detailed_answer_chars: default_detailed_answer_chars(),
            evidence_chars: default_evidence_chars(),
            required_facets: default_required_facets(),
            fallback_score: default_fallback_score(),
            diagnostic: default_diagnostic(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            personas_dir: default_personas_dir(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            sink: default_sink(),
            jsonl_file: default_jsonl_file(),
        }
    }
}

impl InterviewConfig {
    /// Check the interview settings for internal consistency
    pub fn validate(&self) -> Result<(), AssessmentError> {
        if self.min_rounds == 0 || self.min_rounds > self.max_rounds {
            return Err(AssessmentError::Config(format!(
                "min_rounds ({}) must be between 1 and max_rounds ({})",
                self.min_rounds, self.max_rounds
            )));
        }
        if self.max_attempts == 0 {
            return Err(AssessmentError::Config(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if !(MIN_SCORE..=MAX_SCORE).contains(&self.fallback_score) {
            return Err(AssessmentError::Config(format!(
                "fallback_score must be between {} and {}",
                MIN_SCORE, MAX_SCORE
            )));
        }
        if self.short_answer_chars >= self.detailed_answer_chars {
            return Err(AssessmentError::Config(
                "short_answer_chars must be less than detailed_answer_chars".to_string(),
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from the default location (~/.cctdi/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, AssessmentError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, AssessmentError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| AssessmentError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config = Self::from_toml(&contents)?;
        config.validate_and_process()?;

        Ok(config)
    }

    /// Parse and validate configuration text without touching the filesystem
    pub fn from_toml(contents: &str) -> Result<Self, AssessmentError> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| AssessmentError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String, AssessmentError> {
        toml::to_string_pretty(self)
            .map_err(|e| AssessmentError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, AssessmentError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AssessmentError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        // Written before path expansion so the file keeps the portable `~` form
        let mut config = Self::default();
        fs::write(path, config.to_toml()?)
            .map_err(|e| AssessmentError::Config(format!("Failed to write config file: {}", e)))?;

        config.validate_and_process()?;
        Ok(config)
    }

    /// Get the default configuration file path (~/.cctdi/config.toml)
    pub fn default_config_path() -> Result<PathBuf, AssessmentError> {
        let home = dirs::home_dir().ok_or_else(|| {
            AssessmentError::Config("Could not determine home directory".to_string())
        })?;

        Ok(home.join(".cctdi").join("config.toml"))
    }

    /// Validate field values
    pub fn validate(&self) -> Result<(), AssessmentError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(AssessmentError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        let valid_providers = ["ollama", "openai", "anthropic"];
        if !valid_providers.contains(&self.llm.default_provider.as_str()) {
            return Err(AssessmentError::Config(format!(
                "Invalid default provider '{}'. Must be one of: {}",
                self.llm.default_provider,
                valid_providers.join(", ")
            )));
        }

        if self.llm.timeout_secs == 0 {
            return Err(AssessmentError::Config(
                "timeout_secs must be at least 1".to_string(),
            ));
        }

        self.interview.validate()?;

        if !(1..=32).contains(&self.batch.workers) {
            return Err(AssessmentError::Config(format!(
                "batch.workers must be between 1 and 32, got {}",
                self.batch.workers
            )));
        }

        Ok(())
    }

    /// Validate, expand `~` in paths and create the data directory
    fn validate_and_process(&mut self) -> Result<(), AssessmentError> {
        self.validate()?;

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        self.batch.personas_dir = expand_path(&self.batch.personas_dir)?;
        self.output.jsonl_file = expand_path(&self.output.jsonl_file)?;

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                AssessmentError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }

    /// Path of the SQLite database inside the data directory
    pub fn database_path(&self) -> PathBuf {
        self.core.data_dir.join("cctdi.db")
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, AssessmentError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| AssessmentError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| {
            AssessmentError::Config("Could not determine home directory".to_string())
        })?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| AssessmentError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_creation() {
        let config = Config::default();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.llm.default_provider, "ollama");
        assert_eq!(config.interview.min_rounds, 3);
        assert_eq!(config.interview.max_rounds, 5);
        assert_eq!(config.interview.max_attempts, 3);
        assert_eq!(config.interview.fallback_score, 43);
        assert_eq!(config.batch.workers, 5);
        assert_eq!(config.output.sink, SinkKind::Sqlite);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let path = PathBuf::from("~/test");
        let expanded = expand_path(&path).unwrap();

        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home.join("test"));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = PathBuf::from("/absolute/path");
        let expanded = expand_path(&path).unwrap();

        assert_eq!(expanded, path);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml(
            r#"
            [interview]
            max_rounds = 6
            diagnostic = "llm"
            "#,
        )
        .unwrap();

        assert_eq!(config.interview.max_rounds, 6);
        assert_eq!(config.interview.min_rounds, 3);
        assert_eq!(config.interview.diagnostic, DiagnosticStrategy::Llm);
        assert_eq!(config.llm.openai.api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn test_rejects_inverted_round_bounds() {
        let err = Config::from_toml("[interview]\nmin_rounds = 6\nmax_rounds = 5\n").unwrap_err();
        assert!(err.to_string().contains("min_rounds"));
    }

    #[test]
    fn test_rejects_bad_workers_and_provider() {
        assert!(Config::from_toml("[batch]\nworkers = 0\n").is_err());
        assert!(Config::from_toml("[batch]\nworkers = 33\n").is_err());
        assert!(Config::from_toml("[llm]\ndefault_provider = \"gemini\"\n").is_err());
    }

    #[test]
    fn test_rejects_out_of_range_fallback() {
        assert!(Config::from_toml("[interview]\nfallback_score = 61\n").is_err());
        assert!(Config::from_toml("[interview]\nfallback_score = 9\n").is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_string = config.to_toml().unwrap();

        let deserialized = Config::from_toml(&toml_string).unwrap();
        assert_eq!(config.core.log_level, deserialized.core.log_level);
        assert_eq!(config.interview, deserialized.interview);
    }
}
