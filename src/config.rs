//! Configuration for shipwright
//!
//! Settings are loaded from environment variables with defaults, then
//! overridden by CLI flags and checked with [`ShipwrightConfig::validate`].
//!
//! # Environment Variables
//!
//! - `SHIPWRIGHT_PROVIDER`: ollama|openai|claude|gemini|grok|groq - default: "ollama"
//! - `SHIPWRIGHT_MODEL`: model name - default depends on the provider
//! - `SHIPWRIGHT_REQUEST_TIMEOUT`: LLM request timeout in seconds - default: "60"
//! - `SHIPWRIGHT_LOG_LEVEL`: logging level - default: "info"
//! - `SHIPWRIGHT_MAX_RETRIES`: query attempts per investigation step - default: "3"
//! - `SHIPWRIGHT_MAX_TOOL_TURNS`: tool-use conversation turns - default: "5"
//! - `SHIPWRIGHT_SANDBOX_TIMEOUT`: container run timeout in seconds - default: "600"
//! - `SHIPWRIGHT_PULL_IMAGES`: pull tool images before running - default: "true"
//! - `SHIPWRIGHT_DEFAULT_REGION`: AWS region when `AWS_REGION` is unset - default: "us-east-1"
//!
//! Provider API keys (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, ...) and
//! `OLLAMA_HOST` are read by the genai library directly.

use crate::llm::BackendError;
use genai::adapter::AdapterKind;
use std::collections::HashMap;
use std::env;
use std::fmt;
use thiserror::Error;

pub const DEFAULT_OLLAMA_MODEL: &str = crate::llm::DEFAULT_OLLAMA_MODEL;
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_RETRIES: usize = 3;
pub const DEFAULT_MAX_TOOL_TURNS: usize = 5;
pub const DEFAULT_SANDBOX_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_PULL_IMAGES: bool = true;
pub const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid provider: {0}. Valid options: ollama, openai, claude, gemini, grok, groq")]
    InvalidProvider(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Failed to parse {field}: {error}")]
    ParseError { field: String, error: String },

    #[error("Backend initialization failed: {0}")]
    BackendInitError(#[from] BackendError),
}

#[derive(Debug, Clone)]
pub struct ShipwrightConfig {
    pub provider: AdapterKind,
    pub model: String,
    pub request_timeout_secs: u64,
    pub log_level: String,
    pub max_retries: usize,
    pub max_tool_turns: usize,
    pub sandbox_timeout_secs: u64,
    pub pull_images: bool,
    pub default_region: String,
}

/// Maps a user-facing provider name to the genai adapter.
pub fn parse_provider(name: &str) -> Result<AdapterKind, ConfigError> {
    match name.to_lowercase().as_str() {
        "ollama" => Ok(AdapterKind::Ollama),
        "openai" => Ok(AdapterKind::OpenAI),
        "claude" | "anthropic" => Ok(AdapterKind::Anthropic),
        "gemini" => Ok(AdapterKind::Gemini),
        "grok" | "xai" => Ok(AdapterKind::Xai),
        "groq" => Ok(AdapterKind::Groq),
        _ => Err(ConfigError::InvalidProvider(name.to_string())),
    }
}

pub fn default_model(provider: AdapterKind) -> &'static str {
    match provider {
        AdapterKind::Ollama => DEFAULT_OLLAMA_MODEL,
        AdapterKind::OpenAI => "gpt-4o-mini",
        AdapterKind::Anthropic => "claude-3-5-haiku-latest",
        AdapterKind::Gemini => "gemini-2.0-flash",
        AdapterKind::Xai => "grok-2-latest",
        AdapterKind::Groq => "llama-3.3-70b-versatile",
        _ => DEFAULT_OLLAMA_MODEL,
    }
}

/// Cloud region names: lowercase letters, digits and dashes, e.g. `eu-west-1`.
fn is_valid_region(region: &str) -> bool {
    !region.is_empty()
        && region
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

impl Default for ShipwrightConfig {
    fn default() -> Self {
        let provider = env::var("SHIPWRIGHT_PROVIDER")
            .ok()
            .and_then(|s| parse_provider(&s).ok())
            .unwrap_or(AdapterKind::Ollama);

        let model = env::var("SHIPWRIGHT_MODEL")
            .ok()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| default_model(provider).to_string());

        let log_level = env::var("SHIPWRIGHT_LOG_LEVEL")
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
            .to_lowercase();

        let default_region = env::var("SHIPWRIGHT_DEFAULT_REGION")
            .ok()
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        Self {
            provider,
            model,
            request_timeout_secs: env_parsed("SHIPWRIGHT_REQUEST_TIMEOUT")
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            log_level,
            max_retries: env_parsed("SHIPWRIGHT_MAX_RETRIES").unwrap_or(DEFAULT_MAX_RETRIES),
            max_tool_turns: env_parsed("SHIPWRIGHT_MAX_TOOL_TURNS")
                .unwrap_or(DEFAULT_MAX_TOOL_TURNS),
            sandbox_timeout_secs: env_parsed("SHIPWRIGHT_SANDBOX_TIMEOUT")
                .unwrap_or(DEFAULT_SANDBOX_TIMEOUT_SECS),
            pull_images: env_parsed("SHIPWRIGHT_PULL_IMAGES").unwrap_or(DEFAULT_PULL_IMAGES),
            default_region,
        }
    }
}

impl ShipwrightConfig {
    /// Switches provider, resetting the model to that provider's default
    /// unless `SHIPWRIGHT_MODEL` pinned one.
    pub fn with_provider(mut self, provider: AdapterKind) -> Self {
        if self.provider != provider && env::var("SHIPWRIGHT_MODEL").is_err() {
            self.model = default_model(provider).to_string();
        }
        self.provider = provider;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "Model name cannot be empty".to_string(),
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "Request timeout must be at least 1 second".to_string(),
            ));
        }
        if self.request_timeout_secs > 3600 {
            return Err(ConfigError::ValidationFailed(
                "Request timeout cannot exceed 1 hour".to_string(),
            ));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        if !(1..=10).contains(&self.max_retries) {
            return Err(ConfigError::ValidationFailed(format!(
                "Max retries must be between 1 and 10, got {}",
                self.max_retries
            )));
        }

        if !(1..=50).contains(&self.max_tool_turns) {
            return Err(ConfigError::ValidationFailed(format!(
                "Max tool turns must be between 1 and 50, got {}",
                self.max_tool_turns
            )));
        }

        if self.sandbox_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "Sandbox timeout must be at least 1 second".to_string(),
            ));
        }

        if !is_valid_region(&self.default_region) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid default region: {:?}",
                self.default_region
            )));
        }

        Ok(())
    }

    pub fn to_display_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();

        map.insert("provider".to_string(), self.provider.as_str().to_string());
        map.insert("model".to_string(), self.model.clone());
        map.insert(
            "request_timeout_secs".to_string(),
            self.request_timeout_secs.to_string(),
        );
        map.insert("log_level".to_string(), self.log_level.clone());
        map.insert("max_retries".to_string(), self.max_retries.to_string());
        map.insert(
            "max_tool_turns".to_string(),
            self.max_tool_turns.to_string(),
        );
        map.insert(
            "sandbox_timeout_secs".to_string(),
            self.sandbox_timeout_secs.to_string(),
        );
        map.insert("pull_images".to_string(), self.pull_images.to_string());
        map.insert("default_region".to_string(), self.default_region.clone());

        map
    }
}

impl fmt::Display for ShipwrightConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Shipwright Configuration:")?;
        writeln!(f, "  Provider: {}", self.provider.as_str())?;
        writeln!(f, "  Model: {}", self.model)?;
        writeln!(f, "  Request Timeout: {}s", self.request_timeout_secs)?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        writeln!(f, "  Max Retries: {}", self.max_retries)?;
        writeln!(f, "  Max Tool Turns: {}", self.max_tool_turns)?;
        writeln!(f, "  Sandbox Timeout: {}s", self.sandbox_timeout_secs)?;
        writeln!(f, "  Pull Images: {}", self.pull_images)?;
        writeln!(f, "  Default Region: {}", self.default_region)?;
        Ok(())
    }
}
