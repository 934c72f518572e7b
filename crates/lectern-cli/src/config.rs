//! Configuration management for the CLI.

use crate::error::{CliError, Result};
use lectern_engine::EngineConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default model served by the local Ollama instance
pub const DEFAULT_MODEL: &str = "llama3.1";

/// CLI configuration.
///
/// Loaded from an optional TOML file, then overridden by environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// LLM endpoint settings
    #[serde(default)]
    pub llm: LlmSettings,

    /// Global settings
    #[serde(default)]
    pub settings: Settings,
}

/// LLM endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Ollama base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Attempts per prompt before the call fails
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

/// Global CLI settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Enable colored output
    #[serde(default = "default_true")]
    pub color: bool,

    /// Default output format
    #[serde(default = "default_format")]
    pub format: OutputFormat,
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Table format
    Table,
    /// JSON format
    Json,
    /// Quiet (minimal) format
    Quiet,
}

impl Config {
    /// Load configuration from `path` (or defaults) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_toml_str(&fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_lookup(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Serialize configuration to TOML text.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| CliError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Override settings with the variables `lookup` knows about.
    ///
    /// Engine fields read the `LECTERN_*` variables; the endpoint reads
    /// `OLLAMA_BASE_URL` and `OLLAMA_MODEL`.
    pub fn apply_lookup<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.engine.apply_lookup(&lookup).map_err(CliError::Config)?;

        if let Some(url) = lookup("OLLAMA_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(model) = lookup("OLLAMA_MODEL") {
            self.llm.model = model;
        }
        Ok(())
    }

    /// Check every section.
    pub fn validate(&self) -> Result<()> {
        self.engine.validate().map_err(CliError::Config)?;
        if self.llm.base_url.trim().is_empty() {
            return Err(CliError::Config("llm.base_url must not be empty".into()));
        }
        if self.llm.model.trim().is_empty() {
            return Err(CliError::Config("llm.model must not be empty".into()));
        }
        if self.llm.max_retries == 0 {
            return Err(CliError::Config("llm.max_retries must be greater than 0".into()));
        }
        Ok(())
    }

    /// Context size as the provider's `num_ctx` option.
    pub fn num_ctx(&self) -> Result<u32> {
        u32::try_from(self.engine.context_size).map_err(|_| {
            CliError::Config(format!(
                "context_size {} does not fit the provider's num_ctx",
                self.engine.context_size
            ))
        })
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            color: true,
            format: OutputFormat::Table,
        }
    }
}

fn default_base_url() -> String {
    lectern_llm::ollama::DEFAULT_ENDPOINT.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_retries() -> u32 {
    lectern_llm::ollama::DEFAULT_MAX_RETRIES
}

fn default_true() -> bool {
    true
}

fn default_format() -> OutputFormat {
    OutputFormat::Table
}
