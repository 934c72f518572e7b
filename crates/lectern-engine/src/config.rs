//! Configuration for the engine

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for one generation request
///
/// Built once per request and passed explicitly to the planner and generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Model context window in tokens
    pub context_size: usize,

    /// Slides suggested per target section
    pub top_n: usize,

    /// Cap on cross-batch harmonization rounds
    pub max_harmonization_rounds: u32,

    /// Minimum similarity score for a slide suggestion
    pub similarity_threshold: f64,

    /// Maximum time for a single capability call (seconds)
    pub call_timeout_secs: u64,

    /// Capability calls in flight at once within a stage
    pub max_concurrent_calls: usize,

    /// Share of failed calls above which the run is aborted
    pub max_failure_ratio: f64,

    /// Top concepts each source section contributes to a merge
    pub section_concept_limit: usize,
}

impl EngineConfig {
    /// Get the per-call timeout as a Duration
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.context_size == 0 {
            return Err("context_size must be greater than 0".to_string());
        }
        if self.top_n == 0 {
            return Err("top_n must be greater than 0".to_string());
        }
        if self.max_harmonization_rounds == 0 {
            return Err("max_harmonization_rounds must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err("similarity_threshold must be between 0.0 and 1.0".to_string());
        }
        if self.call_timeout_secs == 0 {
            return Err("call_timeout_secs must be greater than 0".to_string());
        }
        if self.max_concurrent_calls == 0 {
            return Err("max_concurrent_calls must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.max_failure_ratio) {
            return Err("max_failure_ratio must be between 0.0 and 1.0".to_string());
        }
        if self.section_concept_limit == 0 {
            return Err("section_concept_limit must be greater than 0".to_string());
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    /// Default configuration for an 8k-context local model
    fn default() -> Self {
        Self {
            context_size: 8192,
            top_n: 3,
            max_harmonization_rounds: 3,
            similarity_threshold: 0.6,
            call_timeout_secs: 120,
            max_concurrent_calls: 4,
            max_failure_ratio: 0.5,
            section_concept_limit: 5,
        }
    }
}

impl EngineConfig {
    /// Large-context preset for hosted models
    pub fn large_context() -> Self {
        Self {
            context_size: 32_768,
            call_timeout_secs: 300,
            ..Self::default()
        }
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse TOML: {}", e))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize to TOML: {}", e))
    }

    /// Load configuration from process environment variables over the defaults
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup over the defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_lookup(lookup)?;
        Ok(config)
    }

    /// Override fields with the variables `lookup` knows about
    ///
    /// `LECTERN_CONTEXT_SIZE` falls back to `OLLAMA_NUM_CTX`.
    pub fn apply_lookup<F>(&mut self, lookup: F) -> Result<(), String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = self;

        let context = lookup("LECTERN_CONTEXT_SIZE")
            .map(|v| ("LECTERN_CONTEXT_SIZE", v))
            .or_else(|| lookup("OLLAMA_NUM_CTX").map(|v| ("OLLAMA_NUM_CTX", v)));
        if let Some((key, value)) = context {
            config.context_size = parse_var(key, &value)?;
        }

        if let Some(v) = lookup("LECTERN_TOP_N") {
            config.top_n = parse_var("LECTERN_TOP_N", &v)?;
        }
        if let Some(v) = lookup("LECTERN_MAX_HARMONIZATION_ROUNDS") {
            config.max_harmonization_rounds = parse_var("LECTERN_MAX_HARMONIZATION_ROUNDS", &v)?;
        }
        if let Some(v) = lookup("LECTERN_SIMILARITY_THRESHOLD") {
            config.similarity_threshold = parse_var("LECTERN_SIMILARITY_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("LECTERN_CALL_TIMEOUT_SECS") {
            config.call_timeout_secs = parse_var("LECTERN_CALL_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("LECTERN_MAX_CONCURRENT_CALLS") {
            config.max_concurrent_calls = parse_var("LECTERN_MAX_CONCURRENT_CALLS", &v)?;
        }
        if let Some(v) = lookup("LECTERN_MAX_FAILURE_RATIO") {
            config.max_failure_ratio = parse_var("LECTERN_MAX_FAILURE_RATIO", &v)?;
        }
        if let Some(v) = lookup("LECTERN_SECTION_CONCEPT_LIMIT") {
            config.section_concept_limit = parse_var("LECTERN_SECTION_CONCEPT_LIMIT", &v)?;
        }

        Ok(())
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| format!("Invalid value for {}: {:?} ({})", key, value, e))
}
