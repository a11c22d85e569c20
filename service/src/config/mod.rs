//! Configuration loading for the analysis pipeline
//!
//! This module provides configuration loading from YAML files with
//! environment variable substitution support.

pub mod validation;

use once_cell::sync::Lazy;
use regex::Regex;
use schemalens_core::{DictionaryError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Load configuration from `YAML` file with environment variable substitution
///
/// # Errors
///
/// Returns `DictionaryError::Io` if the file cannot be read
/// Returns `DictionaryError::Configuration` if the YAML cannot be parsed
pub fn load_config<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parse configuration text after environment variable substitution
///
/// # Errors
///
/// Returns `DictionaryError::Configuration` if the YAML cannot be parsed
pub fn parse_config<T: for<'de> Deserialize<'de>>(contents: &str) -> Result<T> {
    let substituted = substitute_env_vars(contents);
    serde_yaml::from_str(&substituted)
        .map_err(|e| DictionaryError::config(format!("Failed to parse YAML config: {e}")))
}

#[allow(clippy::expect_used)]
static ENV_VAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([^}:]+)(?::(-)?([^}]*))?\}").expect("env var pattern is valid")
});

/// Substitute environment variables in the format `${VAR}` or `${VAR:-default}`
fn substitute_env_vars(content: &str) -> String {
    ENV_VAR
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(3).map_or("", |m| m.as_str());
            env::var(var_name).unwrap_or_else(|_| default_value.to_string())
        })
        .to_string()
}

/// Options recognized by every pipeline stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Minimum relationship confidence retained
    pub confidence_threshold: f64,
    /// Maximum number of relationships kept after thresholding
    pub max_relationships: usize,
    /// Run the Type Inference Service; false means pure detection mode
    pub enhance_types: bool,
    /// Recursion guard for structural parsers
    pub max_nesting_depth: usize,
    /// Per-file parse budget in milliseconds
    pub parse_timeout_ms: u64,
    /// Per-field inference budget in milliseconds
    pub inference_timeout_ms: u64,
    /// A plugin must report confidence strictly above this to claim a file
    pub min_detection_confidence: f64,
    /// Number of sample records extracted per file
    pub sample_records: usize,
    /// Upper bound for materializing streamed content
    pub max_buffered_bytes: usize,
    /// Minimum score for a type to be listed as an alternative
    pub alternative_floor: f64,
    /// Weight of corroborating relationship strategies
    pub corroboration_weight: f64,
    /// Minimum field-set similarity for the structural strategy
    pub structural_min_similarity: f64,
    /// Use the rayon pool for files, fields and strategies
    pub parallel: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            max_relationships: 1000,
            enhance_types: true,
            max_nesting_depth: 16,
            parse_timeout_ms: 5000,
            inference_timeout_ms: 1000,
            min_detection_confidence: 0.0,
            sample_records: 100,
            max_buffered_bytes: 8 * 1024 * 1024,
            alternative_floor: 0.1,
            corroboration_weight: 0.5,
            structural_min_similarity: 0.5,
            parallel: true,
        }
    }
}

impl PipelineConfig {
    /// Check option ranges
    ///
    /// # Errors
    ///
    /// Returns `DictionaryError::Configuration` naming the first invalid option
    pub fn validate(&self) -> Result<()> {
        validation::validate_values(self)
    }

    /// Per-file parse budget
    #[must_use]
    pub fn parse_timeout(&self) -> Duration {
        Duration::from_millis(self.parse_timeout_ms)
    }

    /// Per-field inference budget
    #[must_use]
    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }

    /// Options echoed into the relationship store metadata
    #[must_use]
    pub fn relationship_options(&self) -> serde_json::Value {
        serde_json::json!({
            "confidence_threshold": self.confidence_threshold,
            "max_relationships": self.max_relationships,
            "enhance_types": self.enhance_types,
            "corroboration_weight": self.corroboration_weight,
            "structural_min_similarity": self.structural_min_similarity,
        })
    }
}

/// Load and validate a pipeline configuration file
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed, or fails validation
pub fn load_pipeline_config(path: &Path) -> Result<PipelineConfig> {
    let config: PipelineConfig = load_config(path)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert!((config.confidence_threshold - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.max_relationships, 1000);
        assert!(config.enhance_types);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() -> std::result::Result<(), anyhow::Error> {
        let config: PipelineConfig = parse_config("confidence_threshold: 0.7\nenhance_types: false\n")?;
        assert!((config.confidence_threshold - 0.7).abs() < f64::EPSILON);
        assert!(!config.enhance_types);
        assert_eq!(config.max_nesting_depth, 16);
        Ok(())
    }

    #[test]
    fn test_env_default_substitution() -> std::result::Result<(), anyhow::Error> {
        let text = "max_relationships: ${SCHEMALENS_TEST_UNSET_MAX:-25}\n";
        let config: PipelineConfig = parse_config(text)?;
        assert_eq!(config.max_relationships, 25);
        Ok(())
    }

    #[test]
    fn test_load_pipeline_config_rejects_invalid_threshold() -> std::result::Result<(), anyhow::Error> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "confidence_threshold: 1.5")?;
        let err = load_pipeline_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("confidence_threshold"));
        Ok(())
    }
}
