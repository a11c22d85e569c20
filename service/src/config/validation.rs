//! Range checks for pipeline configuration
//!
//! Invalid configuration is fatal: every constructor that accepts a
//! [`PipelineConfig`] runs these checks before any file is processed.

use super::PipelineConfig;
use schemalens_core::{DictionaryError, Result};

/// Validate specific configuration values
///
/// # Errors
///
/// Returns an error if configuration values are invalid:
/// - `confidence_threshold` or a weight is NaN or outside `[0, 1]`
/// - a count or timeout is zero
pub fn validate_values(config: &PipelineConfig) -> Result<()> {
    check_unit("confidence_threshold", config.confidence_threshold)?;
    check_unit("min_detection_confidence", config.min_detection_confidence)?;
    check_unit("alternative_floor", config.alternative_floor)?;
    check_unit("corroboration_weight", config.corroboration_weight)?;
    check_unit("structural_min_similarity", config.structural_min_similarity)?;

    check_nonzero("max_relationships", config.max_relationships as u64)?;
    check_nonzero("max_nesting_depth", config.max_nesting_depth as u64)?;
    check_nonzero("sample_records", config.sample_records as u64)?;
    check_nonzero("max_buffered_bytes", config.max_buffered_bytes as u64)?;
    check_nonzero("parse_timeout_ms", config.parse_timeout_ms)?;
    check_nonzero("inference_timeout_ms", config.inference_timeout_ms)?;

    Ok(())
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if value.is_nan() || !(0.0..=1.0).contains(&value) {
        return Err(DictionaryError::config(format!(
            "{name} must be within [0, 1], got {value}"
        )));
    }
    Ok(())
}

fn check_nonzero(name: &str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(DictionaryError::config(format!("{name} must be > 0")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_bounds() {
        let mut config = PipelineConfig::default();
        config.confidence_threshold = -0.1;
        let err = validate_values(&config).unwrap_err();
        assert!(err.to_string().contains("confidence_threshold"));
        assert!(!err.is_recoverable());

        config.confidence_threshold = f64::NAN;
        assert!(validate_values(&config).is_err());

        config.confidence_threshold = 1.0;
        assert!(validate_values(&config).is_ok());
    }

    #[test]
    fn test_zero_counts_rejected() {
        let mut config = PipelineConfig::default();
        config.max_relationships = 0;
        assert!(validate_values(&config).is_err());

        let mut config = PipelineConfig::default();
        config.parse_timeout_ms = 0;
        let err = validate_values(&config).unwrap_err();
        assert!(err.to_string().contains("parse_timeout_ms"));
    }

    #[test]
    fn test_weight_bounds() {
        let mut config = PipelineConfig::default();
        config.corroboration_weight = 1.2;
        assert!(validate_values(&config).is_err());
    }
}
