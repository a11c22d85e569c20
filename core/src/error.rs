//! Error types for SchemaLens operations

use thiserror::Error;

/// Main error type for SchemaLens operations
#[derive(Error, Debug)]
pub enum DictionaryError {
    /// Content of a recognised format could not be parsed
    #[error("Failed to parse {path}: {message}")]
    Parse {
        /// Source path of the offending file
        path: String,
        /// Error message
        message: String,
        /// Byte offset of the failure if determinable
        offset: Option<usize>,
        /// One-based line of the failure if determinable
        line: Option<usize>,
    },

    /// A parse or inference unit exceeded its time budget
    #[error("Timed out after {elapsed_ms}ms: {unit}")]
    Timeout {
        /// Description of the unit that timed out (file path, field name)
        unit: String,
        /// Time spent before the checkpoint tripped
        elapsed_ms: u64,
    },

    /// The pipeline invocation was cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Parser registry misconfiguration
    #[error("Registry error: {0}")]
    Registry(String),

    /// A relationship strategy failed
    #[error("Strategy '{strategy}' failed: {message}")]
    Strategy {
        /// Strategy name
        strategy: String,
        /// Error message
        message: String,
    },

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
        /// Optional source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Result type alias for SchemaLens operations
pub type Result<T> = std::result::Result<T, DictionaryError>;

impl DictionaryError {
    /// Create a new parse error without location
    #[must_use]
    pub fn parse(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
            offset: None,
            line: None,
        }
    }

    /// Create a new parse error with location
    #[must_use]
    pub fn parse_at(
        path: impl Into<String>,
        message: impl Into<String>,
        offset: Option<usize>,
        line: Option<usize>,
    ) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
            offset,
            line,
        }
    }

    /// Create a new configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a new strategy error
    #[must_use]
    pub fn strategy(strategy: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Strategy {
            strategy: strategy.into(),
            message: message.into(),
        }
    }

    /// Whether this error is recoverable at the per-file or per-strategy level.
    ///
    /// Configuration and registry errors are fatal; everything that concerns a
    /// single unit of work is not.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Configuration(_) | Self::Registry(_))
    }
}

impl From<serde_json::Error> for DictionaryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for DictionaryError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self::Other {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = DictionaryError::parse_at("data/users.xml", "unclosed tag <user>", Some(42), Some(3));
        assert_eq!(
            err.to_string(),
            "Failed to parse data/users.xml: unclosed tag <user>"
        );
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_configuration_is_fatal() {
        let err = DictionaryError::config("confidence_threshold must be within [0, 1]");
        assert!(!err.is_recoverable());
        assert!(!DictionaryError::Registry("no parsers".into()).is_recoverable());
    }
}
