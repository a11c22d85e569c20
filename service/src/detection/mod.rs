//! Format detection: the parser plugin contract, the registry and the engine
//!
//! A [`ParserPlugin`] recognizes one structural format and extracts a
//! [`SchemaDetails`] from it. Plugins are stateless with respect to other
//! files, so one instance is shared by every concurrent detection.

pub mod engine;
pub mod registry;

pub use engine::{
    AnalyzedSource, DetectionCandidate, FileOutcome, FormatDetection, FormatDetectionEngine,
    SourceContent,
};
pub use registry::ParserRegistry;

use crate::budget::{BudgetExceeded, ExecutionBudget};
use indexmap::IndexMap;
use schemalens_core::{DictionaryError, FormatType, SchemaDetails};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::io::BufRead;
use thiserror::Error;

/// One sample record: qualified field name to value
pub type SampleRecord = IndexMap<String, Value>;

/// Result type for plugin operations
pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// What `can_parse` reports
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DetectionResult {
    /// Match without a confidence; true counts as 1.0
    Boolean(bool),
    /// Match with an explicit confidence
    Scored(bool, f64),
}

impl DetectionResult {
    /// No match
    pub const NO: Self = Self::Boolean(false);

    /// Whether the plugin claims the content
    #[must_use]
    pub fn is_match(&self) -> bool {
        match self {
            Self::Boolean(m) | Self::Scored(m, _) => *m,
        }
    }

    /// Confidence in `[0, 1]`; 0 when not matched, NaN is treated as 0
    #[must_use]
    pub fn confidence(&self) -> f64 {
        match self {
            Self::Boolean(true) => 1.0,
            Self::Boolean(false) | Self::Scored(false, _) => 0.0,
            Self::Scored(true, c) => schemalens_core::scoring::clamp_unit(*c),
        }
    }
}

impl From<bool> for DetectionResult {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<(bool, f64)> for DetectionResult {
    fn from((matched, confidence): (bool, f64)) -> Self {
        Self::Scored(matched, confidence)
    }
}

/// Classification of a plugin failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseErrorKind {
    /// Malformed content for the recognized format
    Syntax,
    /// Valid content using a feature this plugin does not read
    Unsupported,
    /// Content exceeds the buffering bound
    TooLarge,
    /// Parse budget exhausted
    Timeout,
    /// Pipeline invocation cancelled
    Cancelled,
    /// The plugin panicked
    Panicked,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Syntax => "syntax error",
            Self::Unsupported => "unsupported",
            Self::TooLarge => "too large",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Panicked => "parser panicked",
        })
    }
}

/// Failure of `parse_schema` or a sample extraction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ParseError {
    /// Failure class
    pub kind: ParseErrorKind,
    /// Human-readable description
    pub message: String,
    /// Byte offset of the failure
    pub offset: Option<usize>,
    /// One-based line of the failure
    pub line: Option<usize>,
}

impl ParseError {
    /// Syntax error without location
    #[must_use]
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ParseErrorKind::Syntax, message)
    }

    /// Syntax error with location
    #[must_use]
    pub fn syntax_at(message: impl Into<String>, offset: Option<usize>, line: Option<usize>) -> Self {
        Self {
            kind: ParseErrorKind::Syntax,
            message: message.into(),
            offset,
            line,
        }
    }

    /// Unsupported feature
    #[must_use]
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ParseErrorKind::Unsupported, message)
    }

    /// Content too large to materialize
    #[must_use]
    pub fn too_large(limit: usize) -> Self {
        Self::new(
            ParseErrorKind::TooLarge,
            format!("content exceeds the {limit} byte buffering bound"),
        )
    }

    /// Plugin panic
    #[must_use]
    pub fn panicked(message: impl Into<String>) -> Self {
        Self::new(ParseErrorKind::Panicked, message)
    }

    fn new(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            offset: None,
            line: None,
        }
    }

    /// Attach a line number computed from a byte offset into `text`
    #[must_use]
    pub fn located_in(mut self, text: &[u8]) -> Self {
        if let (Some(offset), None) = (self.offset, self.line) {
            let end = offset.min(text.len());
            self.line = Some(text[..end].iter().filter(|b| **b == b'\n').count() + 1);
        }
        self
    }

    /// Convert into the crate-wide error for a given file
    #[must_use]
    pub fn into_dictionary_error(self, path: &str) -> DictionaryError {
        match self.kind {
            ParseErrorKind::Cancelled => DictionaryError::Cancelled,
            ParseErrorKind::Timeout => DictionaryError::Timeout {
                unit: path.to_string(),
                elapsed_ms: 0,
            },
            _ => DictionaryError::parse_at(path, self.to_string(), self.offset, self.line),
        }
    }
}

impl From<BudgetExceeded> for ParseError {
    fn from(reason: BudgetExceeded) -> Self {
        match reason {
            BudgetExceeded::Timeout { elapsed_ms } => Self::new(
                ParseErrorKind::Timeout,
                format!("parse budget exhausted after {elapsed_ms}ms"),
            ),
            BudgetExceeded::Cancelled => Self::new(ParseErrorKind::Cancelled, "cancelled"),
        }
    }
}

/// Per-invocation limits handed to a plugin
#[derive(Debug, Clone)]
pub struct ParseContext {
    /// Time and cancellation budget for this file
    pub budget: ExecutionBudget,
    /// Recursion guard for structural formats
    pub max_nesting_depth: usize,
}

impl ParseContext {
    /// Context with the given limits
    #[must_use]
    pub fn new(budget: ExecutionBudget, max_nesting_depth: usize) -> Self {
        Self {
            budget,
            max_nesting_depth,
        }
    }

    /// Cooperative checkpoint
    ///
    /// # Errors
    ///
    /// Returns a `Timeout` or `Cancelled` parse error when the budget is spent
    pub fn check(&self) -> ParseResult<()> {
        self.budget.check().map_err(ParseError::from)
    }
}

impl Default for ParseContext {
    fn default() -> Self {
        Self::new(ExecutionBudget::unbounded(), 16)
    }
}

/// Format-specific recognizer and schema extractor
///
/// `can_parse` must be total and side-effect-free. Every other method may
/// fail with a [`ParseError`], which the engine records as a per-file failure.
pub trait ParserPlugin: Send + Sync {
    /// Plugin name used in logs and detection reports
    fn name(&self) -> &'static str;

    /// Format this plugin produces
    fn format_type(&self) -> FormatType;

    /// Lower runs first among equal confidences
    fn priority(&self) -> u32 {
        100
    }

    /// Recognize the content
    fn can_parse(&self, filename: &str, content: &[u8]) -> DetectionResult;

    /// Extract the schema
    ///
    /// # Errors
    ///
    /// Returns a `ParseError` carrying the offending offset/line when known
    fn parse_schema(
        &self,
        filename: &str,
        content: &[u8],
        ctx: &ParseContext,
    ) -> ParseResult<SchemaDetails>;

    /// Extract up to `max_records` sample records keyed by qualified field name
    ///
    /// # Errors
    ///
    /// Returns a `ParseError` if the content cannot be read as records
    fn extract_sample_data(&self, _content: &[u8], _max_records: usize) -> ParseResult<Vec<SampleRecord>> {
        Ok(Vec::new())
    }

    /// Bounded-memory sample extraction from a reader
    ///
    /// Implementations read incrementally and stop after `max_records`.
    ///
    /// # Errors
    ///
    /// The default returns `Unsupported`
    fn extract_sample_stream(
        &self,
        _reader: &mut dyn BufRead,
        _max_records: usize,
    ) -> ParseResult<Vec<SampleRecord>> {
        Err(ParseError::unsupported(format!(
            "{} does not support streamed sample extraction",
            self.name()
        )))
    }

    /// Whether a line-aligned prefix of this file is itself parseable
    fn supports_bounded_read(&self, _filename: &str) -> bool {
        false
    }
}
