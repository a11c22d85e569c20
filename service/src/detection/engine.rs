//! Format Detection Engine
//!
//! Asks every registered plugin, picks the most confident one and delegates
//! extraction to it. Plugin failures and panics are contained per file.

use super::{
    DetectionResult, ParseContext, ParseError, ParseResult, ParserPlugin, ParserRegistry,
    SampleRecord,
};
use crate::budget::ExecutionBudget;
use crate::config::PipelineConfig;
use crate::isolation::run_isolated;
use schemalens_core::{DictionaryError, FormatType, Result, SchemaDetails};
use serde::Serialize;
use std::io::{BufReader, Cursor, Read};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One plugin's claim on a file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionCandidate {
    /// Plugin name
    pub parser_name: &'static str,
    /// Format the plugin produces
    pub format_type: FormatType,
    /// Reported confidence
    pub confidence: f64,
}

/// Outcome of `detect_format`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatDetection {
    /// Selected format, `Unknown` when no plugin claimed the file
    pub format_type: FormatType,
    /// Confidence of the selected plugin
    pub confidence: f64,
    /// Selected plugin
    pub parser_name: Option<&'static str>,
    /// Every positive claim, most confident first
    pub candidates: Vec<DetectionCandidate>,
}

impl FormatDetection {
    fn unknown(candidates: Vec<DetectionCandidate>) -> Self {
        Self {
            format_type: FormatType::Unknown,
            confidence: 0.0,
            parser_name: None,
            candidates,
        }
    }

    /// Whether a plugin claimed the file
    #[must_use]
    pub fn is_known(&self) -> bool {
        self.format_type != FormatType::Unknown
    }
}

/// Result of parsing one file
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    /// Schema extracted
    Parsed(SchemaDetails),
    /// No plugin claimed the file; not an error
    Unknown,
    /// The selected plugin failed
    Failed(ParseError),
}

/// File content as handed over by the repository collaborator
pub enum SourceContent {
    /// Fully read content
    Buffer(Vec<u8>),
    /// Finite byte stream, materialized only up to the buffering bound
    Stream(Box<dyn Read + Send>),
}

impl std::fmt::Debug for SourceContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buffer(bytes) => write!(f, "Buffer({} bytes)", bytes.len()),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

impl From<Vec<u8>> for SourceContent {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Buffer(bytes)
    }
}

impl From<&str> for SourceContent {
    fn from(text: &str) -> Self {
        Self::Buffer(text.as_bytes().to_vec())
    }
}

impl From<String> for SourceContent {
    fn from(text: String) -> Self {
        Self::Buffer(text.into_bytes())
    }
}

/// Detection, extraction and samples for one source
#[derive(Debug)]
pub struct AnalyzedSource {
    /// Detection report
    pub detection: FormatDetection,
    /// Parse outcome
    pub outcome: FileOutcome,
    /// Sample records for type inference
    pub samples: Vec<SampleRecord>,
}

/// Materialized prefix of a source plus whatever was not read
struct Materialized {
    bytes: Vec<u8>,
    rest: Option<Box<dyn Read + Send>>,
}

/// Selects a parser plugin per file and delegates extraction to it
#[derive(Debug)]
pub struct FormatDetectionEngine {
    registry: ParserRegistry,
    min_detection_confidence: f64,
    max_nesting_depth: usize,
    parse_timeout: Duration,
    max_buffered_bytes: usize,
    sample_records: usize,
}

impl FormatDetectionEngine {
    /// Create an engine over an owned registry
    ///
    /// # Errors
    ///
    /// Returns `DictionaryError::Registry` when the registry is empty and
    /// `DictionaryError::Configuration` when the configuration is invalid
    pub fn new(registry: ParserRegistry, config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        if registry.is_empty() {
            return Err(DictionaryError::Registry(
                "no parser plugins registered".to_string(),
            ));
        }
        tracing::info!(parsers = ?registry.names(), "format detection engine ready");
        Ok(Self {
            registry,
            min_detection_confidence: config.min_detection_confidence,
            max_nesting_depth: config.max_nesting_depth,
            parse_timeout: config.parse_timeout(),
            max_buffered_bytes: config.max_buffered_bytes,
            sample_records: config.sample_records,
        })
    }

    /// Append a plugin to the registry
    pub fn register_parser(&mut self, plugin: Arc<dyn ParserPlugin>) {
        self.registry.register_parser(plugin);
    }

    /// The registry in detection order
    #[must_use]
    pub fn registry(&self) -> &ParserRegistry {
        &self.registry
    }

    /// Direct lookup bypassing detection
    #[must_use]
    pub fn get_parser(&self, format_type: FormatType) -> Option<Arc<dyn ParserPlugin>> {
        self.registry.get(format_type)
    }

    /// Pick the plugin most likely to own the content
    ///
    /// The highest confidence wins; among equal confidences the plugin earlier
    /// in registry order wins.
    pub fn detect_format(&self, filename: &str, content: &[u8]) -> FormatDetection {
        self.detect(filename, content).0
    }

    /// Detection together with the winning plugin itself
    fn detect(&self, filename: &str, content: &[u8]) -> (FormatDetection, Option<Arc<dyn ParserPlugin>>) {
        let mut candidates = Vec::new();
        let mut best: Option<(&Arc<dyn ParserPlugin>, f64)> = None;

        for plugin in self.registry.iter() {
            let result = run_isolated(plugin.name(), || plugin.can_parse(filename, content))
                .unwrap_or(DetectionResult::NO);
            if !result.is_match() {
                continue;
            }
            let confidence = result.confidence();
            if confidence <= self.min_detection_confidence {
                continue;
            }
            candidates.push(DetectionCandidate {
                parser_name: plugin.name(),
                format_type: plugin.format_type(),
                confidence,
            });
            if best.is_none_or(|(_, c)| confidence > c) {
                best = Some((plugin, confidence));
            }
        }

        // stable: equal confidences keep registry order
        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let Some((plugin, confidence)) = best else {
            tracing::debug!(path = filename, "no parser claimed file");
            return (FormatDetection::unknown(candidates), None);
        };
        tracing::debug!(
            path = filename,
            format = %plugin.format_type(),
            parser = plugin.name(),
            confidence,
            "format detected"
        );
        let detection = FormatDetection {
            format_type: plugin.format_type(),
            confidence,
            parser_name: Some(plugin.name()),
            candidates,
        };
        (detection, Some(Arc::clone(plugin)))
    }

    /// Detect and extract with a fresh cancellation token
    pub fn parse_schema(&self, filename: &str, content: &[u8]) -> FileOutcome {
        self.parse_schema_cancellable(filename, content, &CancellationToken::new())
    }

    /// Detect and extract, honoring the caller's cancellation token
    pub fn parse_schema_cancellable(
        &self,
        filename: &str,
        content: &[u8],
        cancel: &CancellationToken,
    ) -> FileOutcome {
        match self.detect(filename, content) {
            (_, Some(plugin)) => self.parse_detected(plugin.as_ref(), filename, content, cancel),
            (_, None) => FileOutcome::Unknown,
        }
    }

    fn parse_detected(
        &self,
        plugin: &dyn ParserPlugin,
        filename: &str,
        content: &[u8],
        cancel: &CancellationToken,
    ) -> FileOutcome {
        match self.parse_with(plugin, filename, content, cancel) {
            Ok(schema) => FileOutcome::Parsed(schema),
            Err(err) => {
                tracing::warn!(
                    path = filename,
                    parser = plugin.name(),
                    offset = ?err.offset,
                    line = ?err.line,
                    error = %err,
                    "parse failed"
                );
                FileOutcome::Failed(err)
            }
        }
    }

    /// Run one plugin's extraction under the parse budget and panic isolation
    ///
    /// # Errors
    ///
    /// Returns the plugin's `ParseError`, or a `Panicked` error
    pub fn parse_with(
        &self,
        plugin: &dyn ParserPlugin,
        filename: &str,
        content: &[u8],
        cancel: &CancellationToken,
    ) -> ParseResult<SchemaDetails> {
        let ctx = ParseContext::new(
            ExecutionBudget::new(self.parse_timeout, cancel.clone()),
            self.max_nesting_depth,
        );
        ctx.check()?;
        let result = run_isolated(plugin.name(), || plugin.parse_schema(filename, content, &ctx))
            .map_err(ParseError::panicked)?;
        let mut schema = result?;
        schema.set_metadata("parser", plugin.name());
        tracing::debug!(
            path = filename,
            fields = schema.fields.len(),
            elapsed_ms = ctx.budget.elapsed_ms(),
            "schema extracted"
        );
        Ok(schema)
    }

    /// Extract samples with panic isolation
    ///
    /// # Errors
    ///
    /// Returns the plugin's `ParseError`, or a `Panicked` error
    pub fn extract_samples(
        &self,
        plugin: &dyn ParserPlugin,
        content: &[u8],
    ) -> ParseResult<Vec<SampleRecord>> {
        run_isolated(plugin.name(), || {
            plugin.extract_sample_data(content, self.sample_records)
        })
        .map_err(ParseError::panicked)?
    }

    /// Detect, extract and sample one source
    ///
    /// Buffers are used as-is. Streams are materialized up to the buffering
    /// bound; past it, plugins with bounded reads parse a line-aligned prefix
    /// and sample incrementally, and every other plugin fails with `TooLarge`.
    #[tracing::instrument(skip(self, source, cancel))]
    pub fn analyze_source(
        &self,
        filename: &str,
        source: SourceContent,
        cancel: &CancellationToken,
    ) -> AnalyzedSource {
        let materialized = match self.materialize(source) {
            Ok(m) => m,
            Err(err) => {
                return AnalyzedSource {
                    detection: FormatDetection::unknown(Vec::new()),
                    outcome: FileOutcome::Failed(err),
                    samples: Vec::new(),
                };
            }
        };

        let (detection, plugin) = self.detect(filename, &materialized.bytes);
        let Some(plugin) = plugin else {
            return AnalyzedSource {
                detection,
                outcome: FileOutcome::Unknown,
                samples: Vec::new(),
            };
        };

        let Some(rest) = materialized.rest else {
            let outcome = self.parse_detected(plugin.as_ref(), filename, &materialized.bytes, cancel);
            let samples = match &outcome {
                FileOutcome::Parsed(_) => self.samples_or_empty(filename, plugin.as_ref(), &materialized.bytes),
                _ => Vec::new(),
            };
            return AnalyzedSource {
                detection,
                outcome,
                samples,
            };
        };

        if !plugin.supports_bounded_read(filename) {
            tracing::warn!(
                path = filename,
                parser = plugin.name(),
                limit = self.max_buffered_bytes,
                "content exceeds buffering bound"
            );
            return AnalyzedSource {
                detection,
                outcome: FileOutcome::Failed(ParseError::too_large(self.max_buffered_bytes)),
                samples: Vec::new(),
            };
        }

        let prefix_len = materialized
            .bytes
            .iter()
            .rposition(|b| *b == b'\n')
            .map_or(materialized.bytes.len(), |p| p + 1);
        let outcome = match self.parse_with(plugin.as_ref(), filename, &materialized.bytes[..prefix_len], cancel) {
            Ok(mut schema) => {
                schema.set_metadata("truncated", true);
                FileOutcome::Parsed(schema)
            }
            Err(err) => FileOutcome::Failed(err),
        };
        let samples = if matches!(outcome, FileOutcome::Parsed(_)) {
            let mut reader = BufReader::new(Cursor::new(materialized.bytes).chain(rest));
            run_isolated(plugin.name(), || {
                plugin.extract_sample_stream(&mut reader, self.sample_records)
            })
            .map_err(ParseError::panicked)
            .and_then(|r| r)
            .unwrap_or_else(|err| {
                tracing::warn!(path = filename, error = %err, "streamed sample extraction failed");
                Vec::new()
            })
        } else {
            Vec::new()
        };
        AnalyzedSource {
            detection,
            outcome,
            samples,
        }
    }

    fn samples_or_empty(&self, filename: &str, plugin: &dyn ParserPlugin, content: &[u8]) -> Vec<SampleRecord> {
        self.extract_samples(plugin, content).unwrap_or_else(|err| {
            tracing::warn!(path = filename, error = %err, "sample extraction failed");
            Vec::new()
        })
    }

    fn materialize(&self, source: SourceContent) -> ParseResult<Materialized> {
        match source {
            SourceContent::Buffer(bytes) => Ok(Materialized { bytes, rest: None }),
            SourceContent::Stream(mut reader) => {
                let limit = self.max_buffered_bytes;
                let mut bytes = Vec::with_capacity(limit.min(64 * 1024));
                (&mut reader)
                    .take(limit as u64)
                    .read_to_end(&mut bytes)
                    .map_err(|e| ParseError::syntax(format!("failed to read content: {e}")))?;
                let mut peek = [0u8; 1];
                let more = reader
                    .read(&mut peek)
                    .map_err(|e| ParseError::syntax(format!("failed to read content: {e}")))?;
                if more == 0 {
                    return Ok(Materialized { bytes, rest: None });
                }
                let rest: Box<dyn Read + Send> = Box::new(Cursor::new(peek.to_vec()).chain(reader));
                Ok(Materialized {
                    bytes,
                    rest: Some(rest),
                })
            }
        }
    }
}
