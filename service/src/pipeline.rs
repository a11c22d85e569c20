//! Analysis pipeline: detection, type inference, relationship detection
//!
//! One `run` call is one pipeline invocation. Files are parsed in parallel;
//! per-file, per-field and per-strategy failures are collected into a
//! [`FailureManifest`] instead of aborting the run. Only cancellation ends a
//! run early, and then no partial report is returned.

use crate::config::PipelineConfig;
use crate::detection::{
    AnalyzedSource, FileOutcome, FormatDetectionEngine, ParseErrorKind, SampleRecord, SourceContent,
};
use crate::inference::{FieldFailure, TypeInferenceService};
use crate::relationship::{RelationshipDetectionService, StrategyFailure};
use rayon::prelude::*;
use schemalens_core::{DictionaryError, Result, SchemaDetails, SchemaRelationshipStore};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// One input file from the repository collaborator
#[derive(Debug)]
pub struct SourceFile {
    /// Repository-relative path; becomes the schema ID
    pub path: String,
    /// Buffer or bounded stream
    pub content: SourceContent,
}

impl SourceFile {
    /// File from a path and any buffer-like content
    pub fn new(path: impl Into<String>, content: impl Into<SourceContent>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// A file that was recognized but could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    /// File path
    pub path: String,
    /// Parser that failed, when one was selected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parser: Option<String>,
    /// Failure class
    pub kind: ParseErrorKind,
    /// Error message
    pub message: String,
    /// Byte offset, when determinable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    /// One-based line, when determinable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

/// Everything that went wrong in a run that still produced output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FailureManifest {
    /// Parse failures and timeouts
    pub files: Vec<FileFailure>,
    /// Fields whose inference timed out or panicked
    pub fields: Vec<FieldFailure>,
    /// Relationship strategies whose candidates were discarded
    pub strategies: Vec<StrategyFailure>,
    /// Files no plugin claimed; not failures
    pub skipped_unknown: Vec<String>,
}

impl FailureManifest {
    /// Whether nothing failed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.fields.is_empty() && self.strategies.is_empty()
    }
}

/// Counters for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Files handed to the run
    pub files_seen: usize,
    /// Files that produced a schema
    pub schemas_parsed: usize,
    /// Files that failed to parse
    pub files_failed: usize,
    /// Files with no recognized format
    pub files_unknown: usize,
    /// Fields that received enhanced type info
    pub fields_enhanced: usize,
    /// Relationships in the final store
    pub relationships: usize,
    /// Wall-clock duration of the run
    pub elapsed_ms: u64,
}

/// Output of one pipeline invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    /// Extracted schemas in input order
    pub schemas: Vec<SchemaDetails>,
    /// Consolidated relationships
    pub relationships: SchemaRelationshipStore,
    /// Partial failures
    pub failures: FailureManifest,
    /// Counters
    pub stats: PipelineStats,
}

/// The three stages wired together
#[derive(Debug, Clone)]
pub struct AnalysisPipeline {
    config: PipelineConfig,
    engine: Arc<FormatDetectionEngine>,
    inference: Arc<TypeInferenceService>,
    relationships: Arc<RelationshipDetectionService>,
}

impl AnalysisPipeline {
    /// Wire the stages together
    ///
    /// # Errors
    ///
    /// Returns `DictionaryError::Configuration` for an invalid configuration
    pub fn new(
        config: PipelineConfig,
        engine: Arc<FormatDetectionEngine>,
        inference: Arc<TypeInferenceService>,
        relationships: Arc<RelationshipDetectionService>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            engine,
            inference,
            relationships,
        })
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The detection engine
    #[must_use]
    pub fn engine(&self) -> &FormatDetectionEngine {
        &self.engine
    }

    fn analyze(&self, file: SourceFile, cancel: &CancellationToken) -> Option<(String, AnalyzedSource)> {
        // stop scheduling new files once cancelled
        if cancel.is_cancelled() {
            return None;
        }
        let analyzed = self.engine.analyze_source(&file.path, file.content, cancel);
        Some((file.path, analyzed))
    }

    /// Run the full pipeline over `files`
    ///
    /// # Errors
    ///
    /// Returns `DictionaryError::Cancelled` when `cancel` fires before the
    /// run completes
    #[tracing::instrument(skip_all, fields(files = files.len()))]
    pub fn run(&self, files: Vec<SourceFile>, cancel: &CancellationToken) -> Result<PipelineReport> {
        let started = Instant::now();
        let files_seen = files.len();
        tracing::info!(files = files_seen, enhance_types = self.config.enhance_types, "pipeline started");

        let analyzed: Vec<Option<(String, AnalyzedSource)>> = if self.config.parallel {
            files.into_par_iter().map(|f| self.analyze(f, cancel)).collect()
        } else {
            files.into_iter().map(|f| self.analyze(f, cancel)).collect()
        };
        if cancel.is_cancelled() {
            tracing::info!("pipeline cancelled during parsing");
            return Err(DictionaryError::Cancelled);
        }

        let mut failures = FailureManifest::default();
        let mut parsed: Vec<(SchemaDetails, Vec<SampleRecord>)> = Vec::new();
        for (path, source) in analyzed.into_iter().flatten() {
            match source.outcome {
                FileOutcome::Parsed(schema) => parsed.push((schema, source.samples)),
                FileOutcome::Unknown => failures.skipped_unknown.push(path),
                FileOutcome::Failed(err) if err.kind == ParseErrorKind::Cancelled => {
                    return Err(DictionaryError::Cancelled);
                }
                FileOutcome::Failed(err) => failures.files.push(FileFailure {
                    parser: source.detection.parser_name.map(str::to_string),
                    path,
                    kind: err.kind,
                    message: err.message,
                    offset: err.offset,
                    line: err.line,
                }),
            }
        }

        let mut fields_enhanced = 0;
        if self.config.enhance_types {
            for (schema, samples) in &mut parsed {
                let outcome = self.inference.enhance_schema(schema, samples, cancel);
                if outcome.cancelled {
                    return Err(DictionaryError::Cancelled);
                }
                fields_enhanced += outcome.enhanced;
                failures.fields.extend(outcome.failures);
            }
        }

        let schemas: Vec<SchemaDetails> = parsed.into_iter().map(|(schema, _)| schema).collect();
        let outcome = self.relationships.detect(&schemas, cancel)?;
        failures.strategies = outcome.failed_strategies;

        let stats = PipelineStats {
            files_seen,
            schemas_parsed: schemas.len(),
            files_failed: failures.files.len(),
            files_unknown: failures.skipped_unknown.len(),
            fields_enhanced,
            relationships: outcome.store.len(),
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        tracing::info!(
            schemas = stats.schemas_parsed,
            failed = stats.files_failed,
            unknown = stats.files_unknown,
            relationships = stats.relationships,
            elapsed_ms = stats.elapsed_ms,
            "pipeline finished"
        );
        Ok(PipelineReport {
            schemas,
            relationships: outcome.store,
            failures,
            stats,
        })
    }
}
