//! Async facade over the blocking pipeline
//!
//! API and CLI collaborators talk to [`DataDictionaryService`]. The default
//! implementation moves each call onto tokio's blocking pool so parsing and
//! inference never stall the async runtime.

use crate::detection::{FileOutcome, FormatDetection};
use crate::pipeline::{AnalysisPipeline, PipelineReport, SourceFile};
use async_trait::async_trait;
use schemalens_core::{DictionaryError, Result, SchemaDetails};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Entry point for collaborators
#[async_trait]
pub trait DataDictionaryService: Send + Sync {
    /// Run the full pipeline over a batch of files
    ///
    /// Dropping the returned future cancels the run.
    async fn analyze_files(&self, files: Vec<SourceFile>, cancel: CancellationToken) -> Result<PipelineReport>;

    /// Classify one file without parsing it
    async fn detect_format(&self, filename: String, content: Vec<u8>) -> Result<FormatDetection>;

    /// Detect and parse one file; `None` when no plugin claims it
    async fn parse_file(&self, filename: String, content: Vec<u8>) -> Result<Option<SchemaDetails>>;
}

/// [`DataDictionaryService`] backed by an [`AnalysisPipeline`]
#[derive(Debug, Clone)]
pub struct PipelineDictionaryService {
    pipeline: Arc<AnalysisPipeline>,
}

impl PipelineDictionaryService {
    /// Wrap a pipeline
    #[must_use]
    pub fn new(pipeline: Arc<AnalysisPipeline>) -> Self {
        Self { pipeline }
    }

    /// The wrapped pipeline
    #[must_use]
    pub fn pipeline(&self) -> &AnalysisPipeline {
        &self.pipeline
    }

    async fn blocking<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<AnalysisPipeline>) -> Result<T> + Send + 'static,
    {
        let pipeline = Arc::clone(&self.pipeline);
        tokio::task::spawn_blocking(move || f(pipeline))
            .await
            .map_err(|e| DictionaryError::Other {
                message: format!("{operation} worker failed: {e}"),
                source: Some(Box::new(e)),
            })?
    }
}

#[async_trait]
impl DataDictionaryService for PipelineDictionaryService {
    async fn analyze_files(&self, files: Vec<SourceFile>, cancel: CancellationToken) -> Result<PipelineReport> {
        let guard = cancel.clone().drop_guard();
        let report = self
            .blocking("analyze_files", move |pipeline| pipeline.run(files, &cancel))
            .await;
        guard.disarm();
        report
    }

    async fn detect_format(&self, filename: String, content: Vec<u8>) -> Result<FormatDetection> {
        self.blocking("detect_format", move |pipeline| {
            Ok(pipeline.engine().detect_format(&filename, &content))
        })
        .await
    }

    async fn parse_file(&self, filename: String, content: Vec<u8>) -> Result<Option<SchemaDetails>> {
        self.blocking("parse_file", move |pipeline| {
            match pipeline.engine().parse_schema(&filename, &content) {
                FileOutcome::Parsed(schema) => Ok(Some(schema)),
                FileOutcome::Unknown => Ok(None),
                FileOutcome::Failed(err) => Err(err.into_dictionary_error(&filename)),
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::factory::create_dictionary_service;
    use schemalens_core::FormatType;

    #[tokio::test]
    async fn test_parse_file_outcomes() {
        let service = create_dictionary_service(PipelineConfig::default()).unwrap();
        let schema = service
            .parse_file("users.json".to_string(), br#"[{"id": 1}]"#.to_vec())
            .await
            .unwrap();
        assert_eq!(schema.unwrap().format_type, FormatType::Json);

        let none = service
            .parse_file("notes.txt".to_string(), b"plain words".to_vec())
            .await
            .unwrap();
        assert!(none.is_none());

        let err = service
            .parse_file("bad.json".to_string(), b"{\"a\": ".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, DictionaryError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_detect_format() {
        let service = create_dictionary_service(PipelineConfig::default()).unwrap();
        let detection = service
            .detect_format("people.csv".to_string(), b"id,name\n1,a\n".to_vec())
            .await
            .unwrap();
        assert_eq!(detection.format_type, FormatType::Csv);
    }
}
