//! Factory functions wiring the default registry, services and pipeline

use crate::config::PipelineConfig;
use crate::detection::{FormatDetectionEngine, ParserRegistry};
use crate::inference::TypeInferenceService;
use crate::parsers::{
    AvroParser, CsvParser, GraphqlParser, JsonParser, JsonSchemaParser, OpenApiParser, OrcParser,
    ParquetParser, ProtobufParser, SqlParser, XmlParser, YamlParser,
};
use crate::pipeline::AnalysisPipeline;
use crate::relationship::RelationshipDetectionService;
use crate::service::PipelineDictionaryService;
use schemalens_core::Result;
use std::sync::Arc;

/// Registry with every built-in plugin
///
/// Schema-definition formats come first so that they win confidence ties
/// against the instance formats sharing their syntax (JSON Schema and
/// OpenAPI against JSON and YAML).
#[must_use]
pub fn create_default_registry() -> ParserRegistry {
    ParserRegistry::new()
        .with_parser(JsonSchemaParser)
        .with_parser(OpenApiParser)
        .with_parser(AvroParser)
        .with_parser(ProtobufParser)
        .with_parser(GraphqlParser)
        .with_parser(SqlParser)
        .with_parser(ParquetParser)
        .with_parser(OrcParser)
        .with_parser(JsonParser)
        .with_parser(CsvParser::new())
        .with_parser(XmlParser)
        .with_parser(YamlParser)
}

/// Engine over the default registry
///
/// # Errors
///
/// Returns an error for an invalid configuration
pub fn create_detection_engine(config: &PipelineConfig) -> Result<FormatDetectionEngine> {
    FormatDetectionEngine::new(create_default_registry(), config)
}

/// Inference service with the built-in enhancers
///
/// # Errors
///
/// Returns an error for an invalid configuration
pub fn create_type_inference_service(config: &PipelineConfig) -> Result<TypeInferenceService> {
    TypeInferenceService::new(config)
}

/// Relationship service with the built-in strategies
///
/// # Errors
///
/// Returns an error for an invalid configuration
pub fn create_relationship_service(config: &PipelineConfig) -> Result<RelationshipDetectionService> {
    RelationshipDetectionService::new(config)
}

/// Pipeline with the default components
///
/// # Errors
///
/// Returns an error for an invalid configuration; nothing is processed
pub fn create_pipeline(config: PipelineConfig) -> Result<AnalysisPipeline> {
    config.validate()?;
    let engine = Arc::new(create_detection_engine(&config)?);
    let inference = Arc::new(create_type_inference_service(&config)?);
    let relationships = Arc::new(create_relationship_service(&config)?);
    AnalysisPipeline::new(config, engine, inference, relationships)
}

/// Async service over the default pipeline
///
/// # Errors
///
/// Returns an error for an invalid configuration
pub fn create_dictionary_service(config: PipelineConfig) -> Result<Arc<PipelineDictionaryService>> {
    Ok(Arc::new(PipelineDictionaryService::new(Arc::new(create_pipeline(config)?))))
}
