//! Async facade, configuration files and custom components

use pretty_assertions::assert_eq;
use schemalens_core::{DictionaryError, FieldInfo, FormatType, SchemaDetails, SchemaRelationship};
use schemalens_service::detection::{
    DetectionResult, FormatDetectionEngine, ParseContext, ParseResult, ParserPlugin,
};
use schemalens_service::relationship::{
    DetectionContext, RelationshipDetectionService, RelationshipError, RelationshipStrategy,
    default_strategies,
};
use schemalens_service::{
    AnalysisPipeline, DataDictionaryService, PipelineConfig, PipelineDictionaryService, SourceFile,
    create_default_registry, create_dictionary_service, create_type_inference_service,
    load_pipeline_config,
};
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Recognizes `.env` files and turns each `KEY=value` line into a field
struct EnvFileParser;

impl ParserPlugin for EnvFileParser {
    fn name(&self) -> &'static str {
        "dotenv"
    }

    fn format_type(&self) -> FormatType {
        FormatType::Yaml
    }

    fn can_parse(&self, filename: &str, _content: &[u8]) -> DetectionResult {
        (filename.ends_with(".env"), 0.99).into()
    }

    fn parse_schema(&self, filename: &str, content: &[u8], _ctx: &ParseContext) -> ParseResult<SchemaDetails> {
        let mut schema = SchemaDetails::new(FormatType::Yaml, "env", filename);
        for line in String::from_utf8_lossy(content).lines() {
            if let Some((key, _)) = line.split_once('=') {
                schema.push_field(FieldInfo::new(key.trim().to_lowercase(), "string"));
            }
        }
        Ok(schema)
    }
}

/// Fails every run
struct GivingUp;

impl RelationshipStrategy for GivingUp {
    fn name(&self) -> &'static str {
        "giving_up"
    }

    fn priority(&self) -> u32 {
        50
    }

    fn detect(&self, _ctx: &DetectionContext<'_>) -> Result<Vec<SchemaRelationship>, RelationshipError> {
        Err(RelationshipError::Failed("no budget left".to_string()))
    }
}

fn custom_service() -> anyhow::Result<PipelineDictionaryService> {
    let config = PipelineConfig::default();
    let registry = create_default_registry().with_parser(EnvFileParser);
    let engine = FormatDetectionEngine::new(registry, &config)?;
    let mut strategies = default_strategies();
    strategies.push(Box::new(GivingUp));
    let relationships = RelationshipDetectionService::with_strategies(&config, strategies)?;
    let inference = create_type_inference_service(&config)?;
    let pipeline = AnalysisPipeline::new(
        config,
        Arc::new(engine),
        Arc::new(inference),
        Arc::new(relationships),
    )?;
    Ok(PipelineDictionaryService::new(Arc::new(pipeline)))
}

#[tokio::test]
async fn test_analyze_files_through_facade() -> anyhow::Result<()> {
    let service = create_dictionary_service(PipelineConfig::default())?;
    let files = vec![
        SourceFile::new("users.json", r#"[{"id": 1, "email": "ann@example.com"}]"#),
        SourceFile::new("orders.csv", "order_id,user_id\n1,1\n2,1\n"),
    ];
    let report = service.analyze_files(files, CancellationToken::new()).await?;
    assert_eq!(report.schemas.len(), 2);
    assert_eq!(report.relationships.len(), 1);

    let json = serde_json::to_value(&report)?;
    assert_eq!(json["relationships"]["relationships"][0]["relationship_type"], "many-to-one");
    assert_eq!(json["schemas"][0]["format_type"], "json");
    Ok(())
}

#[tokio::test]
async fn test_cancelled_facade_call_returns_no_report() -> anyhow::Result<()> {
    let service = create_dictionary_service(PipelineConfig::default())?;
    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = service
        .analyze_files(vec![SourceFile::new("a.csv", "id\n1\n")], cancel)
        .await;
    assert!(matches!(result, Err(DictionaryError::Cancelled)));
    Ok(())
}

#[tokio::test]
async fn test_custom_plugin_and_failing_strategy() -> anyhow::Result<()> {
    let service = custom_service()?;
    let detection = service
        .detect_format("prod.env".to_string(), b"DATABASE_URL=postgres://x\n".to_vec())
        .await?;
    assert_eq!(detection.parser_name, Some("dotenv"));

    let files = vec![
        SourceFile::new("prod.env", "DATABASE_URL=postgres://x\nPORT=8080\n"),
        SourceFile::new("people.csv", "id,name\n1,Ann\n"),
    ];
    let report = service.analyze_files(files, CancellationToken::new()).await?;
    let names: Vec<&str> = report.schemas[0].fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["database_url", "port"]);
    assert_eq!(report.failures.strategies.len(), 1);
    assert_eq!(report.failures.strategies[0].strategy, "giving_up");
    assert_eq!(report.failures.strategies[0].reason, "no budget left");
    Ok(())
}

#[test]
fn test_config_file_drives_pipeline() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "confidence_threshold: 0.9")?;
    writeln!(file, "enhance_types: false")?;
    writeln!(file, "parallel: false")?;
    let config = load_pipeline_config(file.path())?;
    assert!(!config.enhance_types);
    assert!(!config.parallel);

    let pipeline = schemalens_service::create_pipeline(config)?;
    let files = vec![
        SourceFile::new("users.json", r#"[{"id": 1}, {"id": 2}]"#),
        SourceFile::new("orders.csv", "order_id,user_id\n1,1\n2,2\n"),
    ];
    let report = pipeline.run(files, &CancellationToken::new())?;
    // the naming match scores below 0.9
    assert!(report.relationships.is_empty());
    assert_eq!(report.relationships.metadata["options"]["confidence_threshold"], 0.9);
    Ok(())
}

#[test]
fn test_invalid_config_file_is_rejected() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "max_relationships: 0")?;
    let err = load_pipeline_config(file.path()).unwrap_err();
    assert!(matches!(err, DictionaryError::Configuration(_)));
    Ok(())
}
