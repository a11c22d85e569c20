//! Relationship detection over hand-built schemas

use pretty_assertions::assert_eq;
use schemalens_core::{DictionaryError, FieldInfo, FormatType, RelationshipType, SchemaDetails};
use schemalens_service::PipelineConfig;
use schemalens_service::relationship::RelationshipDetectionService;
use tokio_util::sync::CancellationToken;

fn schema(path: &str, fields: Vec<FieldInfo>) -> SchemaDetails {
    let mut schema = SchemaDetails::new(FormatType::Csv, path.trim_end_matches(".csv"), path);
    for field in fields {
        schema.push_field(field);
    }
    schema
}

fn customers_and_orders() -> Vec<SchemaDetails> {
    vec![
        schema(
            "customers.csv",
            vec![
                FieldInfo::new("customer_id", "integer").primary_key(),
                FieldInfo::new("name", "string"),
            ],
        ),
        schema(
            "orders.csv",
            vec![
                FieldInfo::new("order_id", "integer").primary_key(),
                FieldInfo::new("customer_id", "integer"),
                FieldInfo::new("total", "float"),
            ],
        ),
    ]
}

#[test]
fn test_default_strategy_order() -> anyhow::Result<()> {
    let service = RelationshipDetectionService::new(&PipelineConfig::default())?;
    assert_eq!(
        service.strategy_names(),
        vec!["foreign_key", "name_based", "structural_similarity"]
    );
    Ok(())
}

#[test]
fn test_corroborated_candidates_never_lose_confidence() -> anyhow::Result<()> {
    let service = RelationshipDetectionService::new(&PipelineConfig::default())?;
    let outcome = service.detect(&customers_and_orders(), &CancellationToken::new())?;
    assert!(outcome.failed_strategies.is_empty());

    let rel = outcome
        .store
        .relationships
        .iter()
        .find(|r| r.source_schema_id == "orders.csv" && r.target_schema_id == "customers.csv")
        .expect("orders -> customers");
    assert_eq!(rel.relationship_type, RelationshipType::ManyToOne);
    assert!(rel.confidence.strategy_scores.contains_key("name_based"));
    for score in rel.confidence.strategy_scores.values() {
        assert!(rel.confidence.score >= *score);
    }
    assert_eq!(rel.metadata["source_field"], "customer_id");
    assert!((outcome.store.schema_coverage - 1.0).abs() < f64::EPSILON);
    Ok(())
}

#[test]
fn test_matching_shapes_without_keys_are_many_to_many() -> anyhow::Result<()> {
    let shape = || {
        vec![
            FieldInfo::new("name", "string"),
            FieldInfo::new("email", "string"),
            FieldInfo::new("age", "integer"),
        ]
    };
    let schemas = vec![schema("staff.csv", shape()), schema("contractors.csv", shape())];
    let service = RelationshipDetectionService::new(&PipelineConfig::default())?;
    let store = service.detect(&schemas, &CancellationToken::new())?.store;

    assert_eq!(store.relationships.len(), 1);
    let rel = &store.relationships[0];
    assert_eq!(rel.relationship_type, RelationshipType::ManyToMany);
    assert_eq!(rel.metadata["strategy"], "structural_similarity");
    assert_eq!(rel.metadata["similarity"], 1.0);
    assert!((rel.confidence.score - 0.7).abs() < 1e-9);
    Ok(())
}

#[test]
fn test_cap_keeps_the_strongest_relationships() -> anyhow::Result<()> {
    let shape = || {
        vec![
            FieldInfo::new("name", "string"),
            FieldInfo::new("email", "string"),
        ]
    };
    let mut schemas = customers_and_orders();
    schemas.push(schema("a.csv", shape()));
    schemas.push(schema("b.csv", shape()));
    schemas.push(schema("c.csv", shape()));

    let uncapped = RelationshipDetectionService::new(&PipelineConfig::default())?
        .detect(&schemas, &CancellationToken::new())?
        .store;
    assert!(uncapped.relationships.len() > 2);

    let config = PipelineConfig {
        max_relationships: 2,
        ..PipelineConfig::default()
    };
    let capped = RelationshipDetectionService::new(&config)?
        .detect(&schemas, &CancellationToken::new())?
        .store;
    assert_eq!(capped.relationships, uncapped.relationships[..2].to_vec());
    Ok(())
}

#[test]
fn test_store_metadata_describes_the_run() -> anyhow::Result<()> {
    let service = RelationshipDetectionService::new(&PipelineConfig::default())?;
    let store = service.detect(&customers_and_orders(), &CancellationToken::new())?.store;
    assert_eq!(store.metadata["schema_count"], 2);
    assert_eq!(store.metadata["entity_count"], 2);
    assert_eq!(store.metadata["strategy_versions"]["foreign_key"], "1.0");
    assert!(store.metadata["failed_strategies"].as_array().is_some_and(Vec::is_empty));
    assert_eq!(
        store.confidence_summary.buckets.values().sum::<usize>(),
        store.relationships.len()
    );
    Ok(())
}

#[test]
fn test_no_schemas_give_an_empty_store() -> anyhow::Result<()> {
    let service = RelationshipDetectionService::new(&PipelineConfig::default())?;
    let store = service.detect(&[], &CancellationToken::new())?.store;
    assert!(store.relationships.is_empty());
    assert_eq!(store.schema_coverage, 0.0);
    Ok(())
}

#[test]
fn test_cancelled_detection_returns_no_store() -> anyhow::Result<()> {
    let service = RelationshipDetectionService::new(&PipelineConfig::default())?;
    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = service.detect(&customers_and_orders(), &cancel);
    assert!(matches!(result, Err(DictionaryError::Cancelled)));
    Ok(())
}
