//! Relationship Detection Service

use super::consolidation::{Consolidator, StrategyCandidates};
use super::entities::{EntityView, entity_views};
use super::strategies::default_strategies;
use super::{DetectionContext, RelationshipError, RelationshipStrategy};
use crate::budget::ExecutionBudget;
use crate::config::PipelineConfig;
use crate::isolation::run_isolated;
use rayon::prelude::*;
use schemalens_core::scoring::round_score;
use schemalens_core::{
    ConfidenceSummary, DictionaryError, Metadata, Result, SchemaDetails, SchemaRelationship,
    SchemaRelationshipStore, Value,
};
use serde::Serialize;
use std::collections::BTreeSet;
use tokio_util::sync::CancellationToken;

/// A strategy whose candidates were discarded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyFailure {
    /// Strategy name
    pub strategy: String,
    /// Human-readable reason
    pub reason: String,
}

/// Store plus the strategies that failed while building it
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipOutcome {
    /// Final relationship store
    pub store: SchemaRelationshipStore,
    /// Isolated strategy failures
    pub failed_strategies: Vec<StrategyFailure>,
}

/// Runs the strategies and consolidates their output
pub struct RelationshipDetectionService {
    strategies: Vec<Box<dyn RelationshipStrategy>>,
    consolidator: Consolidator,
    confidence_threshold: f64,
    max_relationships: usize,
    structural_min_similarity: f64,
    parallel: bool,
    options: Value,
}

impl std::fmt::Debug for RelationshipDetectionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationshipDetectionService")
            .field("strategies", &self.strategy_names())
            .field("confidence_threshold", &self.confidence_threshold)
            .field("max_relationships", &self.max_relationships)
            .finish_non_exhaustive()
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round_score(part as f64 / whole as f64)
    }
}

impl RelationshipDetectionService {
    /// Service with the built-in strategies
    ///
    /// # Errors
    ///
    /// Returns `DictionaryError::Configuration` for an invalid configuration
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        Self::with_strategies(config, default_strategies())
    }

    /// Service with a custom strategy list, sorted by priority once here
    ///
    /// # Errors
    ///
    /// Returns `DictionaryError::Configuration` for an invalid configuration
    pub fn with_strategies(
        config: &PipelineConfig,
        mut strategies: Vec<Box<dyn RelationshipStrategy>>,
    ) -> Result<Self> {
        config.validate()?;
        strategies.sort_by_key(|s| s.priority());
        let service = Self {
            strategies,
            consolidator: Consolidator::new(config.corroboration_weight),
            confidence_threshold: config.confidence_threshold,
            max_relationships: config.max_relationships,
            structural_min_similarity: config.structural_min_similarity,
            parallel: config.parallel,
            options: config.relationship_options(),
        };
        tracing::info!(strategies = ?service.strategy_names(), "relationship detection service ready");
        Ok(service)
    }

    /// Strategy names in consolidation order
    #[must_use]
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    fn run_strategy(
        strategy: &dyn RelationshipStrategy,
        ctx: &DetectionContext<'_>,
    ) -> std::result::Result<Vec<SchemaRelationship>, RelationshipError> {
        if ctx.budget.is_cancelled() {
            return Err(RelationshipError::Cancelled);
        }
        run_isolated(strategy.name(), || strategy.detect(ctx)).map_err(RelationshipError::Panicked)?
    }

    /// Detect relationships across `schemas`
    ///
    /// Strategy failures are isolated and reported in the outcome.
    ///
    /// # Errors
    ///
    /// Returns `DictionaryError::Cancelled` if the run is cancelled; no
    /// partial store is returned
    #[tracing::instrument(skip_all, fields(schemas = schemas.len()))]
    pub fn detect(&self, schemas: &[SchemaDetails], cancel: &CancellationToken) -> Result<RelationshipOutcome> {
        let entities = entity_views(schemas);
        let budget = ExecutionBudget::cancellable(cancel.clone());
        let ctx = DetectionContext {
            entities: &entities,
            budget: &budget,
            structural_min_similarity: self.structural_min_similarity,
        };

        let results: Vec<std::result::Result<Vec<SchemaRelationship>, RelationshipError>> = if self.parallel {
            self.strategies
                .par_iter()
                .map(|s| Self::run_strategy(s.as_ref(), &ctx))
                .collect()
        } else {
            self.strategies
                .iter()
                .map(|s| Self::run_strategy(s.as_ref(), &ctx))
                .collect()
        };

        let mut outputs = Vec::new();
        let mut failures = Vec::new();
        let mut candidate_counts = serde_json::Map::new();
        for (strategy, result) in self.strategies.iter().zip(results) {
            match result {
                Ok(candidates) => {
                    candidate_counts.insert(strategy.name().to_string(), candidates.len().into());
                    outputs.push(StrategyCandidates {
                        strategy: strategy.name(),
                        priority: strategy.priority(),
                        candidates,
                    });
                }
                Err(RelationshipError::Cancelled) => {
                    tracing::info!("relationship detection cancelled");
                    return Err(DictionaryError::Cancelled);
                }
                Err(err) => {
                    tracing::warn!(strategy = strategy.name(), error = %err, "strategy failed");
                    failures.push(StrategyFailure {
                        strategy: strategy.name().to_string(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        if cancel.is_cancelled() {
            return Err(DictionaryError::Cancelled);
        }

        let mut relationships: Vec<SchemaRelationship> = self
            .consolidator
            .consolidate(outputs)
            .into_iter()
            .filter(|r| r.confidence.score >= self.confidence_threshold)
            .collect();
        relationships.sort_by(|a, b| {
            b.confidence
                .score
                .total_cmp(&a.confidence.score)
                .then_with(|| a.source_schema_id.cmp(&b.source_schema_id))
                .then_with(|| a.target_schema_id.cmp(&b.target_schema_id))
                .then_with(|| a.relationship_type.cmp(&b.relationship_type))
        });
        relationships.truncate(self.max_relationships);

        let covered: BTreeSet<&str> = relationships
            .iter()
            .flat_map(|r| [r.source_schema_id.as_str(), r.target_schema_id.as_str()])
            .collect();
        let covered_entities: Vec<&EntityView<'_>> =
            entities.iter().filter(|e| covered.contains(e.id.as_str())).collect();
        let covered_schemas: BTreeSet<&str> = covered_entities.iter().map(|e| e.schema.id()).collect();
        let schema_coverage = ratio(covered_schemas.len(), schemas.len());
        let entity_coverage = ratio(covered_entities.len(), entities.len());

        let mut metadata = self.metadata(entities.len(), schemas.len(), candidate_counts, &failures);
        metadata.insert("entity_coverage".to_string(), entity_coverage.into());
        tracing::info!(
            entities = entities.len(),
            relationships = relationships.len(),
            failed_strategies = failures.len(),
            "relationship detection finished"
        );
        Ok(RelationshipOutcome {
            store: SchemaRelationshipStore {
                confidence_summary: ConfidenceSummary::from_relationships(&relationships),
                relationships,
                schema_coverage,
                metadata,
            },
            failed_strategies: failures,
        })
    }

    fn metadata(
        &self,
        entities: usize,
        schemas: usize,
        candidate_counts: serde_json::Map<String, Value>,
        failures: &[StrategyFailure],
    ) -> Metadata {
        let versions: serde_json::Map<String, Value> = self
            .strategies
            .iter()
            .map(|s| (s.name().to_string(), s.version().into()))
            .collect();
        let failed: Vec<Value> = failures
            .iter()
            .map(|f| serde_json::json!({ "strategy": f.strategy, "reason": f.reason }))
            .collect();
        let mut metadata = Metadata::new();
        metadata.insert("options".to_string(), self.options.clone());
        metadata.insert("strategy_versions".to_string(), Value::Object(versions));
        metadata.insert("candidate_counts".to_string(), Value::Object(candidate_counts));
        metadata.insert("failed_strategies".to_string(), Value::Array(failed));
        metadata.insert("schema_count".to_string(), schemas.into());
        metadata.insert("entity_count".to_string(), entities.into());
        metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemalens_core::{FieldInfo, FormatType, RelationshipType};

    struct Exploding;

    impl RelationshipStrategy for Exploding {
        fn name(&self) -> &'static str {
            "exploding"
        }

        fn priority(&self) -> u32 {
            5
        }

        fn detect(&self, _ctx: &DetectionContext<'_>) -> std::result::Result<Vec<SchemaRelationship>, RelationshipError> {
            panic!("strategy bug")
        }
    }

    fn schemas() -> Vec<SchemaDetails> {
        let mut users = SchemaDetails::new(FormatType::Json, "users", "users.json");
        users.push_field(FieldInfo::new("id", "integer").primary_key());
        users.push_field(FieldInfo::new("name", "string"));
        let mut orders = SchemaDetails::new(FormatType::Csv, "orders", "orders.csv");
        orders.push_field(FieldInfo::new("order_id", "integer").primary_key());
        orders.push_field(FieldInfo::new("user_id", "integer"));
        let mut notes = SchemaDetails::new(FormatType::Csv, "notes", "notes.csv");
        notes.push_field(FieldInfo::new("text", "string"));
        vec![users, orders, notes]
    }

    #[test]
    fn test_store_contents() {
        let service = RelationshipDetectionService::new(&PipelineConfig::default()).unwrap();
        let outcome = service.detect(&schemas(), &CancellationToken::new()).unwrap();
        let store = outcome.store;
        assert_eq!(store.len(), 1);
        assert_eq!(store.relationships[0].relationship_type, RelationshipType::ManyToOne);
        assert!((store.schema_coverage - round_score(2.0 / 3.0)).abs() < 1e-9);
        assert_eq!(store.metadata["entity_coverage"], store.schema_coverage);
        assert_eq!(store.confidence_summary.buckets["0.8-1.0"], 1);
        assert_eq!(store.metadata["strategy_versions"]["foreign_key"], "1.0");
        assert!(outcome.failed_strategies.is_empty());
    }

    #[test]
    fn test_panicking_strategy_is_isolated() {
        let mut strategies = default_strategies();
        strategies.push(Box::new(Exploding));
        let service = RelationshipDetectionService::with_strategies(&PipelineConfig::default(), strategies).unwrap();
        assert_eq!(
            service.strategy_names(),
            vec!["foreign_key", "exploding", "name_based", "structural_similarity"]
        );
        let outcome = service.detect(&schemas(), &CancellationToken::new()).unwrap();
        assert_eq!(outcome.store.len(), 1);
        assert_eq!(outcome.failed_strategies.len(), 1);
        assert_eq!(outcome.failed_strategies[0].strategy, "exploding");
        assert_eq!(outcome.store.metadata["failed_strategies"][0]["strategy"], "exploding");
    }

    #[test]
    fn test_threshold_and_cap() {
        let config = PipelineConfig {
            confidence_threshold: 0.9,
            ..PipelineConfig::default()
        };
        let service = RelationshipDetectionService::new(&config).unwrap();
        let store = service.detect(&schemas(), &CancellationToken::new()).unwrap().store;
        assert!(store.is_empty());
        assert_eq!(store.schema_coverage, 0.0);

        let mut with_items = schemas();
        let mut items = SchemaDetails::new(FormatType::Csv, "items", "items.csv");
        items.push_field(FieldInfo::new("user_id", "integer"));
        with_items.push(items);
        let config = PipelineConfig {
            max_relationships: 1,
            ..PipelineConfig::default()
        };
        let service = RelationshipDetectionService::new(&config).unwrap();
        let store = service.detect(&with_items, &CancellationToken::new()).unwrap().store;
        assert_eq!(store.len(), 1);
        // equal confidence: source ID decides
        assert_eq!(store.relationships[0].source_schema_id, "items.csv");
    }

    #[test]
    fn test_cancelled_run_returns_no_store() {
        let service = RelationshipDetectionService::new(&PipelineConfig::default()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(service.detect(&schemas(), &cancel), Err(DictionaryError::Cancelled)));
    }
}
