//! Foreign-key strategy
//!
//! Two signals, strongest first:
//!
//! - an explicit reference declared by the format (`REFERENCES users(id)`,
//!   a GraphQL field typed as another object type)
//! - a column named after another entity's key (`user_id` → `users`)

use super::strongest_per_identity;
use crate::relationship::{
    DetectionContext, EntityView, RelationshipError, RelationshipStrategy, TypeCompatibility,
    compatibility, with_match,
};
use schemalens_core::naming::{foreign_key_names, to_snake_case};
use schemalens_core::{FieldInfo, RelationshipConfidence, RelationshipType, SchemaRelationship};

const EXPLICIT_SCORE: f64 = 0.95;
const EXPLICIT_OBJECT_SCORE: f64 = 0.9;
const EXPLICIT_MISMATCH_SCORE: f64 = 0.6;
const NAMING_EXACT_SCORE: f64 = 0.85;
const NAMING_COMPATIBLE_SCORE: f64 = 0.7;

/// Explicit references and `<entity>_id` naming against key fields
#[derive(Debug, Default, Clone, Copy)]
pub struct ForeignKeyStrategy;

impl ForeignKeyStrategy {
    fn candidate(
        &self,
        source: &EntityView<'_>,
        field: &FieldInfo,
        target: &EntityView<'_>,
        target_field: Option<&FieldInfo>,
        score: f64,
        signal: &str,
    ) -> SchemaRelationship {
        let target_unique = target_field.is_none_or(FieldInfo::is_unique);
        let relationship_type = RelationshipType::from_uniqueness(field.is_unique(), target_unique);
        let relationship = SchemaRelationship::new(
            source.id.clone(),
            target.id.clone(),
            relationship_type,
            RelationshipConfidence::single(self.name(), score),
        )
        .with_metadata("signal", signal);
        with_match(relationship, self.name(), field, target_field)
    }

    fn explicit(
        &self,
        source: &EntityView<'_>,
        field: &FieldInfo,
        entities: &[EntityView<'_>],
        out: &mut Vec<SchemaRelationship>,
    ) -> bool {
        let Some(reference) = field.constraints.references.as_ref() else {
            return false;
        };
        // same-file entities shadow same-named entities elsewhere
        let targets: Vec<&EntityView<'_>> = {
            let all: Vec<&EntityView<'_>> = entities.iter().filter(|e| e.answers_to(&reference.entity)).collect();
            let local: Vec<&EntityView<'_>> = all
                .iter()
                .copied()
                .filter(|e| std::ptr::eq(e.schema, source.schema))
                .collect();
            if local.is_empty() { all } else { local }
        };
        for target in targets {
            let target_field = match reference.field.as_deref() {
                Some(name) => target.field(name),
                None => target.keys().into_iter().next(),
            };
            let score = if field.effective_type().is_complex() {
                EXPLICIT_OBJECT_SCORE
            } else {
                match target_field.map(|t| compatibility(field, t)) {
                    Some(TypeCompatibility::Incompatible) => EXPLICIT_MISMATCH_SCORE,
                    _ => EXPLICIT_SCORE,
                }
            };
            out.push(self.candidate(source, field, target, target_field, score, "explicit_reference"));
        }
        true
    }

    fn by_naming(
        &self,
        source: &EntityView<'_>,
        field: &FieldInfo,
        entities: &[EntityView<'_>],
        out: &mut Vec<SchemaRelationship>,
    ) {
        let name = to_snake_case(&field.name);
        for target in entities {
            if target.id == source.id || !foreign_key_names(&target.name).contains(&name) {
                continue;
            }
            for key in target.keys() {
                let score = match compatibility(field, key) {
                    TypeCompatibility::Exact => NAMING_EXACT_SCORE,
                    TypeCompatibility::Compatible => NAMING_COMPATIBLE_SCORE,
                    TypeCompatibility::Incompatible => continue,
                };
                out.push(self.candidate(source, field, target, Some(key), score, "naming_convention"));
            }
        }
    }
}

impl RelationshipStrategy for ForeignKeyStrategy {
    fn name(&self) -> &'static str {
        "foreign_key"
    }

    fn priority(&self) -> u32 {
        0
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Result<Vec<SchemaRelationship>, RelationshipError> {
        let mut candidates = Vec::new();
        for source in ctx.entities {
            ctx.check()?;
            for field in source.top_level() {
                if field.is_primary_key && field.constraints.references.is_none() {
                    continue;
                }
                if !self.explicit(source, field, ctx.entities, &mut candidates) {
                    self.by_naming(source, field, ctx.entities, &mut candidates);
                }
            }
        }
        tracing::debug!(strategy = self.name(), candidates = candidates.len(), "strategy finished");
        Ok(strongest_per_identity(candidates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::ExecutionBudget;
    use crate::relationship::entity_views;
    use schemalens_core::{FieldConstraints, ForeignKeyRef, FormatType, SchemaDetails};

    fn detect(schemas: &[SchemaDetails]) -> Vec<SchemaRelationship> {
        let entities = entity_views(schemas);
        let budget = ExecutionBudget::unbounded();
        let ctx = DetectionContext {
            entities: &entities,
            budget: &budget,
            structural_min_similarity: 0.5,
        };
        ForeignKeyStrategy.detect(&ctx).unwrap()
    }

    #[test]
    fn test_naming_convention_links_to_key() {
        let mut users = SchemaDetails::new(FormatType::Json, "users", "users.json");
        users.push_field(FieldInfo::new("id", "integer").primary_key());
        let mut orders = SchemaDetails::new(FormatType::Csv, "orders", "orders.csv");
        orders.push_field(FieldInfo::new("user_id", "integer"));

        let found = detect(&[users, orders]);
        assert_eq!(found.len(), 1);
        let rel = &found[0];
        assert_eq!(rel.source_schema_id, "orders.csv");
        assert_eq!(rel.target_schema_id, "users.json");
        assert_eq!(rel.relationship_type, RelationshipType::ManyToOne);
        assert_eq!(rel.confidence.score, NAMING_EXACT_SCORE);
        assert_eq!(rel.metadata["source_field"], "user_id");
        assert_eq!(rel.metadata["target_field"], "id");
    }

    #[test]
    fn test_explicit_reference_prefers_local_entity() {
        let mut shop = SchemaDetails::new(FormatType::Sql, "shop", "shop.sql");
        shop.push_field(FieldInfo::new("id", "INT").with_entity("users").primary_key());
        shop.push_field(
            FieldInfo::new("owner", "INT")
                .with_entity("orders")
                .with_constraints(FieldConstraints {
                    references: Some(ForeignKeyRef {
                        entity: "users".to_string(),
                        field: Some("id".to_string()),
                    }),
                    ..FieldConstraints::default()
                }),
        );
        let mut other = SchemaDetails::new(FormatType::Sql, "legacy", "legacy.sql");
        other.push_field(FieldInfo::new("id", "INT").with_entity("users").primary_key());

        let found = detect(&[shop, other]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].target_schema_id, "shop.sql#users");
        assert_eq!(found[0].confidence.score, EXPLICIT_SCORE);
        assert_eq!(found[0].metadata["signal"], "explicit_reference");
    }

    #[test]
    fn test_incompatible_naming_match_is_dropped() {
        let mut users = SchemaDetails::new(FormatType::Json, "users", "users.json");
        users.push_field(FieldInfo::new("id", "integer").primary_key());
        let mut orders = SchemaDetails::new(FormatType::Csv, "orders", "orders.csv");
        orders.push_field(FieldInfo::new("user_id", "boolean"));
        assert!(detect(&[users, orders]).is_empty());
    }
}
