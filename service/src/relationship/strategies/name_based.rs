//! Name-based strategy: key-like fields with the same or singular/plural
//! related names in two entities

use super::strongest_per_identity;
use crate::relationship::{
    DetectionContext, EntityView, RelationshipError, RelationshipStrategy, TypeCompatibility,
    compatibility, with_match,
};
use schemalens_core::naming::{is_key_like, names_related};
use schemalens_core::{FieldInfo, RelationshipConfidence, RelationshipType, SchemaRelationship};

const EXACT_SCORE: f64 = 0.6;
const COMPATIBLE_SCORE: f64 = 0.45;
/// Applied when neither side is unique
const NO_KEY_FACTOR: f64 = 0.85;

/// Matches related key-like field names across entities
#[derive(Debug, Default, Clone, Copy)]
pub struct NameBasedStrategy;

fn eligible(field: &FieldInfo) -> bool {
    // bare `id` columns are everywhere and link nothing
    is_key_like(&field.name) && !field.name.eq_ignore_ascii_case("id")
}

impl NameBasedStrategy {
    fn pair(&self, a: &EntityView<'_>, b: &EntityView<'_>, out: &mut Vec<SchemaRelationship>) {
        for fa in a.top_level().filter(|f| eligible(f)) {
            for fb in b.top_level().filter(|f| eligible(f)) {
                if !names_related(&fa.name, &fb.name) {
                    continue;
                }
                let mut score = match compatibility(fa, fb) {
                    TypeCompatibility::Exact => EXACT_SCORE,
                    TypeCompatibility::Compatible => COMPATIBLE_SCORE,
                    TypeCompatibility::Incompatible => continue,
                };
                let (a_unique, b_unique) = (fa.is_unique(), fb.is_unique());
                if !a_unique && !b_unique {
                    score *= NO_KEY_FACTOR;
                }
                // point at the unique side when only one side is unique
                let (source, target, sf, tf) = if a_unique && !b_unique {
                    (b, a, fb, fa)
                } else {
                    (a, b, fa, fb)
                };
                let relationship = SchemaRelationship::new(
                    source.id.clone(),
                    target.id.clone(),
                    RelationshipType::from_uniqueness(sf.is_unique(), tf.is_unique()),
                    RelationshipConfidence::single(self.name(), score),
                );
                out.push(with_match(relationship, self.name(), sf, Some(tf)));
            }
        }
    }
}

impl RelationshipStrategy for NameBasedStrategy {
    fn name(&self) -> &'static str {
        "name_based"
    }

    fn priority(&self) -> u32 {
        10
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Result<Vec<SchemaRelationship>, RelationshipError> {
        let mut candidates = Vec::new();
        for (i, a) in ctx.entities.iter().enumerate() {
            ctx.check()?;
            for b in &ctx.entities[i + 1..] {
                self.pair(a, b, &mut candidates);
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
    use schemalens_core::{FormatType, SchemaDetails};

    fn detect(schemas: &[SchemaDetails]) -> Vec<SchemaRelationship> {
        let entities = entity_views(schemas);
        let budget = ExecutionBudget::unbounded();
        let ctx = DetectionContext {
            entities: &entities,
            budget: &budget,
            structural_min_similarity: 0.5,
        };
        NameBasedStrategy.detect(&ctx).unwrap()
    }

    #[test]
    fn test_shared_key_points_to_unique_side() {
        let mut orders = SchemaDetails::new(FormatType::Csv, "orders", "orders.csv");
        orders.push_field(FieldInfo::new("customer_id", "integer"));
        let mut customers = SchemaDetails::new(FormatType::Csv, "customers", "customers.csv");
        customers.push_field(FieldInfo::new("customer_id", "integer").primary_key());

        let found = detect(&[customers, orders]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].source_schema_id, "orders.csv");
        assert_eq!(found[0].relationship_type, RelationshipType::ManyToOne);
        assert_eq!(found[0].confidence.score, EXACT_SCORE);
    }

    #[test]
    fn test_plural_names_without_keys_are_discounted() {
        let mut a = SchemaDetails::new(FormatType::Csv, "a", "a.csv");
        a.push_field(FieldInfo::new("tag_ids", "string"));
        let mut b = SchemaDetails::new(FormatType::Csv, "b", "b.csv");
        b.push_field(FieldInfo::new("tag_id", "string"));
        // `tag_ids` is not key-like; nothing matches
        assert!(detect(&[a, b]).is_empty());

        let mut a = SchemaDetails::new(FormatType::Csv, "a", "a.csv");
        a.push_field(FieldInfo::new("region_code", "string"));
        let mut b = SchemaDetails::new(FormatType::Csv, "b", "b.csv");
        b.push_field(FieldInfo::new("RegionCode", "string"));
        let found = detect(&[a, b]);
        assert_eq!(found[0].relationship_type, RelationshipType::ManyToMany);
        assert!((found[0].confidence.score - EXACT_SCORE * NO_KEY_FACTOR).abs() < 1e-9);
    }

    #[test]
    fn test_bare_ids_are_ignored() {
        let mut a = SchemaDetails::new(FormatType::Json, "a", "a.json");
        a.push_field(FieldInfo::new("id", "integer").primary_key());
        let mut b = SchemaDetails::new(FormatType::Json, "b", "b.json");
        b.push_field(FieldInfo::new("id", "integer").primary_key());
        assert!(detect(&[a, b]).is_empty());
    }
}
