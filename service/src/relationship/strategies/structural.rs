//! Structural-similarity strategy
//!
//! Weighted Jaccard overlap of top-level field names: a shared name counts
//! 1.0 when the types match exactly, 0.5 when they are compatible and 0 when
//! they are not.

use crate::relationship::{
    DetectionContext, EntityView, RelationshipError, RelationshipStrategy, compatibility,
};
use schemalens_core::naming::to_snake_case;
use schemalens_core::scoring::round_score;
use schemalens_core::{FieldInfo, RelationshipConfidence, RelationshipType, SchemaRelationship};
use std::collections::BTreeMap;

const BASE_SCORE: f64 = 0.3;
const SIMILARITY_SCORE: f64 = 0.4;
/// Entities with fewer fields carry too little shape to compare
const MIN_FIELDS: usize = 2;

/// Similarity of the overall field shape of two entities
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralSimilarityStrategy;

struct Overlap<'a> {
    similarity: f64,
    shared: Vec<(&'a FieldInfo, &'a FieldInfo)>,
}

fn shape<'a>(entity: &EntityView<'a>) -> BTreeMap<String, &'a FieldInfo> {
    let mut fields = BTreeMap::new();
    for field in entity.top_level() {
        fields.entry(to_snake_case(&field.name)).or_insert(field);
    }
    fields
}

fn overlap<'a>(a: &BTreeMap<String, &'a FieldInfo>, b: &BTreeMap<String, &'a FieldInfo>) -> Overlap<'a> {
    let mut weight = 0.0;
    let mut shared = Vec::new();
    for (name, fa) in a {
        if let Some(fb) = b.get(name) {
            weight += compatibility(fa, fb).weight();
            shared.push((*fa, *fb));
        }
    }
    let union = a.len() + b.len() - shared.len();
    let similarity = if union == 0 { 0.0 } else { weight / union as f64 };
    Overlap { similarity, shared }
}

impl RelationshipStrategy for StructuralSimilarityStrategy {
    fn name(&self) -> &'static str {
        "structural_similarity"
    }

    fn priority(&self) -> u32 {
        20
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Result<Vec<SchemaRelationship>, RelationshipError> {
        let shapes: Vec<BTreeMap<String, &FieldInfo>> = ctx.entities.iter().map(shape).collect();
        let mut candidates = Vec::new();
        for i in 0..ctx.entities.len() {
            ctx.check()?;
            if shapes[i].len() < MIN_FIELDS {
                continue;
            }
            for j in i + 1..ctx.entities.len() {
                if shapes[j].len() < MIN_FIELDS {
                    continue;
                }
                let found = overlap(&shapes[i], &shapes[j]);
                if found.similarity < ctx.structural_min_similarity || found.similarity <= 0.0 {
                    continue;
                }
                let shared_key = found.shared.iter().any(|(fa, fb)| fa.is_unique() && fb.is_unique());
                let relationship_type = if shared_key {
                    RelationshipType::OneToOne
                } else {
                    RelationshipType::ManyToMany
                };
                let score = BASE_SCORE + SIMILARITY_SCORE * found.similarity;
                let names: Vec<String> = found.shared.iter().map(|(fa, _)| fa.name.clone()).collect();
                candidates.push(
                    SchemaRelationship::new(
                        ctx.entities[i].id.clone(),
                        ctx.entities[j].id.clone(),
                        relationship_type,
                        RelationshipConfidence::single(self.name(), score),
                    )
                    .with_metadata("strategy", self.name())
                    .with_metadata("similarity", round_score(found.similarity))
                    .with_metadata("shared_fields", names),
                );
            }
        }
        tracing::debug!(strategy = self.name(), candidates = candidates.len(), "strategy finished");
        Ok(candidates)
    }
}
