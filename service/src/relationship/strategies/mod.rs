//! Built-in relationship strategies

pub mod foreign_key;
pub mod name_based;
pub mod structural;

pub use foreign_key::ForeignKeyStrategy;
pub use name_based::NameBasedStrategy;
pub use structural::StructuralSimilarityStrategy;

use super::RelationshipStrategy;
use schemalens_core::{RelationshipKey, SchemaRelationship};
use std::collections::BTreeMap;

/// Strategies in consolidation order
#[must_use]
pub fn default_strategies() -> Vec<Box<dyn RelationshipStrategy>> {
    vec![
        Box::new(ForeignKeyStrategy),
        Box::new(NameBasedStrategy),
        Box::new(StructuralSimilarityStrategy),
    ]
}

/// Keep the strongest candidate per identity; equal scores keep the first
pub(crate) fn strongest_per_identity(candidates: Vec<SchemaRelationship>) -> Vec<SchemaRelationship> {
    let mut order: Vec<RelationshipKey> = Vec::new();
    let mut best: BTreeMap<RelationshipKey, SchemaRelationship> = BTreeMap::new();
    for candidate in candidates {
        let key = candidate.identity();
        match best.get(&key) {
            Some(current) if current.confidence.score >= candidate.confidence.score => {}
            Some(_) => {
                best.insert(key, candidate);
            }
            None => {
                order.push(key.clone());
                best.insert(key, candidate);
            }
        }
    }
    order.into_iter().filter_map(|key| best.remove(&key)).collect()
}
