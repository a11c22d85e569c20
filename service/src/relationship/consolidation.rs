//! Merge candidates that several strategies proposed for the same identity
//!
//! Candidates are folded in strategy priority order, so the result does not
//! depend on which strategy finished first:
//!
//! - the first contributor fixes orientation, type and base metadata
//! - each strategy's best score is kept in `strategy_scores`
//! - the consolidated score is
//!   `max + (1 - max) * w * (1 - Π others (1 - s))`

use schemalens_core::scoring::{consolidate, round_score};
use schemalens_core::{RelationshipKey, SchemaRelationship, Value};
use std::collections::BTreeMap;

/// Output of one strategy, tagged with its priority
#[derive(Debug, Clone)]
pub struct StrategyCandidates {
    /// Strategy name
    pub strategy: &'static str,
    /// Strategy priority
    pub priority: u32,
    /// Proposed relationships
    pub candidates: Vec<SchemaRelationship>,
}

struct Group {
    record: SchemaRelationship,
    matches: Vec<Value>,
}

/// Deterministic reduction of strategy outputs
#[derive(Debug, Clone, Copy)]
pub struct Consolidator {
    corroboration_weight: f64,
}

impl Consolidator {
    /// Consolidator with corroboration weight `w`
    #[must_use]
    pub fn new(corroboration_weight: f64) -> Self {
        Self {
            corroboration_weight,
        }
    }

    /// Merge candidates with the same identity
    ///
    /// Output is in identity order; callers sort by confidence afterwards.
    #[must_use]
    pub fn consolidate(&self, mut outputs: Vec<StrategyCandidates>) -> Vec<SchemaRelationship> {
        outputs.sort_by_key(|o| o.priority);
        let mut groups: BTreeMap<RelationshipKey, Group> = BTreeMap::new();

        for output in outputs {
            for candidate in output.candidates {
                let key = candidate.identity();
                let matched = evidence_of(output.strategy, &candidate);
                match groups.get_mut(&key) {
                    None => {
                        let mut record = candidate;
                        let score = round_score(record.confidence.score);
                        record.confidence.strategy_scores =
                            BTreeMap::from([(output.strategy.to_string(), score)]);
                        groups.insert(
                            key,
                            Group {
                                record,
                                matches: vec![matched],
                            },
                        );
                    }
                    Some(group) => {
                        let score = round_score(candidate.confidence.score);
                        let entry = group
                            .record
                            .confidence
                            .strategy_scores
                            .entry(output.strategy.to_string())
                            .or_insert(score);
                        *entry = entry.max(score);
                        group.matches.push(matched);
                    }
                }
            }
        }

        groups
            .into_values()
            .map(|group| {
                let mut record = group.record;
                let scores: Vec<f64> = record.confidence.strategy_scores.values().copied().collect();
                record.confidence.score = round_score(consolidate(&scores, self.corroboration_weight));
                let strategies: Vec<String> = record.confidence.strategy_scores.keys().cloned().collect();
                record.metadata.insert("strategies".to_string(), strategies.into());
                record.metadata.insert("evidence".to_string(), Value::Array(group.matches));
                record
            })
            .collect()
    }
}

fn evidence_of(strategy: &str, candidate: &SchemaRelationship) -> Value {
    let mut entry = serde_json::Map::new();
    entry.insert("strategy".to_string(), strategy.into());
    entry.insert("score".to_string(), round_score(candidate.confidence.score).into());
    for key in ["source_field", "target_field", "signal", "similarity"] {
        if let Some(value) = candidate.metadata.get(key) {
            entry.insert(key.to_string(), value.clone());
        }
    }
    Value::Object(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemalens_core::{RelationshipConfidence, RelationshipType};

    fn candidate(src: &str, tgt: &str, ty: RelationshipType, strategy: &str, score: f64) -> SchemaRelationship {
        SchemaRelationship::new(src, tgt, ty, RelationshipConfidence::single(strategy, score))
    }

    #[test]
    fn test_corroboration_raises_confidence() {
        let outputs = vec![
            StrategyCandidates {
                strategy: "name_based",
                priority: 10,
                candidates: vec![candidate("b", "a", RelationshipType::OneToMany, "name_based", 0.6)],
            },
            StrategyCandidates {
                strategy: "foreign_key",
                priority: 0,
                candidates: vec![candidate("a", "b", RelationshipType::ManyToOne, "foreign_key", 0.85)],
            },
        ];
        let merged = Consolidator::new(0.5).consolidate(outputs);
        assert_eq!(merged.len(), 1);
        let rel = &merged[0];
        // foreign_key has priority, so its orientation wins
        assert_eq!(rel.source_schema_id, "a");
        assert_eq!(rel.relationship_type, RelationshipType::ManyToOne);
        assert!(rel.confidence.score > 0.85);
        assert!(rel.confidence.score <= 1.0);
        assert_eq!(rel.confidence.strategy_scores.len(), 2);
    }

    #[test]
    fn test_distinct_types_stay_separate() {
        let outputs = vec![StrategyCandidates {
            strategy: "structural_similarity",
            priority: 20,
            candidates: vec![
                candidate("a", "b", RelationshipType::ManyToMany, "structural_similarity", 0.5),
                candidate("a", "b", RelationshipType::OneToOne, "structural_similarity", 0.5),
            ],
        }];
        assert_eq!(Consolidator::new(0.5).consolidate(outputs).len(), 2);
    }

    #[test]
    fn test_completion_order_does_not_matter() {
        let fk = || StrategyCandidates {
            strategy: "foreign_key",
            priority: 0,
            candidates: vec![candidate("a", "b", RelationshipType::ManyToOne, "foreign_key", 0.7)],
        };
        let nb = || StrategyCandidates {
            strategy: "name_based",
            priority: 10,
            candidates: vec![candidate("b", "a", RelationshipType::OneToMany, "name_based", 0.45)],
        };
        let consolidator = Consolidator::new(0.5);
        assert_eq!(
            consolidator.consolidate(vec![fk(), nb()]),
            consolidator.consolidate(vec![nb(), fk()])
        );
    }
}
