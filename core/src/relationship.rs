//! Cross-schema relationship records

use crate::scoring::{BUCKET_LABELS, bucket_label, round_score};
use crate::types::Metadata;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Multiplicity classification of a relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RelationshipType {
    /// Each source row matches at most one target row and vice versa
    #[serde(rename = "one-to-one")]
    OneToOne,
    /// One source row relates to many target rows
    #[serde(rename = "one-to-many")]
    OneToMany,
    /// Many source rows relate to one target row
    #[serde(rename = "many-to-one")]
    ManyToOne,
    /// No uniqueness on either side
    #[serde(rename = "many-to-many")]
    ManyToMany,
}

impl RelationshipType {
    /// The same relationship seen from the other side
    #[must_use]
    pub fn inverse(self) -> Self {
        match self {
            Self::OneToMany => Self::ManyToOne,
            Self::ManyToOne => Self::OneToMany,
            other => other,
        }
    }

    /// Derive the type from the uniqueness of the matched field on each side
    #[must_use]
    pub fn from_uniqueness(source_unique: bool, target_unique: bool) -> Self {
        match (source_unique, target_unique) {
            (true, true) => Self::OneToOne,
            (false, true) => Self::ManyToOne,
            (true, false) => Self::OneToMany,
            (false, false) => Self::ManyToMany,
        }
    }

    /// Stable identifier
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneToOne => "one-to-one",
            Self::OneToMany => "one-to-many",
            Self::ManyToOne => "many-to-one",
            Self::ManyToMany => "many-to-many",
        }
    }

    /// Cardinality implied by this type
    #[must_use]
    pub fn cardinality(self) -> Cardinality {
        let (source, target) = match self {
            Self::OneToOne => (Multiplicity::One, Multiplicity::One),
            Self::OneToMany => (Multiplicity::One, Multiplicity::Many),
            Self::ManyToOne => (Multiplicity::Many, Multiplicity::One),
            Self::ManyToMany => (Multiplicity::Many, Multiplicity::Many),
        };
        Cardinality { source, target }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One side of a cardinality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Multiplicity {
    /// At most one
    One,
    /// Any number
    Many,
}

/// Multiplicity on both sides of a relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cardinality {
    /// Multiplicity of the source side
    pub source: Multiplicity,
    /// Multiplicity of the target side
    pub target: Multiplicity,
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = |m: Multiplicity| match m {
            Multiplicity::One => "1",
            Multiplicity::Many => "N",
        };
        write!(f, "{}:{}", side(self.source), side(self.target))
    }
}

/// Confidence of a relationship with its per-strategy breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipConfidence {
    /// Consolidated score in `[0, 1]`
    pub score: f64,
    /// Best score reported by each contributing strategy
    pub strategy_scores: BTreeMap<String, f64>,
}

impl RelationshipConfidence {
    /// Confidence from a single strategy
    #[must_use]
    pub fn single(strategy: &str, score: f64) -> Self {
        let score = round_score(score);
        let mut strategy_scores = BTreeMap::new();
        strategy_scores.insert(strategy.to_string(), score);
        Self {
            score,
            strategy_scores,
        }
    }
}

/// A foreign-key-like link between two schema entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaRelationship {
    /// Entity ID of the source side
    pub source_schema_id: String,
    /// Entity ID of the target side
    pub target_schema_id: String,
    /// Multiplicity classification
    pub relationship_type: RelationshipType,
    /// Consolidated confidence
    pub confidence: RelationshipConfidence,
    /// Multiplicity of each side
    pub cardinality: Cardinality,
    /// Matched field names, strategy names and other evidence
    #[serde(default)]
    pub metadata: Metadata,
}

impl SchemaRelationship {
    /// Create a relationship; cardinality follows from the type
    #[must_use]
    pub fn new(
        source_schema_id: impl Into<String>,
        target_schema_id: impl Into<String>,
        relationship_type: RelationshipType,
        confidence: RelationshipConfidence,
    ) -> Self {
        Self {
            source_schema_id: source_schema_id.into(),
            target_schema_id: target_schema_id.into(),
            relationship_type,
            cardinality: relationship_type.cardinality(),
            confidence,
            metadata: Metadata::new(),
        }
    }

    /// Insert a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Identity key: the unordered entity pair plus the type seen from the
    /// lexicographically smaller ID.
    #[must_use]
    pub fn identity(&self) -> RelationshipKey {
        RelationshipKey::new(
            &self.source_schema_id,
            &self.target_schema_id,
            self.relationship_type,
        )
    }

    /// Whether this relationship touches the given entity ID
    #[must_use]
    pub fn involves(&self, entity_id: &str) -> bool {
        self.source_schema_id == entity_id || self.target_schema_id == entity_id
    }
}

/// Canonical identity of a relationship
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelationshipKey {
    /// Smaller entity ID
    pub first: String,
    /// Larger entity ID
    pub second: String,
    /// Type oriented from `first` to `second`
    pub relationship_type: RelationshipType,
}

impl RelationshipKey {
    /// Canonicalize a directed relationship
    #[must_use]
    pub fn new(source: &str, target: &str, relationship_type: RelationshipType) -> Self {
        if source <= target {
            Self {
                first: source.to_string(),
                second: target.to_string(),
                relationship_type,
            }
        } else {
            Self {
                first: target.to_string(),
                second: source.to_string(),
                relationship_type: relationship_type.inverse(),
            }
        }
    }
}

/// Bucketed view over the confidences of a relationship set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceSummary {
    /// Relationship counts per confidence bucket
    pub buckets: BTreeMap<String, usize>,
    /// Lowest confidence (0 when empty)
    pub min: f64,
    /// Highest confidence (0 when empty)
    pub max: f64,
    /// Mean confidence (0 when empty)
    pub mean: f64,
}

impl ConfidenceSummary {
    /// Summarize a set of relationships
    #[must_use]
    pub fn from_relationships(relationships: &[SchemaRelationship]) -> Self {
        let mut buckets: BTreeMap<String, usize> =
            BUCKET_LABELS.iter().map(|l| ((*l).to_string(), 0)).collect();
        if relationships.is_empty() {
            return Self {
                buckets,
                min: 0.0,
                max: 0.0,
                mean: 0.0,
            };
        }
        let mut min = f64::MAX;
        let mut max = f64::MIN;
        let mut sum = 0.0;
        for rel in relationships {
            let score = rel.confidence.score;
            *buckets.entry(bucket_label(score).to_string()).or_insert(0) += 1;
            min = min.min(score);
            max = max.max(score);
            sum += score;
        }
        Self {
            buckets,
            min: round_score(min),
            max: round_score(max),
            mean: round_score(sum / relationships.len() as f64),
        }
    }
}

/// Final output of one relationship detection run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaRelationshipStore {
    /// Relationships, confidence descending
    pub relationships: Vec<SchemaRelationship>,
    /// Fraction of input schemas that appear in at least one relationship
    pub schema_coverage: f64,
    /// Confidence histogram
    pub confidence_summary: ConfidenceSummary,
    /// Options used, strategy versions, failures
    pub metadata: Metadata,
}

impl SchemaRelationshipStore {
    /// Number of relationships
    #[must_use]
    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_identity_is_orientation_free() {
        let forward = SchemaRelationship::new(
            "orders.csv",
            "users.json",
            RelationshipType::ManyToOne,
            RelationshipConfidence::single("foreign_key", 0.9),
        );
        let backward = SchemaRelationship::new(
            "users.json",
            "orders.csv",
            RelationshipType::OneToMany,
            RelationshipConfidence::single("name_based", 0.6),
        );
        assert_eq!(forward.identity(), backward.identity());
    }

    #[test]
    fn test_from_uniqueness() {
        assert_eq!(
            RelationshipType::from_uniqueness(false, true),
            RelationshipType::ManyToOne
        );
        assert_eq!(
            RelationshipType::from_uniqueness(true, true),
            RelationshipType::OneToOne
        );
        assert_eq!(RelationshipType::ManyToOne.cardinality().to_string(), "N:1");
    }

    #[test]
    fn test_relationship_type_serialization() {
        assert_eq!(
            serde_json::to_string(&RelationshipType::ManyToOne).unwrap(),
            "\"many-to-one\""
        );
    }

    #[test]
    fn test_summary_buckets() {
        let rels: Vec<SchemaRelationship> = [0.55, 0.9, 0.95]
            .iter()
            .map(|s| {
                SchemaRelationship::new(
                    "a",
                    "b",
                    RelationshipType::ManyToOne,
                    RelationshipConfidence::single("foreign_key", *s),
                )
            })
            .collect();
        let summary = ConfidenceSummary::from_relationships(&rels);
        assert_eq!(summary.buckets["0.4-0.6"], 1);
        assert_eq!(summary.buckets["0.8-1.0"], 2);
        assert_eq!(summary.buckets["0.0-0.2"], 0);
        assert!((summary.max - 0.95).abs() < 1e-9);
    }
}
