//! Type inference results attached to fields

use crate::types::{NormalizedType, SemanticPattern};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Named contributions to a type confidence score.
///
/// The fixed fields cover the built-in enhancers; `extra` is the open
/// extension map for enhancer-specific factors. All values are partial scores
/// in `[0, 1]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceFactors {
    /// Type declared by the source format
    #[serde(default)]
    pub declared_type: f64,
    /// Field-name vocabulary match
    #[serde(default)]
    pub name_pattern_match: f64,
    /// Fraction of sampled values matching a pattern or value type
    #[serde(default)]
    pub pattern_match: f64,
    /// Declared constraints (format keyword, enum, bounds)
    #[serde(default)]
    pub constraint_match: f64,
    /// Element / property structure analysis
    #[serde(default)]
    pub structure_match: f64,
    /// Enhancer-specific factors
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, f64>,
}

impl ConfidenceFactors {
    /// Add a contribution to a named factor.
    ///
    /// Unknown names go to the extension map.
    pub fn add(&mut self, name: &str, value: f64) {
        let value = sanitize(value);
        match name {
            "declared_type" => self.declared_type += value,
            "name_pattern_match" => self.name_pattern_match += value,
            "pattern_match" => self.pattern_match += value,
            "constraint_match" => self.constraint_match += value,
            "structure_match" => self.structure_match += value,
            other => *self.extra.entry(other.to_string()).or_insert(0.0) += value,
        }
    }

    /// Read a factor by name
    #[must_use]
    pub fn get(&self, name: &str) -> f64 {
        match name {
            "declared_type" => self.declared_type,
            "name_pattern_match" => self.name_pattern_match,
            "pattern_match" => self.pattern_match,
            "constraint_match" => self.constraint_match,
            "structure_match" => self.structure_match,
            other => self.extra.get(other).copied().unwrap_or(0.0),
        }
    }

    /// All factors as `(name, value)` pairs in a fixed order
    #[must_use]
    pub fn iter(&self) -> Vec<(&str, f64)> {
        let mut out = vec![
            ("declared_type", self.declared_type),
            ("name_pattern_match", self.name_pattern_match),
            ("pattern_match", self.pattern_match),
            ("constraint_match", self.constraint_match),
            ("structure_match", self.structure_match),
        ];
        out.extend(self.extra.iter().map(|(k, v)| (k.as_str(), *v)));
        out
    }

    /// Sum of all contributions, capped at 1.0
    #[must_use]
    pub fn total(&self) -> f64 {
        crate::scoring::combine_additive(self.iter().into_iter().map(|(_, v)| v))
    }
}

/// Confidence attached to an inferred type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeConfidence {
    /// Final score in `[0, 1]`
    pub score: f64,
    /// Contributing factors toward the primary type
    pub factors: ConfidenceFactors,
    /// Human-readable justification
    pub rationale: String,
    /// Enhancer that contributed the strongest factor
    pub detection_method: String,
}

impl Default for TypeConfidence {
    fn default() -> Self {
        Self {
            score: 0.0,
            factors: ConfidenceFactors::default(),
            rationale: String::new(),
            detection_method: "none".to_string(),
        }
    }
}

/// A runner-up type with its score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeAlternative {
    /// Candidate type
    #[serde(rename = "type")]
    pub type_name: NormalizedType,
    /// Score in `[0, 1]`, strictly below the primary score
    pub score: f64,
}

/// Whether the elements of an array share one inferred type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Homogeneity {
    /// Every element has the same type
    Homogeneous,
    /// Elements of different types
    Heterogeneous,
    /// No elements to observe
    Empty,
}

/// Shape details for array, object and map fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureInfo {
    /// Element type for arrays, value type for maps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_type: Option<NormalizedType>,
    /// Key type for maps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_type: Option<NormalizedType>,
    /// Array homogeneity classification
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homogeneity: Option<Homogeneity>,
    /// Distinct element types observed, in vocabulary order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub observed_types: Vec<NormalizedType>,
    /// Property names for object-shaped fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<String>,
}

/// Type inference result for one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedTypeInfo {
    /// Winning normalized type
    pub primary_type: NormalizedType,
    /// Semantic patterns recognized for the field
    pub patterns: BTreeSet<SemanticPattern>,
    /// Confidence in the primary type
    pub confidence: TypeConfidence,
    /// Runner-up types, descending by score
    pub possible_alternatives: Vec<TypeAlternative>,
    /// Structure analysis for complex fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure: Option<StructureInfo>,
}

impl EnhancedTypeInfo {
    /// Result for a field nothing could be said about
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            primary_type: NormalizedType::Unknown,
            patterns: BTreeSet::new(),
            confidence: TypeConfidence::default(),
            possible_alternatives: Vec::new(),
            structure: None,
        }
    }

    /// Check the published invariants: score bounds and alternatives strictly
    /// below the primary score in descending order.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let score = self.confidence.score;
        let in_bounds = (0.0..=1.0).contains(&score);
        let below = self
            .possible_alternatives
            .iter()
            .all(|alt| alt.score < score && (0.0..=1.0).contains(&alt.score));
        let sorted = self
            .possible_alternatives
            .windows(2)
            .all(|w| w[0].score >= w[1].score);
        let excludes_primary = self
            .possible_alternatives
            .iter()
            .all(|alt| alt.type_name != self.primary_type);
        in_bounds && below && sorted && excludes_primary
    }

    /// Score of an alternative type, if listed
    #[must_use]
    pub fn alternative_score(&self, type_name: NormalizedType) -> Option<f64> {
        self.possible_alternatives
            .iter()
            .find(|alt| alt.type_name == type_name)
            .map(|alt| alt.score)
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() { value.max(0.0) } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factor_add_routes_unknown_names_to_extra() {
        let mut factors = ConfidenceFactors::default();
        factors.add("declared_type", 0.35);
        factors.add("lexical_string", 0.2);
        factors.add("lexical_string", 0.05);
        assert!((factors.get("declared_type") - 0.35).abs() < f64::EPSILON);
        assert!((factors.get("lexical_string") - 0.25).abs() < 1e-9);
        assert!((factors.total() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_negative_and_nan_contributions_are_ignored() {
        let mut factors = ConfidenceFactors::default();
        factors.add("pattern_match", -0.4);
        factors.add("pattern_match", f64::NAN);
        assert_eq!(factors.pattern_match, 0.0);
    }

    #[test]
    fn test_consistency_check() {
        let mut info = EnhancedTypeInfo::unknown();
        info.primary_type = NormalizedType::Date;
        info.confidence.score = 0.8;
        info.possible_alternatives = vec![
            TypeAlternative { type_name: NormalizedType::String, score: 0.5 },
            TypeAlternative { type_name: NormalizedType::Datetime, score: 0.2 },
        ];
        assert!(info.is_consistent());

        info.possible_alternatives[0].score = 0.8;
        assert!(!info.is_consistent());
    }
}
