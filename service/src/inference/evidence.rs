//! Evidence accumulator for one field

use schemalens_core::scoring::round_score;
use schemalens_core::{
    ConfidenceFactors, EnhancedTypeInfo, NormalizedType, SemanticPattern, StructureInfo,
    TypeAlternative, TypeConfidence,
};
use std::collections::{BTreeMap, BTreeSet};

/// Gap kept between a fixed type and its strongest competitor
const FIXED_TYPE_MARGIN: f64 = 0.05;

#[derive(Debug, Default, Clone)]
struct Candidate {
    factors: ConfidenceFactors,
    // insertion order is pipeline order
    by_enhancer: Vec<(&'static str, f64)>,
}

impl Candidate {
    fn credit(&mut self, enhancer: &'static str, amount: f64) {
        match self.by_enhancer.iter_mut().find(|(name, _)| *name == enhancer) {
            Some((_, total)) => *total += amount,
            None => self.by_enhancer.push((enhancer, amount)),
        }
    }

    fn leading_enhancer(&self) -> Option<&'static str> {
        let mut best: Option<(&'static str, f64)> = None;
        for (name, amount) in &self.by_enhancer {
            if best.is_none_or(|(_, b)| *amount > b) {
                best = Some((*name, *amount));
            }
        }
        best.map(|(name, _)| name)
    }
}

/// Evidence gathered by the enhancers for one field
#[derive(Debug, Clone)]
pub struct Evidence {
    declared: NormalizedType,
    candidates: BTreeMap<NormalizedType, Candidate>,
    notes: Vec<(&'static str, String)>,
    patterns: BTreeSet<SemanticPattern>,
    structure: Option<StructureInfo>,
    fixed: Option<NormalizedType>,
}

impl Evidence {
    /// Empty evidence for a field declared as `declared`
    #[must_use]
    pub fn new(declared: NormalizedType) -> Self {
        Self {
            declared,
            candidates: BTreeMap::new(),
            notes: Vec::new(),
            patterns: BTreeSet::new(),
            structure: None,
            fixed: None,
        }
    }

    /// Normalized type the parser assigned
    #[must_use]
    pub fn declared(&self) -> NormalizedType {
        self.declared
    }

    /// Add `amount` to `factor` of candidate `ty`; non-positive amounts are
    /// ignored
    pub fn support(&mut self, ty: NormalizedType, factor: &str, amount: f64, enhancer: &'static str) {
        if !amount.is_finite() || amount <= 0.0 {
            return;
        }
        let candidate = self.candidates.entry(ty).or_default();
        candidate.factors.add(factor, amount);
        candidate.credit(enhancer, amount);
    }

    /// Support `ty` and fix it as the primary type
    ///
    /// Used for authoritative declarations such as a JSON Schema `format`.
    /// Competing candidates stay below the fixed type and only appear as
    /// alternatives.
    pub fn fix_type(&mut self, ty: NormalizedType, factor: &str, amount: f64, enhancer: &'static str) {
        self.support(ty, factor, amount, enhancer);
        if self.candidates.contains_key(&ty) {
            self.fixed = Some(ty);
        }
    }

    /// Attach a human-readable justification
    pub fn note(&mut self, enhancer: &'static str, text: impl Into<String>) {
        self.notes.push((enhancer, text.into()));
    }

    /// Record a recognized semantic pattern
    pub fn add_pattern(&mut self, pattern: SemanticPattern) {
        self.patterns.insert(pattern);
    }

    /// Record the structure classification of a collection field
    pub fn set_structure(&mut self, structure: StructureInfo) {
        self.structure = Some(structure);
    }

    /// Current capped score of a candidate
    #[must_use]
    pub fn score_of(&self, ty: NormalizedType) -> f64 {
        self.candidates.get(&ty).map_or(0.0, |c| c.factors.total())
    }

    fn contributed(&self, enhancer: &str) -> bool {
        self.candidates
            .values()
            .any(|c| c.by_enhancer.iter().any(|(name, amount)| *name == enhancer && *amount > 0.0))
    }

    /// Resolve the evidence into the final inference result
    #[must_use]
    pub fn finish(self, alternative_floor: f64) -> EnhancedTypeInfo {
        let mut scored: Vec<(NormalizedType, f64)> = self
            .candidates
            .iter()
            .map(|(ty, c)| (*ty, round_score(c.factors.total())))
            .collect();

        let fixed = self
            .fixed
            .and_then(|ty| scored.iter().find(|(t, _)| *t == ty).copied());
        let primary = if let Some((fixed_type, fixed_score)) = fixed {
            let ceiling = round_score(fixed_score - FIXED_TYPE_MARGIN);
            for (ty, score) in &mut scored {
                if *ty != fixed_type {
                    *score = score.min(ceiling);
                }
            }
            Some((fixed_type, fixed_score))
        } else {
            // BTreeMap order is vocabulary order, so the first strict maximum
            // wins unless the declared type ties it
            let mut primary: Option<(NormalizedType, f64)> = None;
            for (ty, score) in &scored {
                let better = match primary {
                    None => true,
                    Some((current, best)) => {
                        *score > best || (*score == best && *ty == self.declared && current != self.declared)
                    }
                };
                if better {
                    primary = Some((*ty, *score));
                }
            }
            primary
        };
        let Some((primary_type, score)) = primary else {
            let mut info = EnhancedTypeInfo::unknown();
            info.patterns = self.patterns;
            info.structure = self.structure;
            info.confidence.rationale = "no evidence".to_string();
            return info;
        };

        let mut possible_alternatives: Vec<TypeAlternative> = scored
            .iter()
            .filter(|(ty, s)| *ty != primary_type && *s >= alternative_floor && *s < score)
            .map(|(ty, s)| TypeAlternative {
                type_name: *ty,
                score: *s,
            })
            .collect();
        // stable: equal scores keep vocabulary order
        possible_alternatives.sort_by(|a, b| b.score.total_cmp(&a.score));

        let winner = self.candidates.get(&primary_type).cloned().unwrap_or_default();
        let rationale = self
            .notes
            .iter()
            .filter(|(enhancer, _)| self.contributed(enhancer))
            .map(|(_, text)| text.as_str())
            .collect::<Vec<_>>()
            .join("; ");

        EnhancedTypeInfo {
            primary_type,
            patterns: self.patterns,
            confidence: TypeConfidence {
                score,
                detection_method: winner.leading_enhancer().unwrap_or("none").to_string(),
                factors: winner.factors,
                rationale,
            },
            possible_alternatives,
            structure: self.structure,
        }
    }
}
