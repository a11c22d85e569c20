//! Relationship Detection Service
//!
//! Independent strategies propose candidate relationships between entities;
//! the service consolidates candidates that share an identity, filters them
//! by confidence and builds the [`SchemaRelationshipStore`].
//!
//! [`SchemaRelationshipStore`]: schemalens_core::SchemaRelationshipStore

pub mod consolidation;
pub mod entities;
pub mod service;
pub mod strategies;

pub use consolidation::{Consolidator, StrategyCandidates};
pub use entities::{EntityView, TypeCompatibility, compatibility, entity_views};
pub use service::{RelationshipDetectionService, RelationshipOutcome, StrategyFailure};
pub use strategies::{
    ForeignKeyStrategy, NameBasedStrategy, StructuralSimilarityStrategy, default_strategies,
};

use crate::budget::{BudgetExceeded, ExecutionBudget};
use schemalens_core::{FieldInfo, SchemaRelationship};
use thiserror::Error;

/// Why a strategy produced no candidates
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelationshipError {
    /// The strategy gave up
    #[error("{0}")]
    Failed(String),
    /// The run was cancelled
    #[error("cancelled")]
    Cancelled,
    /// The strategy panicked
    #[error("panicked: {0}")]
    Panicked(String),
}

impl From<BudgetExceeded> for RelationshipError {
    fn from(exceeded: BudgetExceeded) -> Self {
        match exceeded {
            BudgetExceeded::Cancelled => Self::Cancelled,
            BudgetExceeded::Timeout { elapsed_ms } => {
                Self::Failed(format!("timed out after {elapsed_ms} ms"))
            }
        }
    }
}

/// Shared, read-only input of every strategy
#[derive(Debug)]
pub struct DetectionContext<'a> {
    /// All entities of the run, in schema order
    pub entities: &'a [EntityView<'a>],
    /// Cancellation for the run
    pub budget: &'a ExecutionBudget,
    /// Minimum field-set similarity for structural matches
    pub structural_min_similarity: f64,
}

impl DetectionContext<'_> {
    /// Cooperative checkpoint
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` once the run is cancelled
    pub fn check(&self) -> Result<(), RelationshipError> {
        Ok(self.budget.check()?)
    }
}

/// An independent relationship detection algorithm
pub trait RelationshipStrategy: Send + Sync {
    /// Name recorded in `strategy_scores` and metadata
    fn name(&self) -> &'static str;

    /// Consolidation order; lower goes first
    fn priority(&self) -> u32;

    /// Version recorded in the store metadata
    fn version(&self) -> &'static str {
        "1.0"
    }

    /// Propose candidate relationships
    ///
    /// # Errors
    ///
    /// Returns an error when the strategy cannot complete; its candidates are
    /// discarded
    fn detect(&self, ctx: &DetectionContext<'_>) -> Result<Vec<SchemaRelationship>, RelationshipError>;
}

/// Attach the matched field pair to a candidate
pub(crate) fn with_match(
    relationship: SchemaRelationship,
    strategy: &str,
    source: &FieldInfo,
    target: Option<&FieldInfo>,
) -> SchemaRelationship {
    let relationship = relationship
        .with_metadata("strategy", strategy)
        .with_metadata("source_field", source.name.clone());
    match target {
        Some(target) => relationship.with_metadata("target_field", target.name.clone()),
        None => relationship,
    }
}
