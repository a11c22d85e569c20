//! Type Inference Service
//!
//! Each field runs through a fixed, priority-ordered pipeline of
//! [`TypeEnhancer`]s. Enhancers never write the result directly; they add
//! evidence for candidate types to an [`Evidence`] accumulator, and the
//! accumulator turns that evidence into an [`EnhancedTypeInfo`]:
//!
//! - a candidate's score is the capped sum of its factor contributions
//! - the primary type is the best-scoring candidate (ties go to the declared
//!   type, then to vocabulary order)
//! - alternatives are candidates at or above the floor and strictly below
//!   the primary score
//!
//! [`EnhancedTypeInfo`]: schemalens_core::EnhancedTypeInfo

pub mod enhancers;
pub mod evidence;
pub mod patterns;
pub mod service;

pub use evidence::Evidence;
pub use service::{FieldFailure, InferenceOutcome, TypeInferenceService};

use crate::budget::{BudgetExceeded, ExecutionBudget};
use schemalens_core::{FieldInfo, FormatType, SchemaDetails, Value};

/// What an enhancer sees besides the field itself
#[derive(Debug, Clone, Copy)]
pub struct FieldContext<'a> {
    /// Schema the field belongs to
    pub schema: &'a SchemaDetails,
    /// Non-null sample values of the field
    pub samples: &'a [&'a Value],
    /// Per-field time and cancellation budget
    pub budget: &'a ExecutionBudget,
}

impl FieldContext<'_> {
    /// Whether sample strings carry untyped text (CSV cells, XML text)
    #[must_use]
    pub fn textual_samples(&self) -> bool {
        matches!(self.schema.format_type, FormatType::Csv | FormatType::Xml)
    }

    /// Cooperative checkpoint
    ///
    /// # Errors
    ///
    /// Returns the budget error once the field's deadline passes or the run
    /// is cancelled
    pub fn check(&self) -> Result<(), BudgetExceeded> {
        self.budget.check()
    }
}

/// One stage of the per-field enhancement pipeline
///
/// Implementations must be deterministic and must derive their evidence from
/// the field and its samples only.
pub trait TypeEnhancer: Send + Sync {
    /// Name reported as `detection_method`
    fn name(&self) -> &'static str;

    /// Lower runs first
    fn priority(&self) -> u32;

    /// Add evidence for the field
    ///
    /// # Errors
    ///
    /// Returns the budget error when a checkpoint trips
    fn enhance(
        &self,
        field: &FieldInfo,
        ctx: &FieldContext<'_>,
        evidence: &mut Evidence,
    ) -> Result<(), BudgetExceeded>;
}
