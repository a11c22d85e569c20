//! Type Inference Service

use super::enhancers::default_enhancers;
use super::{Evidence, FieldContext, TypeEnhancer};
use crate::budget::{BudgetExceeded, ExecutionBudget};
use crate::config::PipelineConfig;
use crate::detection::SampleRecord;
use crate::isolation::run_isolated;
use rayon::prelude::*;
use schemalens_core::{EnhancedTypeInfo, FieldInfo, Result, SchemaDetails, Value};
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A field whose inference did not complete
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldFailure {
    /// Source path of the schema
    pub schema: String,
    /// Qualified field name
    pub field: String,
    /// Human-readable reason
    pub reason: String,
}

/// Result of enhancing one schema
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InferenceOutcome {
    /// Fields that received an `EnhancedTypeInfo`
    pub enhanced: usize,
    /// Fields that timed out or panicked
    pub failures: Vec<FieldFailure>,
    /// The run was cancelled; no field of the schema was updated
    pub cancelled: bool,
}

enum FieldResult {
    Enhanced(EnhancedTypeInfo),
    Failed(String),
    Cancelled,
}

/// Runs the enhancer pipeline over every field of a schema
pub struct TypeInferenceService {
    enhancers: Vec<Box<dyn TypeEnhancer>>,
    alternative_floor: f64,
    timeout: Duration,
    parallel: bool,
}

impl std::fmt::Debug for TypeInferenceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeInferenceService")
            .field("enhancers", &self.enhancer_names())
            .field("alternative_floor", &self.alternative_floor)
            .field("timeout", &self.timeout)
            .field("parallel", &self.parallel)
            .finish()
    }
}

impl TypeInferenceService {
    /// Service with the built-in enhancers
    ///
    /// # Errors
    ///
    /// Returns `DictionaryError::Configuration` for an invalid configuration
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        Self::with_enhancers(config, default_enhancers())
    }

    /// Service with a custom enhancer list; the list is sorted by priority
    /// here and never again
    ///
    /// # Errors
    ///
    /// Returns `DictionaryError::Configuration` for an invalid configuration
    pub fn with_enhancers(config: &PipelineConfig, mut enhancers: Vec<Box<dyn TypeEnhancer>>) -> Result<Self> {
        config.validate()?;
        enhancers.sort_by_key(|e| e.priority());
        let service = Self {
            enhancers,
            alternative_floor: config.alternative_floor,
            timeout: config.inference_timeout(),
            parallel: config.parallel,
        };
        tracing::info!(enhancers = ?service.enhancer_names(), "type inference service ready");
        Ok(service)
    }

    /// Enhancer names in execution order
    #[must_use]
    pub fn enhancer_names(&self) -> Vec<&'static str> {
        self.enhancers.iter().map(|e| e.name()).collect()
    }

    /// Run the pipeline for one field
    ///
    /// # Errors
    ///
    /// Returns the budget error when the field's deadline passes or the run
    /// is cancelled
    pub fn enhance_field(
        &self,
        schema: &SchemaDetails,
        field: &FieldInfo,
        samples: &[&Value],
        budget: &ExecutionBudget,
    ) -> std::result::Result<EnhancedTypeInfo, BudgetExceeded> {
        let ctx = FieldContext {
            schema,
            samples,
            budget,
        };
        let mut evidence = Evidence::new(field.normalized_type);
        for enhancer in &self.enhancers {
            ctx.check()?;
            enhancer.enhance(field, &ctx, &mut evidence)?;
        }
        Ok(evidence.finish(self.alternative_floor))
    }

    fn field_samples<'r>(field: &FieldInfo, records: &'r [SampleRecord]) -> Vec<&'r Value> {
        let key = field.sample_key();
        records
            .iter()
            .filter_map(|record| record.get(&key))
            .filter(|v| !v.is_null())
            .collect()
    }

    fn run_field(
        &self,
        schema: &SchemaDetails,
        field: &FieldInfo,
        records: &[SampleRecord],
        cancel: &CancellationToken,
    ) -> FieldResult {
        if cancel.is_cancelled() {
            return FieldResult::Cancelled;
        }
        let budget = ExecutionBudget::new(self.timeout, cancel.clone());
        let samples = Self::field_samples(field, records);
        match run_isolated(&field.name, || self.enhance_field(schema, field, &samples, &budget)) {
            Ok(Ok(info)) => FieldResult::Enhanced(info),
            Ok(Err(BudgetExceeded::Cancelled)) => FieldResult::Cancelled,
            Ok(Err(BudgetExceeded::Timeout { elapsed_ms })) => {
                tracing::warn!(
                    path = %schema.source_path,
                    field = %field.name,
                    elapsed_ms,
                    "type inference timed out"
                );
                FieldResult::Failed(format!("inference timed out after {elapsed_ms} ms"))
            }
            Err(message) => FieldResult::Failed(message),
        }
    }

    /// Enhance every field of `schema` in place
    ///
    /// Fields are independent and may run in parallel; each has its own
    /// deadline. A cancelled run leaves the schema untouched.
    #[tracing::instrument(skip_all, fields(path = %schema.source_path))]
    pub fn enhance_schema(
        &self,
        schema: &mut SchemaDetails,
        samples: &[SampleRecord],
        cancel: &CancellationToken,
    ) -> InferenceOutcome {
        let results: Vec<FieldResult> = {
            let view: &SchemaDetails = schema;
            if self.parallel {
                view.fields
                    .par_iter()
                    .map(|field| self.run_field(view, field, samples, cancel))
                    .collect()
            } else {
                view.fields
                    .iter()
                    .map(|field| self.run_field(view, field, samples, cancel))
                    .collect()
            }
        };

        if results.iter().any(|r| matches!(r, FieldResult::Cancelled)) {
            tracing::info!(path = %schema.source_path, "type inference cancelled");
            return InferenceOutcome {
                cancelled: true,
                ..InferenceOutcome::default()
            };
        }

        let mut outcome = InferenceOutcome::default();
        for (field, result) in schema.fields.iter_mut().zip(results) {
            match result {
                FieldResult::Enhanced(info) => {
                    field.enhanced = Some(info);
                    outcome.enhanced += 1;
                }
                FieldResult::Failed(reason) => {
                    field.enhanced = None;
                    outcome.failures.push(FieldFailure {
                        schema: schema.source_path.clone(),
                        field: field.name.clone(),
                        reason,
                    });
                }
                FieldResult::Cancelled => {}
            }
        }
        tracing::debug!(
            path = %schema.source_path,
            enhanced = outcome.enhanced,
            failed = outcome.failures.len(),
            "schema enhanced"
        );
        outcome
    }
}
