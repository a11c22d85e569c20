//! # SchemaLens Service
//!
//! Format detection, type inference and relationship detection for the
//! structured-data files of a source repository.
//!
//! ## Overview
//!
//! Each file runs through three stages:
//!
//! - **Format detection**: every registered [`ParserPlugin`] scores the file;
//!   the most confident one extracts a [`SchemaDetails`]
//! - **Type inference**: a priority-ordered pipeline of enhancers attaches an
//!   [`EnhancedTypeInfo`] with confidence, patterns and alternatives to every
//!   field
//! - **Relationship detection**: independent strategies propose links between
//!   the entities of all schemas, which are consolidated into a
//!   [`SchemaRelationshipStore`]
//!
//! Parse failures, timeouts and failing strategies are reported next to the
//! output in a [`FailureManifest`]; only configuration errors are fatal.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use schemalens_service::{PipelineConfig, SourceFile, create_pipeline};
//! use tokio_util::sync::CancellationToken;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = create_pipeline(PipelineConfig::default())?;
//! let files = vec![
//!     SourceFile::new("users.json", r#"[{"id": 1, "name": "Ann"}]"#),
//!     SourceFile::new("orders.csv", "order_id,user_id\n10,1\n"),
//! ];
//! let report = pipeline.run(files, &CancellationToken::new())?;
//! for rel in &report.relationships.relationships {
//!     println!("{} -> {} ({})", rel.source_schema_id, rel.target_schema_id, rel.relationship_type);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! [`ParserPlugin`]: detection::ParserPlugin
//! [`SchemaDetails`]: schemalens_core::SchemaDetails
//! [`EnhancedTypeInfo`]: schemalens_core::EnhancedTypeInfo
//! [`SchemaRelationshipStore`]: schemalens_core::SchemaRelationshipStore
//! [`FailureManifest`]: pipeline::FailureManifest

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)] // scores and ratios over counts
#![allow(clippy::doc_markdown)] // SchemaLens, OpenAPI, GraphQL are proper nouns
#![allow(clippy::must_use_candidate)]

/// Cooperative time and cancellation budgets
pub mod budget;

/// Configuration loading and validation
pub mod config;

/// Parser plugin contract, registry and detection engine
pub mod detection;

/// Panic isolation for plugins and strategies
pub mod isolation;

/// Built-in parser plugins
pub mod parsers;

/// Type Inference Service and its enhancers
pub mod inference;

/// Relationship Detection Service and its strategies
pub mod relationship;

/// Pipeline orchestration
pub mod pipeline;

/// Async facade
pub mod service;

/// Factory functions
pub mod factory;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::PipelineConfig;
    pub use crate::detection::{FormatDetectionEngine, ParserPlugin, ParserRegistry, SourceContent};
    pub use crate::factory::*;
    pub use crate::pipeline::{AnalysisPipeline, PipelineReport, SourceFile};
    pub use crate::service::{DataDictionaryService, PipelineDictionaryService};
    pub use schemalens_core::prelude::*;
}

pub use config::{PipelineConfig, load_pipeline_config};
pub use factory::{
    create_default_registry, create_detection_engine, create_dictionary_service, create_pipeline,
    create_relationship_service, create_type_inference_service,
};
pub use pipeline::{AnalysisPipeline, FailureManifest, PipelineReport, SourceFile};
pub use schemalens_core::{DictionaryError, Result};
pub use service::{DataDictionaryService, PipelineDictionaryService};
