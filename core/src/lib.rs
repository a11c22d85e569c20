//! # `SchemaLens` Core
//!
//! Data contract and pure scoring helpers for the `SchemaLens` schema analysis
//! pipeline.
//!
//! This crate holds everything the pipeline stages exchange with each other
//! and with their collaborators: extracted schemas, per-field type inference
//! results, cross-schema relationships, and the error type. It performs no
//! I/O; parsing, inference and relationship detection live in
//! `schemalens-service`.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]

/// Core error types for `SchemaLens` operations
pub mod error;

/// Schema, field and format type definitions
pub mod types;

/// Type inference results attached to fields
pub mod enhanced;

/// Raw type to normalized type mapping
pub mod normalize;

/// Case folding and singular/plural helpers for identifiers
pub mod naming;

/// Confidence arithmetic
pub mod scoring;

/// Relationship records and the relationship store
pub mod relationship;

// Re-export commonly used types
pub use enhanced::{
    ConfidenceFactors, EnhancedTypeInfo, Homogeneity, StructureInfo, TypeAlternative,
    TypeConfidence,
};
pub use error::{DictionaryError, Result};
pub use relationship::{
    Cardinality, ConfidenceSummary, Multiplicity, RelationshipConfidence, RelationshipKey,
    RelationshipType, SchemaRelationship, SchemaRelationshipStore,
};
pub use serde_json::Value;
pub use types::{
    FieldConstraints, FieldInfo, ForeignKeyRef, FormatType, Metadata, NormalizedType,
    SchemaDetails, SemanticPattern, entity_id,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::enhanced::*;
    pub use crate::error::{DictionaryError, Result};
    pub use crate::relationship::*;
    pub use crate::types::*;
}
