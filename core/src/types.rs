//! Schema data contract shared by every pipeline stage
//!
//! These records are what the persistence, API and UI collaborators read, so
//! their serialized field names and enum spellings are part of the public
//! contract and must not drift.

use crate::enhanced::EnhancedTypeInfo;
use crate::normalize::normalize_raw_type;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Free-form metadata attached to schemas, fields and relationships.
///
/// A `BTreeMap` keeps serialization order stable between runs.
pub type Metadata = BTreeMap<String, Value>;

/// Structural format of a schema file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatType {
    /// JSON documents and JSON Lines
    Json,
    /// Comma/tab/semicolon separated values
    Csv,
    /// XML instance documents and XSD
    Xml,
    /// YAML documents
    Yaml,
    /// SQL data definition statements
    Sql,
    /// Apache Avro schemas and object container files
    Avro,
    /// Protocol Buffers definitions
    Protobuf,
    /// GraphQL schema definition language
    Graphql,
    /// JSON Schema documents
    JsonSchema,
    /// OpenAPI / Swagger documents
    Openapi,
    /// Apache Parquet files
    Parquet,
    /// Apache ORC files
    Orc,
    /// No registered parser claimed the file
    Unknown,
}

impl FormatType {
    /// Stable identifier used in serialized output and logs
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Xml => "xml",
            Self::Yaml => "yaml",
            Self::Sql => "sql",
            Self::Avro => "avro",
            Self::Protobuf => "protobuf",
            Self::Graphql => "graphql",
            Self::JsonSchema => "json_schema",
            Self::Openapi => "openapi",
            Self::Parquet => "parquet",
            Self::Orc => "orc",
            Self::Unknown => "unknown",
        }
    }

    /// Whether the format declares types (as opposed to carrying instance data
    /// whose types are only observed).
    #[must_use]
    pub fn is_schema_definition(&self) -> bool {
        !matches!(
            self,
            Self::Json | Self::Csv | Self::Xml | Self::Yaml | Self::Unknown
        )
    }
}

impl fmt::Display for FormatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized type vocabulary
///
/// Declaration order doubles as the deterministic tie-break order when two
/// candidate types score the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizedType {
    /// Text
    String,
    /// Whole numbers
    Integer,
    /// Floating point and decimal numbers
    Float,
    /// True/false
    Boolean,
    /// Calendar date without time
    Date,
    /// Timestamp
    Datetime,
    /// Ordered collection
    Array,
    /// Record with named properties
    Object,
    /// Key/value collection with uniform value type
    Map,
    /// Unrecognized or unresolved type
    Unknown,
}

impl NormalizedType {
    /// Every member of the vocabulary, in tie-break order
    pub const ALL: [NormalizedType; 10] = [
        Self::String,
        Self::Integer,
        Self::Float,
        Self::Boolean,
        Self::Date,
        Self::Datetime,
        Self::Array,
        Self::Object,
        Self::Map,
        Self::Unknown,
    ];

    /// Stable identifier
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Datetime => "datetime",
            Self::Array => "array",
            Self::Object => "object",
            Self::Map => "map",
            Self::Unknown => "unknown",
        }
    }

    /// Whether the type is numeric
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }

    /// Whether the type is a container
    #[must_use]
    pub fn is_complex(&self) -> bool {
        matches!(self, Self::Array | Self::Object | Self::Map)
    }
}

impl fmt::Display for NormalizedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recognized semantic value patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SemanticPattern {
    /// RFC 4122 identifier
    Uuid,
    /// E-mail address
    Email,
    /// Calendar date
    Date,
    /// Timestamp
    Datetime,
    /// URL / URI
    Url,
    /// IPv4 or IPv6 address
    IpAddress,
    /// Telephone number
    PhoneNumber,
    /// Monetary amount
    Currency,
    /// Percentage value
    Percentage,
    /// Identifier / key
    Id,
}

impl SemanticPattern {
    /// Normalized type a value carrying this pattern is best represented as
    #[must_use]
    pub fn implied_type(&self) -> NormalizedType {
        match self {
            Self::Date => NormalizedType::Date,
            Self::Datetime => NormalizedType::Datetime,
            Self::Currency | Self::Percentage => NormalizedType::Float,
            Self::Uuid
            | Self::Email
            | Self::Url
            | Self::IpAddress
            | Self::PhoneNumber
            | Self::Id => NormalizedType::String,
        }
    }
}

/// Explicit foreign-key target declared by the source format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    /// Referenced entity (table, message, type) name
    pub entity: String,
    /// Referenced field, when the format names one
    pub field: Option<String>,
}

/// Declared constraints on a field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldConstraints {
    /// Maximum length for strings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    /// Minimum length for strings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    /// Numeric lower bound
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    /// Numeric upper bound
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    /// Permitted values
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
    /// Regular expression the value must match
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Format keyword (JSON Schema `format`, logical types)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Uniqueness constraint
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unique: bool,
    /// Declared default value, verbatim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    /// Declared foreign-key target
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references: Option<ForeignKeyRef>,
}

impl FieldConstraints {
    /// True when no constraint is declared
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// A single field of an extracted schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInfo {
    /// Field name; nested fields use dotted qualified names
    pub name: String,
    /// Raw format-specific type string
    #[serde(rename = "type")]
    pub field_type: String,
    /// Normalized type derived from the raw type alone
    pub normalized_type: NormalizedType,
    /// Whether null is a permitted value
    pub nullable: bool,
    /// Whether the field must be present
    pub required: bool,
    /// Declared constraints
    #[serde(default, skip_serializing_if = "FieldConstraints::is_empty")]
    pub constraints: FieldConstraints,
    /// Primary-key marker
    #[serde(default)]
    pub is_primary_key: bool,
    /// Foreign-key hint from the format (explicit reference or naming)
    #[serde(default)]
    pub is_foreign_key_hint: bool,
    /// Top-level entity this field belongs to in multi-entity files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    /// Qualified name of the containing field for flattened nested fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Human-readable description from the source
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Format-specific extras
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
    /// Type inference result, attached by the Type Inference Service
    #[serde(rename = "enhanced_type_info", skip_serializing_if = "Option::is_none")]
    pub enhanced: Option<EnhancedTypeInfo>,
}

impl FieldInfo {
    /// Create a field with a raw type; the normalized type is derived from it
    pub fn new(name: impl Into<String>, raw_type: impl Into<String>) -> Self {
        let field_type = raw_type.into();
        let normalized_type = normalize_raw_type(&field_type);
        Self {
            name: name.into(),
            field_type,
            normalized_type,
            nullable: true,
            required: false,
            constraints: FieldConstraints::default(),
            is_primary_key: false,
            is_foreign_key_hint: false,
            entity: None,
            parent: None,
            description: None,
            metadata: Metadata::new(),
            enhanced: None,
        }
    }

    /// Set the nullable flag
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Set the required flag
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Mark as primary key (implies required, not nullable, unique)
    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.required = true;
        self.nullable = false;
        self.constraints.unique = true;
        self
    }

    /// Attach the owning entity
    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    /// Attach the parent field
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Replace the constraint set
    pub fn with_constraints(mut self, constraints: FieldConstraints) -> Self {
        if constraints.references.is_some() {
            self.is_foreign_key_hint = true;
        }
        self.constraints = constraints;
        self
    }

    /// Attach a description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Insert a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Override the normalized type (formats whose raw vocabulary is ambiguous)
    pub fn with_normalized_type(mut self, normalized: NormalizedType) -> Self {
        self.normalized_type = normalized;
        self
    }

    /// Unqualified field name (last dotted segment)
    #[must_use]
    pub fn local_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// Key of this field in sample records: `<entity>#<name>` for entity
    /// fields, the qualified name otherwise
    #[must_use]
    pub fn sample_key(&self) -> String {
        match &self.entity {
            Some(entity) => format!("{entity}#{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Whether values of this field are unique within its entity
    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.is_primary_key || self.constraints.unique
    }

    /// The best known normalized type: enhanced if present, otherwise declared
    #[must_use]
    pub fn effective_type(&self) -> NormalizedType {
        self.enhanced
            .as_ref()
            .map_or(self.normalized_type, |e| e.primary_type)
    }
}

/// One file's extracted schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDetails {
    /// Detected format
    pub format_type: FormatType,
    /// Schema name (usually the file stem or declared name)
    pub name: String,
    /// Path of the file within the repository
    pub source_path: String,
    /// Fields in source order
    pub fields: Vec<FieldInfo>,
    /// Format-specific metadata (dialect, counts, declared names)
    #[serde(default)]
    pub metadata: Metadata,
}

impl SchemaDetails {
    /// Create an empty schema
    pub fn new(
        format_type: FormatType,
        name: impl Into<String>,
        source_path: impl Into<String>,
    ) -> Self {
        Self {
            format_type,
            name: name.into(),
            source_path: source_path.into(),
            fields: Vec::new(),
            metadata: Metadata::new(),
        }
    }

    /// Opaque identifier used for cross references
    #[must_use]
    pub fn id(&self) -> &str {
        &self.source_path
    }

    /// Append a field
    pub fn push_field(&mut self, field: FieldInfo) {
        self.fields.push(field);
    }

    /// Insert a metadata entry
    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
    }

    /// Look up a field by qualified name
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Distinct entity names in first-seen order
    #[must_use]
    pub fn entity_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for entity in self.fields.iter().filter_map(|f| f.entity.as_deref()) {
            if !names.contains(&entity) {
                names.push(entity);
            }
        }
        names
    }

    /// Whether Type Inference has run over this schema
    #[must_use]
    pub fn is_enhanced(&self) -> bool {
        self.fields.iter().any(|f| f.enhanced.is_some())
    }
}

/// Identifier for an entity inside a schema file
#[must_use]
pub fn entity_id(schema_id: &str, entity: Option<&str>) -> String {
    match entity {
        Some(entity) => format!("{schema_id}#{entity}"),
        None => schema_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_new_normalizes_raw_type() {
        let field = FieldInfo::new("created_at", "TIMESTAMP WITH TIME ZONE");
        assert_eq!(field.normalized_type, NormalizedType::Datetime);
        assert_eq!(field.field_type, "TIMESTAMP WITH TIME ZONE");

        let field = FieldInfo::new("blob", "geography(POINT)");
        assert_eq!(field.normalized_type, NormalizedType::Unknown);
    }

    #[test]
    fn test_primary_key_implies_unique() {
        let field = FieldInfo::new("id", "integer").primary_key();
        assert!(field.is_unique());
        assert!(field.required);
        assert!(!field.nullable);
    }

    #[test]
    fn test_entity_names_first_seen_order() {
        let mut schema = SchemaDetails::new(FormatType::Sql, "shop", "db/shop.sql");
        schema.push_field(FieldInfo::new("users.id", "int").with_entity("users"));
        schema.push_field(FieldInfo::new("orders.id", "int").with_entity("orders"));
        schema.push_field(FieldInfo::new("users.name", "text").with_entity("users"));
        assert_eq!(schema.entity_names(), vec!["users", "orders"]);
        assert_eq!(entity_id(schema.id(), Some("users")), "db/shop.sql#users");
        assert_eq!(entity_id(schema.id(), None), "db/shop.sql");
    }

    #[test]
    fn test_enum_serialization_is_stable() {
        assert_eq!(
            serde_json::to_string(&FormatType::JsonSchema).unwrap(),
            "\"json_schema\""
        );
        assert_eq!(
            serde_json::to_string(&SemanticPattern::IpAddress).unwrap(),
            "\"IP_ADDRESS\""
        );
        assert_eq!(
            serde_json::to_string(&NormalizedType::Datetime).unwrap(),
            "\"datetime\""
        );
    }

    #[test]
    fn test_local_name() {
        let field = FieldInfo::new("address.geo.lat", "float");
        assert_eq!(field.local_name(), "lat");
    }
}
