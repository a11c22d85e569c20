//! JSON Schema parser and the definition extractor shared with OpenAPI
//!
//! Named definitions (`definitions`, `$defs`, `components.schemas`) become
//! arena nodes; `$ref` pointers resolve by their last path segment, so a
//! definition referring to itself terminates in the flattener's cycle check.

use super::arena::{Member, NodeId, Target, TypeArena};
use super::yaml::load_documents;
use super::{decode_text, file_stem, has_extension, mark_conventional_keys, sniff};
use crate::detection::{DetectionResult, ParseContext, ParseError, ParseResult, ParserPlugin};
use indexmap::IndexMap;
use schemalens_core::normalize::normalize_raw_type;
use schemalens_core::{FieldConstraints, FieldInfo, FormatType, NormalizedType, SchemaDetails};
use serde_json::{Map, Value};

/// Read a JSON or YAML document
///
/// # Errors
///
/// Returns the JSON syntax error (with location) when the text looks like
/// JSON, otherwise the YAML reader's error
pub fn read_document(text: &str, ctx: &ParseContext) -> ParseResult<Value> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return serde_json::from_str(text).map_err(|e| {
            ParseError::syntax_at(
                format!("invalid JSON: {e}"),
                Some(super::offset_of(text, e.line(), e.column())),
                Some(e.line()),
            )
        });
    }
    load_documents(text, ctx)?
        .into_iter()
        .next()
        .ok_or_else(|| ParseError::syntax_at("empty document", Some(0), Some(1)))
}

#[derive(Debug, Default)]
struct Shape {
    raw: String,
    normalized: Option<NormalizedType>,
    nullable: bool,
    target: Option<Target>,
    constraints: FieldConstraints,
}

/// Converts JSON Schema definitions into flattened fields
pub struct SchemaExtractor<'v, 'c> {
    definitions: IndexMap<String, &'v Value>,
    arena: TypeArena,
    ctx: &'c ParseContext,
}

fn pointer_name(reference: &str) -> &str {
    reference.rsplit('/').next().unwrap_or(reference)
}

fn is_object_like(schema: &Value) -> bool {
    let open_object = schema.get("type").and_then(Value::as_str) == Some("object")
        && matches!(schema.get("additionalProperties"), None | Some(Value::Bool(_)));
    schema.get("properties").is_some() || schema.get("allOf").is_some() || open_object
}

impl<'v, 'c> SchemaExtractor<'v, 'c> {
    /// Extractor over named definitions
    #[must_use]
    pub fn new(definitions: IndexMap<String, &'v Value>, ctx: &'c ParseContext) -> Self {
        Self {
            definitions,
            arena: TypeArena::new(),
            ctx,
        }
    }

    /// Names of the object-like definitions, in document order
    #[must_use]
    pub fn entity_names(&self) -> Vec<String> {
        self.definitions
            .iter()
            .filter(|(_, schema)| is_object_like(schema))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Flatten every object-like definition, plus an optional root schema,
    /// each as its own entity
    ///
    /// # Errors
    ///
    /// Returns the budget error when the parse deadline passes
    pub fn extract(mut self, root: Option<(&str, &'v Value)>) -> ParseResult<Vec<FieldInfo>> {
        let names = self.entity_names();
        let mut entities: Vec<(String, NodeId)> = Vec::new();
        for name in &names {
            self.arena.declare(name);
        }
        if let Some((root_name, root_schema)) = root {
            let node = self.arena.alloc(root_name);
            self.populate(node, root_schema, 0)?;
            entities.push((root_name.to_string(), node));
        }
        for name in names {
            // a definition sharing the root's name stays referenceable only
            if entities.iter().any(|(existing, _)| *existing == name) {
                let node = self.arena.declare(&name);
                if let Some(schema) = self.definitions.get(&name).copied() {
                    self.populate(node, schema, 0)?;
                }
                continue;
            }
            let node = self.arena.declare(&name);
            if let Some(schema) = self.definitions.get(&name).copied() {
                self.populate(node, schema, 0)?;
            }
            entities.push((name, node));
        }

        let mut fields = Vec::new();
        for (name, node) in entities {
            fields.extend(self.arena.flatten(node, Some(&name), self.ctx)?);
        }
        Ok(fields)
    }

    fn populate(&mut self, node: NodeId, schema: &'v Value, depth: usize) -> ParseResult<()> {
        self.ctx.check()?;
        // allOf composes properties of every branch
        if let Some(parts) = schema.get("allOf").and_then(Value::as_array) {
            for part in parts {
                let resolved = self.resolve(part);
                if depth < self.ctx.max_nesting_depth {
                    self.populate(node, resolved, depth + 1)?;
                }
            }
        }
        let required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
            return Ok(());
        };
        for (name, property) in properties {
            let shape = self.describe(name, property, depth)?;
            let is_required = required.contains(&name.as_str());
            let mut field = FieldInfo::new(name, shape.raw)
                .required(is_required)
                .nullable(shape.nullable || !is_required)
                .with_constraints(shape.constraints);
            if let Some(normalized) = shape.normalized {
                field = field.with_normalized_type(normalized);
            }
            if let Some(description) = property.get("description").and_then(Value::as_str) {
                field = field.with_description(description);
            }
            if property.get("readOnly").and_then(Value::as_bool) == Some(true) {
                field = field.with_metadata("read_only", true);
            }
            let member = match shape.target {
                Some(target) => Member::nested(field, target),
                None => Member::scalar(field),
            };
            self.arena.push_member(node, member);
        }
        Ok(())
    }

    /// Follow a `$ref` to its definition, or return the schema itself
    fn resolve(&self, schema: &'v Value) -> &'v Value {
        schema
            .get("$ref")
            .and_then(Value::as_str)
            .and_then(|r| self.definitions.get(pointer_name(r)).copied())
            .unwrap_or(schema)
    }

    fn describe(&mut self, name: &str, schema: &'v Value, depth: usize) -> ParseResult<Shape> {
        self.ctx.check()?;
        if depth > self.ctx.max_nesting_depth * 2 {
            return Ok(Shape {
                raw: "nested/truncated".to_string(),
                ..Shape::default()
            });
        }

        if let Some(reference) = schema.get("$ref").and_then(Value::as_str) {
            let target = pointer_name(reference);
            return match self.definitions.get(target).copied() {
                Some(def) if is_object_like(def) => Ok(Shape {
                    raw: target.to_string(),
                    normalized: Some(NormalizedType::Object),
                    target: Some(Target::Named(target.to_string())),
                    ..Shape::default()
                }),
                Some(def) => self.describe(name, def, depth + 1),
                None => Ok(Shape {
                    raw: reference.to_string(),
                    ..Shape::default()
                }),
            };
        }

        for combinator in ["oneOf", "anyOf"] {
            if let Some(branches) = schema.get(combinator).and_then(Value::as_array) {
                let nullable = branches
                    .iter()
                    .any(|b| b.get("type").and_then(Value::as_str) == Some("null"));
                let concrete: Vec<&'v Value> = branches
                    .iter()
                    .filter(|b| b.get("type").and_then(Value::as_str) != Some("null"))
                    .collect();
                if let [single] = concrete.as_slice() {
                    let mut shape = self.describe(name, single, depth + 1)?;
                    shape.nullable |= nullable;
                    return Ok(shape);
                }
                return Ok(Shape {
                    raw: "union".to_string(),
                    nullable,
                    ..Shape::default()
                });
            }
        }

        let mut shape = Shape {
            constraints: constraints_of(schema),
            ..Shape::default()
        };
        let (type_name, nullable) = match schema.get("type") {
            Some(Value::String(t)) => (Some(t.as_str()), false),
            Some(Value::Array(types)) => {
                let nullable = types.iter().any(|t| t.as_str() == Some("null"));
                let first = types.iter().filter_map(Value::as_str).find(|t| *t != "null");
                (first, nullable)
            }
            _ => (None, false),
        };
        shape.nullable = nullable || schema.get("nullable").and_then(Value::as_bool) == Some(true);

        let inferred = match type_name {
            Some(t) => t,
            None if schema.get("properties").is_some() || schema.get("allOf").is_some() => "object",
            None if schema.get("items").is_some() => "array",
            None if schema.get("enum").is_some() => "string",
            None => "",
        };

        match inferred {
            "array" => {
                let items = schema.get("items").map(|i| self.describe(name, i, depth + 1)).transpose()?;
                let inner = items.unwrap_or_default();
                let element = if inner.raw.is_empty() { "any".to_string() } else { inner.raw };
                shape.raw = format!("array<{element}>");
                shape.normalized = Some(NormalizedType::Array);
                shape.target = inner.target;
            }
            "object" => {
                let has_properties = schema.get("properties").is_some() || schema.get("allOf").is_some();
                match schema.get("additionalProperties") {
                    Some(values @ Value::Object(_)) if !has_properties => {
                        let inner = self.describe(name, values, depth + 1)?;
                        let element = if inner.raw.is_empty() { "any" } else { inner.raw.as_str() };
                        shape.raw = format!("map<string, {element}>");
                        shape.normalized = Some(NormalizedType::Map);
                    }
                    _ if has_properties => {
                        let node = self.arena.alloc(name);
                        self.populate(node, schema, depth + 1)?;
                        shape.raw = "object".to_string();
                        shape.normalized = Some(NormalizedType::Object);
                        shape.target = Some(Target::Node(node));
                    }
                    _ => shape.raw = "object".to_string(),
                }
            }
            scalar => {
                shape.raw = scalar.to_string();
                if let Some(format) = shape.constraints.format.as_deref() {
                    if normalize_raw_type(format) != NormalizedType::Unknown {
                        shape.raw = format.to_string();
                    }
                }
            }
        }
        Ok(shape)
    }
}

fn constraints_of(schema: &Value) -> FieldConstraints {
    let as_u64 = |key: &str| schema.get(key).and_then(Value::as_u64);
    let as_f64 = |key: &str| schema.get(key).and_then(Value::as_f64);
    FieldConstraints {
        max_length: as_u64("maxLength"),
        min_length: as_u64("minLength"),
        minimum: as_f64("minimum").or_else(|| as_f64("exclusiveMinimum")),
        maximum: as_f64("maximum").or_else(|| as_f64("exclusiveMaximum")),
        enum_values: schema
            .get("enum")
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter(|v| !v.is_null())
                    .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_string))
                    .collect()
            })
            .unwrap_or_default(),
        pattern: schema.get("pattern").and_then(Value::as_str).map(str::to_string),
        format: schema.get("format").and_then(Value::as_str).map(str::to_string),
        unique: false,
        default_value: schema
            .get("default")
            .map(|d| d.as_str().map_or_else(|| d.to_string(), str::to_string)),
        references: None,
    }
}

/// Collect named definitions from the given containers of a document
#[must_use]
pub fn collect_definitions<'v>(document: &'v Value, containers: &[&[&str]]) -> IndexMap<String, &'v Value> {
    let mut definitions = IndexMap::new();
    for path in containers {
        let mut cursor = Some(document);
        for key in *path {
            cursor = cursor.and_then(|v| v.get(*key));
        }
        if let Some(map) = cursor.and_then(Value::as_object) {
            for (name, schema) in map {
                definitions.insert(name.clone(), schema);
            }
        }
    }
    definitions
}

fn looks_like_schema(map: &Map<String, Value>) -> bool {
    map.contains_key("$schema")
        || (map.contains_key("properties") && (map.contains_key("type") || map.contains_key("required")))
        || map.contains_key("definitions")
        || map.contains_key("$defs")
}

/// JSON Schema parser plugin
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSchemaParser;

impl JsonSchemaParser {
    /// Create a new JSON Schema parser
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ParserPlugin for JsonSchemaParser {
    fn name(&self) -> &'static str {
        "json_schema"
    }

    fn format_type(&self) -> FormatType {
        FormatType::JsonSchema
    }

    fn can_parse(&self, filename: &str, content: &[u8]) -> DetectionResult {
        let head = sniff(content, 4096);
        if head.contains("json-schema.org") && head.contains("$schema") {
            return (true, 0.95).into();
        }
        let lowered = filename.to_ascii_lowercase();
        if lowered.ends_with(".schema.json") || lowered.ends_with(".schema.yaml") || lowered.ends_with(".schema.yml") {
            return (true, 0.9).into();
        }
        let structural = head.contains("\"properties\"") && head.contains("\"type\"");
        let named = head.contains("\"definitions\"") || head.contains("\"$defs\"") || head.contains("\"$id\"");
        if head.starts_with('{') && structural && named && has_extension(filename, &["json"]) {
            (true, 0.85).into()
        } else {
            DetectionResult::NO
        }
    }

    fn parse_schema(
        &self,
        filename: &str,
        content: &[u8],
        ctx: &ParseContext,
    ) -> ParseResult<SchemaDetails> {
        let text = decode_text(content)?;
        let document = read_document(text, ctx)?;
        let Some(map) = document.as_object().filter(|m| looks_like_schema(m)) else {
            return Err(ParseError::unsupported("document is not a JSON Schema"));
        };

        let title = map.get("title").and_then(Value::as_str);
        let mut schema = SchemaDetails::new(
            FormatType::JsonSchema,
            title.map_or_else(|| file_stem(filename), str::to_string),
            filename,
        );
        if let Some(draft) = map.get("$schema").and_then(Value::as_str) {
            schema.set_metadata("draft", draft);
        }
        if let Some(id) = map.get("$id").and_then(Value::as_str) {
            schema.set_metadata("id", id);
        }

        let definitions = collect_definitions(&document, &[&["definitions"], &["$defs"]]);
        let extractor = SchemaExtractor::new(definitions, ctx);
        schema.set_metadata("definitions", extractor.entity_names());
        let root = map.contains_key("properties").then(|| (schema.name.clone(), &document));
        schema.fields = extractor.extract(root.as_ref().map(|(n, v)| (n.as_str(), *v)))?;
        mark_conventional_keys(&mut schema.fields);
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CUSTOMER: &str = r##"{
  "$schema": "https://json-schema.org/draft/2020-12/schema",
  "title": "Customer",
  "type": "object",
  "required": ["id", "email"],
  "properties": {
    "id": {"type": "integer"},
    "email": {"type": "string", "format": "email", "maxLength": 120},
    "signup": {"type": "string", "format": "date-time"},
    "tier": {"enum": ["free", "pro"]},
    "address": {"$ref": "#/$defs/Address"},
    "tags": {"type": "array", "items": {"type": "string"}},
    "scores": {"type": "object", "additionalProperties": {"type": "number"}},
    "referrer": {"$ref": "#/$defs/Customer"}
  },
  "$defs": {
    "Address": {
      "type": "object",
      "properties": {"city": {"type": ["string", "null"]}, "zip": {"type": "string", "pattern": "^[0-9]{5}$"}}
    },
    "Customer": {
      "type": "object",
      "properties": {"id": {"type": "integer"}, "referrer": {"$ref": "#/$defs/Customer"}}
    }
  }
}"##;

    fn parse() -> SchemaDetails {
        JsonSchemaParser::new()
            .parse_schema("customer.json", CUSTOMER.as_bytes(), &ParseContext::default())
            .unwrap()
    }

    fn field<'a>(schema: &'a SchemaDetails, entity: &str, name: &str) -> &'a FieldInfo {
        schema
            .fields
            .iter()
            .find(|f| f.entity.as_deref() == Some(entity) && f.name == name)
            .unwrap()
    }

    #[test]
    fn test_root_properties() {
        let schema = parse();
        assert_eq!(schema.name, "Customer");
        let email = field(&schema, "Customer", "email");
        assert!(email.required);
        assert_eq!(email.constraints.format.as_deref(), Some("email"));
        assert_eq!(email.constraints.max_length, Some(120));
        assert_eq!(field(&schema, "Customer", "signup").normalized_type, NormalizedType::Datetime);
        assert_eq!(field(&schema, "Customer", "tier").constraints.enum_values, vec!["free", "pro"]);
        assert_eq!(field(&schema, "Customer", "tags").field_type, "array<string>");
        assert_eq!(field(&schema, "Customer", "scores").normalized_type, NormalizedType::Map);
        assert!(field(&schema, "Customer", "id").is_primary_key);
    }

    #[test]
    fn test_refs_flatten_and_terminate() {
        let schema = parse();
        let city = field(&schema, "Customer", "address.city");
        assert!(city.nullable);
        assert_eq!(city.parent.as_deref(), Some("address"));
        assert_eq!(
            field(&schema, "Address", "zip").constraints.pattern.as_deref(),
            Some("^[0-9]{5}$")
        );
        let recursive = schema
            .fields
            .iter()
            .find(|f| f.field_type == "ref:Customer")
            .unwrap();
        assert_eq!(recursive.metadata.get("recursive"), Some(&true.into()));
    }

    #[test]
    fn test_yaml_schema() {
        let content = b"$schema: http://json-schema.org/draft-07/schema#\ntype: object\nproperties:\n  name:\n    type: string\n";
        let schema = JsonSchemaParser::new()
            .parse_schema("person.schema.yaml", content, &ParseContext::default())
            .unwrap();
        assert_eq!(schema.fields.len(), 1);
        assert_eq!(schema.fields[0].entity.as_deref(), Some("person.schema"));
    }

    #[test]
    fn test_detection() {
        let parser = JsonSchemaParser::new();
        assert_eq!(parser.can_parse("x.json", CUSTOMER.as_bytes()).confidence(), 0.95);
        assert!(!parser.can_parse("x.json", b"{\"a\": 1}").is_match());
    }
}
