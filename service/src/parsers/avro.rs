//! Avro parser: `.avsc` schemas, `.avpr` protocols and object container files
//!
//! Named records are registered in a [`TypeArena`] as they are encountered,
//! so self references (`"next": ["null", "Node"]`) resolve to the node under
//! construction and terminate in the flattener's cycle check.

use super::arena::{Member, NodeId, Target, TypeArena};
use super::{decode_text, file_stem, has_extension, mark_conventional_keys, sniff};
use crate::detection::{DetectionResult, ParseContext, ParseError, ParseResult, ParserPlugin};
use once_cell::sync::Lazy;
use regex::Regex;
use schemalens_core::{FieldConstraints, FieldInfo, FormatType, NormalizedType, SchemaDetails};
use serde_json::Value;
use std::collections::HashMap;

/// Object container file magic
const MAGIC: &[u8] = b"Obj\x01";

const PRIMITIVES: &[&str] = &[
    "null", "boolean", "int", "long", "float", "double", "bytes", "string",
];

#[allow(clippy::expect_used)]
static RECORD_TYPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""type"\s*:\s*"(record|error)""#).expect("valid record regex"));

/// Resolved shape of an Avro type expression
#[derive(Debug, Default)]
struct TypeShape {
    raw: String,
    normalized: Option<NormalizedType>,
    nullable: bool,
    target: Option<Target>,
    constraints: FieldConstraints,
}

impl TypeShape {
    fn raw(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            ..Self::default()
        }
    }
}

struct SchemaReader<'a> {
    arena: TypeArena,
    enums: HashMap<String, Vec<String>>,
    fixed: HashMap<String, u64>,
    ctx: &'a ParseContext,
}

fn short_name(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

impl<'a> SchemaReader<'a> {
    fn new(ctx: &'a ParseContext) -> Self {
        Self {
            arena: TypeArena::new(),
            enums: HashMap::new(),
            fixed: HashMap::new(),
            ctx,
        }
    }

    fn register_record(&mut self, def: &serde_json::Map<String, Value>, namespace: Option<&str>) -> ParseResult<(String, NodeId)> {
        self.ctx.check()?;
        let name = def
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| ParseError::syntax("record without a name"))?;
        let namespace = def.get("namespace").and_then(Value::as_str).or(namespace);
        let node = self.arena.declare(short_name(name));

        let fields = def
            .get("fields")
            .and_then(Value::as_array)
            .ok_or_else(|| ParseError::syntax(format!("record {name} has no fields array")))?;
        for field in fields {
            let field_name = field
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| ParseError::syntax(format!("field without a name in record {name}")))?;
            let type_expr = field
                .get("type")
                .ok_or_else(|| ParseError::syntax(format!("field {field_name} has no type")))?;
            let shape = self.describe(type_expr, namespace)?;

            let mut constraints = shape.constraints;
            if let Some(default) = field.get("default") {
                constraints.default_value = Some(match default {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                });
            }
            let mut info = FieldInfo::new(field_name, shape.raw)
                .nullable(shape.nullable)
                .required(!shape.nullable)
                .with_constraints(constraints);
            if let Some(normalized) = shape.normalized {
                info = info.with_normalized_type(normalized);
            }
            if let Some(doc) = field.get("doc").and_then(Value::as_str) {
                info = info.with_description(doc);
            }
            let member = match shape.target {
                Some(target) => Member::nested(info, target),
                None => Member::scalar(info),
            };
            self.arena.push_member(node, member);
        }
        Ok((short_name(name).to_string(), node))
    }

    fn describe(&mut self, expr: &Value, namespace: Option<&str>) -> ParseResult<TypeShape> {
        self.ctx.check()?;
        match expr {
            Value::String(name) => Ok(self.named(name)),
            Value::Array(branches) => {
                let nullable = branches.iter().any(|b| b.as_str() == Some("null"));
                let concrete: Vec<&Value> = branches.iter().filter(|b| b.as_str() != Some("null")).collect();
                if let [single] = concrete.as_slice() {
                    let mut shape = self.describe(single, namespace)?;
                    shape.nullable = nullable;
                    return Ok(shape);
                }
                let mut names = Vec::new();
                for branch in concrete {
                    names.push(self.describe(branch, namespace)?.raw);
                }
                let mut shape = TypeShape::raw(format!("union<{}>", names.join(", ")));
                shape.nullable = nullable;
                Ok(shape)
            }
            Value::Object(def) => self.describe_complex(def, namespace),
            _ => Err(ParseError::syntax(format!("invalid type expression: {expr}"))),
        }
    }

    fn named(&self, name: &str) -> TypeShape {
        if PRIMITIVES.contains(&name) {
            return TypeShape::raw(name);
        }
        let short = short_name(name);
        if let Some(symbols) = self.enums.get(short) {
            let mut shape = TypeShape::raw(name);
            shape.normalized = Some(NormalizedType::String);
            shape.constraints.enum_values.clone_from(symbols);
            return shape;
        }
        if let Some(size) = self.fixed.get(short) {
            let mut shape = TypeShape::raw(name);
            shape.normalized = Some(NormalizedType::String);
            shape.constraints.max_length = Some(*size);
            return shape;
        }
        let mut shape = TypeShape::raw(name);
        if self.arena.contains(short) {
            shape.normalized = Some(NormalizedType::Object);
            shape.target = Some(Target::Named(short.to_string()));
        }
        shape
    }

    fn describe_complex(&mut self, def: &serde_json::Map<String, Value>, namespace: Option<&str>) -> ParseResult<TypeShape> {
        let kind = def.get("type");
        match kind.and_then(Value::as_str) {
            Some("record" | "error") => {
                let (name, node) = self.register_record(def, namespace)?;
                let mut shape = TypeShape::raw(name);
                shape.normalized = Some(NormalizedType::Object);
                shape.target = Some(Target::Node(node));
                Ok(shape)
            }
            Some("enum") => {
                let name = def.get("name").and_then(Value::as_str).unwrap_or("enum");
                let symbols: Vec<String> = def
                    .get("symbols")
                    .and_then(Value::as_array)
                    .map(|s| s.iter().filter_map(Value::as_str).map(str::to_string).collect())
                    .unwrap_or_default();
                self.enums.insert(short_name(name).to_string(), symbols);
                Ok(self.named(name))
            }
            Some("fixed") => {
                let name = def.get("name").and_then(Value::as_str).unwrap_or("fixed");
                let size = def.get("size").and_then(Value::as_u64).unwrap_or(0);
                self.fixed.insert(short_name(name).to_string(), size);
                Ok(self.named(name))
            }
            Some("array") => {
                let items = def
                    .get("items")
                    .ok_or_else(|| ParseError::syntax("array type without items"))?;
                let inner = self.describe(items, namespace)?;
                let mut shape = TypeShape::raw(format!("array<{}>", inner.raw));
                shape.normalized = Some(NormalizedType::Array);
                shape.target = inner.target;
                Ok(shape)
            }
            Some("map") => {
                let values = def
                    .get("values")
                    .ok_or_else(|| ParseError::syntax("map type without values"))?;
                let inner = self.describe(values, namespace)?;
                let mut shape = TypeShape::raw(format!("map<string, {}>", inner.raw));
                shape.normalized = Some(NormalizedType::Map);
                Ok(shape)
            }
            Some(primitive) => {
                let mut shape = TypeShape::raw(primitive);
                if let Some(logical) = def.get("logicalType").and_then(Value::as_str) {
                    shape.constraints.format = Some(logical.to_string());
                    let normalized = schemalens_core::normalize::normalize_raw_type(logical);
                    if normalized != NormalizedType::Unknown {
                        shape.raw = logical.to_string();
                    }
                }
                if !PRIMITIVES.contains(&primitive) {
                    return Ok(self.named(primitive));
                }
                Ok(shape)
            }
            None => match kind {
                Some(nested) => self.describe(nested, namespace),
                None => Err(ParseError::syntax("type definition without a type")),
            },
        }
    }
}

/// Zigzag varint reader over the container header
struct HeaderReader<'b> {
    bytes: &'b [u8],
    pos: usize,
}

impl HeaderReader<'_> {
    fn error(&self, message: &str) -> ParseError {
        ParseError::syntax_at(format!("invalid container header: {message}"), Some(self.pos), None)
    }

    fn read_long(&mut self) -> ParseResult<i64> {
        let mut value: u64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = *self
                .bytes
                .get(self.pos)
                .ok_or_else(|| self.error("truncated varint"))?;
            self.pos += 1;
            value |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
            if shift > 63 {
                return Err(self.error("varint too long"));
            }
        }
        #[allow(clippy::cast_possible_wrap)]
        let decoded = (value >> 1) as i64 ^ -((value & 1) as i64);
        Ok(decoded)
    }

    fn read_bytes(&mut self) -> ParseResult<&[u8]> {
        let len = usize::try_from(self.read_long()?).map_err(|_| self.error("negative length"))?;
        let end = self.pos.checked_add(len).filter(|end| *end <= self.bytes.len());
        let end = end.ok_or_else(|| self.error("length beyond end of file"))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Header metadata map: key to raw bytes
    fn read_metadata(&mut self) -> ParseResult<HashMap<String, Vec<u8>>> {
        let mut metadata = HashMap::new();
        loop {
            let mut count = self.read_long()?;
            if count == 0 {
                break;
            }
            if count < 0 {
                count = -count;
                self.read_long()?;
            }
            for _ in 0..count {
                let key = String::from_utf8_lossy(self.read_bytes()?).to_string();
                let value = self.read_bytes()?.to_vec();
                metadata.insert(key, value);
            }
        }
        Ok(metadata)
    }
}

/// Avro parser plugin
#[derive(Debug, Default, Clone, Copy)]
pub struct AvroParser;

impl AvroParser {
    /// Create a new Avro parser
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn read_definitions(text: &str) -> ParseResult<Value> {
        serde_json::from_str(text).map_err(|e| {
            ParseError::syntax_at(
                format!("invalid Avro schema JSON: {e}"),
                Some(super::offset_of(text, e.line(), e.column())),
                Some(e.line()),
            )
        })
    }

    fn extract(
        filename: &str,
        definitions: &Value,
        ctx: &ParseContext,
        schema: &mut SchemaDetails,
    ) -> ParseResult<()> {
        let mut reader = SchemaReader::new(ctx);
        let mut roots: Vec<(String, NodeId)> = Vec::new();
        let top: Vec<&Value> = match definitions {
            Value::Array(items) => items.iter().collect(),
            Value::Object(map) if map.contains_key("protocol") => {
                schema.set_metadata("protocol", map.get("protocol").cloned().unwrap_or(Value::Null));
                map.get("types")
                    .and_then(Value::as_array)
                    .map(|t| t.iter().collect())
                    .unwrap_or_default()
            }
            other => vec![other],
        };
        let namespace = definitions.get("namespace").and_then(Value::as_str);
        for def in top {
            if let Some(map) = def.as_object() {
                if matches!(map.get("type").and_then(Value::as_str), Some("record" | "error")) {
                    roots.push(reader.register_record(map, namespace)?);
                    continue;
                }
            }
            reader.describe(def, namespace)?;
        }
        if roots.is_empty() {
            return Err(ParseError::unsupported(format!(
                "{filename} defines no Avro record"
            )));
        }
        if let (Some(ns), [(name, _)]) = (namespace, roots.as_slice()) {
            schema.set_metadata("namespace", ns);
            schema.name.clone_from(name);
        }
        schema.set_metadata(
            "records",
            roots.iter().map(|(n, _)| n.clone()).collect::<Vec<_>>(),
        );
        for (name, node) in roots {
            let fields = reader.arena.flatten(node, Some(&name), ctx)?;
            schema.fields.extend(fields);
        }
        mark_conventional_keys(&mut schema.fields);
        Ok(())
    }
}

impl ParserPlugin for AvroParser {
    fn name(&self) -> &'static str {
        "avro"
    }

    fn format_type(&self) -> FormatType {
        FormatType::Avro
    }

    fn can_parse(&self, filename: &str, content: &[u8]) -> DetectionResult {
        if content.starts_with(MAGIC) {
            return true.into();
        }
        let head = sniff(content, 4096);
        if !head.starts_with('{') && !head.starts_with('[') {
            return DetectionResult::NO;
        }
        if has_extension(filename, &["avsc", "avpr"]) {
            (true, 0.95).into()
        } else if RECORD_TYPE.is_match(head) && head.contains("\"fields\"") {
            (true, 0.9).into()
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
        let mut schema = SchemaDetails::new(FormatType::Avro, file_stem(filename), filename);
        let definitions = if content.starts_with(MAGIC) {
            let mut header = HeaderReader {
                bytes: content,
                pos: MAGIC.len(),
            };
            let metadata = header.read_metadata()?;
            let raw = metadata
                .get("avro.schema")
                .ok_or_else(|| ParseError::syntax("container header carries no avro.schema"))?;
            let text = std::str::from_utf8(raw)
                .map_err(|_| ParseError::syntax("avro.schema is not valid UTF-8"))?;
            schema.set_metadata("container", true);
            if let Some(codec) = metadata.get("avro.codec") {
                schema.set_metadata("codec", String::from_utf8_lossy(codec).to_string());
            }
            Self::read_definitions(text).map_err(|mut e| {
                // offsets inside the embedded schema do not map onto the file
                e.offset = None;
                e.line = None;
                e
            })?
        } else {
            Self::read_definitions(decode_text(content)?)?
        };
        Self::extract(filename, &definitions, ctx, &mut schema)?;
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER: &str = r#"{
  "type": "record", "name": "User", "namespace": "com.acme",
  "fields": [
    {"name": "id", "type": "long"},
    {"name": "email", "type": ["null", "string"], "default": null},
    {"name": "created", "type": {"type": "long", "logicalType": "timestamp-millis"}},
    {"name": "status", "type": {"type": "enum", "name": "Status", "symbols": ["ACTIVE", "BANNED"]}},
    {"name": "address", "type": {"type": "record", "name": "Address", "fields": [
        {"name": "city", "type": "string"}
    ]}},
    {"name": "tags", "type": {"type": "array", "items": "string"}},
    {"name": "attrs", "type": {"type": "map", "values": "int"}},
    {"name": "manager", "type": ["null", "User"]}
  ]
}"#;

    fn parse(content: &[u8]) -> SchemaDetails {
        AvroParser::new()
            .parse_schema("user.avsc", content, &ParseContext::default())
            .unwrap()
    }

    #[test]
    fn test_record_fields() {
        let schema = parse(USER.as_bytes());
        assert_eq!(schema.name, "User");
        assert_eq!(schema.metadata.get("namespace"), Some(&"com.acme".into()));
        assert!(schema.field("id").unwrap().is_primary_key);
        let email = schema.field("email").unwrap();
        assert!(email.nullable);
        assert_eq!(email.normalized_type, NormalizedType::String);
        assert_eq!(email.entity.as_deref(), Some("User"));
        assert_eq!(
            schema.field("created").unwrap().normalized_type,
            NormalizedType::Datetime
        );
        let status = schema.field("status").unwrap();
        assert_eq!(status.constraints.enum_values, vec!["ACTIVE", "BANNED"]);
        assert_eq!(schema.field("address.city").unwrap().parent.as_deref(), Some("address"));
        assert_eq!(schema.field("tags").unwrap().field_type, "array<string>");
        assert_eq!(schema.field("attrs").unwrap().normalized_type, NormalizedType::Map);
    }

    #[test]
    fn test_self_reference_is_marked() {
        let schema = parse(USER.as_bytes());
        let manager = schema.field("manager").unwrap();
        assert_eq!(manager.field_type, "ref:User");
        assert_eq!(manager.metadata.get("recursive"), Some(&true.into()));
    }

    #[test]
    fn test_object_container_header() {
        let schema_json = r#"{"type":"record","name":"Event","fields":[{"name":"ts","type":"long"}]}"#;
        let mut bytes = MAGIC.to_vec();
        bytes.push(2); // one entry, zigzag encoded
        let key = b"avro.schema";
        bytes.push(u8::try_from(key.len() * 2).unwrap());
        bytes.extend_from_slice(key);
        let len = schema_json.len() * 2;
        bytes.push(u8::try_from(len & 0x7F | 0x80).unwrap());
        bytes.push(u8::try_from(len >> 7).unwrap());
        bytes.extend_from_slice(schema_json.as_bytes());
        bytes.push(0);
        bytes.extend_from_slice(&[0u8; 16]);

        assert_eq!(AvroParser::new().can_parse("events.bin", &bytes).confidence(), 1.0);
        let schema = AvroParser::new()
            .parse_schema("events.avro", &bytes, &ParseContext::default())
            .unwrap();
        assert_eq!(schema.metadata.get("container"), Some(&true.into()));
        assert_eq!(schema.field("ts").unwrap().normalized_type, NormalizedType::Integer);
    }

    #[test]
    fn test_detection() {
        let parser = AvroParser::new();
        assert_eq!(parser.can_parse("a.avsc", b"{}").confidence(), 0.95);
        assert_eq!(parser.can_parse("a.json", USER.as_bytes()).confidence(), 0.9);
        assert!(!parser.can_parse("a.json", b"{\"a\": 1}").is_match());
    }
}
