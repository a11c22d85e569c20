//! OpenAPI 3.x and Swagger 2 parser
//!
//! Component schemas are resolved through the JSON Schema extractor; each
//! named schema becomes an entity.

use super::json_schema::{SchemaExtractor, collect_definitions, read_document};
use super::{decode_text, file_stem, mark_conventional_keys, sniff};
use crate::detection::{DetectionResult, ParseContext, ParseError, ParseResult, ParserPlugin};
use once_cell::sync::Lazy;
use regex::Regex;
use schemalens_core::{FormatType, SchemaDetails};
use serde_json::Value;

#[allow(clippy::expect_used)]
static YAML_VERSION_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^(openapi|swagger):\s*["']?\d"#).expect("valid regex"));

const HTTP_METHODS: &[&str] = &["get", "put", "post", "delete", "options", "head", "patch", "trace"];

/// `OpenAPI` parser plugin
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenApiParser;

impl OpenApiParser {
    /// Create a new `OpenAPI` parser
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn count_operations(paths: Option<&Value>) -> usize {
    paths
        .and_then(Value::as_object)
        .map(|paths| {
            paths
                .values()
                .filter_map(Value::as_object)
                .map(|item| item.keys().filter(|k| HTTP_METHODS.contains(&k.as_str())).count())
                .sum()
        })
        .unwrap_or(0)
}

impl ParserPlugin for OpenApiParser {
    fn name(&self) -> &'static str {
        "openapi"
    }

    fn format_type(&self) -> FormatType {
        FormatType::Openapi
    }

    fn can_parse(&self, _filename: &str, content: &[u8]) -> DetectionResult {
        let head = sniff(content, 4096);
        let json_marker = head.starts_with('{')
            && (head.contains("\"openapi\"") || head.contains("\"swagger\""));
        if json_marker || YAML_VERSION_KEY.is_match(head) {
            (true, 0.95).into()
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
        let version = document
            .get("openapi")
            .or_else(|| document.get("swagger"))
            .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_string))
            .ok_or_else(|| ParseError::unsupported("document has no openapi or swagger version"))?;

        let info = document.get("info");
        let title = info.and_then(|i| i.get("title")).and_then(Value::as_str);
        let mut schema = SchemaDetails::new(
            FormatType::Openapi,
            title.map_or_else(|| file_stem(filename), str::to_string),
            filename,
        );
        schema.set_metadata("openapi_version", version);
        if let Some(title) = title {
            schema.set_metadata("api_title", title);
        }
        if let Some(api_version) = info.and_then(|i| i.get("version")).and_then(Value::as_str) {
            schema.set_metadata("api_version", api_version);
        }
        let paths = document.get("paths");
        schema.set_metadata(
            "path_count",
            paths.and_then(Value::as_object).map_or(0, serde_json::Map::len),
        );
        schema.set_metadata("operation_count", count_operations(paths));

        let definitions = collect_definitions(&document, &[&["components", "schemas"], &["definitions"]]);
        let extractor = SchemaExtractor::new(definitions, ctx);
        schema.set_metadata("schemas", extractor.entity_names());
        schema.fields = extractor.extract(None)?;
        mark_conventional_keys(&mut schema.fields);
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemalens_core::NormalizedType;

    const PETSTORE: &str = r#"openapi: 3.0.3
info:
  title: Petstore
  version: 1.2.0
paths:
  /pets:
    get:
      operationId: listPets
    post:
      operationId: createPet
  /pets/{id}:
    get:
      operationId: getPet
components:
  schemas:
    Pet:
      type: object
      required: [id, name]
      properties:
        id:
          type: integer
          format: int64
        name:
          type: string
        owner_id:
          type: integer
        owner:
          $ref: '#/components/schemas/Owner'
    Owner:
      type: object
      properties:
        id:
          type: integer
        email:
          type: string
          format: email
"#;

    #[test]
    fn test_components() {
        let schema = OpenApiParser::new()
            .parse_schema("petstore.yaml", PETSTORE.as_bytes(), &ParseContext::default())
            .unwrap();
        assert_eq!(schema.name, "Petstore");
        assert_eq!(schema.metadata.get("api_version"), Some(&"1.2.0".into()));
        assert_eq!(schema.metadata.get("path_count"), Some(&2.into()));
        assert_eq!(schema.metadata.get("operation_count"), Some(&3.into()));
        assert_eq!(schema.entity_names(), vec!["Pet", "Owner"]);

        let pet_id = schema
            .fields
            .iter()
            .find(|f| f.entity.as_deref() == Some("Pet") && f.name == "id")
            .unwrap();
        assert!(pet_id.is_primary_key);
        assert!(pet_id.required);
        let owner_email = schema
            .fields
            .iter()
            .find(|f| f.entity.as_deref() == Some("Pet") && f.name == "owner.email")
            .unwrap();
        assert_eq!(owner_email.parent.as_deref(), Some("owner"));
        assert_eq!(
            schema.fields.iter().find(|f| f.name == "owner").unwrap().normalized_type,
            NormalizedType::Object
        );
    }

    #[test]
    fn test_swagger_json() {
        let content = br##"{"swagger": "2.0", "info": {"title": "Legacy", "version": "0.1"},
            "paths": {}, "definitions": {"Item": {"properties": {"sku": {"type": "string"}}}}}"##;
        let parser = OpenApiParser::new();
        assert!(parser.can_parse("api.json", content).is_match());
        let schema = parser
            .parse_schema("api.json", content, &ParseContext::default())
            .unwrap();
        assert_eq!(schema.fields.len(), 1);
        assert_eq!(schema.fields[0].entity.as_deref(), Some("Item"));
    }

    #[test]
    fn test_detection_rejects_plain_yaml() {
        let parser = OpenApiParser::new();
        assert!(!parser.can_parse("config.yaml", b"name: demo\nversion: 1\n").is_match());
        assert!(parser.can_parse("api.yml", b"openapi: \"3.1.0\"\n").is_match());
    }
}
