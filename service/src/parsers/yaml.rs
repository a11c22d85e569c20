//! YAML parser
//!
//! A mapping is one record, a sequence of mappings is a record list, and a
//! multi-document stream contributes one record per document. Records are
//! merged exactly like JSON.

use super::instance::{InstanceSchemaBuilder, flatten_sample};
use super::{decode_text, file_stem, has_extension, sniff};
use crate::detection::{
    DetectionResult, ParseContext, ParseError, ParseResult, ParserPlugin, SampleRecord,
};
use once_cell::sync::Lazy;
use regex::Regex;
use schemalens_core::{FormatType, SchemaDetails};
use serde::Deserialize;
use serde_json::{Map, Number, Value};

#[allow(clippy::expect_used)]
static TOP_LEVEL_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[A-Za-z_][A-Za-z0-9_\-]*:(\s|$)").expect("valid key regex")
});

/// Convert a YAML value into the JSON value model
///
/// Non-string keys are rendered as YAML scalars; tags are dropped.
#[must_use]
pub fn yaml_to_json(value: serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                Value::Number(u.into())
            } else {
                n.as_f64()
                    .and_then(Number::from_f64)
                    .map_or(Value::Null, Value::Number)
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => {
            Value::Array(items.into_iter().map(yaml_to_json).collect())
        }
        serde_yaml::Value::Mapping(mapping) => {
            let mut map = Map::new();
            for (key, value) in mapping {
                let key = match key {
                    serde_yaml::Value::String(s) => s,
                    other => serde_yaml::to_string(&other)
                        .map(|s| s.trim().to_string())
                        .unwrap_or_default(),
                };
                map.insert(key, yaml_to_json(value));
            }
            Value::Object(map)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

/// Read every document of a YAML stream
///
/// # Errors
///
/// Returns a syntax error with the location reported by the YAML reader
pub fn load_documents(text: &str, ctx: &ParseContext) -> ParseResult<Vec<Value>> {
    let mut documents = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        ctx.check()?;
        let value = serde_yaml::Value::deserialize(document).map_err(|e| {
            let location = e.location();
            ParseError::syntax_at(
                format!("invalid YAML: {e}"),
                location.as_ref().map(serde_yaml::Location::index),
                location.as_ref().map(serde_yaml::Location::line),
            )
        })?;
        if !value.is_null() {
            documents.push(yaml_to_json(value));
        }
    }
    Ok(documents)
}

fn records_of(documents: Vec<Value>) -> (Vec<Value>, &'static str) {
    if documents.len() == 1 {
        match documents.into_iter().next() {
            Some(Value::Array(items)) => (items, "sequence"),
            Some(other) => (vec![other], "mapping"),
            None => (Vec::new(), "empty"),
        }
    } else {
        (documents, "multi_document")
    }
}

/// YAML parser plugin
#[derive(Debug, Default, Clone, Copy)]
pub struct YamlParser;

impl YamlParser {
    /// Create a new YAML parser
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ParserPlugin for YamlParser {
    fn name(&self) -> &'static str {
        "yaml"
    }

    fn format_type(&self) -> FormatType {
        FormatType::Yaml
    }

    fn can_parse(&self, filename: &str, content: &[u8]) -> DetectionResult {
        let head = sniff(content, 1024);
        if head.is_empty() || head.starts_with(['{', '[', '<']) {
            return DetectionResult::NO;
        }
        if has_extension(filename, &["yml", "yaml"]) {
            (true, 0.8).into()
        } else if head.starts_with("---") || TOP_LEVEL_KEY.is_match(head) {
            (true, 0.3).into()
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
        let (records, layout) = records_of(load_documents(text, ctx)?);

        let mut builder = InstanceSchemaBuilder::new(ctx);
        for record in &records {
            builder.observe(record)?;
        }
        let mut schema = SchemaDetails::new(FormatType::Yaml, file_stem(filename), filename);
        schema.set_metadata("layout", layout);
        schema.set_metadata("record_count", builder.record_count());
        schema.fields = builder.finish();
        Ok(schema)
    }

    fn extract_sample_data(&self, content: &[u8], max_records: usize) -> ParseResult<Vec<SampleRecord>> {
        let ctx = ParseContext::default();
        let text = decode_text(content)?;
        let (records, _) = records_of(load_documents(text, &ctx)?);
        Ok(records
            .iter()
            .take(max_records)
            .map(|r| flatten_sample(r, ctx.max_nesting_depth))
            .collect())
    }
}
