//! JSON and JSON Lines parser
//!
//! Accepts a single object, an array of objects, or newline-delimited JSON
//! (`.jsonl`, `.ndjson`). Fields are merged across records in first-seen
//! order.

use super::instance::{InstanceSchemaBuilder, flatten_sample};
use super::{decode_text, file_stem, has_extension, offset_of, sniff};
use crate::detection::{
    DetectionResult, ParseContext, ParseError, ParseResult, ParserPlugin, SampleRecord,
};
use schemalens_core::{FormatType, SchemaDetails};
use serde_json::Value;
use std::io::BufRead;

const LINES_EXTENSIONS: &[&str] = &["jsonl", "ndjson"];

/// `JSON` parser plugin
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonParser;

impl JsonParser {
    /// Create a new `JSON` parser
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn is_lines(filename: &str, text: &str) -> bool {
        if has_extension(filename, LINES_EXTENSIONS) {
            return true;
        }
        // two or more top-level objects on separate lines
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
        match (lines.next(), lines.next()) {
            (Some(first), Some(second)) => {
                first.starts_with('{')
                    && first.ends_with('}')
                    && second.starts_with('{')
                    && serde_json::from_str::<Value>(first).is_ok()
            }
            _ => false,
        }
    }

    fn read_records(filename: &str, text: &str, ctx: &ParseContext) -> ParseResult<(Vec<Value>, &'static str)> {
        if Self::is_lines(filename, text) {
            let mut records = Vec::new();
            let mut offset = 0usize;
            for (idx, line) in text.split_inclusive('\n').enumerate() {
                ctx.check()?;
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    let value = serde_json::from_str::<Value>(trimmed).map_err(|e| {
                        ParseError::syntax_at(
                            format!("invalid JSON on line {}: {e}", idx + 1),
                            Some(offset + e.column().saturating_sub(1)),
                            Some(idx + 1),
                        )
                    })?;
                    records.push(value);
                }
                offset += line.len();
            }
            return Ok((records, "json_lines"));
        }

        let value: Value = serde_json::from_str(text).map_err(|e| {
            ParseError::syntax_at(
                format!("invalid JSON: {e}"),
                Some(offset_of(text, e.line(), e.column())),
                Some(e.line()),
            )
        })?;
        Ok(match value {
            Value::Array(items) => (items, "array"),
            other => (vec![other], "object"),
        })
    }
}

impl ParserPlugin for JsonParser {
    fn name(&self) -> &'static str {
        "json"
    }

    fn format_type(&self) -> FormatType {
        FormatType::Json
    }

    fn can_parse(&self, filename: &str, content: &[u8]) -> DetectionResult {
        let head = sniff(content, 64);
        let starts_structured = head.starts_with('{') || head.starts_with('[');
        if !starts_structured {
            return DetectionResult::NO;
        }
        if has_extension(filename, LINES_EXTENSIONS) {
            (true, 0.95).into()
        } else if has_extension(filename, &["json", "geojson", "jsonld"]) {
            (true, 0.8).into()
        } else {
            (true, 0.6).into()
        }
    }

    fn parse_schema(
        &self,
        filename: &str,
        content: &[u8],
        ctx: &ParseContext,
    ) -> ParseResult<SchemaDetails> {
        let text = decode_text(content)?;
        let (records, layout) = Self::read_records(filename, text, ctx)?;

        let mut builder = InstanceSchemaBuilder::new(ctx);
        for record in &records {
            builder.observe(record)?;
        }

        let mut schema = SchemaDetails::new(FormatType::Json, file_stem(filename), filename);
        schema.set_metadata("layout", layout);
        schema.set_metadata("record_count", builder.record_count());
        schema.fields = builder.finish();
        Ok(schema)
    }

    fn extract_sample_data(&self, content: &[u8], max_records: usize) -> ParseResult<Vec<SampleRecord>> {
        let text = decode_text(content)?;
        let (records, _) = Self::read_records("", text, &ParseContext::default())?;
        Ok(records
            .iter()
            .take(max_records)
            .map(|r| flatten_sample(r, ParseContext::default().max_nesting_depth))
            .collect())
    }

    fn extract_sample_stream(
        &self,
        reader: &mut dyn BufRead,
        max_records: usize,
    ) -> ParseResult<Vec<SampleRecord>> {
        let mut samples = Vec::new();
        let mut line = String::new();
        let mut line_no = 0usize;
        while samples.len() < max_records {
            line.clear();
            let read = reader
                .read_line(&mut line)
                .map_err(|e| ParseError::syntax(format!("failed to read line: {e}")))?;
            if read == 0 {
                break;
            }
            line_no += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(trimmed).map_err(|e| {
                ParseError::syntax_at(format!("invalid JSON: {e}"), None, Some(line_no))
            })?;
            samples.push(flatten_sample(&value, ParseContext::default().max_nesting_depth));
        }
        Ok(samples)
    }

    fn supports_bounded_read(&self, filename: &str) -> bool {
        has_extension(filename, LINES_EXTENSIONS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::ParseErrorKind;
    use schemalens_core::NormalizedType;
    use std::io::Cursor;

    #[test]
    fn test_array_of_objects() {
        let content = br#"[{"id": 1, "name": "Ada", "active": true}, {"id": 2, "name": "Bob", "active": false}]"#;
        let schema = JsonParser::new()
            .parse_schema("data/users.json", content, &ParseContext::default())
            .unwrap();
        assert_eq!(schema.name, "users");
        assert_eq!(schema.format_type, FormatType::Json);
        assert_eq!(schema.fields.len(), 3);
        let id = schema.field("id").unwrap();
        assert!(id.is_primary_key);
        assert_eq!(id.normalized_type, NormalizedType::Integer);
        assert_eq!(schema.field("active").unwrap().normalized_type, NormalizedType::Boolean);
    }

    #[test]
    fn test_json_lines() {
        let content = b"{\"a\": 1}\n{\"a\": 2, \"b\": \"x\"}\n";
        let schema = JsonParser::new()
            .parse_schema("events.jsonl", content, &ParseContext::default())
            .unwrap();
        assert_eq!(schema.metadata.get("layout"), Some(&"json_lines".into()));
        assert!(!schema.field("b").unwrap().required);
    }

    #[test]
    fn test_syntax_error_has_location() {
        let content = b"{\n  \"a\": 1,\n  \"b\": \n}";
        let err = JsonParser::new()
            .parse_schema("bad.json", content, &ParseContext::default())
            .unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Syntax);
        assert_eq!(err.line, Some(4));
        assert!(err.offset.is_some());
    }

    #[test]
    fn test_can_parse_confidence() {
        let parser = JsonParser::new();
        assert_eq!(parser.can_parse("a.json", b"{}").confidence(), 0.8);
        assert_eq!(parser.can_parse("a.txt", b"[1]").confidence(), 0.6);
        assert!(!parser.can_parse("a.json", b"name,age").is_match());
    }

    #[test]
    fn test_stream_sampling_stops_at_limit() {
        let mut reader = Cursor::new(b"{\"a\":1}\n{\"a\":2}\n{\"a\":3}\n".to_vec());
        let samples = JsonParser::new().extract_sample_stream(&mut reader, 2).unwrap();
        assert_eq!(samples.len(), 2);
    }
}
