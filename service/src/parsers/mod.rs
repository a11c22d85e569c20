//! Parser plugins, one per supported format
//!
//! Every plugin keeps raw types verbatim and derives normalized types through
//! the shared normalizer in `schemalens_core::normalize`.

pub mod arena;
pub mod avro;
pub mod csv;
pub mod graphql;
pub mod instance;
pub mod json;
pub mod json_schema;
pub mod openapi;
pub mod orc;
pub mod parquet;
pub mod protobuf;
pub mod sql;
pub mod values;
pub mod xml;
pub mod yaml;

pub use self::avro::AvroParser;
pub use self::csv::CsvParser;
pub use self::graphql::GraphqlParser;
pub use self::json::JsonParser;
pub use self::json_schema::JsonSchemaParser;
pub use self::openapi::OpenApiParser;
pub use self::orc::OrcParser;
pub use self::parquet::ParquetParser;
pub use self::protobuf::ProtobufParser;
pub use self::sql::SqlParser;
pub use self::xml::XmlParser;
pub use self::yaml::YamlParser;

use crate::detection::{ParseError, ParseResult};
use schemalens_core::FieldInfo;
use std::path::Path;

/// Decode content as UTF-8 text, skipping a byte order mark
///
/// # Errors
///
/// Returns a syntax error at the first invalid byte
pub fn decode_text(content: &[u8]) -> ParseResult<&str> {
    let body = content.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(content);
    std::str::from_utf8(body).map_err(|e| {
        let offset = e.valid_up_to() + (content.len() - body.len());
        ParseError::syntax_at("content is not valid UTF-8", Some(offset), None).located_in(content)
    })
}

/// Lowercased file extension
#[must_use]
pub fn extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// Whether the filename has one of the given extensions
#[must_use]
pub fn has_extension(filename: &str, candidates: &[&str]) -> bool {
    extension(filename).is_some_and(|ext| candidates.contains(&ext.as_str()))
}

/// File name without directories and extension
#[must_use]
pub fn file_stem(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename)
        .to_string()
}

/// Leading text of the content for sniffing, without BOM and whitespace
#[must_use]
pub fn sniff(content: &[u8], limit: usize) -> &str {
    let body = content.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(content);
    let head = &body[..body.len().min(limit)];
    let valid = match std::str::from_utf8(head) {
        Ok(s) => s,
        // cut inside a multi-byte character
        Err(e) => std::str::from_utf8(&head[..e.valid_up_to()]).unwrap_or_default(),
    };
    valid.trim_start()
}

/// Byte offset of a one-based line/column position
#[must_use]
pub fn offset_of(text: &str, line: usize, column: usize) -> usize {
    let line_start: usize = text
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum();
    (line_start + column.saturating_sub(1)).min(text.len())
}

/// Mark a top-level `id` field of each entity as its key, for declarative
/// formats without key syntax
pub fn mark_conventional_keys(fields: &mut [FieldInfo]) {
    let mut keyed: Vec<Option<String>> = Vec::new();
    for field in fields.iter_mut() {
        if field.parent.is_some() || !field.name.eq_ignore_ascii_case("id") {
            continue;
        }
        if keyed.contains(&field.entity) || field.normalized_type.is_complex() {
            continue;
        }
        keyed.push(field.entity.clone());
        field.is_primary_key = true;
        field.constraints.unique = true;
        field
            .metadata
            .insert("key_source".to_string(), "convention".into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_text_reports_offset() {
        let bytes = b"ok\n\xFF";
        let err = decode_text(bytes).unwrap_err();
        assert_eq!(err.offset, Some(3));
        assert_eq!(err.line, Some(2));
        assert_eq!(decode_text(b"\xEF\xBB\xBFhi").unwrap(), "hi");
    }

    #[test]
    fn test_file_helpers() {
        assert_eq!(extension("a/B.JSON").as_deref(), Some("json"));
        assert!(has_extension("x.avsc", &["avsc", "avro"]));
        assert_eq!(file_stem("data/users.csv"), "users");
        assert_eq!(sniff(b"  \n{\"a\":1}", 4), "{");
        assert_eq!(offset_of("ab\ncd", 2, 2), 4);
    }

    #[test]
    fn test_conventional_keys_once_per_entity() {
        let mut fields = vec![
            FieldInfo::new("id", "long").with_entity("User"),
            FieldInfo::new("owner.id", "long").with_entity("User").with_parent("owner"),
            FieldInfo::new("id", "string").with_entity("Team"),
        ];
        mark_conventional_keys(&mut fields);
        assert!(fields[0].is_primary_key);
        assert!(!fields[1].is_primary_key);
        assert!(fields[2].is_unique());
    }
}
