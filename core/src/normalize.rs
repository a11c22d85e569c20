//! Dialect-independent raw type normalization
//!
//! Every parser plugin keeps the raw, format-specific type string verbatim and
//! derives the normalized type through [`normalize_raw_type`]. The mapping does
//! not look at the dialect: `SERIAL` (PostgreSQL), `INT AUTO_INCREMENT`
//! (MySQL) and `INTEGER` (SQLite) all land on `integer`.

use crate::types::NormalizedType;

/// Map a raw format-specific type string onto the normalized vocabulary.
///
/// Unrecognized types map to [`NormalizedType::Unknown`]; this function never
/// fails.
#[must_use]
pub fn normalize_raw_type(raw: &str) -> NormalizedType {
    let lowered = raw.trim().to_ascii_lowercase();
    if lowered.is_empty() {
        return NormalizedType::Unknown;
    }

    // Flattener markers
    if lowered == "nested/truncated" || lowered.starts_with("ref:") {
        return NormalizedType::Object;
    }

    // MySQL convention: TINYINT(1) is a boolean
    if lowered.replace(' ', "") == "tinyint(1)" {
        return NormalizedType::Boolean;
    }

    // GraphQL non-null marker and nullable markers
    let stripped = lowered.trim_end_matches('!').trim_end_matches('?').trim();

    // Collections
    if is_array_notation(stripped) {
        return NormalizedType::Array;
    }
    if stripped.starts_with("map<") || stripped.starts_with("map(") || stripped == "map" {
        return NormalizedType::Map;
    }
    if stripped.starts_with("struct<")
        || stripped.starts_with("record")
        || stripped == "struct"
        || stripped == "object"
        || stripped == "message"
        || stripped == "json"
        || stripped == "jsonb"
        || stripped == "hstore"
    {
        return NormalizedType::Object;
    }
    if stripped.starts_with("union<") || stripped == "union" || stripped == "null" {
        return NormalizedType::Unknown;
    }

    let base = base_type(stripped);

    match base {
        // Integers
        "int" | "integer" | "int2" | "int4" | "int8" | "smallint" | "bigint" | "tinyint"
        | "mediumint" | "serial" | "serial2" | "serial4" | "serial8" | "smallserial"
        | "bigserial" | "long" | "short" | "byte" | "int16" | "int32" | "int64" | "uint8"
        | "uint16" | "uint32" | "uint64" | "sint32" | "sint64" | "fixed32" | "fixed64"
        | "sfixed32" | "sfixed64" | "unsignedint" | "unsignedlong" | "unsignedshort"
        | "positiveinteger" | "nonnegativeinteger" | "negativeinteger"
        | "nonpositiveinteger" | "year" => NormalizedType::Integer,

        // Floats / decimals
        "float" | "double" | "double precision" | "real" | "decimal" | "numeric"
        | "number" | "money" | "smallmoney" | "float4" | "float8" | "float16"
        | "float32" | "float64" | "dec" => NormalizedType::Float,

        // Booleans
        "bool" | "boolean" | "bit" => NormalizedType::Boolean,

        // Dates and timestamps
        "date" => NormalizedType::Date,
        "datetime" | "datetime2" | "smalldatetime" | "datetimeoffset" | "timestamp"
        | "timestamptz" | "timestamp with time zone" | "timestamp without time zone"
        | "date-time" | "timestamp-millis" | "timestamp-micros" | "timestamp-nanos"
        | "local-timestamp-millis" | "local-timestamp-micros" | "int96"
        | "google.protobuf.timestamp" | "instant" => NormalizedType::Datetime,

        // Text-like and opaque scalars
        "string" | "str" | "text" | "tinytext" | "mediumtext" | "longtext" | "varchar"
        | "character varying" | "char" | "character" | "nvarchar" | "nchar" | "ntext"
        | "clob" | "citext" | "uuid" | "uniqueidentifier" | "enum" | "id" | "bytes"
        | "blob" | "bytea" | "binary" | "varbinary" | "byte_array"
        | "fixed_len_byte_array" | "fixed" | "xml" | "anyuri" | "normalizedstring"
        | "token" | "time" | "timetz" | "time-millis" | "time-micros" | "interval"
        | "inet" | "cidr" | "macaddr" | "email" | "uri" | "url" => NormalizedType::String,

        "array" | "list" | "set" => NormalizedType::Array,

        _ => NormalizedType::Unknown,
    }
}

/// Whether the raw type spells a collection of elements
fn is_array_notation(raw: &str) -> bool {
    raw.ends_with("[]")
        || (raw.starts_with('[') && raw.ends_with(']'))
        || raw.starts_with("array<")
        || raw.starts_with("array(")
        || raw.starts_with("list<")
        || raw.starts_with("repeated ")
        || raw.starts_with("set(")
        || raw == "array"
        || raw == "list"
}

/// Strip namespace prefixes, parameters and modifiers from a scalar type.
fn base_type(raw: &str) -> &str {
    // xs:string, xsd:int
    let without_ns = match raw.split_once(':') {
        Some((prefix, rest)) if prefix == "xs" || prefix == "xsd" => rest,
        _ => raw,
    };
    // varchar(255), decimal(10, 2)
    let without_params = without_ns
        .split_once('(')
        .map_or(without_ns, |(head, _)| head)
        .trim();
    // int unsigned, bigint auto_increment
    let trimmed = without_params
        .strip_suffix(" unsigned")
        .or_else(|| without_params.strip_suffix(" auto_increment"))
        .unwrap_or(without_params);
    trimmed.strip_prefix("unsigned ").unwrap_or(trimmed).trim()
}

/// Extract the element type of an array notation, if any.
///
/// `TEXT[]` yields `text`, `[String!]!` yields `String!`, `array<int>` yields
/// `int`, `repeated Foo` yields `Foo`.
#[must_use]
pub fn array_element_type(raw: &str) -> Option<&str> {
    let raw = raw.trim().trim_end_matches('!');
    if let Some(inner) = raw.strip_suffix("[]") {
        return Some(inner.trim());
    }
    if let Some(inner) = raw.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        return Some(inner.trim());
    }
    if let Some(inner) = raw.strip_prefix("repeated ") {
        return Some(inner.trim());
    }
    for prefix in ["array<", "list<", "ARRAY<", "LIST<", "Array<", "List<"] {
        if let Some(inner) = raw.strip_prefix(prefix).and_then(|r| r.strip_suffix('>')) {
            return Some(inner.trim());
        }
    }
    None
}

/// Extract key and value types of a map notation (`map<K, V>`).
#[must_use]
pub fn map_key_value_types(raw: &str) -> Option<(&str, &str)> {
    let raw = raw.trim();
    let inner = ["map<", "MAP<", "Map<"]
        .iter()
        .find_map(|p| raw.strip_prefix(p))?
        .strip_suffix('>')?;
    // split on the first top-level comma
    let mut depth = 0usize;
    for (idx, ch) in inner.char_indices() {
        match ch {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                let (key, value) = inner.split_at(idx);
                return Some((key.trim(), value.get(1..).unwrap_or_default().trim()));
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_types_across_dialects() {
        assert_eq!(normalize_raw_type("SERIAL"), NormalizedType::Integer);
        assert_eq!(normalize_raw_type("INT UNSIGNED"), NormalizedType::Integer);
        assert_eq!(normalize_raw_type("bigint"), NormalizedType::Integer);
        assert_eq!(normalize_raw_type("VARCHAR(255)"), NormalizedType::String);
        assert_eq!(normalize_raw_type("NUMERIC(10, 2)"), NormalizedType::Float);
        assert_eq!(normalize_raw_type("TINYINT(1)"), NormalizedType::Boolean);
        assert_eq!(normalize_raw_type("timestamptz"), NormalizedType::Datetime);
        assert_eq!(normalize_raw_type("DATETIME2"), NormalizedType::Datetime);
        assert_eq!(normalize_raw_type("TEXT[]"), NormalizedType::Array);
        assert_eq!(normalize_raw_type("jsonb"), NormalizedType::Object);
    }

    #[test]
    fn test_schema_language_types() {
        assert_eq!(normalize_raw_type("int64"), NormalizedType::Integer);
        assert_eq!(normalize_raw_type("ID!"), NormalizedType::String);
        assert_eq!(normalize_raw_type("[Order!]!"), NormalizedType::Array);
        assert_eq!(normalize_raw_type("map<string, int32>"), NormalizedType::Map);
        assert_eq!(normalize_raw_type("xs:dateTime"), NormalizedType::Datetime);
        assert_eq!(normalize_raw_type("timestamp-millis"), NormalizedType::Datetime);
        assert_eq!(normalize_raw_type("ref:TreeNode"), NormalizedType::Object);
        assert_eq!(normalize_raw_type("nested/truncated"), NormalizedType::Object);
    }

    #[test]
    fn test_unrecognized_types_degrade_to_unknown() {
        assert_eq!(normalize_raw_type(""), NormalizedType::Unknown);
        assert_eq!(normalize_raw_type("geography"), NormalizedType::Unknown);
        assert_eq!(normalize_raw_type("CustomerAddress"), NormalizedType::Unknown);
        assert_eq!(normalize_raw_type("null"), NormalizedType::Unknown);
    }

    #[test]
    fn test_element_extraction() {
        assert_eq!(array_element_type("TEXT[]"), Some("TEXT"));
        assert_eq!(array_element_type("[String!]!"), Some("String!"));
        assert_eq!(array_element_type("array<int>"), Some("int"));
        assert_eq!(array_element_type("repeated Order"), Some("Order"));
        assert_eq!(array_element_type("string"), None);
        assert_eq!(
            map_key_value_types("map<string, list<int>>"),
            Some(("string", "list<int>"))
        );
    }
}
