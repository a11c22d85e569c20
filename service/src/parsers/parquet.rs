//! Apache Parquet parser
//!
//! Reads the footer through the `parquet` crate. Groups flatten into dotted
//! names; `LIST` and `MAP` annotated groups stay single collection fields.

use super::{file_stem, has_extension};
use crate::detection::{
    DetectionResult, ParseContext, ParseError, ParseResult, ParserPlugin, SampleRecord,
};
use bytes::Bytes;
use parquet::basic::{ConvertedType, LogicalType, Repetition, TimeUnit, Type as PhysicalType};
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::schema::types::Type;
use schemalens_core::{FieldConstraints, FieldInfo, FormatType, NormalizedType, SchemaDetails};

const MAGIC: &[u8] = b"PAR1";

/// `Parquet` parser plugin
#[derive(Debug, Default, Clone, Copy)]
pub struct ParquetParser;

impl ParquetParser {
    /// Create a new `Parquet` parser
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn open(content: &[u8]) -> ParseResult<SerializedFileReader<Bytes>> {
        if content.len() < 12 || !content.starts_with(MAGIC) {
            return Err(ParseError::syntax_at("missing PAR1 header magic", Some(0), None));
        }
        if !content.ends_with(MAGIC) {
            return Err(ParseError::syntax_at(
                "missing PAR1 footer magic",
                Some(content.len().saturating_sub(4)),
                None,
            ));
        }
        SerializedFileReader::new(Bytes::copy_from_slice(content))
            .map_err(|e| ParseError::syntax(format!("unreadable parquet footer: {e}")))
    }
}

fn time_unit(unit: &TimeUnit) -> &'static str {
    match unit {
        TimeUnit::MILLIS(_) => "millis",
        TimeUnit::MICROS(_) => "micros",
        TimeUnit::NANOS(_) => "nanos",
    }
}

/// Raw type for a primitive column, preferring its logical annotation
fn primitive_raw_type(
    physical: PhysicalType,
    logical: Option<&LogicalType>,
    converted: ConvertedType,
    type_length: i32,
) -> String {
    match logical {
        Some(LogicalType::String | LogicalType::Enum) => "string".to_string(),
        Some(LogicalType::Uuid) => "uuid".to_string(),
        Some(LogicalType::Json) => "json".to_string(),
        Some(LogicalType::Date) => "date".to_string(),
        Some(LogicalType::Time { unit, .. }) => format!("time-{}", time_unit(unit)),
        Some(LogicalType::Timestamp { unit, .. }) => format!("timestamp-{}", time_unit(unit)),
        Some(LogicalType::Decimal { scale, precision }) => format!("decimal({precision},{scale})"),
        Some(LogicalType::Integer { bit_width, is_signed }) => {
            format!("{}int{bit_width}", if *is_signed { "" } else { "u" })
        }
        _ => match converted {
            ConvertedType::UTF8 | ConvertedType::ENUM => "string".to_string(),
            ConvertedType::DATE => "date".to_string(),
            ConvertedType::TIMESTAMP_MILLIS => "timestamp-millis".to_string(),
            ConvertedType::TIMESTAMP_MICROS => "timestamp-micros".to_string(),
            ConvertedType::JSON => "json".to_string(),
            _ => match physical {
                PhysicalType::FIXED_LEN_BYTE_ARRAY => format!("fixed_len_byte_array({type_length})"),
                other => other.to_string().to_ascii_lowercase(),
            },
        },
    }
}

struct Flattener<'c> {
    ctx: &'c ParseContext,
    fields: Vec<FieldInfo>,
}

impl Flattener<'_> {
    fn visit(&mut self, ty: &Type, parent: Option<&str>, depth: usize) -> ParseResult<()> {
        self.ctx.check()?;
        let info = ty.get_basic_info();
        let name = match parent {
            Some(p) => format!("{p}.{}", info.name()),
            None => info.name().to_string(),
        };
        let repetition = info.has_repetition().then(|| info.repetition());
        let repeated = repetition == Some(Repetition::REPEATED);
        let optional = repetition == Some(Repetition::OPTIONAL);

        let base = |raw: String| {
            let mut field = FieldInfo::new(&name, raw)
                .nullable(optional)
                .required(!optional)
                .with_metadata("repetition", repetition.map_or("REQUIRED".to_string(), |r| r.to_string()));
            if let Some(p) = parent {
                field = field.with_parent(p);
            }
            field
        };

        match ty {
            Type::PrimitiveType {
                physical_type,
                type_length,
                scale,
                precision,
                ..
            } => {
                let logical = info.logical_type();
                let raw = primitive_raw_type(*physical_type, logical.as_ref(), info.converted_type(), *type_length);
                let mut field = base(if repeated { format!("array<{raw}>") } else { raw })
                    .with_metadata("physical_type", physical_type.to_string());
                if let Some(logical) = &logical {
                    field = field.with_metadata("logical_type", format!("{logical:?}"));
                }
                if *precision > 0 {
                    field = field.with_metadata("precision", *precision).with_metadata("scale", *scale);
                }
                if *physical_type == PhysicalType::FIXED_LEN_BYTE_ARRAY {
                    field = field.with_constraints(FieldConstraints {
                        max_length: u64::try_from(*type_length).ok(),
                        min_length: u64::try_from(*type_length).ok(),
                        ..FieldConstraints::default()
                    });
                }
                self.fields.push(field);
            }
            Type::GroupType { fields, .. } => {
                let logical = info.logical_type();
                let converted = info.converted_type();
                let is_list = matches!(logical, Some(LogicalType::List)) || converted == ConvertedType::LIST;
                let is_map = matches!(logical, Some(LogicalType::Map))
                    || matches!(converted, ConvertedType::MAP | ConvertedType::MAP_KEY_VALUE);
                if is_list {
                    let element = list_element_raw(ty);
                    self.fields.push(base(format!("array<{element}>")).with_normalized_type(NormalizedType::Array));
                } else if is_map {
                    let (key, value) = map_entry_raw(ty);
                    self.fields.push(base(format!("map<{key}, {value}>")).with_normalized_type(NormalizedType::Map));
                } else if depth + 1 >= self.ctx.max_nesting_depth {
                    self.fields
                        .push(base("nested/truncated".to_string()).with_metadata("truncated", true));
                } else {
                    let raw = if repeated { "array<struct>" } else { "struct" };
                    self.fields.push(base(raw.to_string()));
                    for child in fields {
                        self.visit(child, Some(&name), depth + 1)?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn leaf_raw(ty: &Type) -> String {
    match ty {
        Type::PrimitiveType {
            basic_info,
            physical_type,
            type_length,
            ..
        } => primitive_raw_type(
            *physical_type,
            basic_info.logical_type().as_ref(),
            basic_info.converted_type(),
            *type_length,
        ),
        Type::GroupType { .. } => "struct".to_string(),
    }
}

/// Element of the three-level `LIST` layout (or the legacy two-level one)
fn list_element_raw(list: &Type) -> String {
    let Some(repeated) = list.get_fields().first() else {
        return "unknown".to_string();
    };
    match repeated.as_ref() {
        Type::GroupType { fields, .. } if fields.len() == 1 => leaf_raw(&fields[0]),
        other => leaf_raw(other),
    }
}

fn map_entry_raw(map: &Type) -> (String, String) {
    let entry = match map.get_fields().first().map(AsRef::as_ref) {
        Some(Type::GroupType { fields, .. }) => fields.clone(),
        _ => Vec::new(),
    };
    let key = entry.first().map_or_else(|| "unknown".to_string(), |k| leaf_raw(k));
    let value = entry.get(1).map_or_else(|| "unknown".to_string(), |v| leaf_raw(v));
    (key, value)
}

impl ParserPlugin for ParquetParser {
    fn name(&self) -> &'static str {
        "parquet"
    }

    fn format_type(&self) -> FormatType {
        FormatType::Parquet
    }

    fn can_parse(&self, filename: &str, content: &[u8]) -> DetectionResult {
        if content.len() >= 8 && content.starts_with(MAGIC) && content.ends_with(MAGIC) {
            (true, 1.0).into()
        } else if content.starts_with(MAGIC) || has_extension(filename, &["parquet", "pq"]) {
            (true, 0.6).into()
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
        let reader = Self::open(content)?;
        let metadata = reader.metadata();
        let file_metadata = metadata.file_metadata();

        let mut schema = SchemaDetails::new(FormatType::Parquet, file_stem(filename), filename);
        schema.set_metadata("num_rows", file_metadata.num_rows());
        schema.set_metadata("num_row_groups", metadata.num_row_groups());
        schema.set_metadata("format_version", file_metadata.version());
        if let Some(created_by) = file_metadata.created_by() {
            schema.set_metadata("created_by", created_by);
        }

        let mut flattener = Flattener {
            ctx,
            fields: Vec::new(),
        };
        for column in file_metadata.schema().get_fields() {
            flattener.visit(column, None, 0)?;
        }
        schema.fields = flattener.fields;
        Ok(schema)
    }

    fn extract_sample_data(&self, content: &[u8], max_records: usize) -> ParseResult<Vec<SampleRecord>> {
        let reader = Self::open(content)?;
        let rows = reader
            .get_row_iter(None)
            .map_err(|e| ParseError::syntax(format!("cannot read parquet rows: {e}")))?;
        let mut samples = Vec::new();
        for row in rows.take(max_records) {
            let row = row.map_err(|e| ParseError::syntax(format!("cannot decode parquet row: {e}")))?;
            samples.push(
                row.get_column_iter()
                    .map(|(name, value)| (name.clone(), value.to_json_value()))
                    .collect(),
            );
        }
        Ok(samples)
    }
}
