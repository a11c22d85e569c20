//! CSV / TSV parser
//!
//! The delimiter is sniffed among `,` `;` tab and `|`; the header row gives
//! the field names and sampled rows give the raw types.

use super::values::{ValueKind, infer_with_confidence};
use super::{decode_text, file_stem, has_extension, sniff};
use crate::detection::{
    DetectionResult, ParseContext, ParseError, ParseResult, ParserPlugin, SampleRecord,
};
use csv::{ReaderBuilder, StringRecord};
use schemalens_core::{FieldInfo, FormatType, SchemaDetails};
use serde_json::Value;
use std::collections::HashSet;
use std::io::{BufRead, Read};

const CANDIDATE_DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Rows scanned for type inference
const MAX_SCAN_ROWS: usize = 10_000;

/// Options specific to CSV parsing
#[derive(Debug, Clone)]
pub struct CsvOptions {
    /// Forced delimiter; sniffed when `None`
    pub delimiter: Option<u8>,
    /// Whether to trim whitespace from fields
    pub trim: bool,
    /// Rows scanned for type inference
    pub max_scan_rows: usize,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            trim: true,
            max_scan_rows: MAX_SCAN_ROWS,
        }
    }
}

/// CSV parser plugin
#[derive(Debug, Default, Clone)]
pub struct CsvParser {
    options: CsvOptions,
}

impl CsvParser {
    /// Create a new CSV parser
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom options
    #[must_use]
    pub fn with_options(options: CsvOptions) -> Self {
        Self { options }
    }

    fn delimiter_for(&self, filename: &str, text: &str) -> u8 {
        if let Some(d) = self.options.delimiter {
            return d;
        }
        if has_extension(filename, &["tsv", "tab"]) {
            return b'\t';
        }
        sniff_delimiter(text).map_or(b',', |(d, _)| d)
    }

    fn reader<R: Read>(&self, delimiter: u8, input: R) -> csv::Reader<R> {
        ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .trim(if self.options.trim {
                csv::Trim::All
            } else {
                csv::Trim::None
            })
            .from_reader(input)
    }
}

/// Pick the delimiter whose per-line count is non-zero and most consistent.
///
/// Returns the delimiter and the number of lines that agreed.
fn sniff_delimiter(text: &str) -> Option<(u8, usize)> {
    let lines: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(10)
        .collect();
    if lines.is_empty() {
        return None;
    }
    let mut best: Option<(u8, usize, usize)> = None;
    for delimiter in CANDIDATE_DELIMITERS {
        let counts: Vec<usize> = lines
            .iter()
            .map(|l| count_unquoted(l, delimiter))
            .collect();
        let first = counts[0];
        if first == 0 {
            continue;
        }
        let agreeing = counts.iter().filter(|c| **c == first).count();
        let better = match best {
            None => true,
            Some((_, a, f)) => agreeing > a || (agreeing == a && first > f),
        };
        if better {
            best = Some((delimiter, agreeing, first));
        }
    }
    best.map(|(d, agreeing, _)| (d, agreeing))
}

fn count_unquoted(line: &str, delimiter: u8) -> usize {
    let mut in_quotes = false;
    let mut count = 0;
    for b in line.bytes() {
        if b == b'"' {
            in_quotes = !in_quotes;
        } else if b == delimiter && !in_quotes {
            count += 1;
        }
    }
    count
}

fn header_names(headers: &StringRecord) -> Vec<String> {
    let mut seen = HashSet::new();
    headers
        .iter()
        .enumerate()
        .map(|(idx, h)| {
            let base = if h.trim().is_empty() {
                format!("column_{}", idx + 1)
            } else {
                h.trim().to_string()
            };
            let mut name = base.clone();
            let mut n = 2;
            while !seen.insert(name.clone()) {
                name = format!("{base}_{n}");
                n += 1;
            }
            name
        })
        .collect()
}

fn csv_error(err: &csv::Error, text: &str) -> ParseError {
    let (offset, line) = err
        .position()
        .map_or((None, None), |p| (usize::try_from(p.byte()).ok(), usize::try_from(p.line()).ok()));
    ParseError::syntax_at(format!("invalid CSV: {err}"), offset, line).located_in(text.as_bytes())
}

fn cell_value(cell: &str) -> Value {
    if cell.is_empty() {
        Value::Null
    } else {
        Value::String(cell.to_string())
    }
}

impl ParserPlugin for CsvParser {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn format_type(&self) -> FormatType {
        FormatType::Csv
    }

    fn can_parse(&self, filename: &str, content: &[u8]) -> DetectionResult {
        let head = sniff(content, 4096);
        if head.is_empty() || head.starts_with(['{', '[', '<']) {
            return DetectionResult::NO;
        }
        if has_extension(filename, &["csv", "tsv", "tab"]) {
            return (true, 0.9).into();
        }
        match sniff_delimiter(head) {
            Some((_, agreeing)) if agreeing >= 2 => (true, 0.4).into(),
            _ => DetectionResult::NO,
        }
    }

    fn parse_schema(
        &self,
        filename: &str,
        content: &[u8],
        ctx: &ParseContext,
    ) -> ParseResult<SchemaDetails> {
        let text = decode_text(content)?;
        let delimiter = self.delimiter_for(filename, text);
        let mut reader = self.reader(delimiter, text.as_bytes());
        let headers = reader.headers().map_err(|e| csv_error(&e, text))?.clone();
        if headers.is_empty() {
            return Err(ParseError::syntax_at("missing header row", Some(0), Some(1)));
        }
        let names = header_names(&headers);

        let mut columns: Vec<Vec<String>> = vec![Vec::new(); names.len()];
        let mut rows = 0usize;
        for record in reader.records().take(self.options.max_scan_rows) {
            if rows % 256 == 0 {
                ctx.check()?;
            }
            let record = record.map_err(|e| csv_error(&e, text))?;
            for (idx, column) in columns.iter_mut().enumerate() {
                column.push(record.get(idx).unwrap_or_default().to_string());
            }
            rows += 1;
        }

        let mut schema = SchemaDetails::new(FormatType::Csv, file_stem(filename), filename);
        schema.set_metadata("delimiter", char::from(delimiter).to_string());
        schema.set_metadata("row_count", rows);
        schema.set_metadata("column_count", names.len());

        for (name, values) in names.into_iter().zip(columns) {
            let non_empty: Vec<&str> = values.iter().map(String::as_str).filter(|v| !v.is_empty()).collect();
            let (kind, agreement) = infer_with_confidence(&non_empty);
            let raw = if kind == ValueKind::Null { "string" } else { kind.raw_type() };
            let nullable = non_empty.len() < values.len() || values.is_empty();
            let distinct: HashSet<&str> = non_empty.iter().copied().collect();
            let unique = !non_empty.is_empty() && distinct.len() == non_empty.len();

            let mut field = FieldInfo::new(name, raw)
                .nullable(nullable)
                .required(!nullable)
                .with_metadata("type_agreement", agreement);
            if field.name.eq_ignore_ascii_case("id") && unique && !nullable {
                field = field.primary_key();
            } else if unique && rows > 1 {
                field = field.with_metadata("sample_unique", true);
            }
            schema.push_field(field);
        }

        tracing::debug!(path = filename, rows, columns = schema.fields.len(), "csv scanned");
        Ok(schema)
    }

    fn extract_sample_data(&self, content: &[u8], max_records: usize) -> ParseResult<Vec<SampleRecord>> {
        let text = decode_text(content)?;
        let delimiter = self.delimiter_for("", text);
        self.samples_from(delimiter, text.as_bytes(), max_records)
    }

    fn extract_sample_stream(
        &self,
        reader: &mut dyn BufRead,
        max_records: usize,
    ) -> ParseResult<Vec<SampleRecord>> {
        let delimiter = {
            let buffered = reader
                .fill_buf()
                .map_err(|e| ParseError::syntax(format!("failed to read content: {e}")))?;
            self.options
                .delimiter
                .unwrap_or_else(|| sniff_delimiter(sniff(buffered, 4096)).map_or(b',', |(d, _)| d))
        };
        self.samples_from(delimiter, reader, max_records)
    }

    fn supports_bounded_read(&self, _filename: &str) -> bool {
        true
    }
}

impl CsvParser {
    fn samples_from<R: Read>(&self, delimiter: u8, input: R, max_records: usize) -> ParseResult<Vec<SampleRecord>> {
        let mut reader = self.reader(delimiter, input);
        let names = header_names(
            &reader
                .headers()
                .map_err(|e| ParseError::syntax(format!("invalid CSV header: {e}")))?
                .clone(),
        );
        let mut samples = Vec::new();
        for record in reader.records().take(max_records) {
            let record = record.map_err(|e| ParseError::syntax(format!("invalid CSV: {e}")))?;
            let sample: SampleRecord = names
                .iter()
                .enumerate()
                .map(|(idx, name)| (name.clone(), cell_value(record.get(idx).unwrap_or_default())))
                .collect();
            samples.push(sample);
        }
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use schemalens_core::NormalizedType;

    const ORDERS: &[u8] = b"order_id,user_id,amount,ordered_on,note\n1,10,9.99,2021-01-05,\n2,10,15.00,2021-02-11,gift\n3,11,4.50,2021-03-20,\n";

    #[test]
    fn test_infers_column_types() {
        let schema = CsvParser::new()
            .parse_schema("orders.csv", ORDERS, &ParseContext::default())
            .unwrap();
        let types: Vec<(&str, NormalizedType)> = schema
            .fields
            .iter()
            .map(|f| (f.name.as_str(), f.normalized_type))
            .collect();
        assert_eq!(
            types,
            vec![
                ("order_id", NormalizedType::Integer),
                ("user_id", NormalizedType::Integer),
                ("amount", NormalizedType::Float),
                ("ordered_on", NormalizedType::Date),
                ("note", NormalizedType::String),
            ]
        );
        assert!(schema.field("note").unwrap().nullable);
        assert!(!schema.field("user_id").unwrap().is_unique());
        assert_eq!(schema.metadata.get("row_count"), Some(&3.into()));
    }

    #[test]
    fn test_sniffs_semicolons() {
        let content = b"id;name\n1;a\n2;b\n";
        let schema = CsvParser::new()
            .parse_schema("people.txt", content, &ParseContext::default())
            .unwrap();
        assert_eq!(schema.fields.len(), 2);
        assert!(schema.field("id").unwrap().is_primary_key);
        assert_eq!(schema.metadata.get("delimiter"), Some(&";".into()));
    }

    #[test]
    fn test_detection() {
        let parser = CsvParser::new();
        assert_eq!(parser.can_parse("orders.csv", ORDERS).confidence(), 0.9);
        assert_eq!(parser.can_parse("orders", ORDERS).confidence(), 0.4);
        assert!(!parser.can_parse("x.csv", b"{\"a\": 1}").is_match());
        assert!(!parser.can_parse("notes.txt", b"just some prose").is_match());
    }

    #[test]
    fn test_samples_keep_empty_cells_as_null() {
        let samples = CsvParser::new().extract_sample_data(ORDERS, 2).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].get("note"), Some(&Value::Null));
        assert_eq!(samples[1].get("ordered_on"), Some(&Value::String("2021-02-11".into())));
    }

    #[test]
    fn test_duplicate_headers_are_renamed() {
        let content = b"a,a,\n1,2,3\n";
        let schema = CsvParser::new()
            .parse_schema("dup.csv", content, &ParseContext::default())
            .unwrap();
        let names: Vec<&str> = schema.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a", "a_2", "column_3"]);
    }
}
