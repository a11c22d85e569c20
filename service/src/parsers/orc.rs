//! Apache ORC parser
//!
//! Decodes the file tail directly: the last byte gives the postscript length,
//! the postscript gives the footer length and compression, and the footer
//! holds the pre-order type tree. Only uncompressed tails are read.

use super::{file_stem, has_extension};
use crate::detection::{DetectionResult, ParseContext, ParseError, ParseResult, ParserPlugin};
use schemalens_core::{FieldInfo, FormatType, NormalizedType, SchemaDetails};

const MAGIC: &[u8] = b"ORC";

const COMPRESSION_KINDS: &[&str] = &["none", "zlib", "snappy", "lzo", "lz4", "zstd"];

/// Protobuf wire-format reader over a borrowed buffer
struct Wire<'a> {
    buf: &'a [u8],
    pos: usize,
    base: usize,
}

enum WireValue<'a> {
    Varint(u64),
    Bytes(&'a [u8]),
    Fixed,
}

impl<'a> Wire<'a> {
    fn new(buf: &'a [u8], base: usize) -> Self {
        Self { buf, pos: 0, base }
    }

    fn error(&self, message: &str) -> ParseError {
        ParseError::syntax_at(format!("corrupt ORC tail: {message}"), Some(self.base + self.pos), None)
    }

    fn varint(&mut self) -> ParseResult<u64> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let Some(byte) = self.buf.get(self.pos).copied() else {
                return Err(self.error("truncated varint"));
            };
            self.pos += 1;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(self.error("varint too long"))
    }

    fn take(&mut self, len: usize) -> ParseResult<&'a [u8]> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.buf.len());
        let Some(end) = end else {
            return Err(self.error("field runs past the buffer"));
        };
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Next `(field number, value)` pair, or `None` at the end
    fn next_field(&mut self) -> ParseResult<Option<(u64, WireValue<'a>, usize)>> {
        if self.pos >= self.buf.len() {
            return Ok(None);
        }
        let key = self.varint()?;
        let start = self.base + self.pos;
        let value = match key & 0x7 {
            0 => WireValue::Varint(self.varint()?),
            1 => {
                self.take(8)?;
                WireValue::Fixed
            }
            2 => {
                let len = usize::try_from(self.varint()?).map_err(|_| self.error("length overflow"))?;
                WireValue::Bytes(self.take(len)?)
            }
            5 => {
                self.take(4)?;
                WireValue::Fixed
            }
            other => return Err(self.error(&format!("unsupported wire type {other}"))),
        };
        Ok(Some((key >> 3, value, start)))
    }
}

fn packed_u32s(bytes: &[u8], base: usize) -> ParseResult<Vec<u32>> {
    let mut wire = Wire::new(bytes, base);
    let mut out = Vec::new();
    while wire.pos < bytes.len() {
        let value = wire.varint()?;
        out.push(u32::try_from(value).map_err(|_| wire.error("type id overflow"))?);
    }
    Ok(out)
}

#[derive(Debug, Default)]
struct Postscript {
    footer_length: u64,
    compression: u64,
    writer_version: Option<u64>,
    version: Vec<u32>,
}

#[derive(Debug, Default, Clone)]
struct OrcType {
    kind: u64,
    subtypes: Vec<u32>,
    field_names: Vec<String>,
    maximum_length: Option<u64>,
    precision: Option<u64>,
    scale: Option<u64>,
}

#[derive(Debug, Default)]
struct Footer {
    types: Vec<OrcType>,
    number_of_rows: u64,
    stripes: usize,
    user_metadata: Vec<String>,
}

fn read_postscript(bytes: &[u8], base: usize) -> ParseResult<Postscript> {
    let mut wire = Wire::new(bytes, base);
    let mut ps = Postscript::default();
    let mut magic_seen = false;
    while let Some((field, value, start)) = wire.next_field()? {
        match (field, value) {
            (1, WireValue::Varint(v)) => ps.footer_length = v,
            (2, WireValue::Varint(v)) => ps.compression = v,
            (4, WireValue::Bytes(b)) => ps.version.extend(packed_u32s(b, start)?),
            (4, WireValue::Varint(v)) => ps.version.push(u32::try_from(v).unwrap_or(u32::MAX)),
            (6, WireValue::Varint(v)) => ps.writer_version = Some(v),
            (8000, WireValue::Bytes(b)) => magic_seen = b == MAGIC,
            _ => {}
        }
    }
    if !magic_seen {
        return Err(ParseError::syntax_at("postscript lacks the ORC magic", Some(base), None));
    }
    Ok(ps)
}

fn read_type(bytes: &[u8], base: usize) -> ParseResult<OrcType> {
    let mut wire = Wire::new(bytes, base);
    let mut ty = OrcType::default();
    while let Some((field, value, start)) = wire.next_field()? {
        match (field, value) {
            (1, WireValue::Varint(v)) => ty.kind = v,
            (2, WireValue::Bytes(b)) => ty.subtypes.extend(packed_u32s(b, start)?),
            (2, WireValue::Varint(v)) => ty.subtypes.push(u32::try_from(v).unwrap_or(u32::MAX)),
            (3, WireValue::Bytes(b)) => ty.field_names.push(String::from_utf8_lossy(b).into_owned()),
            (4, WireValue::Varint(v)) => ty.maximum_length = Some(v),
            (5, WireValue::Varint(v)) => ty.precision = Some(v),
            (6, WireValue::Varint(v)) => ty.scale = Some(v),
            _ => {}
        }
    }
    Ok(ty)
}

fn read_footer(bytes: &[u8], base: usize, ctx: &ParseContext) -> ParseResult<Footer> {
    let mut wire = Wire::new(bytes, base);
    let mut footer = Footer::default();
    while let Some((field, value, start)) = wire.next_field()? {
        ctx.check()?;
        match (field, value) {
            (3, WireValue::Bytes(_)) => footer.stripes += 1,
            (4, WireValue::Bytes(b)) => footer.types.push(read_type(b, start)?),
            (5, WireValue::Bytes(b)) => {
                let mut item = Wire::new(b, start);
                while let Some((f, v, _)) = item.next_field()? {
                    if let (1, WireValue::Bytes(name)) = (f, v) {
                        footer.user_metadata.push(String::from_utf8_lossy(name).into_owned());
                    }
                }
            }
            (6, WireValue::Varint(v)) => footer.number_of_rows = v,
            _ => {}
        }
    }
    Ok(footer)
}

/// Nodes rendered into one type name before the rest is elided
const MAX_RENDERED_NODES: usize = 256;

/// Hive-style type names, rendering children inline
///
/// Shared subtrees are rendered once per reference, so the name is bounded
/// by depth and by a node budget rather than by the size of the type table.
struct TypeNamer<'a> {
    types: &'a [OrcType],
    ctx: &'a ParseContext,
    remaining: usize,
}

impl<'a> TypeNamer<'a> {
    fn new(types: &'a [OrcType], ctx: &'a ParseContext) -> Self {
        Self {
            types,
            ctx,
            remaining: MAX_RENDERED_NODES,
        }
    }

    fn child(&mut self, ty: &OrcType, id: usize, index: usize, depth: usize) -> ParseResult<String> {
        match ty
            .subtypes
            .get(index)
            .and_then(|s| usize::try_from(*s).ok())
            .filter(|s| *s > id)
        {
            Some(sub) => self.name(sub, depth + 1),
            None => Ok("unknown".to_string()),
        }
    }

    fn name(&mut self, id: usize, depth: usize) -> ParseResult<String> {
        self.ctx.check()?;
        let types = self.types;
        let Some(ty) = types.get(id) else {
            return Ok("unknown".to_string());
        };
        if depth >= self.ctx.max_nesting_depth || self.remaining == 0 {
            return Ok("nested/truncated".to_string());
        }
        self.remaining -= 1;
        let name = match ty.kind {
            0 => "boolean".to_string(),
            1 => "tinyint".to_string(),
            2 => "smallint".to_string(),
            3 => "int".to_string(),
            4 => "bigint".to_string(),
            5 => "float".to_string(),
            6 => "double".to_string(),
            7 => "string".to_string(),
            8 => "binary".to_string(),
            9 => "timestamp".to_string(),
            10 => format!("array<{}>", self.child(ty, id, 0, depth)?),
            11 => {
                let key = self.child(ty, id, 0, depth)?;
                let value = self.child(ty, id, 1, depth)?;
                format!("map<{key}, {value}>")
            }
            12 => "struct".to_string(),
            13 => "uniontype".to_string(),
            14 => format!("decimal({},{})", ty.precision.unwrap_or(38), ty.scale.unwrap_or(10)),
            15 => "date".to_string(),
            16 => format!("varchar({})", ty.maximum_length.unwrap_or(65_535)),
            17 => format!("char({})", ty.maximum_length.unwrap_or(255)),
            18 => "timestamp with local time zone".to_string(),
            other => format!("kind({other})"),
        };
        Ok(name)
    }
}

fn flatten(
    types: &[OrcType],
    id: usize,
    parent: Option<&str>,
    depth: usize,
    ctx: &ParseContext,
    out: &mut Vec<FieldInfo>,
) -> ParseResult<()> {
    ctx.check()?;
    let Some(node) = types.get(id) else {
        return Err(ParseError::syntax(format!("type id {id} is missing from the footer")));
    };
    for (position, sub) in node.subtypes.iter().enumerate() {
        let child = usize::try_from(*sub).unwrap_or(usize::MAX);
        if child <= id || child >= types.len() {
            return Err(ParseError::syntax(format!(
                "type tree is not in pre-order: {id} refers to {child}"
            )));
        }
        let local = node
            .field_names
            .get(position)
            .cloned()
            .unwrap_or_else(|| format!("_col{position}"));
        let name = match parent {
            Some(p) => format!("{p}.{local}"),
            None => local,
        };
        let raw = TypeNamer::new(types, ctx).name(child, 0)?;
        let mut field = FieldInfo::new(&name, raw.as_str()).with_metadata("column_id", child);
        if let Some(p) = parent {
            field = field.with_parent(p);
        }
        if let (16 | 17, Some(max)) = (types[child].kind, types[child].maximum_length) {
            field.constraints.max_length = Some(max);
        }
        let is_struct = types[child].kind == 12;
        if is_struct && depth + 1 >= ctx.max_nesting_depth {
            field = FieldInfo::new(&name, "nested/truncated").with_metadata("truncated", true);
            if let Some(p) = parent {
                field = field.with_parent(p);
            }
            out.push(field);
            continue;
        }
        out.push(field);
        if is_struct {
            flatten(types, child, Some(&name), depth + 1, ctx, out)?;
        }
    }
    Ok(())
}

/// `ORC` parser plugin
#[derive(Debug, Default, Clone, Copy)]
pub struct OrcParser;

impl OrcParser {
    /// Create a new `ORC` parser
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ParserPlugin for OrcParser {
    fn name(&self) -> &'static str {
        "orc"
    }

    fn format_type(&self) -> FormatType {
        FormatType::Orc
    }

    fn can_parse(&self, filename: &str, content: &[u8]) -> DetectionResult {
        if content.starts_with(MAGIC) {
            (true, if has_extension(filename, &["orc"]) { 1.0 } else { 0.9 }).into()
        } else if has_extension(filename, &["orc"]) {
            (true, 0.5).into()
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
        if !content.starts_with(MAGIC) {
            return Err(ParseError::syntax_at("missing ORC header magic", Some(0), None));
        }
        let Some(&ps_len) = content.last() else {
            return Err(ParseError::syntax_at("empty file", Some(0), None));
        };
        let ps_len = usize::from(ps_len);
        let ps_end = content.len() - 1;
        let Some(ps_start) = ps_end.checked_sub(ps_len).filter(|s| *s >= MAGIC.len()) else {
            return Err(ParseError::syntax_at("postscript length exceeds the file", Some(ps_end), None));
        };
        let postscript = read_postscript(&content[ps_start..ps_end], ps_start)?;
        if postscript.compression != 0 {
            let kind = usize::try_from(postscript.compression)
                .ok()
                .and_then(|k| COMPRESSION_KINDS.get(k))
                .copied()
                .unwrap_or("unknown");
            return Err(ParseError::unsupported(format!(
                "compressed ORC tails ({kind}) are not supported"
            )));
        }
        let footer_len = usize::try_from(postscript.footer_length).unwrap_or(usize::MAX);
        let Some(footer_start) = ps_start.checked_sub(footer_len).filter(|s| *s >= MAGIC.len()) else {
            return Err(ParseError::syntax_at("footer length exceeds the file", Some(ps_start), None));
        };
        let footer = read_footer(&content[footer_start..ps_start], footer_start, ctx)?;

        let mut schema = SchemaDetails::new(FormatType::Orc, file_stem(filename), filename);
        schema.set_metadata("num_rows", footer.number_of_rows);
        schema.set_metadata("stripes", footer.stripes);
        schema.set_metadata("compression", "none");
        if !postscript.version.is_empty() {
            let version: Vec<String> = postscript.version.iter().map(u32::to_string).collect();
            schema.set_metadata("file_version", version.join("."));
        }
        if let Some(writer) = postscript.writer_version {
            schema.set_metadata("writer_version", writer);
        }
        if !footer.user_metadata.is_empty() {
            schema.set_metadata("user_metadata_keys", footer.user_metadata.clone());
        }

        match footer.types.first() {
            Some(root) if root.kind == 12 => {
                let mut fields = Vec::new();
                flatten(&footer.types, 0, None, 0, ctx, &mut fields)?;
                schema.fields = fields;
            }
            Some(_) => {
                let raw = TypeNamer::new(&footer.types, ctx).name(0, 0)?;
                schema.push_field(FieldInfo::new("_col0", raw));
            }
            None => return Err(ParseError::syntax("footer declares no types")),
        }
        for field in &mut schema.fields {
            if field.normalized_type == NormalizedType::Unknown && field.field_type.starts_with("kind(") {
                field.metadata.insert("unrecognized_kind".to_string(), true.into());
            }
        }
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn varint(mut v: u64, out: &mut Vec<u8>) {
        while v >= 0x80 {
            out.push((v as u8) | 0x80);
            v >>= 7;
        }
        out.push(v as u8);
    }

    fn uint_field(field: u64, v: u64, out: &mut Vec<u8>) {
        varint(field << 3, out);
        varint(v, out);
    }

    fn bytes_field(field: u64, bytes: &[u8], out: &mut Vec<u8>) {
        varint((field << 3) | 2, out);
        varint(bytes.len() as u64, out);
        out.extend_from_slice(bytes);
    }

    fn orc_type(kind: u64, subtypes: &[u64], names: &[&str]) -> Vec<u8> {
        let mut out = Vec::new();
        uint_field(1, kind, &mut out);
        if !subtypes.is_empty() {
            let mut packed = Vec::new();
            for s in subtypes {
                varint(*s, &mut packed);
            }
            bytes_field(2, &packed, &mut out);
        }
        for name in names {
            bytes_field(3, name.as_bytes(), &mut out);
        }
        out
    }

    fn orc_file(compression: u64) -> Vec<u8> {
        let types = [
            orc_type(12, &[1, 2, 3, 5], &["id", "name", "tags", "address"]),
            orc_type(4, &[], &[]),
            orc_type(7, &[], &[]),
            orc_type(10, &[4], &[]),
            orc_type(7, &[], &[]),
            orc_type(12, &[6], &["city"]),
            orc_type(16, &[], &[]),
        ];
        orc_file_with(&types, compression)
    }

    fn orc_file_with(types: &[Vec<u8>], compression: u64) -> Vec<u8> {
        let mut footer = Vec::new();
        for ty in types {
            bytes_field(4, ty, &mut footer);
        }
        uint_field(6, 42, &mut footer);

        let mut postscript = Vec::new();
        uint_field(1, footer.len() as u64, &mut postscript);
        uint_field(2, compression, &mut postscript);
        bytes_field(8000, MAGIC, &mut postscript);

        let mut file = MAGIC.to_vec();
        file.extend_from_slice(&footer);
        file.extend_from_slice(&postscript);
        file.push(postscript.len() as u8);
        file
    }

    #[test]
    fn test_type_tree() {
        let content = orc_file(0);
        let parser = OrcParser::new();
        assert_eq!(parser.can_parse("events.orc", &content).confidence(), 1.0);
        let schema = parser
            .parse_schema("events.orc", &content, &ParseContext::default())
            .unwrap();
        assert_eq!(schema.metadata.get("num_rows"), Some(&42.into()));
        let names: Vec<&str> = schema.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name", "tags", "address", "address.city"]);
        assert_eq!(schema.field("id").unwrap().normalized_type, NormalizedType::Integer);
        assert_eq!(schema.field("tags").unwrap().field_type, "array<string>");
        assert_eq!(schema.field("address").unwrap().normalized_type, NormalizedType::Object);
        assert_eq!(schema.field("address.city").unwrap().parent.as_deref(), Some("address"));
    }

    #[test]
    fn test_compressed_tail_is_unsupported() {
        let err = OrcParser::new()
            .parse_schema("events.orc", &orc_file(1), &ParseContext::default())
            .unwrap_err();
        assert_eq!(err.kind, crate::detection::ParseErrorKind::Unsupported);
        assert!(err.message.contains("zlib"));
    }

    #[test]
    fn test_truncated_tail() {
        let mut content = orc_file(0);
        let last = content.len() - 1;
        content[last] = 250;
        let err = OrcParser::new()
            .parse_schema("events.orc", &content, &ParseContext::default())
            .unwrap_err();
        assert!(err.offset.is_some());
    }

    #[test]
    fn test_chained_maps_render_within_bounds() {
        // every map uses the next type for both key and value
        let chain = 22;
        let mut types = vec![orc_type(12, &[1], &["m"])];
        for i in 1..=chain {
            types.push(orc_type(11, &[i + 1, i + 1], &[]));
        }
        types.push(orc_type(3, &[], &[]));
        let content = orc_file_with(&types, 0);

        let schema = OrcParser::new()
            .parse_schema("chain.orc", &content, &ParseContext::default())
            .unwrap();
        let field = schema.field("m").unwrap();
        assert!(field.field_type.starts_with("map<map<"));
        assert!(field.field_type.contains("nested/truncated"));
        assert!(field.field_type.len() < 16 * 1024, "{} bytes", field.field_type.len());
    }

    #[test]
    fn test_type_rendering_honours_the_budget() {
        let mut types = vec![orc_type(12, &[1], &["m"])];
        types.push(orc_type(11, &[2, 2], &[]));
        types.push(orc_type(3, &[], &[]));
        let content = orc_file_with(&types, 0);

        let cancel = tokio_util::sync::CancellationToken::new();
        cancel.cancel();
        let ctx = ParseContext::new(crate::budget::ExecutionBudget::cancellable(cancel), 16);
        let err = OrcParser::new().parse_schema("chain.orc", &content, &ctx).unwrap_err();
        assert_eq!(err.kind, crate::detection::ParseErrorKind::Cancelled);
    }
}
