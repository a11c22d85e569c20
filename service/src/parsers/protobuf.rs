//! Protocol Buffers `.proto` parser
//!
//! Definitions are read into a small syntax tree first, so field types may
//! name messages and enums declared later in the file. Messages are then
//! registered in a [`TypeArena`] and each top-level message is flattened as
//! one entity.

use super::arena::{Member, Target, TypeArena};
use super::{decode_text, file_stem, has_extension, mark_conventional_keys, sniff};
use crate::detection::{DetectionResult, ParseContext, ParseError, ParseResult, ParserPlugin};
use schemalens_core::{FieldConstraints, FieldInfo, FormatType, NormalizedType, SchemaDetails};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Str(String),
    Int(String),
    Sym(char),
}

#[derive(Debug, Clone)]
struct Spanned {
    tok: Tok,
    offset: usize,
}

fn tokenize(text: &str) -> ParseResult<Vec<Spanned>> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut pos = 0usize;
    while pos < bytes.len() {
        let c = bytes[pos];
        if c.is_ascii_whitespace() {
            pos += 1;
        } else if text[pos..].starts_with("//") {
            pos = text[pos..].find('\n').map_or(bytes.len(), |n| pos + n);
        } else if text[pos..].starts_with("/*") {
            let end = text[pos + 2..]
                .find("*/")
                .ok_or_else(|| ParseError::syntax_at("unterminated comment", Some(pos), None))?;
            pos += end + 4;
        } else if c == b'"' || c == b'\'' {
            let start = pos;
            pos += 1;
            while pos < bytes.len() && bytes[pos] != c {
                if bytes[pos] == b'\\' {
                    pos += 1;
                }
                pos += 1;
            }
            if pos >= bytes.len() {
                return Err(ParseError::syntax_at("unterminated string", Some(start), None));
            }
            out.push(Spanned {
                tok: Tok::Str(text[start + 1..pos].to_string()),
                offset: start,
            });
            pos += 1;
        } else if c.is_ascii_alphabetic() || c == b'_' || (c == b'.' && bytes.get(pos + 1).is_some_and(u8::is_ascii_alphabetic)) {
            let start = pos;
            while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_' || bytes[pos] == b'.') {
                pos += 1;
            }
            out.push(Spanned {
                tok: Tok::Ident(text[start..pos].to_string()),
                offset: start,
            });
        } else if c.is_ascii_digit() || c == b'-' {
            let start = pos;
            pos += 1;
            while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'.') {
                pos += 1;
            }
            out.push(Spanned {
                tok: Tok::Int(text[start..pos].to_string()),
                offset: start,
            });
        } else {
            let ch = text[pos..].chars().next().unwrap_or(' ');
            out.push(Spanned {
                tok: Tok::Sym(ch),
                offset: pos,
            });
            pos += ch.len_utf8();
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    None,
    Optional,
    Required,
    Repeated,
}

#[derive(Debug)]
struct ProtoField {
    name: String,
    type_name: String,
    label: Label,
    map_types: Option<(String, String)>,
    oneof: Option<String>,
    default: Option<String>,
}

#[derive(Debug, Default)]
struct ProtoMessage {
    name: String,
    fields: Vec<ProtoField>,
    messages: Vec<ProtoMessage>,
    enums: Vec<(String, Vec<String>)>,
}

#[derive(Debug, Default)]
struct ProtoFile {
    syntax: Option<String>,
    package: Option<String>,
    messages: Vec<ProtoMessage>,
    enums: Vec<(String, Vec<String>)>,
    services: Vec<String>,
}

struct Parser<'t> {
    tokens: &'t [Spanned],
    pos: usize,
    end: usize,
    ctx: &'t ParseContext,
}

impl<'t> Parser<'t> {
    fn peek(&self) -> Option<&'t Tok> {
        self.tokens.get(self.pos).map(|s| &s.tok)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |s| s.offset)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::syntax_at(message, Some(self.offset()), None)
    }

    fn next(&mut self) -> Option<&'t Tok> {
        let tok = self.peek();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn at_sym(&self, c: char) -> bool {
        self.peek() == Some(&Tok::Sym(c))
    }

    fn at_ident(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Tok::Ident(w)) if w == word)
    }

    fn expect_sym(&mut self, c: char) -> ParseResult<()> {
        if self.at_sym(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected '{c}'")))
        }
    }

    fn ident(&mut self) -> ParseResult<String> {
        match self.peek() {
            Some(Tok::Ident(w)) => {
                self.pos += 1;
                Ok(w.clone())
            }
            _ => Err(self.error("expected identifier")),
        }
    }

    /// Skip up to and including the next `;` at this level, or a balanced block
    fn skip_statement(&mut self) -> ParseResult<()> {
        let start = self.offset();
        let mut depth = 0usize;
        while let Some(tok) = self.next() {
            match tok {
                Tok::Sym(';') if depth == 0 => return Ok(()),
                Tok::Sym('{') => depth += 1,
                Tok::Sym('}') => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
        Err(ParseError::syntax_at("unterminated statement", Some(start), None))
    }

    fn file(&mut self) -> ParseResult<ProtoFile> {
        let mut file = ProtoFile::default();
        while let Some(tok) = self.peek() {
            self.ctx.check()?;
            match tok {
                Tok::Ident(w) if w == "syntax" || w == "edition" => {
                    self.pos += 1;
                    self.expect_sym('=')?;
                    if let Some(Tok::Str(s)) = self.next() {
                        file.syntax = Some(s.clone());
                    }
                    self.expect_sym(';')?;
                }
                Tok::Ident(w) if w == "package" => {
                    self.pos += 1;
                    file.package = Some(self.ident()?);
                    self.expect_sym(';')?;
                }
                Tok::Ident(w) if w == "message" => {
                    self.pos += 1;
                    file.messages.push(self.message(1)?);
                }
                Tok::Ident(w) if w == "enum" => {
                    self.pos += 1;
                    file.enums.push(self.enumeration()?);
                }
                Tok::Ident(w) if w == "service" => {
                    self.pos += 1;
                    file.services.push(self.ident()?);
                    self.skip_statement()?;
                }
                Tok::Sym(';') => self.pos += 1,
                _ => self.skip_statement()?,
            }
        }
        Ok(file)
    }

    fn message(&mut self, depth: usize) -> ParseResult<ProtoMessage> {
        if depth > self.ctx.max_nesting_depth * 4 {
            return Err(self.error("message nesting too deep"));
        }
        let mut message = ProtoMessage {
            name: self.ident()?,
            ..ProtoMessage::default()
        };
        let open = self.offset();
        self.expect_sym('{')?;
        self.body(&mut message, None, depth, open)?;
        Ok(message)
    }

    fn body(
        &mut self,
        message: &mut ProtoMessage,
        oneof: Option<&str>,
        depth: usize,
        open: usize,
    ) -> ParseResult<()> {
        loop {
            self.ctx.check()?;
            let Some(tok) = self.peek() else {
                return Err(ParseError::syntax_at(
                    format!("unterminated block in message {}", message.name),
                    Some(open),
                    None,
                ));
            };
            match tok {
                Tok::Sym('}') => {
                    self.pos += 1;
                    return Ok(());
                }
                Tok::Sym(';') => self.pos += 1,
                Tok::Ident(w) => match w.as_str() {
                    "message" if oneof.is_none() => {
                        self.pos += 1;
                        let nested = self.message(depth + 1)?;
                        message.messages.push(nested);
                    }
                    "enum" if oneof.is_none() => {
                        self.pos += 1;
                        message.enums.push(self.enumeration()?);
                    }
                    "oneof" if oneof.is_some() => {
                        return Err(self.error("oneof blocks cannot be nested"));
                    }
                    "oneof" => {
                        self.pos += 1;
                        let name = self.ident()?;
                        let inner_open = self.offset();
                        self.expect_sym('{')?;
                        self.body(message, Some(&name), depth, inner_open)?;
                    }
                    "option" | "reserved" | "extensions" | "extend" => self.skip_statement()?,
                    _ => {
                        let field = self.field(oneof)?;
                        message.fields.push(field);
                    }
                },
                _ => return Err(self.error("unexpected token in message body")),
            }
        }
    }

    fn field(&mut self, oneof: Option<&str>) -> ParseResult<ProtoField> {
        let label = match self.peek() {
            Some(Tok::Ident(w)) if w == "optional" => Label::Optional,
            Some(Tok::Ident(w)) if w == "required" => Label::Required,
            Some(Tok::Ident(w)) if w == "repeated" => Label::Repeated,
            _ => Label::None,
        };
        if label != Label::None {
            self.pos += 1;
        }

        let mut map_types = None;
        let type_name = if self.at_ident("map") && self.tokens.get(self.pos + 1).is_some_and(|s| s.tok == Tok::Sym('<')) {
            self.pos += 2;
            let key = self.ident()?;
            self.expect_sym(',')?;
            let value = self.ident()?;
            self.expect_sym('>')?;
            let raw = format!("map<{key}, {value}>");
            map_types = Some((key, value));
            raw
        } else {
            self.ident()?
        };
        let name = self.ident()?;
        self.expect_sym('=')?;
        match self.next() {
            Some(Tok::Int(_)) => {}
            _ => return Err(self.error("expected field number")),
        }

        let mut default = None;
        if self.at_sym('[') {
            self.pos += 1;
            while !self.at_sym(']') {
                match self.next() {
                    Some(Tok::Ident(w)) if w == "default" => {
                        self.expect_sym('=')?;
                        default = self.next().map(|t| match t {
                            Tok::Ident(v) | Tok::Str(v) | Tok::Int(v) => v.clone(),
                            Tok::Sym(c) => c.to_string(),
                        });
                    }
                    Some(_) => {}
                    None => return Err(self.error("unterminated field options")),
                }
            }
            self.pos += 1;
        }
        self.expect_sym(';')?;
        Ok(ProtoField {
            name,
            type_name,
            label,
            map_types,
            oneof: oneof.map(str::to_string),
            default,
        })
    }

    fn enumeration(&mut self) -> ParseResult<(String, Vec<String>)> {
        let name = self.ident()?;
        let open = self.offset();
        self.expect_sym('{')?;
        let mut values = Vec::new();
        loop {
            match self.peek() {
                Some(Tok::Sym('}')) => {
                    self.pos += 1;
                    return Ok((name, values));
                }
                Some(Tok::Ident(w)) if w == "option" || w == "reserved" => self.skip_statement()?,
                Some(Tok::Ident(w)) => {
                    values.push(w.clone());
                    self.skip_statement()?;
                }
                Some(_) => self.skip_statement()?,
                None => {
                    return Err(ParseError::syntax_at(
                        format!("unterminated enum {name}"),
                        Some(open),
                        None,
                    ));
                }
            }
        }
    }
}

/// Builds the arena from the syntax tree
struct Builder {
    arena: TypeArena,
    enums: HashMap<String, Vec<String>>,
}

fn short(name: &str) -> &str {
    name.trim_start_matches('.').rsplit('.').next().unwrap_or(name)
}

impl Builder {
    fn collect(&mut self, message: &ProtoMessage) {
        self.arena.declare(&message.name);
        for (name, values) in &message.enums {
            self.enums.insert(name.clone(), values.clone());
        }
        for nested in &message.messages {
            self.collect(nested);
        }
    }

    fn populate(&mut self, message: &ProtoMessage) {
        let node = self.arena.declare(&message.name);
        for field in &message.fields {
            let member = self.member(field);
            self.arena.push_member(node, member);
        }
        for nested in &message.messages {
            self.populate(nested);
        }
    }

    fn member(&self, field: &ProtoField) -> Member {
        let element = short(&field.type_name);
        let repeated = field.label == Label::Repeated;
        let raw = if repeated {
            format!("repeated {}", field.type_name)
        } else {
            field.type_name.clone()
        };
        let nullable = matches!(field.label, Label::Optional) || field.oneof.is_some();
        let mut constraints = FieldConstraints {
            default_value: field.default.clone(),
            ..FieldConstraints::default()
        };
        let mut info = FieldInfo::new(&field.name, raw)
            .required(field.label == Label::Required)
            .nullable(nullable);
        if let Some(oneof) = &field.oneof {
            info = info.with_metadata("oneof", oneof.clone());
        }
        if field.map_types.is_some() {
            return Member::scalar(info.with_constraints(constraints));
        }

        if let Some(values) = self.enums.get(element) {
            constraints.enum_values.clone_from(values);
            let normalized = if repeated { NormalizedType::Array } else { NormalizedType::String };
            return Member::scalar(info.with_constraints(constraints).with_normalized_type(normalized));
        }
        let well_known = schemalens_core::normalize::normalize_raw_type(&field.type_name);
        if well_known == NormalizedType::Unknown && self.arena.contains(element) {
            let info = info.with_constraints(constraints);
            let info = if repeated { info } else { info.with_normalized_type(NormalizedType::Object) };
            return Member::nested(info, Target::Named(element.to_string()));
        }
        Member::scalar(info.with_constraints(constraints))
    }
}

/// Protobuf parser plugin
#[derive(Debug, Default, Clone, Copy)]
pub struct ProtobufParser;

impl ProtobufParser {
    /// Create a new Protobuf parser
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ParserPlugin for ProtobufParser {
    fn name(&self) -> &'static str {
        "protobuf"
    }

    fn format_type(&self) -> FormatType {
        FormatType::Protobuf
    }

    fn can_parse(&self, filename: &str, content: &[u8]) -> DetectionResult {
        if has_extension(filename, &["proto"]) {
            return (true, 0.95).into();
        }
        let head = sniff(content, 4096);
        let has_syntax = head.contains("syntax = \"proto") || head.contains("syntax=\"proto");
        let has_message = head.contains("message ") && head.contains('{') && head.contains(" = 1");
        match (has_syntax, has_message) {
            (true, _) => (true, 0.9).into(),
            (false, true) => (true, 0.5).into(),
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
        let locate = |e: ParseError| e.located_in(text.as_bytes());
        let tokens = tokenize(text).map_err(locate)?;
        let file = Parser {
            tokens: &tokens,
            pos: 0,
            end: text.len(),
            ctx,
        }
        .file()
        .map_err(locate)?;

        let mut builder = Builder {
            arena: TypeArena::new(),
            enums: file.enums.iter().cloned().collect(),
        };
        for message in &file.messages {
            builder.collect(message);
        }
        for message in &file.messages {
            builder.populate(message);
        }

        let mut schema = SchemaDetails::new(FormatType::Protobuf, file_stem(filename), filename);
        schema.set_metadata("syntax", file.syntax.clone().unwrap_or_else(|| "proto2".to_string()));
        if let Some(package) = &file.package {
            schema.set_metadata("package", package.clone());
        }
        schema.set_metadata(
            "messages",
            file.messages.iter().map(|m| m.name.clone()).collect::<Vec<_>>(),
        );
        if !file.services.is_empty() {
            schema.set_metadata("services", file.services.clone());
        }
        for message in &file.messages {
            if let Some(node) = builder.arena.lookup(&message.name) {
                let fields = builder.arena.flatten(node, Some(&message.name), ctx)?;
                schema.fields.extend(fields);
            }
        }
        mark_conventional_keys(&mut schema.fields);
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::ParseErrorKind;

    const PROTO: &str = r#"
syntax = "proto3";
package shop.v1;

import "google/protobuf/timestamp.proto";

// An order
message Order {
  int64 id = 1;
  int64 customer_id = 2;
  repeated LineItem items = 3;
  Status status = 4;
  map<string, string> labels = 5;
  google.protobuf.Timestamp created_at = 6;
  oneof payment {
    string card_token = 7;
    string invoice_ref = 8;
  }

  message LineItem {
    string sku = 1;
    optional int32 quantity = 2 [deprecated = true];
  }
}

enum Status {
  STATUS_UNSPECIFIED = 0;
  STATUS_PAID = 1;
}

message TreeNode {
  string value = 1;
  repeated TreeNode children = 2;
  TreeNode parent = 3;
}

service Orders {
  rpc Get (Order) returns (Order);
}
"#;

    fn parse() -> SchemaDetails {
        ProtobufParser::new()
            .parse_schema("shop.proto", PROTO.as_bytes(), &ParseContext::default())
            .unwrap()
    }

    #[test]
    fn test_messages_and_fields() {
        let schema = parse();
        assert_eq!(schema.metadata.get("syntax"), Some(&"proto3".into()));
        assert_eq!(schema.metadata.get("package"), Some(&"shop.v1".into()));
        assert_eq!(schema.entity_names(), vec!["Order", "TreeNode"]);

        let field = |name: &str| schema.fields.iter().find(|f| f.name == name).unwrap();
        assert!(field("id").is_primary_key);
        assert_eq!(field("items").field_type, "repeated LineItem");
        assert_eq!(field("items").normalized_type, NormalizedType::Array);
        assert_eq!(field("items.sku").parent.as_deref(), Some("items"));
        assert!(field("items.quantity").nullable);
        assert_eq!(field("status").constraints.enum_values.len(), 2);
        assert_eq!(field("labels").normalized_type, NormalizedType::Map);
        assert_eq!(field("created_at").normalized_type, NormalizedType::Datetime);
        assert_eq!(field("card_token").metadata.get("oneof"), Some(&"payment".into()));
    }

    #[test]
    fn test_recursive_message_terminates() {
        let schema = parse();
        let parent = schema
            .fields
            .iter()
            .find(|f| f.entity.as_deref() == Some("TreeNode") && f.name == "parent")
            .unwrap();
        assert_eq!(parent.field_type, "ref:TreeNode");
        let children = schema
            .fields
            .iter()
            .find(|f| f.entity.as_deref() == Some("TreeNode") && f.name == "children")
            .unwrap();
        assert_eq!(children.normalized_type, NormalizedType::Array);
    }

    #[test]
    fn test_unterminated_message() {
        let err = ProtobufParser::new()
            .parse_schema("bad.proto", b"message A {\n  string a = 1;\n", &ParseContext::default())
            .unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Syntax);
        assert_eq!(err.offset, Some(10));
        assert_eq!(err.line, Some(1));
    }

    #[test]
    fn test_nested_oneof_is_rejected() {
        let depth = 50_000;
        let mut text = String::from("message M {\n");
        for _ in 0..depth {
            text.push_str("oneof a {\n");
        }
        text.push_str("string x = 1;\n");
        for _ in 0..depth {
            text.push_str("}\n");
        }
        text.push_str("}\n");
        let err = ProtobufParser::new()
            .parse_schema("deep.proto", text.as_bytes(), &ParseContext::default())
            .unwrap_err();
        assert_eq!(err.kind, crate::detection::ParseErrorKind::Syntax);
        assert!(err.message.contains("nested"));
    }
}
