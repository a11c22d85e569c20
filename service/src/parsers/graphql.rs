//! GraphQL schema definition language parser
//!
//! Object, input and interface types are entities. A field whose type names
//! another object or interface type is a reference to that entity and is
//! tagged as a foreign-key hint; a field whose type names an input type is
//! embedded and flattened. Root operation types are listed in metadata only.

use super::arena::{Member, NodeId, Target, TypeArena};
use super::{decode_text, file_stem, has_extension, sniff};
use crate::detection::{DetectionResult, ParseContext, ParseError, ParseResult, ParserPlugin};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use schemalens_core::{
    FieldConstraints, FieldInfo, ForeignKeyRef, FormatType, NormalizedType, SchemaDetails,
};

#[allow(clippy::expect_used)]
static SDL_DEFINITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(extend\s+)?(type|input|interface|enum|scalar|union)\s+[A-Za-z_]\w*[^\n]*(\{|=|$)")
        .expect("valid SDL regex")
});

const ROOT_OPERATIONS: &[&str] = &["Query", "Mutation", "Subscription"];

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Name(String),
    Str(String),
    Punct(char),
    Spread,
    Number(String),
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
        match c {
            b' ' | b'\t' | b'\r' | b'\n' | b',' => pos += 1,
            b'#' => {
                pos = text[pos..].find('\n').map_or(bytes.len(), |n| pos + n);
            }
            b'"' if text[pos..].starts_with("\"\"\"") => {
                let start = pos;
                let end = text[pos + 3..]
                    .find("\"\"\"")
                    .ok_or_else(|| ParseError::syntax_at("unterminated block string", Some(start), None))?;
                out.push(Spanned {
                    tok: Tok::Str(text[pos + 3..pos + 3 + end].trim().to_string()),
                    offset: start,
                });
                pos += 3 + end + 3;
            }
            b'"' => {
                let start = pos;
                pos += 1;
                while pos < bytes.len() && bytes[pos] != b'"' && bytes[pos] != b'\n' {
                    if bytes[pos] == b'\\' {
                        pos += 1;
                    }
                    pos += 1;
                }
                if pos >= bytes.len() || bytes[pos] != b'"' {
                    return Err(ParseError::syntax_at("unterminated string", Some(start), None));
                }
                out.push(Spanned {
                    tok: Tok::Str(text[start + 1..pos].to_string()),
                    offset: start,
                });
                pos += 1;
            }
            b'.' if text[pos..].starts_with("...") => {
                out.push(Spanned { tok: Tok::Spread, offset: pos });
                pos += 3;
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                let start = pos;
                while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
                    pos += 1;
                }
                out.push(Spanned {
                    tok: Tok::Name(text[start..pos].to_string()),
                    offset: start,
                });
            }
            c if c.is_ascii_digit() || c == b'-' => {
                let start = pos;
                pos += 1;
                while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'.') {
                    pos += 1;
                }
                out.push(Spanned {
                    tok: Tok::Number(text[start..pos].to_string()),
                    offset: start,
                });
            }
            _ => {
                let ch = text[pos..].chars().next().unwrap_or(' ');
                out.push(Spanned { tok: Tok::Punct(ch), offset: pos });
                pos += ch.len_utf8();
            }
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Object,
    Input,
    Interface,
}

#[derive(Debug)]
struct SdlField {
    name: String,
    type_ref: String,
    description: Option<String>,
    default: Option<String>,
}

#[derive(Debug)]
struct SdlType {
    kind: Kind,
    fields: Vec<SdlField>,
    implements: Vec<String>,
    description: Option<String>,
}

#[derive(Debug, Default)]
struct Document {
    types: IndexMap<String, SdlType>,
    enums: IndexMap<String, Vec<String>>,
    scalars: Vec<String>,
    unions: IndexMap<String, Vec<String>>,
    roots: Vec<String>,
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

    fn at(&self, c: char) -> bool {
        self.peek() == Some(&Tok::Punct(c))
    }

    fn eat(&mut self, c: char) -> bool {
        if self.at(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> ParseResult<()> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{c}'")))
        }
    }

    fn name(&mut self) -> ParseResult<String> {
        match self.peek() {
            Some(Tok::Name(n)) => {
                self.pos += 1;
                Ok(n.clone())
            }
            _ => Err(self.error("expected name")),
        }
    }

    fn description(&mut self) -> Option<String> {
        match self.peek() {
            Some(Tok::Str(s)) => {
                self.pos += 1;
                Some(s.clone())
            }
            _ => None,
        }
    }

    /// Skip a balanced group opened by the current token
    fn skip_group(&mut self, open: char, close: char) -> ParseResult<()> {
        let start = self.offset();
        self.expect(open)?;
        let mut depth = 1usize;
        while let Some(tok) = self.peek() {
            self.pos += 1;
            if *tok == Tok::Punct(open) {
                depth += 1;
            } else if *tok == Tok::Punct(close) {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
        }
        Err(ParseError::syntax_at(format!("unterminated '{open}'"), Some(start), None))
    }

    fn directives(&mut self) -> ParseResult<()> {
        while self.eat('@') {
            self.name()?;
            if self.at('(') {
                self.skip_group('(', ')')?;
            }
        }
        Ok(())
    }

    fn type_ref(&mut self) -> ParseResult<String> {
        self.type_ref_at(0)
    }

    fn type_ref_at(&mut self, depth: usize) -> ParseResult<String> {
        if depth > self.ctx.max_nesting_depth {
            return Err(self.error("list type nesting too deep"));
        }
        let mut raw = if self.eat('[') {
            let inner = self.type_ref_at(depth + 1)?;
            self.expect(']')?;
            format!("[{inner}]")
        } else {
            self.name()?
        };
        if self.eat('!') {
            raw.push('!');
        }
        Ok(raw)
    }

    fn value_text(&mut self) -> ParseResult<String> {
        match self.peek() {
            Some(Tok::Punct('[')) => {
                self.skip_group('[', ']')?;
                Ok("[...]".to_string())
            }
            Some(Tok::Punct('{')) => {
                self.skip_group('{', '}')?;
                Ok("{...}".to_string())
            }
            Some(Tok::Name(v) | Tok::Str(v) | Tok::Number(v)) => {
                self.pos += 1;
                Ok(v.clone())
            }
            _ => Err(self.error("expected value")),
        }
    }

    fn fields(&mut self, owner: &str) -> ParseResult<Vec<SdlField>> {
        let open = self.offset();
        self.expect('{')?;
        let mut fields = Vec::new();
        loop {
            self.ctx.check()?;
            if self.eat('}') {
                return Ok(fields);
            }
            if self.peek().is_none() {
                return Err(ParseError::syntax_at(
                    format!("unterminated field list of {owner}"),
                    Some(open),
                    None,
                ));
            }
            let description = self.description();
            let name = self.name()?;
            if self.at('(') {
                self.skip_group('(', ')')?;
            }
            self.expect(':')?;
            let type_ref = self.type_ref()?;
            let default = if self.eat('=') { Some(self.value_text()?) } else { None };
            self.directives()?;
            fields.push(SdlField {
                name,
                type_ref,
                description,
                default,
            });
        }
    }

    fn document(&mut self) -> ParseResult<Document> {
        let mut doc = Document::default();
        while self.peek().is_some() {
            self.ctx.check()?;
            let description = self.description();
            let extend = matches!(self.peek(), Some(Tok::Name(n)) if n == "extend");
            if extend {
                self.pos += 1;
            }
            let keyword = self.name()?;
            match keyword.as_str() {
                "type" | "input" | "interface" => {
                    let kind = match keyword.as_str() {
                        "type" => Kind::Object,
                        "input" => Kind::Input,
                        _ => Kind::Interface,
                    };
                    let name = self.name()?;
                    let mut implements = Vec::new();
                    if matches!(self.peek(), Some(Tok::Name(n)) if n == "implements") {
                        self.pos += 1;
                        self.eat('&');
                        implements.push(self.name()?);
                        while self.eat('&') {
                            implements.push(self.name()?);
                        }
                    }
                    self.directives()?;
                    let fields = if self.at('{') { self.fields(&name)? } else { Vec::new() };
                    let entry = doc.types.entry(name).or_insert_with(|| SdlType {
                        kind,
                        fields: Vec::new(),
                        implements: Vec::new(),
                        description: None,
                    });
                    entry.fields.extend(fields);
                    entry.implements.extend(implements);
                    if entry.description.is_none() {
                        entry.description = description;
                    }
                }
                "enum" => {
                    let name = self.name()?;
                    self.directives()?;
                    let open = self.offset();
                    self.expect('{')?;
                    let mut values = Vec::new();
                    while !self.eat('}') {
                        if self.peek().is_none() {
                            return Err(ParseError::syntax_at(format!("unterminated enum {name}"), Some(open), None));
                        }
                        self.description();
                        values.push(self.name()?);
                        self.directives()?;
                    }
                    doc.enums.entry(name).or_default().extend(values);
                }
                "scalar" => {
                    doc.scalars.push(self.name()?);
                    self.directives()?;
                }
                "union" => {
                    let name = self.name()?;
                    self.directives()?;
                    self.expect('=')?;
                    self.eat('|');
                    let mut members = vec![self.name()?];
                    while self.eat('|') {
                        members.push(self.name()?);
                    }
                    doc.unions.insert(name, members);
                }
                "schema" => {
                    self.directives()?;
                    self.expect('{')?;
                    while !self.eat('}') {
                        self.name()?;
                        self.expect(':')?;
                        let root = self.name()?;
                        doc.roots.push(root);
                        if self.peek().is_none() {
                            return Err(self.error("unterminated schema block"));
                        }
                    }
                }
                "directive" => {
                    self.expect('@')?;
                    self.name()?;
                    if self.at('(') {
                        self.skip_group('(', ')')?;
                    }
                    if matches!(self.peek(), Some(Tok::Name(n)) if n == "repeatable") {
                        self.pos += 1;
                    }
                    if matches!(self.peek(), Some(Tok::Name(n)) if n == "on") {
                        self.pos += 1;
                        self.eat('|');
                        self.name()?;
                        while self.eat('|') {
                            self.name()?;
                        }
                    }
                }
                other => return Err(self.error(format!("unexpected definition keyword '{other}'"))),
            }
        }
        if doc.roots.is_empty() {
            doc.roots = ROOT_OPERATIONS
                .iter()
                .filter(|r| doc.types.contains_key(**r))
                .map(|r| (*r).to_string())
                .collect();
        }
        Ok(doc)
    }
}

/// Named type at the core of a type reference: `[Post!]!` gives `Post`
fn base_name(type_ref: &str) -> &str {
    type_ref.trim_matches(|c| c == '[' || c == ']' || c == '!')
}

fn build(doc: &Document, ctx: &ParseContext) -> ParseResult<Vec<FieldInfo>> {
    let mut arena = TypeArena::new();
    let mut entities: Vec<(&str, NodeId)> = Vec::new();
    for name in doc.types.keys() {
        let node = arena.declare(name);
        if !doc.roots.contains(name) {
            entities.push((name.as_str(), node));
        }
    }

    for (name, ty) in &doc.types {
        let node = arena.declare(name);
        let key = ty
            .fields
            .iter()
            .find(|f| f.type_ref == "ID!" && f.name.eq_ignore_ascii_case("id"))
            .or_else(|| ty.fields.iter().find(|f| f.type_ref == "ID!"))
            .map(|f| f.name.as_str());

        for field in &ty.fields {
            let base = base_name(&field.type_ref);
            let non_null = field.type_ref.ends_with('!');
            let mut constraints = FieldConstraints {
                default_value: field.default.clone(),
                ..FieldConstraints::default()
            };
            let mut target = None;
            let mut normalized = None;

            if let Some(values) = doc.enums.get(base) {
                constraints.enum_values.clone_from(values);
                if !field.type_ref.starts_with('[') {
                    normalized = Some(NormalizedType::String);
                }
            } else if let Some(referenced) = doc.types.get(base) {
                if referenced.kind == Kind::Input {
                    target = Some(Target::Named(base.to_string()));
                } else {
                    constraints.references = Some(ForeignKeyRef {
                        entity: base.to_string(),
                        field: None,
                    });
                }
                if !field.type_ref.starts_with('[') {
                    normalized = Some(NormalizedType::Object);
                }
            } else if doc.unions.contains_key(base) && !field.type_ref.starts_with('[') {
                normalized = Some(NormalizedType::Object);
            }

            let mut info = FieldInfo::new(&field.name, &field.type_ref)
                .nullable(!non_null)
                .required(non_null)
                .with_constraints(constraints);
            if let Some(normalized) = normalized {
                info = info.with_normalized_type(normalized);
            }
            if let Some(description) = &field.description {
                info = info.with_description(description.clone());
            }
            if key == Some(field.name.as_str()) {
                info = info.primary_key();
            }
            let member = match target {
                Some(target) => Member::nested(info, target),
                None => Member::scalar(info),
            };
            arena.push_member(node, member);
        }
    }

    let mut fields = Vec::new();
    for (name, node) in entities {
        fields.extend(arena.flatten(node, Some(name), ctx)?);
    }
    Ok(fields)
}

/// GraphQL SDL parser plugin
#[derive(Debug, Default, Clone, Copy)]
pub struct GraphqlParser;

impl GraphqlParser {
    /// Create a new GraphQL parser
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ParserPlugin for GraphqlParser {
    fn name(&self) -> &'static str {
        "graphql"
    }

    fn format_type(&self) -> FormatType {
        FormatType::Graphql
    }

    fn can_parse(&self, filename: &str, content: &[u8]) -> DetectionResult {
        if has_extension(filename, &["graphql", "graphqls", "gql"]) {
            return (true, 0.95).into();
        }
        let head = sniff(content, 4096);
        if head.starts_with(['{', '[', '<']) {
            return DetectionResult::NO;
        }
        if SDL_DEFINITION.is_match(head) && head.contains(':') {
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
        let text = decode_text(content)?;
        let locate = |e: ParseError| e.located_in(text.as_bytes());
        let tokens = tokenize(text).map_err(locate)?;
        let doc = Parser {
            tokens: &tokens,
            pos: 0,
            end: text.len(),
            ctx,
        }
        .document()
        .map_err(locate)?;

        let mut schema = SchemaDetails::new(FormatType::Graphql, file_stem(filename), filename);
        schema.set_metadata(
            "types",
            doc.types
                .keys()
                .filter(|n| !doc.roots.contains(*n))
                .cloned()
                .collect::<Vec<_>>(),
        );
        schema.set_metadata("operations", doc.roots.clone());
        if !doc.enums.is_empty() {
            schema.set_metadata("enums", doc.enums.keys().cloned().collect::<Vec<_>>());
        }
        if !doc.scalars.is_empty() {
            schema.set_metadata("scalars", doc.scalars.clone());
        }
        let interfaces: Vec<String> = doc
            .types
            .iter()
            .filter(|(_, t)| t.kind == Kind::Interface)
            .map(|(n, _)| n.clone())
            .collect();
        if !interfaces.is_empty() {
            schema.set_metadata("interfaces", interfaces);
        }
        schema.fields = build(&doc, ctx)?;
        for field in &mut schema.fields {
            let Some(entity) = field.entity.as_deref() else {
                continue;
            };
            if let Some(ty) = doc.types.get(entity) {
                if !ty.implements.is_empty() && field.parent.is_none() {
                    field
                        .metadata
                        .insert("implements".to_string(), ty.implements.clone().into());
                }
            }
        }
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::ParseErrorKind;

    const SDL: &str = r#"
"""A registered user"""
type User implements Node {
  id: ID!
  email: String!
  "Posts written by the user"
  posts(first: Int = 10): [Post!]!
  role: Role
  joined: DateTime
}

type Post {
  id: ID!
  title: String!
  author: User!
}

interface Node { id: ID! }

enum Role { ADMIN MEMBER }

scalar DateTime

input AddressInput { city: String!, zip: String }
input CreateUserInput { email: String!, address: AddressInput }

type Query {
  user(id: ID!): User
}
"#;

    fn parse() -> SchemaDetails {
        GraphqlParser::new()
            .parse_schema("schema.graphql", SDL.as_bytes(), &ParseContext::default())
            .unwrap()
    }

    fn field<'a>(schema: &'a SchemaDetails, entity: &str, name: &str) -> &'a FieldInfo {
        schema
            .fields
            .iter()
            .find(|f| f.entity.as_deref() == Some(entity) && f.name == name)
            .unwrap()
    }

    #[test]
    fn test_types_and_keys() {
        let schema = parse();
        assert_eq!(
            schema.entity_names(),
            vec!["User", "Post", "Node", "AddressInput", "CreateUserInput"]
        );
        assert_eq!(schema.metadata.get("operations"), Some(&vec!["Query"].into()));
        assert!(field(&schema, "User", "id").is_primary_key);
        assert!(field(&schema, "User", "email").required);
        assert!(field(&schema, "User", "role").nullable);
        assert_eq!(field(&schema, "User", "role").constraints.enum_values, vec!["ADMIN", "MEMBER"]);
        assert_eq!(field(&schema, "User", "joined").normalized_type, NormalizedType::Datetime);
        assert_eq!(field(&schema, "User", "posts").normalized_type, NormalizedType::Array);
    }

    #[test]
    fn test_object_references_are_foreign_key_hints() {
        let schema = parse();
        let author = field(&schema, "Post", "author");
        assert!(author.is_foreign_key_hint);
        assert_eq!(author.constraints.references.as_ref().unwrap().entity, "User");
        assert_eq!(author.normalized_type, NormalizedType::Object);
    }

    #[test]
    fn test_input_types_are_flattened() {
        let schema = parse();
        let city = field(&schema, "CreateUserInput", "address.city");
        assert_eq!(city.parent.as_deref(), Some("address"));
    }

    #[test]
    fn test_unterminated_type() {
        let err = GraphqlParser::new()
            .parse_schema("bad.graphql", b"type A {\n  id: ID!\n", &ParseContext::default())
            .unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Syntax);
        assert_eq!(err.offset, Some(7));
    }
}
