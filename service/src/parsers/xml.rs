//! XML parser: instance documents and XSD schema definitions
//!
//! Instance documents are read into a depth-capped element tree; repeated
//! children of the root become records, attributes become `@attr` fields and
//! nested elements are flattened. XSD documents are read as declarations.

use super::arena::{Member, NodeId, Target, TypeArena};
use super::instance::{InstanceSchemaBuilder, flatten_sample};
use super::{decode_text, file_stem, has_extension, sniff};
use crate::detection::{
    DetectionResult, ParseContext, ParseError, ParseResult, ParserPlugin, SampleRecord,
};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use schemalens_core::{FieldConstraints, FieldInfo, FormatType, NormalizedType, SchemaDetails};
use serde_json::{Map, Value};
use std::collections::HashMap;

const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

/// Element tree node
#[derive(Debug, Default, Clone)]
struct Element {
    local: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name || k.rsplit(':').next() == Some(name))
            .map(|(_, v)| v.as_str())
    }

    fn children_named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.local == local)
    }
}

fn local_name(qualified: &str) -> &str {
    qualified.rsplit(':').next().unwrap_or(qualified)
}

fn start_element(e: &BytesStart<'_>) -> ParseResult<Element> {
    let qualified = String::from_utf8_lossy(e.name().as_ref()).to_string();
    let mut element = Element {
        local: local_name(&qualified).to_string(),
        ..Element::default()
    };
    for attr in e.attributes() {
        let attr = attr.map_err(|err| ParseError::syntax(format!("invalid attribute: {err}")))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr
            .unescape_value()
            .map_err(|err| ParseError::syntax(format!("invalid attribute value: {err}")))?
            .to_string();
        element.attributes.push((key, value));
    }
    Ok(element)
}

/// Parse into a tree; elements deeper than `max_depth` are checked for
/// well-formedness but not stored.
fn parse_tree(text: &str, max_depth: usize, ctx: &ParseContext) -> ParseResult<Element> {
    let mut reader = Reader::from_reader(text.as_bytes());
    reader.trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut open_offsets: Vec<usize> = Vec::new();
    let mut depth = 0usize;
    let mut root: Option<Element> = None;
    let mut buf = Vec::new();
    let mut events = 0usize;

    let fail = |message: String, offset: usize| {
        ParseError::syntax_at(message, Some(offset), None).located_in(text.as_bytes())
    };

    loop {
        let position = reader.buffer_position();
        events += 1;
        if events % 512 == 0 {
            ctx.check()?;
        }
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if root.is_some() && depth == 0 {
                    return Err(fail("content after the root element".to_string(), position));
                }
                depth += 1;
                open_offsets.push(position);
                if depth <= max_depth {
                    stack.push(start_element(&e)?);
                }
            }
            Ok(Event::Empty(e)) => {
                if root.is_some() && depth == 0 {
                    return Err(fail("content after the root element".to_string(), position));
                }
                if depth < max_depth {
                    let element = start_element(&e)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None => root = Some(element),
                    }
                }
            }
            Ok(Event::End(_)) => {
                open_offsets.pop();
                if depth <= max_depth {
                    if let Some(done) = stack.pop() {
                        match stack.last_mut() {
                            Some(parent) => parent.children.push(done),
                            None => root = Some(done),
                        }
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Text(t)) => {
                if let Some(current) = stack.last_mut() {
                    let value = t
                        .unescape()
                        .map_err(|err| fail(format!("invalid text: {err}"), position))?;
                    current.text.push_str(value.trim());
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(String::from_utf8_lossy(c.as_ref()).trim());
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(fail(format!("malformed XML: {err}"), reader.buffer_position()));
            }
            _ => {}
        }
        buf.clear();
    }

    if let Some(offset) = open_offsets.last() {
        let name = stack.last().map_or("element", |e| e.local.as_str());
        return Err(fail(format!("unclosed tag <{name}>"), *offset));
    }
    root.ok_or_else(|| ParseError::syntax_at("document has no root element", Some(0), Some(1)))
}

/// Detect the document dialect from the root element and its namespaces
fn detect_dialect(root: &Element) -> &'static str {
    let namespaces: Vec<&str> = root
        .attributes
        .iter()
        .filter(|(k, _)| k == "xmlns" || k.starts_with("xmlns:"))
        .map(|(_, v)| v.as_str())
        .collect();
    let has_ns = |needle: &str| namespaces.iter().any(|ns| ns.contains(needle));
    match root.local.as_str() {
        "schema" if has_ns(XSD_NAMESPACE) || namespaces.is_empty() => "xsd",
        "html" => "xhtml",
        "Envelope" if has_ns("soap") || has_ns("envelope") => "soap",
        "svg" => "svg",
        _ => "generic",
    }
}

/// Convert an element into a JSON-like value for field extraction
fn element_value(element: &Element) -> Value {
    let attributes: Vec<&(String, String)> = element
        .attributes
        .iter()
        .filter(|(k, _)| k != "xmlns" && !k.starts_with("xmlns:") && !k.starts_with("xsi:"))
        .collect();
    if element.children.is_empty() && attributes.is_empty() {
        return if element.text.is_empty() {
            Value::Null
        } else {
            Value::String(element.text.clone())
        };
    }

    let mut map = Map::new();
    for (key, value) in attributes {
        map.insert(format!("@{}", local_name(key)), Value::String(value.clone()));
    }
    let mut grouped: Vec<(&str, Vec<Value>)> = Vec::new();
    for child in &element.children {
        let value = element_value(child);
        match grouped.iter_mut().find(|(name, _)| *name == child.local) {
            Some((_, values)) => values.push(value),
            None => grouped.push((child.local.as_str(), vec![value])),
        }
    }
    for (name, mut values) in grouped {
        let value = if values.len() == 1 {
            values.pop().unwrap_or(Value::Null)
        } else {
            Value::Array(values)
        };
        map.insert(name.to_string(), value);
    }
    if !element.text.is_empty() {
        map.insert("#text".to_string(), Value::String(element.text.clone()));
    }
    Value::Object(map)
}

/// Records of an instance document: repeated root children, or the root itself
fn instance_records(root: &Element) -> (Vec<Value>, Option<String>) {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for child in &root.children {
        *counts.entry(child.local.as_str()).or_insert(0) += 1;
    }
    let repeated = root
        .children
        .iter()
        .map(|c| c.local.as_str())
        .find(|name| counts.get(name).copied().unwrap_or(0) > 1);
    match repeated {
        Some(name) => (
            root.children_named(name).map(element_value).collect(),
            Some(name.to_string()),
        ),
        None => (vec![element_value(root)], None),
    }
}

fn is_builtin(type_name: &str) -> bool {
    type_name.starts_with("xs:") || type_name.starts_with("xsd:")
}

/// Extract declared fields from an XSD document
struct XsdExtractor<'a> {
    arena: TypeArena,
    ctx: &'a ParseContext,
}

impl<'a> XsdExtractor<'a> {
    fn new(ctx: &'a ParseContext) -> Self {
        Self {
            arena: TypeArena::new(),
            ctx,
        }
    }

    fn extract(mut self, root: &Element, schema: &mut SchemaDetails) -> ParseResult<()> {
        for complex in root.children_named("complexType") {
            if let Some(name) = complex.attr("name") {
                let node = self.arena.declare(name);
                self.collect_members(node, complex)?;
            }
        }
        let mut entities: Vec<(String, NodeId)> = Vec::new();
        for element in root.children_named("element") {
            let Some(name) = element.attr("name") else {
                continue;
            };
            let node = match element.attr("type").map(local_name) {
                Some(type_name) if self.arena.contains(type_name) => self.arena.lookup(type_name),
                _ => element.children_named("complexType").next().map(|inline| {
                    let node = self.arena.alloc(name);
                    self.collect_members(node, inline).map(|()| node)
                }).transpose()?,
            };
            if let Some(node) = node {
                entities.push((name.to_string(), node));
            } else {
                // simple top-level element
                let field = self.simple_field(name, element);
                let node = self.arena.alloc(name);
                self.arena.push_member(node, Member::scalar(field));
                entities.push((name.to_string(), node));
            }
        }
        schema.set_metadata(
            "entities",
            entities.iter().map(|(n, _)| n.clone()).collect::<Vec<_>>(),
        );
        for (name, node) in entities {
            let fields = self.arena.flatten(node, Some(&name), self.ctx)?;
            schema.fields.extend(fields);
        }
        Ok(())
    }

    fn collect_members(&mut self, node: NodeId, container: &Element) -> ParseResult<()> {
        self.ctx.check()?;
        for child in &container.children {
            match child.local.as_str() {
                "sequence" | "all" | "choice" | "complexContent" | "simpleContent" | "extension"
                | "restriction" => self.collect_members(node, child)?,
                "element" => {
                    let Some(name) = child.attr("name").or_else(|| child.attr("ref").map(local_name)) else {
                        continue;
                    };
                    let member = self.element_member(name, child)?;
                    self.arena.push_member(node, member);
                }
                "attribute" => {
                    let Some(name) = child.attr("name") else {
                        continue;
                    };
                    let raw = child.attr("type").unwrap_or("xs:string");
                    let required = child.attr("use") == Some("required");
                    let field = FieldInfo::new(format!("@{name}"), raw)
                        .required(required)
                        .nullable(!required);
                    self.arena.push_member(node, Member::scalar(field));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn element_member(&mut self, name: &str, element: &Element) -> ParseResult<Member> {
        let repeated = matches!(element.attr("maxOccurs"), Some(m) if m == "unbounded" || m.parse::<u32>().is_ok_and(|n| n > 1));
        let optional = element.attr("minOccurs") == Some("0");
        let nillable = element.attr("nillable") == Some("true");

        if let Some(type_name) = element.attr("type") {
            let local = local_name(type_name);
            if !is_builtin(type_name) && self.arena.contains(local) {
                let raw = if repeated { format!("array<{type_name}>") } else { type_name.to_string() };
                let field = FieldInfo::new(name, raw)
                    .required(!optional)
                    .nullable(optional || nillable);
                let field = if repeated { field } else { field.with_normalized_type(NormalizedType::Object) };
                return Ok(Member::nested(field, Target::Named(local.to_string())));
            }
        }
        if let Some(inline) = element.children_named("complexType").next() {
            let node = self.arena.alloc(name);
            self.collect_members(node, inline)?;
            let raw = if repeated { "array<complexType>" } else { "complexType" };
            let field = FieldInfo::new(name, raw)
                .required(!optional)
                .nullable(optional || nillable);
            let field = if repeated { field } else { field.with_normalized_type(NormalizedType::Object) };
            return Ok(Member::nested(field, Target::Node(node)));
        }

        let mut field = self.simple_field(name, element);
        if repeated {
            field = FieldInfo::new(name, format!("array<{}>", field.field_type))
                .with_constraints(field.constraints);
        }
        Ok(Member::scalar(field.required(!optional).nullable(optional || nillable)))
    }

    fn simple_field(&self, name: &str, element: &Element) -> FieldInfo {
        let mut constraints = FieldConstraints::default();
        let mut raw = element.attr("type").unwrap_or("xs:string").to_string();
        if let Some(restriction) = element
            .children_named("simpleType")
            .flat_map(|s| s.children_named("restriction"))
            .next()
        {
            if let Some(base) = restriction.attr("base") {
                raw = base.to_string();
            }
            for facet in &restriction.children {
                let value = facet.attr("value").unwrap_or_default();
                match facet.local.as_str() {
                    "enumeration" => constraints.enum_values.push(value.to_string()),
                    "maxLength" => constraints.max_length = value.parse().ok(),
                    "minLength" => constraints.min_length = value.parse().ok(),
                    "minInclusive" => constraints.minimum = value.parse().ok(),
                    "maxInclusive" => constraints.maximum = value.parse().ok(),
                    "pattern" => constraints.pattern = Some(value.to_string()),
                    _ => {}
                }
            }
        }
        if let Some(default) = element.attr("default") {
            constraints.default_value = Some(default.to_string());
        }
        FieldInfo::new(name, raw).with_constraints(constraints)
    }
}

/// XML parser plugin
#[derive(Debug, Default, Clone, Copy)]
pub struct XmlParser;

impl XmlParser {
    /// Create a new XML parser
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ParserPlugin for XmlParser {
    fn name(&self) -> &'static str {
        "xml"
    }

    fn format_type(&self) -> FormatType {
        FormatType::Xml
    }

    fn can_parse(&self, filename: &str, content: &[u8]) -> DetectionResult {
        let head = sniff(content, 256);
        if !head.starts_with('<') {
            return DetectionResult::NO;
        }
        if head.starts_with("<?xml") || has_extension(filename, &["xml", "xsd", "wsdl", "svg", "xhtml"]) {
            (true, 0.9).into()
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
        // one extra level so the instance builder can see where truncation starts
        let root = parse_tree(text, ctx.max_nesting_depth + 2, ctx)?;
        let dialect = detect_dialect(&root);

        let mut schema = SchemaDetails::new(FormatType::Xml, file_stem(filename), filename);
        schema.set_metadata("dialect", dialect);
        schema.set_metadata("root_element", root.local.clone());

        if dialect == "xsd" {
            XsdExtractor::new(ctx).extract(&root, &mut schema)?;
            return Ok(schema);
        }

        let (records, record_element) = instance_records(&root);
        let mut builder = InstanceSchemaBuilder::new(ctx);
        for record in &records {
            builder.observe(record)?;
        }
        if let Some(name) = record_element {
            schema.set_metadata("record_element", name);
        }
        schema.set_metadata("record_count", builder.record_count());
        schema.fields = builder.finish();
        Ok(schema)
    }

    fn extract_sample_data(&self, content: &[u8], max_records: usize) -> ParseResult<Vec<SampleRecord>> {
        let text = decode_text(content)?;
        let ctx = ParseContext::default();
        let root = parse_tree(text, ctx.max_nesting_depth + 2, &ctx)?;
        if detect_dialect(&root) == "xsd" {
            return Ok(Vec::new());
        }
        let (records, _) = instance_records(&root);
        Ok(records
            .iter()
            .take(max_records)
            .map(|r| flatten_sample(r, ctx.max_nesting_depth))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::ParseErrorKind;

    const USERS: &[u8] = br#"<?xml version="1.0"?>
<users>
  <user id="1"><name>Ada</name><email>ada@example.com</email><address><city>London</city></address></user>
  <user id="2"><name>Bob</name><email>bob@example.com</email><address><city>Paris</city></address></user>
</users>"#;

    #[test]
    fn test_repeated_children_become_records() {
        let schema = XmlParser::new()
            .parse_schema("users.xml", USERS, &ParseContext::default())
            .unwrap();
        let names: Vec<&str> = schema.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["@id", "name", "email", "address", "address.city"]);
        assert_eq!(schema.metadata.get("dialect"), Some(&"generic".into()));
        assert_eq!(schema.metadata.get("record_count"), Some(&2.into()));
        assert_eq!(schema.field("address.city").unwrap().parent.as_deref(), Some("address"));
    }

    #[test]
    fn test_unclosed_tag_is_syntax_error_with_offset() {
        let content = b"<users>\n  <user><name>Ada</name>\n</users>";
        let err = XmlParser::new()
            .parse_schema("bad.xml", content, &ParseContext::default())
            .unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Syntax);
        assert!(err.offset.is_some());

        let content = b"<users><user><name>Ada</name></user>";
        let err = XmlParser::new()
            .parse_schema("bad.xml", content, &ParseContext::default())
            .unwrap_err();
        assert!(err.message.contains("unclosed"));
    }

    #[test]
    fn test_xsd_declarations() {
        let content = br#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:complexType name="Address">
    <xs:sequence><xs:element name="city" type="xs:string"/></xs:sequence>
  </xs:complexType>
  <xs:element name="customer">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="id" type="xs:int"/>
        <xs:element name="email" type="xs:string" minOccurs="0"/>
        <xs:element name="address" type="Address"/>
      </xs:sequence>
      <xs:attribute name="status" type="xs:string" use="required"/>
    </xs:complexType>
  </xs:element>
</xs:schema>"#;
        let schema = XmlParser::new()
            .parse_schema("customer.xsd", content, &ParseContext::default())
            .unwrap();
        assert_eq!(schema.metadata.get("dialect"), Some(&"xsd".into()));
        let id = schema.field("id").unwrap();
        assert_eq!(id.normalized_type, NormalizedType::Integer);
        assert_eq!(id.entity.as_deref(), Some("customer"));
        assert!(!schema.field("email").unwrap().required);
        assert!(schema.field("address.city").is_some());
        assert!(schema.field("@status").unwrap().required);
    }

    #[test]
    fn test_deep_nesting_is_bounded() {
        let depth = 5000;
        let mut doc = String::new();
        for _ in 0..depth {
            doc.push_str("<a>");
        }
        for _ in 0..depth {
            doc.push_str("</a>");
        }
        let schema = XmlParser::new()
            .parse_schema("deep.xml", doc.as_bytes(), &ParseContext::default())
            .unwrap();
        assert!(schema.fields.iter().any(|f| f.field_type == "nested/truncated"));
    }
}
