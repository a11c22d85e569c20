//! Arena representation of nested and self-referential type definitions
//!
//! Structural parsers (Avro, Protobuf, GraphQL, JSON Schema, XSD) first
//! register every record-like definition as a node in a flat table, then
//! flatten each entity into dotted field names. Members point at other nodes
//! by [`NodeId`] or by declared name, so recursive definitions never form an
//! ownership cycle. Flattening is bounded by a depth counter and an on-path
//! set: a cycle yields a `ref:<Name>` field, a level deeper than the limit
//! yields a `nested/truncated` field.

use crate::detection::{ParseContext, ParseResult};
use schemalens_core::{FieldInfo, NormalizedType, normalize::normalize_raw_type};
use std::collections::HashMap;

/// Index of a node in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Where a member's nested structure lives
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// Node already allocated
    Node(NodeId),
    /// Named definition, resolved at flatten time (forward references)
    Named(String),
}

/// One member of a record node
#[derive(Debug, Clone)]
pub struct Member {
    /// Field template; the name is the unqualified member name
    pub field: FieldInfo,
    /// Nested record this member expands into
    pub target: Option<Target>,
}

impl Member {
    /// Scalar member
    #[must_use]
    pub fn scalar(field: FieldInfo) -> Self {
        Self { field, target: None }
    }

    /// Member that expands into a nested record
    #[must_use]
    pub fn nested(field: FieldInfo, target: Target) -> Self {
        Self {
            field,
            target: Some(target),
        }
    }
}

/// A record-like definition
#[derive(Debug, Clone, Default)]
pub struct RecordNode {
    /// Declared or generated name
    pub name: String,
    /// Members in declaration order
    pub members: Vec<Member>,
}

/// Flat table of record definitions
#[derive(Debug, Default)]
pub struct TypeArena {
    nodes: Vec<RecordNode>,
    by_name: HashMap<String, NodeId>,
}

impl TypeArena {
    /// Empty arena
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an anonymous node
    pub fn alloc(&mut self, name: impl Into<String>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(RecordNode {
            name: name.into(),
            members: Vec::new(),
        });
        id
    }

    /// Allocate a node reachable by name; an existing name is reused
    pub fn declare(&mut self, name: &str) -> NodeId {
        if let Some(id) = self.by_name.get(name) {
            return *id;
        }
        let id = self.alloc(name);
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Append a member to a node
    pub fn push_member(&mut self, node: NodeId, member: Member) {
        if let Some(record) = self.nodes.get_mut(node.0) {
            record.members.push(member);
        }
    }

    /// Node by id
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&RecordNode> {
        self.nodes.get(id.0)
    }

    /// Node id by declared name, also trying the last dotted segment
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied().or_else(|| {
            name.rsplit('.')
                .next()
                .and_then(|short| self.by_name.get(short).copied())
        })
    }

    /// Whether a name is declared
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    fn resolve(&self, target: &Target) -> Option<NodeId> {
        match target {
            Target::Node(id) => Some(*id),
            Target::Named(name) => self.lookup(name),
        }
    }

    /// Flatten one entity rooted at `root` into qualified fields.
    ///
    /// `entity` tags every produced field; pass `None` for single-entity
    /// files.
    ///
    /// # Errors
    ///
    /// Returns the budget error if the parse deadline passes or the run is
    /// cancelled mid-walk
    pub fn flatten(
        &self,
        root: NodeId,
        entity: Option<&str>,
        ctx: &ParseContext,
    ) -> ParseResult<Vec<FieldInfo>> {
        let mut out = Vec::new();
        let mut on_path = vec![root];
        self.walk(root, None, 0, entity, ctx, &mut on_path, &mut out)?;
        Ok(out)
    }

    #[allow(clippy::too_many_arguments)]
    fn walk(
        &self,
        node: NodeId,
        prefix: Option<&str>,
        depth: usize,
        entity: Option<&str>,
        ctx: &ParseContext,
        on_path: &mut Vec<NodeId>,
        out: &mut Vec<FieldInfo>,
    ) -> ParseResult<()> {
        ctx.check()?;
        let Some(record) = self.node(node) else {
            return Ok(());
        };
        for member in &record.members {
            let qualified = match prefix {
                Some(p) => format!("{p}.{}", member.field.name),
                None => member.field.name.clone(),
            };
            let mut field = member.field.clone();
            field.name.clone_from(&qualified);
            if let Some(p) = prefix {
                field.parent = Some(p.to_string());
            }
            if let Some(e) = entity {
                field.entity = Some(e.to_string());
            }

            let child = member.target.as_ref().and_then(|t| self.resolve(t));
            let Some(child) = child else {
                out.push(field);
                continue;
            };

            if on_path.contains(&child) {
                let name = self.node(child).map_or("", |n| n.name.as_str());
                out.push(marker(field, &format!("ref:{name}"), "recursive"));
                continue;
            }
            if depth + 1 >= ctx.max_nesting_depth {
                out.push(marker(field, "nested/truncated", "truncated"));
                continue;
            }

            out.push(field);
            on_path.push(child);
            let result = self.walk(child, Some(&qualified), depth + 1, entity, ctx, on_path, out);
            on_path.pop();
            result?;
        }
        Ok(())
    }
}

/// Replace the raw type with a flattener marker, keeping collection shape
fn marker(mut field: FieldInfo, raw: &str, flag: &str) -> FieldInfo {
    let declared = std::mem::replace(&mut field.field_type, raw.to_string());
    let shape = field.normalized_type;
    field.normalized_type = match shape {
        NormalizedType::Array | NormalizedType::Map => shape,
        _ => normalize_raw_type(raw),
    };
    field.metadata.insert(flag.to_string(), true.into());
    field.metadata.insert("declared_type".to_string(), declared.into());
    field
}
