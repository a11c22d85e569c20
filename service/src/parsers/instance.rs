//! Field extraction from instance records
//!
//! JSON, YAML and XML instance documents carry records rather than type
//! declarations. This module merges the records' keys in first-seen order,
//! infers a raw type per field from the observed values and flattens nested
//! objects into dotted names.

use super::values::{ValueKind, fold_kinds, infer_json};
use crate::detection::{ParseContext, ParseResult, SampleRecord};
use indexmap::IndexMap;
use schemalens_core::FieldInfo;
use serde_json::Value;
use std::collections::HashSet;

#[derive(Debug, Default)]
struct FieldStats {
    kinds: Vec<ValueKind>,
    element_kinds: Vec<ValueKind>,
    present: usize,
    nulls: usize,
    distinct: HashSet<String>,
    parent: Option<String>,
    truncated: bool,
}

/// Accumulates field statistics over a sequence of records
#[derive(Debug)]
pub struct InstanceSchemaBuilder<'a> {
    ctx: &'a ParseContext,
    fields: IndexMap<String, FieldStats>,
    records: usize,
}

impl<'a> InstanceSchemaBuilder<'a> {
    /// Builder bounded by the context's nesting depth and budget
    #[must_use]
    pub fn new(ctx: &'a ParseContext) -> Self {
        Self {
            ctx,
            fields: IndexMap::new(),
            records: 0,
        }
    }

    /// Number of records observed
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records
    }

    /// Observe one record; non-object values are recorded under `value`
    ///
    /// # Errors
    ///
    /// Returns the budget error when the parse deadline passes
    pub fn observe(&mut self, record: &Value) -> ParseResult<()> {
        self.ctx.check()?;
        self.records += 1;
        match record {
            Value::Object(map) => self.visit_object(None, map, 0),
            other => {
                self.observe_value("value", None, other);
                Ok(())
            }
        }
    }

    fn visit_object(
        &mut self,
        prefix: Option<&str>,
        map: &serde_json::Map<String, Value>,
        depth: usize,
    ) -> ParseResult<()> {
        self.ctx.check()?;
        for (key, value) in map {
            let name = match prefix {
                Some(p) => format!("{p}.{key}"),
                None => key.clone(),
            };
            self.observe_value(&name, prefix, value);
            if let Value::Object(child) = value {
                if depth + 1 < self.ctx.max_nesting_depth {
                    self.visit_object(Some(&name), child, depth + 1)?;
                } else if let Some(stats) = self.fields.get_mut(&name) {
                    stats.truncated = true;
                }
            }
        }
        Ok(())
    }

    fn observe_value(&mut self, name: &str, parent: Option<&str>, value: &Value) {
        let stats = self.fields.entry(name.to_string()).or_default();
        if stats.parent.is_none() {
            stats.parent = parent.map(str::to_string);
        }
        stats.present += 1;
        let kind = infer_json(value);
        if kind == ValueKind::Null {
            stats.nulls += 1;
            return;
        }
        stats.kinds.push(kind);
        match value {
            Value::Array(items) => {
                stats
                    .element_kinds
                    .extend(items.iter().map(infer_json).filter(|k| *k != ValueKind::Null));
            }
            Value::Object(_) => {}
            scalar => {
                stats.distinct.insert(scalar.to_string());
            }
        }
    }

    /// Produce fields in first-seen order
    #[must_use]
    pub fn finish(self) -> Vec<FieldInfo> {
        let records = self.records;
        self.fields
            .into_iter()
            .map(|(name, stats)| build_field(name, stats, records))
            .collect()
    }
}

fn build_field(name: String, stats: FieldStats, records: usize) -> FieldInfo {
    let kind = fold_kinds(stats.kinds.iter().copied());
    let raw = if stats.truncated {
        "nested/truncated".to_string()
    } else if kind == ValueKind::Array {
        let element = fold_kinds(stats.element_kinds.iter().copied());
        let homogeneous = stats
            .element_kinds
            .first()
            .is_some_and(|first| stats.element_kinds.iter().all(|k| k == first));
        if homogeneous {
            format!("array<{}>", element.raw_type())
        } else {
            "array".to_string()
        }
    } else {
        kind.raw_type().to_string()
    };

    let non_null = stats.present - stats.nulls;
    let unique = non_null > 0 && stats.distinct.len() == non_null;
    let is_top_level = stats.parent.is_none();
    let required = is_top_level && stats.present == records && records > 0;

    let mut field = FieldInfo::new(name, raw)
        .nullable(stats.nulls > 0 || stats.present < records)
        .required(required && stats.nulls == 0);
    if let Some(parent) = stats.parent {
        field = field.with_parent(parent);
    }
    if stats.truncated {
        field = field.with_metadata("truncated", true);
    }
    if field.name.eq_ignore_ascii_case("id") && unique && required {
        field = field.primary_key();
    } else if unique && records > 1 {
        field.metadata.insert("sample_unique".to_string(), true.into());
    }
    field
}

/// Flatten a record into a sample keyed by qualified field name
#[must_use]
pub fn flatten_sample(record: &Value, max_depth: usize) -> SampleRecord {
    let mut out = SampleRecord::new();
    match record {
        Value::Object(map) => flatten_into(None, map, 0, max_depth, &mut out),
        other => {
            out.insert("value".to_string(), other.clone());
        }
    }
    out
}

fn flatten_into(
    prefix: Option<&str>,
    map: &serde_json::Map<String, Value>,
    depth: usize,
    max_depth: usize,
    out: &mut SampleRecord,
) {
    for (key, value) in map {
        let name = match prefix {
            Some(p) => format!("{p}.{key}"),
            None => key.clone(),
        };
        if let Value::Object(child) = value {
            if depth + 1 < max_depth {
                flatten_into(Some(&name), child, depth + 1, max_depth, out);
            }
        }
        out.insert(name, value.clone());
    }
}
