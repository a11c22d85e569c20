use crate::budget::BudgetExceeded;
use crate::inference::{Evidence, FieldContext, TypeEnhancer};
use crate::parsers::values::{ValueKind, infer_json};
use schemalens_core::normalize::{array_element_type, map_key_value_types, normalize_raw_type};
use schemalens_core::{FieldInfo, Homogeneity, NormalizedType, StructureInfo, Value};
use std::collections::BTreeSet;

const STRUCTURE_WEIGHT: f64 = 0.3;

fn kind_type(kind: ValueKind) -> Option<NormalizedType> {
    match kind {
        ValueKind::Null => None,
        ValueKind::Boolean => Some(NormalizedType::Boolean),
        ValueKind::Integer => Some(NormalizedType::Integer),
        ValueKind::Float => Some(NormalizedType::Float),
        ValueKind::Date => Some(NormalizedType::Date),
        ValueKind::Datetime => Some(NormalizedType::Datetime),
        ValueKind::String => Some(NormalizedType::String),
        ValueKind::Array => Some(NormalizedType::Array),
        ValueKind::Object => Some(NormalizedType::Object),
    }
}

fn known(raw: &str) -> Option<NormalizedType> {
    Some(normalize_raw_type(raw)).filter(|t| *t != NormalizedType::Unknown)
}

/// Element types seen across a set of collection values
fn observe<'v, I>(values: I, ctx: &FieldContext<'_>) -> Result<(BTreeSet<NormalizedType>, usize), BudgetExceeded>
where
    I: IntoIterator<Item = &'v Value>,
{
    let mut observed = BTreeSet::new();
    let mut count = 0;
    for value in values {
        ctx.check()?;
        count += 1;
        if let Some(ty) = kind_type(infer_json(value)) {
            observed.insert(ty);
        }
    }
    Ok((observed, count))
}

fn homogeneity(observed: &BTreeSet<NormalizedType>, count: usize) -> Homogeneity {
    if count == 0 {
        Homogeneity::Empty
    } else if observed.len() <= 1 {
        Homogeneity::Homogeneous
    } else {
        Homogeneity::Heterogeneous
    }
}

/// Classifies arrays, maps and objects: element and key types, homogeneity,
/// properties
#[derive(Debug, Default, Clone, Copy)]
pub struct StructureEnhancer;

impl StructureEnhancer {
    fn array(
        &self,
        field: &FieldInfo,
        ctx: &FieldContext<'_>,
        evidence: &mut Evidence,
    ) -> Result<(), BudgetExceeded> {
        let declared_element = array_element_type(&field.field_type).and_then(known);
        let arrays: Vec<&Value> = ctx
            .samples
            .iter()
            .filter_map(|v| v.as_array())
            .flatten()
            .collect();
        let sampled = ctx.samples.iter().any(|v| v.is_array());
        let (observed, count) = observe(arrays, ctx)?;
        let homogeneity = sampled.then(|| homogeneity(&observed, count));
        let element_type = declared_element.or_else(|| {
            (homogeneity == Some(Homogeneity::Homogeneous))
                .then(|| observed.iter().next().copied())
                .flatten()
        });

        evidence.support(NormalizedType::Array, "structure_match", STRUCTURE_WEIGHT, self.name());
        evidence.note(
            self.name(),
            match (element_type, homogeneity) {
                (Some(t), Some(Homogeneity::Heterogeneous)) => format!("array of {t} with mixed sampled elements"),
                (Some(t), _) => format!("array of {t}"),
                (None, Some(Homogeneity::Heterogeneous)) => "heterogeneous array".to_string(),
                (None, _) => "array".to_string(),
            },
        );
        evidence.set_structure(StructureInfo {
            element_type,
            key_type: None,
            homogeneity,
            observed_types: observed.into_iter().collect(),
            properties: Vec::new(),
        });
        Ok(())
    }

    fn map(&self, field: &FieldInfo, ctx: &FieldContext<'_>, evidence: &mut Evidence) -> Result<(), BudgetExceeded> {
        let declared = map_key_value_types(&field.field_type);
        let key_type = declared.and_then(|(k, _)| known(k)).or(Some(NormalizedType::String));
        let declared_value = declared.and_then(|(_, v)| known(v));
        let sampled = ctx.samples.iter().any(|v| v.is_object());
        let values = ctx
            .samples
            .iter()
            .filter_map(|v| v.as_object())
            .flat_map(|m| m.values());
        let (observed, count) = observe(values, ctx)?;
        let homogeneity = sampled.then(|| homogeneity(&observed, count));
        let element_type = declared_value.or_else(|| {
            (homogeneity == Some(Homogeneity::Homogeneous))
                .then(|| observed.iter().next().copied())
                .flatten()
        });

        evidence.support(NormalizedType::Map, "structure_match", STRUCTURE_WEIGHT, self.name());
        evidence.note(
            self.name(),
            format!(
                "map of {} to {}",
                key_type.map_or("unknown", |t| t.as_str()),
                element_type.map_or("unknown", |t| t.as_str())
            ),
        );
        evidence.set_structure(StructureInfo {
            element_type,
            key_type,
            homogeneity,
            observed_types: observed.into_iter().collect(),
            properties: Vec::new(),
        });
        Ok(())
    }

    fn object(
        &self,
        field: &FieldInfo,
        ctx: &FieldContext<'_>,
        evidence: &mut Evidence,
    ) -> Result<(), BudgetExceeded> {
        let mut properties: Vec<String> = ctx
            .schema
            .fields
            .iter()
            .filter(|f| f.parent.as_deref() == Some(field.name.as_str()) && f.entity == field.entity)
            .map(|f| f.local_name().to_string())
            .collect();
        if properties.is_empty() {
            for object in ctx.samples.iter().filter_map(|v| v.as_object()) {
                ctx.check()?;
                for key in object.keys() {
                    if !properties.contains(key) {
                        properties.push(key.clone());
                    }
                }
            }
        }
        evidence.support(NormalizedType::Object, "structure_match", STRUCTURE_WEIGHT, self.name());
        evidence.note(self.name(), format!("object with {} properties", properties.len()));
        evidence.set_structure(StructureInfo {
            element_type: None,
            key_type: None,
            homogeneity: None,
            observed_types: Vec::new(),
            properties,
        });
        Ok(())
    }
}

impl TypeEnhancer for StructureEnhancer {
    fn name(&self) -> &'static str {
        "structure"
    }

    fn priority(&self) -> u32 {
        40
    }

    fn enhance(
        &self,
        field: &FieldInfo,
        ctx: &FieldContext<'_>,
        evidence: &mut Evidence,
    ) -> Result<(), BudgetExceeded> {
        let shape = match field.normalized_type {
            NormalizedType::Array | NormalizedType::Map | NormalizedType::Object => field.normalized_type,
            _ if !ctx.samples.is_empty() && ctx.samples.iter().all(|v| v.is_array()) => NormalizedType::Array,
            _ => return Ok(()),
        };
        match shape {
            NormalizedType::Array => self.array(field, ctx, evidence),
            NormalizedType::Map => self.map(field, ctx, evidence),
            _ => self.object(field, ctx, evidence),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::ExecutionBudget;
    use schemalens_core::{FormatType, SchemaDetails};
    use serde_json::json;

    fn run(field: &FieldInfo, values: &[Value]) -> schemalens_core::EnhancedTypeInfo {
        let mut schema = SchemaDetails::new(FormatType::Json, "t", "t.json");
        schema.push_field(field.clone());
        schema.push_field(FieldInfo::new("address.city", "string").with_parent("address"));
        let budget = ExecutionBudget::unbounded();
        let samples: Vec<&Value> = values.iter().collect();
        let ctx = FieldContext {
            schema: &schema,
            samples: &samples,
            budget: &budget,
        };
        let mut evidence = Evidence::new(field.normalized_type);
        StructureEnhancer.enhance(field, &ctx, &mut evidence).unwrap();
        evidence.finish(0.1)
    }

    #[test]
    fn test_array_homogeneity() {
        let field = FieldInfo::new("tags", "array");
        let info = run(&field, &[json!(["a", "b"]), json!(["c"])]);
        let structure = info.structure.unwrap();
        assert_eq!(structure.homogeneity, Some(Homogeneity::Homogeneous));
        assert_eq!(structure.element_type, Some(NormalizedType::String));

        let info = run(&field, &[json!([1, "b"])]);
        assert_eq!(info.structure.unwrap().homogeneity, Some(Homogeneity::Heterogeneous));
    }

    #[test]
    fn test_declared_element_and_map_types() {
        let info = run(&FieldInfo::new("ids", "array<int>"), &[]);
        let structure = info.structure.unwrap();
        assert_eq!(structure.element_type, Some(NormalizedType::Integer));
        assert_eq!(structure.homogeneity, None);

        let info = run(&FieldInfo::new("scores", "map<string, double>"), &[]);
        let structure = info.structure.unwrap();
        assert_eq!(structure.key_type, Some(NormalizedType::String));
        assert_eq!(structure.element_type, Some(NormalizedType::Float));
    }

    #[test]
    fn test_object_properties_from_children() {
        let info = run(&FieldInfo::new("address", "object"), &[]);
        assert_eq!(info.primary_type, NormalizedType::Object);
        assert_eq!(info.structure.unwrap().properties, vec!["city"]);
    }
}
