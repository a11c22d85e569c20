use crate::budget::BudgetExceeded;
use crate::inference::patterns::{VALUE_PATTERNS, matches};
use crate::inference::{Evidence, FieldContext, TypeEnhancer};
use crate::parsers::values::{ValueKind, fold_kinds, infer_json, infer_text};
use schemalens_core::{FieldInfo, NormalizedType, Value};

const PATTERN_WEIGHT: f64 = 0.5;
const VALUE_WEIGHT: f64 = 0.3;
const LEXICAL_WEIGHT: f64 = 0.2;

/// Minimum fraction of samples matching before a pattern is reported
const PATTERN_MIN_FRACTION: f64 = 0.5;

fn normalized_kind(kind: ValueKind) -> Option<NormalizedType> {
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

/// Matches sampled values against semantic patterns and the value inferencer
#[derive(Debug, Default, Clone, Copy)]
pub struct PatternEnhancer;

impl TypeEnhancer for PatternEnhancer {
    fn name(&self) -> &'static str {
        "pattern"
    }

    fn priority(&self) -> u32 {
        20
    }

    fn enhance(
        &self,
        _field: &FieldInfo,
        ctx: &FieldContext<'_>,
        evidence: &mut Evidence,
    ) -> Result<(), BudgetExceeded> {
        if ctx.samples.is_empty() {
            return Ok(());
        }
        let textual = ctx.textual_samples();
        let mut kinds = Vec::with_capacity(ctx.samples.len());
        let mut strings: Vec<&str> = Vec::new();
        for value in ctx.samples {
            ctx.check()?;
            let kind = match value {
                Value::String(s) if textual => infer_text(s),
                other => infer_json(other),
            };
            kinds.push(kind);
            if let Value::String(s) = value {
                strings.push(s.as_str());
            }
        }

        let total = ctx.samples.len() as f64;
        for pattern in VALUE_PATTERNS {
            ctx.check()?;
            let hits = strings.iter().filter(|s| matches(pattern, s)).count();
            let fraction = hits as f64 / total;
            if hits == 0 || fraction < PATTERN_MIN_FRACTION {
                continue;
            }
            evidence.add_pattern(pattern);
            evidence.support(pattern.implied_type(), "pattern_match", PATTERN_WEIGHT * fraction, self.name());
            evidence.note(
                self.name(),
                format!("{hits}/{} samples match {pattern:?}", ctx.samples.len()),
            );
        }

        let observed: Vec<ValueKind> = kinds.iter().copied().filter(|k| *k != ValueKind::Null).collect();
        if observed.is_empty() {
            return Ok(());
        }
        let common = fold_kinds(observed.iter().copied());
        let agreement = observed.iter().filter(|k| **k == common).count() as f64 / observed.len() as f64;
        if let Some(ty) = normalized_kind(common) {
            evidence.support(ty, "value_inference", VALUE_WEIGHT * agreement, self.name());
            evidence.note(
                self.name(),
                format!("values read as {ty} ({:.0}% agreement)", agreement * 100.0),
            );
        }

        // non-numeric text keeps string as a plausible reading
        let lexical = kinds
            .iter()
            .zip(ctx.samples)
            .filter(|(kind, value)| {
                value.is_string()
                    && !matches!(kind, ValueKind::Integer | ValueKind::Float | ValueKind::Boolean | ValueKind::Null)
            })
            .count();
        if lexical > 0 && common != ValueKind::String {
            evidence.support(
                NormalizedType::String,
                "lexical_string",
                LEXICAL_WEIGHT * lexical as f64 / total,
                self.name(),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::ExecutionBudget;
    use schemalens_core::{FormatType, SchemaDetails, SemanticPattern};

    fn run(format: FormatType, raw: &str, values: &[Value]) -> schemalens_core::EnhancedTypeInfo {
        let field = FieldInfo::new("value", raw);
        let schema = SchemaDetails::new(format, "t", "t");
        let budget = ExecutionBudget::unbounded();
        let samples: Vec<&Value> = values.iter().collect();
        let ctx = FieldContext {
            schema: &schema,
            samples: &samples,
            budget: &budget,
        };
        let mut evidence = Evidence::new(field.normalized_type);
        PatternEnhancer.enhance(&field, &ctx, &mut evidence).unwrap();
        evidence.finish(0.1)
    }

    #[test]
    fn test_date_strings_keep_string_alternative() {
        let values = vec![Value::from("2021-01-05"), Value::from("2021-02-11")];
        let info = run(FormatType::Csv, "date", &values);
        assert_eq!(info.primary_type, NormalizedType::Date);
        assert!(info.patterns.contains(&SemanticPattern::Date));
        assert!(info.alternative_score(NormalizedType::String).is_some());
    }

    #[test]
    fn test_csv_numbers_are_read_as_numbers() {
        let values = vec![Value::from("10"), Value::from("11")];
        let info = run(FormatType::Csv, "integer", &values);
        assert_eq!(info.primary_type, NormalizedType::Integer);
        assert!(info.possible_alternatives.is_empty());
    }

    #[test]
    fn test_partial_pattern_match_scales() {
        let values = vec![
            Value::from("a@x.io"),
            Value::from("b@x.io"),
            Value::from("c@x.io"),
            Value::from("not an email"),
        ];
        let info = run(FormatType::Json, "string", &values);
        assert!(info.patterns.contains(&SemanticPattern::Email));
        assert_eq!(info.primary_type, NormalizedType::String);
    }
}
