use crate::budget::BudgetExceeded;
use crate::inference::{Evidence, FieldContext, TypeEnhancer};
use schemalens_core::normalize::normalize_raw_type;
use schemalens_core::{FieldInfo, NormalizedType, SemanticPattern};

/// Contribution of an authoritative format keyword, which also fixes the
/// primary type
const OVERRIDE_WEIGHT: f64 = 0.75;
const HINT_WEIGHT: f64 = 0.1;
const ENUM_WEIGHT: f64 = 0.15;

fn format_pattern(format: &str) -> Option<SemanticPattern> {
    match format.to_ascii_lowercase().as_str() {
        "email" | "idn-email" => Some(SemanticPattern::Email),
        "uuid" => Some(SemanticPattern::Uuid),
        "uri" | "url" | "iri" | "uri-reference" => Some(SemanticPattern::Url),
        "ipv4" | "ipv6" => Some(SemanticPattern::IpAddress),
        "date" => Some(SemanticPattern::Date),
        "date-time" | "datetime" => Some(SemanticPattern::Datetime),
        "phone" | "tel" => Some(SemanticPattern::PhoneNumber),
        _ => None,
    }
}

/// Uses declared constraints: format keywords override, enums, ranges and
/// lengths corroborate
#[derive(Debug, Default, Clone, Copy)]
pub struct ConstraintEnhancer;

impl TypeEnhancer for ConstraintEnhancer {
    fn name(&self) -> &'static str {
        "constraint"
    }

    fn priority(&self) -> u32 {
        30
    }

    fn enhance(
        &self,
        field: &FieldInfo,
        _ctx: &FieldContext<'_>,
        evidence: &mut Evidence,
    ) -> Result<(), BudgetExceeded> {
        let constraints = &field.constraints;
        let declared = evidence.declared();

        if let Some(format) = constraints.format.as_deref() {
            let pattern = format_pattern(format);
            if let Some(pattern) = pattern {
                evidence.add_pattern(pattern);
            }
            let implied = match normalize_raw_type(format) {
                NormalizedType::Unknown => pattern.map(|p| p.implied_type()),
                ty => Some(ty),
            };
            if let Some(ty) = implied {
                evidence.fix_type(ty, "constraint_match", OVERRIDE_WEIGHT, self.name());
                evidence.note(self.name(), format!("format '{format}' fixes the type as {ty}"));
            }
        }

        if !constraints.enum_values.is_empty() {
            let all_integers = constraints.enum_values.iter().all(|v| v.parse::<i64>().is_ok());
            let ty = if all_integers && declared != NormalizedType::String {
                NormalizedType::Integer
            } else {
                NormalizedType::String
            };
            evidence.support(ty, "constraint_match", ENUM_WEIGHT, self.name());
            evidence.note(
                self.name(),
                format!("enumerated values ({})", constraints.enum_values.len()),
            );
        }

        if constraints.minimum.is_some() || constraints.maximum.is_some() {
            let ty = if declared.is_numeric() { declared } else { NormalizedType::Float };
            evidence.support(ty, "constraint_match", HINT_WEIGHT, self.name());
            evidence.note(self.name(), "numeric range declared");
        }

        if constraints.max_length.is_some() || constraints.min_length.is_some() || constraints.pattern.is_some() {
            let ty = if declared == NormalizedType::Unknown || declared == NormalizedType::String {
                NormalizedType::String
            } else {
                declared
            };
            evidence.support(ty, "constraint_match", HINT_WEIGHT, self.name());
            evidence.note(self.name(), "length or pattern constraint declared");
        }

        if constraints.references.is_some() || field.is_unique() {
            evidence.add_pattern(SemanticPattern::Id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::ExecutionBudget;
    use crate::inference::enhancers::{DeclaredTypeEnhancer, NameEnhancer};
    use schemalens_core::{FieldConstraints, FormatType, SchemaDetails};

    #[test]
    fn test_format_keyword_beats_name_heuristic() {
        // named like a date, declared as a date-time string
        let field = FieldInfo::new("birth_date", "string").with_constraints(FieldConstraints {
            format: Some("date-time".to_string()),
            ..FieldConstraints::default()
        });
        let schema = SchemaDetails::new(FormatType::JsonSchema, "p", "p.json");
        let budget = ExecutionBudget::unbounded();
        let ctx = FieldContext {
            schema: &schema,
            samples: &[],
            budget: &budget,
        };
        let mut evidence = Evidence::new(field.normalized_type);
        for enhancer in [&DeclaredTypeEnhancer as &dyn TypeEnhancer, &NameEnhancer, &ConstraintEnhancer] {
            enhancer.enhance(&field, &ctx, &mut evidence).unwrap();
        }
        let info = evidence.finish(0.1);
        assert_eq!(info.primary_type, NormalizedType::Datetime);
        assert_eq!(info.confidence.detection_method, "constraint");
        assert!(info.patterns.contains(&SemanticPattern::Datetime));
        assert!(info.alternative_score(NormalizedType::String).is_some());
    }

    #[test]
    fn test_format_keyword_survives_enum_and_length_hints() {
        let field = FieldInfo::new("shipped", "string").with_constraints(FieldConstraints {
            format: Some("date".to_string()),
            enum_values: vec!["2024-01-01".to_string(), "2024-06-30".to_string()],
            max_length: Some(10),
            ..FieldConstraints::default()
        });
        let schema = SchemaDetails::new(FormatType::JsonSchema, "p", "p.json");
        let budget = ExecutionBudget::unbounded();
        let ctx = FieldContext {
            schema: &schema,
            samples: &[],
            budget: &budget,
        };
        let mut evidence = Evidence::new(field.normalized_type);
        for enhancer in [&DeclaredTypeEnhancer as &dyn TypeEnhancer, &NameEnhancer, &ConstraintEnhancer] {
            enhancer.enhance(&field, &ctx, &mut evidence).unwrap();
        }
        let info = evidence.finish(0.1);
        assert_eq!(info.primary_type, NormalizedType::Date);
        assert_eq!(info.confidence.detection_method, "constraint");
        let string = info.alternative_score(NormalizedType::String).unwrap();
        assert!(string < info.confidence.score);
        assert!(info.is_consistent());
    }
}
