use crate::budget::BudgetExceeded;
use crate::inference::{Evidence, FieldContext, TypeEnhancer};
use schemalens_core::naming::{is_key_like, to_snake_case};
use schemalens_core::{FieldInfo, NormalizedType, SemanticPattern};

const NAME_WEIGHT: f64 = 0.25;
const KEY_WEIGHT: f64 = 0.2;

#[derive(Clone, Copy)]
enum Rule {
    Exact(&'static str),
    Prefix(&'static str),
    Suffix(&'static str),
}

impl Rule {
    fn matches(self, name: &str) -> bool {
        match self {
            Self::Exact(word) => name == word,
            Self::Prefix(prefix) => name.starts_with(prefix),
            Self::Suffix(suffix) => name.ends_with(suffix),
        }
    }
}

/// Name vocabularies and the type each one suggests
const VOCABULARY: &[(NormalizedType, &[Rule])] = &[
    (
        NormalizedType::Datetime,
        &[
            Rule::Suffix("_at"),
            Rule::Suffix("_time"),
            Rule::Suffix("_timestamp"),
            Rule::Exact("timestamp"),
            Rule::Exact("created"),
            Rule::Exact("updated"),
        ],
    ),
    (
        NormalizedType::Date,
        &[
            Rule::Suffix("_date"),
            Rule::Suffix("_on"),
            Rule::Exact("date"),
            Rule::Exact("dob"),
            Rule::Exact("birthday"),
        ],
    ),
    (
        NormalizedType::Boolean,
        &[
            Rule::Prefix("is_"),
            Rule::Prefix("has_"),
            Rule::Prefix("can_"),
            Rule::Suffix("_flag"),
            Rule::Exact("active"),
            Rule::Exact("enabled"),
            Rule::Exact("deleted"),
        ],
    ),
    (
        NormalizedType::Float,
        &[
            Rule::Exact("price"),
            Rule::Exact("amount"),
            Rule::Exact("cost"),
            Rule::Exact("total"),
            Rule::Exact("balance"),
            Rule::Suffix("_price"),
            Rule::Suffix("_amount"),
            Rule::Suffix("_rate"),
            Rule::Suffix("_ratio"),
            Rule::Suffix("_percent"),
            Rule::Exact("latitude"),
            Rule::Exact("longitude"),
        ],
    ),
    (
        NormalizedType::Integer,
        &[
            Rule::Suffix("_count"),
            Rule::Prefix("num_"),
            Rule::Exact("count"),
            Rule::Exact("quantity"),
            Rule::Exact("qty"),
            Rule::Exact("age"),
            Rule::Exact("year"),
            Rule::Exact("size"),
        ],
    ),
    (
        NormalizedType::String,
        &[
            Rule::Exact("email"),
            Rule::Suffix("_email"),
            Rule::Exact("url"),
            Rule::Suffix("_url"),
            Rule::Exact("uri"),
            Rule::Exact("website"),
            Rule::Exact("phone"),
            Rule::Suffix("_phone"),
            Rule::Exact("name"),
            Rule::Suffix("_name"),
            Rule::Exact("title"),
            Rule::Exact("description"),
            Rule::Exact("ip_address"),
            Rule::Exact("uuid"),
        ],
    ),
];

/// Biases the type from naming conventions (`_id`, `_at`, `is_`, `email`)
#[derive(Debug, Default, Clone, Copy)]
pub struct NameEnhancer;

impl TypeEnhancer for NameEnhancer {
    fn name(&self) -> &'static str {
        "name"
    }

    fn priority(&self) -> u32 {
        10
    }

    fn enhance(
        &self,
        field: &FieldInfo,
        _ctx: &FieldContext<'_>,
        evidence: &mut Evidence,
    ) -> Result<(), BudgetExceeded> {
        let name = to_snake_case(field.local_name());

        if is_key_like(&name) || field.is_primary_key {
            evidence.add_pattern(SemanticPattern::Id);
            // identifiers are integers or opaque strings
            let key_type = match evidence.declared() {
                NormalizedType::String => NormalizedType::String,
                _ if name.ends_with("_uuid") || name.ends_with("_code") => NormalizedType::String,
                _ => NormalizedType::Integer,
            };
            evidence.support(key_type, "name_pattern_match", KEY_WEIGHT, self.name());
            evidence.note(self.name(), format!("'{name}' names an identifier"));
            return Ok(());
        }

        for (ty, rules) in VOCABULARY {
            if rules.iter().any(|rule| rule.matches(&name)) {
                evidence.support(*ty, "name_pattern_match", NAME_WEIGHT, self.name());
                evidence.note(self.name(), format!("'{name}' suggests {ty}"));
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::ExecutionBudget;
    use schemalens_core::{FormatType, SchemaDetails};

    fn run(name: &str, raw: &str) -> schemalens_core::EnhancedTypeInfo {
        let field = FieldInfo::new(name, raw);
        let schema = SchemaDetails::new(FormatType::Csv, "t", "t.csv");
        let budget = ExecutionBudget::unbounded();
        let ctx = FieldContext {
            schema: &schema,
            samples: &[],
            budget: &budget,
        };
        let mut evidence = Evidence::new(field.normalized_type);
        NameEnhancer.enhance(&field, &ctx, &mut evidence).unwrap();
        evidence.finish(0.1)
    }

    #[test]
    fn test_vocabulary() {
        assert_eq!(run("created_at", "").primary_type, NormalizedType::Datetime);
        assert_eq!(run("birth_date", "").primary_type, NormalizedType::Date);
        assert_eq!(run("isActive", "").primary_type, NormalizedType::Boolean);
        assert_eq!(run("unit_price", "").primary_type, NormalizedType::Float);
        assert_eq!(run("notes", "").primary_type, NormalizedType::Unknown);
    }

    #[test]
    fn test_identifiers() {
        let info = run("user_id", "integer");
        assert_eq!(info.primary_type, NormalizedType::Integer);
        assert!(info.patterns.contains(&SemanticPattern::Id));
        assert_eq!(run("order_uuid", "").primary_type, NormalizedType::String);
    }
}
