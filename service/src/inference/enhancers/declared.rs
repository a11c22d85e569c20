use crate::budget::BudgetExceeded;
use crate::inference::{Evidence, FieldContext, TypeEnhancer};
use schemalens_core::{FieldInfo, NormalizedType};

/// Weight of a type declared by a schema-definition format
pub const SCHEMA_DECLARED_WEIGHT: f64 = 0.6;

/// Weight of a type the parser observed in instance data
pub const INSTANCE_DECLARED_WEIGHT: f64 = 0.35;

/// Seeds the parser's normalized type
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclaredTypeEnhancer;

impl TypeEnhancer for DeclaredTypeEnhancer {
    fn name(&self) -> &'static str {
        "declared"
    }

    fn priority(&self) -> u32 {
        0
    }

    fn enhance(
        &self,
        field: &FieldInfo,
        ctx: &FieldContext<'_>,
        evidence: &mut Evidence,
    ) -> Result<(), BudgetExceeded> {
        let declared = field.normalized_type;
        if declared == NormalizedType::Unknown {
            return Ok(());
        }
        let (weight, origin) = if ctx.schema.format_type.is_schema_definition() {
            (SCHEMA_DECLARED_WEIGHT, "declared")
        } else {
            (INSTANCE_DECLARED_WEIGHT, "observed")
        };
        evidence.support(declared, "declared_type", weight, self.name());
        evidence.note(
            self.name(),
            format!("{origin} as {} ({declared})", field.field_type),
        );
        Ok(())
    }
}
