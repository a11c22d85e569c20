//! Entity views over extracted schemas
//!
//! Relationships link entities, not files: a SQL file with three tables
//! yields three entities, a CSV file yields one.

use schemalens_core::naming::{singular_phrase, to_snake_case};
use schemalens_core::{FieldInfo, NormalizedType, SchemaDetails, entity_id};

/// How well two fields' types line up
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TypeCompatibility {
    /// Same normalized type, or equal raw types
    Exact,
    /// Different but joinable types
    Compatible,
    /// Not joinable
    Incompatible,
}

impl TypeCompatibility {
    /// Weight used by similarity measures
    #[must_use]
    pub fn weight(self) -> f64 {
        match self {
            Self::Exact => 1.0,
            Self::Compatible => 0.5,
            Self::Incompatible => 0.0,
        }
    }
}

fn normalized_compatibility(a: NormalizedType, b: NormalizedType) -> TypeCompatibility {
    use NormalizedType as T;
    if a == b {
        return TypeCompatibility::Exact;
    }
    match (a.min(b), a.max(b)) {
        // vocabulary order puts unknown last
        (_, T::Unknown)
        | (T::String, T::Integer)
        | (T::Integer, T::Float)
        | (T::Date, T::Datetime) => TypeCompatibility::Compatible,
        _ => TypeCompatibility::Incompatible,
    }
}

/// Compare two fields: enhanced types when both have them, raw type strings
/// otherwise
#[must_use]
pub fn compatibility(a: &FieldInfo, b: &FieldInfo) -> TypeCompatibility {
    match (&a.enhanced, &b.enhanced) {
        (Some(ea), Some(eb)) => normalized_compatibility(ea.primary_type, eb.primary_type),
        _ if a.field_type.eq_ignore_ascii_case(&b.field_type) => TypeCompatibility::Exact,
        _ => TypeCompatibility::Incompatible,
    }
}

/// One entity of one schema
#[derive(Debug, Clone)]
pub struct EntityView<'a> {
    /// Entity ID used in relationship records
    pub id: String,
    /// Entity name (table, message, type), or the schema name
    pub name: String,
    /// Owning schema
    pub schema: &'a SchemaDetails,
    /// Fields of this entity in schema order
    pub fields: Vec<&'a FieldInfo>,
}

impl<'a> EntityView<'a> {
    /// Top-level fields
    pub fn top_level(&self) -> impl Iterator<Item = &'a FieldInfo> + '_ {
        self.fields.iter().copied().filter(|f| f.parent.is_none())
    }

    /// Key fields: declared primary keys, else a top-level `id`
    #[must_use]
    pub fn keys(&self) -> Vec<&'a FieldInfo> {
        let declared: Vec<&FieldInfo> = self.top_level().filter(|f| f.is_primary_key).collect();
        if !declared.is_empty() {
            return declared;
        }
        self.top_level()
            .filter(|f| f.name.eq_ignore_ascii_case("id"))
            .collect()
    }

    /// Field by its name within the entity
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&'a FieldInfo> {
        self.fields.iter().copied().find(|f| f.name == name)
    }

    /// Whether `reference` (a table or type name) names this entity
    #[must_use]
    pub fn answers_to(&self, reference: &str) -> bool {
        let reference = to_snake_case(reference.rsplit('.').next().unwrap_or(reference));
        let own = to_snake_case(&self.name);
        reference == own || singular_phrase(&reference) == singular_phrase(&own)
    }
}

/// Split schemas into entities, in schema then first-appearance order
#[must_use]
pub fn entity_views(schemas: &[SchemaDetails]) -> Vec<EntityView<'_>> {
    let mut views = Vec::new();
    for schema in schemas {
        let entities = schema.entity_names();
        if entities.is_empty() {
            views.push(EntityView {
                id: entity_id(schema.id(), None),
                name: schema.name.clone(),
                schema,
                fields: schema.fields.iter().collect(),
            });
            continue;
        }
        for entity in entities {
            views.push(EntityView {
                id: entity_id(schema.id(), Some(entity)),
                name: entity.to_string(),
                schema,
                fields: schema
                    .fields
                    .iter()
                    .filter(|f| f.entity.as_deref() == Some(entity))
                    .collect(),
            });
        }
    }
    views
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemalens_core::FormatType;

    #[test]
    fn test_multi_entity_schema_splits() {
        let mut schema = SchemaDetails::new(FormatType::Sql, "shop", "db/shop.sql");
        schema.push_field(FieldInfo::new("id", "INT").with_entity("users").primary_key());
        schema.push_field(FieldInfo::new("id", "INT").with_entity("orders"));
        schema.push_field(FieldInfo::new("user_id", "INT").with_entity("orders"));
        let schemas = vec![schema];
        let views = entity_views(&schemas);
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].id, "db/shop.sql#users");
        assert_eq!(views[1].fields.len(), 2);
        assert_eq!(views[1].keys()[0].name, "id");
        assert!(views[0].answers_to("public.Users"));
        assert!(views[0].answers_to("user"));
    }

    #[test]
    fn test_raw_type_fallback() {
        let a = FieldInfo::new("id", "INTEGER");
        let b = FieldInfo::new("user_id", "integer");
        let c = FieldInfo::new("user_id", "bigint");
        assert_eq!(compatibility(&a, &b), TypeCompatibility::Exact);
        assert_eq!(compatibility(&a, &c), TypeCompatibility::Incompatible);
    }

    #[test]
    fn test_enhanced_compatibility() {
        assert_eq!(
            normalized_compatibility(NormalizedType::Integer, NormalizedType::String),
            TypeCompatibility::Compatible
        );
        assert_eq!(
            normalized_compatibility(NormalizedType::Boolean, NormalizedType::Date),
            TypeCompatibility::Incompatible
        );
    }
}
