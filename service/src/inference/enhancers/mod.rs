//! Built-in type enhancers, lowest priority first

mod constraint;
mod declared;
mod name;
mod pattern;
mod structure;

pub use constraint::ConstraintEnhancer;
pub use declared::DeclaredTypeEnhancer;
pub use name::NameEnhancer;
pub use pattern::PatternEnhancer;
pub use structure::StructureEnhancer;

use super::TypeEnhancer;

/// The default pipeline: declared, name, pattern, constraint, structure
#[must_use]
pub fn default_enhancers() -> Vec<Box<dyn TypeEnhancer>> {
    vec![
        Box::new(DeclaredTypeEnhancer),
        Box::new(NameEnhancer),
        Box::new(PatternEnhancer),
        Box::new(ConstraintEnhancer),
        Box::new(StructureEnhancer),
    ]
}
