//! Ordered parser registry
//!
//! The registry is an owned collection handed to the engine at construction.
//! Plugins are kept sorted by `(priority, registration index)`; that order is
//! both the detection order and the tie-break order.

use super::ParserPlugin;
use schemalens_core::FormatType;
use std::sync::Arc;

struct Registration {
    index: usize,
    plugin: Arc<dyn ParserPlugin>,
}

/// Registry of parser plugins
#[derive(Default)]
pub struct ParserRegistry {
    entries: Vec<Registration>,
    next_index: usize,
}

impl ParserRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a plugin and restore the sorted order
    pub fn register_parser(&mut self, plugin: Arc<dyn ParserPlugin>) {
        tracing::debug!(
            parser = plugin.name(),
            format = %plugin.format_type(),
            priority = plugin.priority(),
            "registering parser"
        );
        self.entries.push(Registration {
            index: self.next_index,
            plugin,
        });
        self.next_index += 1;
        self.entries
            .sort_by_key(|r| (r.plugin.priority(), r.index));
    }

    /// Builder-style registration
    #[must_use]
    pub fn with_parser<P: ParserPlugin + 'static>(mut self, plugin: P) -> Self {
        self.register_parser(Arc::new(plugin));
        self
    }

    /// First plugin (in registry order) producing `format_type`
    #[must_use]
    pub fn get(&self, format_type: FormatType) -> Option<Arc<dyn ParserPlugin>> {
        self.entries
            .iter()
            .find(|r| r.plugin.format_type() == format_type)
            .map(|r| Arc::clone(&r.plugin))
    }

    /// Plugins in registry order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ParserPlugin>> {
        self.entries.iter().map(|r| &r.plugin)
    }

    /// Plugin names in registry order
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.iter().map(|p| p.name()).collect()
    }

    /// Number of plugins
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no plugin is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserRegistry")
            .field("parsers", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{DetectionResult, ParseContext, ParseResult};
    use schemalens_core::SchemaDetails;

    struct Stub {
        name: &'static str,
        priority: u32,
    }

    impl ParserPlugin for Stub {
        fn name(&self) -> &'static str {
            self.name
        }
        fn format_type(&self) -> FormatType {
            FormatType::Json
        }
        fn priority(&self) -> u32 {
            self.priority
        }
        fn can_parse(&self, _: &str, _: &[u8]) -> DetectionResult {
            DetectionResult::NO
        }
        fn parse_schema(&self, f: &str, _: &[u8], _: &ParseContext) -> ParseResult<SchemaDetails> {
            Ok(SchemaDetails::new(FormatType::Json, f, f))
        }
    }

    #[test]
    fn test_priority_then_registration_order() {
        let registry = ParserRegistry::new()
            .with_parser(Stub { name: "late", priority: 100 })
            .with_parser(Stub { name: "early", priority: 10 })
            .with_parser(Stub { name: "late2", priority: 100 });
        assert_eq!(registry.names(), vec!["early", "late", "late2"]);
        assert_eq!(registry.get(FormatType::Json).map(|p| p.name()), Some("early"));
        assert!(registry.get(FormatType::Orc).is_none());
    }
}
