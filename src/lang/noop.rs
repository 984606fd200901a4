use tree_sitter::Node;

use super::{Declaration, Language, LanguageStrategy};

/// Strategy for files without a grammar: recognises nothing
pub struct NoopStrategy;

impl LanguageStrategy for NoopStrategy {
    fn language(&self) -> Language {
        Language::Unknown
    }

    fn declaration(&self, _node: Node, _source: &str) -> Option<Declaration> {
        None
    }
}
