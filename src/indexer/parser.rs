// Parsing collaborator: source text to tree-sitter syntax tree

use tree_sitter::{Parser, Tree};

use crate::error::ExtractionError;
use crate::lang::Language;

/// Parse `source` with the grammar of `language`
pub fn parse_source(language: Language, source: &str) -> Result<Tree, ExtractionError> {
    let grammar = language
        .grammar()
        .ok_or(ExtractionError::UnsupportedLanguage(language))?;

    let mut parser = Parser::new();
    parser
        .set_language(&grammar)
        .map_err(|e| ExtractionError::Grammar {
            language,
            message: e.to_string(),
        })?;

    parser
        .parse(source, None)
        .ok_or(ExtractionError::Parse { language })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_every_supported_language() {
        let samples = [
            (Language::TypeScript, "export class A {}"),
            (Language::Tsx, "const a = <div />;"),
            (Language::JavaScript, "function a() {}"),
            (Language::Python, "def a():\n    pass\n"),
            (Language::Php, "<?php class A {}"),
            (Language::Java, "class A {}"),
            (Language::Go, "package a\nfunc A() {}\n"),
            (Language::Rust, "fn a() {}"),
        ];
        for (language, source) in samples {
            let tree = parse_source(language, source).unwrap();
            assert!(!tree.root_node().has_error(), "{} sample failed", language);
        }
    }

    #[test]
    fn test_unknown_language_is_an_error() {
        let err = parse_source(Language::Unknown, "hello").unwrap_err();
        assert!(matches!(err, ExtractionError::UnsupportedLanguage(Language::Unknown)));
    }
}
