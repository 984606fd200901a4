// Symbol extraction: syntax tree to Symbol records

use std::collections::HashSet;

use tree_sitter::{Node, Tree};

use super::parser::parse_source;
use crate::error::ExtractionError;
use crate::index::{Location, Symbol, SymbolKind};
use crate::lang::{end_line_of, line_of, named_children, strategy_for, Language, LanguageStrategy};

/// One file after parsing and symbol extraction. The tree and source are kept
/// for relationship extraction.
pub struct ParsedFile {
    pub path: String,
    pub language: Language,
    pub source: String,
    /// `None` for files without a grammar
    pub tree: Option<Tree>,
    pub symbols: Vec<Symbol>,
}

impl std::fmt::Debug for ParsedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedFile")
            .field("path", &self.path)
            .field("language", &self.language)
            .field("symbols", &self.symbols.len())
            .finish()
    }
}

/// Parse a file and extract its symbols. Unknown languages yield an empty file.
pub fn extract_file(
    path: &str,
    source: String,
    language: Language,
) -> Result<ParsedFile, ExtractionError> {
    if language == Language::Unknown {
        return Ok(ParsedFile {
            path: path.to_string(),
            language,
            source,
            tree: None,
            symbols: Vec::new(),
        });
    }

    let tree = parse_source(language, &source)?;
    let symbols = extract_symbols(path, &source, &tree, language);
    Ok(ParsedFile {
        path: path.to_string(),
        language,
        source,
        tree: Some(tree),
        symbols,
    })
}

/// Enclosing declaration while walking down the tree
#[derive(Clone)]
struct Enclosing {
    qualified_name: String,
    /// `None` for detached member blocks whose type may live elsewhere
    kind: Option<SymbolKind>,
}

struct SymbolWalker<'a> {
    strategy: &'static dyn LanguageStrategy,
    file: &'a str,
    source: &'a str,
    language: Language,
    namespace: Option<String>,
    symbols: Vec<Symbol>,
    /// Qualified name of each symbol's parent, index-aligned with `symbols`
    parents: Vec<Option<String>>,
}

impl<'a> SymbolWalker<'a> {
    fn qualify(&self, name: &str, parent: Option<&Enclosing>) -> String {
        let parent_name = parent.map(|p| p.qualified_name.as_str());
        let namespace = if parent.is_none() {
            self.namespace.as_deref()
        } else {
            None
        };
        self.strategy.build_qualified_name(name, parent_name, namespace)
    }

    /// Depth-first pre-order walk with an explicit stack, so nesting depth is
    /// bounded by heap rather than the worker thread's stack
    fn walk(&mut self, root: Node) {
        let mut scopes: Vec<Enclosing> = Vec::new();
        let mut pending: Vec<(Node, Option<usize>)> = vec![(root, None)];

        while let Some((node, parent_slot)) = pending.pop() {
            let parent = parent_slot.map(|slot| scopes[slot].clone());
            let scope = match self.enter(node, parent.as_ref()) {
                Some(inner) => {
                    scopes.push(inner);
                    Some(scopes.len() - 1)
                }
                None => parent_slot,
            };
            for child in named_children(node).into_iter().rev() {
                pending.push((child, scope));
            }
        }
    }

    /// Record a declaration at `node`; returns the scope its children live in
    fn enter(&mut self, node: Node, parent: Option<&Enclosing>) -> Option<Enclosing> {
        if let Some(target) = self.strategy.impl_target(node, self.source) {
            return Some(Enclosing {
                qualified_name: self.qualify(&target, parent),
                kind: None,
            });
        }

        let decl = self.strategy.declaration(node, self.source)?;
        // detached declarations (Go methods) name their owner explicitly
        let owner = decl.owner.as_deref().map(|owner| Enclosing {
            qualified_name: self.qualify(owner, None),
            kind: None,
        });
        let parent = owner.as_ref().or(parent);
        let symbol = self.build_symbol(node, &decl.name, decl.kind, parent);
        let inner = Enclosing {
            qualified_name: symbol.qualified_name.clone(),
            kind: Some(symbol.kind),
        };
        self.parents.push(parent.map(|p| p.qualified_name.clone()));
        self.symbols.push(symbol);
        Some(inner)
    }

    fn build_symbol(
        &self,
        node: Node,
        name: &str,
        kind: SymbolKind,
        parent: Option<&Enclosing>,
    ) -> Symbol {
        let strategy = self.strategy;
        let member_of_type = parent.is_some_and(|p| match p.kind {
            Some(kind) => !kind.is_callable() && kind != SymbolKind::Module,
            None => true,
        });
        let kind = if kind == SymbolKind::Function && member_of_type {
            SymbolKind::Method
        } else {
            kind
        };

        let extends = strategy.extract_extends(node, self.source);
        let implements = strategy.extract_implements(node, self.source).unwrap_or_default();
        let kind = strategy.refine_kind(kind, name, extends.as_deref(), &implements);

        let location = Location::new(self.file, line_of(node), end_line_of(node));
        let mut symbol = Symbol::new(
            name,
            self.qualify(name, parent),
            kind,
            location,
            self.language.as_str(),
        );
        symbol.visibility = strategy.extract_visibility(node, self.source);
        symbol.exported = strategy.is_exported(node, self.source);
        symbol.extends = extends;
        symbol.implements = implements;
        symbol.uses_traits = strategy.extract_traits(node, self.source).unwrap_or_default();
        symbol.signature = strategy.signature(node, self.source);
        symbol.deprecated = strategy.detect_deprecated(node, self.source);
        symbol
    }

    /// Link parents by qualified name; types win over same-named callables.
    /// Declarations that collapse onto an earlier id are dropped.
    fn finish(mut self) -> Vec<Symbol> {
        let parent_ids: Vec<Option<String>> = self
            .parents
            .iter()
            .map(|parent| {
                let parent = parent.as_deref()?;
                let candidates: Vec<&Symbol> = self
                    .symbols
                    .iter()
                    .filter(|s| s.qualified_name == parent)
                    .collect();
                candidates
                    .iter()
                    .find(|s| !s.kind.is_callable())
                    .or_else(|| candidates.first())
                    .map(|s| s.id.clone())
            })
            .collect();

        for (symbol, parent_id) in self.symbols.iter_mut().zip(parent_ids) {
            symbol.parent = parent_id;
        }

        let mut seen = HashSet::new();
        self.symbols.retain(|symbol| seen.insert(symbol.id.clone()));
        self.symbols
    }
}

/// Walk `tree` depth-first and produce the file's symbols in declaration order.
/// Pure function of its inputs: same file and source always give the same ids.
pub fn extract_symbols(path: &str, source: &str, tree: &Tree, language: Language) -> Vec<Symbol> {
    let strategy = strategy_for(language);
    let root = tree.root_node();

    let mut walker = SymbolWalker {
        strategy,
        file: path,
        source,
        language,
        namespace: strategy.extract_namespace(root, source),
        symbols: Vec::new(),
        parents: Vec::new(),
    };
    walker.walk(root);
    walker.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDER_SERVICE: &str = r#"
function validate(input) {
    return input != null;
}

class OrderService extends BaseService {
    createOrder(input) {
        validate(input);
    }
}
"#;

    #[test]
    fn test_ids_are_deterministic() {
        let first = extract_file("src/order.js", ORDER_SERVICE.to_string(), Language::JavaScript).unwrap();
        let second = extract_file("src/order.js", ORDER_SERVICE.to_string(), Language::JavaScript).unwrap();

        let ids = |file: &ParsedFile| file.symbols.iter().map(|s| s.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(first.symbols.len(), 3);
    }

    #[test]
    fn test_nested_members_get_parent_and_qualified_name() {
        let file = extract_file("src/order.js", ORDER_SERVICE.to_string(), Language::JavaScript).unwrap();

        let service = file.symbols.iter().find(|s| s.name == "OrderService").unwrap();
        assert_eq!(service.kind, SymbolKind::Service);
        assert_eq!(service.location.start_line, 6);
        assert_eq!(service.location.end_line, 10);
        assert!(service.parent.is_none());

        let create = file.symbols.iter().find(|s| s.name == "createOrder").unwrap();
        assert_eq!(create.qualified_name, "OrderService.createOrder");
        assert_eq!(create.kind, SymbolKind::Method);
        assert_eq!(create.parent.as_deref(), Some(service.id.as_str()));
    }

    #[test]
    fn test_unknown_language_has_no_symbols() {
        let file = extract_file("notes/readme.md", "# Title".to_string(), Language::Unknown).unwrap();
        assert!(file.tree.is_none());
        assert!(file.symbols.is_empty());
    }

    #[test]
    fn test_deeply_nested_expression_does_not_exhaust_the_stack() {
        let terms = vec!["1"; 20_000].join(" + ");
        let source = format!("function total() {{\n    return {};\n}}\n", terms);

        // same stack size as a default worker thread
        let handle = std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(move || extract_file("gen/total.js", source, Language::JavaScript).unwrap())
            .unwrap();
        let file = handle.join().unwrap();

        assert_eq!(file.symbols.len(), 1);
        assert_eq!(file.symbols[0].name, "total");
    }

    #[test]
    fn test_walk_keeps_declaration_order() {
        let source = r#"
class A {
    one() {}
    two() {}
}
function b() {}
class C {
    three() {}
}
"#;
        let file = extract_file("src/order.js", source.to_string(), Language::JavaScript).unwrap();
        let names: Vec<&str> = file.symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["A", "one", "two", "b", "C", "three"]);
    }

    #[test]
    fn test_colliding_declarations_keep_one_symbol() {
        let source = r#"
pub struct Money(i64);

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Debug for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Money({})", self.0)
    }
}
"#;
        let file = extract_file("src/money.rs", source.to_string(), Language::Rust).unwrap();

        let fmt: Vec<&Symbol> = file.symbols.iter().filter(|s| s.name == "fmt").collect();
        assert_eq!(fmt.len(), 1);
        // the first declaration wins
        assert_eq!(fmt[0].location.start_line, 5);

        let ids: HashSet<&str> = file.symbols.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids.len(), file.symbols.len());
    }
}
