//! Language detection and per-language extraction strategies.
//!
//! Every supported grammar gets one [`LanguageStrategy`]. The strategy answers
//! structural questions about syntax nodes (is this a declaration, what does it
//! extend, which names does the file import) and emits relationship edges
//! through an [`EdgeSink`]. Files in unsupported languages get [`NoopStrategy`],
//! which answers every question with "nothing", so the pipeline never fails on
//! unknown input.

mod go;
mod java;
mod noop;
mod php;
mod python;
mod rust;
mod typescript;

#[cfg(test)]
pub(crate) mod test_support;

pub use go::GoStrategy;
pub use java::JavaStrategy;
pub use noop::NoopStrategy;
pub use php::PhpStrategy;
pub use python::PythonStrategy;
pub use rust::RustStrategy;
pub use typescript::TypeScriptStrategy;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tree_sitter::Node;

use crate::index::{module_id, RelationshipType, Symbol, SymbolKind, Visibility};
use crate::indexer::resolver::ResolutionContext;

/// Languages the indexer knows how to parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    TypeScript,
    Tsx,
    JavaScript,
    Python,
    Php,
    Java,
    Go,
    Rust,
    Unknown,
}

impl Language {
    pub const SUPPORTED: [Language; 8] = [
        Language::TypeScript,
        Language::Tsx,
        Language::JavaScript,
        Language::Python,
        Language::Php,
        Language::Java,
        Language::Go,
        Language::Rust,
    ];

    pub fn from_path(path: impl AsRef<Path>) -> Self {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Language::Unknown)
    }

    pub fn from_extension(ext: &str) -> Self {
        Self::SUPPORTED
            .iter()
            .copied()
            .find(|lang| lang.extensions().contains(&ext))
            .unwrap_or(Language::Unknown)
    }

    /// Parse a configured language name; `tsx` is covered by `typescript`
    pub fn from_name(name: &str) -> Option<Self> {
        Self::SUPPORTED
            .iter()
            .copied()
            .find(|lang| lang.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::TypeScript => "typescript",
            Language::Tsx => "tsx",
            Language::JavaScript => "javascript",
            Language::Python => "python",
            Language::Php => "php",
            Language::Java => "java",
            Language::Go => "go",
            Language::Rust => "rust",
            Language::Unknown => "unknown",
        }
    }

    /// Name used by the `languages.enabled` configuration list
    pub fn config_name(&self) -> &'static str {
        match self {
            Language::Tsx => "typescript",
            other => other.as_str(),
        }
    }

    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Language::TypeScript => &["ts", "mts", "cts"],
            Language::Tsx => &["tsx"],
            Language::JavaScript => &["js", "jsx", "mjs", "cjs"],
            Language::Python => &["py"],
            Language::Php => &["php"],
            Language::Java => &["java"],
            Language::Go => &["go"],
            Language::Rust => &["rs"],
            Language::Unknown => &[],
        }
    }

    /// Tree-sitter grammar, `None` for unknown files
    pub fn grammar(&self) -> Option<tree_sitter::Language> {
        let grammar = match self {
            Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Language::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Language::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Language::Python => tree_sitter_python::LANGUAGE.into(),
            Language::Php => tree_sitter_php::LANGUAGE_PHP.into(),
            Language::Java => tree_sitter_java::LANGUAGE.into(),
            Language::Go => tree_sitter_go::LANGUAGE.into(),
            Language::Rust => tree_sitter_rust::LANGUAGE.into(),
            Language::Unknown => return None,
        };
        Some(grammar)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy for a detected language. Unknown languages get the no-op strategy.
pub fn strategy_for(language: Language) -> &'static dyn LanguageStrategy {
    static TYPESCRIPT: TypeScriptStrategy = TypeScriptStrategy;
    static PYTHON: PythonStrategy = PythonStrategy;
    static PHP: PhpStrategy = PhpStrategy;
    static JAVA: JavaStrategy = JavaStrategy;
    static GO: GoStrategy = GoStrategy;
    static RUST: RustStrategy = RustStrategy;
    static NOOP: NoopStrategy = NoopStrategy;

    match language {
        Language::TypeScript | Language::Tsx | Language::JavaScript => &TYPESCRIPT,
        Language::Python => &PYTHON,
        Language::Php => &PHP,
        Language::Java => &JAVA,
        Language::Go => &GO,
        Language::Rust => &RUST,
        Language::Unknown => &NOOP,
    }
}

/// A declaration-like node recognised by a strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub kind: SymbolKind,
    /// Type the declaration belongs to when it is not nested inside it (Go methods)
    pub owner: Option<String>,
}

impl Declaration {
    pub fn new(name: impl Into<String>, kind: SymbolKind) -> Self {
        Self {
            name: name.into(),
            kind,
            owner: None,
        }
    }

    pub fn owned_by(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}

/// Language-neutral view of a call expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    /// Called name, the property for member calls
    pub callee: String,
    /// Object or path the callee was accessed through
    pub receiver: Option<String>,
    pub arguments: Vec<CallArgument>,
    pub line: u32,
    /// Receiver is a type or module path (`Foo::bar`), not a value
    pub scoped: bool,
}

impl CallSite {
    pub fn new(callee: impl Into<String>, receiver: Option<String>, line: u32) -> Self {
        Self {
            callee: callee.into(),
            receiver,
            arguments: Vec::new(),
            line,
            scoped: false,
        }
    }

    pub fn with_arguments(mut self, arguments: Vec<CallArgument>) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn scoped(mut self) -> Self {
        self.scoped = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallArgument {
    StringLiteral(String),
    Identifier(String),
    Other,
}

/// Per-file state handed to every relationship hook
pub struct FileScope<'a> {
    pub file: &'a str,
    pub source: &'a str,
    /// Symbols extracted from this file, in declaration order
    pub symbols: &'a [Symbol],
    pub context: &'a ResolutionContext,
}

impl<'a> FileScope<'a> {
    /// Tightest symbol whose line range contains `line`; later symbols win ties
    pub fn enclosing(&self, line: u32) -> Option<&'a Symbol> {
        tightest(self.symbols.iter().filter(|s| s.location.contains_line(line)))
    }

    pub fn enclosing_callable(&self, line: u32) -> Option<&'a Symbol> {
        tightest(
            self.symbols
                .iter()
                .filter(|s| s.kind.is_callable() && s.location.contains_line(line)),
        )
    }

    /// Source id for an edge found at `line`: enclosing symbol or the file's module
    pub fn source_id(&self, line: u32) -> String {
        self.enclosing(line)
            .map(|s| s.id.clone())
            .unwrap_or_else(|| module_id(self.file))
    }

    /// Symbol declared with `name` starting on `line`
    pub fn declared_at(&self, name: &str, line: u32) -> Option<&'a Symbol> {
        self.symbols
            .iter()
            .find(|s| s.name == name && s.location.start_line == line)
    }

    pub fn owner_of(&self, symbol: &Symbol) -> Option<&'a Symbol> {
        let parent = symbol.parent.as_deref()?;
        self.symbols.iter().find(|s| s.id == parent)
    }

    pub fn module_id(&self) -> String {
        module_id(self.file)
    }
}

fn tightest<'a>(candidates: impl Iterator<Item = &'a Symbol>) -> Option<&'a Symbol> {
    let mut best: Option<&'a Symbol> = None;
    for symbol in candidates {
        match best {
            Some(current) if symbol.location.span() > current.location.span() => {}
            _ => best = Some(symbol),
        }
    }
    best
}

/// Edge-emission callback shared by one relationship extraction pass
pub trait EdgeSink {
    /// Resolve `target_name` and record the edge; unresolved targets are dropped
    fn add_relationship(
        &mut self,
        source_id: &str,
        target_name: &str,
        rel_type: RelationshipType,
        line: u32,
    );
}

/// Per-language extraction contract
pub trait LanguageStrategy: Send + Sync {
    fn language(&self) -> Language;

    /// Declaration-like nodes produce symbols; everything else is walked through
    fn declaration(&self, node: Node, source: &str) -> Option<Declaration>;

    fn extract_namespace(&self, _root: Node, _source: &str) -> Option<String> {
        None
    }

    /// Join between a namespace and a top-level name
    fn namespace_separator(&self) -> &'static str {
        "."
    }

    /// Join between an enclosing symbol and a member
    fn member_separator(&self) -> &'static str {
        "."
    }

    fn build_qualified_name(
        &self,
        name: &str,
        parent_name: Option<&str>,
        namespace: Option<&str>,
    ) -> String {
        match (parent_name, namespace) {
            (Some(parent), _) => format!("{}{}{}", parent, self.member_separator(), name),
            (None, Some(ns)) if !ns.is_empty() => {
                format!("{}{}{}", ns, self.namespace_separator(), name)
            }
            _ => name.to_string(),
        }
    }

    /// Type a detached member block belongs to (Rust `impl`)
    fn impl_target(&self, _node: Node, _source: &str) -> Option<String> {
        None
    }

    fn extract_extends(&self, _node: Node, _source: &str) -> Option<String> {
        None
    }

    fn extract_implements(&self, _node: Node, _source: &str) -> Option<Vec<String>> {
        None
    }

    fn extract_traits(&self, _node: Node, _source: &str) -> Option<Vec<String>> {
        None
    }

    fn extract_visibility(&self, _node: Node, _source: &str) -> Option<Visibility> {
        None
    }

    fn is_exported(&self, _node: Node, _source: &str) -> Option<bool> {
        None
    }

    fn refine_kind(
        &self,
        kind: SymbolKind,
        name: &str,
        extends: Option<&str>,
        implements: &[String],
    ) -> SymbolKind {
        refine_kind(kind, name, extends, implements)
    }

    fn detect_deprecated(&self, node: Node, source: &str) -> bool {
        has_deprecation_marker(node, source)
    }

    fn signature(&self, node: Node, source: &str) -> Option<String> {
        first_line_signature(node, source)
    }

    /// Local name -> qualified name, module path or `path::Symbol` marker
    fn extract_imports(&self, _root: Node, _source: &str, _file: &str) -> HashMap<String, String> {
        HashMap::new()
    }

    /// Whether import map values are module paths (true) or qualified names
    fn imports_are_paths(&self) -> bool {
        true
    }

    fn call_site(&self, _node: Node, _source: &str) -> Option<CallSite> {
        None
    }

    /// Name handed to the resolver for a call, `None` when the receiver is opaque
    fn call_target(&self, call: &CallSite, scope: &FileScope) -> Option<String> {
        let sep = self.member_separator();
        match call.receiver.as_deref() {
            None => Some(call.callee.clone()),
            Some("this" | "self" | "$this" | "static" | "Self") => {
                let caller = scope.enclosing_callable(call.line)?;
                let owner = scope.owner_of(caller)?;
                Some(format!("{}{}{}", owner.qualified_name, sep, call.callee))
            }
            Some(receiver) if is_identifier(receiver) => {
                match scope.context.imports.get(receiver) {
                    Some(mapped) if self.imports_are_paths() && !mapped.contains("::") => {
                        Some(format!("{}::{}", mapped, call.callee))
                    }
                    Some(mapped) => Some(format!("{}{}{}", mapped, sep, call.callee)),
                    None if starts_uppercase(receiver) => {
                        Some(format!("{}{}{}", receiver, sep, call.callee))
                    }
                    None => None,
                }
            }
            Some(_) => None,
        }
    }

    /// Inheritance, interface and trait edges at class-like declarations
    fn extract_class_relationships(&self, node: Node, scope: &FileScope, sink: &mut dyn EdgeSink) {
        let Some(decl) = self.declaration(node, scope.source) else {
            return;
        };
        if decl.kind.is_callable() {
            return;
        }
        let line = line_of(node);
        let Some(symbol) = scope.declared_at(&decl.name, line) else {
            return;
        };

        if let Some(parent) = self.extract_extends(node, scope.source) {
            sink.add_relationship(&symbol.id, &parent, RelationshipType::Inherits, line);
        }
        for interface in self.extract_implements(node, scope.source).unwrap_or_default() {
            sink.add_relationship(&symbol.id, &interface, RelationshipType::Implements, line);
        }
        for used in self.extract_traits(node, scope.source).unwrap_or_default() {
            sink.add_relationship(&symbol.id, &used, RelationshipType::UsesTrait, line);
        }
    }

    fn extract_instantiation_relationships(
        &self,
        _node: Node,
        _scope: &FileScope,
        _sink: &mut dyn EdgeSink,
    ) {
    }

    fn extract_import_relationships(&self, _node: Node, _scope: &FileScope, _sink: &mut dyn EdgeSink) {}

    fn extract_call_relationships(&self, node: Node, scope: &FileScope, sink: &mut dyn EdgeSink) {
        let Some(call) = self.call_site(node, scope.source) else {
            return;
        };
        if let Some(target) = self.call_target(&call, scope) {
            sink.add_relationship(
                &scope.source_id(call.line),
                &target,
                RelationshipType::Calls,
                call.line,
            );
        }
    }

    fn extract_event_listener_relationships(
        &self,
        _node: Node,
        _scope: &FileScope,
        _sink: &mut dyn EdgeSink,
    ) {
    }
}

// ---------------------------------------------------------------------------
// Kind refinement
// ---------------------------------------------------------------------------

/// Name-suffix rules, first match wins
const SUFFIX_RULES: &[(&str, SymbolKind)] = &[
    ("Controller", SymbolKind::Controller),
    ("Service", SymbolKind::Service),
    ("Repository", SymbolKind::Repository),
    ("Factory", SymbolKind::Factory),
    ("Middleware", SymbolKind::Middleware),
    ("Listener", SymbolKind::Listener),
    ("Subscriber", SymbolKind::Listener),
    ("Event", SymbolKind::Event),
    ("Handler", SymbolKind::Handler),
    ("Provider", SymbolKind::Provider),
    ("Dto", SymbolKind::Dto),
    ("DTO", SymbolKind::Dto),
    ("Entity", SymbolKind::Entity),
    ("Model", SymbolKind::Model),
];

fn suffix_kind(name: &str) -> Option<SymbolKind> {
    SUFFIX_RULES
        .iter()
        .find(|(suffix, _)| name.ends_with(suffix))
        .map(|(_, kind)| *kind)
}

/// Upgrade a plain class to an architecture role.
///
/// Order: the class's own name suffix, then its parent's name suffix, then the
/// names of implemented interfaces. Non-class kinds are returned unchanged.
pub fn refine_kind(
    kind: SymbolKind,
    name: &str,
    extends: Option<&str>,
    implements: &[String],
) -> SymbolKind {
    if kind != SymbolKind::Class {
        return kind;
    }
    if let Some(refined) = suffix_kind(name) {
        return refined;
    }
    if let Some(refined) = extends.map(crate::index::short_name).and_then(suffix_kind) {
        return refined;
    }
    for interface in implements {
        let lower = interface.to_lowercase();
        if lower.contains("listener") || lower.contains("subscriber") {
            return SymbolKind::Listener;
        }
        if lower.contains("repository") {
            return SymbolKind::Repository;
        }
    }
    kind
}

// ---------------------------------------------------------------------------
// Tree helpers
// ---------------------------------------------------------------------------

static DEPRECATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)@deprecated|#\[\s*deprecated|\bdeprecated:").unwrap());

pub fn node_text<'a>(node: Node, source: &'a str) -> &'a str {
    source.get(node.byte_range()).unwrap_or("")
}

pub fn field_text<'a>(node: Node, field: &str, source: &'a str) -> Option<&'a str> {
    node.child_by_field_name(field).map(|n| node_text(n, source))
}

/// 1-based line of the node's first byte
pub fn line_of(node: Node) -> u32 {
    node.start_position().row as u32 + 1
}

pub fn end_line_of(node: Node) -> u32 {
    node.end_position().row as u32 + 1
}

/// Visit every node of the subtree in document order
pub fn walk_tree(root: Node, mut visit: impl FnMut(Node)) {
    let mut cursor = root.walk();
    loop {
        visit(cursor.node());
        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return;
            }
        }
    }
}

pub fn named_children(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

fn is_annotation(kind: &str) -> bool {
    kind.contains("comment") || matches!(kind, "attribute_item" | "decorator" | "attribute_list")
}

/// Contiguous comments and attributes directly above a declaration, looking
/// through `export` and decorator wrappers
pub fn leading_annotations(node: Node) -> Vec<Node> {
    let mut found = Vec::new();
    let mut anchor = Some(node);
    while let Some(current) = anchor {
        let mut sibling = current.prev_sibling();
        while let Some(prev) = sibling {
            if !is_annotation(prev.kind()) {
                break;
            }
            found.push(prev);
            sibling = prev.prev_sibling();
        }
        anchor = current
            .parent()
            .filter(|p| matches!(p.kind(), "export_statement" | "decorated_definition"));
    }
    found
}

pub fn has_deprecation_marker(node: Node, source: &str) -> bool {
    leading_annotations(node)
        .into_iter()
        .any(|n| DEPRECATION.is_match(node_text(n, source)))
}

pub fn mentions_deprecated(text: &str) -> bool {
    DEPRECATION.is_match(text)
}

/// First line of the declaration without the opening body delimiter
pub fn first_line_signature(node: Node, source: &str) -> Option<String> {
    let line = node_text(node, source).lines().next()?.trim();
    let line = line.trim_end_matches('{').trim_end_matches(':').trim_end();
    if line.is_empty() {
        return None;
    }
    Some(line.chars().take(200).collect())
}

/// Strip quotes from a string literal node's text
pub fn unquote(text: &str) -> String {
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_prefix(|c| c == '"' || c == '\'' || c == '`')
        .unwrap_or(trimmed);
    trimmed
        .strip_suffix(|c| c == '"' || c == '\'' || c == '`')
        .unwrap_or(trimmed)
        .to_string()
}

/// Type reference text without generics, array markers or a leading namespace slash
pub fn type_name(text: &str) -> String {
    let base = text.split('<').next().unwrap_or(text);
    base.trim()
        .trim_end_matches("[]")
        .trim_start_matches('\\')
        .trim_start_matches('&')
        .trim_start_matches('*')
        .trim()
        .to_string()
}

pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' || first == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

pub fn starts_uppercase(text: &str) -> bool {
    text.chars().next().is_some_and(|c| c.is_uppercase())
}

/// Classify call arguments as literals, identifiers or anything else
pub fn classify_arguments(args: Node, source: &str, string_kinds: &[&str]) -> Vec<CallArgument> {
    named_children(args)
        .into_iter()
        .filter(|arg| !arg.kind().contains("comment"))
        .map(|arg| {
            // PHP and friends wrap each argument
            let arg = if arg.kind() == "argument" {
                named_children(arg).into_iter().next().unwrap_or(arg)
            } else {
                arg
            };
            if string_kinds.contains(&arg.kind()) {
                CallArgument::StringLiteral(unquote(node_text(arg, source)))
            } else if matches!(arg.kind(), "identifier" | "name" | "variable_name") {
                CallArgument::Identifier(node_text(arg, source).trim_start_matches('$').to_string())
            } else {
                CallArgument::Other
            }
        })
        .collect()
}

/// Join a relative import specifier onto the importing file's directory
pub fn join_relative(file: &str, specifier: &str) -> String {
    let mut parts: Vec<&str> = file.split('/').collect();
    parts.pop();
    for segment in specifier.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}
