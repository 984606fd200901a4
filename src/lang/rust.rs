//! Rust strategy: `::` paths, impl blocks, `use` trees

use std::collections::HashMap;

use tree_sitter::Node;

use super::{
    classify_arguments, field_text, line_of, named_children, node_text, starts_uppercase,
    type_name, CallSite, Declaration, EdgeSink, FileScope, Language, LanguageStrategy,
};
use crate::index::{RelationshipType, SymbolKind, Visibility};

pub struct RustStrategy;

const STRING_KINDS: &[&str] = &["string_literal", "raw_string_literal"];

/// One name brought into scope by a `use` tree
#[derive(Debug, PartialEq, Eq)]
struct UseBinding {
    local: String,
    path: Vec<String>,
}

fn collect_use_tree(node: Node, source: &str, prefix: &[String], out: &mut Vec<UseBinding>) {
    let segments = |n: Node| -> Vec<String> {
        node_text(n, source)
            .split("::")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    };

    match node.kind() {
        "identifier" | "scoped_identifier" | "self" | "crate" | "super" => {
            let mut path = prefix.to_vec();
            path.extend(segments(node));
            // `use a::b::{self}` binds `b`
            if path.last().is_some_and(|s| s == "self") {
                path.pop();
            }
            if let Some(local) = path.last().cloned() {
                out.push(UseBinding { local, path });
            }
        }
        "use_as_clause" => {
            let (Some(path_node), Some(alias)) =
                (node.child_by_field_name("path"), field_text(node, "alias", source))
            else {
                return;
            };
            let mut path = prefix.to_vec();
            path.extend(segments(path_node));
            if alias != "_" {
                out.push(UseBinding {
                    local: alias.to_string(),
                    path,
                });
            }
        }
        "scoped_use_list" => {
            let mut nested = prefix.to_vec();
            if let Some(path_node) = node.child_by_field_name("path") {
                nested.extend(segments(path_node));
            }
            if let Some(list) = node.child_by_field_name("list") {
                collect_use_tree(list, source, &nested, out);
            }
        }
        "use_list" => {
            for item in named_children(node) {
                collect_use_tree(item, source, prefix, out);
            }
        }
        _ => {}
    }
}

fn use_bindings(node: Node, source: &str) -> Vec<UseBinding> {
    let mut out = Vec::new();
    if let Some(argument) = node.child_by_field_name("argument") {
        collect_use_tree(argument, source, &[], &mut out);
    }
    out
}

/// Slash path of the module a source file defines
fn file_module(file: &str) -> String {
    let stem = file
        .strip_suffix(".rs")
        .unwrap_or(file)
        .trim_end_matches("/mod")
        .trim_end_matches("/lib")
        .trim_end_matches("/main");
    stem.to_string()
}

/// Resolve `crate`, `self` and `super` prefixes to a slash path
fn module_path(file: &str, segments: &[String]) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut rest = segments;
    match segments.first().map(String::as_str) {
        Some("crate") => rest = &segments[1..],
        Some("self") => {
            parts = file_module(file).split('/').map(str::to_string).collect();
            rest = &segments[1..];
        }
        Some("super") => {
            parts = file_module(file).split('/').map(str::to_string).collect();
            while rest.first().is_some_and(|s| s == "super") {
                parts.pop();
                rest = &rest[1..];
            }
        }
        _ => {}
    }
    parts.extend(rest.iter().cloned());
    parts.join("/")
}

/// `path::Symbol` marker for a `use` path; types keep their trailing members
fn marker(file: &str, path: &[String]) -> Option<String> {
    let (symbol, module) = path.split_last()?;
    let module = module_path(file, module);
    if module.is_empty() {
        return Some(symbol.clone());
    }
    Some(format!("{}::{}", module, symbol))
}

/// Split `a::b::Type` into a marker `a/b::Type`, keeping a type prefix intact
fn path_marker(file: &str, receiver: &str, callee: &str) -> Option<String> {
    let segments: Vec<String> = receiver.split("::").map(str::to_string).collect();
    let first_type = segments.iter().position(|s| starts_uppercase(s));
    let (module, members) = match first_type {
        Some(idx) => segments.split_at(idx),
        None => (segments.as_slice(), &[][..]),
    };
    let module = module_path(file, module);
    let mut symbol: Vec<&str> = members.iter().map(String::as_str).collect();
    symbol.push(callee);
    if module.is_empty() {
        return Some(symbol.join("::"));
    }
    Some(format!("{}::{}", module, symbol.join("::")))
}

impl LanguageStrategy for RustStrategy {
    fn language(&self) -> Language {
        Language::Rust
    }

    fn declaration(&self, node: Node, source: &str) -> Option<Declaration> {
        let kind = match node.kind() {
            "mod_item" => SymbolKind::Module,
            "struct_item" | "union_item" => SymbolKind::Struct,
            "enum_item" => SymbolKind::Enum,
            "trait_item" => SymbolKind::Trait,
            "function_item" | "function_signature_item" => SymbolKind::Function,
            "type_item" => SymbolKind::Type,
            "const_item" | "static_item" => SymbolKind::Constant,
            _ => return None,
        };
        let name = field_text(node, "name", source)?;
        Some(Declaration::new(name, kind))
    }

    fn member_separator(&self) -> &'static str {
        "::"
    }

    fn namespace_separator(&self) -> &'static str {
        "::"
    }

    fn impl_target(&self, node: Node, source: &str) -> Option<String> {
        if node.kind() != "impl_item" {
            return None;
        }
        field_text(node, "type", source).map(type_name)
    }

    fn extract_extends(&self, node: Node, source: &str) -> Option<String> {
        if node.kind() != "trait_item" {
            return None;
        }
        let bounds = node.child_by_field_name("bounds")?;
        named_children(bounds)
            .into_iter()
            .find(|n| matches!(n.kind(), "type_identifier" | "scoped_type_identifier" | "generic_type"))
            .map(|n| type_name(node_text(n, source)))
    }

    fn extract_visibility(&self, node: Node, source: &str) -> Option<Visibility> {
        let modifier = named_children(node)
            .into_iter()
            .find(|n| n.kind() == "visibility_modifier")
            .map(|n| node_text(n, source));
        Some(match modifier {
            Some("pub") => Visibility::Public,
            Some(_) => Visibility::Protected,
            None => Visibility::Private,
        })
    }

    fn is_exported(&self, node: Node, source: &str) -> Option<bool> {
        Some(self.extract_visibility(node, source) == Some(Visibility::Public))
    }

    fn extract_imports(&self, root: Node, source: &str, file: &str) -> HashMap<String, String> {
        let mut imports = HashMap::new();
        for node in named_children(root) {
            if node.kind() != "use_declaration" {
                continue;
            }
            for binding in use_bindings(node, source) {
                if let Some(marker) = marker(file, &binding.path) {
                    imports.insert(binding.local, marker);
                }
            }
        }
        imports
    }

    fn call_site(&self, node: Node, source: &str) -> Option<CallSite> {
        if node.kind() != "call_expression" {
            return None;
        }
        let mut function = node.child_by_field_name("function")?;
        if function.kind() == "generic_function" {
            function = function.child_by_field_name("function")?;
        }
        let line = line_of(node);
        let call = match function.kind() {
            "identifier" => CallSite::new(node_text(function, source), None, line),
            "scoped_identifier" => {
                let name = field_text(function, "name", source)?;
                let path = field_text(function, "path", source)?;
                CallSite::new(name, Some(type_name(path)), line).scoped()
            }
            "field_expression" => {
                let field = field_text(function, "field", source)?;
                let value = field_text(function, "value", source)?;
                CallSite::new(field, Some(value.to_string()), line)
            }
            _ => return None,
        };
        let arguments = node
            .child_by_field_name("arguments")
            .map(|args| classify_arguments(args, source, STRING_KINDS))
            .unwrap_or_default();
        Some(call.with_arguments(arguments))
    }

    fn call_target(&self, call: &CallSite, scope: &FileScope) -> Option<String> {
        match call.receiver.as_deref() {
            Some(receiver) if call.scoped && receiver.contains("::") => {
                let head = receiver.split("::").next().unwrap_or(receiver);
                match scope.context.imports.get(head) {
                    // `model::Order::new` with `use crate::orders::model`
                    Some(mapped) => {
                        let tail = &receiver[head.len()..];
                        let (path, symbol) = mapped.split_once("::").unwrap_or((mapped.as_str(), ""));
                        let module = if symbol.is_empty() {
                            path.to_string()
                        } else {
                            format!("{}/{}", path, symbol)
                        };
                        path_marker(scope.file, &format!("{}{}", module.replace('/', "::"), tail), &call.callee)
                    }
                    None => path_marker(scope.file, receiver, &call.callee),
                }
            }
            _ => {
                let sep = self.member_separator();
                match call.receiver.as_deref() {
                    None => Some(call.callee.clone()),
                    Some("self" | "Self") => {
                        let caller = scope.enclosing_callable(call.line)?;
                        let owner = scope.owner_of(caller)?;
                        Some(format!("{}{}{}", owner.qualified_name, sep, call.callee))
                    }
                    Some(receiver) if call.scoped => match scope.context.imports.get(receiver) {
                        // an imported type or module: append the member to its marker
                        Some(mapped) if !starts_uppercase(receiver) && !mapped.contains("::") => {
                            Some(format!("{}::{}", mapped, call.callee))
                        }
                        Some(mapped) if starts_uppercase(receiver) => {
                            Some(format!("{}{}{}", mapped, sep, call.callee))
                        }
                        Some(mapped) => {
                            let module = mapped.replacen("::", "/", 1);
                            Some(format!("{}::{}", module, call.callee))
                        }
                        None => Some(format!("{}{}{}", receiver, sep, call.callee)),
                    },
                    Some(_) => None,
                }
            }
        }
    }

    fn extract_class_relationships(&self, node: Node, scope: &FileScope, sink: &mut dyn EdgeSink) {
        if node.kind() == "trait_item" {
            let line = line_of(node);
            let Some(name) = field_text(node, "name", scope.source) else {
                return;
            };
            let (Some(symbol), Some(parent)) = (
                scope.declared_at(name, line),
                self.extract_extends(node, scope.source),
            ) else {
                return;
            };
            sink.add_relationship(&symbol.id, &parent, RelationshipType::Inherits, line);
            return;
        }

        // impl Display for Order
        if node.kind() != "impl_item" {
            return;
        }
        let (Some(target), Some(trait_name)) = (
            self.impl_target(node, scope.source),
            field_text(node, "trait", scope.source).map(type_name),
        ) else {
            return;
        };
        let implementor = scope
            .symbols
            .iter()
            .find(|s| s.name == target && !s.kind.is_callable() && s.kind != SymbolKind::Module);
        if let Some(implementor) = implementor {
            sink.add_relationship(&implementor.id, &trait_name, RelationshipType::Implements, line_of(node));
        }
    }

    fn extract_instantiation_relationships(
        &self,
        node: Node,
        scope: &FileScope,
        sink: &mut dyn EdgeSink,
    ) {
        if node.kind() != "struct_expression" {
            return;
        }
        let Some(name) = field_text(node, "name", scope.source).map(type_name) else {
            return;
        };
        if name == "Self" {
            return;
        }
        let line = line_of(node);
        let target = if name.contains("::") {
            let (receiver, last) = name.rsplit_once("::").unwrap_or(("", name.as_str()));
            path_marker(scope.file, receiver, last).unwrap_or(name.clone())
        } else {
            name
        };
        sink.add_relationship(&scope.source_id(line), &target, RelationshipType::Instantiates, line);
    }

    fn extract_import_relationships(&self, node: Node, scope: &FileScope, sink: &mut dyn EdgeSink) {
        if node.kind() != "use_declaration" {
            return;
        }
        let line = line_of(node);
        for binding in use_bindings(node, scope.source) {
            if let Some(marker) = marker(scope.file, &binding.path) {
                sink.add_relationship(&scope.module_id(), &marker, RelationshipType::Imports, line);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{file_module, module_path};
    use crate::index::{module_id, RelationshipType, SymbolKind, Visibility};
    use crate::lang::test_support::{analyze, has_edge, symbol};

    const MODEL: &str = r#"
use std::fmt;

pub struct Order {
    pub id: u64,
}

impl Order {
    pub fn new(id: u64) -> Self {
        Self::checked(id)
    }

    fn checked(id: u64) -> Self {
        Order { id }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}
"#;

    const SERVICE: &str = r#"
use crate::orders::model::Order;

#[deprecated(note = "use Checkout")]
pub struct OrderService;

impl OrderService {
    pub fn place(&self, id: u64) -> Order {
        self.audit(id);
        crate::util::log_line("placed");
        Order::new(id)
    }

    fn audit(&self, id: u64) {}
}
"#;

    const UTIL: &str = r#"
pub fn log_line(message: &str) {}

pub mod text {
    pub fn pad(value: &str) -> String {
        value.to_string()
    }
}
"#;

    #[test]
    fn test_impl_methods_and_modules() {
        let (symbols, _) = analyze(&[("src/orders/model.rs", MODEL), ("src/util.rs", UTIL)]);

        let order = symbol(&symbols, "Order");
        assert_eq!(order.kind, SymbolKind::Struct);
        let new = symbol(&symbols, "Order::new");
        assert_eq!(new.kind, SymbolKind::Method);
        assert_eq!(new.parent.as_deref(), Some(order.id.as_str()));
        assert_eq!(new.visibility, Some(Visibility::Public));
        assert_eq!(symbol(&symbols, "Order::checked").visibility, Some(Visibility::Private));

        assert_eq!(symbol(&symbols, "text").kind, SymbolKind::Module);
        assert_eq!(symbol(&symbols, "text::pad").kind, SymbolKind::Function);
    }

    #[test]
    fn test_paths_and_impls() {
        let files = [
            ("src/orders/model.rs", MODEL),
            ("src/orders/service.rs", SERVICE),
            ("src/util.rs", UTIL),
        ];
        let (symbols, rels) = analyze(&files);

        assert!(symbol(&symbols, "OrderService").deprecated);
        let place = "OrderService::place";
        assert!(has_edge(&symbols, &rels, place, "OrderService::audit", RelationshipType::Calls));
        assert!(has_edge(&symbols, &rels, place, "log_line", RelationshipType::Calls));
        assert!(has_edge(&symbols, &rels, place, "Order::new", RelationshipType::Calls));
        assert!(has_edge(&symbols, &rels, "Order::new", "Order::checked", RelationshipType::Calls));
        assert!(has_edge(&symbols, &rels, "Order::checked", "Order", RelationshipType::Instantiates));
        assert!(has_edge(&symbols, &rels, &module_id("src/orders/service.rs"), "Order", RelationshipType::Imports));
    }

    #[test]
    fn test_module_paths() {
        assert_eq!(file_module("src/net/mod.rs"), "src/net");
        assert_eq!(file_module("src/net/client.rs"), "src/net/client");
        let segs = |s: &str| s.split("::").map(str::to_string).collect::<Vec<_>>();
        assert_eq!(module_path("src/net/client.rs", &segs("crate::orders")), "orders");
        assert_eq!(module_path("src/net/client.rs", &segs("super::pool")), "src/net/pool");
        assert_eq!(module_path("src/net/client.rs", &segs("self::retry")), "src/net/client/retry");
    }
}
