//! Go strategy: package-qualified names, receiver methods

use std::collections::HashMap;

use tree_sitter::Node;

use super::{
    classify_arguments, field_text, has_deprecation_marker, line_of, named_children, node_text,
    starts_uppercase, type_name, unquote, CallSite, Declaration, EdgeSink, FileScope, Language,
    LanguageStrategy,
};
use crate::index::{RelationshipType, SymbolKind, Visibility};

pub struct GoStrategy;

const STRING_KINDS: &[&str] = &["interpreted_string_literal", "raw_string_literal"];

fn child_of_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    named_children(node).into_iter().find(|n| n.kind() == kind)
}

/// The receiver parameter of a method declaration
fn receiver_param(method: Node) -> Option<Node> {
    let params = method.child_by_field_name("receiver")?;
    child_of_kind(params, "parameter_declaration")
}

/// Receiver type name without pointer or type arguments
fn receiver_type(method: Node, source: &str) -> Option<String> {
    let ty = receiver_param(method)?.child_by_field_name("type")?;
    Some(type_name(node_text(ty, source)))
}

fn import_specs(node: Node) -> Vec<Node> {
    let mut specs = Vec::new();
    for child in named_children(node) {
        match child.kind() {
            "import_spec" => specs.push(child),
            "import_spec_list" => specs.extend(
                named_children(child)
                    .into_iter()
                    .filter(|n| n.kind() == "import_spec"),
            ),
            _ => {}
        }
    }
    specs
}

/// `(package name, import path)`; blank and dot imports bind nothing
fn import_binding(spec: Node, source: &str) -> Option<(String, String)> {
    let path = unquote(field_text(spec, "path", source)?);
    let local = match spec.child_by_field_name("name") {
        Some(name) if name.kind() == "package_identifier" => node_text(name, source).to_string(),
        Some(_) => return None,
        None => path.rsplit('/').next().unwrap_or(&path).to_string(),
    };
    Some((local, path))
}

fn is_exported_name(name: &str) -> bool {
    starts_uppercase(name)
}

impl GoStrategy {
    /// Name handed to the resolver for `T{}` or `pkg.T{}`
    fn literal_type(&self, node: Node, scope: &FileScope) -> Option<String> {
        let ty = node.child_by_field_name("type")?;
        match ty.kind() {
            "type_identifier" => Some(node_text(ty, scope.source).to_string()),
            "generic_type" => Some(type_name(node_text(ty, scope.source))),
            "qualified_type" => {
                let package = field_text(ty, "package", scope.source)?;
                let name = field_text(ty, "name", scope.source)?;
                let path = scope.context.imports.get(package)?;
                Some(format!("{}::{}", path, name))
            }
            _ => None,
        }
    }

    /// Receiver variable name of the method enclosing `node`
    fn enclosing_receiver<'s>(&self, node: Node, source: &'s str) -> Option<&'s str> {
        let mut current = node.parent();
        while let Some(ancestor) = current {
            if ancestor.kind() == "method_declaration" {
                return receiver_param(ancestor).and_then(|p| field_text(p, "name", source));
            }
            if ancestor.kind() == "function_declaration" {
                return None;
            }
            current = ancestor.parent();
        }
        None
    }
}

impl LanguageStrategy for GoStrategy {
    fn language(&self) -> Language {
        Language::Go
    }

    fn declaration(&self, node: Node, source: &str) -> Option<Declaration> {
        match node.kind() {
            "function_declaration" => {
                Some(Declaration::new(field_text(node, "name", source)?, SymbolKind::Function))
            }
            "method_declaration" => {
                let name = field_text(node, "name", source)?;
                let owner = receiver_type(node, source)?;
                Some(Declaration::new(name, SymbolKind::Method).owned_by(owner))
            }
            "type_spec" | "type_alias" => {
                let name = field_text(node, "name", source)?;
                let kind = match node.child_by_field_name("type").map(|t| t.kind()) {
                    Some("struct_type") => SymbolKind::Struct,
                    Some("interface_type") => SymbolKind::Interface,
                    _ => SymbolKind::Type,
                };
                Some(Declaration::new(name, kind))
            }
            _ => None,
        }
    }

    fn extract_namespace(&self, root: Node, source: &str) -> Option<String> {
        let clause = child_of_kind(root, "package_clause")?;
        child_of_kind(clause, "package_identifier").map(|n| node_text(n, source).to_string())
    }

    fn extract_visibility(&self, node: Node, source: &str) -> Option<Visibility> {
        let name = field_text(node, "name", source)?;
        Some(if is_exported_name(name) {
            Visibility::Public
        } else {
            Visibility::Private
        })
    }

    fn is_exported(&self, node: Node, source: &str) -> Option<bool> {
        field_text(node, "name", source).map(is_exported_name)
    }

    fn detect_deprecated(&self, node: Node, source: &str) -> bool {
        // doc comments of `type X struct` sit above the enclosing type declaration
        has_deprecation_marker(node, source)
            || node
                .parent()
                .filter(|p| p.kind() == "type_declaration")
                .is_some_and(|p| has_deprecation_marker(p, source))
    }

    fn extract_imports(&self, root: Node, source: &str, _file: &str) -> HashMap<String, String> {
        named_children(root)
            .into_iter()
            .filter(|n| n.kind() == "import_declaration")
            .flat_map(import_specs)
            .filter_map(|spec| import_binding(spec, source))
            .collect()
    }

    fn call_site(&self, node: Node, source: &str) -> Option<CallSite> {
        if node.kind() != "call_expression" {
            return None;
        }
        let function = node.child_by_field_name("function")?;
        let call = match function.kind() {
            "identifier" => CallSite::new(node_text(function, source), None, line_of(node)),
            "selector_expression" => {
                let field = field_text(function, "field", source)?;
                let operand = field_text(function, "operand", source)?;
                CallSite::new(field, Some(operand.to_string()), line_of(node))
            }
            _ => return None,
        };
        let arguments = node
            .child_by_field_name("arguments")
            .map(|args| classify_arguments(args, source, STRING_KINDS))
            .unwrap_or_default();
        Some(call.with_arguments(arguments))
    }

    fn extract_call_relationships(&self, node: Node, scope: &FileScope, sink: &mut dyn EdgeSink) {
        let Some(call) = self.call_site(node, scope.source) else {
            return;
        };
        let receiver_var = self.enclosing_receiver(node, scope.source);
        let target = match call.receiver.as_deref() {
            // `s.validate()` inside `func (s *OrderService) ...`
            Some(receiver) if Some(receiver) == receiver_var => scope
                .enclosing_callable(call.line)
                .and_then(|method| method.qualified_name.rsplit_once('.'))
                .map(|(owner, _)| format!("{}.{}", owner, call.callee)),
            _ => self.call_target(&call, scope),
        };
        if let Some(target) = target {
            sink.add_relationship(&scope.source_id(call.line), &target, RelationshipType::Calls, call.line);
        }
    }

    fn extract_instantiation_relationships(
        &self,
        node: Node,
        scope: &FileScope,
        sink: &mut dyn EdgeSink,
    ) {
        if node.kind() != "composite_literal" {
            return;
        }
        if let Some(target) = self.literal_type(node, scope) {
            let line = line_of(node);
            sink.add_relationship(&scope.source_id(line), &target, RelationshipType::Instantiates, line);
        }
    }
}
