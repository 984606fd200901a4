//! PHP strategy: backslash namespaces, traits, Laravel-style events

use std::collections::HashMap;

use tree_sitter::Node;

use super::{
    classify_arguments, field_text, has_deprecation_marker, line_of, mentions_deprecated,
    named_children, node_text, starts_uppercase, type_name, CallSite, Declaration, EdgeSink,
    FileScope, Language, LanguageStrategy,
};
use crate::index::{short_name, RelationshipType, SymbolKind, Visibility};

pub struct PhpStrategy;

const STRING_KINDS: &[&str] = &["string", "encapsed_string"];

const PSEUDO_SCOPES: &[&str] = &["self", "static", "parent"];

fn is_name(node: Node) -> bool {
    matches!(node.kind(), "name" | "qualified_name")
}

fn names_in(node: Node, source: &str) -> Vec<String> {
    named_children(node)
        .into_iter()
        .filter(|n| is_name(*n))
        .map(|n| type_name(node_text(n, source)))
        .collect()
}

fn child_of_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    named_children(node).into_iter().find(|n| n.kind() == kind)
}

/// `(local alias, fully qualified name)` pairs of a `use` statement
fn use_bindings(node: Node, source: &str) -> Vec<(String, String)> {
    let prefix = child_of_kind(node, "namespace_name")
        .map(|n| format!("{}\\", type_name(node_text(n, source))))
        .unwrap_or_default();

    let mut clauses = Vec::new();
    for child in named_children(node) {
        match child.kind() {
            "namespace_use_clause" => clauses.push(child),
            "namespace_use_group" => clauses.extend(
                named_children(child)
                    .into_iter()
                    .filter(|n| n.kind().starts_with("namespace_use")),
            ),
            _ => {}
        }
    }

    clauses
        .into_iter()
        .filter_map(|clause| {
            let target = named_children(clause).into_iter().find(|n| is_name(*n))?;
            let qualified = format!("{}{}", prefix, type_name(node_text(target, source)));
            let alias = field_text(clause, "alias", source)
                .map(str::to_string)
                .or_else(|| {
                    child_of_kind(clause, "namespace_aliasing_clause")
                        .and_then(|a| child_of_kind(a, "name"))
                        .map(|n| node_text(n, source).to_string())
                })
                .filter(|alias| alias.as_str() != node_text(target, source))
                .unwrap_or_else(|| short_name(&qualified).to_string());
            Some((alias, qualified))
        })
        .collect()
}

/// Class name of a `new X(...)` expression
fn created_class(node: Node, source: &str) -> Option<String> {
    if node.kind() != "object_creation_expression" {
        return None;
    }
    named_children(node)
        .into_iter()
        .find(|n| is_name(*n))
        .map(|n| type_name(node_text(n, source)))
}

/// First argument expression of a call, unwrapped from its `argument` node
fn first_argument(node: Node) -> Option<Node> {
    let args = node.child_by_field_name("arguments")?;
    let first = named_children(args).into_iter().next()?;
    if first.kind() == "argument" {
        named_children(first).into_iter().next()
    } else {
        Some(first)
    }
}

/// Class named through a static access (`Foo::bar()`, `Foo::CONST`), ignoring `self` and friends
fn static_scope(node: Node, source: &str) -> Option<String> {
    let scope = node.child_by_field_name("scope")?;
    if !is_name(scope) {
        return None;
    }
    let name = type_name(node_text(scope, source));
    (!PSEUDO_SCOPES.contains(&name.as_str())).then_some(name)
}

impl LanguageStrategy for PhpStrategy {
    fn language(&self) -> Language {
        Language::Php
    }

    fn declaration(&self, node: Node, source: &str) -> Option<Declaration> {
        let kind = match node.kind() {
            "class_declaration" => SymbolKind::Class,
            "interface_declaration" => SymbolKind::Interface,
            "trait_declaration" => SymbolKind::Trait,
            "enum_declaration" => SymbolKind::Enum,
            "method_declaration" => SymbolKind::Method,
            "function_definition" => SymbolKind::Function,
            _ => return None,
        };
        let name = field_text(node, "name", source)?;
        Some(Declaration::new(name, kind))
    }

    fn extract_namespace(&self, root: Node, source: &str) -> Option<String> {
        let namespace = child_of_kind(root, "namespace_definition")?;
        field_text(namespace, "name", source).map(type_name)
    }

    fn namespace_separator(&self) -> &'static str {
        "\\"
    }

    fn extract_extends(&self, node: Node, source: &str) -> Option<String> {
        let base = child_of_kind(node, "base_clause")?;
        names_in(base, source).into_iter().next()
    }

    fn extract_implements(&self, node: Node, source: &str) -> Option<Vec<String>> {
        let clause = child_of_kind(node, "class_interface_clause")?;
        Some(names_in(clause, source))
    }

    fn extract_traits(&self, node: Node, source: &str) -> Option<Vec<String>> {
        let body = node.child_by_field_name("body")?;
        let traits: Vec<String> = named_children(body)
            .into_iter()
            .filter(|n| n.kind() == "use_declaration")
            .flat_map(|n| names_in(n, source))
            .collect();
        (!traits.is_empty()).then_some(traits)
    }

    fn extract_visibility(&self, node: Node, source: &str) -> Option<Visibility> {
        if node.kind() != "method_declaration" {
            return None;
        }
        let modifier = child_of_kind(node, "visibility_modifier").map(|n| node_text(n, source));
        match modifier {
            Some("private") => Some(Visibility::Private),
            Some("protected") => Some(Visibility::Protected),
            _ => Some(Visibility::Public),
        }
    }

    fn detect_deprecated(&self, node: Node, source: &str) -> bool {
        has_deprecation_marker(node, source)
            || named_children(node)
                .into_iter()
                .any(|n| n.kind() == "attribute_list" && mentions_deprecated(node_text(n, source)))
    }

    fn extract_imports(&self, root: Node, source: &str, _file: &str) -> HashMap<String, String> {
        let mut statements = named_children(root);
        // braced namespaces keep their `use` statements inside the body
        if let Some(body) = child_of_kind(root, "namespace_definition")
            .and_then(|ns| ns.child_by_field_name("body"))
        {
            statements.extend(named_children(body));
        }
        statements
            .into_iter()
            .filter(|n| n.kind() == "namespace_use_declaration")
            .flat_map(|n| use_bindings(n, source))
            .collect()
    }

    fn imports_are_paths(&self) -> bool {
        false
    }

    fn call_site(&self, node: Node, source: &str) -> Option<CallSite> {
        let line = line_of(node);
        let call = match node.kind() {
            "function_call_expression" => {
                let function = node.child_by_field_name("function")?;
                if !is_name(function) {
                    return None;
                }
                CallSite::new(type_name(node_text(function, source)), None, line)
            }
            "member_call_expression" | "nullsafe_member_call_expression" => {
                let name = field_text(node, "name", source)?;
                let object = field_text(node, "object", source)?;
                CallSite::new(name, Some(object.to_string()), line)
            }
            "scoped_call_expression" => {
                let name = field_text(node, "name", source)?;
                let scope = field_text(node, "scope", source)?;
                CallSite::new(name, Some(type_name(scope)), line).scoped()
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
            Some(receiver) if receiver.contains('\\') => Some(format!("{}.{}", receiver, call.callee)),
            Some("$this" | "self" | "static") => {
                let caller = scope.enclosing_callable(call.line)?;
                let owner = scope.owner_of(caller)?;
                Some(format!("{}.{}", owner.qualified_name, call.callee))
            }
            Some(receiver) if call.scoped && starts_uppercase(receiver) => {
                let class = scope
                    .context
                    .imports
                    .get(receiver)
                    .cloned()
                    .unwrap_or_else(|| receiver.to_string());
                Some(format!("{}.{}", class, call.callee))
            }
            Some(_) => None,
            None => Some(call.callee.clone()),
        }
    }

    fn extract_call_relationships(&self, node: Node, scope: &FileScope, sink: &mut dyn EdgeSink) {
        if let Some(call) = self.call_site(node, scope.source) {
            if let Some(target) = self.call_target(&call, scope) {
                sink.add_relationship(
                    &scope.source_id(call.line),
                    &target,
                    RelationshipType::Calls,
                    call.line,
                );
            }
        }

        if matches!(
            node.kind(),
            "scoped_call_expression" | "class_constant_access_expression" | "scoped_property_access_expression"
        ) {
            if let Some(class) = static_scope(node, scope.source) {
                let line = line_of(node);
                sink.add_relationship(&scope.source_id(line), &class, RelationshipType::Uses, line);
            }
        }
    }

    fn extract_instantiation_relationships(
        &self,
        node: Node,
        scope: &FileScope,
        sink: &mut dyn EdgeSink,
    ) {
        if let Some(class) = created_class(node, scope.source) {
            let line = line_of(node);
            sink.add_relationship(&scope.source_id(line), &class, RelationshipType::Instantiates, line);
        }
    }

    fn extract_import_relationships(&self, node: Node, scope: &FileScope, sink: &mut dyn EdgeSink) {
        if node.kind() != "namespace_use_declaration" {
            return;
        }
        let line = line_of(node);
        for (_, qualified) in use_bindings(node, scope.source) {
            sink.add_relationship(&scope.module_id(), &qualified, RelationshipType::Imports, line);
        }
    }

    fn extract_event_listener_relationships(
        &self,
        node: Node,
        scope: &FileScope,
        sink: &mut dyn EdgeSink,
    ) {
        let line = line_of(node);
        match node.kind() {
            // event(new OrderPlaced($order))
            "function_call_expression" => {
                let is_event_helper = node
                    .child_by_field_name("function")
                    .is_some_and(|f| node_text(f, scope.source) == "event");
                if !is_event_helper {
                    return;
                }
                if let Some(event) = first_argument(node).and_then(|a| created_class(a, scope.source)) {
                    sink.add_relationship(&scope.source_id(line), &event, RelationshipType::Dispatches, line);
                }
            }
            // OrderPlaced::dispatch($order)
            "scoped_call_expression" => {
                if field_text(node, "name", scope.source) != Some("dispatch") {
                    return;
                }
                if let Some(event) = static_scope(node, scope.source) {
                    sink.add_relationship(&scope.source_id(line), &event, RelationshipType::Dispatches, line);
                }
            }
            // public function handle(OrderPlaced $event)
            "method_declaration" => {
                if field_text(node, "name", scope.source) != Some("handle") {
                    return;
                }
                let Some(listener) = scope
                    .declared_at("handle", line)
                    .and_then(|method| scope.owner_of(method))
                else {
                    return;
                };
                let event = node
                    .child_by_field_name("parameters")
                    .and_then(|params| named_children(params).into_iter().next())
                    .and_then(|param| param.child_by_field_name("type"))
                    .map(|ty| type_name(node_text(ty, scope.source)));
                if let Some(event) = event.filter(|e| starts_uppercase(e)) {
                    sink.add_relationship(&listener.id, &event, RelationshipType::ListensTo, line);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::index::{module_id, RelationshipType, SymbolKind, Visibility};
    use crate::lang::test_support::{analyze, has_edge, symbol};

    const BASE: &str = r#"<?php
namespace App\Services;

abstract class BaseService
{
    protected function audit(string $message): void {}
}
"#;

    const EVENT: &str = r#"<?php
namespace App\Events;

class OrderPlaced
{
    public static function dispatch($order) {}
}
"#;

    const ORDER: &str = r#"<?php
namespace App\Services;

use App\Events\OrderPlaced;
use App\Support\Loggable as CanLog;

/**
 * @deprecated use CheckoutService
 */
class OrderService extends BaseService implements Contracts\Auditable
{
    use CanLog;

    public function createOrder(array $data)
    {
        $this->validate($data);
        event(new OrderPlaced($data));
        OrderPlaced::dispatch($data);
        return $data;
    }

    private function validate(array $data) {}
}
"#;

    const LISTENER: &str = r#"<?php
namespace App\Listeners;

use App\Events\OrderPlaced;

class SendReceipt
{
    public function handle(OrderPlaced $event) {}
}
"#;

    const TRAIT: &str = r#"<?php
namespace App\Support;

trait Loggable
{
}
"#;

    #[test]
    fn test_namespaced_symbols() {
        let (symbols, _) = analyze(&[("app/Services/OrderService.php", ORDER)]);

        let service = symbol(&symbols, "App\\Services\\OrderService");
        assert_eq!(service.name, "OrderService");
        assert_eq!(service.kind, SymbolKind::Service);
        assert_eq!(service.extends.as_deref(), Some("BaseService"));
        assert_eq!(service.implements, vec!["Contracts\\Auditable".to_string()]);
        assert_eq!(service.uses_traits, vec!["CanLog".to_string()]);
        assert!(service.deprecated);

        let validate = symbol(&symbols, "App\\Services\\OrderService.validate");
        assert_eq!(validate.kind, SymbolKind::Method);
        assert_eq!(validate.visibility, Some(Visibility::Private));
    }

    #[test]
    fn test_relationships_and_events() {
        let files = [
            ("app/Services/BaseService.php", BASE),
            ("app/Events/OrderPlaced.php", EVENT),
            ("app/Services/OrderService.php", ORDER),
            ("app/Listeners/SendReceipt.php", LISTENER),
            ("app/Support/Loggable.php", TRAIT),
        ];
        let (symbols, rels) = analyze(&files);

        let service = "App\\Services\\OrderService";
        let create = "App\\Services\\OrderService.createOrder";
        let event = "App\\Events\\OrderPlaced";

        assert!(has_edge(&symbols, &rels, service, "App\\Services\\BaseService", RelationshipType::Inherits));
        assert!(has_edge(&symbols, &rels, service, "App\\Support\\Loggable", RelationshipType::UsesTrait));
        assert!(has_edge(&symbols, &rels, create, "App\\Services\\OrderService.validate", RelationshipType::Calls));
        assert!(has_edge(&symbols, &rels, create, event, RelationshipType::Dispatches));
        assert!(has_edge(&symbols, &rels, create, "App\\Events\\OrderPlaced.dispatch", RelationshipType::Calls));
        assert!(has_edge(&symbols, &rels, "App\\Listeners\\SendReceipt", event, RelationshipType::ListensTo));
        assert!(has_edge(
            &symbols,
            &rels,
            &module_id("app/Services/OrderService.php"),
            event,
            RelationshipType::Imports
        ));
    }
}
