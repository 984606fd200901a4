//! Java strategy

use std::collections::HashMap;

use tree_sitter::Node;

use super::{
    classify_arguments, field_text, has_deprecation_marker, line_of, named_children, node_text,
    starts_uppercase, type_name, CallSite, Declaration, EdgeSink, FileScope, Language,
    LanguageStrategy,
};
use crate::index::{RelationshipType, SymbolKind, Visibility};

pub struct JavaStrategy;

const LISTENER_ANNOTATIONS: &[&str] = &["EventListener", "Subscribe", "TransactionalEventListener"];

const PUBLISH_METHODS: &[&str] = &["publishEvent", "post", "fire"];

fn child_of_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    named_children(node).into_iter().find(|n| n.kind() == kind)
}

/// Type names listed in a `type_list`, or directly under the clause
fn type_names(clause: Node, source: &str) -> Vec<String> {
    let list = child_of_kind(clause, "type_list").unwrap_or(clause);
    named_children(list)
        .into_iter()
        .filter(|n| n.kind().ends_with("type_identifier") || n.kind() == "generic_type")
        .map(|n| type_name(node_text(n, source)))
        .collect()
}

fn modifiers(node: Node) -> Option<Node> {
    child_of_kind(node, "modifiers")
}

fn annotation_names(node: Node, source: &str) -> Vec<String> {
    let Some(mods) = modifiers(node) else {
        return Vec::new();
    };
    named_children(mods)
        .into_iter()
        .filter(|n| matches!(n.kind(), "marker_annotation" | "annotation"))
        .filter_map(|n| field_text(n, "name", source))
        .map(|name| name.rsplit('.').next().unwrap_or(name).to_string())
        .collect()
}

/// `(simple name, fully qualified name)` of a non-wildcard import
fn import_binding(node: Node, source: &str) -> Option<(String, String)> {
    if node.kind() != "import_declaration" || child_of_kind(node, "asterisk").is_some() {
        return None;
    }
    let path = named_children(node)
        .into_iter()
        .find(|n| matches!(n.kind(), "scoped_identifier" | "identifier"))?;
    let qualified = node_text(path, source).to_string();
    let simple = qualified.rsplit('.').next().unwrap_or(&qualified).to_string();
    Some((simple, qualified))
}

impl LanguageStrategy for JavaStrategy {
    fn language(&self) -> Language {
        Language::Java
    }

    fn declaration(&self, node: Node, source: &str) -> Option<Declaration> {
        let kind = match node.kind() {
            "class_declaration" | "record_declaration" => SymbolKind::Class,
            "interface_declaration" | "annotation_type_declaration" => SymbolKind::Interface,
            "enum_declaration" => SymbolKind::Enum,
            "method_declaration" | "constructor_declaration" => SymbolKind::Method,
            _ => return None,
        };
        let name = field_text(node, "name", source)?;
        Some(Declaration::new(name, kind))
    }

    fn extract_namespace(&self, root: Node, source: &str) -> Option<String> {
        let package = child_of_kind(root, "package_declaration")?;
        named_children(package)
            .into_iter()
            .find(|n| matches!(n.kind(), "scoped_identifier" | "identifier"))
            .map(|n| node_text(n, source).to_string())
    }

    fn extract_extends(&self, node: Node, source: &str) -> Option<String> {
        match node.kind() {
            "class_declaration" => {
                let superclass = node.child_by_field_name("superclass")?;
                type_names(superclass, source).into_iter().next()
            }
            // an interface's first parent reads as its base
            "interface_declaration" => {
                let clause = child_of_kind(node, "extends_interfaces")?;
                type_names(clause, source).into_iter().next()
            }
            _ => None,
        }
    }

    fn extract_implements(&self, node: Node, source: &str) -> Option<Vec<String>> {
        match node.kind() {
            "class_declaration" | "enum_declaration" | "record_declaration" => {
                let clause = node
                    .child_by_field_name("interfaces")
                    .or_else(|| child_of_kind(node, "super_interfaces"))?;
                Some(type_names(clause, source))
            }
            "interface_declaration" => {
                let clause = child_of_kind(node, "extends_interfaces")?;
                let rest: Vec<String> = type_names(clause, source).into_iter().skip(1).collect();
                (!rest.is_empty()).then_some(rest)
            }
            _ => None,
        }
    }

    fn extract_visibility(&self, node: Node, source: &str) -> Option<Visibility> {
        let words = modifiers(node).map(|m| node_text(m, source)).unwrap_or("");
        let has = |word: &str| words.split_whitespace().any(|w| w == word);
        if has("private") {
            Some(Visibility::Private)
        } else if has("protected") {
            Some(Visibility::Protected)
        } else if has("public") {
            Some(Visibility::Public)
        } else {
            None
        }
    }

    fn is_exported(&self, node: Node, source: &str) -> Option<bool> {
        if node.kind().ends_with("method_declaration") || node.kind() == "constructor_declaration" {
            return None;
        }
        Some(self.extract_visibility(node, source) == Some(Visibility::Public))
    }

    fn detect_deprecated(&self, node: Node, source: &str) -> bool {
        has_deprecation_marker(node, source)
            || annotation_names(node, source).iter().any(|a| a == "Deprecated")
    }

    fn signature(&self, node: Node, source: &str) -> Option<String> {
        // skip annotations so the signature starts at the modifiers or name
        let start = modifiers(node)
            .and_then(|m| {
                named_children(m)
                    .into_iter()
                    .rev()
                    .find(|n| n.kind().ends_with("annotation"))
            })
            .map(|last| last.end_byte())
            .unwrap_or_else(|| node.start_byte());
        let text = source.get(start..node.end_byte())?;
        let line = text.trim_start().lines().next()?.trim();
        let line = line.trim_end_matches('{').trim_end();
        (!line.is_empty()).then(|| line.chars().take(200).collect())
    }

    fn extract_imports(&self, root: Node, source: &str, _file: &str) -> HashMap<String, String> {
        named_children(root)
            .into_iter()
            .filter_map(|n| import_binding(n, source))
            .collect()
    }

    fn imports_are_paths(&self) -> bool {
        false
    }

    fn call_site(&self, node: Node, source: &str) -> Option<CallSite> {
        if node.kind() != "method_invocation" {
            return None;
        }
        let name = field_text(node, "name", source)?;
        let receiver = field_text(node, "object", source).map(str::to_string);
        let arguments = node
            .child_by_field_name("arguments")
            .map(|args| classify_arguments(args, source, &["string_literal"]))
            .unwrap_or_default();
        Some(CallSite::new(name, receiver, line_of(node)).with_arguments(arguments))
    }

    fn call_target(&self, call: &CallSite, scope: &FileScope) -> Option<String> {
        match call.receiver.as_deref() {
            // unqualified calls go to the enclosing class
            None | Some("this") => {
                let owner = scope
                    .enclosing_callable(call.line)
                    .and_then(|caller| scope.owner_of(caller));
                match owner {
                    Some(owner) => Some(format!("{}.{}", owner.qualified_name, call.callee)),
                    None => Some(call.callee.clone()),
                }
            }
            Some(receiver) => match scope.context.imports.get(receiver) {
                Some(qualified) => Some(format!("{}.{}", qualified, call.callee)),
                None if starts_uppercase(receiver) && !receiver.contains('(') => {
                    Some(format!("{}.{}", receiver, call.callee))
                }
                None => None,
            },
        }
    }

    fn extract_instantiation_relationships(
        &self,
        node: Node,
        scope: &FileScope,
        sink: &mut dyn EdgeSink,
    ) {
        if node.kind() != "object_creation_expression" {
            return;
        }
        if let Some(class) = field_text(node, "type", scope.source).map(type_name) {
            let line = line_of(node);
            sink.add_relationship(&scope.source_id(line), &class, RelationshipType::Instantiates, line);
        }
    }

    fn extract_import_relationships(&self, node: Node, scope: &FileScope, sink: &mut dyn EdgeSink) {
        if let Some((_, qualified)) = import_binding(node, scope.source) {
            sink.add_relationship(&scope.module_id(), &qualified, RelationshipType::Imports, line_of(node));
        }
    }

    fn extract_call_relationships(&self, node: Node, scope: &FileScope, sink: &mut dyn EdgeSink) {
        if node.kind() == "field_declaration" {
            // injected collaborators: `private final OrderRepository repository;`
            let Some(field_type) = field_text(node, "type", scope.source).map(type_name) else {
                return;
            };
            if starts_uppercase(&field_type) {
                let line = line_of(node);
                sink.add_relationship(&scope.source_id(line), &field_type, RelationshipType::Uses, line);
            }
            return;
        }

        let Some(call) = self.call_site(node, scope.source) else {
            return;
        };
        if let Some(target) = self.call_target(&call, scope) {
            sink.add_relationship(&scope.source_id(call.line), &target, RelationshipType::Calls, call.line);
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
            // publisher.publishEvent(new OrderPlaced(order))
            "method_invocation" => {
                let Some(name) = field_text(node, "name", scope.source) else {
                    return;
                };
                if !PUBLISH_METHODS.contains(&name) {
                    return;
                }
                let event = node
                    .child_by_field_name("arguments")
                    .and_then(|args| named_children(args).into_iter().next())
                    .filter(|arg| arg.kind() == "object_creation_expression")
                    .and_then(|arg| field_text(arg, "type", scope.source))
                    .map(type_name);
                if let Some(event) = event {
                    sink.add_relationship(&scope.source_id(line), &event, RelationshipType::Dispatches, line);
                }
            }
            // @EventListener public void on(OrderPlaced event)
            "method_declaration" => {
                let annotated = annotation_names(node, scope.source)
                    .iter()
                    .any(|a| LISTENER_ANNOTATIONS.contains(&a.as_str()));
                if !annotated {
                    return;
                }
                let Some(method) = field_text(node, "name", scope.source)
                    .and_then(|name| scope.declared_at(name, line))
                else {
                    return;
                };
                let event = node
                    .child_by_field_name("parameters")
                    .and_then(|params| named_children(params).into_iter().find(|p| p.kind() == "formal_parameter"))
                    .and_then(|param| field_text(param, "type", scope.source))
                    .map(type_name);
                if let Some(event) = event {
                    sink.add_relationship(&method.id, &event, RelationshipType::ListensTo, line);
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

    const EVENT: &str = r#"
package com.shop.events;

public class OrderPlaced {
    public OrderPlaced(Object order) {}
}
"#;

    const REPOSITORY: &str = r#"
package com.shop.orders;

public interface OrderRepository {
    void save(Object order);
}
"#;

    const SERVICE: &str = r#"
package com.shop.orders;

import com.shop.events.OrderPlaced;
import org.springframework.context.ApplicationEventPublisher;

@Deprecated
public class OrderService extends BaseService implements Auditable {
    private final OrderRepository repository;
    private final ApplicationEventPublisher publisher;

    public void createOrder(Object order) {
        validate(order);
        repository.save(order);
        publisher.publishEvent(new OrderPlaced(order));
    }

    private void validate(Object order) {}
}

class BaseService {}
"#;

    const LISTENER: &str = r#"
package com.shop.mail;

import com.shop.events.OrderPlaced;

public class ReceiptMailer {
    @EventListener
    public void onOrderPlaced(OrderPlaced event) {}
}
"#;

    #[test]
    fn test_package_qualified_symbols() {
        let (symbols, _) = analyze(&[("src/main/java/com/shop/orders/OrderService.java", SERVICE)]);

        let service = symbol(&symbols, "com.shop.orders.OrderService");
        assert_eq!(service.kind, SymbolKind::Service);
        assert_eq!(service.extends.as_deref(), Some("BaseService"));
        assert_eq!(service.implements, vec!["Auditable".to_string()]);
        assert_eq!(service.exported, Some(true));
        assert!(service.deprecated);
        assert_eq!(service.signature.as_deref(), Some("public class OrderService extends BaseService implements Auditable"));

        let validate = symbol(&symbols, "com.shop.orders.OrderService.validate");
        assert_eq!(validate.kind, SymbolKind::Method);
        assert_eq!(validate.visibility, Some(Visibility::Private));
        assert_eq!(symbol(&symbols, "com.shop.orders.BaseService").exported, Some(false));
    }

    #[test]
    fn test_calls_fields_and_events() {
        let files = [
            ("src/main/java/com/shop/events/OrderPlaced.java", EVENT),
            ("src/main/java/com/shop/orders/OrderRepository.java", REPOSITORY),
            ("src/main/java/com/shop/orders/OrderService.java", SERVICE),
            ("src/main/java/com/shop/mail/ReceiptMailer.java", LISTENER),
        ];
        let (symbols, rels) = analyze(&files);

        let service = "com.shop.orders.OrderService";
        let create = "com.shop.orders.OrderService.createOrder";
        let event = "com.shop.events.OrderPlaced";

        assert!(has_edge(&symbols, &rels, service, "com.shop.orders.BaseService", RelationshipType::Inherits));
        assert!(has_edge(&symbols, &rels, service, "com.shop.orders.OrderRepository", RelationshipType::Uses));
        assert!(has_edge(&symbols, &rels, create, "com.shop.orders.OrderService.validate", RelationshipType::Calls));
        assert!(has_edge(&symbols, &rels, create, event, RelationshipType::Dispatches));
        assert!(has_edge(
            &symbols,
            &rels,
            "com.shop.mail.ReceiptMailer.onOrderPlaced",
            event,
            RelationshipType::ListensTo
        ));
        assert!(has_edge(
            &symbols,
            &rels,
            &module_id("src/main/java/com/shop/mail/ReceiptMailer.java"),
            event,
            RelationshipType::Imports
        ));
        // the repository is reached through a field, not a type
        assert!(!has_edge(&symbols, &rels, create, "com.shop.orders.OrderRepository.save", RelationshipType::Calls));
    }
}
