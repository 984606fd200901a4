//! Python strategy

use std::collections::HashMap;

use tree_sitter::Node;

use super::{
    classify_arguments, field_text, has_deprecation_marker, line_of, mentions_deprecated,
    named_children, node_text, starts_uppercase, CallSite, Declaration, EdgeSink, FileScope,
    Language, LanguageStrategy,
};
use crate::index::{RelationshipType, SymbolKind, Visibility};

pub struct PythonStrategy;

/// Slash path of a dotted module, resolving leading dots against the importing file
fn module_path(file: &str, module: &str) -> String {
    let dots = module.chars().take_while(|c| *c == '.').count();
    let dotted = &module[dots..];
    let mut parts: Vec<&str> = Vec::new();
    if dots > 0 {
        parts = file.split('/').collect();
        parts.pop();
        for _ in 1..dots {
            parts.pop();
        }
    }
    parts.extend(dotted.split('.').filter(|s| !s.is_empty()));
    parts.join("/")
}

/// Base class expressions, skipping keyword arguments such as `metaclass=`
fn bases(node: Node, source: &str) -> Vec<String> {
    node.child_by_field_name("superclasses")
        .map(|args| {
            named_children(args)
                .into_iter()
                .filter(|n| matches!(n.kind(), "identifier" | "attribute"))
                .map(|n| node_text(n, source).to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn docstring(node: Node, source: &str) -> Option<String> {
    let body = node.child_by_field_name("body")?;
    let first = named_children(body).into_iter().next()?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let string = named_children(first).into_iter().next()?;
    (string.kind() == "string").then(|| node_text(string, source).to_string())
}

/// `(local name, import target)` pairs of an import statement
fn import_bindings(node: Node, source: &str, file: &str) -> Vec<(String, String)> {
    let mut bindings = Vec::new();
    match node.kind() {
        "import_statement" => {
            for name in named_children(node) {
                match name.kind() {
                    "dotted_name" => {
                        let module = node_text(name, source);
                        bindings.push((module.to_string(), module_path(file, module)));
                    }
                    "aliased_import" => {
                        let (Some(module), Some(alias)) =
                            (field_text(name, "name", source), field_text(name, "alias", source))
                        else {
                            continue;
                        };
                        bindings.push((alias.to_string(), module_path(file, module)));
                    }
                    _ => {}
                }
            }
        }
        "import_from_statement" => {
            let Some(module) = field_text(node, "module_name", source) else {
                return bindings;
            };
            let path = module_path(file, module);
            let mut cursor = node.walk();
            for name in node.children_by_field_name("name", &mut cursor) {
                let (imported, local) = match name.kind() {
                    "aliased_import" => {
                        let Some(imported) = field_text(name, "name", source) else {
                            continue;
                        };
                        let local = field_text(name, "alias", source).unwrap_or(imported);
                        (imported, local)
                    }
                    _ => {
                        let text = node_text(name, source);
                        (text, text)
                    }
                };
                bindings.push((local.to_string(), format!("{}::{}", path, imported)));
            }
        }
        _ => {}
    }
    bindings
}

impl LanguageStrategy for PythonStrategy {
    fn language(&self) -> Language {
        Language::Python
    }

    fn declaration(&self, node: Node, source: &str) -> Option<Declaration> {
        let kind = match node.kind() {
            "class_definition" => SymbolKind::Class,
            "function_definition" => SymbolKind::Function,
            _ => return None,
        };
        let name = field_text(node, "name", source)?;
        Some(Declaration::new(name, kind))
    }

    fn extract_extends(&self, node: Node, source: &str) -> Option<String> {
        if node.kind() != "class_definition" {
            return None;
        }
        bases(node, source).into_iter().next()
    }

    fn extract_implements(&self, node: Node, source: &str) -> Option<Vec<String>> {
        if node.kind() != "class_definition" {
            return None;
        }
        let rest: Vec<String> = bases(node, source).into_iter().skip(1).collect();
        (!rest.is_empty()).then_some(rest)
    }

    fn extract_visibility(&self, node: Node, source: &str) -> Option<Visibility> {
        let name = field_text(node, "name", source)?;
        let dunder = name.starts_with("__") && name.ends_with("__");
        Some(if name.starts_with("__") && !dunder {
            Visibility::Private
        } else if name.starts_with('_') && !dunder {
            Visibility::Protected
        } else {
            Visibility::Public
        })
    }

    fn is_exported(&self, node: Node, source: &str) -> Option<bool> {
        let name = field_text(node, "name", source)?;
        Some(!name.starts_with('_'))
    }

    fn detect_deprecated(&self, node: Node, source: &str) -> bool {
        has_deprecation_marker(node, source)
            || docstring(node, source).is_some_and(|doc| mentions_deprecated(&doc))
    }

    fn extract_imports(&self, root: Node, source: &str, file: &str) -> HashMap<String, String> {
        named_children(root)
            .into_iter()
            .filter(|n| matches!(n.kind(), "import_statement" | "import_from_statement"))
            .flat_map(|n| import_bindings(n, source, file))
            .collect()
    }

    fn call_site(&self, node: Node, source: &str) -> Option<CallSite> {
        if node.kind() != "call" {
            return None;
        }
        let function = node.child_by_field_name("function")?;
        let call = match function.kind() {
            "identifier" => CallSite::new(node_text(function, source), None, line_of(node)),
            "attribute" => {
                let attribute = field_text(function, "attribute", source)?;
                let object = field_text(function, "object", source)?;
                CallSite::new(attribute, Some(object.to_string()), line_of(node))
            }
            _ => return None,
        };
        let arguments = node
            .child_by_field_name("arguments")
            .map(|args| classify_arguments(args, source, &["string"]))
            .unwrap_or_default();
        Some(call.with_arguments(arguments))
    }

    fn call_target(&self, call: &CallSite, scope: &FileScope) -> Option<String> {
        match call.receiver.as_deref() {
            // capitalised callees are constructors, handled as instantiations
            None if starts_uppercase(&call.callee) => None,
            None => Some(call.callee.clone()),
            Some("self" | "cls") => {
                let caller = scope.enclosing_callable(call.line)?;
                let owner = scope.owner_of(caller)?;
                Some(format!("{}.{}", owner.qualified_name, call.callee))
            }
            // `import a.b` binds the dotted name itself
            Some(receiver) => match scope.context.imports.get(receiver) {
                Some(path) if !path.contains("::") => Some(format!("{}::{}", path, call.callee)),
                Some(mapped) => Some(format!("{}.{}", mapped, call.callee)),
                None if starts_uppercase(receiver) => Some(format!("{}.{}", receiver, call.callee)),
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
        let Some(call) = self.call_site(node, scope.source) else {
            return;
        };
        if !starts_uppercase(&call.callee) {
            return;
        }
        let target = match call.receiver.as_deref() {
            None => call.callee.clone(),
            Some(receiver) => match scope.context.imports.get(receiver) {
                Some(path) if !path.contains("::") => format!("{}::{}", path, call.callee),
                _ => return,
            },
        };
        sink.add_relationship(
            &scope.source_id(call.line),
            &target,
            RelationshipType::Instantiates,
            call.line,
        );
    }

    fn extract_import_relationships(&self, node: Node, scope: &FileScope, sink: &mut dyn EdgeSink) {
        if node.kind() != "import_from_statement" {
            return;
        }
        let line = line_of(node);
        for (_, target) in import_bindings(node, scope.source, scope.file) {
            sink.add_relationship(&scope.module_id(), &target, RelationshipType::Imports, line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::module_path;
    use crate::index::{module_id, RelationshipType, SymbolKind, Visibility};
    use crate::lang::test_support::{analyze, has_edge, symbol};

    const MODELS: &str = r#"
class BaseModel:
    pass


class Order(BaseModel, Serializable):
    """An order.

    .. deprecated:: 2.0
    """

    def total(self):
        return self._sum()

    def _sum(self):
        return 0

    def __secret(self):
        pass

    def __repr__(self):
        return "Order"
"#;

    const SERVICE: &str = r#"
from app.models import Order
import app.notify as notify


def checkout(data):
    order = Order(data)
    notify.send("order.created")
    return order.total()
"#;

    const NOTIFY: &str = r#"
def send(event):
    pass
"#;

    #[test]
    fn test_class_members_and_visibility() {
        let (symbols, rels) = analyze(&[("app/models.py", MODELS)]);

        let order = symbol(&symbols, "Order");
        assert_eq!(order.extends.as_deref(), Some("BaseModel"));
        assert_eq!(order.implements, vec!["Serializable".to_string()]);
        assert_eq!(order.kind, SymbolKind::Model);
        assert!(order.deprecated);

        assert_eq!(symbol(&symbols, "Order.total").kind, SymbolKind::Method);
        assert_eq!(symbol(&symbols, "Order._sum").visibility, Some(Visibility::Protected));
        assert_eq!(symbol(&symbols, "Order.__secret").visibility, Some(Visibility::Private));
        assert_eq!(symbol(&symbols, "Order.__repr__").visibility, Some(Visibility::Public));

        assert!(has_edge(&symbols, &rels, "Order", "BaseModel", RelationshipType::Inherits));
        assert!(has_edge(&symbols, &rels, "Order.total", "Order._sum", RelationshipType::Calls));
    }

    #[test]
    fn test_imports_calls_and_instantiation() {
        let files = [
            ("app/models.py", MODELS),
            ("app/service.py", SERVICE),
            ("app/notify.py", NOTIFY),
        ];
        let (symbols, rels) = analyze(&files);

        assert!(has_edge(&symbols, &rels, "checkout", "Order", RelationshipType::Instantiates));
        assert!(has_edge(&symbols, &rels, "checkout", "send", RelationshipType::Calls));
        assert!(has_edge(&symbols, &rels, &module_id("app/service.py"), "Order", RelationshipType::Imports));
        // `order.total()` goes through a local variable and stays unresolved
        assert!(!has_edge(&symbols, &rels, "checkout", "Order.total", RelationshipType::Calls));
    }

    #[test]
    fn test_relative_module_paths() {
        assert_eq!(module_path("app/api/views.py", ".models"), "app/api/models");
        assert_eq!(module_path("app/api/views.py", "..core.db"), "app/core/db");
        assert_eq!(module_path("app/api/views.py", "app.core"), "app/core");
    }
}
