//! TypeScript strategy, also used for JavaScript: both grammars share the
//! class, call and module node shapes this module looks at.

use std::collections::HashMap;

use tree_sitter::Node;

use super::{
    classify_arguments, field_text, has_deprecation_marker, is_identifier, join_relative, line_of,
    mentions_deprecated, named_children, node_text, type_name, unquote, CallSite, Declaration,
    EdgeSink, FileScope, Language, LanguageStrategy,
};
use crate::index::{RelationshipType, SymbolKind, Visibility};

pub struct TypeScriptStrategy;

const STRING_KINDS: &[&str] = &["string", "template_string"];

enum ImportBinding {
    /// `import { imported as local }` or a default import
    Named { local: String, imported: String },
    /// `import * as local`
    Namespace { local: String },
}

/// Module path of an import specifier; relative specifiers are joined onto the importing file
fn module_path(file: &str, specifier: &str) -> String {
    if specifier.starts_with('.') {
        join_relative(file, specifier)
    } else {
        specifier.to_string()
    }
}

fn import_bindings(node: Node, source: &str) -> Vec<ImportBinding> {
    let mut bindings = Vec::new();
    for child in named_children(node) {
        if child.kind() != "import_clause" {
            continue;
        }
        for clause in named_children(child) {
            match clause.kind() {
                "identifier" => {
                    let local = node_text(clause, source).to_string();
                    bindings.push(ImportBinding::Named {
                        imported: local.clone(),
                        local,
                    });
                }
                "namespace_import" => {
                    if let Some(ident) = named_children(clause)
                        .into_iter()
                        .find(|n| n.kind() == "identifier")
                    {
                        bindings.push(ImportBinding::Namespace {
                            local: node_text(ident, source).to_string(),
                        });
                    }
                }
                "named_imports" => {
                    for spec in named_children(clause) {
                        if spec.kind() != "import_specifier" {
                            continue;
                        }
                        let Some(imported) = field_text(spec, "name", source) else {
                            continue;
                        };
                        let local = field_text(spec, "alias", source).unwrap_or(imported);
                        bindings.push(ImportBinding::Named {
                            local: local.to_string(),
                            imported: imported.to_string(),
                        });
                    }
                }
                _ => {}
            }
        }
    }
    bindings
}

fn import_source(node: Node, source: &str) -> Option<String> {
    field_text(node, "source", source).map(unquote)
}

impl TypeScriptStrategy {
    fn heritage(node: Node) -> Option<Node> {
        named_children(node)
            .into_iter()
            .find(|n| n.kind() == "class_heritage")
    }

    fn exported_names(&self, node: Node, source: &str) -> Vec<String> {
        if let Some(declaration) = node.child_by_field_name("declaration") {
            if matches!(declaration.kind(), "lexical_declaration" | "variable_declaration") {
                return named_children(declaration)
                    .into_iter()
                    .filter(|n| n.kind() == "variable_declarator")
                    .filter_map(|n| field_text(n, "name", source).map(str::to_string))
                    .collect();
            }
            return self
                .declaration(declaration, source)
                .map(|decl| vec![decl.name])
                .unwrap_or_default();
        }

        if let Some(value) = node.child_by_field_name("value") {
            if value.kind() == "identifier" {
                return vec![node_text(value, source).to_string()];
            }
            return Vec::new();
        }

        named_children(node)
            .into_iter()
            .filter(|n| n.kind() == "export_clause")
            .flat_map(named_children)
            .filter(|n| n.kind() == "export_specifier")
            .filter_map(|n| field_text(n, "name", source).map(str::to_string))
            .collect()
    }
}

impl LanguageStrategy for TypeScriptStrategy {
    fn language(&self) -> Language {
        Language::TypeScript
    }

    fn declaration(&self, node: Node, source: &str) -> Option<Declaration> {
        let kind = match node.kind() {
            "class_declaration" | "abstract_class_declaration" => SymbolKind::Class,
            "interface_declaration" => SymbolKind::Interface,
            "function_declaration" | "generator_function_declaration" => SymbolKind::Function,
            "method_definition" | "method_signature" | "abstract_method_signature" => {
                SymbolKind::Method
            }
            "type_alias_declaration" => SymbolKind::Type,
            "enum_declaration" => SymbolKind::Enum,
            "variable_declarator" => {
                let value = node.child_by_field_name("value")?;
                if !matches!(
                    value.kind(),
                    "arrow_function" | "function_expression" | "function"
                ) {
                    return None;
                }
                SymbolKind::Function
            }
            _ => return None,
        };

        let name = field_text(node, "name", source)?;
        if !is_identifier(name.trim_start_matches('#')) {
            return None;
        }
        Some(Declaration::new(name, kind))
    }

    fn extract_extends(&self, node: Node, source: &str) -> Option<String> {
        match node.kind() {
            "class_declaration" | "abstract_class_declaration" => {
                let heritage = Self::heritage(node)?;
                for clause in named_children(heritage) {
                    match clause.kind() {
                        "extends_clause" => {
                            let value = clause
                                .child_by_field_name("value")
                                .or_else(|| named_children(clause).into_iter().next())?;
                            return Some(type_name(node_text(value, source)));
                        }
                        "implements_clause" => {}
                        // JavaScript puts the parent expression directly under the heritage
                        _ => return Some(type_name(node_text(clause, source))),
                    }
                }
                None
            }
            "interface_declaration" => named_children(node)
                .into_iter()
                .find(|n| n.kind() == "extends_type_clause")
                .and_then(|clause| named_children(clause).into_iter().next())
                .map(|first| type_name(node_text(first, source))),
            _ => None,
        }
    }

    fn extract_implements(&self, node: Node, source: &str) -> Option<Vec<String>> {
        let heritage = Self::heritage(node)?;
        let clause = named_children(heritage)
            .into_iter()
            .find(|n| n.kind() == "implements_clause")?;
        Some(
            named_children(clause)
                .into_iter()
                .map(|t| type_name(node_text(t, source)))
                .collect(),
        )
    }

    fn extract_visibility(&self, node: Node, source: &str) -> Option<Visibility> {
        if !matches!(
            node.kind(),
            "method_definition" | "method_signature" | "abstract_method_signature"
        ) {
            return None;
        }
        if node
            .child_by_field_name("name")
            .is_some_and(|n| n.kind() == "private_property_identifier")
        {
            return Some(Visibility::Private);
        }
        let modifier = named_children(node)
            .into_iter()
            .find(|n| n.kind() == "accessibility_modifier")
            .map(|n| node_text(n, source));
        match modifier {
            Some("private") => Some(Visibility::Private),
            Some("protected") => Some(Visibility::Protected),
            _ => Some(Visibility::Public),
        }
    }

    fn is_exported(&self, node: Node, _source: &str) -> Option<bool> {
        let mut current = node;
        for _ in 0..2 {
            match current.parent() {
                Some(parent) if parent.kind() == "export_statement" => return Some(true),
                Some(parent) if matches!(parent.kind(), "lexical_declaration" | "variable_declaration") => {
                    current = parent;
                }
                _ => break,
            }
        }
        Some(false)
    }

    fn detect_deprecated(&self, node: Node, source: &str) -> bool {
        has_deprecation_marker(node, source)
            || named_children(node)
                .into_iter()
                .any(|n| n.kind() == "decorator" && mentions_deprecated(node_text(n, source)))
    }

    fn extract_imports(&self, root: Node, source: &str, file: &str) -> HashMap<String, String> {
        let mut imports = HashMap::new();
        for statement in named_children(root) {
            if statement.kind() != "import_statement" {
                continue;
            }
            let Some(specifier) = import_source(statement, source) else {
                continue;
            };
            let path = module_path(file, &specifier);
            for binding in import_bindings(statement, source) {
                match binding {
                    ImportBinding::Named { local, imported } => {
                        imports.insert(local, format!("{}::{}", path, imported));
                    }
                    ImportBinding::Namespace { local } => {
                        imports.insert(local, path.clone());
                    }
                }
            }
        }
        imports
    }

    fn call_site(&self, node: Node, source: &str) -> Option<CallSite> {
        if node.kind() != "call_expression" {
            return None;
        }
        let function = node.child_by_field_name("function")?;
        let call = match function.kind() {
            "identifier" => CallSite::new(node_text(function, source), None, line_of(node)),
            "member_expression" => {
                let property = field_text(function, "property", source)?;
                let object = field_text(function, "object", source)?;
                CallSite::new(property, Some(object.to_string()), line_of(node))
            }
            _ => return None,
        };
        let arguments = node
            .child_by_field_name("arguments")
            .map(|args| classify_arguments(args, source, STRING_KINDS))
            .unwrap_or_default();
        Some(call.with_arguments(arguments))
    }

    fn extract_instantiation_relationships(
        &self,
        node: Node,
        scope: &FileScope,
        sink: &mut dyn EdgeSink,
    ) {
        if node.kind() != "new_expression" {
            return;
        }
        let Some(constructor) = node.child_by_field_name("constructor") else {
            return;
        };
        let target = match constructor.kind() {
            "identifier" => node_text(constructor, scope.source).to_string(),
            "member_expression" => {
                let object = field_text(constructor, "object", scope.source).unwrap_or("");
                let property = field_text(constructor, "property", scope.source).unwrap_or("");
                match scope.context.imports.get(object) {
                    Some(path) if !path.contains("::") => format!("{}::{}", path, property),
                    _ => format!("{}.{}", object, property),
                }
            }
            _ => return,
        };
        let line = line_of(node);
        sink.add_relationship(&scope.source_id(line), &target, RelationshipType::Instantiates, line);
    }

    fn extract_import_relationships(&self, node: Node, scope: &FileScope, sink: &mut dyn EdgeSink) {
        let line = line_of(node);
        match node.kind() {
            "import_statement" => {
                let Some(specifier) = import_source(node, scope.source) else {
                    return;
                };
                let path = module_path(scope.file, &specifier);
                for binding in import_bindings(node, scope.source) {
                    if let ImportBinding::Named { imported, .. } = binding {
                        sink.add_relationship(
                            &scope.module_id(),
                            &format!("{}::{}", path, imported),
                            RelationshipType::Imports,
                            line,
                        );
                    }
                }
            }
            "export_statement" => {
                let reexport_from = import_source(node, scope.source)
                    .map(|specifier| module_path(scope.file, &specifier));
                for name in self.exported_names(node, scope.source) {
                    let target = match &reexport_from {
                        Some(path) => format!("{}::{}", path, name),
                        None => name,
                    };
                    sink.add_relationship(&scope.module_id(), &target, RelationshipType::Exports, line);
                }
            }
            _ => {}
        }
    }
}
