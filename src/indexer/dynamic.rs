// Registration-pattern detection: edges that only exist at runtime

use tree_sitter::Node;

use super::resolver::{resolve, ResolutionContext};
use crate::index::symbol_index::SymbolIndex;
use crate::index::{Relationship, RelationshipType};
use crate::lang::{walk_tree, CallArgument, CallSite, FileScope, LanguageStrategy};

/// Confidence of a registration whose name resolved to a symbol
pub const RESOLVED_CONFIDENCE: f32 = 0.8;
/// Confidence of a registration kept under its literal name
pub const LITERAL_CONFIDENCE: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationPattern {
    Event,
    Route,
    DependencyInjection,
    Test,
    Plugin,
}

const VOCABULARY: &[(RegistrationPattern, &[&str])] = &[
    (
        RegistrationPattern::Event,
        &["on", "once", "listen", "subscribe", "addEventListener", "addListener"],
    ),
    (
        RegistrationPattern::Route,
        &["get", "post", "put", "patch", "delete", "route", "use", "all"],
    ),
    (
        RegistrationPattern::DependencyInjection,
        &["register", "bind", "singleton", "provide", "factory"],
    ),
    (RegistrationPattern::Test, &["describe", "it", "test"]),
    (
        RegistrationPattern::Plugin,
        &["plugin", "registerPlugin", "addPlugin", "install"],
    ),
];

impl RegistrationPattern {
    /// Pattern a callee name belongs to, first vocabulary match wins
    pub fn for_callee(callee: &str) -> Option<Self> {
        VOCABULARY
            .iter()
            .find(|(_, verbs)| verbs.contains(&callee))
            .map(|(pattern, _)| *pattern)
    }
}

/// A function registering a named entity through a call like `bus.on("x", h)`
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicRegistration {
    /// Enclosing function or method, the file's module id at top level
    pub registrar_id: String,
    pub registered: String,
    /// Registered name came from a string literal rather than an identifier
    pub literal: bool,
    pub pattern: RegistrationPattern,
    pub line: u32,
}

/// First string or identifier argument, falling back to the second argument
fn registered_name(call: &CallSite) -> Option<(String, bool)> {
    let named = |arg: &CallArgument| match arg {
        CallArgument::StringLiteral(s) if !s.is_empty() => Some((s.clone(), true)),
        CallArgument::Identifier(s) => Some((s.clone(), false)),
        _ => None,
    };
    call.arguments
        .first()
        .and_then(named)
        .or_else(|| call.arguments.get(1).and_then(named))
}

fn detect_call(call: &CallSite, scope: &FileScope) -> Option<DynamicRegistration> {
    let pattern = RegistrationPattern::for_callee(&call.callee)?;
    // routing verbs are common method names; require a literal path
    if pattern == RegistrationPattern::Route
        && !matches!(call.arguments.first(), Some(CallArgument::StringLiteral(_)))
    {
        return None;
    }
    let (registered, literal) = registered_name(call)?;
    let registrar_id = scope
        .enclosing_callable(call.line)
        .map(|s| s.id.clone())
        .unwrap_or_else(|| scope.module_id());

    Some(DynamicRegistration {
        registrar_id,
        registered,
        literal,
        pattern,
        line: call.line,
    })
}

/// Scan every call in the tree against the registration vocabulary
pub fn detect_registrations(
    strategy: &dyn LanguageStrategy,
    root: Node,
    scope: &FileScope,
) -> Vec<DynamicRegistration> {
    let mut found = Vec::new();
    walk_tree(root, |node| {
        if let Some(call) = strategy.call_site(node, scope.source) {
            if let Some(registration) = detect_call(&call, scope) {
                found.push(registration);
            }
        }
    });
    found
}

/// Registrar depends on the registered entity. Names that resolve to no symbol
/// stay as literal target ids.
pub fn to_relationships(
    registrations: &[DynamicRegistration],
    index: &SymbolIndex,
    context: &ResolutionContext,
) -> Vec<Relationship> {
    registrations
        .iter()
        .filter_map(|registration| {
            let name = registration.registered.as_str();
            let resolved = resolve(name, index, Some(context)).or_else(|| {
                let candidates = index.by_short_name(name);
                (candidates.len() == 1 && candidates[0].name == name).then(|| candidates[0])
            });

            let (target_id, confidence) = match resolved {
                Some(entry) => (entry.id.clone(), RESOLVED_CONFIDENCE),
                None => (name.to_string(), LITERAL_CONFIDENCE),
            };
            if target_id == registration.registrar_id {
                return None;
            }

            let mut rel = Relationship::new(
                registration.registrar_id.clone(),
                target_id,
                RelationshipType::DynamicCall,
            )
            .at(context.file.clone(), registration.line);
            rel.confidence = Some(confidence);
            rel.inferred = true;
            Some(rel)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{module_id, RelationshipType};
    use crate::lang::test_support::{analyze, symbol};

    const BOOT: &str = r#"
function onUserCreated(user) {}

function listOrders(req, res) {}

export function boot(bus, app, container) {
    bus.on('user.created', onUserCreated);
    bus.on(onUserCreated);
    app.get('/orders', listOrders);
    cache.get(key);
    container.singleton(OrderRepository);
}

describe('boot', () => {});
"#;

    #[test]
    fn test_vocabulary_lookup() {
        assert_eq!(RegistrationPattern::for_callee("on"), Some(RegistrationPattern::Event));
        assert_eq!(RegistrationPattern::for_callee("post"), Some(RegistrationPattern::Route));
        assert_eq!(RegistrationPattern::for_callee("bind"), Some(RegistrationPattern::DependencyInjection));
        assert_eq!(RegistrationPattern::for_callee("it"), Some(RegistrationPattern::Test));
        assert_eq!(RegistrationPattern::for_callee("registerPlugin"), Some(RegistrationPattern::Plugin));
        assert_eq!(RegistrationPattern::for_callee("compute"), None);
    }

    #[test]
    fn test_registrations_become_inferred_edges() {
        let (symbols, rels) = analyze(&[("src/boot.js", BOOT)]);
        let boot = symbol(&symbols, "boot");
        let handler = symbol(&symbols, "onUserCreated");

        let dynamic: Vec<&Relationship> = rels
            .iter()
            .filter(|r| r.rel_type == RelationshipType::DynamicCall)
            .collect();
        assert!(dynamic.iter().all(|r| r.inferred));

        // literal event name, no symbol behind it
        let event = dynamic
            .iter()
            .find(|r| r.target_id == "user.created")
            .expect("event registration");
        assert_eq!(event.source_id, boot.id);
        assert_eq!(event.confidence, Some(LITERAL_CONFIDENCE));

        // identifier argument resolves to the local handler
        let resolved = dynamic
            .iter()
            .find(|r| r.target_id == handler.id)
            .expect("handler registration");
        assert_eq!(resolved.confidence, Some(RESOLVED_CONFIDENCE));

        // routes require a literal path, `cache.get(key)` is not one
        assert!(dynamic.iter().any(|r| r.target_id == "/orders"));
        assert!(!dynamic.iter().any(|r| r.target_id == "key"));

        assert!(dynamic.iter().any(|r| r.target_id == "OrderRepository"));

        // top-level registrations come from the module
        assert!(dynamic
            .iter()
            .any(|r| r.source_id == module_id("src/boot.js") && r.target_id == boot.id));
    }
}
