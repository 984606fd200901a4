// Relationship extraction: one deduplicated pass per file

use std::collections::HashMap;

use tracing::{debug, trace};

use super::dynamic::{detect_registrations, to_relationships};
use super::resolver::{resolve, ResolutionContext};
use super::symbols::ParsedFile;
use crate::index::symbol_index::SymbolIndex;
use crate::index::{Relationship, RelationshipType};
use crate::lang::{strategy_for, walk_tree, EdgeSink, FileScope};

/// Which type a (source, target) pair keeps when several hooks emit it.
/// A pair carries one type, so the more specific reading wins.
fn precedence(rel_type: &RelationshipType) -> u8 {
    match rel_type {
        RelationshipType::Inherits | RelationshipType::Implements | RelationshipType::UsesTrait => 6,
        RelationshipType::Dispatches | RelationshipType::ListensTo => 5,
        RelationshipType::Instantiates => 4,
        RelationshipType::Calls => 3,
        RelationshipType::DynamicCall => 2,
        RelationshipType::Uses | RelationshipType::Imports | RelationshipType::Exports => 1,
        RelationshipType::Custom(_) => 0,
    }
}

/// Edge collector owned by one extraction pass
pub struct RelationshipSink<'a> {
    index: &'a SymbolIndex,
    context: &'a ResolutionContext,
    edges: Vec<Relationship>,
    seen: HashMap<(String, String), usize>,
}

impl<'a> RelationshipSink<'a> {
    pub fn new(index: &'a SymbolIndex, context: &'a ResolutionContext) -> Self {
        Self {
            index,
            context,
            edges: Vec::new(),
            seen: HashMap::new(),
        }
    }

    /// Add an already-resolved edge, deduplicating by (source, target)
    pub fn push(&mut self, rel: Relationship) {
        if rel.source_id == rel.target_id {
            return;
        }
        let key = (rel.source_id.clone(), rel.target_id.clone());
        match self.seen.get(&key) {
            Some(&pos) => {
                if precedence(&rel.rel_type) > precedence(&self.edges[pos].rel_type) {
                    self.edges[pos] = rel;
                }
            }
            None => {
                self.seen.insert(key, self.edges.len());
                self.edges.push(rel);
            }
        }
    }

    pub fn finish(self) -> Vec<Relationship> {
        self.edges
    }
}

impl EdgeSink for RelationshipSink<'_> {
    fn add_relationship(&mut self, source_id: &str, target_name: &str, rel_type: RelationshipType, line: u32) {
        let Some(target) = resolve(target_name, self.index, Some(self.context)) else {
            trace!("Dropping unresolved {} edge to {}", rel_type, target_name);
            return;
        };
        let rel = Relationship::new(source_id, target.id.clone(), rel_type).at(self.context.file.clone(), line);
        self.push(rel);
    }
}

/// Build the file's resolution context from its imports and namespace
pub fn resolution_context(file: &ParsedFile) -> ResolutionContext {
    let strategy = strategy_for(file.language);
    let mut context = ResolutionContext::new(file.path.clone());
    if let Some(tree) = &file.tree {
        let root = tree.root_node();
        context = context
            .with_imports(strategy.extract_imports(root, &file.source, &file.path))
            .with_namespace(
                strategy.extract_namespace(root, &file.source),
                strategy.namespace_separator(),
            );
    }
    context
}

/// Walk the file's tree through every strategy hook, then merge the dynamic
/// registrations. Must run against the index of the whole project.
pub fn extract_relationships(file: &ParsedFile, index: &SymbolIndex) -> Vec<Relationship> {
    let Some(tree) = &file.tree else {
        return Vec::new();
    };
    let strategy = strategy_for(file.language);
    let context = resolution_context(file);
    let scope = FileScope {
        file: &file.path,
        source: &file.source,
        symbols: &file.symbols,
        context: &context,
    };
    let root = tree.root_node();

    let mut sink = RelationshipSink::new(index, &context);
    walk_tree(root, |node| {
        strategy.extract_class_relationships(node, &scope, &mut sink);
        strategy.extract_instantiation_relationships(node, &scope, &mut sink);
        strategy.extract_import_relationships(node, &scope, &mut sink);
        strategy.extract_call_relationships(node, &scope, &mut sink);
        strategy.extract_event_listener_relationships(node, &scope, &mut sink);
    });

    let registrations = detect_registrations(strategy, root, &scope);
    for rel in to_relationships(&registrations, index, &context) {
        sink.push(rel);
    }

    let edges = sink.finish();
    debug!("{}: {} relationships", file.path, edges.len());
    edges
}
