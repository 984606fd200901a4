// Knowledge graph over the stored relationships

use std::collections::{HashSet, VecDeque};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::index::db::IndexDatabase;
use crate::index::symbol_index::{IndexEntry, SymbolIndex};
use crate::index::{Relationship, RelationshipType, Symbol};
use crate::indexer::resolver::resolve;

/// Dependency queries and edge maintenance on top of the index store
#[derive(Clone)]
pub struct KnowledgeGraph {
    db: IndexDatabase,
}

impl KnowledgeGraph {
    pub fn new(db: IndexDatabase) -> Self {
        Self { db }
    }

    /// Upsert an edge; an existing edge for the pair takes the new type
    pub fn add_relationship(
        &self,
        source_id: &str,
        target_id: &str,
        rel_type: RelationshipType,
    ) -> Result<()> {
        self.db
            .upsert_relationship(&Relationship::new(source_id, target_id, rel_type))
    }

    /// Returns whether an edge existed for the pair
    pub fn remove_relationship(&self, source_id: &str, target_id: &str) -> Result<bool> {
        Ok(self.db.delete_relationship(source_id, target_id)? > 0)
    }

    /// Outgoing edges: what `source_id` depends on
    pub fn get_dependencies(&self, source_id: &str) -> Result<Vec<Relationship>> {
        self.db.relationships_from(source_id)
    }

    /// Incoming edges: what depends on `target_id`
    pub fn get_dependents(&self, target_id: &str) -> Result<Vec<Relationship>> {
        self.db.relationships_to(target_id)
    }

    /// Everything that transitively depends on `target_id`, up to `max_depth` hops
    pub fn get_impact_radius(&self, target_id: &str, max_depth: usize) -> Result<HashSet<String>> {
        let radius = impact_radius(target_id, max_depth, |id| {
            Ok(self
                .get_dependents(id)?
                .into_iter()
                .map(|rel| rel.source_id)
                .collect())
        })?;
        debug!("Impact radius of {} at depth {}: {} symbols", target_id, max_depth, radius.len());
        Ok(radius)
    }

    /// Resolve a user-supplied symbol reference: an id first, then a qualified name
    pub fn find_symbols(&self, reference: &str) -> Result<Vec<Symbol>> {
        if let Some(symbol) = self.db.get_symbol(reference)? {
            return Ok(vec![symbol]);
        }
        self.db.find_symbols_by_qualified_name(reference)
    }

    /// Replace every stored edge with the ones implied by the symbols' own
    /// `extends`, `implements`, `uses_traits` and `references` lists.
    ///
    /// Names are re-resolved against an index built from `symbols`; names that
    /// no longer resolve are dropped. Returns the number of edges written.
    pub fn rebuild(&self, symbols: &[Symbol]) -> Result<usize> {
        let index = SymbolIndex::build(symbols);
        let mut edges: Vec<Relationship> = Vec::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();

        for symbol in symbols {
            let mut push = |target: &IndexEntry, rel_type: RelationshipType| {
                if target.id == symbol.id || !seen.insert((symbol.id.clone(), target.id.clone())) {
                    return;
                }
                edges.push(
                    Relationship::new(&symbol.id, &target.id, rel_type)
                        .at(&symbol.location.file, symbol.location.start_line),
                );
            };

            if let Some(parent) = symbol.extends.as_deref() {
                if let Some(target) = lookup(parent, &symbol.location.file, &index) {
                    push(target, RelationshipType::Inherits);
                }
            }
            for name in &symbol.implements {
                if let Some(target) = lookup(name, &symbol.location.file, &index) {
                    push(target, RelationshipType::Implements);
                }
            }
            for name in &symbol.uses_traits {
                if let Some(target) = lookup(name, &symbol.location.file, &index) {
                    push(target, RelationshipType::UsesTrait);
                }
            }
            for name in &symbol.references {
                if let Some(target) = lookup(name, &symbol.location.file, &index) {
                    let rel_type = if target.kind.is_callable() {
                        RelationshipType::Calls
                    } else {
                        RelationshipType::Uses
                    };
                    push(target, rel_type);
                }
            }
        }

        self.db
            .replace_relationships(&edges)
            .context("Failed to store rebuilt relationships")?;
        info!("Rebuilt {} relationships from {} symbols", edges.len(), symbols.len());
        Ok(edges.len())
    }
}

/// Names stored on a symbol are qualified names, preferring the symbol's own file
fn lookup<'i>(name: &str, file: &str, index: &'i SymbolIndex) -> Option<&'i IndexEntry> {
    index.get_in_file(file, name).or_else(|| resolve(name, index, None))
}

/// Breadth-first walk from `start` over `neighbors`, at most `max_depth` hops.
/// Each node is visited once; `start` itself is never part of the result.
pub fn impact_radius<F>(start: &str, max_depth: usize, mut neighbors: F) -> Result<HashSet<String>>
where
    F: FnMut(&str) -> Result<Vec<String>>,
{
    let mut visited: HashSet<String> = HashSet::from([start.to_string()]);
    let mut queue: VecDeque<(String, usize)> = VecDeque::from([(start.to_string(), 0)]);
    let mut radius = HashSet::new();

    while let Some((node, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        for next in neighbors(&node)? {
            if visited.insert(next.clone()) {
                radius.insert(next.clone());
                queue.push_back((next, depth + 1));
            }
        }
    }

    Ok(radius)
}
