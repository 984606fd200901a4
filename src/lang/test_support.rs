// Fixtures shared by the per-language strategy tests

use crate::index::symbol_index::SymbolIndex;
use crate::index::{module_id, Relationship, RelationshipType, Symbol};
use crate::indexer::relationships::extract_relationships;
use crate::indexer::symbols::{extract_file, ParsedFile};
use crate::lang::Language;

/// Run symbol and relationship extraction over in-memory files as one project
pub fn analyze(files: &[(&str, &str)]) -> (Vec<Symbol>, Vec<Relationship>) {
    let parsed: Vec<ParsedFile> = files
        .iter()
        .map(|(path, source)| {
            extract_file(path, source.to_string(), Language::from_path(path))
                .unwrap_or_else(|e| panic!("{} failed to parse: {}", path, e))
        })
        .collect();

    let symbols: Vec<Symbol> = parsed.iter().flat_map(|f| f.symbols.iter().cloned()).collect();
    let index = SymbolIndex::build(&symbols);
    let rels = parsed
        .iter()
        .flat_map(|file| extract_relationships(file, &index))
        .collect();
    (symbols, rels)
}

pub fn symbol<'a>(symbols: &'a [Symbol], qualified: &str) -> &'a Symbol {
    symbols
        .iter()
        .find(|s| s.qualified_name == qualified)
        .unwrap_or_else(|| {
            let known: Vec<&str> = symbols.iter().map(|s| s.qualified_name.as_str()).collect();
            panic!("no symbol {}, have {:?}", qualified, known)
        })
}

/// `source` and `target` are qualified names, module ids or literal target ids
pub fn has_edge(
    symbols: &[Symbol],
    rels: &[Relationship],
    source: &str,
    target: &str,
    rel_type: RelationshipType,
) -> bool {
    let ids = |name: &str| -> Vec<String> {
        let mut ids: Vec<String> = symbols
            .iter()
            .filter(|s| s.qualified_name == name)
            .map(|s| s.id.clone())
            .collect();
        if ids.is_empty() || name.starts_with(&module_id("")) {
            ids.push(name.to_string());
        }
        ids
    };
    let sources = ids(source);
    let targets = ids(target);
    rels.iter().any(|r| {
        r.rel_type == rel_type && sources.contains(&r.source_id) && targets.contains(&r.target_id)
    })
}
