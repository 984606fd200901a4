// Project-wide lookup tables over extracted symbols

use std::collections::HashMap;

use super::{short_name, Symbol, SymbolKind};

/// The slice of a symbol the resolver needs, detached from the full record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub id: String,
    pub name: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub file: String,
}

impl From<&Symbol> for IndexEntry {
    fn from(symbol: &Symbol) -> Self {
        Self {
            id: symbol.id.clone(),
            name: symbol.name.clone(),
            qualified_name: symbol.qualified_name.clone(),
            kind: symbol.kind,
            file: symbol.location.file.clone(),
        }
    }
}

/// Qualified-name and short-name lookup over every symbol of a project.
///
/// Built once per indexing run after all files were extracted. Qualified names
/// map to a single entry (last write wins); short names map to every entry
/// sharing that final segment and are only consulted for import-path markers.
#[derive(Debug, Default)]
pub struct SymbolIndex {
    entries: Vec<IndexEntry>,
    by_qualified: HashMap<String, usize>,
    by_file_qualified: HashMap<(String, String), usize>,
    by_short: HashMap<String, Vec<usize>>,
}

impl SymbolIndex {
    pub fn build<'a>(symbols: impl IntoIterator<Item = &'a Symbol>) -> Self {
        let mut index = Self::default();
        for symbol in symbols {
            index.insert(IndexEntry::from(symbol));
        }
        index
    }

    fn insert(&mut self, entry: IndexEntry) {
        let slot = self.entries.len();
        self.by_qualified.insert(entry.qualified_name.clone(), slot);
        self.by_file_qualified
            .insert((entry.file.clone(), entry.qualified_name.clone()), slot);
        self.by_short
            .entry(short_name(&entry.qualified_name).to_string())
            .or_default()
            .push(slot);
        self.entries.push(entry);
    }

    pub fn get(&self, qualified_name: &str) -> Option<&IndexEntry> {
        self.by_qualified
            .get(qualified_name)
            .map(|&slot| &self.entries[slot])
    }

    /// Qualified-name lookup restricted to one file
    pub fn get_in_file(&self, file: &str, qualified_name: &str) -> Option<&IndexEntry> {
        self.by_file_qualified
            .get(&(file.to_string(), qualified_name.to_string()))
            .map(|&slot| &self.entries[slot])
    }

    pub fn by_short_name(&self, name: &str) -> Vec<&IndexEntry> {
        self.by_short
            .get(name)
            .map(|slots| slots.iter().map(|&slot| &self.entries[slot]).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
