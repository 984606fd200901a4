// Index data model and storage

pub mod db;
pub mod schema;
pub mod symbol_index;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// A named program entity extracted from source
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Symbol {
    pub id: String,
    pub name: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub location: Location,
    /// Id of the enclosing symbol, `None` for top-level declarations
    pub parent: Option<String>,
    pub visibility: Option<Visibility>,
    pub exported: Option<bool>,
    pub language: String,
    pub extends: Option<String>,
    pub implements: Vec<String>,
    pub uses_traits: Vec<String>,
    pub references: Vec<String>,
    pub referenced_by: Vec<String>,
    pub signature: Option<String>,
    pub deprecated: bool,
    /// Produced by the metrics collaborator, carried through untouched
    pub metrics: Option<SymbolMetrics>,
}

impl Symbol {
    /// Build a symbol with its stable id derived from (file, qualified name, kind)
    pub fn new(
        name: impl Into<String>,
        qualified_name: impl Into<String>,
        kind: SymbolKind,
        location: Location,
        language: impl Into<String>,
    ) -> Self {
        let qualified_name = qualified_name.into();
        Self {
            id: symbol_id(&location.file, &qualified_name, kind),
            name: name.into(),
            qualified_name,
            kind,
            location,
            parent: None,
            visibility: None,
            exported: None,
            language: language.into(),
            extends: None,
            implements: Vec::new(),
            uses_traits: Vec::new(),
            references: Vec::new(),
            referenced_by: Vec::new(),
            signature: None,
            deprecated: false,
            metrics: None,
        }
    }

    /// Last segment of the qualified name, after any namespace or member separator
    pub fn short_name(&self) -> &str {
        short_name(&self.qualified_name)
    }
}

/// Opaque per-symbol metrics
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SymbolMetrics {
    pub lines_of_code: u32,
    pub cyclomatic_complexity: u32,
    pub parameter_count: u32,
}

/// Symbol kinds, including the architecture roles produced by kind refinement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Interface,
    Trait,
    Struct,
    Enum,
    Type,
    Module,
    Variable,
    Constant,
    Service,
    Repository,
    Controller,
    Event,
    Listener,
    Dto,
    Entity,
    Model,
    Factory,
    Middleware,
    Handler,
    Provider,
}

impl SymbolKind {
    pub const ALL: [SymbolKind; 23] = [
        SymbolKind::Function,
        SymbolKind::Method,
        SymbolKind::Class,
        SymbolKind::Interface,
        SymbolKind::Trait,
        SymbolKind::Struct,
        SymbolKind::Enum,
        SymbolKind::Type,
        SymbolKind::Module,
        SymbolKind::Variable,
        SymbolKind::Constant,
        SymbolKind::Service,
        SymbolKind::Repository,
        SymbolKind::Controller,
        SymbolKind::Event,
        SymbolKind::Listener,
        SymbolKind::Dto,
        SymbolKind::Entity,
        SymbolKind::Model,
        SymbolKind::Factory,
        SymbolKind::Middleware,
        SymbolKind::Handler,
        SymbolKind::Provider,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::Trait => "trait",
            SymbolKind::Struct => "struct",
            SymbolKind::Enum => "enum",
            SymbolKind::Type => "type",
            SymbolKind::Module => "module",
            SymbolKind::Variable => "variable",
            SymbolKind::Constant => "constant",
            SymbolKind::Service => "service",
            SymbolKind::Repository => "repository",
            SymbolKind::Controller => "controller",
            SymbolKind::Event => "event",
            SymbolKind::Listener => "listener",
            SymbolKind::Dto => "dto",
            SymbolKind::Entity => "entity",
            SymbolKind::Model => "model",
            SymbolKind::Factory => "factory",
            SymbolKind::Middleware => "middleware",
            SymbolKind::Handler => "handler",
            SymbolKind::Provider => "provider",
        }
    }

    /// Functions and methods; the only kinds that can act as a registrar
    pub fn is_callable(&self) -> bool {
        matches!(self, SymbolKind::Function | SymbolKind::Method)
    }

    /// Plain classes and every kind a class can be refined into
    pub fn is_class_like(&self) -> bool {
        !matches!(
            self,
            SymbolKind::Function
                | SymbolKind::Method
                | SymbolKind::Interface
                | SymbolKind::Trait
                | SymbolKind::Enum
                | SymbolKind::Type
                | SymbolKind::Module
                | SymbolKind::Variable
                | SymbolKind::Constant
        )
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SymbolKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SymbolKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown symbol kind: {}", s))
    }
}

/// Visibility levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Protected,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Protected => "protected",
            Visibility::Private => "private",
        }
    }
}

impl FromStr for Visibility {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "protected" => Ok(Visibility::Protected),
            "private" => Ok(Visibility::Private),
            _ => anyhow::bail!("Unknown visibility: {}", s),
        }
    }
}

/// Location in source code, 1-based inclusive lines
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Location {
    pub file: String,
    pub start_line: u32,
    pub end_line: u32,
}

impl Location {
    pub fn new(file: impl Into<String>, start_line: u32, end_line: u32) -> Self {
        Self {
            file: file.into(),
            start_line,
            end_line,
        }
    }

    pub fn contains_line(&self, line: u32) -> bool {
        self.start_line <= line && line <= self.end_line
    }

    pub fn span(&self) -> u32 {
        self.end_line.saturating_sub(self.start_line)
    }
}

/// Typed directed edge between two symbols
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Relationship {
    pub source_id: String,
    pub target_id: String,
    pub rel_type: RelationshipType,
    pub location: Option<RelationshipLocation>,
    pub confidence: Option<f32>,
    pub inferred: bool,
}

impl Relationship {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        rel_type: RelationshipType,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            rel_type,
            location: None,
            confidence: None,
            inferred: false,
        }
    }

    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.location = Some(RelationshipLocation {
            file: file.into(),
            line,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RelationshipLocation {
    pub file: String,
    pub line: u32,
}

/// Relationship kinds
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Inherits,
    Implements,
    UsesTrait,
    Instantiates,
    Calls,
    Uses,
    Imports,
    Exports,
    Dispatches,
    ListensTo,
    DynamicCall,
    Custom(String),
}

impl RelationshipType {
    pub fn as_str(&self) -> &str {
        match self {
            RelationshipType::Inherits => "inherits",
            RelationshipType::Implements => "implements",
            RelationshipType::UsesTrait => "uses_trait",
            RelationshipType::Instantiates => "instantiates",
            RelationshipType::Calls => "calls",
            RelationshipType::Uses => "uses",
            RelationshipType::Imports => "imports",
            RelationshipType::Exports => "exports",
            RelationshipType::Dispatches => "dispatches",
            RelationshipType::ListensTo => "listens_to",
            RelationshipType::DynamicCall => "dynamic_call",
            RelationshipType::Custom(name) => name,
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for RelationshipType {
    fn from(s: &str) -> Self {
        match s {
            "inherits" => RelationshipType::Inherits,
            "implements" => RelationshipType::Implements,
            "uses_trait" => RelationshipType::UsesTrait,
            "instantiates" => RelationshipType::Instantiates,
            "calls" => RelationshipType::Calls,
            "uses" => RelationshipType::Uses,
            "imports" => RelationshipType::Imports,
            "exports" => RelationshipType::Exports,
            "dispatches" => RelationshipType::Dispatches,
            "listens_to" => RelationshipType::ListensTo,
            "dynamic_call" => RelationshipType::DynamicCall,
            other => RelationshipType::Custom(other.to_string()),
        }
    }
}

/// Last indexed content hash of a file
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FileHash {
    pub file_path: String,
    pub content_hash: String,
    pub indexed_at: i64,
}

/// Stable symbol id: same (file, qualified name, kind) always yields the same id
pub fn symbol_id(file: &str, qualified_name: &str, kind: SymbolKind) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(file.as_bytes());
    hasher.update(&[0]);
    hasher.update(qualified_name.as_bytes());
    hasher.update(&[0]);
    hasher.update(kind.as_str().as_bytes());
    hasher.finalize().to_hex()[..16].to_string()
}

/// Synthetic per-file source id for edges that originate outside any symbol
pub fn module_id(file: &str) -> String {
    format!("module:{}", file)
}

pub fn content_hash(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_string()
}

/// Rewrite the derived name lists of `symbols` from the relationship set.
///
/// `extends`, `implements` and `uses_traits` keep the names as written unless an
/// edge resolved them, in which case the target's qualified name replaces them.
/// `references` and `referenced_by` are rebuilt from scratch; unresolved dynamic
/// targets appear under their literal id.
pub fn link_reference_lists(symbols: &mut [Symbol], relationships: &[Relationship]) {
    let names: HashMap<String, String> = symbols
        .iter()
        .map(|s| (s.id.clone(), s.qualified_name.clone()))
        .collect();

    let mut outgoing: HashMap<&str, Vec<(&RelationshipType, String)>> = HashMap::new();
    let mut incoming: HashMap<&str, Vec<String>> = HashMap::new();
    for rel in relationships {
        let target = names
            .get(&rel.target_id)
            .cloned()
            .unwrap_or_else(|| rel.target_id.clone());
        outgoing
            .entry(rel.source_id.as_str())
            .or_default()
            .push((&rel.rel_type, target));
        if let Some(source) = names.get(&rel.source_id) {
            incoming
                .entry(rel.target_id.as_str())
                .or_default()
                .push(source.clone());
        }
    }

    for symbol in symbols.iter_mut() {
        let out = outgoing.get(symbol.id.as_str()).map(Vec::as_slice).unwrap_or(&[]);
        let targets = |wanted: RelationshipType| -> Vec<&str> {
            out.iter()
                .filter(|(ty, _)| **ty == wanted)
                .map(|(_, name)| name.as_str())
                .collect()
        };

        let parents = targets(RelationshipType::Inherits);
        symbol.extends = symbol.extends.take().map(|raw| {
            parents
                .iter()
                .find(|name| short_name(name) == short_name(&raw))
                .map(|name| name.to_string())
                .unwrap_or(raw)
        });
        symbol.implements = merge_resolved(&symbol.implements, &targets(RelationshipType::Implements));
        symbol.uses_traits = merge_resolved(&symbol.uses_traits, &targets(RelationshipType::UsesTrait));

        let mut references: Vec<String> = out
            .iter()
            .filter(|(ty, _)| {
                matches!(
                    ty,
                    RelationshipType::Calls
                        | RelationshipType::Uses
                        | RelationshipType::Instantiates
                        | RelationshipType::DynamicCall
                        | RelationshipType::Dispatches
                        | RelationshipType::ListensTo
                )
            })
            .map(|(_, name)| name.clone())
            .collect();
        references.sort();
        references.dedup();
        symbol.references = references;

        let mut referenced_by = incoming.remove(symbol.id.as_str()).unwrap_or_default();
        referenced_by.sort();
        referenced_by.dedup();
        symbol.referenced_by = referenced_by;
    }
}

fn merge_resolved(written: &[String], resolved: &[&str]) -> Vec<String> {
    let mut merged: Vec<String> = written
        .iter()
        .map(|raw| {
            resolved
                .iter()
                .find(|name| short_name(name) == short_name(raw))
                .map(|name| name.to_string())
                .unwrap_or_else(|| raw.clone())
        })
        .collect();
    for name in resolved {
        if !merged.iter().any(|m| m == name) {
            merged.push(name.to_string());
        }
    }
    merged
}

/// Last path segment after a `\`, `::`, `.` or `/` separator
pub fn short_name(qualified: &str) -> &str {
    let mut start = 0;
    for (idx, ch) in qualified.char_indices() {
        if matches!(ch, '\\' | '.' | '/' | ':') {
            start = idx + ch.len_utf8();
        }
    }
    &qualified[start..]
}
