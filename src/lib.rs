//! symgraph: incremental symbol index and cross-reference graph for
//! multi-language codebases.
//!
//! Source files are parsed with tree-sitter, symbols are extracted through a
//! per-language strategy, references are resolved against a project-wide
//! symbol index, and the result is stored in SQLite. Unchanged files are
//! skipped on later runs by content hash.

pub mod cli;
pub mod config;
pub mod error;
pub mod index;
pub mod indexer;
pub mod lang;
pub mod query;
