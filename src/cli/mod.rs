// CLI command implementations

pub mod deps;
pub mod impact;
pub mod index;
pub mod languages;
pub mod stats;

use std::path::Path;

use anyhow::{bail, Result};

use crate::config::Config;
use crate::index::db::IndexDatabase;

/// Open an existing project index; queries never create one
pub fn open_index(project: &str, config: &Config) -> Result<IndexDatabase> {
    let db_path = config.db_path(Path::new(project));
    if !db_path.exists() {
        bail!(
            "No index found at {}; run `symgraph index --project {}` first",
            db_path.display(),
            project
        );
    }
    IndexDatabase::new(&db_path)
}

/// `qualified name (kind) file:line` for stored symbols, the raw id otherwise
/// (module ids and unresolved dynamic targets)
pub fn describe(db: &IndexDatabase, id: &str) -> Result<String> {
    Ok(match db.get_symbol(id)? {
        Some(symbol) => format!(
            "{} ({}) {}:{}",
            symbol.qualified_name, symbol.kind, symbol.location.file, symbol.location.start_line
        ),
        None => id.to_string(),
    })
}
