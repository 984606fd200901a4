use anyhow::Result;
use std::path::Path;

use super::open_index;
use crate::config::Config;

pub fn show_stats(project: &str, config: &Config) -> Result<()> {
    let db = open_index(project, config)?;
    let stats = db.get_stats()?;

    println!("symgraph statistics v{}", env!("CARGO_PKG_VERSION"));
    println!("Project: {}", config.project.name);

    println!("\nIndex:");
    println!("  Files: {}", stats.total_files);
    println!("  Symbols: {}", stats.total_symbols);
    println!("  Relationships: {}", stats.total_relationships);
    if let Some(path) = db.path() {
        println!("  Size: {:.2} MB", db_size_mb(path)?);
    }

    let by_kind = db.symbols_by_kind()?;
    if !by_kind.is_empty() {
        println!("\nSymbols by kind:");
        for (kind, count) in by_kind {
            println!("  {}: {}", kind, count);
        }
    }

    let by_type = db.relationships_by_type()?;
    if !by_type.is_empty() {
        println!("\nRelationships by type:");
        for (rel_type, count) in by_type {
            println!("  {}: {}", rel_type, count);
        }
    }

    Ok(())
}

fn db_size_mb(db_path: &Path) -> Result<f64> {
    let metadata = std::fs::metadata(db_path)?;
    Ok(metadata.len() as f64 / (1024.0 * 1024.0))
}
