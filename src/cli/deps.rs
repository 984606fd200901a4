use anyhow::{bail, Result};

use super::{describe, open_index};
use crate::config::Config;
use crate::query::KnowledgeGraph;

pub fn show_deps(project: &str, config: &Config, symbol: &str) -> Result<()> {
    let db = open_index(project, config)?;
    let graph = KnowledgeGraph::new(db.clone());

    let targets = graph.find_symbols(symbol)?;
    if targets.is_empty() {
        bail!("No symbol with id or qualified name '{}'", symbol);
    }

    for target in &targets {
        println!(
            "{} ({}) {}:{}",
            target.qualified_name, target.kind, target.location.file, target.location.start_line
        );

        let dependencies = graph.get_dependencies(&target.id)?;
        println!("  Depends on ({}):", dependencies.len());
        for rel in &dependencies {
            println!("    {} {}", rel.rel_type, describe(&db, &rel.target_id)?);
        }

        let dependents = graph.get_dependents(&target.id)?;
        println!("  Used by ({}):", dependents.len());
        for rel in &dependents {
            println!("    {} {}", rel.rel_type, describe(&db, &rel.source_id)?);
        }
    }

    Ok(())
}
