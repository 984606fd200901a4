use anyhow::{bail, Result};

use super::{describe, open_index};
use crate::config::Config;
use crate::query::KnowledgeGraph;

pub fn show_impact(project: &str, config: &Config, symbol: &str, depth: usize) -> Result<()> {
    let db = open_index(project, config)?;
    let graph = KnowledgeGraph::new(db.clone());

    let targets = graph.find_symbols(symbol)?;
    if targets.is_empty() {
        bail!("No symbol with id or qualified name '{}'", symbol);
    }

    for target in &targets {
        println!(
            "Impact of {} ({}) {}:{} within {} hops",
            target.qualified_name, target.kind, target.location.file, target.location.start_line, depth
        );

        let radius = graph.get_impact_radius(&target.id, depth)?;
        if radius.is_empty() {
            println!("  Nothing depends on this symbol");
            continue;
        }

        let mut affected = radius
            .iter()
            .map(|id| describe(&db, id))
            .collect::<Result<Vec<_>>>()?;
        affected.sort();
        println!("  {} affected:", affected.len());
        for line in affected {
            println!("    {}", line);
        }
    }

    Ok(())
}
