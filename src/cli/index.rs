use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::config::Config;
use crate::index::db::IndexDatabase;
use crate::indexer::watcher::FileWatcher;
use crate::indexer::{discover_files, Indexer};

pub async fn index_project(project: &str, config: Config, rebuild: bool, watch: bool) -> Result<()> {
    let project_dir = PathBuf::from(project);
    let root = config.project_root(&project_dir);
    let db_path = config.db_path(&project_dir);
    let full_rebuild = rebuild || config.indexing.full_rebuild;
    let should_watch = watch || config.indexing.watch;

    println!("symgraph indexer v{}", env!("CARGO_PKG_VERSION"));
    println!("Project: {} ({})", config.project.name, root.display());
    println!("Database: {}", db_path.display());
    println!("Workers: {}", config.indexing.workers);
    println!("Rebuild: {}", full_rebuild);

    let db = IndexDatabase::new(&db_path)?;
    let indexer = Arc::new(Indexer::new(db, config.indexing.workers)?);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message("Discovering files...");

    let report = {
        let indexer = Arc::clone(&indexer);
        let root = root.clone();
        let config = config.clone();
        let spinner = spinner.clone();
        tokio::task::spawn_blocking(move || {
            let files = discover_files(&root, &config)?;
            spinner.set_message(format!("Indexing {} files...", files.len()));
            indexer.run(&files, full_rebuild)
        })
        .await
        .context("Indexing task panicked")?
    };
    spinner.finish_and_clear();
    let report = report?;

    println!("\n{}", report);
    info!("Index written to {}", db_path.display());

    if should_watch {
        println!("\nWatching {} for changes. Press Ctrl+C to stop.", root.display());
        let watcher = FileWatcher::new(indexer, root, config)?;
        watcher.watch().await?;
    }

    Ok(())
}
