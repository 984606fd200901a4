// File watcher for incremental updates

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::config::{Config, PathFilter};
use crate::indexer::{discover_files, IndexReport, Indexer, SourceFile};
use crate::lang::Language;

/// Quiet period after the last relevant event before re-indexing
pub const DEBOUNCE: Duration = Duration::from_millis(500);

/// File watcher for automatic re-indexing
pub struct FileWatcher {
    indexer: Arc<Indexer>,
    root: PathBuf,
    config: Config,
    filter: PathFilter,
    languages: Vec<Language>,
}

impl FileWatcher {
    pub fn new(indexer: Arc<Indexer>, root: PathBuf, config: Config) -> Result<Self> {
        let filter = config.path_filter()?;
        let languages = config.enabled_languages();
        Ok(Self {
            indexer,
            root,
            config,
            filter,
            languages,
        })
    }

    /// Watch the project until the event stream closes, re-indexing after each burst of changes
    pub async fn watch(&self) -> Result<()> {
        info!("Starting file watcher for: {}", self.root.display());

        let (tx, mut rx) = mpsc::channel::<Event>(256);

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    // called on notify's own thread, outside the runtime
                    if let Err(e) = tx.blocking_send(event) {
                        error!("Failed to send file event: {}", e);
                    }
                }
                Err(e) => error!("File watch error: {}", e),
            },
            notify::Config::default(),
        )
        .context("Failed to create file watcher")?;

        watcher
            .watch(&self.root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", self.root.display()))?;

        info!("File watcher started. Monitoring for changes...");

        while let Some(event) = rx.recv().await {
            if !self.is_relevant(&event) {
                continue;
            }
            debug!("File event: {:?}", event);

            // absorb the rest of the burst
            loop {
                match tokio::time::timeout(DEBOUNCE, rx.recv()).await {
                    Ok(Some(next)) => debug!("Coalesced event: {:?}", next.kind),
                    Ok(None) | Err(_) => break,
                }
            }

            match self.reindex().await {
                Ok(report) => info!(
                    "Re-indexed {} files ({} removed, {} errors)",
                    report.files_indexed,
                    report.files_removed,
                    report.errors.len()
                ),
                Err(e) => error!("Re-indexing failed: {:#}", e),
            }
        }

        Ok(())
    }

    /// Content changes and removals of files the index covers
    fn is_relevant(&self, event: &Event) -> bool {
        matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        ) && event.paths.iter().any(|path| self.is_indexed_path(path))
    }

    fn is_indexed_path(&self, path: &Path) -> bool {
        let Some(file) = SourceFile::new(&self.root, path.to_path_buf()) else {
            return false;
        };
        self.languages.contains(&file.language) && self.filter.matches(&file.path)
    }

    async fn reindex(&self) -> Result<IndexReport> {
        let indexer = Arc::clone(&self.indexer);
        let root = self.root.clone();
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || {
            let files = discover_files(&root, &config)?;
            indexer.run(&files, false)
        })
        .await
        .context("Indexing task panicked")?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::db::IndexDatabase;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};

    fn watcher(root: &Path) -> FileWatcher {
        let indexer = Indexer::new(IndexDatabase::in_memory().unwrap(), 1).unwrap();
        FileWatcher::new(Arc::new(indexer), root.to_path_buf(), Config::default()).unwrap()
    }

    #[test]
    fn test_relevant_events() {
        let dir = tempfile::tempdir().unwrap();
        let w = watcher(dir.path());
        let event = |kind, path: &str| Event::new(kind).add_path(dir.path().join(path));

        assert!(w.is_relevant(&event(EventKind::Modify(ModifyKind::Any), "src/app.ts")));
        assert!(w.is_relevant(&event(EventKind::Remove(RemoveKind::File), "pkg/models.go")));
        assert!(w.is_relevant(&event(EventKind::Create(CreateKind::File), "lib/main.py")));

        assert!(!w.is_relevant(&event(EventKind::Modify(ModifyKind::Any), ".symgraph.db")));
        assert!(!w.is_relevant(&event(EventKind::Modify(ModifyKind::Any), "README.md")));
        assert!(!w.is_relevant(&event(
            EventKind::Modify(ModifyKind::Any),
            "node_modules/x/index.js"
        )));
        assert!(!w.is_relevant(&event(EventKind::Access(notify::event::AccessKind::Any), "src/app.ts")));
    }

    #[tokio::test]
    async fn test_reindex_picks_up_changes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.py"), "def main():\n    pass\n").unwrap();
        let w = watcher(dir.path());

        let report = w.reindex().await.unwrap();
        assert_eq!(report.files_indexed, 1);

        std::fs::remove_file(dir.path().join("app.py")).unwrap();
        let report = w.reindex().await.unwrap();
        assert_eq!(report.files_removed, 1);
        assert_eq!(w.indexer.db().get_stats().unwrap().total_symbols, 0);
    }
}
