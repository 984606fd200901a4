// File discovery: project walk filtered by config globs and enabled languages

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::Config;
use crate::lang::Language;

/// A project file handed to the indexer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Project-relative path with `/` separators; the file's identity in the index
    pub path: String,
    pub absolute: PathBuf,
    pub language: Language,
}

impl SourceFile {
    pub fn new(root: &Path, absolute: PathBuf) -> Option<Self> {
        let relative = absolute.strip_prefix(root).ok()?;
        let path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if path.is_empty() {
            return None;
        }
        let language = Language::from_path(&absolute);
        Some(Self {
            path,
            absolute,
            language,
        })
    }
}

fn is_hidden_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry.file_name().to_str().is_some_and(|name| name.starts_with('.'))
}

/// Walk `root` and return indexable files in path order
pub fn discover_files(root: &Path, config: &Config) -> Result<Vec<SourceFile>> {
    let filter = config.path_filter()?;
    let languages = config.enabled_languages();

    let mut files = Vec::new();
    for entry in WalkDir::new(root).into_iter().filter_entry(|e| !is_hidden_dir(e)) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable path: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(file) = SourceFile::new(root, entry.into_path()) else {
            continue;
        };
        if !languages.contains(&file.language) || !filter.matches(&file.path) {
            continue;
        }
        files.push(file);
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    debug!("Discovered {} files under {}", files.len(), root.display());
    Ok(files)
}
