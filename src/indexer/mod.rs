// Incremental indexing: hash, extract, resolve, commit

pub mod discovery;
pub mod dynamic;
pub mod parser;
pub mod relationships;
pub mod report;
pub mod resolver;
pub mod symbols;
pub mod watcher;

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::ExtractionError;
use crate::index::db::{FileReplacement, IndexBatch, IndexDatabase};
use crate::index::symbol_index::SymbolIndex;
use crate::index::{content_hash, Symbol};

pub use discovery::{discover_files, SourceFile};
pub use report::{IndexError, IndexReport};
pub use symbols::{extract_file, ParsedFile};

/// Per-file result of the read/hash/extract phase
enum FileOutcome {
    Unchanged,
    Extracted { file: ParsedFile, hash: String },
    Failed { path: String, message: String },
}

/// Coordinates extraction and storage for one project index
pub struct Indexer {
    db: IndexDatabase,
    pool: rayon::ThreadPool,
}

impl Indexer {
    pub fn new(db: IndexDatabase, workers: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("symgraph-worker-{}", i))
            .build()
            .context("Failed to build worker pool")?;
        Ok(Self { db, pool })
    }

    pub fn db(&self) -> &IndexDatabase {
        &self.db
    }

    /// Index `files`, the complete discovery set of the project.
    ///
    /// Unchanged files are skipped and keep their stored symbols. Any file the
    /// index holds data for that is missing from `files` is cleaned up. Per-file
    /// failures are reported without aborting the run. All writes land in one
    /// transaction; a store failure fails the run.
    pub fn run(&self, files: &[SourceFile], full_rebuild: bool) -> Result<IndexReport> {
        let started = Instant::now();
        let mut report = IndexReport {
            files_discovered: files.len(),
            ..Default::default()
        };

        let known = self.db.load_file_hashes()?;
        let discovered: HashSet<&str> = files.iter().map(|f| f.path.as_str()).collect();
        let mut removed: Vec<String> = self
            .db
            .indexed_files()?
            .into_iter()
            .filter(|path| !discovered.contains(path.as_str()))
            .collect();
        removed.sort();

        let previous: HashMap<&str, &str> = if full_rebuild {
            HashMap::new()
        } else {
            known
                .iter()
                .map(|(path, hash)| (path.as_str(), hash.content_hash.as_str()))
                .collect()
        };

        info!(
            "Indexing {} files ({} previously known, full rebuild: {})",
            files.len(),
            known.len(),
            full_rebuild
        );

        // Phase 1: read, hash and extract symbols, file by file
        let outcomes: Vec<FileOutcome> = self.pool.install(|| {
            files
                .par_iter()
                .map(|file| Self::process_file(file, previous.get(file.path.as_str()).copied()))
                .collect()
        });

        let mut parsed = Vec::new();
        let mut hashes = Vec::new();
        for outcome in outcomes {
            match outcome {
                FileOutcome::Unchanged => report.files_skipped += 1,
                FileOutcome::Extracted { file, hash } => {
                    hashes.push(hash);
                    parsed.push(file);
                }
                FileOutcome::Failed { path, message } => {
                    warn!("Failed to index {}: {}", path, message);
                    report.record_error(path, message);
                }
            }
        }
        report.files_indexed = parsed.len();

        // Phase 2: the project index, only once every file's symbols are known
        let replaced: HashSet<&str> = parsed.iter().map(|f| f.path.as_str()).collect();
        let gone: HashSet<&str> = removed.iter().map(String::as_str).collect();
        let mut project_symbols: Vec<Symbol> = self
            .db
            .load_symbols()?
            .into_iter()
            .filter(|s| {
                let file = s.location.file.as_str();
                !replaced.contains(file) && !gone.contains(file)
            })
            .collect();
        project_symbols.extend(parsed.iter().flat_map(|f| f.symbols.iter().cloned()));
        let index = SymbolIndex::build(&project_symbols);
        debug!("Symbol index built over {} symbols", index.len());

        // Phase 3: relationships for the files that were re-extracted
        let relationships = self.pool.install(|| {
            parsed
                .par_iter()
                .flat_map_iter(|file| relationships::extract_relationships(file, &index))
                .collect::<Vec<_>>()
        });

        report.symbols = parsed.iter().map(|f| f.symbols.len()).sum();
        report.relationships = relationships.len();
        report.files_removed = removed.len();

        let batch = IndexBatch {
            clear_file_hashes: full_rebuild,
            removed_files: removed,
            replaced_files: parsed
                .into_iter()
                .zip(hashes)
                .map(|(file, content_hash)| FileReplacement {
                    file_path: file.path,
                    content_hash,
                    symbols: file.symbols,
                })
                .collect(),
            relationships,
        };
        self.db
            .apply_batch(&batch)
            .context("Failed to write index batch")?;

        report.duration = started.elapsed();
        info!(
            "Indexed {} files, skipped {}, removed {}, {} errors",
            report.files_indexed,
            report.files_skipped,
            report.files_removed,
            report.errors.len()
        );
        Ok(report)
    }

    fn process_file(file: &SourceFile, previous_hash: Option<&str>) -> FileOutcome {
        let source = match std::fs::read_to_string(&file.absolute) {
            Ok(source) => source,
            Err(e) => {
                return FileOutcome::Failed {
                    path: file.path.clone(),
                    message: ExtractionError::from(e).to_string(),
                }
            }
        };

        let hash = content_hash(&source);
        if previous_hash == Some(hash.as_str()) {
            debug!("Unchanged: {}", file.path);
            return FileOutcome::Unchanged;
        }

        debug!("Extracting: {} ({})", file.path, file.language);
        match extract_file(&file.path, source, file.language) {
            Ok(parsed) => FileOutcome::Extracted { file: parsed, hash },
            Err(e) => FileOutcome::Failed {
                path: file.path.clone(),
                message: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::RelationshipType;
    use crate::lang::Language;
    use std::fs;
    use std::path::Path;

    fn source_file(root: &Path, path: &str) -> SourceFile {
        SourceFile::new(root, root.join(path)).unwrap()
    }

    fn write(root: &Path, path: &str, content: &str) {
        let full = root.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }

    const BASE: &str = "export class BaseService {}\n";
    const ORDER: &str = r#"import { BaseService } from './base';

function validate(input) { return true; }

export class OrderService extends BaseService {
    createOrder(input) {
        validate(input);
    }
}
"#;

    fn setup() -> (tempfile::TempDir, Indexer, Vec<SourceFile>) {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/base.ts", BASE);
        write(dir.path(), "src/order.ts", ORDER);
        let files = vec![
            source_file(dir.path(), "src/base.ts"),
            source_file(dir.path(), "src/order.ts"),
        ];
        let indexer = Indexer::new(IndexDatabase::in_memory().unwrap(), 2).unwrap();
        (dir, indexer, files)
    }

    #[test]
    fn test_scenario_symbols_and_edges_are_stored() {
        let (_dir, indexer, files) = setup();
        let report = indexer.run(&files, false).unwrap();
        assert_eq!(report.files_indexed, 2);
        assert!(!report.has_errors());

        let db = indexer.db();
        let service = &db.find_symbols_by_qualified_name("OrderService").unwrap()[0];
        let base = &db.find_symbols_by_qualified_name("BaseService").unwrap()[0];
        let create = &db.find_symbols_by_qualified_name("OrderService.createOrder").unwrap()[0];
        let validate = &db.find_symbols_by_qualified_name("validate").unwrap()[0];

        let inherits = db.relationships_from(&service.id).unwrap();
        assert!(inherits
            .iter()
            .any(|r| r.target_id == base.id && r.rel_type == RelationshipType::Inherits));
        let calls = db.relationships_from(&create.id).unwrap();
        assert!(calls
            .iter()
            .any(|r| r.target_id == validate.id && r.rel_type == RelationshipType::Calls));

        // reference lists are filled in from the stored edges
        assert_eq!(service.extends.as_deref(), Some("BaseService"));
        assert!(create.references.contains(&"validate".to_string()));
    }

    #[test]
    fn test_second_run_is_idempotent() {
        let (_dir, indexer, files) = setup();
        indexer.run(&files, false).unwrap();
        let before = indexer.db().load_symbols().unwrap();
        let edges_before = indexer.db().load_relationships().unwrap();

        let report = indexer.run(&files, false).unwrap();
        assert_eq!(report.files_skipped, 2);
        assert_eq!(report.files_indexed, 0);
        assert_eq!(indexer.db().load_symbols().unwrap(), before);
        assert_eq!(indexer.db().load_relationships().unwrap().len(), edges_before.len());

        // a forced rebuild re-extracts to the same ids
        let report = indexer.run(&files, true).unwrap();
        assert_eq!(report.files_indexed, 2);
        let ids = |symbols: &[Symbol]| symbols.iter().map(|s| s.id.clone()).collect::<HashSet<_>>();
        assert_eq!(ids(&indexer.db().load_symbols().unwrap()), ids(&before));
    }

    #[test]
    fn test_removed_file_is_cleaned_up() {
        let (dir, indexer, files) = setup();
        indexer.run(&files, false).unwrap();
        let base_hash = indexer.db().load_file_hashes().unwrap()["src/base.ts"].clone();

        let remaining = vec![source_file(dir.path(), "src/base.ts")];
        let report = indexer.run(&remaining, false).unwrap();
        assert_eq!(report.files_removed, 1);
        assert_eq!(report.files_skipped, 1);

        let db = indexer.db();
        assert!(db.find_symbols_by_file("src/order.ts").unwrap().is_empty());
        assert!(db
            .load_relationships()
            .unwrap()
            .iter()
            .all(|r| r.location.as_ref().map(|l| l.file.as_str()) != Some("src/order.ts")));
        let hashes = db.load_file_hashes().unwrap();
        assert!(!hashes.contains_key("src/order.ts"));
        assert_eq!(hashes["src/base.ts"], base_hash);
        assert_eq!(db.find_symbols_by_file("src/base.ts").unwrap().len(), 1);
    }

    #[test]
    fn test_failed_file_keeps_previous_symbols() {
        let (dir, indexer, files) = setup();
        indexer.run(&files, false).unwrap();
        let before = indexer.db().find_symbols_by_file("src/order.ts").unwrap();

        // not valid UTF-8: reading fails, the old index entry must survive
        fs::write(dir.path().join("src/order.ts"), [0xff, 0xfe, 0x00]).unwrap();
        let report = indexer.run(&files, false).unwrap();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].file, "src/order.ts");
        assert_eq!(indexer.db().find_symbols_by_file("src/order.ts").unwrap(), before);

        // retried on the next run once fixed
        fs::write(dir.path().join("src/order.ts"), ORDER).unwrap();
        let report = indexer.run(&files, false).unwrap();
        assert!(!report.has_errors());
        assert_eq!(report.files_skipped, 2);
    }

    #[test]
    fn test_unknown_language_is_recorded_without_symbols() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "docs/notes.txt", "plain text");
        let file = source_file(dir.path(), "docs/notes.txt");
        assert_eq!(file.language, Language::Unknown);

        let indexer = Indexer::new(IndexDatabase::in_memory().unwrap(), 1).unwrap();
        let report = indexer.run(&[file], false).unwrap();
        assert!(!report.has_errors());
        assert_eq!(report.symbols, 0);
        assert!(indexer.db().load_file_hashes().unwrap().contains_key("docs/notes.txt"));
    }

    #[test]
    fn test_file_deleted_after_failed_rebuild_is_cleaned_up() {
        let (dir, indexer, files) = setup();
        indexer.run(&files, false).unwrap();

        // the rebuild drops every hash; order.ts then fails and keeps only its symbols
        fs::write(dir.path().join("src/order.ts"), [0xff, 0xfe, 0x00]).unwrap();
        let report = indexer.run(&files, true).unwrap();
        assert_eq!(report.errors.len(), 1);
        assert!(!indexer.db().load_file_hashes().unwrap().contains_key("src/order.ts"));
        assert!(!indexer.db().find_symbols_by_file("src/order.ts").unwrap().is_empty());

        fs::remove_file(dir.path().join("src/order.ts")).unwrap();
        let remaining = vec![source_file(dir.path(), "src/base.ts")];
        let report = indexer.run(&remaining, false).unwrap();
        assert_eq!(report.files_removed, 1);

        let db = indexer.db();
        assert!(db.find_symbols_by_file("src/order.ts").unwrap().is_empty());
        assert!(db
            .load_relationships()
            .unwrap()
            .iter()
            .all(|r| r.location.as_ref().map(|l| l.file.as_str()) != Some("src/order.ts")));
        assert!(db.find_symbols_by_qualified_name("OrderService").unwrap().is_empty());
    }

    #[test]
    fn test_store_failure_rolls_back_the_whole_run() {
        let (dir, indexer, files) = setup();
        indexer.run(&files, false).unwrap();
        let symbols_before = indexer.db().load_symbols().unwrap();
        let edges_before = indexer.db().load_relationships().unwrap();
        let hashes_before = indexer.db().load_file_hashes().unwrap();

        // the write fails midway: after the symbol replacement, at the first edge
        indexer
            .db()
            .get_conn()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_edges BEFORE INSERT ON relationships
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();

        let changed = format!("{}\nfunction audit() {{ validate(1); }}\n", ORDER);
        write(dir.path(), "src/order.ts", &changed);
        let err = indexer.run(&files, false).unwrap_err();
        assert!(format!("{:#}", err).contains("disk full"));

        let db = indexer.db();
        assert_eq!(db.load_symbols().unwrap(), symbols_before);
        assert_eq!(db.load_relationships().unwrap(), edges_before);
        assert_eq!(db.load_file_hashes().unwrap(), hashes_before);
        assert!(db.find_symbols_by_qualified_name("audit").unwrap().is_empty());
    }

    #[test]
    fn test_deeply_nested_file_indexes_on_worker_threads() {
        let dir = tempfile::tempdir().unwrap();
        let terms = vec!["1"; 20_000].join(" + ");
        let source = format!("export function total() {{ return {}; }}\n", terms);
        write(dir.path(), "gen/total.js", &source);
        let files = vec![source_file(dir.path(), "gen/total.js")];

        let indexer = Indexer::new(IndexDatabase::in_memory().unwrap(), 2).unwrap();
        let report = indexer.run(&files, false).unwrap();
        assert!(!report.has_errors());
        assert_eq!(indexer.db().find_symbols_by_file("gen/total.js").unwrap().len(), 1);
    }
}
