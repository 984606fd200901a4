use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::schema::init_schema;
use super::{
    link_reference_lists, module_id, FileHash, Location, Relationship, RelationshipLocation, RelationshipType, Symbol,
    SymbolMetrics,
};

/// Type alias for connection pool
pub type ConnectionPool = Pool<SqliteConnectionManager>;

const SYMBOL_COLUMNS: &str = "id, name, qualified_name, kind, file, start_line, end_line, parent_id,
     visibility, exported, language, extends, implements, uses_traits, refs, referenced_by,
     signature, deprecated, metrics";

const RELATIONSHIP_COLUMNS: &str = "source_id, target_id, type, source_file, line, confidence, inferred";

/// Everything one indexing run writes, applied in a single transaction
#[derive(Debug, Default)]
pub struct IndexBatch {
    /// Forget every stored file hash before applying the rest (full rebuild)
    pub clear_file_hashes: bool,
    pub removed_files: Vec<String>,
    pub replaced_files: Vec<FileReplacement>,
    pub relationships: Vec<Relationship>,
}

/// Fresh extraction result for one file, replacing whatever was stored for it
#[derive(Debug, Clone)]
pub struct FileReplacement {
    pub file_path: String,
    pub content_hash: String,
    pub symbols: Vec<Symbol>,
}

/// Database connection manager
#[derive(Clone)]
pub struct IndexDatabase {
    pool: ConnectionPool,
    db_path: Option<PathBuf>,
}

impl IndexDatabase {
    /// Create or open a database
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        info!("Opening database at: {}", db_path.display());

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .context("Failed to create connection pool")?;

        Self::init(pool, Some(db_path))
    }

    /// Private in-memory database; a single pooled connection keeps one shared store
    pub fn in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)
            .context("Failed to create connection pool")?;

        Self::init(pool, None)
    }

    fn init(pool: ConnectionPool, db_path: Option<PathBuf>) -> Result<Self> {
        {
            let conn = pool.get().context("Failed to get connection")?;
            init_schema(&conn).context("Failed to initialize schema")?;
        }
        Ok(Self { pool, db_path })
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool.get().context("Failed to get connection from pool")
    }

    // ---------------------------------------------------------------------
    // Symbols
    // ---------------------------------------------------------------------

    /// Insert or replace a symbol by id
    pub fn upsert_symbol(&self, symbol: &Symbol) -> Result<()> {
        let conn = self.get_conn()?;
        write_symbol(&conn, symbol)
    }

    pub fn get_symbol(&self, id: &str) -> Result<Option<Symbol>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {} FROM symbols WHERE id = ?1", SYMBOL_COLUMNS))?;
        let symbol = stmt.query_row([id], row_to_symbol).optional()?;
        Ok(symbol)
    }

    pub fn find_symbols_by_qualified_name(&self, qualified_name: &str) -> Result<Vec<Symbol>> {
        self.query_symbols("WHERE qualified_name = ?1 ORDER BY file, start_line", qualified_name)
    }

    pub fn find_symbols_by_file(&self, file: &str) -> Result<Vec<Symbol>> {
        self.query_symbols("WHERE file = ?1 ORDER BY start_line", file)
    }

    /// Every stored symbol, ordered by file then position
    pub fn load_symbols(&self) -> Result<Vec<Symbol>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM symbols ORDER BY file, start_line",
            SYMBOL_COLUMNS
        ))?;
        let symbols = stmt
            .query_map([], row_to_symbol)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(symbols)
    }

    fn query_symbols(&self, clause: &str, arg: &str) -> Result<Vec<Symbol>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM symbols {}", SYMBOL_COLUMNS, clause))?;
        let symbols = stmt
            .query_map([arg], row_to_symbol)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(symbols)
    }

    // ---------------------------------------------------------------------
    // Relationships
    // ---------------------------------------------------------------------

    /// Insert a relationship; an existing edge for the same pair takes the new type
    pub fn upsert_relationship(&self, rel: &Relationship) -> Result<()> {
        let conn = self.get_conn()?;
        write_relationship(&conn, rel)
    }

    /// Delete the edge between a pair regardless of its type
    pub fn delete_relationship(&self, source_id: &str, target_id: &str) -> Result<usize> {
        let conn = self.get_conn()?;
        Ok(conn.execute(
            "DELETE FROM relationships WHERE source_id = ?1 AND target_id = ?2",
            params![source_id, target_id],
        )?)
    }

    pub fn relationships_from(&self, source_id: &str) -> Result<Vec<Relationship>> {
        self.query_relationships("WHERE source_id = ?1 ORDER BY target_id", source_id)
    }

    pub fn relationships_to(&self, target_id: &str) -> Result<Vec<Relationship>> {
        self.query_relationships("WHERE target_id = ?1 ORDER BY source_id", target_id)
    }

    pub fn load_relationships(&self) -> Result<Vec<Relationship>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM relationships ORDER BY source_id, target_id",
            RELATIONSHIP_COLUMNS
        ))?;
        let rels = stmt
            .query_map([], row_to_relationship)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rels)
    }

    fn query_relationships(&self, clause: &str, arg: &str) -> Result<Vec<Relationship>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM relationships {}",
            RELATIONSHIP_COLUMNS, clause
        ))?;
        let rels = stmt
            .query_map([arg], row_to_relationship)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rels)
    }

    /// Drop every relationship and store the given set in one transaction
    pub fn replace_relationships(&self, relationships: &[Relationship]) -> Result<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM relationships", [])?;
        for rel in relationships {
            write_relationship(&tx, rel)?;
        }
        refresh_reference_lists(&tx)?;
        tx.commit().context("Failed to commit relationship rebuild")?;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // File hashes
    // ---------------------------------------------------------------------

    pub fn load_file_hashes(&self) -> Result<HashMap<String, FileHash>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT file_path, content_hash, indexed_at FROM file_hashes")?;
        let hashes = stmt
            .query_map([], |row| {
                Ok(FileHash {
                    file_path: row.get(0)?,
                    content_hash: row.get(1)?,
                    indexed_at: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(hashes
            .into_iter()
            .map(|hash| (hash.file_path.clone(), hash))
            .collect())
    }

    /// Every file the index holds anything for: a stored hash, symbols, or
    /// relationships found in it. A file whose hash was cleared by a rebuild
    /// but failed to re-extract still shows up here.
    pub fn indexed_files(&self) -> Result<HashSet<String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT file_path FROM file_hashes
             UNION SELECT file FROM symbols
             UNION SELECT source_file FROM relationships WHERE source_file IS NOT NULL",
        )?;
        let files = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<HashSet<String>, _>>()?;
        Ok(files)
    }

    // ---------------------------------------------------------------------
    // Batches
    // ---------------------------------------------------------------------

    /// Apply a whole indexing run atomically: deletions and symbols, then relationships,
    /// then file hashes. Nothing is visible to readers until the commit.
    pub fn apply_batch(&self, batch: &IndexBatch) -> Result<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction().context("Failed to open index transaction")?;

        if batch.clear_file_hashes {
            tx.execute("DELETE FROM file_hashes", [])?;
        }

        for file in &batch.removed_files {
            let old_ids = symbol_ids_for_file(&tx, file)?;
            tx.execute("DELETE FROM symbols WHERE file = ?1", [file])?;
            tx.execute(
                "DELETE FROM relationships WHERE source_file = ?1 OR source_id = ?2",
                params![file, module_id(file)],
            )?;
            for id in &old_ids {
                tx.execute(
                    "DELETE FROM relationships WHERE source_id = ?1 OR target_id = ?1",
                    [id],
                )?;
            }
            tx.execute("DELETE FROM file_hashes WHERE file_path = ?1", [file])?;
            debug!("Removed {} symbols of deleted file {}", old_ids.len(), file);
        }

        for replacement in &batch.replaced_files {
            let file = &replacement.file_path;
            let new_ids: HashSet<&str> =
                replacement.symbols.iter().map(|s| s.id.as_str()).collect();
            let old_ids = symbol_ids_for_file(&tx, file)?;

            tx.execute("DELETE FROM symbols WHERE file = ?1", [file])?;
            tx.execute(
                "DELETE FROM relationships WHERE source_file = ?1 OR source_id = ?2",
                params![file, module_id(file)],
            )?;
            for stale in old_ids.iter().filter(|id| !new_ids.contains(id.as_str())) {
                tx.execute(
                    "DELETE FROM relationships WHERE source_id = ?1 OR target_id = ?1",
                    [stale],
                )?;
            }
            for symbol in &replacement.symbols {
                write_symbol(&tx, symbol)?;
            }
        }

        for rel in &batch.relationships {
            write_relationship(&tx, rel)?;
        }

        for replacement in &batch.replaced_files {
            write_file_hash(&tx, &replacement.file_path, &replacement.content_hash)?;
        }

        refresh_reference_lists(&tx)?;

        tx.commit().context("Failed to commit index batch")?;

        info!(
            "Committed batch: {} files replaced, {} removed, {} relationships",
            batch.replaced_files.len(),
            batch.removed_files.len(),
            batch.relationships.len()
        );

        Ok(())
    }

    // ---------------------------------------------------------------------
    // Statistics
    // ---------------------------------------------------------------------

    pub fn get_stats(&self) -> Result<IndexStats> {
        let conn = self.get_conn()?;

        let count = |table: &str| -> Result<usize> {
            let n: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
            Ok(n as usize)
        };

        Ok(IndexStats {
            total_symbols: count("symbols")?,
            total_files: count("file_hashes")?,
            total_relationships: count("relationships")?,
        })
    }

    /// Symbol counts grouped by kind, largest first
    pub fn symbols_by_kind(&self) -> Result<Vec<(String, usize)>> {
        self.grouped_counts(
            "SELECT kind, COUNT(*) AS count FROM symbols GROUP BY kind ORDER BY count DESC, kind",
        )
    }

    /// Relationship counts grouped by type, largest first
    pub fn relationships_by_type(&self) -> Result<Vec<(String, usize)>> {
        self.grouped_counts(
            "SELECT type, COUNT(*) AS count FROM relationships GROUP BY type ORDER BY count DESC, type",
        )
    }

    fn grouped_counts(&self, sql: &str) -> Result<Vec<(String, usize)>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map([], |row| {
                let key: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((key, count as usize))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

/// Index statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_symbols: usize,
    pub total_files: usize,
    pub total_relationships: usize,
}

fn symbol_ids_for_file(conn: &Connection, file: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT id FROM symbols WHERE file = ?1")?;
    let ids = stmt
        .query_map([file], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(ids)
}

/// Re-derive the name lists stored on every symbol from the current edge set
fn refresh_reference_lists(conn: &Connection) -> Result<()> {
    let mut symbols = {
        let mut stmt = conn.prepare(&format!("SELECT {} FROM symbols", SYMBOL_COLUMNS))?;
        let rows = stmt
            .query_map([], row_to_symbol)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows
    };
    let relationships = {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM relationships ORDER BY source_id, target_id",
            RELATIONSHIP_COLUMNS
        ))?;
        let rows = stmt
            .query_map([], row_to_relationship)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows
    };

    let before = symbols.clone();
    link_reference_lists(&mut symbols, &relationships);

    let mut stmt = conn.prepare(
        "UPDATE symbols SET extends = ?2, implements = ?3, uses_traits = ?4, refs = ?5, referenced_by = ?6
         WHERE id = ?1",
    )?;
    let mut updated = 0;
    for (old, new) in before.iter().zip(&symbols) {
        if old == new {
            continue;
        }
        stmt.execute(params![
            new.id,
            new.extends,
            serde_json::to_string(&new.implements)?,
            serde_json::to_string(&new.uses_traits)?,
            serde_json::to_string(&new.references)?,
            serde_json::to_string(&new.referenced_by)?,
        ])?;
        updated += 1;
    }
    debug!("Refreshed reference lists of {} symbols", updated);

    Ok(())
}

fn write_symbol(conn: &Connection, symbol: &Symbol) -> Result<()> {
    debug!("Upserting symbol: {}", symbol.qualified_name);

    let metrics = symbol
        .metrics
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO symbols ({}) VALUES
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
            SYMBOL_COLUMNS
        ),
        params![
            symbol.id,
            symbol.name,
            symbol.qualified_name,
            symbol.kind.as_str(),
            symbol.location.file,
            symbol.location.start_line,
            symbol.location.end_line,
            symbol.parent,
            symbol.visibility.map(|v| v.as_str()),
            symbol.exported,
            symbol.language,
            symbol.extends,
            serde_json::to_string(&symbol.implements)?,
            serde_json::to_string(&symbol.uses_traits)?,
            serde_json::to_string(&symbol.references)?,
            serde_json::to_string(&symbol.referenced_by)?,
            symbol.signature,
            symbol.deprecated,
            metrics,
        ],
    )?;

    Ok(())
}

fn write_relationship(conn: &Connection, rel: &Relationship) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO relationships ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(source_id, target_id) DO UPDATE SET
                type = excluded.type,
                source_file = excluded.source_file,
                line = excluded.line,
                confidence = excluded.confidence,
                inferred = excluded.inferred",
            RELATIONSHIP_COLUMNS
        ),
        params![
            rel.source_id,
            rel.target_id,
            rel.rel_type.as_str(),
            rel.location.as_ref().map(|l| l.file.as_str()),
            rel.location.as_ref().map(|l| l.line),
            rel.confidence.map(f64::from),
            rel.inferred,
        ],
    )?;
    Ok(())
}

fn write_file_hash(conn: &Connection, file_path: &str, content_hash: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO file_hashes (file_path, content_hash, indexed_at)
         VALUES (?1, ?2, ?3)",
        params![file_path, content_hash, now()],
    )?;
    Ok(())
}

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn json_list(row: &Row, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

/// Convert database row to Symbol
fn row_to_symbol(row: &Row) -> rusqlite::Result<Symbol> {
    let kind_str: String = row.get(3)?;
    let visibility_str: Option<String> = row.get(8)?;
    let metrics_str: Option<String> = row.get(18)?;

    let metrics = metrics_str
        .map(|raw| serde_json::from_str::<SymbolMetrics>(&raw))
        .transpose()
        .map_err(|e| conversion_error(18, e))?;

    Ok(Symbol {
        id: row.get(0)?,
        name: row.get(1)?,
        qualified_name: row.get(2)?,
        kind: kind_str.parse().map_err(|e| conversion_error(3, e))?,
        location: Location {
            file: row.get(4)?,
            start_line: row.get(5)?,
            end_line: row.get(6)?,
        },
        parent: row.get(7)?,
        visibility: visibility_str
            .map(|v| v.parse())
            .transpose()
            .map_err(|e| conversion_error(8, e))?,
        exported: row.get(9)?,
        language: row.get(10)?,
        extends: row.get(11)?,
        implements: json_list(row, 12)?,
        uses_traits: json_list(row, 13)?,
        references: json_list(row, 14)?,
        referenced_by: json_list(row, 15)?,
        signature: row.get(16)?,
        deprecated: row.get(17)?,
        metrics,
    })
}

/// Convert database row to Relationship
fn row_to_relationship(row: &Row) -> rusqlite::Result<Relationship> {
    let type_str: String = row.get(2)?;
    let file: Option<String> = row.get(3)?;
    let line: Option<u32> = row.get(4)?;
    let confidence: Option<f64> = row.get(5)?;

    Ok(Relationship {
        source_id: row.get(0)?,
        target_id: row.get(1)?,
        rel_type: RelationshipType::from(type_str.as_str()),
        location: file.map(|file| RelationshipLocation {
            file,
            line: line.unwrap_or(0),
        }),
        confidence: confidence.map(|c| c as f32),
        inferred: row.get(6)?,
    })
}

/// Get current timestamp in seconds
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
