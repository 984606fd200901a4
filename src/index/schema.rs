use rusqlite::{Connection, Result};
use tracing::{debug, info};

/// SQLite schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    debug!("Current schema version: {}", current_version);

    if current_version < SCHEMA_VERSION {
        info!("Upgrading schema from v{} to v{}", current_version, SCHEMA_VERSION);
        apply_migrations(conn, current_version)?;
    }

    Ok(())
}

/// Apply migrations from current version to latest
fn apply_migrations(conn: &Connection, from_version: i32) -> Result<()> {
    for version in (from_version + 1)..=SCHEMA_VERSION {
        info!("Applying migration v{}", version);
        if version == 1 {
            create_v1_schema(conn)?;
        }

        conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    }

    Ok(())
}

fn create_v1_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS symbols (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            qualified_name TEXT NOT NULL,
            kind TEXT NOT NULL,
            file TEXT NOT NULL,
            start_line INTEGER NOT NULL,
            end_line INTEGER NOT NULL,
            parent_id TEXT,
            visibility TEXT,
            exported INTEGER,
            language TEXT NOT NULL,
            extends TEXT,
            implements TEXT NOT NULL DEFAULT '[]',
            uses_traits TEXT NOT NULL DEFAULT '[]',
            refs TEXT NOT NULL DEFAULT '[]',
            referenced_by TEXT NOT NULL DEFAULT '[]',
            signature TEXT,
            deprecated INTEGER NOT NULL DEFAULT 0,
            metrics TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_symbols_qualified_name ON symbols(qualified_name);
        CREATE INDEX IF NOT EXISTS idx_symbols_file ON symbols(file);
        CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name);
        CREATE INDEX IF NOT EXISTS idx_symbols_kind ON symbols(kind);

        -- one relationship type per ordered pair
        CREATE TABLE IF NOT EXISTS relationships (
            source_id TEXT NOT NULL,
            target_id TEXT NOT NULL,
            type TEXT NOT NULL,
            source_file TEXT,
            line INTEGER,
            confidence REAL,
            inferred INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (source_id, target_id)
        );

        CREATE INDEX IF NOT EXISTS idx_relationships_target ON relationships(target_id);
        CREATE INDEX IF NOT EXISTS idx_relationships_type ON relationships(type);
        CREATE INDEX IF NOT EXISTS idx_relationships_file ON relationships(source_file);

        CREATE TABLE IF NOT EXISTS file_hashes (
            file_path TEXT PRIMARY KEY,
            content_hash TEXT NOT NULL,
            indexed_at INTEGER NOT NULL
        );",
    )?;

    info!("v1 schema created");

    Ok(())
}

/// Drop all tables (for rebuilding from scratch)
pub fn drop_schema(conn: &Connection) -> Result<()> {
    info!("Dropping all schema tables");

    conn.execute_batch(
        "DROP TABLE IF EXISTS file_hashes;
         DROP TABLE IF EXISTS relationships;
         DROP TABLE IF EXISTS symbols;
         DROP TABLE IF EXISTS schema_version;",
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_init_schema() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();

        assert!(tables.contains(&"symbols".to_string()));
        assert!(tables.contains(&"relationships".to_string()));
        assert!(tables.contains(&"file_hashes".to_string()));
        assert!(tables.contains(&"schema_version".to_string()));
    }

    #[test]
    fn test_schema_version() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let version: i32 = conn
            .query_row(
                "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .unwrap();

        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_drop_schema() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        drop_schema(&conn).unwrap();

        let count: i32 = conn
            .query_row("SELECT COUNT(*) FROM sqlite_master WHERE type='table'", [], |row| {
                row.get(0)
            })
            .unwrap();

        assert_eq!(count, 0);
    }

    #[test]
    fn test_idempotent_init() {
        let conn = Connection::open_in_memory().unwrap();

        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        let version: i32 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();

        assert_eq!(version, 1);
    }
}
