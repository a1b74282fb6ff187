use rusqlite::Connection;
use tracing::{debug, info};

/// Initialize (or upgrade) the graph schema.
///
/// The `nodes`/`edges` layout is the stable contract query consumers depend
/// on. Creation is idempotent; older databases missing the `end_line`,
/// `confidence`, or `dynamic` columns are upgraded in place with additive
/// `ALTER TABLE` migrations so no existing rows are lost.
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS nodes (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            file TEXT NOT NULL,
            line INTEGER NOT NULL,
            end_line INTEGER,
            UNIQUE(name, kind, file, line)
        );
        CREATE TABLE IF NOT EXISTS edges (
            id INTEGER PRIMARY KEY,
            source_id INTEGER NOT NULL REFERENCES nodes(id),
            target_id INTEGER NOT NULL REFERENCES nodes(id),
            kind TEXT NOT NULL,
            confidence REAL NOT NULL DEFAULT 1.0,
            dynamic INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_nodes_name ON nodes(name);
        CREATE INDEX IF NOT EXISTS idx_nodes_file ON nodes(file);
        CREATE INDEX IF NOT EXISTS idx_nodes_kind ON nodes(kind);
        CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_id);
        CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id);
        CREATE INDEX IF NOT EXISTS idx_edges_kind ON edges(kind);",
    )?;

    migrate_missing_columns(conn)?;

    Ok(())
}

/// Add columns introduced after the original schema shipped.
///
/// SQLite has no `ADD COLUMN IF NOT EXISTS`, so presence is checked through
/// `pragma table_info` first.
fn migrate_missing_columns(conn: &Connection) -> rusqlite::Result<()> {
    if !has_column(conn, "nodes", "end_line")? {
        info!("migrating schema: adding nodes.end_line");
        conn.execute("ALTER TABLE nodes ADD COLUMN end_line INTEGER", [])?;
    }
    if !has_column(conn, "edges", "confidence")? {
        info!("migrating schema: adding edges.confidence");
        conn.execute(
            "ALTER TABLE edges ADD COLUMN confidence REAL NOT NULL DEFAULT 1.0",
            [],
        )?;
    }
    if !has_column(conn, "edges", "dynamic")? {
        info!("migrating schema: adding edges.dynamic");
        conn.execute(
            "ALTER TABLE edges ADD COLUMN dynamic INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
    }
    debug!("schema ready");
    Ok(())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(&format!("SELECT name FROM pragma_table_info('{table}')"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(0)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_init_schema_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap();

        assert!(tables.contains(&"nodes".to_string()));
        assert!(tables.contains(&"edges".to_string()));
    }

    #[test]
    fn test_init_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
    }

    #[test]
    fn test_migrates_legacy_tables_without_data_loss() {
        let conn = Connection::open_in_memory().unwrap();
        // A pre-migration database: no end_line, confidence, or dynamic columns.
        conn.execute_batch(
            "CREATE TABLE nodes (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                file TEXT NOT NULL,
                line INTEGER NOT NULL,
                UNIQUE(name, kind, file, line)
            );
            CREATE TABLE edges (
                id INTEGER PRIMARY KEY,
                source_id INTEGER NOT NULL,
                target_id INTEGER NOT NULL,
                kind TEXT NOT NULL
            );
            INSERT INTO nodes (name, kind, file, line) VALUES ('a.ts', 'file', 'a.ts', 0);
            INSERT INTO nodes (name, kind, file, line) VALUES ('b.ts', 'file', 'b.ts', 0);
            INSERT INTO edges (source_id, target_id, kind) VALUES (1, 2, 'imports');",
        )
        .unwrap();

        init_schema(&conn).unwrap();

        let (end_line, confidence, dynamic): (Option<i64>, f64, i64) = conn
            .query_row(
                "SELECT n.end_line, e.confidence, e.dynamic
                 FROM edges e JOIN nodes n ON n.id = e.source_id",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(end_line, None);
        assert_eq!(confidence, 1.0);
        assert_eq!(dynamic, 0);

        let node_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))
            .unwrap();
        assert_eq!(node_count, 2, "migration must not drop rows");
    }
}
