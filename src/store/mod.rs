pub mod schema;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Directory holding the per-project store, relative to the repository root.
pub const DB_DIR: &str = ".codegraph";
/// Database file name inside [`DB_DIR`].
pub const DB_FILE: &str = "graph.db";

/// The kind of a node in the persisted graph.
///
/// Program-language kinds come first; the remaining variants encode HCL
/// block types. The string forms are part of the storage contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    File,
    Function,
    Method,
    Class,
    Interface,
    Type,
    ArrowFunction,
    Resource,
    Data,
    Variable,
    Module,
    Output,
    Locals,
    Terraform,
    Provider,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::File => "file",
            NodeKind::Function => "function",
            NodeKind::Method => "method",
            NodeKind::Class => "class",
            NodeKind::Interface => "interface",
            NodeKind::Type => "type",
            NodeKind::ArrowFunction => "arrow function",
            NodeKind::Resource => "resource",
            NodeKind::Data => "data",
            NodeKind::Variable => "variable",
            NodeKind::Module => "module",
            NodeKind::Output => "output",
            NodeKind::Locals => "locals",
            NodeKind::Terraform => "terraform",
            NodeKind::Provider => "provider",
        }
    }

    pub fn parse(s: &str) -> Option<NodeKind> {
        Some(match s {
            "file" => NodeKind::File,
            "function" => NodeKind::Function,
            "method" => NodeKind::Method,
            "class" => NodeKind::Class,
            "interface" => NodeKind::Interface,
            "type" => NodeKind::Type,
            "arrow function" => NodeKind::ArrowFunction,
            "resource" => NodeKind::Resource,
            "data" => NodeKind::Data,
            "variable" => NodeKind::Variable,
            "module" => NodeKind::Module,
            "output" => NodeKind::Output,
            "locals" => NodeKind::Locals,
            "terraform" => NodeKind::Terraform,
            "provider" => NodeKind::Provider,
            _ => return None,
        })
    }
}

/// The kind of a directed edge in the persisted graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    Imports,
    ImportsType,
    Reexports,
    Calls,
    Extends,
    Implements,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Imports => "imports",
            EdgeKind::ImportsType => "imports-type",
            EdgeKind::Reexports => "reexports",
            EdgeKind::Calls => "calls",
            EdgeKind::Extends => "extends",
            EdgeKind::Implements => "implements",
        }
    }

    pub fn parse(s: &str) -> Option<EdgeKind> {
        Some(match s {
            "imports" => EdgeKind::Imports,
            "imports-type" => EdgeKind::ImportsType,
            "reexports" => EdgeKind::Reexports,
            "calls" => EdgeKind::Calls,
            "extends" => EdgeKind::Extends,
            "implements" => EdgeKind::Implements,
            _ => return None,
        })
    }
}

/// A row from the `nodes` table.
#[derive(Debug, Clone, Serialize)]
pub struct NodeRow {
    pub id: i64,
    pub name: String,
    pub kind: NodeKind,
    pub file: String,
    pub line: usize,
    pub end_line: Option<usize>,
}

impl NodeRow {
    pub fn from_row(row: &Row) -> rusqlite::Result<NodeRow> {
        let kind_str: String = row.get(1)?;
        Ok(NodeRow {
            id: row.get(0)?,
            kind: NodeKind::parse(&kind_str).unwrap_or(NodeKind::File),
            name: row.get(2)?,
            file: row.get(3)?,
            line: row.get::<_, i64>(4)? as usize,
            end_line: row.get::<_, Option<i64>>(5)?.map(|v| v as usize),
        })
    }
}

/// Column list matching [`NodeRow::from_row`]'s ordinal expectations.
pub const NODE_COLUMNS: &str = "id, kind, name, file, line, end_line";

/// Handle to the on-disk graph store.
///
/// The writer opens the database in WAL mode so read-only query sessions can
/// run concurrently against an older snapshot. Prepared statements go
/// through `prepare_cached` and live no longer than one build or query call.
pub struct GraphStore {
    conn: Connection,
}

impl GraphStore {
    /// Open (creating if necessary) the store at `db_path` for writing.
    pub fn create(db_path: &Path) -> Result<GraphStore> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("cannot open graph store at {}", db_path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        schema::init_schema(&conn).context("schema initialization failed")?;
        info!("graph store ready at {}", db_path.display());
        Ok(GraphStore { conn })
    }

    /// Open an existing store read-only. A missing store is a fatal error,
    /// not an empty result set.
    pub fn open_read_only(db_path: &Path) -> Result<GraphStore> {
        if !db_path.exists() {
            bail!(
                "no graph store at {}; run `codegraph build` first",
                db_path.display()
            );
        }
        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("cannot open graph store at {}", db_path.display()))?;
        Ok(GraphStore { conn })
    }

    /// In-memory store, used by tests.
    pub fn in_memory() -> Result<GraphStore> {
        let conn = Connection::open_in_memory()?;
        schema::init_schema(&conn)?;
        Ok(GraphStore { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn transaction(&mut self) -> Result<rusqlite::Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }
}

/// Find the store for the workspace containing `start`: walk upward looking
/// for `.codegraph/graph.db`, defaulting to `start/.codegraph/graph.db`.
pub fn locate_db(start: &Path) -> PathBuf {
    let mut dir = Some(start);
    while let Some(d) = dir {
        let candidate = d.join(DB_DIR).join(DB_FILE);
        if candidate.exists() {
            return candidate;
        }
        dir = d.parent();
    }
    start.join(DB_DIR).join(DB_FILE)
}

/// Path of the store for a workspace root (no lookup).
pub fn db_path(root: &Path) -> PathBuf {
    root.join(DB_DIR).join(DB_FILE)
}

// ---------------------------------------------------------------------------
// Row-level helpers. All take `&Connection` so they work equally inside a
// `Transaction` (which derefs to one).
// ---------------------------------------------------------------------------

/// Insert a node, deduplicating on `(name, kind, file, line)`. Returns the
/// node's id whether it was inserted now or already present.
pub fn insert_node(
    conn: &Connection,
    name: &str,
    kind: NodeKind,
    file: &str,
    line: usize,
    end_line: Option<usize>,
) -> Result<i64> {
    let mut insert = conn.prepare_cached(
        "INSERT OR IGNORE INTO nodes (name, kind, file, line, end_line)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    insert.execute(params![
        name,
        kind.as_str(),
        file,
        line as i64,
        end_line.map(|v| v as i64),
    ])?;

    let mut select = conn.prepare_cached(
        "SELECT id FROM nodes WHERE name = ?1 AND kind = ?2 AND file = ?3 AND line = ?4",
    )?;
    let id = select.query_row(params![name, kind.as_str(), file, line as i64], |row| {
        row.get(0)
    })?;
    Ok(id)
}

/// Insert one edge. Self-edges are the caller's responsibility to avoid.
pub fn insert_edge(
    conn: &Connection,
    source_id: i64,
    target_id: i64,
    kind: EdgeKind,
    confidence: f64,
    dynamic: bool,
) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO edges (source_id, target_id, kind, confidence, dynamic)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    stmt.execute(params![
        source_id,
        target_id,
        kind.as_str(),
        confidence,
        dynamic as i64
    ])?;
    Ok(())
}

/// Remove every node and edge. Run inside the rebuild transaction.
pub fn clear_graph(conn: &Connection) -> Result<()> {
    conn.execute("DELETE FROM edges", [])?;
    conn.execute("DELETE FROM nodes", [])?;
    Ok(())
}

/// Delete all nodes belonging to `file` and every edge whose source or
/// target is one of them. Nodes and edges owned by other files survive.
pub fn delete_file_rows(conn: &Connection, file: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM edges WHERE source_id IN (SELECT id FROM nodes WHERE file = ?1)
            OR target_id IN (SELECT id FROM nodes WHERE file = ?1)",
        params![file],
    )?;
    conn.execute("DELETE FROM nodes WHERE file = ?1", params![file])?;
    Ok(())
}

/// Delete the outgoing edges of every node belonging to `file`.
pub fn delete_outgoing_edges(conn: &Connection, file: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM edges WHERE source_id IN (SELECT id FROM nodes WHERE file = ?1)",
        params![file],
    )?;
    Ok(())
}

/// Id of the node with the given unique key, if present.
pub fn node_id(
    conn: &Connection,
    name: &str,
    kind: NodeKind,
    file: &str,
    line: usize,
) -> Result<Option<i64>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id FROM nodes WHERE name = ?1 AND kind = ?2 AND file = ?3 AND line = ?4",
    )?;
    Ok(stmt
        .query_row(params![name, kind.as_str(), file, line as i64], |row| {
            row.get(0)
        })
        .optional()?)
}

/// Id of the file node for a workspace-relative path, if present.
pub fn file_node_id(conn: &Connection, file: &str) -> Result<Option<i64>> {
    let mut stmt =
        conn.prepare_cached("SELECT id FROM nodes WHERE kind = 'file' AND file = ?1")?;
    Ok(stmt
        .query_row(params![file], |row| row.get(0))
        .optional()?)
}

/// Files whose nodes have edges pointing INTO `file`'s nodes (excluding
/// `file` itself). Used by the incremental delta to know whose edge sets
/// must be recomputed after `file` changes.
pub fn files_referencing(conn: &Connection, file: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT DISTINCT src.file
         FROM edges e
         JOIN nodes src ON src.id = e.source_id
         JOIN nodes tgt ON tgt.id = e.target_id
         WHERE tgt.file = ?1 AND src.file <> ?1",
    )?;
    let files = stmt
        .query_map(params![file], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_node_dedup() {
        let store = GraphStore::in_memory().unwrap();
        let a = insert_node(store.conn(), "foo", NodeKind::Function, "a.ts", 3, Some(7)).unwrap();
        let b = insert_node(store.conn(), "foo", NodeKind::Function, "a.ts", 3, Some(7)).unwrap();
        assert_eq!(a, b, "duplicate insert must return the existing id");

        let count: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_delete_file_rows_preserves_others() {
        let store = GraphStore::in_memory().unwrap();
        let a = insert_node(store.conn(), "a.ts", NodeKind::File, "a.ts", 0, None).unwrap();
        let b = insert_node(store.conn(), "b.ts", NodeKind::File, "b.ts", 0, None).unwrap();
        let c = insert_node(store.conn(), "c.ts", NodeKind::File, "c.ts", 0, None).unwrap();
        insert_edge(store.conn(), a, b, EdgeKind::Imports, 1.0, false).unwrap();
        insert_edge(store.conn(), b, c, EdgeKind::Imports, 1.0, false).unwrap();

        delete_file_rows(store.conn(), "b.ts").unwrap();

        let nodes: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))
            .unwrap();
        let edges: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))
            .unwrap();
        assert_eq!(nodes, 2, "a.ts and c.ts must survive");
        assert_eq!(edges, 0, "both edges touched b.ts");
    }

    #[test]
    fn test_files_referencing() {
        let store = GraphStore::in_memory().unwrap();
        let a = insert_node(store.conn(), "a.ts", NodeKind::File, "a.ts", 0, None).unwrap();
        let b = insert_node(store.conn(), "b.ts", NodeKind::File, "b.ts", 0, None).unwrap();
        insert_edge(store.conn(), a, b, EdgeKind::Imports, 1.0, false).unwrap();

        let refs = files_referencing(store.conn(), "b.ts").unwrap();
        assert_eq!(refs, vec!["a.ts".to_string()]);
        assert!(files_referencing(store.conn(), "a.ts").unwrap().is_empty());
    }

    #[test]
    fn test_locate_db_walks_upward() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join(DB_DIR)).unwrap();
        std::fs::write(root.join(DB_DIR).join(DB_FILE), b"").unwrap();
        let nested = root.join("src").join("deep");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(locate_db(&nested), root.join(DB_DIR).join(DB_FILE));
    }

    #[test]
    fn test_read_only_open_missing_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join(DB_DIR).join(DB_FILE);
        assert!(GraphStore::open_read_only(&missing).is_err());
    }
}
