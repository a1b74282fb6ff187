use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;

use super::is_test_file;

/// One file node ranked by inbound edge count.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleRank {
    pub file: String,
    pub inbound: usize,
}

/// Rank file nodes by how many edges point at them; the workspace's most
/// depended-upon modules first. Test files are excluded unless opted in.
pub fn module_map(conn: &Connection, limit: usize, include_tests: bool) -> Result<Vec<ModuleRank>> {
    let mut stmt = conn.prepare_cached(
        "SELECT n.file, COUNT(e.id) AS inbound
         FROM nodes n
         LEFT JOIN edges e ON e.target_id = n.id
         WHERE n.kind = 'file'
         GROUP BY n.id
         ORDER BY inbound DESC, n.file",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(ModuleRank {
                file: row.get(0)?,
                inbound: row.get::<_, i64>(1)? as usize,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows
        .into_iter()
        .filter(|r| include_tests || !is_test_file(&r.file))
        .take(limit)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder;
    use crate::store::GraphStore;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_module_map_ranks_by_inbound() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "core.ts", "export const core = 1;\n");
        write(dir.path(), "a.ts", "import { core } from './core';\n");
        write(dir.path(), "b.ts", "import { core } from './core';\n");
        write(dir.path(), "core.test.ts", "import { core } from './core';\n");

        let mut store = GraphStore::in_memory().unwrap();
        builder::build(&mut store, dir.path()).unwrap();

        let ranks = module_map(store.conn(), 10, false).unwrap();
        assert_eq!(ranks[0].file, "core.ts");
        assert_eq!(ranks[0].inbound, 3);
        assert!(
            ranks.iter().all(|r| r.file != "core.test.ts"),
            "test files excluded by default"
        );

        let with_tests = module_map(store.conn(), 10, true).unwrap();
        assert!(with_tests.iter().any(|r| r.file == "core.test.ts"));

        let limited = module_map(store.conn(), 1, false).unwrap();
        assert_eq!(limited.len(), 1);
    }
}
