use anyhow::Result;
use rusqlite::{Connection, params};
use serde::Serialize;

use crate::store::{NODE_COLUMNS, NodeRow};

use super::is_test_file;

/// A caller of a symbol, annotated with the call edge's confidence and
/// dynamic flag. When the caller was discovered through the class
/// hierarchy, `via` names the ancestor chain walked (e.g.
/// `["Child", "Parent"]` for a caller of the inherited method).
#[derive(Debug, Clone, Serialize)]
pub struct CallerHit {
    pub node: NodeRow,
    pub confidence: f64,
    pub dynamic: bool,
    pub via: Vec<String>,
}

/// A callee of a symbol with the call edge's annotations.
#[derive(Debug, Clone, Serialize)]
pub struct CalleeHit {
    pub node: NodeRow,
    pub confidence: f64,
    pub dynamic: bool,
}

/// A symbol with its callers and callees; the payload of `find`.
#[derive(Debug, Clone, Serialize)]
pub struct SymbolReport {
    pub symbol: NodeRow,
    pub callers: Vec<CallerHit>,
    pub callees: Vec<CalleeHit>,
}

/// Non-file nodes whose name contains `needle`.
pub fn match_nodes(conn: &Connection, needle: &str) -> Result<Vec<NodeRow>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {NODE_COLUMNS} FROM nodes
         WHERE kind != 'file' AND name LIKE '%' || ?1 || '%'
         ORDER BY name, file, line"
    ))?;
    let matches = stmt
        .query_map(params![needle], NodeRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(matches)
}

/// Look up non-file nodes whose name contains `needle`, with callers and
/// callees for each.
pub fn find_symbols(
    conn: &Connection,
    needle: &str,
    include_tests: bool,
) -> Result<Vec<SymbolReport>> {
    let matches = match_nodes(conn, needle)?;

    let mut reports = Vec::new();
    for symbol in matches {
        if !include_tests && is_test_file(&symbol.file) {
            continue;
        }
        let callers = callers_of(conn, &symbol, include_tests)?;
        let callees = callees_of(conn, symbol.id, include_tests)?;
        reports.push(SymbolReport {
            symbol,
            callers,
            callees,
        });
    }
    Ok(reports)
}

/// Direct callers of `symbol`, ranked by confidence.
///
/// When the symbol is a method `C.m`, callers of `A.m` are included for
/// every ancestor `A` of `C` reachable via `extends`, annotated with the
/// hierarchy path used.
pub fn callers_of(
    conn: &Connection,
    symbol: &NodeRow,
    include_tests: bool,
) -> Result<Vec<CallerHit>> {
    let mut hits = direct_callers(conn, symbol.id, include_tests, Vec::new())?;

    if let Some((class_name, method_name)) = symbol.name.split_once('.') {
        for (ancestor, path) in class_ancestors(conn, class_name)? {
            let inherited = format!("{ancestor}.{method_name}");
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {NODE_COLUMNS} FROM nodes
                 WHERE name = ?1 AND kind = 'method'
                 ORDER BY file, line"
            ))?;
            let nodes = stmt
                .query_map(params![inherited], NodeRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            for node in nodes {
                hits.extend(direct_callers(conn, node.id, include_tests, path.clone())?);
            }
        }
    }

    hits.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.node.file.cmp(&b.node.file))
            .then_with(|| a.node.line.cmp(&b.node.line))
    });
    Ok(hits)
}

fn direct_callers(
    conn: &Connection,
    node_id: i64,
    include_tests: bool,
    via: Vec<String>,
) -> Result<Vec<CallerHit>> {
    let mut stmt = conn.prepare_cached(
        "SELECT n.id, n.kind, n.name, n.file, n.line, n.end_line, e.confidence, e.dynamic
         FROM edges e
         JOIN nodes n ON n.id = e.source_id
         WHERE e.target_id = ?1 AND e.kind = 'calls'
         ORDER BY e.confidence DESC, n.file, n.line",
    )?;
    let rows = stmt
        .query_map(params![node_id], |row| {
            Ok((
                NodeRow::from_row(row)?,
                row.get::<_, f64>(6)?,
                row.get::<_, i64>(7)? != 0,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows
        .into_iter()
        .filter(|(node, ..)| include_tests || !is_test_file(&node.file))
        .map(|(node, confidence, dynamic)| CallerHit {
            node,
            confidence,
            dynamic,
            via: via.clone(),
        })
        .collect())
}

/// Targets of the symbol's outgoing `calls` edges.
pub fn callees_of(conn: &Connection, node_id: i64, include_tests: bool) -> Result<Vec<CalleeHit>> {
    let mut stmt = conn.prepare_cached(
        "SELECT n.id, n.kind, n.name, n.file, n.line, n.end_line, e.confidence, e.dynamic
         FROM edges e
         JOIN nodes n ON n.id = e.target_id
         WHERE e.source_id = ?1 AND e.kind = 'calls'
         ORDER BY e.confidence DESC, n.file, n.line",
    )?;
    let rows = stmt
        .query_map(params![node_id], |row| {
            Ok((
                NodeRow::from_row(row)?,
                row.get::<_, f64>(6)?,
                row.get::<_, i64>(7)? != 0,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows
        .into_iter()
        .filter(|(node, ..)| include_tests || !is_test_file(&node.file))
        .map(|(node, confidence, dynamic)| CalleeHit {
            node,
            confidence,
            dynamic,
        })
        .collect())
}

/// Ancestors of `class_name` reachable through `extends` edges, each with
/// the hierarchy path from the starting class. Cycles in the hierarchy are
/// cut by the visited set.
fn class_ancestors(conn: &Connection, class_name: &str) -> Result<Vec<(String, Vec<String>)>> {
    let mut ancestors = Vec::new();
    let mut visited = std::collections::HashSet::new();
    visited.insert(class_name.to_owned());

    let mut frontier = vec![(class_name.to_owned(), vec![class_name.to_owned()])];
    while let Some((current, path)) = frontier.pop() {
        let mut stmt = conn.prepare_cached(
            "SELECT DISTINCT t.name
             FROM edges e
             JOIN nodes s ON s.id = e.source_id
             JOIN nodes t ON t.id = e.target_id
             WHERE e.kind = 'extends' AND s.name = ?1 AND s.kind = 'class'
             ORDER BY t.name",
        )?;
        let parents = stmt
            .query_map(params![current], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for parent in parents {
            if !visited.insert(parent.clone()) {
                continue;
            }
            let mut parent_path = path.clone();
            parent_path.push(parent.clone());
            ancestors.push((parent.clone(), parent_path.clone()));
            frontier.push((parent, parent_path));
        }
    }
    Ok(ancestors)
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

    fn built(root: &Path) -> GraphStore {
        let mut store = GraphStore::in_memory().unwrap();
        builder::build(&mut store, root).unwrap();
        store
    }

    #[test]
    fn test_find_by_substring_with_callers_and_callees() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "util.ts", "export function formatName() { pad(); }\nexport function pad() {}\n");
        write(
            dir.path(),
            "app.ts",
            "import { formatName } from './util';\nformatName();\n",
        );

        let store = built(dir.path());
        let reports = find_symbols(store.conn(), "format", false).unwrap();
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.symbol.name, "formatName");
        assert_eq!(report.callers.len(), 1);
        assert_eq!(report.callers[0].node.name, "app.ts");
        assert_eq!(report.callers[0].confidence, 1.0);
        assert_eq!(report.callees.len(), 1);
        assert_eq!(report.callees[0].node.name, "pad");
    }

    #[test]
    fn test_test_files_filtered_by_default() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "util.ts", "export function target() {}\n");
        write(
            dir.path(),
            "util.test.ts",
            "import { target } from './util';\ntarget();\n",
        );

        let store = built(dir.path());
        let reports = find_symbols(store.conn(), "target", false).unwrap();
        assert!(reports[0].callers.is_empty(), "test caller filtered");

        let reports = find_symbols(store.conn(), "target", true).unwrap();
        assert_eq!(reports[0].callers.len(), 1, "opt-in includes tests");
    }

    // §8 scenario 5: method-hierarchy-aware caller lookup.
    #[test]
    fn test_method_hierarchy_callers() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "model.ts",
            "export class Parent {\n  m() {}\n}\nexport class Child extends Parent {\n  m() {}\n}\n",
        );
        write(
            dir.path(),
            "caller_parent.ts",
            "import { Parent } from './model';\nconst p = new Parent();\np.m();\n",
        );
        write(
            dir.path(),
            "caller_child.ts",
            "import { Child } from './model';\nconst c = new Child();\nc.m();\n",
        );

        let store = built(dir.path());
        let reports = find_symbols(store.conn(), "Child.m", false).unwrap();
        let report = reports
            .iter()
            .find(|r| r.symbol.name == "Child.m")
            .expect("Child.m symbol");

        // Both the direct callers of Child.m and the callers of Parent.m
        // must appear; the inherited ones carry the hierarchy path.
        let direct: Vec<_> = report.callers.iter().filter(|c| c.via.is_empty()).collect();
        let inherited: Vec<_> = report.callers.iter().filter(|c| !c.via.is_empty()).collect();
        assert!(!direct.is_empty(), "direct callers of Child.m expected");
        assert!(
            !inherited.is_empty(),
            "callers of Parent.m expected via hierarchy: {:?}",
            report.callers
        );
        assert_eq!(inherited[0].via, vec!["Child", "Parent"]);
    }
}
