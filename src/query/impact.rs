use std::collections::{HashMap, HashSet, VecDeque};

use anyhow::Result;
use rusqlite::{Connection, params};
use serde::Serialize;

use crate::store::NodeRow;

use super::is_test_file;

/// A file transitively depending on the queried file, with its BFS level.
#[derive(Debug, Clone, Serialize)]
pub struct FileImpact {
    pub file: String,
    pub level: usize,
}

/// File-level impact: breadth-first reverse traversal over `imports` and
/// `imports-type` edges starting from `file`'s file node. The starting
/// file itself is not reported.
pub fn file_impact(conn: &Connection, file: &str, include_tests: bool) -> Result<Vec<FileImpact>> {
    let Some(start) = crate::store::file_node_id(conn, file)? else {
        anyhow::bail!("no file node for '{file}'; is it part of the graph?");
    };

    let mut visited: HashSet<i64> = HashSet::new();
    let mut levels: HashMap<i64, (String, usize)> = HashMap::new();
    let mut queue: VecDeque<(i64, usize)> = VecDeque::new();
    visited.insert(start);
    queue.push_back((start, 0));

    while let Some((current, level)) = queue.pop_front() {
        let mut stmt = conn.prepare_cached(
            "SELECT n.id, n.file FROM edges e
             JOIN nodes n ON n.id = e.source_id
             WHERE e.target_id = ?1
               AND e.kind IN ('imports', 'imports-type')
               AND n.kind = 'file'
             ORDER BY n.file",
        )?;
        let importers = stmt
            .query_map(params![current], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for (id, path) in importers {
            if visited.insert(id) {
                levels.insert(id, (path, level + 1));
                queue.push_back((id, level + 1));
            }
        }
    }

    let mut results: Vec<FileImpact> = levels
        .into_values()
        .filter(|(path, _)| include_tests || !is_test_file(path))
        .map(|(file, level)| FileImpact { file, level })
        .collect();
    results.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.file.cmp(&b.file)));
    Ok(results)
}

/// A caller reached by reverse `calls` traversal, with its BFS depth and
/// the annotations of the edge that reached it.
#[derive(Debug, Clone, Serialize)]
pub struct CallImpact {
    pub node: NodeRow,
    pub depth: usize,
    pub confidence: f64,
    pub dynamic: bool,
}

/// Function-level impact: depth-bounded breadth-first reverse traversal
/// over `calls` edges from the seed nodes. Seeds are not reported.
pub fn function_impact(
    conn: &Connection,
    seeds: &[i64],
    max_depth: usize,
    include_tests: bool,
) -> Result<Vec<CallImpact>> {
    let mut visited: HashSet<i64> = seeds.iter().copied().collect();
    let mut queue: VecDeque<(i64, usize)> = seeds.iter().map(|&id| (id, 0)).collect();
    let mut results: Vec<CallImpact> = Vec::new();

    while let Some((current, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        let mut stmt = conn.prepare_cached(
            "SELECT n.id, n.kind, n.name, n.file, n.line, n.end_line, e.confidence, e.dynamic
             FROM edges e
             JOIN nodes n ON n.id = e.source_id
             WHERE e.target_id = ?1 AND e.kind = 'calls'
             ORDER BY e.confidence DESC, n.file, n.line",
        )?;
        let callers = stmt
            .query_map(params![current], |row| {
                Ok((
                    NodeRow::from_row(row)?,
                    row.get::<_, f64>(6)?,
                    row.get::<_, i64>(7)? != 0,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for (node, confidence, dynamic) in callers {
            if !visited.insert(node.id) {
                continue;
            }
            queue.push_back((node.id, depth + 1));
            if include_tests || !is_test_file(&node.file) {
                results.push(CallImpact {
                    node,
                    depth: depth + 1,
                    confidence,
                    dynamic,
                });
            }
        }
    }

    results.sort_by(|a, b| {
        a.depth
            .cmp(&b.depth)
            .then_with(|| {
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.node.file.cmp(&b.node.file))
    });
    Ok(results)
}
