use std::collections::HashMap;

use anyhow::Result;
use rusqlite::{Connection, params};
use serde::Serialize;

use crate::store::{NODE_COLUMNS, NodeRow};

use super::impact::{CallImpact, function_impact};

/// A post-image line range from one diff hunk: lines
/// `start ..= start + len - 1` (a zero-length hunk marks a pure deletion
/// at `start`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HunkRange {
    pub start: usize,
    pub len: usize,
}

impl HunkRange {
    fn last(&self) -> usize {
        self.start + self.len.saturating_sub(1)
    }
}

/// Parse a unified diff into `(file, line ranges)` pairs.
///
/// File paths come from `+++ b/...` headers (`/dev/null` targets are
/// dropped); ranges from `@@ -a,b +c,d @@` hunk headers, `d` defaulting
/// to 1.
pub fn parse_unified_diff(text: &str) -> HashMap<String, Vec<HunkRange>> {
    let mut changes: HashMap<String, Vec<HunkRange>> = HashMap::new();
    let mut current: Option<String> = None;

    for line in text.lines() {
        if let Some(path) = line.strip_prefix("+++ ") {
            let path = path.trim();
            if path == "/dev/null" {
                current = None;
                continue;
            }
            let path = path.strip_prefix("b/").unwrap_or(path);
            current = Some(path.to_owned());
            continue;
        }
        if let Some(rest) = line.strip_prefix("@@ ")
            && let Some(file) = &current
            && let Some(range) = parse_hunk_header(rest)
        {
            changes.entry(file.clone()).or_default().push(range);
        }
    }

    changes
}

/// Extract the `+c,d` side of a hunk header body (`-a,b +c,d @@ ...`).
fn parse_hunk_header(rest: &str) -> Option<HunkRange> {
    let plus = rest.split_whitespace().find(|tok| tok.starts_with('+'))?;
    let spec = &plus[1..];
    let (start, len) = match spec.split_once(',') {
        Some((s, l)) => (s.parse().ok()?, l.parse().ok()?),
        None => (spec.parse().ok()?, 1),
    };
    Some(HunkRange { start, len })
}

/// A definition overlapped by the diff, with its transitive callers.
#[derive(Debug, Clone, Serialize)]
pub struct DiffImpact {
    pub definition: NodeRow,
    pub callers: Vec<CallImpact>,
}

/// Diff-scoped impact: find definitions whose `[line, end_line]` span
/// overlaps any changed range, then reverse-traverse `calls` up to
/// `depth`.
///
/// A definition with no recorded `end_line` spans up to the next
/// definition's start line minus one, or to the end of file when it is
/// the last one.
pub fn diff_impact(
    conn: &Connection,
    changes: &HashMap<String, Vec<HunkRange>>,
    depth: usize,
    include_tests: bool,
) -> Result<Vec<DiffImpact>> {
    let mut results = Vec::new();

    let mut files: Vec<&String> = changes.keys().collect();
    files.sort();

    for file in files {
        let ranges = &changes[file];
        for definition in affected_definitions(conn, file, ranges)? {
            let callers = function_impact(conn, &[definition.id], depth, include_tests)?;
            results.push(DiffImpact {
                definition,
                callers,
            });
        }
    }

    Ok(results)
}

/// Definitions in `file` whose effective span overlaps any of `ranges`.
fn affected_definitions(
    conn: &Connection,
    file: &str,
    ranges: &[HunkRange],
) -> Result<Vec<NodeRow>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {NODE_COLUMNS} FROM nodes
         WHERE file = ?1 AND kind != 'file'
         ORDER BY line, id"
    ))?;
    let definitions = stmt
        .query_map(params![file], NodeRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut affected = Vec::new();
    for (idx, def) in definitions.iter().enumerate() {
        let effective_end = match def.end_line {
            Some(end) => end,
            // Fall back to the next definition's start line - 1; the last
            // definition extends indefinitely.
            None => definitions
                .get(idx + 1)
                .map(|next| next.line.saturating_sub(1))
                .unwrap_or(usize::MAX),
        };
        let overlaps = ranges
            .iter()
            .any(|range| def.line <= range.last() && range.start <= effective_end);
        if overlaps {
            affected.push(def.clone());
        }
    }
    Ok(affected)
}
