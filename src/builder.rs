use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use anyhow::Result;
use rayon::prelude::*;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{info, warn};

use crate::config::PathAliases;
use crate::language::{Capabilities, Lang};
use crate::parser::{self, CallSite, Definition, FileRecord, HeritageKind};
use crate::resolver::{ImportResolver, barrel::BarrelMap};
use crate::store::{self, EdgeKind, GraphStore, NodeKind};
use crate::walker;

/// Summary of one build.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BuildStats {
    pub files: usize,
    pub nodes: usize,
    pub edges: usize,
    /// Files excluded from this build (unreadable, parse error, grammar
    /// unavailable).
    pub skipped: usize,
}

/// State carried between a full build and incremental per-file updates:
/// the capability table, path-alias config, and every file's extraction
/// record.
pub struct BuildContext {
    pub caps: Capabilities,
    pub aliases: PathAliases,
    pub records: BTreeMap<String, FileRecord>,
}

/// Build the whole graph for the workspace at `root`, atomically replacing
/// any previous contents of the store.
///
/// Pass 1 materializes nodes, pass 2 constructs edges; each pass runs in a
/// single write transaction. Parsing is parallel, but records are inserted
/// in path order so node ids are deterministic.
pub fn build(store: &mut GraphStore, root: &Path) -> Result<(BuildStats, BuildContext)> {
    let caps = Capabilities::probe();
    let files = walker::walk_workspace(root)?;
    let aliases = PathAliases::load(root);

    let records = parse_workspace(root, &files, caps);
    let skipped = files.len() - records.len();

    let file_set: HashSet<String> = records.keys().cloned().collect();
    let resolver = ImportResolver::new(root, &aliases, &file_set);
    let barrels = BarrelMap::build(&records, &resolver);

    // Pass 1: node materialization.
    let tx = store.transaction()?;
    store::clear_graph(&tx)?;
    for (file, record) in &records {
        insert_file_nodes(&tx, file, record)?;
    }
    tx.commit()?;

    // Pass 2: edge construction.
    let tx = store.transaction()?;
    for (file, record) in &records {
        build_edges(&tx, file, record, &resolver, &barrels, &records)?;
    }
    tx.commit()?;

    let nodes: i64 = store
        .conn()
        .query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?;
    let edges: i64 = store
        .conn()
        .query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))?;

    let stats = BuildStats {
        files: records.len(),
        nodes: nodes as usize,
        edges: edges as usize,
        skipped,
    };
    info!(
        "indexed {} files: {} nodes, {} edges ({} skipped)",
        stats.files, stats.nodes, stats.edges, stats.skipped
    );

    Ok((
        stats,
        BuildContext {
            caps,
            aliases,
            records,
        },
    ))
}

/// Apply the incremental delta for one changed (or deleted) file.
///
/// Deletes the file's nodes and every edge touching them, re-runs
/// extraction and both passes for the file, and recomputes the outgoing
/// edge sets of the files that previously pointed into it; so the result
/// matches a full rebuild restricted to nodes/edges touching `rel`. One
/// transaction per delta.
pub fn update_file(
    store: &mut GraphStore,
    root: &Path,
    ctx: &mut BuildContext,
    rel: &str,
) -> Result<()> {
    let path = root.join(rel);
    if path.exists() {
        let reparsed = Lang::for_path(rel)
            .filter(|lang| ctx.caps.supports(*lang))
            .and_then(|lang| match std::fs::read(&path) {
                Ok(bytes) => match parser::parse_file(lang, &bytes) {
                    Ok(record) => Some(record),
                    Err(err) => {
                        warn!("skipping {rel}: {err}");
                        None
                    }
                },
                Err(err) => {
                    warn!("skipping {rel}: {err}");
                    None
                }
            });
        match reparsed {
            Some(record) => {
                ctx.records.insert(rel.to_owned(), record);
            }
            None => {
                ctx.records.remove(rel);
            }
        }
    } else {
        ctx.records.remove(rel);
    }

    let file_set: HashSet<String> = ctx.records.keys().cloned().collect();
    let resolver = ImportResolver::new(root, &ctx.aliases, &file_set);
    let barrels = BarrelMap::build(&ctx.records, &resolver);

    let tx = store.transaction()?;
    let importers = store::files_referencing(&tx, rel)?;
    store::delete_file_rows(&tx, rel)?;

    if let Some(record) = ctx.records.get(rel) {
        insert_file_nodes(&tx, rel, record)?;
        build_edges(&tx, rel, record, &resolver, &barrels, &ctx.records)?;
    }

    for importer in importers {
        let Some(record) = ctx.records.get(&importer) else {
            continue;
        };
        store::delete_outgoing_edges(&tx, &importer)?;
        build_edges(&tx, &importer, record, &resolver, &barrels, &ctx.records)?;
    }

    tx.commit()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse every enumerated file, in parallel. Per-file failures are warned
/// and skipped; a grammar missing entirely warns once per language.
fn parse_workspace(
    root: &Path,
    files: &[String],
    caps: Capabilities,
) -> BTreeMap<String, FileRecord> {
    let mut missing: HashSet<Lang> = HashSet::new();
    let mut parseable: Vec<(String, Lang)> = Vec::new();
    for rel in files {
        let Some(lang) = Lang::for_path(rel) else {
            continue;
        };
        if caps.supports(lang) {
            parseable.push((rel.clone(), lang));
        } else {
            missing.insert(lang);
        }
    }
    for lang in &missing {
        warn!("{lang} grammar unavailable; {lang} files skipped this run");
    }

    parseable
        .par_iter()
        .filter_map(|(rel, lang)| {
            let bytes = match std::fs::read(root.join(rel)) {
                Ok(b) => b,
                Err(err) => {
                    warn!("skipping {rel}: {err}");
                    return None;
                }
            };
            match parser::parse_file(*lang, &bytes) {
                Ok(record) => Some((rel.clone(), record)),
                Err(err) => {
                    warn!("skipping {rel}: {err}");
                    None
                }
            }
        })
        .collect::<Vec<_>>()
        .into_iter()
        .collect()
}

// ---------------------------------------------------------------------------
// Pass 1: nodes
// ---------------------------------------------------------------------------

fn insert_file_nodes(conn: &Connection, file: &str, record: &FileRecord) -> Result<()> {
    store::insert_node(conn, file, NodeKind::File, file, 0, None)?;
    for def in &record.definitions {
        store::insert_node(conn, &def.name, def.kind, file, def.line, def.end_line)?;
    }
    for export in &record.exports {
        if let Some(kind) = export.kind {
            store::insert_node(conn, &export.name, kind, file, export.line, export.end_line)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Pass 2: edges
// ---------------------------------------------------------------------------

fn build_edges(
    conn: &Connection,
    file: &str,
    record: &FileRecord,
    resolver: &ImportResolver,
    barrels: &BarrelMap,
    records: &BTreeMap<String, FileRecord>,
) -> Result<()> {
    let Some(file_id) = store::file_node_id(conn, file)? else {
        return Ok(());
    };

    // Local name -> (resolved target file, original exported name).
    // Wildcard imports contribute nothing; `* as X` maps X to the file.
    let mut imported: HashMap<&str, (String, &str)> = HashMap::new();

    for import in &record.imports {
        let Some(target) = resolver.resolve(&import.source, file).internal().map(String::from)
        else {
            continue;
        };
        let Some(target_id) = store::file_node_id(conn, &target)? else {
            continue;
        };

        let kind = if import.reexport {
            EdgeKind::Reexports
        } else if import.type_only {
            EdgeKind::ImportsType
        } else {
            EdgeKind::Imports
        };
        if target_id != file_id {
            store::insert_edge(conn, file_id, target_id, kind, 1.0, false)?;
        }

        if !import.reexport && !import.wildcard {
            for binding in &import.bindings {
                imported.insert(&binding.name, (target.clone(), binding.exported_name()));
            }
        }

        // Barrel indirection: follow re-export chains to the ultimate
        // defining file and link it directly at 0.9, keeping the 1.0 edge
        // to the barrel itself.
        if !import.reexport && barrels.is_barrel(&target) {
            let mut seen: HashSet<String> = HashSet::new();
            for binding in &import.bindings {
                if binding.is_namespace || binding.is_default {
                    continue;
                }
                let Some(deep) = barrels.resolve_name(&target, binding.exported_name(), records)
                else {
                    continue;
                };
                if deep == target || !seen.insert(deep.clone()) {
                    continue;
                }
                if let Some(deep_id) = store::file_node_id(conn, &deep)?
                    && deep_id != file_id
                {
                    store::insert_edge(conn, file_id, deep_id, EdgeKind::Imports, 0.9, false)?;
                }
            }
        }
    }

    for call in &record.calls {
        let caller_id = match attribute_caller(record, call.line) {
            Some(def) => store::node_id(conn, &def.name, def.kind, file, def.line)?
                .unwrap_or(file_id),
            None => file_id,
        };

        let (candidates, origin) =
            resolve_call_targets(conn, call, file, &imported, barrels, records)?;

        let mut scored: Vec<(i64, f64)> = candidates
            .iter()
            .map(|(id, target_file)| {
                (*id, confidence(file, target_file, origin.as_deref()))
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        for (target_id, conf) in scored {
            if target_id != caller_id {
                store::insert_edge(conn, caller_id, target_id, EdgeKind::Calls, conf, call.dynamic)?;
            }
        }
    }

    for heritage in &record.classes {
        let Some(source_id) = class_node_id(conn, &heritage.class_name, file)? else {
            continue;
        };
        let (kind, sql) = match heritage.kind {
            HeritageKind::Extends => (
                EdgeKind::Extends,
                "SELECT id FROM nodes WHERE name = ?1 AND kind = 'class' ORDER BY id",
            ),
            HeritageKind::Implements => (
                EdgeKind::Implements,
                "SELECT id FROM nodes WHERE name = ?1 AND kind IN ('interface', 'class') ORDER BY id",
            ),
        };
        let mut stmt = conn.prepare_cached(sql)?;
        let targets = stmt
            .query_map(params![heritage.parent], |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for target_id in targets {
            if target_id != source_id {
                store::insert_edge(conn, source_id, target_id, kind, 1.0, false)?;
            }
        }
    }

    Ok(())
}

/// The definition in `record` with the greatest start line <= `line`.
/// Ties attribute to the last definition seen in extraction order.
fn attribute_caller(record: &FileRecord, line: usize) -> Option<&Definition> {
    let mut best: Option<&Definition> = None;
    for def in &record.definitions {
        if def.line <= line && best.is_none_or(|b| def.line >= b.line) {
            best = Some(def);
        }
    }
    best
}

/// Resolve a call site's candidate targets, trying tiers in priority
/// order and stopping at the first that yields matches. Returns the
/// candidates as `(node_id, file)` plus the import-origin file when the
/// call name was resolved through an import (used for confidence 1.0).
fn resolve_call_targets(
    conn: &Connection,
    call: &CallSite,
    file: &str,
    imported: &HashMap<&str, (String, &str)>,
    barrels: &BarrelMap,
    records: &BTreeMap<String, FileRecord>,
) -> Result<(Vec<(i64, String)>, Option<String>)> {
    // Tier 1: the name was imported; search the imported target, chasing
    // barrel re-export chains when the barrel itself defines nothing.
    if let Some((target, exported_name)) = imported.get(call.name.as_str()) {
        let candidates = callable_nodes(conn, exported_name, Some(target))?;
        if !candidates.is_empty() {
            return Ok((candidates, Some(target.clone())));
        }
        if barrels.is_barrel(target)
            && let Some(deep) = barrels.resolve_name(target, exported_name, records)
        {
            let candidates = callable_nodes(conn, exported_name, Some(&deep))?;
            if !candidates.is_empty() {
                return Ok((candidates, Some(deep)));
            }
        }
    }

    // Tier 2: same file as the caller.
    let candidates = callable_nodes(conn, &call.name, Some(file))?;
    if !candidates.is_empty() {
        return Ok((candidates, None));
    }

    // Tier 3: method-style suffix match anywhere.
    let candidates = method_suffix_nodes(conn, &call.name)?;
    if !candidates.is_empty() {
        return Ok((candidates, None));
    }

    // Tier 4: global exact-name lookup.
    Ok((callable_nodes(conn, &call.name, None)?, None))
}

/// Nodes with the exact name among callable kinds, optionally restricted
/// to one file.
fn callable_nodes(
    conn: &Connection,
    name: &str,
    file: Option<&str>,
) -> Result<Vec<(i64, String)>> {
    let rows = match file {
        Some(file) => {
            let mut stmt = conn.prepare_cached(
                "SELECT id, file FROM nodes
                 WHERE name = ?1 AND file = ?2
                   AND kind IN ('function', 'method', 'class', 'interface')
                 ORDER BY id",
            )?;
            stmt.query_map(params![name, file], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?
        }
        None => {
            let mut stmt = conn.prepare_cached(
                "SELECT id, file FROM nodes
                 WHERE name = ?1
                   AND kind IN ('function', 'method', 'class', 'interface')
                 ORDER BY id",
            )?;
            stmt.query_map(params![name], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?
        }
    };
    Ok(rows)
}

/// Method nodes whose name ends in `.{name}`.
fn method_suffix_nodes(conn: &Connection, name: &str) -> Result<Vec<(i64, String)>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, file FROM nodes
         WHERE kind = 'method' AND name LIKE '%.' || ?1
         ORDER BY id",
    )?;
    let rows = stmt
        .query_map(params![name], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn class_node_id(conn: &Connection, name: &str, file: &str) -> Result<Option<i64>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id FROM nodes WHERE name = ?1 AND kind = 'class' AND file = ?2 LIMIT 1",
    )?;
    Ok(stmt
        .query_row(params![name, file], |row| row.get(0))
        .optional()?)
}

/// Score one call-edge candidate by file proximity.
fn confidence(caller_file: &str, target_file: &str, origin: Option<&str>) -> f64 {
    if caller_file == target_file || origin == Some(target_file) {
        1.0
    } else if dir_of(caller_file) == dir_of(target_file) {
        0.7
    } else if grandparent_of(caller_file) == grandparent_of(target_file) {
        0.5
    } else {
        0.3
    }
}

fn dir_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

fn grandparent_of(path: &str) -> &str {
    dir_of(dir_of(path))
}

// ---------------------------------------------------------------------------
// Tests: fixture workspaces in temp directories, in-memory stores.
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn built(root: &Path) -> GraphStore {
        let mut store = GraphStore::in_memory().unwrap();
        build(&mut store, root).unwrap();
        store
    }

    /// All edges as (source_name, target_name, kind, confidence, dynamic).
    fn edge_list(store: &GraphStore) -> Vec<(String, String, String, f64, bool)> {
        let conn = store.conn();
        let mut stmt = conn
            .prepare(
                "SELECT s.name, t.name, e.kind, e.confidence, e.dynamic
                 FROM edges e
                 JOIN nodes s ON s.id = e.source_id
                 JOIN nodes t ON t.id = e.target_id
                 ORDER BY e.id",
            )
            .unwrap();
        stmt.query_map([], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get::<_, i64>(4)? != 0,
            ))
        })
        .unwrap()
        .collect::<rusqlite::Result<Vec<_>>>()
        .unwrap()
    }

    fn node_list(store: &GraphStore) -> Vec<(String, String, String, usize)> {
        let conn = store.conn();
        let mut stmt = conn
            .prepare("SELECT name, kind, file, line FROM nodes ORDER BY id")
            .unwrap();
        stmt.query_map([], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get::<_, i64>(3)? as usize,
            ))
        })
        .unwrap()
        .collect::<rusqlite::Result<Vec<_>>>()
        .unwrap()
    }

    // §8 scenario 1: simple named import.
    #[test]
    fn test_simple_named_import() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.ts", "import { foo } from './b.js';\nfoo();\n");
        write(dir.path(), "b.ts", "export function foo() {}\n");

        let store = built(dir.path());
        let nodes = node_list(&store);
        assert!(nodes.contains(&("a.ts".into(), "file".into(), "a.ts".into(), 0)));
        assert!(nodes.contains(&("b.ts".into(), "file".into(), "b.ts".into(), 0)));
        assert!(nodes.contains(&("foo".into(), "function".into(), "b.ts".into(), 1)));

        let edges = edge_list(&store);
        assert!(edges.contains(&("a.ts".into(), "b.ts".into(), "imports".into(), 1.0, false)));
        assert!(
            edges.contains(&("a.ts".into(), "foo".into(), "calls".into(), 1.0, false)),
            "file-node caller, confidence 1.0 via import origin: {edges:?}"
        );
    }

    // §8 scenario 2: barrel indirection.
    #[test]
    fn test_barrel_indirection() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "index.ts", "export { foo } from './impl';\n");
        write(dir.path(), "impl.ts", "export function foo() {}\n");
        write(
            dir.path(),
            "user.ts",
            "import { foo } from './index';\nfoo();\n",
        );

        let store = built(dir.path());
        let edges = edge_list(&store);
        assert!(edges.contains(&(
            "user.ts".into(),
            "index.ts".into(),
            "imports".into(),
            1.0,
            false
        )));
        assert!(edges.contains(&(
            "user.ts".into(),
            "impl.ts".into(),
            "imports".into(),
            0.9,
            false
        )));
        assert!(edges.contains(&(
            "index.ts".into(),
            "impl.ts".into(),
            "reexports".into(),
            1.0,
            false
        )));
        assert!(
            edges.contains(&("user.ts".into(), "foo".into(), "calls".into(), 1.0, false)),
            "call through barrel resolves to impl.ts definition at 1.0: {edges:?}"
        );
    }

    // §8 scenario 3/4: dynamic dispatch flags survive to the edge.
    #[test]
    fn test_dynamic_call_edges() {
        let dir = TempDir::new().unwrap();
        // Calls precede the definitions so both attribute to the file node
        // rather than to the functions they target.
        write(
            dir.path(),
            "a.ts",
            "h.call(null, 1);\nconst obj = {};\nobj[\"run\"](2);\nexport function h() {}\nexport function run() {}\n",
        );

        let store = built(dir.path());
        let edges = edge_list(&store);
        let dynamic_targets: Vec<&str> = edges
            .iter()
            .filter(|(_, _, kind, _, dynamic)| kind == "calls" && *dynamic)
            .map(|(_, target, ..)| target.as_str())
            .collect();
        assert!(dynamic_targets.contains(&"h"), "{edges:?}");
        assert!(dynamic_targets.contains(&"run"), "{edges:?}");
    }

    #[test]
    fn test_type_only_import_edge_kind() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.ts", "import type { C } from './b';\n");
        write(dir.path(), "b.ts", "export interface C {}\n");

        let store = built(dir.path());
        let edges = edge_list(&store);
        assert!(edges.contains(&(
            "a.ts".into(),
            "b.ts".into(),
            "imports-type".into(),
            1.0,
            false
        )));
    }

    #[test]
    fn test_caller_attribution_to_method() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "svc.ts",
            "export function helper() {}\nclass Service {\n  run() {\n    helper();\n  }\n}\n",
        );

        let store = built(dir.path());
        let edges = edge_list(&store);
        assert!(
            edges.contains(&(
                "Service.run".into(),
                "helper".into(),
                "calls".into(),
                1.0,
                false
            )),
            "call inside the method body attributes to the method node: {edges:?}"
        );
    }

    #[test]
    fn test_attribution_tie_last_definition_wins() {
        let dir = TempDir::new().unwrap();
        // Two definitions share line 1; the call on line 1 attributes to
        // the one extracted last.
        write(
            dir.path(),
            "a.ts",
            "function outer() { const inner = () => fmt(); }\nfunction fmt() {}\n",
        );

        let store = built(dir.path());
        let edges = edge_list(&store);
        let call_edge = edges
            .iter()
            .find(|(_, target, kind, ..)| kind == "calls" && target == "fmt")
            .expect("fmt call edge");
        assert_eq!(call_edge.0, "inner", "last definition on the tied line wins");
    }

    #[test]
    fn test_heritage_edges() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "animals.ts",
            "interface IPet { play(): void; }\nclass Animal {}\nclass Dog extends Animal implements IPet {\n  play() {}\n}\n",
        );

        let store = built(dir.path());
        let edges = edge_list(&store);
        assert!(edges.contains(&(
            "Dog".into(),
            "Animal".into(),
            "extends".into(),
            1.0,
            false
        )));
        assert!(edges.contains(&(
            "Dog".into(),
            "IPet".into(),
            "implements".into(),
            1.0,
            false
        )));
    }

    #[test]
    fn test_confidence_tiers_by_proximity() {
        let dir = TempDir::new().unwrap();
        // shared() is neither imported nor local; candidates rank by
        // directory proximity to the caller.
        write(dir.path(), "app/feature/caller.ts", "shared();\n");
        write(
            dir.path(),
            "app/feature/near.ts",
            "export function shared() {}\n",
        );
        write(
            dir.path(),
            "app/other/far.ts",
            "export function shared() {}\n",
        );
        write(dir.path(), "lib/away.ts", "export function shared() {}\n");

        let store = built(dir.path());
        let edges = edge_list(&store);
        let confs: Vec<f64> = edges
            .iter()
            .filter(|(source, _, kind, ..)| kind == "calls" && source == "app/feature/caller.ts")
            .map(|(.., conf, _)| *conf)
            .collect();
        assert_eq!(confs.len(), 3);
        // Sorted descending at insertion time.
        assert_eq!(confs, vec![0.7, 0.5, 0.3]);
    }

    #[cfg(feature = "python")]
    #[test]
    fn test_python_workspace() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "pkg/__init__.py",
            "",
        );
        write(
            dir.path(),
            "pkg/svc.py",
            "class Service:\n    def handle(self):\n        helper()\n",
        );
        write(
            dir.path(),
            "pkg/util.py",
            "def helper():\n    pass\n",
        );
        write(
            dir.path(),
            "pkg/main.py",
            "from .util import helper\nhelper()\n",
        );

        let store = built(dir.path());
        let edges = edge_list(&store);
        assert!(edges.contains(&(
            "pkg/main.py".into(),
            "pkg/util.py".into(),
            "imports".into(),
            1.0,
            false
        )));
        assert!(
            edges.contains(&(
                "pkg/main.py".into(),
                "helper".into(),
                "calls".into(),
                1.0,
                false
            )),
            "{edges:?}"
        );
        assert!(
            edges.contains(&(
                "Service.handle".into(),
                "helper".into(),
                "calls".into(),
                0.7,
                false
            )),
            "same-directory candidate scores 0.7: {edges:?}"
        );
    }

    // §8 property 1-4.
    #[test]
    fn test_graph_invariants() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "index.ts", "export { a } from './a';\nexport * from './b';\n");
        write(dir.path(), "a.ts", "export function a() { b(); }\n");
        write(dir.path(), "b.ts", "export function b() {}\nclass K { m() { a(); } }\n");
        write(
            dir.path(),
            "c.ts",
            "import { a } from './index';\na();\nconst f = () => {};\nf.call(null);\n",
        );

        let store = built(dir.path());
        let conn = store.conn();

        let dangling: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM edges e
                 WHERE NOT EXISTS (SELECT 1 FROM nodes n WHERE n.id = e.source_id)
                    OR NOT EXISTS (SELECT 1 FROM nodes n WHERE n.id = e.target_id)",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(dangling, 0, "every edge endpoint must exist");

        let orphans: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM nodes n
                 WHERE n.kind != 'file'
                   AND NOT EXISTS (
                     SELECT 1 FROM nodes f WHERE f.kind = 'file' AND f.file = n.file)",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(orphans, 0, "every non-file node needs its file node");

        let self_edges: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM edges WHERE source_id = target_id",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(self_edges, 0);

        let bad_conf: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM edges
                 WHERE kind = 'calls'
                   AND confidence NOT IN (0.3, 0.5, 0.7, 0.9, 1.0)",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(bad_conf, 0);
    }

    // §8 property 5: round-trip determinism.
    #[test]
    fn test_rebuild_is_deterministic() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "index.ts", "export { x } from './x';\n");
        write(dir.path(), "x.ts", "export function x() {}\n");
        write(dir.path(), "y.ts", "import { x } from './index';\nx();\n");

        let mut store = GraphStore::in_memory().unwrap();
        build(&mut store, dir.path()).unwrap();
        let first_nodes = node_list(&store);
        let first_edges = edge_list(&store);

        build(&mut store, dir.path()).unwrap();
        assert_eq!(node_list(&store), first_nodes);
        assert_eq!(edge_list(&store), first_edges);
    }

    // §8 property 6: incremental equivalence.
    #[test]
    fn test_incremental_update_matches_full_rebuild() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.ts", "import { b } from './b';\nb();\n");
        write(dir.path(), "b.ts", "export function b() {}\n");
        write(dir.path(), "c.ts", "import { b } from './b';\n");

        let mut store = GraphStore::in_memory().unwrap();
        let (_, mut ctx) = build(&mut store, dir.path()).unwrap();

        // Change b.ts: rename the function and add another.
        write(
            dir.path(),
            "b.ts",
            "export function b() {}\nexport function extra() {}\n",
        );
        update_file(&mut store, dir.path(), &mut ctx, "b.ts").unwrap();

        let incremental_nodes = {
            let mut n = node_list(&store);
            n.sort();
            n
        };
        let incremental_edges = {
            let mut e: Vec<_> = edge_list(&store)
                .into_iter()
                .map(|(s, t, k, c, d)| (s, t, k, (c * 10.0) as i64, d))
                .collect();
            e.sort();
            e
        };

        let mut fresh = GraphStore::in_memory().unwrap();
        build(&mut fresh, dir.path()).unwrap();
        let full_nodes = {
            let mut n = node_list(&fresh);
            n.sort();
            n
        };
        let full_edges = {
            let mut e: Vec<_> = edge_list(&fresh)
                .into_iter()
                .map(|(s, t, k, c, d)| (s, t, k, (c * 10.0) as i64, d))
                .collect();
            e.sort();
            e
        };

        assert_eq!(incremental_nodes, full_nodes);
        assert_eq!(incremental_edges, full_edges);
    }

    #[test]
    fn test_deleted_file_removes_only_its_rows() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.ts", "import { b } from './b';\nb();\n");
        write(dir.path(), "b.ts", "export function b() {}\n");

        let mut store = GraphStore::in_memory().unwrap();
        let (_, mut ctx) = build(&mut store, dir.path()).unwrap();

        fs::remove_file(dir.path().join("b.ts")).unwrap();
        update_file(&mut store, dir.path(), &mut ctx, "b.ts").unwrap();

        let nodes = node_list(&store);
        assert!(nodes.iter().any(|(name, ..)| name == "a.ts"));
        assert!(nodes.iter().all(|(_, _, file, _)| file != "b.ts"));
        assert!(edge_list(&store).is_empty());
    }

    #[test]
    fn test_unresolved_imports_create_no_edges() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "a.ts",
            "import { x } from 'react';\nimport { y } from './missing';\nunknownCall();\n",
        );

        let store = built(dir.path());
        assert!(edge_list(&store).is_empty());
    }
}
