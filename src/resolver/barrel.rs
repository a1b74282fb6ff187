use std::collections::{BTreeMap, HashMap, HashSet};

use crate::parser::FileRecord;

use super::ImportResolver;

/// One re-export statement of a barrel, with its resolved target.
#[derive(Debug, Clone)]
pub struct ReexportEntry {
    /// Names the statement exposes (empty for wildcards).
    pub names: Vec<String>,
    pub wildcard: bool,
    /// Workspace-relative target file.
    pub target: String,
}

/// Per-file re-export table plus the barrel classification.
///
/// A file is a barrel when its re-exports outnumber (or equal) its own
/// definitions; a module whose primary role is forwarding symbols.
pub struct BarrelMap {
    reexports: HashMap<String, Vec<ReexportEntry>>,
    barrels: HashSet<String>,
}

impl BarrelMap {
    /// Build the barrel map from all per-file records. Re-exports whose
    /// source does not resolve inside the workspace are dropped.
    pub fn build(records: &BTreeMap<String, FileRecord>, resolver: &ImportResolver) -> BarrelMap {
        let mut reexports: HashMap<String, Vec<ReexportEntry>> = HashMap::new();
        let mut barrels = HashSet::new();

        for (file, record) in records {
            let mut entries = Vec::new();
            let mut reexport_count = 0usize;
            for import in record.reexports() {
                reexport_count += 1;
                let Some(target) = resolver.resolve(&import.source, file).internal().map(String::from)
                else {
                    continue;
                };
                entries.push(ReexportEntry {
                    names: import.bindings.iter().map(|b| b.name.clone()).collect(),
                    wildcard: import.wildcard_reexport,
                    target,
                });
            }

            if reexport_count > 0 && reexport_count >= record.definitions.len() {
                barrels.insert(file.clone());
            }
            if !entries.is_empty() {
                reexports.insert(file.clone(), entries);
            }
        }

        BarrelMap { reexports, barrels }
    }

    pub fn is_barrel(&self, file: &str) -> bool {
        self.barrels.contains(file)
    }

    /// Follow re-export chains from `barrel` to the deepest file that
    /// defines `name`.
    ///
    /// Named re-exports that include `name` are followed to their declared
    /// target; if the target defines the name the chase stops there,
    /// otherwise barrel targets are recursed into. Wildcard re-exports are
    /// followed the same way without a name filter. Cycles are cut by the
    /// visited set; revisiting a file ends that chain with no result.
    pub fn resolve_name(
        &self,
        barrel: &str,
        name: &str,
        records: &BTreeMap<String, FileRecord>,
    ) -> Option<String> {
        let mut visited = HashSet::new();
        visited.insert(barrel.to_owned());
        self.chase(barrel, name, records, &mut visited)
    }

    fn chase(
        &self,
        file: &str,
        name: &str,
        records: &BTreeMap<String, FileRecord>,
        visited: &mut HashSet<String>,
    ) -> Option<String> {
        let entries = self.reexports.get(file)?;

        for entry in entries {
            if !entry.wildcard && !entry.names.iter().any(|n| n == name) {
                continue;
            }
            if visited.contains(&entry.target) {
                return None;
            }
            visited.insert(entry.target.clone());

            let target_defines = records
                .get(&entry.target)
                .is_some_and(|record| record.defines(name));

            if entry.wildcard {
                if target_defines {
                    return Some(entry.target.clone());
                }
                if let Some(found) = self.chase(&entry.target, name, records, visited) {
                    return Some(found);
                }
            } else {
                if target_defines {
                    return Some(entry.target.clone());
                }
                if self.is_barrel(&entry.target) {
                    return self.chase(&entry.target, name, records, visited);
                }
                // Declared target, even without a visible definition; the
                // deepest file the chain names.
                return Some(entry.target.clone());
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PathAliases;
    use crate::parser::{Definition, FileRecord, Import, ImportBinding};
    use crate::store::NodeKind;
    use std::path::PathBuf;

    fn definition(name: &str) -> Definition {
        Definition {
            name: name.to_owned(),
            kind: NodeKind::Function,
            line: 1,
            end_line: Some(1),
            exported: true,
            decorators: Vec::new(),
        }
    }

    fn reexport(source: &str, names: &[&str], wildcard: bool) -> Import {
        Import {
            source: source.to_owned(),
            bindings: names
                .iter()
                .map(|n| ImportBinding {
                    name: n.to_string(),
                    source_name: None,
                    is_default: false,
                    is_namespace: false,
                })
                .collect(),
            type_only: false,
            reexport: true,
            wildcard_reexport: wildcard,
            wildcard: false,
            line: 1,
        }
    }

    fn record(defs: &[&str], reexports: Vec<Import>) -> FileRecord {
        FileRecord {
            definitions: defs.iter().map(|d| definition(d)).collect(),
            imports: reexports,
            ..FileRecord::default()
        }
    }

    fn build_map(records: &BTreeMap<String, FileRecord>) -> BarrelMap {
        let aliases = PathAliases::default();
        let files = records.keys().cloned().collect();
        let root = PathBuf::from("/repo");
        // The resolver borrows; rebuild inline for the call.
        let resolver = ImportResolver::new(&root, &aliases, &files);
        BarrelMap::build(records, &resolver)
    }

    #[test]
    fn test_barrel_classification() {
        let mut records = BTreeMap::new();
        records.insert(
            "index.ts".to_owned(),
            record(&[], vec![reexport("./impl", &["foo"], false)]),
        );
        records.insert("impl.ts".to_owned(), record(&["foo"], vec![]));
        records.insert(
            "mixed.ts".to_owned(),
            record(&["a", "b"], vec![reexport("./impl", &["foo"], false)]),
        );

        let map = build_map(&records);
        assert!(map.is_barrel("index.ts"));
        assert!(!map.is_barrel("impl.ts"), "no re-exports at all");
        assert!(
            !map.is_barrel("mixed.ts"),
            "definitions outnumber re-exports"
        );
    }

    #[test]
    fn test_named_chain_resolves_to_defining_file() {
        let mut records = BTreeMap::new();
        records.insert(
            "index.ts".to_owned(),
            record(&[], vec![reexport("./inner", &["foo"], false)]),
        );
        records.insert(
            "inner.ts".to_owned(),
            record(&[], vec![reexport("./impl", &["foo"], false)]),
        );
        records.insert("impl.ts".to_owned(), record(&["foo"], vec![]));

        let map = build_map(&records);
        assert_eq!(
            map.resolve_name("index.ts", "foo", &records),
            Some("impl.ts".to_owned())
        );
    }

    #[test]
    fn test_wildcard_chain() {
        let mut records = BTreeMap::new();
        records.insert(
            "index.ts".to_owned(),
            record(&[], vec![reexport("./middle", &[], true)]),
        );
        records.insert(
            "middle.ts".to_owned(),
            record(&[], vec![reexport("./deep", &[], true)]),
        );
        records.insert("deep.ts".to_owned(), record(&["bar"], vec![]));

        let map = build_map(&records);
        assert_eq!(
            map.resolve_name("index.ts", "bar", &records),
            Some("deep.ts".to_owned())
        );
    }

    #[test]
    fn test_cycle_returns_no_result() {
        let mut records = BTreeMap::new();
        records.insert(
            "a.ts".to_owned(),
            record(&[], vec![reexport("./b", &["foo"], false)]),
        );
        records.insert(
            "b.ts".to_owned(),
            record(&[], vec![reexport("./a", &["foo"], false)]),
        );

        let map = build_map(&records);
        assert_eq!(map.resolve_name("a.ts", "foo", &records), None);
    }

    #[test]
    fn test_name_not_reexported() {
        let mut records = BTreeMap::new();
        records.insert(
            "index.ts".to_owned(),
            record(&[], vec![reexport("./impl", &["foo"], false)]),
        );
        records.insert("impl.ts".to_owned(), record(&["foo"], vec![]));

        let map = build_map(&records);
        assert_eq!(map.resolve_name("index.ts", "bar", &records), None);
    }

    #[test]
    fn test_named_beats_deeper_wildcard_when_target_defines() {
        let mut records = BTreeMap::new();
        records.insert(
            "index.ts".to_owned(),
            record(&[], vec![reexport("./impl", &["foo"], false)]),
        );
        // impl defines foo AND re-exports other things; chase must stop at impl.
        records.insert(
            "impl.ts".to_owned(),
            record(&["foo"], vec![reexport("./other", &["baz"], false)]),
        );
        records.insert("other.ts".to_owned(), record(&["baz"], vec![]));

        let map = build_map(&records);
        assert_eq!(
            map.resolve_name("index.ts", "foo", &records),
            Some("impl.ts".to_owned())
        );
    }
}
