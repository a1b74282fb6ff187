use std::sync::OnceLock;

use tree_sitter::{Language, Node, Query, QueryCursor, StreamingIterator, Tree};

use crate::store::NodeKind;

use super::{
    CallSite, Definition, FileRecord, Import, ImportBinding, end_line, node_text, start_line,
};

const DEF_QUERY: &str = r#"
    (function_definition name: (identifier) @name) @function
    (class_definition name: (identifier) @name) @class
"#;

/// Calls take the rightmost attribute name: `a.b.c()` records `c`.
const CALL_QUERY: &str = r#"
    (call function: (identifier) @name) @call
    (call function: (attribute attribute: (identifier) @name)) @call
"#;

const IMPORT_QUERY: &str = r#"
    (import_statement) @import
    (import_from_statement) @from_import
"#;

static PY_DEF_QUERY: OnceLock<Query> = OnceLock::new();
static PY_CALL_QUERY: OnceLock<Query> = OnceLock::new();
static PY_IMPORT_QUERY: OnceLock<Query> = OnceLock::new();

fn def_query(language: &Language) -> &'static Query {
    PY_DEF_QUERY
        .get_or_init(|| Query::new(language, DEF_QUERY).expect("invalid python def query"))
}

fn call_query(language: &Language) -> &'static Query {
    PY_CALL_QUERY
        .get_or_init(|| Query::new(language, CALL_QUERY).expect("invalid python call query"))
}

fn import_query(language: &Language) -> &'static Query {
    PY_IMPORT_QUERY
        .get_or_init(|| Query::new(language, IMPORT_QUERY).expect("invalid python import query"))
}

/// Extract definitions, imports, and calls from a parsed Python tree.
pub fn extract(tree: &Tree, source: &[u8], language: &Language) -> FileRecord {
    let mut record = FileRecord::default();
    extract_definitions(tree, source, language, &mut record);
    extract_imports(tree, source, language, &mut record);
    extract_calls(tree, source, language, &mut record);
    record
}

fn extract_definitions(tree: &Tree, source: &[u8], language: &Language, record: &mut FileRecord) {
    let query = def_query(language);
    let name_idx = query.capture_index_for_name("name").expect("@name");
    let function_idx = query.capture_index_for_name("function");
    let class_idx = query.capture_index_for_name("class");

    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(query, tree.root_node(), source);

    while let Some(m) = matches.next() {
        let mut name_node: Option<Node> = None;
        let mut def_node: Option<Node> = None;
        let mut is_class = false;

        for capture in m.captures {
            let idx = Some(capture.index);
            if capture.index == name_idx {
                name_node = Some(capture.node);
            } else if idx == function_idx {
                def_node = Some(capture.node);
            } else if idx == class_idx {
                def_node = Some(capture.node);
                is_class = true;
            }
        }

        let (Some(name_node), Some(def)) = (name_node, def_node) else {
            continue;
        };
        let base_name = node_text(name_node, source).to_owned();

        let (name, kind) = if is_class {
            (base_name, NodeKind::Class)
        } else if let Some(class_name) = enclosing_class_name(def, source) {
            // A function with a class ancestor is a method.
            (format!("{class_name}.{base_name}"), NodeKind::Method)
        } else {
            (base_name, NodeKind::Function)
        };

        record.definitions.push(Definition {
            name,
            kind,
            line: start_line(def),
            end_line: Some(end_line(def)),
            exported: is_module_level(def),
            decorators: decorators_of(def, source),
        });
    }
}

/// Name of the nearest enclosing class, if any.
fn enclosing_class_name(node: Node, source: &[u8]) -> Option<String> {
    let mut current = node.parent();
    while let Some(n) = current {
        if n.kind() == "class_definition" {
            return n
                .child_by_field_name("name")
                .map(|name| node_text(name, source).to_owned());
        }
        current = n.parent();
    }
    None
}

/// True when no function or class encloses the definition (decorator
/// wrappers and plain blocks do not count as nesting).
fn is_module_level(node: Node) -> bool {
    let mut current = node.parent();
    while let Some(n) = current {
        if matches!(n.kind(), "function_definition" | "class_definition") {
            return false;
        }
        current = n.parent();
    }
    true
}

/// Decorator names attached via an enclosing `decorated_definition`,
/// without the leading `@`.
fn decorators_of(def: Node, source: &[u8]) -> Vec<String> {
    let Some(parent) = def.parent() else {
        return Vec::new();
    };
    if parent.kind() != "decorated_definition" {
        return Vec::new();
    }
    let mut decorators = Vec::new();
    let mut cursor = parent.walk();
    for child in parent.children(&mut cursor) {
        if child.kind() == "decorator" {
            let text = node_text(child, source).trim_start_matches('@').trim();
            decorators.push(text.to_owned());
        }
    }
    decorators
}

fn extract_imports(tree: &Tree, source: &[u8], language: &Language, record: &mut FileRecord) {
    let query = import_query(language);
    let import_idx = query.capture_index_for_name("import").expect("@import");
    let from_idx = query
        .capture_index_for_name("from_import")
        .expect("@from_import");

    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(query, tree.root_node(), source);

    while let Some(m) = matches.next() {
        for capture in m.captures {
            if capture.index == import_idx {
                plain_imports(capture.node, source, record);
            } else if capture.index == from_idx {
                from_import(capture.node, source, record);
            }
        }
    }
}

/// `import a.b [as c], d`; one record per imported module.
fn plain_imports(node: Node, source: &[u8], record: &mut FileRecord) {
    let line = start_line(node);
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "dotted_name" => {
                let module = node_text(child, source).to_owned();
                record.imports.push(Import {
                    source: module.clone(),
                    bindings: vec![ImportBinding {
                        name: module,
                        source_name: None,
                        is_default: false,
                        is_namespace: false,
                    }],
                    type_only: false,
                    reexport: false,
                    wildcard_reexport: false,
                    wildcard: false,
                    line,
                });
            }
            "aliased_import" => {
                let module = child
                    .child_by_field_name("name")
                    .map(|n| node_text(n, source).to_owned());
                let alias = child
                    .child_by_field_name("alias")
                    .map(|n| node_text(n, source).to_owned());
                if let (Some(module), Some(alias)) = (module, alias) {
                    record.imports.push(Import {
                        source: module.clone(),
                        bindings: vec![ImportBinding {
                            name: alias,
                            source_name: Some(module),
                            is_default: false,
                            is_namespace: false,
                        }],
                        type_only: false,
                        reexport: false,
                        wildcard_reexport: false,
                        wildcard: false,
                        line,
                    });
                }
            }
            _ => {}
        }
    }
}

/// `from m import a, b as c` and `from . import x`, including wildcards.
fn from_import(node: Node, source: &[u8], record: &mut FileRecord) {
    let Some(module_node) = node.child_by_field_name("module_name") else {
        return;
    };
    let specifier = normalize_module(module_node, source);

    let mut bindings = Vec::new();
    let mut wildcard = false;

    let mut cursor = node.walk();
    let mut past_import_kw = false;
    for child in node.children(&mut cursor) {
        if child.kind() == "import" {
            past_import_kw = true;
            continue;
        }
        if !past_import_kw {
            continue;
        }
        match child.kind() {
            "wildcard_import" => wildcard = true,
            "dotted_name" => bindings.push(ImportBinding {
                name: node_text(child, source).to_owned(),
                source_name: None,
                is_default: false,
                is_namespace: false,
            }),
            "aliased_import" => {
                let original = child
                    .child_by_field_name("name")
                    .map(|n| node_text(n, source).to_owned());
                let alias = child
                    .child_by_field_name("alias")
                    .map(|n| node_text(n, source).to_owned());
                if let (Some(original), Some(alias)) = (original, alias) {
                    bindings.push(ImportBinding {
                        name: alias,
                        source_name: Some(original),
                        is_default: false,
                        is_namespace: false,
                    });
                }
            }
            _ => {}
        }
    }

    record.imports.push(Import {
        source: specifier,
        bindings,
        type_only: false,
        reexport: false,
        wildcard_reexport: false,
        wildcard,
        line: start_line(node),
    });
}

/// Normalize a `from` module reference into a resolver-friendly specifier.
///
/// Relative imports become `./`-style paths (`from .sibling` -> `./sibling`,
/// `from ..pkg.mod` -> `../pkg/mod`, `from .` -> `.`); absolute dotted
/// module paths keep their dotted spelling and resolve to nothing; external
/// packages produce no edges.
fn normalize_module(module_node: Node, source: &[u8]) -> String {
    if module_node.kind() != "relative_import" {
        return node_text(module_node, source).to_owned();
    }

    let mut dots = 0usize;
    let mut module: Option<String> = None;
    let mut cursor = module_node.walk();
    for child in module_node.children(&mut cursor) {
        match child.kind() {
            "import_prefix" => dots = node_text(child, source).len(),
            "dotted_name" => module = Some(node_text(child, source).replace('.', "/")),
            _ => {}
        }
    }

    let base = if dots <= 1 {
        ".".to_owned()
    } else {
        vec![".."; dots - 1].join("/")
    };
    match module {
        Some(m) if base == "." => format!("./{m}"),
        Some(m) => format!("{base}/{m}"),
        None => base,
    }
}

fn extract_calls(tree: &Tree, source: &[u8], language: &Language, record: &mut FileRecord) {
    let query = call_query(language);
    let name_idx = query.capture_index_for_name("name").expect("@name");
    let call_idx = query.capture_index_for_name("call").expect("@call");

    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(query, tree.root_node(), source);

    while let Some(m) = matches.next() {
        let mut name: Option<String> = None;
        let mut line: Option<usize> = None;
        for capture in m.captures {
            if capture.index == name_idx {
                name = Some(node_text(capture.node, source).to_owned());
            } else if capture.index == call_idx {
                line = Some(start_line(capture.node));
            }
        }
        if let (Some(name), Some(line)) = (name, line) {
            record.calls.push(CallSite {
                name,
                line,
                dynamic: false,
            });
        }
    }
}
