use std::sync::OnceLock;

use tree_sitter::{Language, Node, Query, QueryCursor, StreamingIterator, Tree};

use crate::language::Lang;
use crate::store::NodeKind;

use super::{
    CallSite, Definition, Export, FileRecord, Heritage, HeritageKind, Import, ImportBinding,
    child_of_kind, end_line, node_text, start_line,
};

// ---------------------------------------------------------------------------
// Query strings
// ---------------------------------------------------------------------------

/// Declarations for the TypeScript and TSX grammars. The variable_declarator
/// pattern fires at any depth; the extractor keeps only declarators under a
/// `lexical_declaration` whose value is an arrow or function expression.
const DEF_QUERY_TS: &str = r#"
    (function_declaration name: (identifier) @name) @function

    (class_declaration name: (type_identifier) @name) @class

    (interface_declaration name: (type_identifier) @name) @interface

    (type_alias_declaration name: (type_identifier) @name) @type_alias

    (variable_declarator
      name: (identifier) @name
      value: (_) @value) @declarator
"#;

/// Declarations for the JavaScript grammar; no interfaces or type aliases,
/// and class names are plain identifiers.
const DEF_QUERY_JS: &str = r#"
    (function_declaration name: (identifier) @name) @function

    (class_declaration name: (identifier) @name) @class

    (variable_declarator
      name: (identifier) @name
      value: (_) @value) @declarator
"#;

/// ESM import statements. Clause bindings are walked in code.
const IMPORT_QUERY: &str = r#"
    (import_statement
      source: (string (string_fragment) @source)) @import
"#;

/// All export statements; classification happens in code.
const EXPORT_QUERY: &str = r#"
    (export_statement) @export
"#;

/// Every call expression; the callee shape is classified in code over the
/// callee node's kind.
const CALL_QUERY: &str = r#"
    (call_expression function: (_) @callee) @call
"#;

// ---------------------------------------------------------------------------
// Query cache: one set per grammar. A query compiled for one grammar
// cannot run against another grammar's tree.
// ---------------------------------------------------------------------------

struct GrammarQueries {
    defs: OnceLock<Query>,
    imports: OnceLock<Query>,
    exports: OnceLock<Query>,
    calls: OnceLock<Query>,
}

impl GrammarQueries {
    const fn new() -> GrammarQueries {
        GrammarQueries {
            defs: OnceLock::new(),
            imports: OnceLock::new(),
            exports: OnceLock::new(),
            calls: OnceLock::new(),
        }
    }
}

static TS_QUERIES: GrammarQueries = GrammarQueries::new();
static TSX_QUERIES: GrammarQueries = GrammarQueries::new();
static JS_QUERIES: GrammarQueries = GrammarQueries::new();

fn queries_for(lang: Lang) -> &'static GrammarQueries {
    match lang {
        Lang::Tsx => &TSX_QUERIES,
        Lang::JavaScript => &JS_QUERIES,
        _ => &TS_QUERIES,
    }
}

fn def_query(language: &Language, lang: Lang) -> &'static Query {
    let text = if lang == Lang::JavaScript {
        DEF_QUERY_JS
    } else {
        DEF_QUERY_TS
    };
    queries_for(lang)
        .defs
        .get_or_init(|| Query::new(language, text).expect("invalid definition query"))
}

fn import_query(language: &Language, lang: Lang) -> &'static Query {
    queries_for(lang)
        .imports
        .get_or_init(|| Query::new(language, IMPORT_QUERY).expect("invalid import query"))
}

fn export_query(language: &Language, lang: Lang) -> &'static Query {
    queries_for(lang)
        .exports
        .get_or_init(|| Query::new(language, EXPORT_QUERY).expect("invalid export query"))
}

fn call_query(language: &Language, lang: Lang) -> &'static Query {
    queries_for(lang)
        .calls
        .get_or_init(|| Query::new(language, CALL_QUERY).expect("invalid call query"))
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Extract definitions, exports, imports, calls, and class heritage from a
/// parsed JS/TS-family syntax tree.
pub fn extract(tree: &Tree, source: &[u8], language: &Language, lang: Lang) -> FileRecord {
    let mut record = FileRecord::default();
    extract_definitions(tree, source, language, lang, &mut record);
    extract_imports(tree, source, language, lang, &mut record);
    extract_exports(tree, source, language, lang, &mut record);
    extract_calls(tree, source, language, lang, &mut record);
    record
}

// ---------------------------------------------------------------------------
// Definitions & heritage
// ---------------------------------------------------------------------------

fn extract_definitions(
    tree: &Tree,
    source: &[u8],
    language: &Language,
    lang: Lang,
    record: &mut FileRecord,
) {
    let query = def_query(language, lang);
    let name_idx = query.capture_index_for_name("name").expect("@name");
    let function_idx = query.capture_index_for_name("function");
    let class_idx = query.capture_index_for_name("class");
    let interface_idx = query.capture_index_for_name("interface");
    let type_alias_idx = query.capture_index_for_name("type_alias");
    let declarator_idx = query.capture_index_for_name("declarator");
    let value_idx = query.capture_index_for_name("value");

    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(query, tree.root_node(), source);

    while let Some(m) = matches.next() {
        let mut name_node: Option<Node> = None;
        let mut value_node: Option<Node> = None;
        let mut decl_node: Option<Node> = None;
        let mut kind: Option<NodeKind> = None;

        for capture in m.captures {
            let idx = Some(capture.index);
            if capture.index == name_idx {
                name_node = Some(capture.node);
            } else if idx == value_idx {
                value_node = Some(capture.node);
            } else if idx == function_idx {
                decl_node = Some(capture.node);
                kind = Some(NodeKind::Function);
            } else if idx == class_idx {
                decl_node = Some(capture.node);
                kind = Some(NodeKind::Class);
            } else if idx == interface_idx {
                decl_node = Some(capture.node);
                kind = Some(NodeKind::Interface);
            } else if idx == type_alias_idx {
                decl_node = Some(capture.node);
                kind = Some(NodeKind::Type);
            } else if idx == declarator_idx {
                decl_node = Some(capture.node);
            }
        }

        let (Some(name_node), Some(decl)) = (name_node, decl_node) else {
            continue;
        };

        let kind = match kind {
            Some(k) => k,
            None => {
                // Declarator match: only lexical bindings of arrow/function
                // expressions become definitions.
                if decl.parent().map(|p| p.kind()) != Some("lexical_declaration") {
                    continue;
                }
                if !value_node.is_some_and(is_function_value) {
                    continue;
                }
                NodeKind::ArrowFunction
            }
        };

        // For arrow bindings the span of interest is the whole statement.
        let span_node = if kind == NodeKind::ArrowFunction {
            decl.parent().unwrap_or(decl)
        } else {
            decl
        };

        let name = node_text(name_node, source).to_owned();
        let exported = is_exported(span_node);

        record.definitions.push(Definition {
            name: name.clone(),
            kind,
            line: start_line(span_node),
            end_line: Some(end_line(span_node)),
            exported,
            decorators: Vec::new(),
        });

        match kind {
            NodeKind::Class => {
                extract_class_members(decl, &name, exported, source, record);
                extract_heritage(decl, &name, source, record);
            }
            NodeKind::Interface => {
                extract_interface_members(decl, &name, source, record);
            }
            _ => {}
        }
    }
}

/// True if `node` is an arrow function or function expression value.
fn is_function_value(node: Node) -> bool {
    matches!(
        node.kind(),
        "arrow_function" | "function_expression" | "function"
    )
}

/// Check whether `node` is nested inside an `export_statement`.
fn is_exported(node: Node) -> bool {
    let mut current = Some(node);
    while let Some(n) = current {
        if n.kind() == "export_statement" {
            return true;
        }
        current = n.parent();
    }
    false
}

/// Collect `method_definition` children of a class body as `Class.method`
/// definitions with their own spans.
fn extract_class_members(
    class_node: Node,
    class_name: &str,
    exported: bool,
    source: &[u8],
    record: &mut FileRecord,
) {
    let Some(body) = child_of_kind(class_node, "class_body") else {
        return;
    };
    let mut cursor = body.walk();
    for child in body.children(&mut cursor) {
        if child.kind() == "method_definition"
            && let Some(name_node) = child.child_by_field_name("name")
        {
            record.definitions.push(Definition {
                name: format!("{class_name}.{}", node_text(name_node, source)),
                kind: NodeKind::Method,
                line: start_line(child),
                end_line: Some(end_line(child)),
                exported,
                decorators: Vec::new(),
            });
        }
    }
}

/// Collect interface property and method signatures as `Interface.member`
/// method-kind definitions.
fn extract_interface_members(
    iface_node: Node,
    iface_name: &str,
    source: &[u8],
    record: &mut FileRecord,
) {
    let Some(body) = child_of_kind(iface_node, "interface_body") else {
        return;
    };
    let mut cursor = body.walk();
    for child in body.children(&mut cursor) {
        if matches!(child.kind(), "property_signature" | "method_signature")
            && let Some(name_node) = child.child_by_field_name("name")
        {
            record.definitions.push(Definition {
                name: format!("{iface_name}.{}", node_text(name_node, source)),
                kind: NodeKind::Method,
                line: start_line(child),
                end_line: Some(end_line(child)),
                exported: false,
                decorators: Vec::new(),
            });
        }
    }
}

/// Record extends/implements relations of a class declaration.
///
/// The TS grammar wraps them in `extends_clause`/`implements_clause`; the
/// JS grammar puts the superclass identifier directly under
/// `class_heritage`.
fn extract_heritage(class_node: Node, class_name: &str, source: &[u8], record: &mut FileRecord) {
    let Some(heritage) = child_of_kind(class_node, "class_heritage") else {
        return;
    };
    let mut cursor = heritage.walk();
    for child in heritage.children(&mut cursor) {
        match child.kind() {
            "extends_clause" => {
                let value = child
                    .child_by_field_name("value")
                    .or_else(|| child.named_child(0));
                if let Some(value) = value
                    && let Some(parent) = heritage_name(value, source)
                {
                    record.classes.push(Heritage {
                        class_name: class_name.to_owned(),
                        parent,
                        kind: HeritageKind::Extends,
                        line: start_line(child),
                    });
                }
            }
            "implements_clause" => {
                let mut inner = child.walk();
                for iface in child.named_children(&mut inner) {
                    if let Some(parent) = heritage_name(iface, source) {
                        record.classes.push(Heritage {
                            class_name: class_name.to_owned(),
                            parent,
                            kind: HeritageKind::Implements,
                            line: start_line(child),
                        });
                    }
                }
            }
            "identifier" => {
                // JS grammar: `class Foo extends Bar` with no clause node.
                record.classes.push(Heritage {
                    class_name: class_name.to_owned(),
                    parent: node_text(child, source).to_owned(),
                    kind: HeritageKind::Extends,
                    line: start_line(child),
                });
            }
            _ => {}
        }
    }
}

/// Reduce a heritage expression to a single name: `Base` stays `Base`,
/// `Base<T>` loses its type arguments, `ns.Base` keeps the rightmost
/// segment.
fn heritage_name(node: Node, source: &[u8]) -> Option<String> {
    match node.kind() {
        "identifier" | "type_identifier" => Some(node_text(node, source).to_owned()),
        "generic_type" => node
            .child_by_field_name("name")
            .or_else(|| node.named_child(0))
            .and_then(|n| heritage_name(n, source)),
        "member_expression" => node
            .child_by_field_name("property")
            .map(|n| node_text(n, source).to_owned()),
        "nested_type_identifier" => node
            .child_by_field_name("name")
            .map(|n| node_text(n, source).to_owned()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Imports
// ---------------------------------------------------------------------------

fn extract_imports(
    tree: &Tree,
    source: &[u8],
    language: &Language,
    lang: Lang,
    record: &mut FileRecord,
) {
    let query = import_query(language, lang);
    let source_idx = query.capture_index_for_name("source").expect("@source");
    let import_idx = query.capture_index_for_name("import").expect("@import");

    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(query, tree.root_node(), source);

    while let Some(m) = matches.next() {
        let mut import_node: Option<Node> = None;
        let mut specifier: Option<String> = None;

        for capture in m.captures {
            if capture.index == import_idx {
                import_node = Some(capture.node);
            } else if capture.index == source_idx {
                specifier = Some(node_text(capture.node, source).to_owned());
            }
        }

        let (Some(node), Some(specifier)) = (import_node, specifier) else {
            continue;
        };

        record.imports.push(Import {
            source: specifier,
            bindings: import_bindings(node, source),
            type_only: has_type_keyword(node),
            reexport: false,
            wildcard_reexport: false,
            wildcard: false,
            line: start_line(node),
        });
    }
}

/// Walk an `import_statement`'s clause for its bindings: default,
/// named (`{ a, b as c }`), and namespace (`* as ns`, normalized to `ns`).
fn import_bindings(import_node: Node, source: &[u8]) -> Vec<ImportBinding> {
    let mut bindings = Vec::new();
    let Some(clause) = child_of_kind(import_node, "import_clause") else {
        return bindings;
    };

    let mut cursor = clause.walk();
    for child in clause.children(&mut cursor) {
        match child.kind() {
            "identifier" => bindings.push(ImportBinding {
                name: node_text(child, source).to_owned(),
                source_name: None,
                is_default: true,
                is_namespace: false,
            }),
            "named_imports" => {
                let mut inner = child.walk();
                for spec in child.children(&mut inner) {
                    if spec.kind() != "import_specifier" {
                        continue;
                    }
                    let name_node = spec.child_by_field_name("name");
                    let alias_node = spec.child_by_field_name("alias");
                    match (name_node, alias_node) {
                        (Some(n), Some(a)) => bindings.push(ImportBinding {
                            name: node_text(a, source).to_owned(),
                            source_name: Some(node_text(n, source).to_owned()),
                            is_default: false,
                            is_namespace: false,
                        }),
                        (Some(n), None) => bindings.push(ImportBinding {
                            name: node_text(n, source).to_owned(),
                            source_name: None,
                            is_default: false,
                            is_namespace: false,
                        }),
                        _ => {}
                    }
                }
            }
            "namespace_import" => {
                // `* as ns`; the identifier carries no field name.
                if let Some(id) = child_of_kind(child, "identifier") {
                    bindings.push(ImportBinding {
                        name: node_text(id, source).to_owned(),
                        source_name: None,
                        is_default: false,
                        is_namespace: true,
                    });
                }
            }
            _ => {}
        }
    }
    bindings
}

/// Statement-level `type` keyword: `import type { .. }` or
/// `export type { .. } from`.
fn has_type_keyword(node: Node) -> bool {
    let mut cursor = node.walk();
    node.children(&mut cursor).any(|c| c.kind() == "type")
}

// ---------------------------------------------------------------------------
// Exports
// ---------------------------------------------------------------------------

fn extract_exports(
    tree: &Tree,
    source: &[u8],
    language: &Language,
    lang: Lang,
    record: &mut FileRecord,
) {
    let query = export_query(language, lang);
    let export_idx = query.capture_index_for_name("export").expect("@export");

    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(query, tree.root_node(), source);

    while let Some(m) = matches.next() {
        for capture in m.captures {
            if capture.index == export_idx {
                classify_export(capture.node, source, record);
            }
        }
    }
}

fn classify_export(node: Node, source: &[u8], record: &mut FileRecord) {
    let source_specifier = export_source(node, source);
    let has_star = {
        let mut cursor = node.walk();
        node.children(&mut cursor).any(|c| c.kind() == "*")
    };

    if let Some(specifier) = source_specifier {
        // `export .. from '..'`; recorded as an import with the reexport
        // flag; wildcard re-exports are flagged distinctly.
        let bindings = if has_star {
            Vec::new()
        } else {
            export_clause_bindings(node, source)
        };
        record.imports.push(Import {
            source: specifier,
            bindings,
            type_only: has_type_keyword(node),
            reexport: true,
            wildcard_reexport: has_star,
            wildcard: false,
            line: start_line(node),
        });
        return;
    }

    if let Some(clause) = child_of_kind(node, "export_clause") {
        // `export { a, b }`; names that reference a local declaration
        // materialize with its kind and position.
        for binding in clause_specifiers(clause, source) {
            let export = local_export(&binding, start_line(node), record);
            record.exports.push(export);
        }
        return;
    }

    // `export default <identifier>`; exports an existing local symbol.
    let has_default = {
        let mut cursor = node.walk();
        node.children(&mut cursor).any(|c| c.kind() == "default")
    };
    if has_default
        && let Some(id) = child_of_kind(node, "identifier")
    {
        let name = node_text(id, source).to_owned();
        let export = local_export(&name, start_line(node), record);
        record.exports.push(export);
    }
    // Inline exported declarations are captured by the definition query.
}

fn local_export(name: &str, stmt_line: usize, record: &FileRecord) -> Export {
    match record.definitions.iter().find(|d| d.name == name) {
        Some(def) => Export {
            name: name.to_owned(),
            kind: Some(def.kind),
            line: def.line,
            end_line: def.end_line,
        },
        None => Export {
            name: name.to_owned(),
            kind: None,
            line: stmt_line,
            end_line: None,
        },
    }
}

/// The source module string of a re-export statement, if any.
fn export_source(node: Node, source: &[u8]) -> Option<String> {
    let string = child_of_kind(node, "string")?;
    string
        .named_child(0)
        .map(|frag| node_text(frag, source).to_owned())
}

/// Names exposed by an export clause (`export { a, b as c } ...`), as
/// `(exposed_name)` with the original kept for re-export chasing.
fn export_clause_bindings(node: Node, source: &[u8]) -> Vec<ImportBinding> {
    let Some(clause) = child_of_kind(node, "export_clause") else {
        return Vec::new();
    };
    let mut bindings = Vec::new();
    let mut cursor = clause.walk();
    for spec in clause.children(&mut cursor) {
        if spec.kind() != "export_specifier" {
            continue;
        }
        let name_node = spec.child_by_field_name("name");
        let alias_node = spec.child_by_field_name("alias");
        match (name_node, alias_node) {
            (Some(n), Some(a)) => bindings.push(ImportBinding {
                name: node_text(a, source).to_owned(),
                source_name: Some(node_text(n, source).to_owned()),
                is_default: false,
                is_namespace: false,
            }),
            (Some(n), None) => bindings.push(ImportBinding {
                name: node_text(n, source).to_owned(),
                source_name: None,
                is_default: false,
                is_namespace: false,
            }),
            _ => {}
        }
    }
    bindings
}

fn clause_specifiers(clause: Node, source: &[u8]) -> Vec<String> {
    let mut names = Vec::new();
    let mut cursor = clause.walk();
    for spec in clause.children(&mut cursor) {
        if spec.kind() == "export_specifier"
            && let Some(name_node) = spec.child_by_field_name("name")
        {
            names.push(node_text(name_node, source).to_owned());
        }
    }
    names
}

// ---------------------------------------------------------------------------
// Calls
// ---------------------------------------------------------------------------

fn extract_calls(
    tree: &Tree,
    source: &[u8],
    language: &Language,
    lang: Lang,
    record: &mut FileRecord,
) {
    let query = call_query(language, lang);
    let callee_idx = query.capture_index_for_name("callee").expect("@callee");
    let call_idx = query.capture_index_for_name("call").expect("@call");

    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(query, tree.root_node(), source);

    while let Some(m) = matches.next() {
        let mut callee: Option<Node> = None;
        let mut call: Option<Node> = None;
        for capture in m.captures {
            if capture.index == callee_idx {
                callee = Some(capture.node);
            } else if capture.index == call_idx {
                call = Some(capture.node);
            }
        }
        let (Some(callee), Some(call)) = (callee, call) else {
            continue;
        };
        if let Some(site) = classify_call(callee, start_line(call), source) {
            record.calls.push(site);
        }
    }
}

/// Classify a callee node into one of the four recorded call shapes.
/// Other dynamic forms are not recorded.
fn classify_call(callee: Node, line: usize, source: &[u8]) -> Option<CallSite> {
    match callee.kind() {
        // foo(..)
        "identifier" => Some(CallSite {
            name: node_text(callee, source).to_owned(),
            line,
            dynamic: false,
        }),
        "member_expression" => {
            let property = callee.child_by_field_name("property")?;
            let prop_text = node_text(property, source);
            if matches!(prop_text, "call" | "apply" | "bind") {
                // fn.call(..) / obj.fn.apply(..); dynamic dispatch; the
                // recorded name is the function being invoked.
                let object = callee.child_by_field_name("object")?;
                let name = match object.kind() {
                    "identifier" => node_text(object, source).to_owned(),
                    "member_expression" => {
                        let inner = object.child_by_field_name("property")?;
                        node_text(inner, source).to_owned()
                    }
                    _ => return None,
                };
                Some(CallSite {
                    name,
                    line,
                    dynamic: true,
                })
            } else {
                // obj.foo(..)
                Some(CallSite {
                    name: prop_text.to_owned(),
                    line,
                    dynamic: false,
                })
            }
        }
        "subscript_expression" => {
            // obj["foo"](..) with a literal string key is recorded as a
            // dynamic call to `foo`; computed keys are not recorded.
            let index = callee.child_by_field_name("index")?;
            if index.kind() != "string" {
                return None;
            }
            let fragment = index.named_child(0)?;
            Some(CallSite {
                name: node_text(fragment, source).to_owned(),
                line,
                dynamic: true,
            })
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
