pub mod hcl;
pub mod python;
pub mod typescript;

use anyhow::{Context, Result, anyhow};
use tree_sitter::{Node, Parser};

use crate::language::Lang;
use crate::store::NodeKind;

/// A symbol declaration extracted from one file.
///
/// Methods are named `Class.method`; interface members `Interface.member`;
/// HCL blocks encode their labels (`resource.aws_s3_bucket.logs`).
#[derive(Debug, Clone)]
pub struct Definition {
    pub name: String,
    pub kind: NodeKind,
    /// 1-based start line of the declaration.
    pub line: usize,
    /// 1-based end line of the declaration's syntactic span.
    pub end_line: Option<usize>,
    pub exported: bool,
    /// Python decorator names attached to the definition, in source order.
    pub decorators: Vec<String>,
}

/// An exported name. When the export clause references a local declaration,
/// `kind`/`line` mirror it so pass 1 deduplicates against the definition
/// node; a clause naming nothing local carries no kind and materializes no
/// node.
#[derive(Debug, Clone)]
pub struct Export {
    pub name: String,
    pub kind: Option<NodeKind>,
    pub line: usize,
    pub end_line: Option<usize>,
}

/// One binding introduced by an import statement.
#[derive(Debug, Clone)]
pub struct ImportBinding {
    /// Local name bound in the importing file (`* as X` normalizes to `X`).
    pub name: String,
    /// Original exported name when aliased (`import { a as b }` -> `a`).
    pub source_name: Option<String>,
    pub is_default: bool,
    pub is_namespace: bool,
}

impl ImportBinding {
    /// The name to look up in the exporting module.
    pub fn exported_name(&self) -> &str {
        self.source_name.as_deref().unwrap_or(&self.name)
    }
}

/// An import (or re-export) statement extracted from one file.
#[derive(Debug, Clone)]
pub struct Import {
    /// The raw specifier string as written in source.
    pub source: String,
    pub bindings: Vec<ImportBinding>,
    /// `import type { .. }`; the statement imports types only.
    pub type_only: bool,
    /// `export { .. } from`; a re-export recorded as an import.
    pub reexport: bool,
    /// `export * from`; wildcard re-export.
    pub wildcard_reexport: bool,
    /// Python `from x import *`. Excluded from the imported-names map.
    pub wildcard: bool,
    pub line: usize,
}

/// A call site: the textual callee name and whether the dispatch form was
/// inherently dynamic (`.call`/`.apply`/`.bind`, string-literal computed
/// member access).
#[derive(Debug, Clone)]
pub struct CallSite {
    pub name: String,
    pub line: usize,
    pub dynamic: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeritageKind {
    Extends,
    Implements,
}

/// One direct superclass or implemented interface of a class.
#[derive(Debug, Clone)]
pub struct Heritage {
    pub class_name: String,
    pub parent: String,
    pub kind: HeritageKind,
    pub line: usize,
}

/// Everything the symbol extractor produces for one file. Pure in-memory
/// data; the graph builder is the only consumer.
#[derive(Debug, Clone, Default)]
pub struct FileRecord {
    pub definitions: Vec<Definition>,
    pub exports: Vec<Export>,
    pub imports: Vec<Import>,
    pub calls: Vec<CallSite>,
    pub classes: Vec<Heritage>,
}

impl FileRecord {
    /// Whether this file declares `name`; a definition or an export clause
    /// carries it. Barrel resolution uses this to confirm a re-export chain
    /// actually terminates at a defining file.
    pub fn defines(&self, name: &str) -> bool {
        self.definitions.iter().any(|d| d.name == name)
            || self.exports.iter().any(|e| e.name == name)
    }

    /// Re-export statements contained in this file.
    pub fn reexports(&self) -> impl Iterator<Item = &Import> {
        self.imports.iter().filter(|i| i.reexport)
    }
}

/// Parse one file's source and extract its [`FileRecord`].
///
/// Errors are per-file and skippable: the caller warns and excludes the
/// file from the build.
pub fn parse_file(lang: Lang, source: &[u8]) -> Result<FileRecord> {
    let grammar = lang
        .grammar()
        .ok_or_else(|| anyhow!("{lang} grammar unavailable"))?;

    let mut parser = Parser::new();
    parser
        .set_language(&grammar)
        .with_context(|| format!("cannot load {lang} grammar"))?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| anyhow!("{lang} parse returned no tree"))?;

    let record = match lang {
        Lang::TypeScript | Lang::Tsx | Lang::JavaScript => {
            typescript::extract(&tree, source, &grammar, lang)
        }
        Lang::Python => python::extract(&tree, source, &grammar),
        Lang::Hcl => hcl::extract(&tree, source),
    };
    Ok(record)
}

/// Extract the UTF-8 text of a node from the original source bytes.
pub(crate) fn node_text<'a>(node: Node<'a>, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}

/// 1-based start line of a node.
pub(crate) fn start_line(node: Node) -> usize {
    node.start_position().row + 1
}

/// 1-based end line of a node.
pub(crate) fn end_line(node: Node) -> usize {
    node.end_position().row + 1
}

/// Find the first direct child of `node` with the given kind.
pub(crate) fn child_of_kind<'a>(node: Node<'a>, kind: &str) -> Option<Node<'a>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).find(|c| c.kind() == kind)
}
