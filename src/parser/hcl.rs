use tree_sitter::{Node, Tree};

use crate::store::NodeKind;

use super::{Definition, FileRecord, Import, end_line, node_text, start_line};

/// Extract an HCL/Terraform file: every top-level block becomes a
/// definition whose name encodes the block type and labels
/// (`resource.aws_s3_bucket.logs`, `variable.region`, ...). A `module`
/// block with a relative `source` attribute produces an import. HCL has no
/// call edges.
pub fn extract(tree: &Tree, source: &[u8]) -> FileRecord {
    let mut record = FileRecord::default();

    let root = tree.root_node();
    let body = if root.kind() == "config_file" {
        root.named_child(0).unwrap_or(root)
    } else {
        root
    };

    let mut cursor = body.walk();
    for child in body.children(&mut cursor) {
        if child.kind() == "block" {
            extract_block(child, source, &mut record);
        }
    }

    record
}

fn extract_block(block: Node, source: &[u8], record: &mut FileRecord) {
    let mut block_type: Option<String> = None;
    let mut labels: Vec<String> = Vec::new();
    let mut body: Option<Node> = None;

    let mut cursor = block.walk();
    for child in block.children(&mut cursor) {
        match child.kind() {
            "identifier" if block_type.is_none() => {
                block_type = Some(node_text(child, source).to_owned());
            }
            "identifier" => labels.push(node_text(child, source).to_owned()),
            "string_lit" => labels.push(unquote(node_text(child, source))),
            "body" => body = Some(child),
            _ => {}
        }
    }

    let Some(block_type) = block_type else {
        return;
    };
    // Block types outside the fixed kind set produce no definition.
    let Some(kind) = block_kind(&block_type) else {
        return;
    };

    let mut name = block_type.clone();
    for label in &labels {
        name.push('.');
        name.push_str(label);
    }

    record.definitions.push(Definition {
        name,
        kind,
        line: start_line(block),
        end_line: Some(end_line(block)),
        exported: true,
        decorators: Vec::new(),
    });

    if kind == NodeKind::Module
        && let Some(body) = body
        && let Some(module_source) = attribute_string(body, "source", source)
        && module_source.starts_with('.')
    {
        record.imports.push(Import {
            source: module_source,
            bindings: Vec::new(),
            type_only: false,
            reexport: false,
            wildcard_reexport: false,
            wildcard: false,
            line: start_line(block),
        });
    }
}

fn block_kind(block_type: &str) -> Option<NodeKind> {
    Some(match block_type {
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

/// Find a top-level attribute of `body` by name and return its string
/// value with quotes stripped, when the value is a plain string.
fn attribute_string(body: Node, attr_name: &str, source: &[u8]) -> Option<String> {
    let mut cursor = body.walk();
    for child in body.children(&mut cursor) {
        if child.kind() != "attribute" {
            continue;
        }
        let mut inner = child.walk();
        let mut children = child.children(&mut inner);
        let Some(ident) = children.find(|c| c.kind() == "identifier") else {
            continue;
        };
        if node_text(ident, source) != attr_name {
            continue;
        }
        let value = child.named_child(child.named_child_count().saturating_sub(1))?;
        return Some(unquote(node_text(value, source).trim()));
    }
    None
}

fn unquote(text: &str) -> String {
    text.trim_matches('"').to_owned()
}
