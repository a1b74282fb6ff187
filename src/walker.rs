use std::path::Path;

use anyhow::Result;
use ignore::WalkBuilder;

use crate::language::Lang;

/// Directory names never descended into, regardless of ignore files:
/// vendored dependency caches, build outputs, VCS metadata, virtual
/// environments, and our own output directory.
pub const IGNORED_DIRS: &[&str] = &[
    "node_modules",
    "dist",
    "build",
    "out",
    "target",
    "coverage",
    "vendor",
    ".git",
    ".hg",
    ".svn",
    "venv",
    ".venv",
    "__pycache__",
    ".terraform",
    ".codegraph",
];

/// Walk a workspace root and collect every tracked source file.
///
/// Honors `.gitignore` rules, skips [`IGNORED_DIRS`] and hidden directories
/// unconditionally, and yields workspace-relative, `/`-separated paths in
/// lexicographic order; storage assigns node ids in insertion order, so a
/// stable ordering makes graph ids deterministic across builds.
pub fn walk_workspace(root: &Path) -> Result<Vec<String>> {
    let walker = WalkBuilder::new(root)
        .hidden(true)
        .require_git(false)
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            !(entry.file_type().is_some_and(|t| t.is_dir())
                && IGNORED_DIRS.iter().any(|d| name == *d))
        })
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                tracing::warn!("walk error: {err}");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let rel = match entry.path().strip_prefix(root) {
            Ok(r) => r,
            Err(_) => continue,
        };
        let rel_str = to_slash(rel);
        if Lang::for_path(&rel_str).is_some() {
            files.push(rel_str);
        }
    }

    files.sort();
    Ok(files)
}

/// Render a relative path with `/` separators regardless of platform.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
