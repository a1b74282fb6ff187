pub mod barrel;

use std::collections::HashSet;
use std::path::Path;

use crate::config::PathAliases;

/// Extension/index suffixes probed, in order, when mapping a specifier to a
/// file. The empty suffix comes first so explicit extensions win.
const PROBE_SUFFIXES: &[&str] = &[
    "",
    ".ts",
    ".tsx",
    ".js",
    ".jsx",
    ".mjs",
    ".py",
    "/index.ts",
    "/index.tsx",
    "/index.js",
    "/__init__.py",
];

/// The outcome of resolving one import specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Resolved to a workspace-relative path that exists in the build.
    Internal(String),
    /// Bare specifier with no alias match; an external module. Never
    /// matches a file node, so no edge is created.
    External(String),
    /// Relative path that matched nothing; kept in workspace-relative form
    /// for diagnostics. No edge is created.
    Unresolved(String),
}

impl Resolution {
    pub fn internal(&self) -> Option<&str> {
        match self {
            Resolution::Internal(path) => Some(path),
            _ => None,
        }
    }
}

/// Maps import specifiers issued from workspace files to canonical
/// workspace-relative paths.
///
/// Candidates are probed against the enumerated workspace file set rather
/// than the filesystem; deterministic, and blind to files the walk
/// excluded.
pub struct ImportResolver<'a> {
    root: &'a Path,
    aliases: &'a PathAliases,
    files: &'a HashSet<String>,
}

impl<'a> ImportResolver<'a> {
    pub fn new(root: &'a Path, aliases: &'a PathAliases, files: &'a HashSet<String>) -> Self {
        ImportResolver {
            root,
            aliases,
            files,
        }
    }

    /// Resolve `specifier` as written in `from_file` (workspace-relative).
    pub fn resolve(&self, specifier: &str, from_file: &str) -> Resolution {
        if !specifier.starts_with('.') {
            return self.resolve_bare(specifier);
        }

        let dir = parent_dir(from_file);
        let joined = if dir.is_empty() {
            specifier.to_owned()
        } else {
            format!("{dir}/{specifier}")
        };
        let candidate = normalize(&joined);

        if let Some(found) = self.probe(&candidate) {
            return Resolution::Internal(found);
        }
        Resolution::Unresolved(candidate)
    }

    /// Non-relative specifier: try alias rules, then `baseUrl`, then give
    /// it back unchanged as an external module.
    fn resolve_bare(&self, specifier: &str) -> Resolution {
        for rule in &self.aliases.rules {
            let Some(tail) = specifier.strip_prefix(rule.prefix.as_str()) else {
                continue;
            };
            for target in &rule.targets {
                let abs = target.join(tail);
                if let Some(rel) = self.workspace_relative(&abs)
                    && let Some(found) = self.probe(&rel)
                {
                    return Resolution::Internal(found);
                }
            }
        }

        if let Some(base) = &self.aliases.base_url {
            let abs = base.join(specifier);
            if let Some(rel) = self.workspace_relative(&abs)
                && let Some(found) = self.probe(&rel)
            {
                return Resolution::Internal(found);
            }
        }

        Resolution::External(specifier.to_owned())
    }

    /// Probe a normalized workspace-relative candidate through the suffix
    /// list. A candidate ending in `.js` honors the ESM convention: the
    /// `.ts` and `.tsx` siblings are probed before the `.js` file itself.
    fn probe(&self, candidate: &str) -> Option<String> {
        if let Some(stem) = candidate.strip_suffix(".js") {
            for ext in [".ts", ".tsx"] {
                let probe = format!("{stem}{ext}");
                if self.files.contains(&probe) {
                    return Some(probe);
                }
            }
        }
        for suffix in PROBE_SUFFIXES {
            let probe = format!("{candidate}{suffix}");
            if self.files.contains(&probe) {
                return Some(probe);
            }
        }
        None
    }

    /// Express an absolute path relative to the workspace root, or `None`
    /// when it points outside the workspace.
    fn workspace_relative(&self, abs: &Path) -> Option<String> {
        let rel = abs.strip_prefix(self.root).ok()?;
        Some(normalize(&crate::walker::to_slash(rel)))
    }
}

/// Directory part of a workspace-relative path ("" at the root).
fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Lexically normalize a `/`-separated relative path: resolve `.` and
/// `..` segments. Segments escaping the root are kept (they will not match
/// any enumerated file).
fn normalize(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(out.last(), Some(&"..") | None) {
                    out.push("..");
                } else {
                    out.pop();
                }
            }
            other => out.push(other),
        }
    }
    out.join("/")
}
