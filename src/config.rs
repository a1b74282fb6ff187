use std::path::{Path, PathBuf};

use tracing::warn;

/// One path-alias rewrite rule from a project config's `paths` mapping.
///
/// `prefix` is the alias pattern with its trailing `*` removed; `targets`
/// are the absolute directories (also `*`-stripped) the matched tail is
/// substituted into.
#[derive(Debug, Clone)]
pub struct AliasRule {
    pub prefix: String,
    pub targets: Vec<PathBuf>,
}

/// Path-alias configuration extracted from `tsconfig.json` (preferred) or
/// `jsconfig.json` at the workspace root.
#[derive(Debug, Clone, Default)]
pub struct PathAliases {
    pub base_url: Option<PathBuf>,
    pub rules: Vec<AliasRule>,
}

impl PathAliases {
    pub fn is_empty(&self) -> bool {
        self.base_url.is_none() && self.rules.is_empty()
    }

    /// Load at most one project config from the workspace root.
    ///
    /// The file is parsed leniently; line comments, block comments, and
    /// trailing commas are stripped before JSON decoding. A malformed file
    /// is a skippable error: warn once and fall back to no aliases.
    pub fn load(root: &Path) -> PathAliases {
        for name in ["tsconfig.json", "jsconfig.json"] {
            let path = root.join(name);
            if !path.exists() {
                continue;
            }
            let text = match std::fs::read_to_string(&path) {
                Ok(t) => t,
                Err(err) => {
                    warn!("cannot read {name}: {err}");
                    return PathAliases::default();
                }
            };
            match serde_json::from_str::<serde_json::Value>(&strip_jsonc(&text)) {
                Ok(json) => return PathAliases::from_json(&json, root),
                Err(err) => {
                    warn!("malformed {name}: {err}; ignoring path aliases");
                    return PathAliases::default();
                }
            }
        }
        PathAliases::default()
    }

    fn from_json(json: &serde_json::Value, root: &Path) -> PathAliases {
        let options = &json["compilerOptions"];

        let base_url = options["baseUrl"]
            .as_str()
            .map(|s| root.join(s));
        // Alias targets are relative to baseUrl when one is set.
        let target_base = base_url.clone().unwrap_or_else(|| root.to_path_buf());

        let mut rules = Vec::new();
        if let Some(paths) = options["paths"].as_object() {
            for (pattern, value) in paths {
                // Only trailing-* patterns participate in alias resolution.
                let Some(prefix) = pattern.strip_suffix('*') else {
                    continue;
                };
                let targets: Vec<PathBuf> = value
                    .as_array()
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|v| v.as_str())
                            .filter_map(|t| t.strip_suffix('*'))
                            .map(|t| target_base.join(t))
                            .collect()
                    })
                    .unwrap_or_default();
                if !targets.is_empty() {
                    rules.push(AliasRule {
                        prefix: prefix.to_owned(),
                        targets,
                    });
                }
            }
        }
        // Longest prefix first so `@app/components/*` wins over `@app/*`.
        rules.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));

        PathAliases { base_url, rules }
    }
}

/// Strip `//` line comments, `/* */` block comments, and trailing commas
/// from JSON-with-comments text, leaving a strict-JSON string.
///
/// String literals are respected; comment markers inside them survive.
pub(crate) fn strip_jsonc(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if c == '\\'
                && let Some(escaped) = chars.next()
            {
                out.push(escaped);
                continue;
            }
            if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
            out.push(c);
        } else if c == '/' && chars.peek() == Some(&'/') {
            for next in chars.by_ref() {
                if next == '\n' {
                    out.push('\n');
                    break;
                }
            }
        } else if c == '/' && chars.peek() == Some(&'*') {
            chars.next();
            let mut prev = ' ';
            for next in chars.by_ref() {
                if prev == '*' && next == '/' {
                    break;
                }
                prev = next;
            }
        } else {
            out.push(c);
        }
    }

    strip_trailing_commas(&out)
}

/// Remove commas directly preceding a closing `}` or `]` (whitespace in
/// between allowed).
fn strip_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let chars: Vec<char> = text.chars().collect();

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            if c == '\\' && i + 1 < chars.len() {
                out.push(chars[i + 1]);
                i += 2;
                continue;
            }
            if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
            out.push(c);
        } else if c == ',' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if !(j < chars.len() && (chars[j] == '}' || chars[j] == ']')) {
                out.push(c);
            }
        } else {
            out.push(c);
        }
        i += 1;
    }

    out
}
