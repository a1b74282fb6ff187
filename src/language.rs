use std::fmt;

use tree_sitter::{Language, Parser};

/// A source language handled by codegraph.
///
/// Plain enum rather than trait objects; cheap to copy, pattern-matched at
/// dispatch boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lang {
    TypeScript,
    Tsx,
    JavaScript,
    Python,
    Hcl,
}

impl Lang {
    /// Map a file path to its language by extension.
    ///
    /// `.tsx` -> TSX grammar, `.ts`/`.d.ts` -> TS grammar,
    /// `.js`/`.jsx`/`.mjs`/`.cjs` -> JS grammar, `.py` -> Python,
    /// `.tf`/`.hcl` -> HCL. The TS and TSX grammars must stay distinct:
    /// the TS grammar cannot parse JSX, and the TSX grammar breaks
    /// angle-bracket type assertions.
    pub fn for_path(path: &str) -> Option<Lang> {
        let ext = path.rsplit('.').next().unwrap_or("");
        match ext {
            "tsx" => Some(Lang::Tsx),
            "ts" => Some(Lang::TypeScript),
            "js" | "jsx" | "mjs" | "cjs" => Some(Lang::JavaScript),
            "py" => Some(Lang::Python),
            "tf" | "hcl" => Some(Lang::Hcl),
            _ => None,
        }
    }

    /// Optional grammars may be absent (feature-gated binding, or a grammar
    /// the linked tree-sitter runtime rejects).
    pub fn is_optional(self) -> bool {
        matches!(self, Lang::Python | Lang::Hcl)
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Lang::TypeScript => "TypeScript",
            Lang::Tsx => "TSX",
            Lang::JavaScript => "JavaScript",
            Lang::Python => "Python",
            Lang::Hcl => "HCL",
        }
    }

    /// The tree-sitter grammar for this language, if compiled in.
    pub fn grammar(self) -> Option<Language> {
        match self {
            Lang::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            Lang::Tsx => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
            Lang::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            #[cfg(feature = "python")]
            Lang::Python => Some(tree_sitter_python::LANGUAGE.into()),
            #[cfg(not(feature = "python"))]
            Lang::Python => None,
            #[cfg(feature = "hcl")]
            Lang::Hcl => Some(tree_sitter_hcl::LANGUAGE.into()),
            #[cfg(not(feature = "hcl"))]
            Lang::Hcl => None,
        }
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Which grammars this process can actually parse with.
///
/// Probed once at startup and treated as immutable afterwards; everything
/// downstream consults the table instead of re-attempting grammar loads.
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    python: bool,
    hcl: bool,
}

impl Capabilities {
    /// Probe each optional grammar once by attempting to install it into a
    /// parser. A binding that is compiled out, or whose ABI the runtime
    /// rejects, is recorded as absent.
    pub fn probe() -> Capabilities {
        Capabilities {
            python: probe_grammar(Lang::Python),
            hcl: probe_grammar(Lang::Hcl),
        }
    }

    pub fn supports(&self, lang: Lang) -> bool {
        match lang {
            Lang::TypeScript | Lang::Tsx | Lang::JavaScript => true,
            Lang::Python => self.python,
            Lang::Hcl => self.hcl,
        }
    }
}

fn probe_grammar(lang: Lang) -> bool {
    match lang.grammar() {
        Some(grammar) => Parser::new().set_language(&grammar).is_ok(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_dispatch() {
        assert_eq!(Lang::for_path("src/app.tsx"), Some(Lang::Tsx));
        assert_eq!(Lang::for_path("src/app.ts"), Some(Lang::TypeScript));
        assert_eq!(Lang::for_path("types.d.ts"), Some(Lang::TypeScript));
        assert_eq!(Lang::for_path("lib.mjs"), Some(Lang::JavaScript));
        assert_eq!(Lang::for_path("lib.cjs"), Some(Lang::JavaScript));
        assert_eq!(Lang::for_path("tool.py"), Some(Lang::Python));
        assert_eq!(Lang::for_path("main.tf"), Some(Lang::Hcl));
        assert_eq!(Lang::for_path("vars.hcl"), Some(Lang::Hcl));
        assert_eq!(Lang::for_path("README.md"), None);
        assert_eq!(Lang::for_path("Makefile"), None);
    }

    #[test]
    fn test_required_grammars_always_supported() {
        let caps = Capabilities::probe();
        assert!(caps.supports(Lang::TypeScript));
        assert!(caps.supports(Lang::Tsx));
        assert!(caps.supports(Lang::JavaScript));
    }

    #[cfg(feature = "python")]
    #[test]
    fn test_python_capability_present_when_compiled_in() {
        assert!(Capabilities::probe().supports(Lang::Python));
    }
}
