use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// An offline code dependency analyzer.
///
/// codegraph indexes TypeScript/JavaScript, Python, and Terraform sources
/// into a queryable SQLite graph at `.codegraph/graph.db`, then answers
/// structural queries over it: callers, callees, transitive impact, file
/// dependencies, and diff-scoped impact.
#[derive(Parser, Debug)]
#[command(name = "codegraph", version, about, propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Index a workspace, atomically rebuilding its graph store.
    Build {
        /// Workspace root to index.
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Output build stats as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Find symbols by name substring, with their callers and callees.
    Find {
        /// Substring of the symbol name.
        name: String,

        /// Include callers/callees located in test files.
        #[arg(long)]
        include_tests: bool,

        /// Output results as JSON.
        #[arg(long)]
        json: bool,

        /// Directory to locate the graph store from (walks upward).
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },

    /// Transitive callers of matching symbols (reverse BFS over calls).
    Impact {
        /// Substring of the symbol name.
        name: String,

        /// Maximum traversal depth.
        #[arg(long, default_value_t = 3)]
        depth: usize,

        /// Include callers located in test files.
        #[arg(long)]
        include_tests: bool,

        /// Output results as JSON.
        #[arg(long)]
        json: bool,

        /// Directory to locate the graph store from (walks upward).
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },

    /// Files that transitively import a file (level-annotated reverse BFS).
    FileImpact {
        /// Workspace-relative file path, as stored in the graph.
        file: String,

        /// Include test files in the result.
        #[arg(long)]
        include_tests: bool,

        /// Output results as JSON.
        #[arg(long)]
        json: bool,

        /// Directory to locate the graph store from (walks upward).
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },

    /// Rank files by inbound edge count.
    Map {
        /// Maximum number of files to list.
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Include test files in the ranking.
        #[arg(long)]
        include_tests: bool,

        /// Output results as JSON.
        #[arg(long)]
        json: bool,

        /// Directory to locate the graph store from (walks upward).
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },

    /// Impact of a unified diff: overlapped definitions and their
    /// transitive callers.
    Diff {
        /// Read the diff from a file instead of stdin.
        #[arg(long)]
        patch: Option<PathBuf>,

        /// Maximum caller traversal depth.
        #[arg(long, default_value_t = 3)]
        depth: usize,

        /// Include callers located in test files.
        #[arg(long)]
        include_tests: bool,

        /// Output results as JSON.
        #[arg(long)]
        json: bool,

        /// Directory to locate the graph store from (walks upward).
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },

    /// Watch a workspace and apply incremental per-file graph updates.
    Watch {
        /// Workspace root to watch.
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_build_defaults_to_cwd() {
        let cli = Cli::parse_from(["codegraph", "build"]);
        match cli.command {
            Commands::Build { path, json } => {
                assert_eq!(path, PathBuf::from("."));
                assert!(!json);
            }
            _ => panic!("expected Build"),
        }
    }

    #[test]
    fn test_impact_depth_flag() {
        let cli = Cli::parse_from(["codegraph", "impact", "handleRequest", "--depth", "5"]);
        match cli.command {
            Commands::Impact { name, depth, .. } => {
                assert_eq!(name, "handleRequest");
                assert_eq!(depth, 5);
            }
            _ => panic!("expected Impact"),
        }
    }

    #[test]
    fn test_diff_patch_flag() {
        let cli = Cli::parse_from(["codegraph", "diff", "--patch", "changes.diff"]);
        match cli.command {
            Commands::Diff { patch, depth, .. } => {
                assert_eq!(patch, Some(PathBuf::from("changes.diff")));
                assert_eq!(depth, 3);
            }
            _ => panic!("expected Diff"),
        }
    }
}
