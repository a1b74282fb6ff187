mod builder;
mod cli;
mod config;
mod language;
mod output;
mod parser;
mod query;
mod resolver;
mod store;
mod walker;
mod watcher;

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use store::GraphStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("codegraph=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build { path, json } => {
            let root = path
                .canonicalize()
                .with_context(|| format!("no such directory: {}", path.display()))?;
            let mut store = GraphStore::create(&store::db_path(&root))?;
            let (stats, _) = builder::build(&mut store, &root)?;
            output::print_build(&stats, json);
        }

        Commands::Find {
            name,
            include_tests,
            json,
            dir,
        } => {
            let store = open_read_only(&dir)?;
            let reports = query::symbols::find_symbols(store.conn(), &name, include_tests)?;
            if reports.is_empty() {
                eprintln!("no symbols matching '{name}' found");
                std::process::exit(1);
            }
            output::print_find(&reports, json);
        }

        Commands::Impact {
            name,
            depth,
            include_tests,
            json,
            dir,
        } => {
            let store = open_read_only(&dir)?;
            let matches = query::symbols::match_nodes(store.conn(), &name)?;
            if matches.is_empty() {
                eprintln!("no symbols matching '{name}' found");
                std::process::exit(1);
            }
            let seeds: Vec<i64> = matches.iter().map(|n| n.id).collect();
            let results =
                query::impact::function_impact(store.conn(), &seeds, depth, include_tests)?;
            output::print_function_impact(&results, json);
        }

        Commands::FileImpact {
            file,
            include_tests,
            json,
            dir,
        } => {
            let store = open_read_only(&dir)?;
            let results = query::impact::file_impact(store.conn(), &file, include_tests)?;
            output::print_file_impact(&results, json);
        }

        Commands::Map {
            limit,
            include_tests,
            json,
            dir,
        } => {
            let store = open_read_only(&dir)?;
            let ranks = query::map::module_map(store.conn(), limit, include_tests)?;
            output::print_map(&ranks, json);
        }

        Commands::Diff {
            patch,
            depth,
            include_tests,
            json,
            dir,
        } => {
            let text = match patch {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("cannot read {}", path.display()))?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("cannot read diff from stdin")?;
                    buf
                }
            };
            let changes = query::diff::parse_unified_diff(&text);
            let store = open_read_only(&dir)?;
            let results = query::diff::diff_impact(store.conn(), &changes, depth, include_tests)?;
            output::print_diff(&results, json);
        }

        Commands::Watch { path } => {
            let root = path
                .canonicalize()
                .with_context(|| format!("no such directory: {}", path.display()))?;
            watch_loop(&root).await?;
        }
    }

    Ok(())
}

fn open_read_only(dir: &Path) -> Result<GraphStore> {
    let db = store::locate_db(&dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf()));
    GraphStore::open_read_only(&db)
}

/// Build once, then apply debounced per-file deltas until interrupted.
async fn watch_loop(root: &Path) -> Result<()> {
    let mut store = GraphStore::create(&store::db_path(root))?;
    let (stats, mut ctx) = builder::build(&mut store, root)?;
    eprintln!(
        "indexed {} files ({} nodes, {} edges); watching for changes...",
        stats.files, stats.nodes, stats.edges
    );

    let (handle, mut rx) = watcher::start(root)?;
    let _handle = handle;

    while let Some(event) = rx.recv().await {
        match event {
            watcher::WatchEvent::Changed(path) | watcher::WatchEvent::Deleted(path) => {
                let rel = match path.strip_prefix(root) {
                    Ok(rel) => walker::to_slash(rel),
                    Err(_) => continue,
                };
                let start = std::time::Instant::now();
                match builder::update_file(&mut store, root, &mut ctx, &rel) {
                    Ok(()) => info!(
                        "updated {rel} in {:.1}ms",
                        start.elapsed().as_secs_f64() * 1000.0
                    ),
                    Err(err) => warn!("update of {rel} failed: {err}"),
                }
            }
            watcher::WatchEvent::ConfigChanged => {
                eprintln!("config changed; full re-index");
                let (stats, new_ctx) = builder::build(&mut store, root)?;
                ctx = new_ctx;
                eprintln!(
                    "re-indexed {} files ({} nodes, {} edges)",
                    stats.files, stats.nodes, stats.edges
                );
            }
        }
    }

    Ok(())
}
