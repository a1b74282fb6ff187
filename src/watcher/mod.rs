use std::path::{Path, PathBuf};
use std::time::Duration;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use notify::RecursiveMode;
use notify_debouncer_mini::{DebounceEventResult, new_debouncer};
use tokio::sync::mpsc as tokio_mpsc;
use tokio::task::JoinHandle;

use crate::language::Lang;
use crate::walker::IGNORED_DIRS;

/// Events over a 300 ms quiescent window are coalesced before any delta
/// is applied.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(300);

/// Config files whose change invalidates resolution state and forces a
/// full rebuild.
const FULL_REBUILD_FILES: &[&str] = &["tsconfig.json", "jsconfig.json"];

/// A classified filesystem event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A tracked source file was created or modified.
    Changed(PathBuf),
    /// A tracked source file disappeared.
    Deleted(PathBuf),
    /// A project config file changed; the whole graph must be rebuilt.
    ConfigChanged,
}

/// Handle to a running watcher. Dropping it stops the OS watcher.
pub struct WatcherHandle {
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
    _bridge_task: JoinHandle<()>,
}

/// Build a gitignore matcher from the workspace root; the same source of
/// truth the walker uses, so the watcher skips what indexing skipped.
fn build_gitignore_matcher(root: &Path) -> Gitignore {
    let mut builder = GitignoreBuilder::new(root);
    let gitignore = root.join(".gitignore");
    if gitignore.exists() {
        let _ = builder.add(&gitignore);
    }
    builder.build().unwrap_or_else(|_| Gitignore::empty())
}

/// Start a debounced watcher on `root`.
///
/// Returns the handle (keep it alive) and a receiver of classified
/// [`WatchEvent`]s. The writer applying deltas stays single-threaded: the
/// receiver is consumed by one loop.
pub fn start(root: &Path) -> anyhow::Result<(WatcherHandle, tokio_mpsc::Receiver<WatchEvent>)> {
    let (std_tx, std_rx) = std::sync::mpsc::channel::<DebounceEventResult>();

    let mut debouncer = new_debouncer(DEBOUNCE_WINDOW, move |res| {
        let _ = std_tx.send(res);
    })?;
    debouncer.watcher().watch(root, RecursiveMode::Recursive)?;

    let gitignore = build_gitignore_matcher(root);
    let (tokio_tx, tokio_rx) = tokio_mpsc::channel::<WatchEvent>(256);

    let bridge_task = tokio::task::spawn_blocking(move || {
        while let Ok(result) = std_rx.recv() {
            match result {
                Ok(events) => {
                    for event in events {
                        if let Some(classified) = classify(&event.path, &gitignore)
                            && tokio_tx.blocking_send(classified).is_err()
                        {
                            return; // receiver dropped, shut down
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!("watch error: {err:?}");
                }
            }
        }
    });

    Ok((
        WatcherHandle {
            _debouncer: debouncer,
            _bridge_task: bridge_task,
        },
        tokio_rx,
    ))
}

/// Classify an event path, or drop it.
fn classify(path: &Path, gitignore: &Gitignore) -> Option<WatchEvent> {
    if path.components().any(|c| {
        let name = c.as_os_str().to_string_lossy();
        IGNORED_DIRS.iter().any(|d| name == *d)
    }) {
        return None;
    }
    if gitignore.matched(path, path.is_dir()).is_ignore() {
        return None;
    }

    if let Some(name) = path.file_name().and_then(|n| n.to_str())
        && FULL_REBUILD_FILES.contains(&name)
    {
        return Some(WatchEvent::ConfigChanged);
    }

    let rel_str = path.to_string_lossy();
    Lang::for_path(&rel_str)?;

    if path.exists() {
        Some(WatchEvent::Changed(path.to_path_buf()))
    } else {
        Some(WatchEvent::Deleted(path.to_path_buf()))
    }
}
