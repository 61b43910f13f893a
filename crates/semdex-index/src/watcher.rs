use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify_debouncer_mini::{DebounceEventResult, DebouncedEvent, DebouncedEventKind, new_debouncer};
use semdex_llm::{EmbeddingProvider, SummaryProvider};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::indexer::CodeIndexer;
use crate::workspace::{FsWorkspace, WorkspaceSource};

/// Forwards filesystem changes under a workspace root to a [`CodeIndexer`].
///
/// Existing paths become `notify_changed`, vanished ones `notify_deleted`.
/// Dropping the watcher stops it.
pub struct IndexWatcher {
    handle: tokio::task::JoinHandle<()>,
}

impl IndexWatcher {
    /// # Errors
    ///
    /// Returns an error if the filesystem watcher cannot be initialized.
    pub fn start<P>(
        workspace: &FsWorkspace,
        indexer: Arc<CodeIndexer<P>>,
        coalesce: Duration,
    ) -> Result<Self>
    where
        P: EmbeddingProvider + SummaryProvider + 'static,
    {
        let (notify_tx, mut notify_rx) = mpsc::channel::<PathBuf>(256);

        let mut debouncer = new_debouncer(coalesce, move |res: DebounceEventResult| match res {
            Ok(events) => {
                for path in changed_paths(events) {
                    if notify_tx.blocking_send(path).is_err() {
                        break;
                    }
                }
            }
            Err(e) => tracing::warn!("workspace watcher error: {e}"),
        })?;

        debouncer
            .watcher()
            .watch(workspace.root(), notify::RecursiveMode::Recursive)?;

        let workspace = workspace.clone();
        let handle = tokio::spawn(async move {
            let _debouncer = debouncer;
            while let Some(path) = notify_rx.recv().await {
                let Some(uri) = workspace.uri_for_path(&path) else {
                    continue;
                };
                if path.is_dir() {
                    continue;
                }
                if path.exists() {
                    if workspace.accepts(&uri) {
                        indexer.notify_changed(uri);
                    }
                } else if let Err(e) = indexer.notify_deleted(&uri).await {
                    tracing::warn!(file = %uri, "failed to drop deleted file: {e:#}");
                }
            }
        });

        Ok(Self { handle })
    }
}

/// Distinct paths of settled events; `AnyContinuous` bursts are still in flight.
fn changed_paths(events: Vec<DebouncedEvent>) -> HashSet<PathBuf> {
    events
        .into_iter()
        .filter(|e| e.kind == DebouncedEventKind::Any)
        .map(|e| e.path)
        .collect()
}

impl Drop for IndexWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
