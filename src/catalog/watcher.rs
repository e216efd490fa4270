//! Catalog file watcher for hot reload.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::catalog::file::FileStore;
use crate::catalog::source::EndpointCatalog;
use crate::endpoint::Endpoint;

/// Monitors the catalog file and publishes the desired endpoint list on change.
pub struct CatalogWatcher {
    store: Arc<FileStore>,
    catalog: EndpointCatalog,
    update_tx: mpsc::UnboundedSender<Vec<Endpoint>>,
}

impl CatalogWatcher {
    /// Create a new CatalogWatcher.
    ///
    /// `catalog` must read from `store`. Returns the watcher and a receiver
    /// for desired endpoint lists.
    pub fn new(
        store: Arc<FileStore>,
        catalog: EndpointCatalog,
    ) -> (Self, mpsc::UnboundedReceiver<Vec<Endpoint>>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                store,
                catalog,
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. The returned watcher must be kept alive.
    ///
    /// The parent directory is watched rather than the file itself, since
    /// writes replace the file through a rename.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.store.path().to_path_buf();
        let dir = watch_dir(&path);
        let file_name = path.file_name().map(OsString::from);
        let Self {
            store,
            catalog,
            update_tx,
        } = self;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let relevant = (event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove())
                        && event
                            .paths
                            .iter()
                            .any(|p| p.file_name().map(OsString::from) == file_name);
                    if !relevant {
                        return;
                    }
                    tracing::info!("Catalog change detected, reloading...");
                    match store.reload().map_err(Into::into).and_then(|()| catalog.desired_endpoints()) {
                        Ok(desired) => {
                            let _ = update_tx.send(desired);
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to reload catalog. Keeping current endpoints.");
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?path, "Catalog watcher started");
        Ok(watcher)
    }
}

fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
