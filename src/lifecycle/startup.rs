//! Startup orchestration and the steady-state run loop.
//!
//! # Responsibilities
//! - Install metrics, open the catalog, spawn the reconciliation engine
//! - Realize the catalog once, then on every catalog change
//! - Route services deleted from the catalog through the explicit removal path
//! - Close every listener on shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Reconciliation failures are logged and retried on the next change

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::catalog::{CatalogError, CatalogWatcher, EndpointCatalog, FileStore, KeyPrefix, PathError, StoreError};
use crate::config::RouterConfig;
use crate::endpoint::Endpoint;
use crate::http::default_handler;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::reconcile::{ReconcileReport, ReconciliationEngine};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("metrics address {0:?} is not a socket address")]
    MetricsAddress(String),

    #[error("failed to install metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("invalid catalog prefix: {0}")]
    Prefix(#[from] PathError),

    #[error("failed to open catalog: {0}")]
    Store(#[from] StoreError),

    #[error("failed to read catalog: {0}")]
    Catalog(#[from] CatalogError),

    #[error("failed to watch catalog: {0}")]
    Watch(#[from] notify::Error),
}

/// Run the router until `shutdown` is triggered.
pub async fn run(config: RouterConfig, shutdown: Shutdown) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::MetricsAddress(config.observability.metrics_address.clone()))?;
        metrics::init_metrics(addr)?;
    }

    let store = Arc::new(FileStore::open(&config.catalog.path)?);
    let prefix = KeyPrefix::new(config.catalog.app_id.as_str(), config.catalog.cluster_id.as_str())?;
    let catalog = EndpointCatalog::new(store.clone(), prefix);
    let engine = ReconciliationEngine::new(config.engine.clone(), default_handler());

    tracing::info!(
        catalog = %config.catalog.path,
        app_id = %config.catalog.app_id,
        cluster_id = %config.catalog.cluster_id,
        watch = config.catalog.watch,
        "Router starting"
    );

    let (_watcher, mut updates) = if config.catalog.watch {
        let (watcher, updates) = CatalogWatcher::new(store.clone(), catalog.clone());
        (Some(watcher.run()?), updates)
    } else {
        let (_, updates) = mpsc::unbounded_channel();
        (None, updates)
    };

    let mut applier = Applier {
        engine: engine.clone(),
        prune_missing: config.engine.prune_missing,
        known: BTreeSet::new(),
    };
    applier.apply(catalog.desired_endpoints()?).await;

    loop {
        tokio::select! {
            Some(desired) = updates.recv() => applier.apply(desired).await,
            _ = shutdown.wait() => break,
        }
    }

    tracing::info!("Closing all listeners");
    log_report("shutdown", &engine.shutdown().report().await);
    tracing::info!("Router stopped");
    Ok(())
}

/// Feeds successive desired sets to the engine.
struct Applier {
    engine: ReconciliationEngine,
    prune_missing: bool,
    known: BTreeSet<String>,
}

impl Applier {
    async fn apply(&mut self, desired: Vec<Endpoint>) {
        let names: BTreeSet<String> = desired.iter().map(|e| e.name.clone()).collect();

        // With pruning the engine drops absent names itself.
        if !self.prune_missing {
            let removed: Vec<String> = self.known.difference(&names).cloned().collect();
            if !removed.is_empty() {
                tracing::info!(endpoints = ?removed, "Services removed from catalog");
                log_report("remove", &self.engine.remove_endpoints(removed).report().await);
            }
        }

        log_report("update", &self.engine.update_endpoints(desired).report().await);
        self.known = names;
    }
}

fn log_report(kind: &str, report: &ReconcileReport) {
    match &report.result {
        Ok(()) => tracing::info!(kind, events = report.events.len(), "Reconciliation complete"),
        Err(e) => tracing::error!(kind, events = report.events.len(), error = %e, "Reconciliation incomplete"),
    }
}
