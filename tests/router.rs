//! End-to-end run loop: catalog file in, listeners out.

use std::sync::Arc;
use std::time::Duration;

use endpoint_router::catalog::{EndpointCatalog, FileStore, KeyPrefix};
use endpoint_router::lifecycle::{self, Shutdown};
use endpoint_router::RouterConfig;

mod common;

use common::{eventually, free_port, is_listening, loopback, scratch_dir};

const WAIT: Duration = Duration::from_secs(10);

fn config_for(path: &std::path::Path, watch: bool) -> RouterConfig {
    let mut config = RouterConfig::default();
    config.catalog.path = path.display().to_string();
    config.catalog.watch = watch;
    config
}

fn catalog_at(path: &std::path::Path) -> EndpointCatalog {
    EndpointCatalog::new(
        Arc::new(FileStore::open(path).unwrap()),
        KeyPrefix::new("HelloWorld", "ClusterWorld").unwrap(),
    )
}

#[tokio::test]
async fn realizes_catalog_and_closes_on_shutdown() {
    let path = scratch_dir("run").join("catalog.json");
    let port = free_port();
    catalog_at(&path)
        .add_endpoint("web", "n1", loopback(port), None)
        .unwrap();

    let shutdown = Shutdown::new();
    let router = tokio::spawn(lifecycle::run(config_for(&path, false), shutdown.clone()));

    assert!(eventually(WAIT, || is_listening(loopback(port))).await);

    shutdown.trigger();
    tokio::time::timeout(WAIT, router)
        .await
        .expect("router did not stop")
        .unwrap()
        .unwrap();
    assert!(!is_listening(loopback(port)).await);
}

#[tokio::test]
async fn follows_catalog_changes() {
    let path = scratch_dir("watch").join("catalog.json");
    let (first, second) = (free_port(), free_port());
    let catalog = catalog_at(&path);
    catalog.add_endpoint("web", "n1", loopback(first), None).unwrap();

    let shutdown = Shutdown::new();
    let router = tokio::spawn(lifecycle::run(config_for(&path, true), shutdown.clone()));
    assert!(eventually(WAIT, || is_listening(loopback(first))).await);

    catalog.add_endpoint("api", "n1", loopback(second), None).unwrap();
    assert!(eventually(WAIT, || is_listening(loopback(second))).await);

    // Deleting a service goes through the explicit removal path.
    assert!(catalog.delete_endpoint("web").unwrap());
    assert!(eventually(WAIT, move || async move { !is_listening(loopback(first)).await }).await);
    assert!(is_listening(loopback(second)).await);

    shutdown.trigger();
    tokio::time::timeout(WAIT, router)
        .await
        .expect("router did not stop")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn unreadable_catalog_fails_startup() {
    let path = scratch_dir("corrupt").join("catalog.json");
    std::fs::write(&path, "{ not json").unwrap();

    let result = lifecycle::run(config_for(&path, false), Shutdown::new()).await;
    assert!(matches!(result, Err(lifecycle::StartupError::Store(_))));
}
