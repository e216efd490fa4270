//! Endpoint reconciliation engine.
//!
//! # Responsibilities
//! - Own the mapping from endpoint name to its running listeners
//! - Diff each desired set against that mapping and start/stop listeners
//! - Report every action on the command's event stream
//!
//! # Diff Rules
//! ```text
//! no record for name            → spin up every bind
//! record equal to desired       → nothing
//! record differs (or partial)   → close old listeners, then spin up
//! record absent from desired    → kept, unless prune_missing is set
//! ```
//!
//! # Design Decisions
//! - One actor task owns the mapping; commands are processed FIFO
//! - Binds of one endpoint start concurrently; an endpoint's old listeners
//!   are closed before its new ones start
//! - The first bind failure ends the command; nothing is rolled back
//! - A dropped event stream does not cancel the command

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use futures_util::future::join_all;
use tokio::sync::{mpsc, oneshot};

use crate::config::EngineConfig;
use crate::endpoint::{validate_desired, Bind, Endpoint};
use crate::net::{BindError, Listener, ListenerManager, RequestHandler};
use crate::observability::metrics;
use crate::reconcile::events::{self, EventSink, EventStream, ReconcileError, StatusEvent};

/// Read-only view of one realized endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealizedEndpoint {
    /// The desired value the listeners were started for.
    pub endpoint: Endpoint,
    /// Binds whose listeners are currently active.
    pub binds: Vec<Bind>,
    /// False when some binds of `endpoint` failed to start.
    pub complete: bool,
}

enum Command {
    Update {
        desired: Vec<Endpoint>,
        sink: EventSink,
    },
    Remove {
        names: Vec<String>,
        sink: EventSink,
    },
    ShutdownAll {
        sink: EventSink,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<RealizedEndpoint>>,
    },
}

/// Handle to the reconciliation engine.
///
/// Cheap to clone; every clone talks to the same engine. The engine stops,
/// closing its listeners, once the last handle is dropped.
#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    commands: mpsc::UnboundedSender<Command>,
}

impl ReconciliationEngine {
    /// Spawn the engine. Must be called from within a Tokio runtime.
    pub fn new(config: EngineConfig, handler: RequestHandler) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let reconciler = Reconciler {
            records: HashMap::new(),
            listeners: ListenerManager::new(config.close_timeout()),
            handler,
            config,
        };
        tokio::spawn(reconciler.run(rx));
        Self { commands }
    }

    /// Converge the running listeners towards `desired`.
    pub fn update_endpoints(&self, desired: Vec<Endpoint>) -> EventStream {
        self.submit(|sink| Command::Update { desired, sink })
    }

    /// Shut down the named endpoints. Unknown names are ignored.
    pub fn remove_endpoints(&self, names: Vec<String>) -> EventStream {
        self.submit(|sink| Command::Remove { names, sink })
    }

    /// Shut down every realized endpoint.
    pub fn shutdown(&self) -> EventStream {
        self.submit(|sink| Command::ShutdownAll { sink })
    }

    /// Current realized endpoints, sorted by name.
    pub async fn snapshot(&self) -> Vec<RealizedEndpoint> {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Snapshot { reply }).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Every bind with an active listener, sorted.
    pub async fn active_binds(&self) -> Vec<Bind> {
        let mut binds: Vec<Bind> = self
            .snapshot()
            .await
            .into_iter()
            .flat_map(|realized| realized.binds)
            .collect();
        binds.sort();
        binds
    }

    fn submit(&self, command: impl FnOnce(EventSink) -> Command) -> EventStream {
        let (sink, stream) = events::channel();
        // On send failure the command (and its sink) is dropped, so the
        // stream reports `Aborted`.
        let _ = self.commands.send(command(sink));
        stream
    }
}

/// Association between the realized endpoint value and its listeners.
struct ListenerRecord {
    endpoint: Endpoint,
    listeners: Vec<Listener>,
    complete: bool,
}

struct Reconciler {
    records: HashMap<String, ListenerRecord>,
    listeners: ListenerManager,
    handler: RequestHandler,
    config: EngineConfig,
}

impl Reconciler {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        tracing::info!(
            prune_missing = self.config.prune_missing,
            node_ordering = ?self.config.node_ordering,
            "Reconciliation engine started"
        );

        while let Some(command) = commands.recv().await {
            match command {
                Command::Update { desired, sink } => {
                    let start = Instant::now();
                    let result = self.update(desired, &sink).await;
                    complete("update", start, result, sink);
                }
                Command::Remove { names, sink } => {
                    let start = Instant::now();
                    for name in names {
                        self.shut_down(&name, &sink).await;
                    }
                    complete("remove", start, Ok(()), sink);
                }
                Command::ShutdownAll { sink } => {
                    let start = Instant::now();
                    self.shut_down_all(&sink).await;
                    complete("shutdown", start, Ok(()), sink);
                }
                Command::Snapshot { reply } => {
                    let _ = reply.send(self.snapshot());
                }
            }
        }

        if !self.records.is_empty() {
            tracing::info!(endpoints = self.records.len(), "Engine handles dropped, releasing listeners");
        }
        tracing::info!("Reconciliation engine stopped");
    }

    async fn update(&mut self, desired: Vec<Endpoint>, sink: &EventSink) -> Result<(), ReconcileError> {
        validate_desired(&desired).map_err(ReconcileError::InvalidDesiredState)?;

        tracing::debug!(endpoints = desired.len(), "Reconciling desired endpoints");
        let names: HashSet<String> = desired.iter().map(|e| e.name.clone()).collect();

        let ordering = self.config.node_ordering;
        for endpoint in desired {
            match self.records.get_mut(&endpoint.name) {
                None => {}
                Some(record) if record.complete && record.endpoint.same_topology(&endpoint, ordering) => {
                    // Same listeners; keep the latest spelling of the endpoint.
                    record.endpoint = endpoint;
                    continue;
                }
                Some(record) => {
                    tracing::info!(
                        endpoint = %endpoint.name,
                        complete = record.complete,
                        "Endpoint changed, replacing listeners"
                    );
                    self.shut_down(&endpoint.name, sink).await;
                }
            }
            self.spin_up(endpoint, sink).await?;
        }

        if self.config.prune_missing {
            let mut stale: Vec<String> = self
                .records
                .keys()
                .filter(|name| !names.contains(*name))
                .cloned()
                .collect();
            stale.sort();
            for name in stale {
                tracing::info!(endpoint = %name, "Pruning endpoint absent from desired set");
                self.shut_down(&name, sink).await;
            }
        }

        Ok(())
    }

    /// Start every bind of `endpoint` and record the listeners that came up.
    async fn spin_up(&mut self, endpoint: Endpoint, sink: &EventSink) -> Result<(), BindError> {
        let results = join_all(
            endpoint
                .binds()
                .map(|bind| self.listeners.start(bind, self.handler.clone())),
        )
        .await;

        let mut listeners = Vec::with_capacity(results.len());
        let mut first_error = None;
        for result in results {
            match result {
                Ok(listener) => {
                    sink.emit(StatusEvent::Listening(listener.bind()));
                    listeners.push(listener);
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        let complete = first_error.is_none();
        if !listeners.is_empty() {
            if !complete {
                tracing::warn!(
                    endpoint = %endpoint.name,
                    started = listeners.len(),
                    expected = endpoint.bind_count(),
                    "Endpoint partially realized"
                );
            }
            self.records.insert(
                endpoint.name.clone(),
                ListenerRecord {
                    endpoint,
                    listeners,
                    complete,
                },
            );
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Close every listener of `name` and forget its record.
    async fn shut_down(&mut self, name: &str, sink: &EventSink) {
        let Some(mut record) = self.records.remove(name) else {
            tracing::debug!(endpoint = %name, "No listeners to shut down");
            return;
        };

        let manager = &self.listeners;
        let results = join_all(record.listeners.iter_mut().map(|l| manager.stop(l))).await;
        for result in results {
            match result {
                Ok(Some(bind)) => sink.emit(StatusEvent::Closed(bind)),
                Ok(None) => {}
                Err(e) => sink.emit(StatusEvent::CloseFailed {
                    bind: e.bind(),
                    reason: e.to_string(),
                }),
            }
        }
    }

    async fn shut_down_all(&mut self, sink: &EventSink) {
        let mut names: Vec<String> = self.records.keys().cloned().collect();
        names.sort();
        for name in names {
            self.shut_down(&name, sink).await;
        }
    }

    fn snapshot(&self) -> Vec<RealizedEndpoint> {
        let mut realized: Vec<RealizedEndpoint> = self
            .records
            .values()
            .map(|record| RealizedEndpoint {
                endpoint: record.endpoint.clone(),
                binds: record
                    .listeners
                    .iter()
                    .filter(|l| l.is_active())
                    .map(Listener::bind)
                    .collect(),
                complete: record.complete,
            })
            .collect();
        realized.sort_by(|a, b| a.endpoint.name.cmp(&b.endpoint.name));
        realized
    }
}

fn complete(kind: &'static str, start: Instant, result: Result<(), ReconcileError>, sink: EventSink) {
    match result {
        Ok(()) => {
            metrics::record_reconciliation(kind, "ok", start);
            sink.finish();
        }
        Err(e) => {
            metrics::record_reconciliation(kind, "error", start);
            sink.fail(e);
        }
    }
}
