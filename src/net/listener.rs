//! Listener lifecycle: bind, serve, close.
//!
//! # Responsibilities
//! - Bind a TCP listener for one `Bind` and serve a request handler on it
//! - Close it gracefully, bounded by a timeout
//! - Treat stopping an already-stopped listener as a no-op
//!
//! # Design Decisions
//! - Each listener is served on its own task; closing is signalled over a oneshot
//! - A dropped listener signals its server to stop
//! - Timeout on close aborts the serving task so the socket is always released

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::endpoint::Bind;
use crate::observability::metrics;

/// The request handler served by every listener.
pub type RequestHandler = Router;

static LISTENER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a listener, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        Self(LISTENER_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// A listener could not be started.
#[derive(Debug, Error)]
#[error("failed to bind {bind}: {source}")]
pub struct BindError {
    pub bind: Bind,
    #[source]
    pub source: std::io::Error,
}

/// A listener could not be cleanly released.
#[derive(Debug, Error)]
pub enum CloseError {
    #[error("{bind}: server did not close within {timeout:?}")]
    Timeout { bind: Bind, timeout: Duration },

    #[error("{bind}: server failed: {source}")]
    Serve {
        bind: Bind,
        #[source]
        source: std::io::Error,
    },

    #[error("{bind}: server task ended abnormally: {reason}")]
    Task { bind: Bind, reason: String },
}

impl CloseError {
    pub fn bind(&self) -> Bind {
        match self {
            CloseError::Timeout { bind, .. }
            | CloseError::Serve { bind, .. }
            | CloseError::Task { bind, .. } => *bind,
        }
    }
}

/// Handle to one live (or stopped) listener.
#[derive(Debug)]
pub struct Listener {
    id: ListenerId,
    bind: Bind,
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<std::io::Result<()>>>,
}

impl Listener {
    /// The bind this listener was started for.
    pub fn bind(&self) -> Bind {
        self.bind
    }

    /// The address actually bound (differs from `bind` only for port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// True while the server task is running and has not been told to stop.
    pub fn is_active(&self) -> bool {
        self.shutdown_tx.is_some() && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            metrics::listener_released();
            tracing::debug!(listener_id = %self.id, bind = %self.bind, "Listener dropped while active");
        }
    }
}

/// Starts and stops listeners.
#[derive(Debug, Clone)]
pub struct ListenerManager {
    close_timeout: Duration,
}

impl ListenerManager {
    pub fn new(close_timeout: Duration) -> Self {
        Self { close_timeout }
    }

    /// Bind a listener on `bind` and start serving `handler` on it.
    pub async fn start(&self, bind: Bind, handler: RequestHandler) -> Result<Listener, BindError> {
        let listener = match TcpListener::bind(bind.socket_addr()).await {
            Ok(listener) => listener,
            Err(source) => {
                metrics::listener_bind_failed();
                tracing::warn!(bind = %bind, error = %source, "Listener bind failed");
                return Err(BindError { bind, source });
            }
        };
        let local_addr = listener
            .local_addr()
            .map_err(|source| BindError { bind, source })?;

        let id = ListenerId::next();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = handler.into_make_service_with_connect_info::<SocketAddr>();

        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = &result {
                tracing::error!(listener_id = %id, address = %local_addr, error = %e, "Server exited with error");
            }
            result
        });

        metrics::listener_started();
        tracing::info!(listener_id = %id, bind = %bind, address = %local_addr, "Listener bound");

        Ok(Listener {
            id,
            bind,
            local_addr,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    /// Close `listener` if it is still active.
    ///
    /// Returns `Ok(Some(bind))` when a live listener was closed and `Ok(None)`
    /// when there was nothing to do.
    pub async fn stop(&self, listener: &mut Listener) -> Result<Option<Bind>, CloseError> {
        let bind = listener.bind;
        let (Some(shutdown_tx), Some(mut task)) = (listener.shutdown_tx.take(), listener.task.take())
        else {
            return Ok(None);
        };
        metrics::listener_released();

        if task.is_finished() {
            // Server already exited on its own; its error (if any) was logged there.
            tracing::debug!(listener_id = %listener.id, bind = %bind, "Listener already stopped");
            return Ok(None);
        }

        let _ = shutdown_tx.send(());

        let result = match tokio::time::timeout(self.close_timeout, &mut task).await {
            Ok(Ok(Ok(()))) => Ok(Some(bind)),
            Ok(Ok(Err(source))) => Err(CloseError::Serve { bind, source }),
            Ok(Err(join_error)) => Err(CloseError::Task {
                bind,
                reason: join_error.to_string(),
            }),
            Err(_) => {
                task.abort();
                let _ = task.await;
                Err(CloseError::Timeout {
                    bind,
                    timeout: self.close_timeout,
                })
            }
        };

        match &result {
            Ok(_) => {
                metrics::listener_stopped();
                tracing::info!(listener_id = %listener.id, bind = %bind, "Listener closed");
            }
            Err(e) => {
                metrics::listener_close_failed();
                tracing::warn!(listener_id = %listener.id, bind = %bind, error = %e, "Listener close failed");
            }
        }
        result
    }
}

impl Default for ListenerManager {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}
