//! Status events produced by one reconciliation command.
//!
//! Every command gets its own [`EventStream`]. The stream yields progress
//! events and ends with exactly one terminal item: `Ok(StatusEvent::Ok)` or
//! an `Err`. Nothing is yielded after the terminal item.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::stream::{Stream, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::endpoint::{Bind, DesiredStateError};
use crate::net::BindError;

/// One human-readable outcome of a reconciliation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// A listener was bound.
    Listening(Bind),
    /// A listener was closed.
    Closed(Bind),
    /// A listener could not be closed cleanly. Teardown continued.
    CloseFailed { bind: Bind, reason: String },
    /// Terminal success marker.
    Ok,
}

impl StatusEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StatusEvent::Ok)
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusEvent::Listening(bind) => write!(f, "server is listening on {bind}"),
            StatusEvent::Closed(bind) => write!(f, "{bind} : server closed"),
            StatusEvent::CloseFailed { bind, reason } => {
                write!(f, "{bind} : server failed to close: {reason}")
            }
            StatusEvent::Ok => f.write_str("OK"),
        }
    }
}

/// Terminal failure of a reconciliation command.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Bind(#[from] BindError),

    #[error("invalid desired state: {}", join(.0))]
    InvalidDesiredState(Vec<DesiredStateError>),

    #[error("reconciliation engine stopped before the command completed")]
    Aborted,
}

fn join(errors: &[DesiredStateError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

pub type EventItem = Result<StatusEvent, ReconcileError>;

/// Create a connected sink/stream pair.
pub(crate) fn channel() -> (EventSink, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx }, EventStream { rx, done: false })
}

/// Producer half, owned by the engine while it runs one command.
///
/// Terminal items consume the sink, so nothing can follow them.
#[derive(Debug)]
pub(crate) struct EventSink {
    tx: mpsc::UnboundedSender<EventItem>,
}

impl EventSink {
    pub(crate) fn emit(&self, event: StatusEvent) {
        tracing::info!(event = %event, "Status");
        // A caller that dropped its stream no longer cares; the work still happens.
        let _ = self.tx.send(Ok(event));
    }

    pub(crate) fn finish(self) {
        let _ = self.tx.send(Ok(StatusEvent::Ok));
    }

    pub(crate) fn fail(self, error: ReconcileError) {
        tracing::error!(error = %error, "Reconciliation failed");
        let _ = self.tx.send(Err(error));
    }
}

/// Consumer half handed to the caller of an engine command.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<EventItem>,
    done: bool,
}

impl EventStream {
    /// Drain the stream to completion.
    pub async fn report(mut self) -> ReconcileReport {
        let mut events = Vec::new();
        while let Some(item) = self.next().await {
            match item {
                Ok(StatusEvent::Ok) => {
                    return ReconcileReport {
                        events,
                        result: Ok(()),
                    }
                }
                Ok(event) => events.push(event),
                Err(error) => {
                    return ReconcileReport {
                        events,
                        result: Err(error),
                    }
                }
            }
        }
        ReconcileReport {
            events,
            result: Err(ReconcileError::Aborted),
        }
    }
}

impl Stream for EventStream {
    type Item = EventItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(item)) => {
                if matches!(&item, Ok(event) if !event.is_terminal()) {
                    return Poll::Ready(Some(item));
                }
                self.done = true;
                self.rx.close();
                Poll::Ready(Some(item))
            }
            Poll::Ready(None) => {
                self.done = true;
                Poll::Ready(Some(Err(ReconcileError::Aborted)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Everything one command reported, minus the terminal `OK`.
#[derive(Debug)]
pub struct ReconcileReport {
    pub events: Vec<StatusEvent>,
    pub result: Result<(), ReconcileError>,
}

impl ReconcileReport {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Events rendered as status lines, with the terminal `OK` appended on success.
    pub fn lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.events.iter().map(ToString::to_string).collect();
        match &self.result {
            Ok(()) => lines.push(StatusEvent::Ok.to_string()),
            Err(e) => lines.push(e.to_string()),
        }
        lines
    }
}
