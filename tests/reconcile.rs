//! Reconciliation engine behaviour against real sockets.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::Notify;
use endpoint_router::config::EngineConfig;
use endpoint_router::{NodeOrdering, ReconcileError, ReconciliationEngine, StatusEvent};

mod common;

use common::{
    endpoint, engine, engine_with, free_port, is_listening, loopback, send_request, stalling_handler,
};

#[tokio::test]
async fn spin_up_binds_listener_and_reports() {
    let engine = engine();
    let port = free_port();

    let report = engine.update_endpoints(vec![endpoint("web", &[port])]).report().await;

    assert!(report.is_ok(), "{:?}", report.result);
    assert_eq!(
        report.lines(),
        vec![format!("server is listening on 127.0.0.1:{port}"), "OK".to_string()]
    );
    assert_eq!(engine.active_binds().await, vec![loopback(port)]);

    let response = reqwest::Client::builder()
        .no_proxy()
        .build()
        .unwrap()
        .get(format!("http://127.0.0.1:{port}/some/path"))
        .send()
        .await
        .expect("listener unreachable");
    assert_eq!(response.status(), 200);
    assert!(response.text().await.unwrap().is_empty());
}

#[tokio::test]
async fn stream_yields_events_then_terminal_ok_then_ends() {
    let engine = engine();
    let port = free_port();

    let mut stream = engine.update_endpoints(vec![endpoint("web", &[port])]);
    assert_eq!(stream.next().await.unwrap().unwrap(), StatusEvent::Listening(loopback(port)));
    assert_eq!(stream.next().await.unwrap().unwrap(), StatusEvent::Ok);
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn unchanged_desired_state_is_idempotent() {
    let engine = engine();
    let desired = vec![endpoint("web", &[free_port(), free_port()]), endpoint("api", &[free_port()])];

    let first = engine.update_endpoints(desired.clone()).report().await;
    assert!(first.is_ok());
    assert_eq!(first.events.len(), 3);

    let second = engine.update_endpoints(desired).report().await;
    assert!(second.is_ok());
    assert!(second.events.is_empty());
    assert_eq!(second.lines(), vec!["OK".to_string()]);
    assert_eq!(engine.active_binds().await.len(), 3);
}

#[tokio::test]
async fn changed_port_closes_old_before_opening_new() {
    let engine = engine();
    let (old, new) = (free_port(), free_port());

    assert!(engine.update_endpoints(vec![endpoint("web", &[old])]).report().await.is_ok());
    let report = engine.update_endpoints(vec![endpoint("web", &[new])]).report().await;

    assert!(report.is_ok());
    assert_eq!(
        report.events,
        vec![StatusEvent::Closed(loopback(old)), StatusEvent::Listening(loopback(new))]
    );
    assert_eq!(
        report.lines()[0],
        format!("127.0.0.1:{old} : server closed")
    );
    assert!(!is_listening(loopback(old)).await);
    assert!(is_listening(loopback(new)).await);
    assert_eq!(engine.active_binds().await, vec![loopback(new)]);
}

#[tokio::test]
async fn endpoints_absent_from_desired_set_are_retained() {
    let engine = engine();
    let (p1, p2) = (free_port(), free_port());

    let first = engine
        .update_endpoints(vec![endpoint("e1", &[p1]), endpoint("e2", &[p2])])
        .report()
        .await;
    assert!(first.is_ok());

    let second = engine.update_endpoints(vec![endpoint("e2", &[p2])]).report().await;
    assert!(second.is_ok());
    assert!(second.events.is_empty());

    // No automatic removal: e1 keeps listening until removed explicitly.
    assert!(is_listening(loopback(p1)).await);
    let names: Vec<String> = engine
        .snapshot()
        .await
        .into_iter()
        .map(|r| r.endpoint.name)
        .collect();
    assert_eq!(names, vec!["e1", "e2"]);
}

#[tokio::test]
async fn prune_missing_shuts_down_absent_endpoints() {
    let engine = engine_with(EngineConfig {
        prune_missing: true,
        ..EngineConfig::default()
    });
    let (p1, p2) = (free_port(), free_port());

    assert!(engine
        .update_endpoints(vec![endpoint("e1", &[p1]), endpoint("e2", &[p2])])
        .report()
        .await
        .is_ok());
    let report = engine.update_endpoints(vec![endpoint("e2", &[p2])]).report().await;

    assert!(report.is_ok());
    assert_eq!(report.events, vec![StatusEvent::Closed(loopback(p1))]);
    assert!(!is_listening(loopback(p1)).await);
    assert_eq!(engine.active_binds().await, vec![loopback(p2)]);
}

#[tokio::test]
async fn remove_endpoints_closes_named_endpoints_only() {
    let engine = engine();
    let (p1, p2) = (free_port(), free_port());
    assert!(engine
        .update_endpoints(vec![endpoint("e1", &[p1]), endpoint("e2", &[p2])])
        .report()
        .await
        .is_ok());

    let report = engine
        .remove_endpoints(vec!["e1".to_string(), "unknown".to_string()])
        .report()
        .await;

    assert!(report.is_ok());
    assert_eq!(report.events, vec![StatusEvent::Closed(loopback(p1))]);
    assert!(!is_listening(loopback(p1)).await);
    assert!(is_listening(loopback(p2)).await);
}

#[tokio::test]
async fn bind_failure_terminates_stream_without_rollback() {
    let engine = engine();
    let (ok_port, later_port) = (free_port(), free_port());
    let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let blocked_port = blocker.local_addr().unwrap().port();

    let report = engine
        .update_endpoints(vec![
            endpoint("first", &[ok_port]),
            endpoint("blocked", &[blocked_port]),
            endpoint("later", &[later_port]),
        ])
        .report()
        .await;

    match &report.result {
        Err(ReconcileError::Bind(e)) => assert_eq!(e.bind, loopback(blocked_port)),
        other => panic!("expected bind error, got {other:?}"),
    }
    assert_eq!(report.events, vec![StatusEvent::Listening(loopback(ok_port))]);
    assert!(is_listening(loopback(ok_port)).await);
    assert!(!is_listening(loopback(later_port)).await);
    assert_eq!(engine.active_binds().await, vec![loopback(ok_port)]);
}

#[tokio::test]
async fn partially_realized_endpoint_is_retried_on_next_update() {
    let engine = engine();
    let ok_port = free_port();
    let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let blocked_port = blocker.local_addr().unwrap().port();
    let desired = vec![endpoint("web", &[ok_port, blocked_port])];

    let first = engine.update_endpoints(desired.clone()).report().await;
    assert!(first.result.is_err());
    let snapshot = engine.snapshot().await;
    assert_eq!(snapshot.len(), 1);
    assert!(!snapshot[0].complete);
    assert_eq!(snapshot[0].binds, vec![loopback(ok_port)]);

    drop(blocker);
    let second = engine.update_endpoints(desired).report().await;
    assert!(second.is_ok(), "{:?}", second.result);
    assert_eq!(
        second.events,
        vec![
            StatusEvent::Closed(loopback(ok_port)),
            StatusEvent::Listening(loopback(ok_port)),
            StatusEvent::Listening(loopback(blocked_port)),
        ]
    );
    assert!(engine.snapshot().await[0].complete);
}

#[tokio::test]
async fn duplicate_names_are_rejected_before_any_action() {
    let engine = engine();
    let (p1, p2) = (free_port(), free_port());

    let report = engine
        .update_endpoints(vec![endpoint("dup", &[p1]), endpoint("dup", &[p2])])
        .report()
        .await;

    assert!(matches!(report.result, Err(ReconcileError::InvalidDesiredState(_))));
    assert!(report.events.is_empty());
    assert!(engine.active_binds().await.is_empty());
    assert!(!is_listening(loopback(p1)).await);
}

#[tokio::test]
async fn concurrent_disjoint_updates_realize_union() {
    let engine = engine();
    let a = endpoint("a", &[free_port(), free_port()]);
    let b = endpoint("b", &[free_port()]);
    let mut expected: Vec<_> = a.binds().chain(b.binds()).collect();
    expected.sort();

    let first = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.update_endpoints(vec![a]).report().await })
    };
    let second = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.update_endpoints(vec![b]).report().await })
    };
    let (first, second) = (first.await.unwrap(), second.await.unwrap());

    assert!(first.is_ok());
    assert!(second.is_ok());
    assert_eq!(engine.active_binds().await, expected);
    for bind in expected {
        assert!(is_listening(bind).await);
    }
}

#[tokio::test]
async fn racing_updates_to_one_name_leave_single_listener() {
    let engine = engine();
    let (p1, p2) = (free_port(), free_port());

    let first = engine.update_endpoints(vec![endpoint("web", &[p1])]);
    let second = engine.update_endpoints(vec![endpoint("web", &[p2])]);
    let (first, second) = tokio::join!(first.report(), second.report());

    assert!(first.is_ok());
    assert!(second.is_ok());
    assert_eq!(engine.active_binds().await, vec![loopback(p2)]);
    assert!(!is_listening(loopback(p1)).await);
}

#[tokio::test]
async fn dropped_stream_does_not_cancel_update() {
    let engine = engine();
    let port = free_port();

    drop(engine.update_endpoints(vec![endpoint("web", &[port])]));

    // Commands are processed in order, so the snapshot sees the update.
    assert_eq!(engine.active_binds().await, vec![loopback(port)]);
    assert!(is_listening(loopback(port)).await);
}

#[tokio::test]
async fn unordered_comparison_ignores_node_order() {
    let engine = engine_with(EngineConfig {
        node_ordering: NodeOrdering::Unordered,
        ..EngineConfig::default()
    });
    let mut desired = endpoint("web", &[free_port(), free_port()]);
    assert!(engine.update_endpoints(vec![desired.clone()]).report().await.is_ok());

    desired.nodes.reverse();
    let report = engine.update_endpoints(vec![desired.clone()]).report().await;
    assert!(report.is_ok());
    assert!(report.events.is_empty());
    assert_eq!(engine.snapshot().await[0].endpoint, desired);
}

#[tokio::test]
async fn strict_comparison_replaces_on_node_reorder() {
    let engine = engine();
    let mut desired = endpoint("web", &[free_port(), free_port()]);
    assert!(engine.update_endpoints(vec![desired.clone()]).report().await.is_ok());

    desired.nodes.reverse();
    let report = engine.update_endpoints(vec![desired]).report().await;
    assert!(report.is_ok());
    assert_eq!(report.events.len(), 4);
    assert!(matches!(report.events[0], StatusEvent::Closed(_)));
    assert!(matches!(report.events[1], StatusEvent::Closed(_)));
}

#[tokio::test]
async fn close_failure_is_reported_and_replacement_still_starts() {
    let entered = Arc::new(Notify::new());
    let engine = ReconciliationEngine::new(
        EngineConfig {
            close_timeout_secs: 1,
            ..EngineConfig::default()
        },
        stalling_handler(entered.clone()),
    );
    let (old, new) = (free_port(), free_port());
    assert!(engine.update_endpoints(vec![endpoint("web", &[old])]).report().await.is_ok());

    let _in_flight = send_request(loopback(old)).await;
    entered.notified().await;

    let report = engine.update_endpoints(vec![endpoint("web", &[new])]).report().await;

    assert!(report.is_ok(), "{:?}", report.result);
    assert_eq!(report.events.len(), 2);
    match &report.events[0] {
        StatusEvent::CloseFailed { bind, reason } => {
            assert_eq!(*bind, loopback(old));
            assert!(reason.contains("did not close"), "{reason}");
        }
        other => panic!("expected close failure, got {other:?}"),
    }
    assert_eq!(report.events[1], StatusEvent::Listening(loopback(new)));
    assert_eq!(report.lines().last().map(String::as_str), Some("OK"));
    assert!(!is_listening(loopback(old)).await);
    assert_eq!(engine.active_binds().await, vec![loopback(new)]);
}

#[tokio::test]
async fn shutdown_closes_every_listener() {
    let engine = engine();
    let desired = vec![endpoint("a", &[free_port()]), endpoint("b", &[free_port(), free_port()])];
    let binds: Vec<_> = desired.iter().flat_map(|e| e.binds()).collect();
    assert!(engine.update_endpoints(desired).report().await.is_ok());

    let report = tokio::time::timeout(Duration::from_secs(10), engine.shutdown().report())
        .await
        .unwrap();

    assert!(report.is_ok());
    assert_eq!(report.events.len(), 3);
    assert!(engine.snapshot().await.is_empty());
    for bind in binds {
        assert!(!is_listening(bind).await);
    }
}
