//! Integration tests for registration and the heartbeat stream

mod common;

use common::{eventually, task, MockCoordinator};
use siphon_agent::{AgentError, HeartbeatClient};
use siphon_domain::ExtractorDescription;
use siphon_grpc::proto;
use siphon_store::TaskStore;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const TICK: Duration = Duration::from_millis(50);

fn client(store: &Arc<TaskStore>, uri: String) -> HeartbeatClient {
    HeartbeatClient::new(
        Arc::clone(store),
        uri,
        "agent-1",
        "10.0.0.5:9000",
        vec![
            ExtractorDescription::new("echo", "0.1.0", "echo"),
            ExtractorDescription::new("chunker", "0.1.0", "chunker"),
        ],
    )
    .with_timing(TICK, TICK)
}

#[tokio::test]
async fn test_registers_and_receives_tasks() {
    let mut coordinator = MockCoordinator::with_tasks(&[
        task("t1", "echo", "file:///tmp/a"),
        task("t2", "chunker", "file:///tmp/b"),
    ]);
    // Tasks without content metadata are skipped, not fatal
    coordinator.tasks.push(proto::Task {
        id: "broken".to_string(),
        extractor: "echo".to_string(),
        ..Default::default()
    });
    let addr = coordinator.spawn().await;

    let store = Arc::new(TaskStore::new());
    let heartbeat = client(&store, format!("http://{addr}"));
    let (stop_tx, stop_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { heartbeat.run(stop_rx).await });

    eventually(|| store.len() == 2).await;
    // The same assignments arrive on every response
    eventually(|| coordinator.heartbeats.lock().unwrap().len() >= 4).await;
    assert_eq!(store.len(), 2);
    assert!(store.get_task("broken").is_none());

    {
        let registrations = coordinator.registrations.lock().unwrap();
        let first = &registrations[0];
        assert_eq!(first.executor_id, "agent-1");
        assert_eq!(first.addr, "10.0.0.5:9000");
        let names: Vec<_> = first.extractors.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["echo", "chunker"]);
    }

    let heartbeats = coordinator.heartbeats.lock().unwrap().clone();
    assert!(heartbeats.iter().all(|h| h.executor_id == "agent-1"));
    assert_eq!(heartbeats.last().map(|h| h.pending_tasks), Some(2));

    stop_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_reregisters_after_heartbeat_failure() {
    let coordinator = MockCoordinator::with_tasks(&[task("t1", "echo", "file:///tmp/a")]);
    coordinator.reject_heartbeats.store(1, Ordering::SeqCst);
    let addr = coordinator.spawn().await;

    let store = Arc::new(TaskStore::new());
    let heartbeat = client(&store, format!("http://{addr}"));
    let (stop_tx, stop_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { heartbeat.run(stop_rx).await });

    eventually(|| store.len() == 1).await;
    assert!(coordinator.registrations() >= 2);

    stop_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_reregisters_after_unanswered_registration() {
    let coordinator = MockCoordinator::with_tasks(&[task("t1", "echo", "file:///tmp/a")]);
    coordinator.stall_registrations.store(1, Ordering::SeqCst);
    let addr = coordinator.spawn().await;

    let store = Arc::new(TaskStore::new());
    let heartbeat = client(&store, format!("http://{addr}")).with_request_timeout(Duration::from_millis(300));
    let (stop_tx, stop_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { heartbeat.run(stop_rx).await });

    eventually(|| store.len() == 1).await;
    assert!(coordinator.registrations() >= 2);

    stop_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_unanswered_registration_fails_session() {
    let coordinator = MockCoordinator::default();
    coordinator.stall_registrations.store(usize::MAX, Ordering::SeqCst);
    let addr = coordinator.spawn().await;

    let store = Arc::new(TaskStore::new());
    let heartbeat = client(&store, format!("http://{addr}")).with_request_timeout(Duration::from_millis(200));

    let result = tokio::time::timeout(Duration::from_secs(5), heartbeat.session())
        .await
        .expect("session hung on an unanswered registration");
    assert!(matches!(result, Err(AgentError::Registration(_))));
}

#[tokio::test]
async fn test_session_fails_without_coordinator() {
    let store = Arc::new(TaskStore::new());
    let heartbeat = client(&store, "http://127.0.0.1:1".to_string());

    assert!(heartbeat.session().await.is_err());
}

#[tokio::test]
async fn test_unreachable_coordinator_stops_on_shutdown() {
    let store = Arc::new(TaskStore::new());
    let heartbeat = client(&store, "http://127.0.0.1:1".to_string());
    let (stop_tx, stop_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { heartbeat.run(stop_rx).await });

    tokio::time::sleep(TICK * 4).await;
    assert!(!handle.is_finished());

    stop_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    assert!(store.is_empty());
}
