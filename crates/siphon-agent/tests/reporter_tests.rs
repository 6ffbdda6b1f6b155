//! Integration tests for outcome reporting over the ingestion websocket

mod common;

use common::{spawn_ingestion, task, Reply};
use siphon_agent::{IngestMessage, ReportError, ReportSummary, Reporter};
use siphon_domain::{CompletedTask, Content, Distance, Extracted, Feature, TaskOutcome};
use siphon_store::TaskStore;
use std::sync::Arc;
use std::time::Duration;

/// Store holding one finished task with the given outcome
fn store_with(outcome: CompletedTask) -> Arc<TaskStore> {
    let store = Arc::new(TaskStore::new());
    store.add_tasks([task(&outcome.task_id, "echo", "file:///tmp/in.txt")]);
    store.get_runnable_tasks();
    store.complete(outcome).unwrap();
    store
}

fn success(task_id: &str) -> CompletedTask {
    let chunk = Content::from_text("hello")
        .with_features(vec![Feature::embedding("vec", vec![0.5, 1.5], Distance::Cosine)]);
    CompletedTask::from_extracted(
        task_id,
        vec![
            Extracted::Content(chunk),
            Extracted::Feature(Feature::metadata("meta", serde_json::json!({"pages": 2}))),
        ],
    )
}

#[tokio::test]
async fn test_success_ack_removes_task() {
    let (url, server) = spawn_ingestion(1, Reply::Ack(r#"{"Ok": null}"#)).await;
    let store = store_with(success("t1"));
    let reporter = Reporter::new(Arc::clone(&store), url, "agent-1", 2);

    let summary = reporter.report_finished().await;

    assert_eq!(summary, ReportSummary { reported: 1, retried: 0, dropped: 0 });
    assert!(store.is_empty());

    let reports = server.await.unwrap();
    let messages = &reports[0];
    match &messages[0] {
        IngestMessage::BeginExtractedContentIngest(begin) => {
            assert_eq!(begin.task_id, "t1");
            assert_eq!(begin.executor_id, "agent-1");
            assert_eq!(begin.parent_content_id, "content-t1");
            assert_eq!(begin.task_outcome, TaskOutcome::Success);
        }
        other => panic!("unexpected first message: {other:?}"),
    }

    // "hello" in frames of two bytes
    let frames: Vec<u8> = messages
        .iter()
        .filter_map(|m| match m {
            IngestMessage::MultipartContentFrame { bytes } => Some(bytes.clone()),
            _ => None,
        })
        .flatten()
        .collect();
    assert_eq!(frames, b"hello");

    assert!(messages.contains(&IngestMessage::MultipartContentFeature {
        name: "vec".to_string(),
        values: vec![0.5, 1.5],
    }));
    assert!(messages.iter().any(|m| matches!(
        m,
        IngestMessage::ExtractedFeatures { content_id, features } if content_id == "content-t1" && features[0].name == "meta"
    )));
    assert_eq!(
        messages.last(),
        Some(&IngestMessage::FinishExtractedContentIngest { num_extracted_content: 1 })
    );
}

#[tokio::test]
async fn test_normal_close_counts_as_delivered() {
    let (url, server) = spawn_ingestion(1, Reply::CloseNormal).await;
    let store = store_with(success("t1"));
    let reporter = Reporter::new(Arc::clone(&store), url, "agent-1", 1024);

    let summary = reporter.report_finished().await;

    assert_eq!(summary.reported, 1);
    assert!(store.is_empty());
    server.await.unwrap();
}

#[tokio::test]
async fn test_error_ack_retries_as_failed() {
    let (url, server) = spawn_ingestion(2, Reply::Ack(r#"{"Error": "table missing"}"#)).await;
    let store = store_with(success("t1"));
    let reporter = Reporter::new(Arc::clone(&store), url, "agent-1", 1024);

    let first = reporter.report_finished().await;
    assert_eq!(first.retried, 1);
    let (_, outcome) = store.finished_tasks().pop().unwrap();
    assert_eq!(outcome.outcome, TaskOutcome::Failed);

    let second = reporter.report_finished().await;
    assert_eq!(second.dropped, 1);
    assert!(store.is_empty());

    // The retry carries only the header and the finish marker
    let reports = server.await.unwrap();
    assert_eq!(reports[1].len(), 2);
    assert_eq!(
        reports[1][1],
        IngestMessage::FinishExtractedContentIngest { num_extracted_content: 0 }
    );
}

#[tokio::test]
async fn test_dropped_connection_twice_drops_task() {
    let (url, server) = spawn_ingestion(2, Reply::Drop).await;
    let store = store_with(success("t1"));
    let reporter = Reporter::new(Arc::clone(&store), url, "agent-1", 1024);

    assert_eq!(reporter.report_finished().await.retried, 1);
    assert_eq!(store.len(), 1);

    assert_eq!(reporter.report_finished().await.dropped, 1);
    assert!(store.is_empty());
    server.await.unwrap();
}

#[tokio::test]
async fn test_silent_endpoint_times_out_into_retry() {
    let (url, _server) = spawn_ingestion(2, Reply::Silent).await;
    let store = store_with(success("t1"));
    let reporter =
        Reporter::new(Arc::clone(&store), url, "agent-1", 1024).with_timeout(Duration::from_millis(300));

    let first = tokio::time::timeout(Duration::from_secs(5), reporter.report_finished())
        .await
        .expect("report pass hung on a silent endpoint");
    assert_eq!(first, ReportSummary { reported: 0, retried: 1, dropped: 0 });
    assert_eq!(store.len(), 1);

    let second = tokio::time::timeout(Duration::from_secs(5), reporter.report_finished())
        .await
        .expect("report pass hung on a silent endpoint");
    assert_eq!(second.dropped, 1);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_report_timeout_error() {
    let (url, _server) = spawn_ingestion(1, Reply::Silent).await;
    let store = store_with(success("t1"));
    let reporter =
        Reporter::new(Arc::clone(&store), url, "agent-1", 1024).with_timeout(Duration::from_millis(200));
    let (task, outcome) = store.finished_tasks().pop().unwrap();

    let result = reporter.report(&task, &outcome).await;
    assert!(matches!(result, Err(ReportError::Timeout(d)) if d == Duration::from_millis(200)));
}

#[tokio::test]
async fn test_unreachable_endpoint_keeps_task_for_retry() {
    let store = store_with(CompletedTask::failed("t1"));
    let reporter = Reporter::new(Arc::clone(&store), "ws://127.0.0.1:1/write_content", "agent-1", 1024);

    let summary = reporter.report_finished().await;

    assert_eq!(summary, ReportSummary { reported: 0, retried: 1, dropped: 0 });
    assert_eq!(store.finished_tasks().len(), 1);
}

#[tokio::test]
async fn test_nothing_finished_reports_nothing() {
    let store = Arc::new(TaskStore::new());
    store.add_tasks([task("t1", "echo", "file:///tmp/in.txt")]);
    let reporter = Reporter::new(Arc::clone(&store), "ws://127.0.0.1:1/write_content", "agent-1", 1024);

    assert_eq!(reporter.report_finished().await, ReportSummary::default());
    assert_eq!(store.num_pending_tasks(), 1);
}
