//! Concurrency tests for siphon-store
//!
//! The heartbeat, runner and reporter loops hit one store from different
//! threads. These tests drive all three at once and check that no task is
//! duplicated or lost.

use siphon_domain::{CompletedTask, ContentRef, Task};
use siphon_store::TaskStore;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread;

fn task(id: usize) -> Task {
    Task {
        id: format!("task-{id}"),
        extractor: "echo".to_string(),
        namespace: "default".to_string(),
        content: ContentRef {
            id: format!("content-{id}"),
            storage_url: format!("file:///tmp/{id}.txt"),
            mime: "text/plain".to_string(),
            labels: HashMap::new(),
        },
        input_params: None,
        output_index_mapping: HashMap::new(),
        extraction_policy: "policy".to_string(),
    }
}

#[test]
fn test_three_loops_share_store() {
    let store = Arc::new(TaskStore::new());
    const TOTAL: usize = 500;

    // Heartbeat: pushes small batches
    let producer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for start in (0..TOTAL).step_by(10) {
                store.add_tasks((start..start + 10).map(task));
            }
        })
    };

    // Runner: promotes and completes
    let runner = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            let mut seen = HashSet::new();
            while seen.len() < TOTAL {
                for t in store.get_runnable_tasks() {
                    assert!(seen.insert(t.id.clone()), "task {} ran twice", t.id);
                    store.complete(CompletedTask::from_extracted(t.id, vec![])).unwrap();
                }
                thread::yield_now();
            }
            seen
        })
    };

    // Reporter: drains finished outcomes
    let reporter = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            let mut reported = 0;
            while reported < TOTAL {
                for (task, _) in store.finished_tasks() {
                    store.mark_reported(&task.id).unwrap();
                    reported += 1;
                }
                thread::yield_now();
            }
            reported
        })
    };

    producer.join().unwrap();
    let ran = runner.join().unwrap();
    let reported = reporter.join().unwrap();

    assert_eq!(ran.len(), TOTAL);
    assert_eq!(reported, TOTAL);
    assert!(store.is_empty());
    assert_eq!(store.num_pending_tasks(), 0);
}

#[test]
fn test_pending_count_tracks_live_tasks() {
    let store = TaskStore::new();
    store.add_tasks((0..5).map(task));
    assert_eq!(store.num_pending_tasks(), 5);

    let running = store.get_runnable_tasks();
    assert_eq!(store.num_pending_tasks(), 5);

    store.complete(CompletedTask::failed(running[0].id.clone())).unwrap();
    assert_eq!(store.num_pending_tasks(), 4);

    store.add_tasks(vec![task(5)]);
    assert_eq!(store.num_pending_tasks(), 5);
}
