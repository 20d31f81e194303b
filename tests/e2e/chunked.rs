//! Chunked execution against the stub: batching, resume after failure,
//! idempotent replay.

use super::helpers::{bridge_for, StubRemote, StubReply};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tunnelrun::chunked::template::BatchTemplate;
use tunnelrun::models::{CheckpointStatus, StoredCheckpoint};
use tunnelrun::BridgeError;

#[test]
fn test_ten_items_in_batches_of_three() {
    let stub = StubRemote::start(|req| match req.path.as_str() {
        "/execute" => StubReply::echo(req),
        _ => StubReply::status(404, "not found"),
    });
    let temp = TempDir::new().unwrap();
    let bridge = bridge_for(&stub, &temp);

    let report = bridge
        .run_chunked(
            Some("ten-items".to_string()),
            BatchTemplate::new("process({start}, {end})"),
            10,
            3,
        )
        .unwrap();

    assert!(report.is_completed());
    assert_eq!(report.batch_count, 4);
    assert_eq!(report.batches_executed, 4);

    let codes: Vec<String> = stub.calls_to("/execute").iter().map(|r| r.code()).collect();
    assert_eq!(
        codes,
        vec![
            "process(0, 3)",
            "process(3, 6)",
            "process(6, 9)",
            "process(9, 10)"
        ]
    );
    assert_eq!(
        report.aggregate.output,
        "process(0, 3)\nprocess(3, 6)\nprocess(6, 9)\nprocess(9, 10)\n"
    );

    let record = bridge
        .get_checkpoint("ten-items")
        .unwrap()
        .and_then(StoredCheckpoint::into_chunked)
        .unwrap();
    let ranges: Vec<_> = record.completed_batches.iter().map(|b| b.range()).collect();
    assert_eq!(ranges, vec![0..3, 3..6, 6..9, 9..10]);
    assert_eq!(record.status, CheckpointStatus::Completed);
}

#[test]
fn test_failed_batch_resumes_without_repeating_earlier_batches() {
    let fail_third = Arc::new(AtomicBool::new(true));
    let flag = fail_third.clone();
    let stub = StubRemote::start(move |req| {
        if req.code() == "process(6, 9)" && flag.swap(false, Ordering::SeqCst) {
            return StubReply::json(json!({
                "success": false,
                "stdout": "",
                "error": "MemoryError: out of memory",
            }));
        }
        StubReply::echo(req)
    });
    let temp = TempDir::new().unwrap();
    let bridge = bridge_for(&stub, &temp);
    let template = BatchTemplate::new("process({start}, {end})");

    let first = bridge
        .run_chunked(Some("resume-me".to_string()), template.clone(), 10, 3)
        .unwrap();
    assert_eq!(first.status, CheckpointStatus::Failed);
    assert_eq!(first.batches_succeeded, 2);
    let failure = first.failed_batch.clone().unwrap();
    assert_eq!((failure.index, failure.start, failure.end), (2, 6, 9));
    assert!(first.guidance.unwrap().contains("same task id"));
    assert_eq!(stub.calls_to("/execute").len(), 3);

    let second = bridge
        .run_chunked(Some("resume-me".to_string()), template, 10, 3)
        .unwrap();
    assert!(second.is_completed());
    assert_eq!(second.batches_executed, 2);

    let codes: Vec<String> = stub.calls_to("/execute").iter().map(|r| r.code()).collect();
    assert_eq!(
        codes,
        vec![
            "process(0, 3)",
            "process(3, 6)",
            "process(6, 9)",
            "process(6, 9)",
            "process(9, 10)"
        ]
    );

    // Four batch entries, not six: the failed attempt was replaced in place
    let record = bridge
        .get_checkpoint("resume-me")
        .unwrap()
        .and_then(StoredCheckpoint::into_chunked)
        .unwrap();
    assert_eq!(record.completed_batches.len(), 4);
    assert!(record.completed_batches.iter().all(|b| b.success));
    assert_eq!(record.next_batch_index, 4);
}

#[test]
fn test_completed_task_replays_without_remote_calls() {
    let stub = StubRemote::start(StubReply::echo);
    let temp = TempDir::new().unwrap();
    let bridge = bridge_for(&stub, &temp);
    let template = BatchTemplate::new("total += x").with_loop_var("x");

    let first = bridge.run_chunked(None, template.clone(), 6, 2).unwrap();
    let calls_after_first = stub.requests().len();
    assert_eq!(calls_after_first, 3);
    assert!(first.task_id.starts_with("task-"));

    let again = bridge.run_chunked(None, template, 6, 2).unwrap();
    assert_eq!(stub.requests().len(), calls_after_first);
    assert!(again.replayed);
    assert_eq!(again.task_id, first.task_id);
    assert_eq!(again.aggregate, first.aggregate);
    assert!(stub.calls_to("/execute")[0]
        .code()
        .contains("for x in range(0, 2):\n    total += x"));
}

#[test]
fn test_setup_runs_only_with_first_batch() {
    let stub = StubRemote::start(StubReply::echo);
    let temp = TempDir::new().unwrap();
    let bridge = bridge_for(&stub, &temp);

    bridge
        .run_chunked(
            Some("with-setup".to_string()),
            BatchTemplate::new("acc.append({batch_index})").with_setup("acc = []"),
            4,
            2,
        )
        .unwrap();

    let codes: Vec<String> = stub.calls_to("/execute").iter().map(|r| r.code()).collect();
    assert!(codes[0].starts_with("acc = []"));
    assert!(!codes[1].contains("acc = []"));
}

#[test]
fn test_invalid_parameters_never_reach_remote() {
    let stub = StubRemote::start(StubReply::echo);
    let temp = TempDir::new().unwrap();
    let bridge = bridge_for(&stub, &temp);
    let template = BatchTemplate::new("f(i)");

    assert!(matches!(
        bridge.run_chunked(Some("too-big".to_string()), template.clone(), 5, 10),
        Err(BridgeError::InvalidRequest(_))
    ));
    assert!(matches!(
        bridge.run_chunked(Some("zero".to_string()), template.clone(), 5, 0),
        Err(BridgeError::InvalidRequest(_))
    ));
    assert!(matches!(
        bridge.run_quick("   "),
        Err(BridgeError::InvalidRequest(_))
    ));
    assert!(stub.requests().is_empty());
    assert!(bridge.get_checkpoint("too-big").unwrap().is_none());

    let empty = bridge
        .run_chunked(Some("nothing".to_string()), template, 0, 4)
        .unwrap();
    assert!(empty.is_completed());
    assert_eq!(empty.batch_count, 0);
    assert!(empty.aggregate.output.is_empty());
    assert!(stub.requests().is_empty());
}

#[test]
fn test_changed_parameters_for_existing_task_are_rejected() {
    let stub = StubRemote::start(StubReply::echo);
    let temp = TempDir::new().unwrap();
    let bridge = bridge_for(&stub, &temp);

    bridge
        .run_chunked(Some("fixed".to_string()), BatchTemplate::new("f(i)"), 4, 2)
        .unwrap();
    let calls = stub.requests().len();

    assert!(matches!(
        bridge.run_chunked(Some("fixed".to_string()), BatchTemplate::new("f(i)"), 4, 4),
        Err(BridgeError::InvalidRequest(_))
    ));
    assert!(matches!(
        bridge.run_chunked(Some("fixed".to_string()), BatchTemplate::new("g(i)"), 4, 2),
        Err(BridgeError::InvalidRequest(_))
    ));
    assert_eq!(stub.requests().len(), calls);
}
