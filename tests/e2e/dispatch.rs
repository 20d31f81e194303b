//! Quick and long tier execution over HTTP.

use super::helpers::{bridge_for, test_config, StubRemote, StubReply};
use serde_json::json;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tunnelrun::dispatch::Outcome;
use tunnelrun::models::{StoredCheckpoint, Tier, TierPolicy};
use tunnelrun::{Bridge, CallError};

#[test]
fn test_quick_run_succeeds_and_sends_tier_timeout() {
    let stub = StubRemote::start(|req| {
        StubReply::json(json!({
            "success": true,
            "stdout": format!("ran: {}\n", req.code()),
            "execution_time_sec": 0.2,
            "memory_after_gb": 9.5,
        }))
    });
    let temp = TempDir::new().unwrap();
    let bridge = bridge_for(&stub, &temp);

    let report = bridge.run_quick("print(6 * 7)").unwrap();
    assert_eq!(report.outcome, Outcome::Succeeded);
    assert_eq!(report.result.stdout, "ran: print(6 * 7)\n");
    assert!(report.result.remote_state.unwrap().contains("memory_after_gb"));
    assert!(report.guidance.is_none());

    let calls = stub.calls_to("/execute");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].method, "POST");
    assert_eq!(calls[0].timeout_field(), Some(2));
}

#[test]
fn test_long_run_honours_timeout_override() {
    let stub = StubRemote::start(StubReply::echo);
    let temp = TempDir::new().unwrap();
    let bridge = bridge_for(&stub, &temp);

    bridge.run_long("train()", None, None).unwrap();
    bridge
        .run_long("train()", Some(Duration::from_millis(2500)), None)
        .unwrap();

    let timeouts: Vec<_> = stub
        .calls_to("/execute")
        .iter()
        .map(|r| r.timeout_field())
        .collect();
    assert_eq!(timeouts, vec![Some(5), Some(3)]);
}

#[test]
fn test_named_long_run_leaves_readable_checkpoint() {
    let stub = StubRemote::start(|_| {
        StubReply::json(json!({
            "success": true,
            "stdout": "accuracy 0.93\n".repeat(300),
            "execution_time_sec": 41.5,
        }))
    });
    let temp = TempDir::new().unwrap();
    let bridge = bridge_for(&stub, &temp);
    let code = format!("model.fit(X, y)\n{}", "# tune\n".repeat(100));

    let report = bridge.run_long(&code, None, Some("train-model")).unwrap();
    let saved = report.checkpoint_saved.unwrap();
    assert!(saved.exists());

    let run = bridge
        .get_checkpoint("train-model")
        .unwrap()
        .and_then(StoredCheckpoint::into_run)
        .unwrap();
    assert_eq!(run.name, "train-model");
    assert_eq!(run.code.chars().count(), 500);
    assert!(code.starts_with(&run.code));
    assert_eq!(run.stdout.chars().count(), 2000);
    assert!(run.stdout.starts_with("accuracy 0.93\n"));
    assert_eq!(run.execution_time_secs, 41.5);

    assert!(bridge.clear_checkpoint("train-model").unwrap());
    assert!(bridge.get_checkpoint("train-model").unwrap().is_none());
}

#[test]
fn test_slow_remote_times_out_within_bound() {
    let stub = StubRemote::start(|req| StubReply::echo(req).after(Duration::from_secs(6)));
    let temp = TempDir::new().unwrap();
    let mut config = test_config(&stub.url, &temp);
    config.tiers.set(Tier::Quick, TierPolicy::from_secs(1));
    let bridge = Bridge::new(config).unwrap();

    let started = Instant::now();
    let report = bridge.run_quick("while True: pass").unwrap();
    let waited = started.elapsed();

    assert!(matches!(report.outcome, Outcome::TimedOut { .. }));
    assert!(report.guidance.unwrap().contains("long tier"));
    // tier timeout (1s) + grace (1s), plus scheduling slack
    assert!(waited < Duration::from_secs(4), "waited {waited:?}");
}

#[test]
fn test_remote_error_status_is_failed_with_truncated_body() {
    let long_trace = "Traceback: ".to_string() + &"x".repeat(2000);
    let stub = StubRemote::start(move |_| StubReply::status(500, &long_trace));
    let temp = TempDir::new().unwrap();
    let bridge = bridge_for(&stub, &temp);

    let report = bridge.run_quick("1 / 0").unwrap();
    match report.outcome {
        Outcome::Failed {
            reason: CallError::Remote { status, body, .. },
        } => {
            assert_eq!(status, 500);
            assert!(body.starts_with("Traceback: "));
            assert!(body.chars().count() <= 500);
        }
        other => panic!("expected remote failure, got {other:?}"),
    }
    assert_eq!(stub.requests().len(), 1);
}

#[test]
fn test_failure_payload_is_failed_not_timed_out() {
    let stub = StubRemote::start(|_| {
        StubReply::json(json!({
            "success": false,
            "stdout": "partial\n",
            "error": "NameError: name 'df' is not defined",
        }))
    });
    let temp = TempDir::new().unwrap();
    let bridge = bridge_for(&stub, &temp);

    let report = bridge.run_long("df.head()", None, None).unwrap();
    assert!(matches!(
        report.outcome,
        Outcome::Failed {
            reason: CallError::Remote { status: 200, .. }
        }
    ));
    assert_eq!(report.result.stdout, "partial\n");
}

#[test]
fn test_remote_enforced_timeout_is_timed_out() {
    let stub = StubRemote::start(|_| {
        StubReply::json(json!({
            "success": false,
            "stdout": "epoch 1\n",
            "error": "TimeoutError: execution exceeded 2s",
        }))
    });
    let temp = TempDir::new().unwrap();
    let bridge = bridge_for(&stub, &temp);

    let report = bridge.run_quick("train()").unwrap();
    assert!(matches!(report.outcome, Outcome::TimedOut { .. }));
    assert!(report.guidance.unwrap().contains("long tier"));
    assert_eq!(report.result.stdout, "epoch 1\n");
}

#[test]
fn test_failure_after_full_budget_is_timed_out() {
    let stub = StubRemote::start(|_| {
        StubReply::json(json!({
            "success": false,
            "error": "KeyboardInterrupt",
            "execution_time_sec": 5.0,
        }))
    });
    let temp = TempDir::new().unwrap();
    let bridge = bridge_for(&stub, &temp);

    let report = bridge.run_long("train()", None, None).unwrap();
    assert!(matches!(report.outcome, Outcome::TimedOut { .. }));
    assert!(report.guidance.unwrap().contains("run_chunked"));
}

#[test]
fn test_unreachable_remote_is_failed_transport() {
    let temp = TempDir::new().unwrap();
    let bridge = Bridge::new(test_config("http://127.0.0.1:9", &temp)).unwrap();

    let report = bridge.run_quick("print(1)").unwrap();
    assert!(matches!(
        report.outcome,
        Outcome::Failed {
            reason: CallError::Transport {
                timed_out: false,
                ..
            }
        }
    ));
    assert!(!bridge.check_connection().connected);
}
