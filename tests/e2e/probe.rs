//! Health, probe, cleanup and variable listing against the stub.

use super::helpers::{bridge_for, StubRemote, StubReply};
use serde_json::json;
use tempfile::TempDir;
use tunnelrun::chunked::template::BatchTemplate;
use tunnelrun::models::{CheckpointStatus, Tier};
use tunnelrun::BridgeError;

fn probe_stub(memory_available_gb: f64) -> StubRemote {
    StubRemote::start(move |req| match req.path.as_str() {
        "/probe" => StubReply::json(json!({
            "gpu_present": true,
            "gpu_memory": 15.0,
            "packages": ["numpy==1.26.4", {"name": "torch", "version": "2.3.0"}],
        })),
        "/health" => StubReply::json(json!({
            "status": "healthy",
            "uptime_minutes": 42.5,
            "memory_available_gb": memory_available_gb,
            "memory_used_pct": 61.0,
        })),
        _ => StubReply::status(404, "not found"),
    })
}

#[test]
fn test_low_memory_probe_recommends_reduced_batch() {
    let stub = probe_stub(2.0);
    let temp = TempDir::new().unwrap();
    let bridge = bridge_for(&stub, &temp);

    let report = bridge.probe_environment().unwrap();
    let floor = bridge.config().probe.memory_floor_gb;
    assert!(report.snapshot.memory_available_gb < floor);
    assert_eq!(
        report.recommendation.batch_size,
        bridge.config().probe.reduced_batch_size
    );
    assert_eq!(report.recommendation.tier, Tier::Quick);
    assert_eq!(report.snapshot.package_version("torch"), Some("2.3.0"));
    assert_eq!(report.snapshot.package_version("numpy"), Some("1.26.4"));
    assert_eq!(report.snapshot.memory_available_gb, 2.0);
    assert_eq!(stub.calls_to("/probe").len(), 1);
    assert_eq!(stub.calls_to("/health").len(), 1);
}

#[test]
fn test_sectioned_environment_payload_needs_no_health_call() {
    let stub = StubRemote::start(|req| match req.path.as_str() {
        "/probe" => StubReply::json(json!({
            "compute": {"cpu_count": 2, "ram_total_gb": 12.7, "ram_available_gb": 2.5},
            "gpu": {"available": false},
            "packages": {"numpy": "1.26.4", "torch": null},
            "limits": {"estimated_session_minutes_remaining": 20},
        })),
        _ => StubReply::status(404, "not found"),
    });
    let temp = TempDir::new().unwrap();
    let bridge = bridge_for(&stub, &temp);

    let report = bridge.probe_environment().unwrap();
    assert_eq!(report.snapshot.memory_available_gb, 2.5);
    assert_eq!(report.snapshot.memory_total_gb, 12.7);
    assert!(!report.snapshot.gpu_present);
    assert_eq!(report.snapshot.package_version("numpy"), Some("1.26.4"));
    assert_eq!(report.snapshot.package_version("torch"), None);
    assert_eq!(
        report.recommendation.batch_size,
        bridge.config().probe.reduced_batch_size
    );
    assert!(report
        .recommendation
        .notes
        .iter()
        .any(|n| n.contains("20 minutes")));
    assert!(stub.calls_to("/health").is_empty());
}

#[test]
fn test_missing_memory_everywhere_is_an_error() {
    let stub = StubRemote::start(|req| match req.path.as_str() {
        "/probe" => StubReply::json(json!({"gpu_present": false, "gpu_memory": 0, "packages": []})),
        "/health" => StubReply::json(json!({"status": "healthy", "uptime_minutes": 3.0})),
        _ => StubReply::status(404, "not found"),
    });
    let temp = TempDir::new().unwrap();
    let bridge = bridge_for(&stub, &temp);

    match bridge.probe_environment() {
        Err(BridgeError::Probe { reason }) => assert!(reason.contains("memory_available_gb")),
        other => panic!("expected probe error, got {other:?}"),
    }
}

#[test]
fn test_ample_memory_probe_keeps_base_batch() {
    let stub = probe_stub(10.0);
    let temp = TempDir::new().unwrap();
    let bridge = bridge_for(&stub, &temp);

    let report = bridge.probe_environment().unwrap();
    assert_eq!(report.recommendation.batch_size, 32);
    assert_eq!(report.recommendation.tier, Tier::Long);
}

#[test]
fn test_probe_http_error_yields_no_snapshot() {
    let stub = StubRemote::start(|_| StubReply::status(503, "starting up"));
    let temp = TempDir::new().unwrap();
    let bridge = bridge_for(&stub, &temp);

    match bridge.probe_environment() {
        Err(BridgeError::Probe { reason }) => assert!(reason.contains("503")),
        other => panic!("expected probe error, got {other:?}"),
    }
}

#[test]
fn test_check_connection_reports_health() {
    let stub = probe_stub(6.0);
    let temp = TempDir::new().unwrap();
    let bridge = bridge_for(&stub, &temp);

    let status = bridge.check_connection();
    assert!(status.connected);
    assert_eq!(status.base_url, stub.url);
    assert_eq!(status.uptime_minutes, Some(42.5));
    assert_eq!(status.memory_used_pct, Some(61.0));
    assert!(status.suggestion.is_none());
}

#[test]
fn test_check_connection_treats_unhealthy_status_as_disconnected() {
    let stub = StubRemote::start(|req| match req.path.as_str() {
        "/health" => StubReply::json(json!({"status": "unhealthy", "uptime_minutes": 300.0})),
        _ => StubReply::status(404, "not found"),
    });
    let temp = TempDir::new().unwrap();
    let bridge = bridge_for(&stub, &temp);

    let status = bridge.check_connection();
    assert!(!status.connected);
    assert_eq!(status.uptime_minutes, Some(300.0));
    assert!(status.error.unwrap().contains("unhealthy"));
    assert!(status.suggestion.is_some());
}

#[test]
fn test_cleanup_lists_unfinished_checkpoints() {
    let stub = StubRemote::start(|req| match req.path.as_str() {
        "/cleanup" => StubReply::json(json!({"memory_freed_mb": 812.5, "variables_cleared": 7})),
        "/execute" if req.code().contains("range(2, 4)") => StubReply::json(json!({
            "success": false,
            "stdout": "",
            "error": "KeyboardInterrupt",
        })),
        "/execute" => StubReply::echo(req),
        _ => StubReply::status(404, "not found"),
    });
    let temp = TempDir::new().unwrap();
    let bridge = bridge_for(&stub, &temp);

    bridge
        .run_chunked(Some("done".to_string()), BatchTemplate::new("f(i)"), 2, 2)
        .unwrap();
    bridge
        .run_chunked(Some("halted".to_string()), BatchTemplate::new("g(i)"), 4, 2)
        .unwrap();

    let report = bridge.cleanup().unwrap();
    assert_eq!(report.remote.freed_mb, 812.5);
    assert_eq!(report.remote.variables_cleared, Some(7));
    let stale: Vec<_> = report
        .stale_checkpoints
        .iter()
        .map(|s| (s.task_id.as_str(), s.status))
        .collect();
    assert_eq!(stale, vec![("halted", CheckpointStatus::Failed)]);
    assert_eq!(stub.calls_to("/cleanup")[0].method, "POST");
}

#[test]
fn test_list_variables_passes_payload_through() {
    let stub = StubRemote::start(|req| match req.path.as_str() {
        "/variables" => StubReply::json(json!({"df": "DataFrame (1000, 4)", "model": "Sequential"})),
        _ => StubReply::status(404, "not found"),
    });
    let temp = TempDir::new().unwrap();
    let bridge = bridge_for(&stub, &temp);

    let vars = bridge.list_variables().unwrap();
    assert_eq!(vars["df"], "DataFrame (1000, 4)");
}
