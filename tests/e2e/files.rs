//! File listing and download against the stub.

use super::helpers::{bridge_for, StubRemote, StubReply};
use serde_json::json;
use std::fs;
use tempfile::TempDir;
use tunnelrun::BridgeError;

fn file_stub() -> StubRemote {
    StubRemote::start(|req| match (req.path.as_str(), req.query.as_str()) {
        ("/files", _) => StubReply::json(json!([
            {"name": "model.pkl", "size": 2048},
            {"name": "metrics.csv", "size": 120},
        ])),
        ("/download", "path=%2Fcontent%2Fmodel.pkl") => StubReply::bytes(b"pickled-model-bytes"),
        ("/download", _) => StubReply::status(404, "no such file"),
        _ => StubReply::status(404, "not found"),
    })
}

#[test]
fn test_list_files_defaults_to_content_dir() {
    let stub = file_stub();
    let temp = TempDir::new().unwrap();
    let bridge = bridge_for(&stub, &temp);

    let files = bridge.list_files(None).unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].name, "model.pkl");
    assert_eq!(files[0].size, 2048);
    assert_eq!(stub.calls_to("/files")[0].query, "path=%2Fcontent");
}

#[test]
fn test_download_creates_save_dir_and_writes_file() {
    let stub = file_stub();
    let temp = TempDir::new().unwrap();
    let bridge = bridge_for(&stub, &temp);
    let save_dir = bridge.config().save_dir.clone();
    assert!(!save_dir.exists());

    let saved = bridge.download("/content/model.pkl", None).unwrap();
    assert_eq!(saved.local_path, save_dir.join("model.pkl"));
    assert_eq!(saved.size_bytes, 19);
    assert_eq!(fs::read(&saved.local_path).unwrap(), b"pickled-model-bytes");

    let renamed = bridge
        .download("/content/model.pkl", Some("best.pkl"))
        .unwrap();
    assert_eq!(renamed.local_path, save_dir.join("best.pkl"));
}

#[test]
fn test_missing_remote_file_is_download_error() {
    let stub = file_stub();
    let temp = TempDir::new().unwrap();
    let bridge = bridge_for(&stub, &temp);

    match bridge.download("/content/absent.bin", None) {
        Err(BridgeError::Download { reason }) => assert!(reason.contains("not found")),
        other => panic!("expected download error, got {other:?}"),
    }
    let save_dir = &bridge.config().save_dir;
    assert_eq!(fs::read_dir(save_dir).unwrap().count(), 0);
}
