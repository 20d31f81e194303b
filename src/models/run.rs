//! Named results of single long runs.
//!
//! A long run given a checkpoint name leaves a small record behind when it
//! succeeds, so its output can be read back after the call returns. File
//! location: `<checkpoint_dir>/runs/<name>.yaml`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::checkpoint::CheckpointRecord;
use crate::models::execution::ExecutionResult;

/// Leading characters of the code kept in a run record
pub const RUN_CODE_CHARS: usize = 500;
/// Leading characters of stdout kept in a run record
pub const RUN_STDOUT_CHARS: usize = 2000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunCheckpoint {
    pub name: String,
    pub code: String,
    pub stdout: String,
    /// Execution time as reported by the remote, else the round trip
    pub execution_time_secs: f64,
    pub completed_at: DateTime<Utc>,
}

impl RunCheckpoint {
    pub fn from_run(name: &str, code: &str, result: &ExecutionResult) -> Self {
        let remote_secs = result
            .remote_state
            .as_deref()
            .and_then(|state| serde_json::from_str::<Value>(state).ok())
            .and_then(|state| state.get("execution_time_sec").and_then(Value::as_f64));
        Self {
            name: name.to_string(),
            code: leading_chars(code, RUN_CODE_CHARS),
            stdout: leading_chars(&result.stdout, RUN_STDOUT_CHARS),
            execution_time_secs: remote_secs.unwrap_or_else(|| result.elapsed.as_secs_f64()),
            completed_at: Utc::now(),
        }
    }
}

fn leading_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Whatever is stored under a checkpoint name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoredCheckpoint {
    Chunked(CheckpointRecord),
    Run(RunCheckpoint),
}

impl StoredCheckpoint {
    pub fn into_chunked(self) -> Option<CheckpointRecord> {
        match self {
            StoredCheckpoint::Chunked(record) => Some(record),
            StoredCheckpoint::Run(_) => None,
        }
    }

    pub fn into_run(self) -> Option<RunCheckpoint> {
        match self {
            StoredCheckpoint::Run(run) => Some(run),
            StoredCheckpoint::Chunked(_) => None,
        }
    }
}
