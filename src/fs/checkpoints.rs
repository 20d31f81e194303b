//! Checkpoint store
//!
//! One YAML file per task at `<checkpoint_dir>/<task-id>.yaml`, written
//! atomically, guarded by `<task-id>.lock` while a run advances it. Named
//! results of single runs live beside them under `runs/`.
//!
//! Lock files are never removed. Unlinking one while another process holds or
//! waits on it would let two writers lock different inodes for the same task.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::BridgeError;
use crate::fs::locking::{atomic_create, atomic_write, TaskLock};
use crate::models::{CheckpointRecord, CheckpointSummary, RunCheckpoint, StoredCheckpoint};
use crate::validation::validate_task_id;

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, BridgeError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| BridgeError::storage(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a task's record file.
    pub fn record_path(&self, task_id: &str) -> PathBuf {
        self.dir.join(format!("{task_id}.yaml"))
    }

    /// Path of a named run result.
    pub fn run_path(&self, name: &str) -> PathBuf {
        self.dir.join(RUNS_DIR).join(format!("{name}.yaml"))
    }

    fn lock_path(&self, task_id: &str) -> PathBuf {
        self.dir.join(format!("{task_id}.lock"))
    }

    /// Take the single-writer lock for a task.
    pub fn lock(&self, task_id: &str) -> Result<TaskLock, BridgeError> {
        check_id(task_id)?;
        TaskLock::try_acquire(&self.lock_path(task_id), task_id)
    }

    /// Persist a new record. Fails if one already exists for the task.
    pub fn create(&self, record: &CheckpointRecord) -> Result<PathBuf, BridgeError> {
        check_id(&record.task_id)?;
        let path = self.record_path(&record.task_id);
        atomic_create(&path, &serialize(record)?)?;
        debug!(task_id = %record.task_id, path = %path.display(), "checkpoint created");
        Ok(path)
    }

    /// Overwrite an existing record.
    pub fn save(&self, record: &CheckpointRecord) -> Result<PathBuf, BridgeError> {
        check_id(&record.task_id)?;
        let path = self.record_path(&record.task_id);
        atomic_write(&path, &serialize(record)?)?;
        debug!(
            task_id = %record.task_id,
            next_batch = record.next_batch_index,
            status = %record.status,
            "checkpoint saved"
        );
        Ok(path)
    }

    /// Read a record, or `None` if the task has none. Unparseable records and
    /// records that break their invariants are reported as corruption.
    pub fn load(&self, task_id: &str) -> Result<Option<CheckpointRecord>, BridgeError> {
        check_id(task_id)?;
        let path = self.record_path(task_id);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BridgeError::storage(&path, e)),
        };

        let record: CheckpointRecord =
            serde_yaml::from_str(&content).map_err(|e| BridgeError::CheckpointCorruption {
                task_id: task_id.to_string(),
                reason: format!("unreadable record at {}: {e}", path.display()),
            })?;

        if record.task_id != task_id {
            return Err(BridgeError::CheckpointCorruption {
                task_id: task_id.to_string(),
                reason: format!("file holds the record of task '{}'", record.task_id),
            });
        }
        record
            .check_invariants()
            .map_err(|reason| BridgeError::CheckpointCorruption {
                task_id: task_id.to_string(),
                reason,
            })?;

        Ok(Some(record))
    }

    pub fn exists(&self, task_id: &str) -> bool {
        validate_task_id(task_id).is_ok() && self.record_path(task_id).exists()
    }

    /// Store the result of a named single run, replacing any earlier one.
    pub fn save_run(&self, run: &RunCheckpoint) -> Result<PathBuf, BridgeError> {
        check_id(&run.name)?;
        let path = self.run_path(&run.name);
        let runs = self.dir.join(RUNS_DIR);
        fs::create_dir_all(&runs).map_err(|e| BridgeError::storage(&runs, e))?;
        let content =
            serde_yaml::to_string(run).map_err(|e| BridgeError::Serialization(e.to_string()))?;
        atomic_write(&path, &content)?;
        debug!(name = %run.name, path = %path.display(), "run result saved");
        Ok(path)
    }

    pub fn load_run(&self, name: &str) -> Result<Option<RunCheckpoint>, BridgeError> {
        check_id(name)?;
        let path = self.run_path(name);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BridgeError::storage(&path, e)),
        };
        let run: RunCheckpoint =
            serde_yaml::from_str(&content).map_err(|e| BridgeError::CheckpointCorruption {
                task_id: name.to_string(),
                reason: format!("unreadable run result at {}: {e}", path.display()),
            })?;
        Ok(Some(run))
    }

    /// Whatever is stored under `name`. A chunked task record wins over a run
    /// result of the same name.
    pub fn load_any(&self, name: &str) -> Result<Option<StoredCheckpoint>, BridgeError> {
        if let Some(record) = self.load(name)? {
            return Ok(Some(StoredCheckpoint::Chunked(record)));
        }
        Ok(self.load_run(name)?.map(StoredCheckpoint::Run))
    }

    /// Summaries of every readable record, sorted by task id. Unreadable
    /// records are skipped with a warning.
    pub fn list(&self) -> Result<Vec<CheckpointSummary>, BridgeError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| BridgeError::storage(&self.dir, e))?;

        let mut summaries = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| BridgeError::storage(&self.dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("yaml") {
                continue;
            }
            let Some(task_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match self.load(task_id) {
                Ok(Some(record)) => summaries.push(record.summary()),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "skipping checkpoint"),
            }
        }

        summaries.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        Ok(summaries)
    }

    /// Discard the task record and run result stored under `task_id`. Refused
    /// while a run holds the task's lock. Returns whether anything was removed.
    pub fn delete(&self, task_id: &str) -> Result<bool, BridgeError> {
        let lock = self.lock(task_id)?;
        let mut removed = false;
        for path in [self.record_path(task_id), self.run_path(task_id)] {
            match fs::remove_file(&path) {
                Ok(()) => removed = true,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(BridgeError::storage(&path, e)),
            }
        }
        debug!(task_id, removed, lock = %lock.path().display(), "checkpoint deleted");
        Ok(removed)
    }
}

const RUNS_DIR: &str = "runs";

fn check_id(task_id: &str) -> Result<(), BridgeError> {
    validate_task_id(task_id).map_err(|e| BridgeError::invalid(e.to_string()))
}

fn serialize(record: &CheckpointRecord) -> Result<String, BridgeError> {
    serde_yaml::to_string(record).map_err(|e| BridgeError::Serialization(e.to_string()))
}
