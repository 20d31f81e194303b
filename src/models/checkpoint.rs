//! Checkpoint records for chunked tasks.
//!
//! A record is the durable progress of one task: which batches ran, what they
//! printed, and where to resume. File location:
//! `<checkpoint_dir>/<task-id>.yaml`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::error::CallError;
use crate::models::execution::ChunkSpec;

/// Lifecycle of a chunked task
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    InProgress,
    Completed,
    /// The batch at `next_batch_index` failed; a re-run retries it in place
    Failed,
}

impl std::fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointStatus::InProgress => write!(f, "in_progress"),
            CheckpointStatus::Completed => write!(f, "completed"),
            CheckpointStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of one batch as stored in the record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchRecord {
    pub index: u64,
    pub start: u64,
    pub end: u64,
    pub success: bool,
    /// Captured stdout of the batch
    #[serde(default)]
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CallError>,
    pub elapsed_secs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_state: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl BatchRecord {
    pub fn range(&self) -> Range<u64> {
        self.start..self.end
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckpointRecord {
    pub task_id: String,
    pub total_items: u64,
    pub batch_size: u64,
    /// Fingerprint of the batch template the task was started with
    pub template_digest: String,
    /// Append-only, except that a trailing failed entry is replaced when its
    /// batch is retried
    #[serde(default)]
    pub completed_batches: Vec<BatchRecord>,
    pub next_batch_index: u64,
    pub status: CheckpointStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Concatenated output of the successful batches of a record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregatedOutput {
    pub output: String,
    pub total_elapsed_secs: f64,
    pub batches: u64,
}

/// Summary row for listings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckpointSummary {
    pub task_id: String,
    pub status: CheckpointStatus,
    pub next_batch_index: u64,
    pub batch_count: u64,
    pub total_items: u64,
    pub updated_at: DateTime<Utc>,
}

impl CheckpointRecord {
    pub fn new(spec: &ChunkSpec) -> Self {
        let now = Utc::now();
        Self {
            task_id: spec.task_id.clone(),
            total_items: spec.total_items,
            batch_size: spec.batch_size,
            template_digest: spec.template.digest(),
            completed_batches: Vec::new(),
            next_batch_index: 0,
            status: CheckpointStatus::InProgress,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn batch_count(&self) -> u64 {
        self.total_items.div_ceil(self.batch_size.max(1))
    }

    /// Item range of a batch: `[index * batch_size, min(total, (index + 1) * batch_size))`
    pub fn batch_range(&self, index: u64) -> Range<u64> {
        let start = index.saturating_mul(self.batch_size).min(self.total_items);
        let end = index
            .saturating_add(1)
            .saturating_mul(self.batch_size)
            .min(self.total_items);
        start..end
    }

    /// Every item has been covered by a successful batch.
    pub fn is_exhausted(&self) -> bool {
        self.next_batch_index.saturating_mul(self.batch_size) >= self.total_items
    }

    /// Trailing failed entry awaiting an in-place retry, if any.
    pub fn pending_failure(&self) -> Option<&BatchRecord> {
        self.completed_batches
            .last()
            .filter(|b| !b.success && b.index == self.next_batch_index)
    }

    /// Whether the spec describes the same workload this record was started with.
    pub fn mismatch_with(&self, spec: &ChunkSpec) -> Option<String> {
        if self.total_items != spec.total_items {
            return Some(format!(
                "total_items was {} but is now {}",
                self.total_items, spec.total_items
            ));
        }
        if self.batch_size != spec.batch_size {
            return Some(format!(
                "batch_size was {} but is now {}",
                self.batch_size, spec.batch_size
            ));
        }
        if self.template_digest != spec.template.digest() {
            return Some("the batch template changed".to_string());
        }
        None
    }

    /// Record a successful batch and advance.
    pub fn record_success(&mut self, batch: BatchRecord) {
        self.place(batch);
        self.next_batch_index += 1;
        self.status = CheckpointStatus::InProgress;
        self.updated_at = Utc::now();
    }

    /// Record a failed batch without advancing, so a re-run retries it.
    pub fn record_failure(&mut self, batch: BatchRecord) {
        self.place(batch);
        self.status = CheckpointStatus::Failed;
        self.updated_at = Utc::now();
    }

    pub fn mark_completed(&mut self) {
        self.status = CheckpointStatus::Completed;
        self.updated_at = Utc::now();
    }

    fn place(&mut self, batch: BatchRecord) {
        if self.pending_failure().is_some() {
            if let Some(last) = self.completed_batches.last_mut() {
                *last = batch;
                return;
            }
        }
        self.completed_batches.push(batch);
    }

    pub fn aggregate(&self) -> AggregatedOutput {
        let successful = self.completed_batches.iter().filter(|b| b.success);
        let mut output = String::new();
        let mut total_elapsed_secs = 0.0;
        let mut batches = 0;
        for batch in successful {
            output.push_str(&batch.output);
            total_elapsed_secs += batch.elapsed_secs;
            batches += 1;
        }
        AggregatedOutput {
            output,
            total_elapsed_secs,
            batches,
        }
    }

    pub fn summary(&self) -> CheckpointSummary {
        CheckpointSummary {
            task_id: self.task_id.clone(),
            status: self.status,
            next_batch_index: self.next_batch_index,
            batch_count: self.batch_count(),
            total_items: self.total_items,
            updated_at: self.updated_at,
        }
    }

    /// Check the structural invariants of a loaded record.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("batch_size is zero".to_string());
        }

        let len = self.completed_batches.len() as u64;
        let trailing_failure = self.pending_failure().is_some();
        if len != self.next_batch_index && !(trailing_failure && len == self.next_batch_index + 1)
        {
            return Err(format!(
                "next_batch_index {} disagrees with {} recorded batches",
                self.next_batch_index, len
            ));
        }

        for (position, batch) in self.completed_batches.iter().enumerate() {
            let position = position as u64;
            if batch.index != position {
                return Err(format!(
                    "batch at position {position} has index {}",
                    batch.index
                ));
            }
            if position < self.next_batch_index && !batch.success {
                return Err(format!("batch {position} is behind the cursor but failed"));
            }
            if batch.range() != self.batch_range(position) {
                return Err(format!("batch {position} covers the wrong item range"));
            }
        }

        if self.next_batch_index > self.batch_count() {
            return Err(format!(
                "next_batch_index {} is past the last batch {}",
                self.next_batch_index,
                self.batch_count()
            ));
        }

        match self.status {
            CheckpointStatus::Completed if !self.is_exhausted() => {
                Err("marked completed with items remaining".to_string())
            }
            CheckpointStatus::Completed if trailing_failure => {
                Err("marked completed with a pending failed batch".to_string())
            }
            CheckpointStatus::Failed if !trailing_failure => {
                Err("marked failed without a failed batch".to_string())
            }
            _ => Ok(()),
        }
    }
}
