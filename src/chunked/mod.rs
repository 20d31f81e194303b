//! Chunked batch runner
//!
//! Drives a workload of `total_items` through the stateful remote runtime one
//! batch at a time. Progress is checkpointed after every batch so a later run
//! with the same task id resumes where the last one stopped:
//!
//! - no record: create one and start at batch 0
//! - `completed`: return the stored result without touching the remote
//! - `in_progress` / `failed`: resume at `next_batch_index`
//!
//! A failed batch is recorded but not counted as done, and the run stops
//! there. Nothing is retried automatically.

pub mod template;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{BridgeError, CallError};
use crate::fs::CheckpointStore;
use crate::models::{
    AggregatedOutput, BatchRecord, CheckpointRecord, CheckpointStatus, ChunkSpec,
};
use crate::transport::RemoteExecutor;

/// The batch that stopped a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub index: u64,
    pub start: u64,
    pub end: u64,
    pub error: CallError,
}

/// Result of one invocation of the runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkedReport {
    pub task_id: String,
    pub status: CheckpointStatus,
    pub total_items: u64,
    pub batch_size: u64,
    pub batch_count: u64,
    pub batches_succeeded: u64,
    /// Batches sent to the remote during this invocation
    pub batches_executed: u64,
    /// True when a completed record was returned without running anything
    pub replayed: bool,
    pub aggregate: AggregatedOutput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_batch: Option<BatchFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance: Option<String>,
}

impl ChunkedReport {
    fn from_record(record: &CheckpointRecord, batches_executed: u64, replayed: bool) -> Self {
        let failed_batch = record.pending_failure().map(|b| BatchFailure {
            index: b.index,
            start: b.start,
            end: b.end,
            error: b
                .error
                .clone()
                .unwrap_or_else(|| CallError::remote(200, "batch failed")),
        });
        let guidance = failed_batch.as_ref().map(|failure| {
            let hint = if failure.error.is_timeout() {
                "lower batch_size or raise the chunked tier timeout, then re-run"
            } else {
                "fix the cause and re-run with the same task id"
            };
            format!(
                "Batch {} (items {}..{}) failed; {} of {} batches are done. To resume, {hint}; \
                 completed batches will not be executed again.",
                failure.index,
                failure.start,
                failure.end,
                record.next_batch_index,
                record.batch_count()
            )
        });

        Self {
            task_id: record.task_id.clone(),
            status: record.status,
            total_items: record.total_items,
            batch_size: record.batch_size,
            batch_count: record.batch_count(),
            batches_succeeded: record.next_batch_index,
            batches_executed,
            replayed,
            aggregate: record.aggregate(),
            failed_batch,
            guidance,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == CheckpointStatus::Completed
    }
}

pub struct BatchRunner<'a> {
    executor: &'a dyn RemoteExecutor,
    store: &'a CheckpointStore,
    /// Execution budget for each batch call
    batch_timeout: Duration,
}

impl<'a> BatchRunner<'a> {
    pub fn new(
        executor: &'a dyn RemoteExecutor,
        store: &'a CheckpointStore,
        batch_timeout: Duration,
    ) -> Self {
        Self {
            executor,
            store,
            batch_timeout,
        }
    }

    /// Run (or resume) the task described by `spec`.
    ///
    /// Invalid parameters, lock contention, corrupt records and local storage
    /// failures are `Err`. Remote failures produce an `Ok` report with status
    /// `failed`.
    pub fn run(&self, spec: &ChunkSpec) -> Result<ChunkedReport, BridgeError> {
        spec.validate()?;
        if self.batch_timeout.is_zero() {
            return Err(BridgeError::invalid("batch timeout must be greater than zero"));
        }

        // Held until this function returns: the whole read-modify-write cycle
        let _lock = self.store.lock(&spec.task_id)?;

        let mut record = match self.store.load(&spec.task_id)? {
            Some(record) => {
                if let Some(reason) = record.mismatch_with(spec) {
                    return Err(BridgeError::invalid(format!(
                        "task '{}' was started with different parameters ({reason}); \
                         clear its checkpoint or pick another task id",
                        spec.task_id
                    )));
                }
                record
            }
            None => {
                let record = CheckpointRecord::new(spec);
                self.store.create(&record)?;
                info!(
                    task_id = %spec.task_id,
                    total_items = spec.total_items,
                    batch_size = spec.batch_size,
                    batches = record.batch_count(),
                    "starting chunked task"
                );
                record
            }
        };

        if record.status == CheckpointStatus::Completed {
            info!(task_id = %record.task_id, "task already completed, replaying stored result");
            return Ok(ChunkedReport::from_record(&record, 0, true));
        }
        if record.next_batch_index > 0 || record.status == CheckpointStatus::Failed {
            info!(
                task_id = %record.task_id,
                next_batch = record.next_batch_index,
                previous_status = %record.status,
                "resuming chunked task"
            );
        }

        let mut executed = 0;
        while !record.is_exhausted() {
            let index = record.next_batch_index;
            let range = record.batch_range(index);
            let code = spec.template.render(index, &range, index == 0);

            info!(
                task_id = %record.task_id,
                batch = index,
                start = range.start,
                end = range.end,
                "running batch"
            );
            let result = self.executor.execute(&code, self.batch_timeout);
            executed += 1;

            let batch = batch_record(index, &range, &result);
            if result.success {
                record.record_success(batch);
                self.store.save(&record)?;
            } else {
                warn!(
                    task_id = %record.task_id,
                    batch = index,
                    error = ?result.error,
                    "batch failed, stopping"
                );
                record.record_failure(batch);
                self.store.save(&record)?;
                return Ok(ChunkedReport::from_record(&record, executed, false));
            }
        }

        record.mark_completed();
        self.store.save(&record)?;
        info!(
            task_id = %record.task_id,
            batches = record.batch_count(),
            executed,
            "chunked task completed"
        );
        Ok(ChunkedReport::from_record(&record, executed, false))
    }
}

fn batch_record(
    index: u64,
    range: &Range<u64>,
    result: &crate::models::ExecutionResult,
) -> BatchRecord {
    let error = if result.success {
        None
    } else {
        Some(
            result
                .error
                .clone()
                .unwrap_or_else(|| CallError::remote(200, "remote reported failure")),
        )
    };
    BatchRecord {
        index,
        start: range.start,
        end: range.end,
        success: result.success,
        output: result.stdout.clone(),
        error,
        elapsed_secs: result.elapsed.as_secs_f64(),
        remote_state: result.remote_state.clone(),
        finished_at: Utc::now(),
    }
}
