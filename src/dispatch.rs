//! Execution dispatcher
//!
//! Routes a request by tier: quick and long requests go straight to the
//! transport with the tier's timeout, chunked requests are handed to the
//! [`BatchRunner`]. Every request ends in one of three outcomes and none is
//! retried: re-running arbitrary code against a stateful runtime can repeat
//! its side effects, so that decision stays with the caller.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::chunked::{BatchRunner, ChunkedReport};
use crate::error::{BridgeError, CallError};
use crate::fs::CheckpointStore;
use crate::models::{ExecutionRequest, ExecutionResult, Tier, TierTable};
use crate::transport::RemoteExecutor;

/// Terminal state of a single quick/long request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed { reason: CallError },
    TimedOut { after_secs: f64 },
}

impl Outcome {
    fn classify(result: &ExecutionResult, timeout: Duration) -> Self {
        match &result.error {
            _ if result.success => Outcome::Succeeded,
            Some(err) if err.is_timeout() => Outcome::TimedOut {
                after_secs: timeout.as_secs_f64(),
            },
            Some(err) => Outcome::Failed {
                reason: err.clone(),
            },
            None => Outcome::Failed {
                reason: CallError::remote(200, "remote reported failure"),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded)
    }
}

/// Report for a quick or long request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub tier: Tier,
    pub timeout_secs: f64,
    pub outcome: Outcome,
    pub result: ExecutionResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance: Option<String>,
    /// Where the named result of a successful long run was stored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_saved: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Dispatched {
    Single(RunReport),
    Chunked(ChunkedReport),
}

pub struct Dispatcher<'a> {
    executor: &'a dyn RemoteExecutor,
    store: &'a CheckpointStore,
    tiers: &'a TierTable,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        executor: &'a dyn RemoteExecutor,
        store: &'a CheckpointStore,
        tiers: &'a TierTable,
    ) -> Self {
        Self {
            executor,
            store,
            tiers,
        }
    }

    /// Timeout that applies to one call of `request`.
    pub fn effective_timeout(&self, request: &ExecutionRequest) -> Duration {
        request
            .timeout
            .unwrap_or_else(|| self.tiers.policy(request.tier).timeout())
    }

    pub fn dispatch(&self, request: &ExecutionRequest) -> Result<Dispatched, BridgeError> {
        request.validate()?;
        let timeout = self.effective_timeout(request);
        if timeout.is_zero() {
            return Err(BridgeError::invalid(format!(
                "the {} tier has a zero timeout",
                request.tier
            )));
        }

        match (&request.chunk, request.tier) {
            (Some(spec), Tier::Chunked) => {
                let runner = BatchRunner::new(self.executor, self.store, timeout);
                runner.run(spec).map(Dispatched::Chunked)
            }
            _ => Ok(Dispatched::Single(self.run_single(request, timeout))),
        }
    }

    fn run_single(&self, request: &ExecutionRequest, timeout: Duration) -> RunReport {
        info!(
            tier = %request.tier,
            timeout_secs = timeout.as_secs_f64(),
            code_bytes = request.code.len(),
            "dispatching"
        );
        let result = self.executor.execute(&request.code, timeout);
        let outcome = Outcome::classify(&result, timeout);
        if !outcome.is_success() {
            warn!(tier = %request.tier, outcome = ?outcome, "request did not succeed");
        }
        let guidance = guidance_for(request.tier, &outcome);

        RunReport {
            tier: request.tier,
            timeout_secs: timeout.as_secs_f64(),
            outcome,
            result,
            guidance,
            checkpoint_saved: None,
        }
    }
}

fn guidance_for(tier: Tier, outcome: &Outcome) -> Option<String> {
    let text = match outcome {
        Outcome::Succeeded => return None,
        Outcome::TimedOut { .. } if tier == Tier::Quick => {
            "Timed out. Re-run with the long tier, or split the work with run_chunked. \
             The remote may still be running the code; check its state before re-running."
        }
        Outcome::TimedOut { .. } => {
            "Timed out. Split the work with run_chunked so progress is checkpointed per batch. \
             The remote may still be running the code; check its state before re-running."
        }
        Outcome::Failed {
            reason: CallError::Transport { .. },
        } => {
            "Remote unreachable. Check that the runtime is alive and the tunnel URL is current \
             (check_connection), then re-run."
        }
        Outcome::Failed {
            reason: CallError::Remote { .. },
        } => {
            "The remote reported an error. Its state may be partially modified; inspect it \
             before re-running."
        }
        Outcome::Failed {
            reason: CallError::InvalidRequest { .. },
        } => "The request was rejected locally; fix the input and re-run.",
    };
    Some(text.to_string())
}
