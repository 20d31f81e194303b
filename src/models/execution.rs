use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::chunked::template::BatchTemplate;
use crate::error::{BridgeError, CallError};
use crate::models::tier::Tier;
use crate::validation::validate_task_id;

/// Parameters of a chunked workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpec {
    pub task_id: String,
    pub template: BatchTemplate,
    pub total_items: u64,
    pub batch_size: u64,
}

impl ChunkSpec {
    /// Build a spec, deriving the task id from the workload when none is given.
    pub fn new(
        task_id: Option<String>,
        template: BatchTemplate,
        total_items: u64,
        batch_size: u64,
    ) -> Self {
        let task_id = task_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| template.derive_task_id(total_items, batch_size));
        Self {
            task_id,
            template,
            total_items,
            batch_size,
        }
    }

    /// Reject bad parameters before any remote call or checkpoint write.
    pub fn validate(&self) -> Result<(), BridgeError> {
        validate_task_id(&self.task_id).map_err(|e| BridgeError::invalid(e.to_string()))?;
        self.template.validate()?;

        if self.batch_size == 0 {
            return Err(BridgeError::invalid("batch_size must be greater than zero"));
        }
        if self.total_items > 0 && self.batch_size > self.total_items {
            return Err(BridgeError::invalid(format!(
                "batch_size {} exceeds total_items {}",
                self.batch_size, self.total_items
            )));
        }
        Ok(())
    }

    pub fn batch_count(&self) -> u64 {
        self.total_items.div_ceil(self.batch_size.max(1))
    }
}

/// A request accepted by the dispatcher. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub code: String,
    pub tier: Tier,
    /// Overrides the tier's configured timeout (per batch for chunked requests)
    pub timeout: Option<Duration>,
    pub chunk: Option<ChunkSpec>,
}

impl ExecutionRequest {
    pub fn quick(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            tier: Tier::Quick,
            timeout: None,
            chunk: None,
        }
    }

    pub fn long(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            tier: Tier::Long,
            timeout: None,
            chunk: None,
        }
    }

    pub fn chunked(spec: ChunkSpec) -> Self {
        Self {
            code: spec.template.body.clone(),
            tier: Tier::Chunked,
            timeout: None,
            chunk: Some(spec),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.code.trim().is_empty() {
            return Err(BridgeError::invalid("code must not be empty"));
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(BridgeError::invalid("timeout must be greater than zero"));
        }
        match (self.tier, &self.chunk) {
            (Tier::Chunked, None) => Err(BridgeError::invalid(
                "chunked requests need total_items and batch_size",
            )),
            (Tier::Quick | Tier::Long, Some(_)) => Err(BridgeError::invalid(format!(
                "chunk parameters are only valid for the chunked tier, not {}",
                self.tier
            ))),
            (Tier::Chunked, Some(spec)) => spec.validate(),
            _ => Ok(()),
        }
    }
}

/// Result of one remote execution call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CallError>,
    /// Wall-clock time of the round trip
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
    /// Opaque identifying info returned by the remote, kept for diagnostics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_state: Option<String>,
}

impl ExecutionResult {
    pub fn failure(error: CallError, elapsed: Duration) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            error: Some(error),
            elapsed,
            remote_state: None,
        }
    }
}

pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
