//! Error taxonomy for the bridge.
//!
//! Two layers:
//! - [`CallError`] describes why a single remote call failed. It travels inside
//!   results and checkpoint records, so it is plain data.
//! - [`BridgeError`] is returned as `Err` from operations that cannot produce a
//!   structured result at all (bad input, corrupt checkpoints, local storage).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Failure of one call against the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallError {
    /// Connection refused, DNS failure, or the HTTP deadline expired.
    #[error("transport error: {reason}")]
    Transport {
        reason: String,
        #[serde(default)]
        timed_out: bool,
    },

    /// Non-2xx status, or a well-formed failure payload from the remote.
    /// `timed_out` is set when the remote itself aborted the code for
    /// exceeding the execution budget it was given.
    #[error("remote error (HTTP {status}): {body}")]
    Remote {
        status: u16,
        body: String,
        #[serde(default)]
        timed_out: bool,
    },

    /// The call was rejected locally before reaching the network.
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },
}

impl CallError {
    pub fn transport(reason: impl Into<String>) -> Self {
        CallError::Transport {
            reason: reason.into(),
            timed_out: false,
        }
    }

    pub fn timed_out(reason: impl Into<String>) -> Self {
        CallError::Transport {
            reason: reason.into(),
            timed_out: true,
        }
    }

    pub fn remote(status: u16, body: impl Into<String>) -> Self {
        CallError::Remote {
            status,
            body: body.into(),
            timed_out: false,
        }
    }

    /// Failure payload for code the remote stopped at its own deadline.
    pub fn remote_timeout(status: u16, body: impl Into<String>) -> Self {
        CallError::Remote {
            status,
            body: body.into(),
            timed_out: true,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        CallError::InvalidRequest {
            reason: reason.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            CallError::Transport {
                timed_out: true,
                ..
            } | CallError::Remote {
                timed_out: true,
                ..
            }
        )
    }
}

/// Operation-level errors.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("transport error: {reason}")]
    Transport { reason: String },

    #[error("remote error (HTTP {status}): {body}")]
    Remote { status: u16, body: String },

    #[error("probe failed: {reason}")]
    Probe { reason: String },

    #[error("download failed: {reason}")]
    Download { reason: String },

    /// The stored record could not be parsed or violates its invariants.
    /// Never reset silently; the caller decides whether to discard it.
    #[error("checkpoint for task '{task_id}' is corrupt: {reason}")]
    CheckpointCorruption { task_id: String, reason: String },

    #[error("task '{0}' is being advanced by another run")]
    TaskLocked(String),

    #[error("checkpoint store error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BridgeError::Storage {
            path: path.into(),
            source,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        BridgeError::InvalidRequest(reason.into())
    }
}

impl From<CallError> for BridgeError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Transport { reason, .. } => BridgeError::Transport { reason },
            CallError::Remote { status, body, .. } => BridgeError::Remote { status, body },
            CallError::InvalidRequest { reason } => BridgeError::InvalidRequest(reason),
        }
    }
}

pub type BridgeResult<T> = std::result::Result<T, BridgeError>;
