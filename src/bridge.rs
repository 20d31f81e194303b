//! Caller-facing tool surface.
//!
//! [`Bridge`] wires the configuration, transport and checkpoint store together
//! and exposes one method per tool. Remote and transport failures during
//! execution come back inside reports; `Err` is reserved for bad input,
//! checkpoint trouble and boundary failures (probe, download, cleanup).

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use crate::chunked::template::BatchTemplate;
use crate::chunked::ChunkedReport;
use crate::config::BridgeConfig;
use crate::dispatch::{Dispatched, Dispatcher, RunReport};
use crate::error::BridgeError;
use crate::files::{DownloadedFile, FileRetrieval};
use crate::fs::CheckpointStore;
use crate::models::{
    CheckpointStatus, CheckpointSummary, ChunkSpec, ConnectionStatus, ExecutionRequest,
    ProbeReport, RunCheckpoint, StoredCheckpoint, Tier,
};
use crate::probe::EnvironmentProber;
use crate::transport::wire::{CleanupResponse, HealthResponse, RemoteFile};
use crate::transport::HttpTransport;
use crate::validation::validate_task_id;

/// Directory listed when the caller names none.
pub const DEFAULT_REMOTE_DIR: &str = "/content";

/// Result of a remote cleanup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupReport {
    #[serde(flatten)]
    pub remote: CleanupResponse,
    /// Local records whose remote session state the reset may have wiped
    pub stale_checkpoints: Vec<CheckpointSummary>,
}

pub struct Bridge {
    config: BridgeConfig,
    transport: HttpTransport,
    store: CheckpointStore,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Result<Self, BridgeError> {
        let transport = HttpTransport::new(
            &config.base_url,
            config.connect_timeout(),
            config.network_grace(),
        )?;
        let store = CheckpointStore::open(&config.checkpoint_dir)?;
        Ok(Self {
            config,
            transport,
            store,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    fn dispatcher(&self) -> Dispatcher<'_> {
        Dispatcher::new(&self.transport, &self.store, &self.config.tiers)
    }

    fn tier_timeout(&self, tier: Tier) -> Duration {
        self.config.tiers.policy(tier).timeout()
    }

    /// Ping the remote. Never fails: an unreachable remote is reported as
    /// disconnected with a hint.
    pub fn check_connection(&self) -> ConnectionStatus {
        let deadline = self.config.probe.probe_timeout();
        let base_url = self.transport.base_url().to_string();
        match self
            .transport
            .get_json::<HealthResponse>("/health", &[], deadline)
        {
            Ok(health) => {
                let unhealthy = health
                    .status
                    .as_deref()
                    .filter(|status| !is_healthy_status(status))
                    .map(str::to_string);
                if let Some(status) = &unhealthy {
                    warn!(status, "remote reports itself unhealthy");
                }
                ConnectionStatus {
                    connected: unhealthy.is_none(),
                    base_url,
                    uptime_minutes: health.uptime_minutes,
                    memory_available_gb: health.memory_available_gb,
                    memory_used_pct: health.memory_used_pct,
                    suggestion: unhealthy.as_ref().map(|_| {
                        "Restart the remote runtime or run cleanup to free memory".to_string()
                    }),
                    error: unhealthy.map(|status| format!("remote reports status '{status}'")),
                }
            }
            Err(e) => {
                warn!(error = %e, "health check failed");
                ConnectionStatus {
                    connected: false,
                    base_url,
                    uptime_minutes: None,
                    memory_available_gb: None,
                    memory_used_pct: None,
                    error: Some(e.to_string()),
                    suggestion: Some(
                        "Make sure the remote runtime is running and the tunnel URL is current"
                            .to_string(),
                    ),
                }
            }
        }
    }

    pub fn probe_environment(&self) -> Result<ProbeReport, BridgeError> {
        EnvironmentProber::new(&self.transport, &self.config.probe).probe()
    }

    pub fn run_quick(&self, code: &str) -> Result<RunReport, BridgeError> {
        self.run_single(ExecutionRequest::quick(code))
    }

    /// Run on the long tier. With a `checkpoint` name, a successful run's
    /// leading code and output are stored under it for [`Self::get_checkpoint`].
    pub fn run_long(
        &self,
        code: &str,
        timeout: Option<Duration>,
        checkpoint: Option<&str>,
    ) -> Result<RunReport, BridgeError> {
        if let Some(name) = checkpoint {
            validate_task_id(name).map_err(|e| BridgeError::invalid(e.to_string()))?;
        }
        let request = ExecutionRequest::long(code);
        let mut report = match timeout {
            Some(timeout) => self.run_single(request.with_timeout(timeout))?,
            None => self.run_single(request)?,
        };
        if let Some(name) = checkpoint.filter(|_| report.outcome.is_success()) {
            let path = self
                .store
                .save_run(&RunCheckpoint::from_run(name, code, &report.result))?;
            info!(name, path = %path.display(), "run result checkpointed");
            report.checkpoint_saved = Some(path);
        }
        Ok(report)
    }

    fn run_single(&self, request: ExecutionRequest) -> Result<RunReport, BridgeError> {
        match self.dispatcher().dispatch(&request)? {
            Dispatched::Single(report) => Ok(report),
            Dispatched::Chunked(report) => Err(BridgeError::invalid(format!(
                "request was routed as chunked task '{}'",
                report.task_id
            ))),
        }
    }

    /// Run or resume a chunked task. Without a task id, one is derived from
    /// the workload so that repeating the call resumes the same record.
    pub fn run_chunked(
        &self,
        task_id: Option<String>,
        template: BatchTemplate,
        total_items: u64,
        batch_size: u64,
    ) -> Result<ChunkedReport, BridgeError> {
        let spec = ChunkSpec::new(task_id, template, total_items, batch_size);
        match self.dispatcher().dispatch(&ExecutionRequest::chunked(spec))? {
            Dispatched::Chunked(report) => Ok(report),
            Dispatched::Single(_) => Err(BridgeError::invalid(
                "chunked request was not routed to the batch runner",
            )),
        }
    }

    fn files(&self) -> FileRetrieval<'_> {
        FileRetrieval::new(
            &self.transport,
            &self.config.save_dir,
            self.tier_timeout(Tier::Quick),
            self.tier_timeout(Tier::Long),
        )
    }

    pub fn list_files(&self, path: Option<&str>) -> Result<Vec<RemoteFile>, BridgeError> {
        self.files().list_files(path.unwrap_or(DEFAULT_REMOTE_DIR))
    }

    pub fn download(
        &self,
        remote_path: &str,
        local_name: Option<&str>,
    ) -> Result<DownloadedFile, BridgeError> {
        self.files().download(remote_path, local_name)
    }

    /// Ask the remote to free memory. All remote variables are lost.
    pub fn cleanup(&self) -> Result<CleanupReport, BridgeError> {
        let deadline = self.tier_timeout(Tier::Quick) + self.transport.grace();
        let remote = self
            .transport
            .post_json::<(), CleanupResponse>("/cleanup", None, deadline)?;

        let stale_checkpoints: Vec<CheckpointSummary> = self
            .store
            .list()?
            .into_iter()
            .filter(|s| s.status != CheckpointStatus::Completed)
            .collect();
        info!(
            freed_mb = remote.freed_mb,
            stale = stale_checkpoints.len(),
            "remote cleanup finished"
        );
        Ok(CleanupReport {
            remote,
            stale_checkpoints,
        })
    }

    /// Variables currently defined in the remote runtime, as reported.
    pub fn list_variables(&self) -> Result<serde_json::Value, BridgeError> {
        let deadline = self.tier_timeout(Tier::Quick) + self.transport.grace();
        Ok(self.transport.get_json("/variables", &[], deadline)?)
    }

    /// The chunked task record or named run result stored under `name`.
    pub fn get_checkpoint(&self, name: &str) -> Result<Option<StoredCheckpoint>, BridgeError> {
        self.store.load_any(name)
    }

    pub fn list_checkpoints(&self) -> Result<Vec<CheckpointSummary>, BridgeError> {
        self.store.list()
    }

    /// Discard what is stored under a name. Returns whether anything existed.
    pub fn clear_checkpoint(&self, task_id: &str) -> Result<bool, BridgeError> {
        let removed = self.store.delete(task_id)?;
        if removed {
            info!(task_id, "checkpoint cleared");
        }
        Ok(removed)
    }
}

fn is_healthy_status(status: &str) -> bool {
    matches!(
        status.trim().to_ascii_lowercase().as_str(),
        "healthy" | "ok" | "ready"
    )
}
