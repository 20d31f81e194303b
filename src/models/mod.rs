pub mod checkpoint;
pub mod environment;
pub mod execution;
pub mod run;
pub mod tier;

pub use checkpoint::{
    AggregatedOutput, BatchRecord, CheckpointRecord, CheckpointStatus, CheckpointSummary,
};
pub use environment::{
    ConnectionStatus, EnvironmentSnapshot, Package, ProbeReport, Recommendation,
};
pub use execution::{ChunkSpec, ExecutionRequest, ExecutionResult};
pub use run::{RunCheckpoint, StoredCheckpoint};
pub use tier::{Tier, TierPolicy, TierTable};
