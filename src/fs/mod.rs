//! Local persistence: checkpoint records and the locks guarding them.

pub mod checkpoints;
pub mod locking;

pub use checkpoints::CheckpointStore;
pub use locking::TaskLock;
