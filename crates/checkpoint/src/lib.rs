//! Checkpoint layer - crash-safe snapshots of executor progress.

#![warn(missing_docs)]

pub mod manager;

pub use manager::{CheckpointError, CheckpointManager};
