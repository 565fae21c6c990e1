//! Checkpoint snapshot - durable executor progress.

use serde::{Deserialize, Serialize};

use crate::id::RunId;
use crate::{Context, Time};

/// A full, self-sufficient snapshot of executor progress.
///
/// Written after every accepted step and before every pause for
/// approval; read back whole on resume. A reader must never observe a
/// partially written snapshot, which the checkpoint manager guarantees
/// by writing to a temporary file and renaming it into place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The run this snapshot belongs to
    pub run_id: RunId,

    /// Monotonic snapshot number within the run
    pub step_number: u64,

    /// Ids of steps completed so far, in completion order
    pub completed_steps: Vec<String>,

    /// Full context as of this snapshot
    pub context: Context,

    /// Plan revision the snapshot was taken against
    pub plan_revision: u32,

    /// Cumulative tokens consumed
    pub total_tokens: u64,

    /// Cumulative worker latency in milliseconds
    pub total_latency_ms: u64,

    /// When the snapshot was written
    pub created_at: Time,
}

impl Checkpoint {
    /// Snapshot the given progress now.
    pub fn new(
        run_id: RunId,
        step_number: u64,
        completed_steps: Vec<String>,
        context: Context,
        plan_revision: u32,
        total_tokens: u64,
        total_latency_ms: u64,
    ) -> Self {
        Self {
            run_id,
            step_number,
            completed_steps,
            context,
            plan_revision,
            total_tokens,
            total_latency_ms,
            created_at: chrono::Utc::now(),
        }
    }
}
