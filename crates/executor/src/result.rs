//! Terminal statuses and the execution result handed back to callers.

use serde::{Deserialize, Serialize};

use cadence_core::{Context, FeedbackContext, RunId};

/// How a plan execution ended. Every call to `execute_plan` resolves to
/// exactly one of these; recoverable conditions are handled internally
/// and never surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Every step reached a terminal state
    Completed,
    /// The external planner should revise the plan
    NeedsReplan,
    /// A human should look at the judge's feedback
    NeedsEscalation,
    /// Paused on a human approval decision; resumable
    AwaitingApproval,
    /// A human aborted the run
    Aborted,
    /// An unhandled error stopped the run; checkpoints are retained
    Failed,
}

/// The structured result of one plan execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanExecutionResult {
    /// How the run ended
    pub status: ExecutionStatus,

    /// The run id, usable for resuming
    pub run_id: RunId,

    /// Final accumulated context
    pub results: Context,

    /// Human-readable feedback about the terminal state
    pub feedback: Option<String>,

    /// Structured completed/failed summary for the external planner
    pub feedback_context: FeedbackContext,

    /// Ids of completed steps, in completion order
    pub completed_steps: Vec<String>,

    /// How many step executions the worker performed
    pub steps_executed: usize,

    /// Cumulative tokens consumed
    pub total_tokens: u64,

    /// Cumulative worker latency in milliseconds
    pub total_latency_ms: u64,
}
