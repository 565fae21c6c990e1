//! Messages exchanged at the human-approval boundary.

use serde::{Deserialize, Serialize};

use crate::Context;

/// What a human sees when asked to approve a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Id of the gated step
    pub step_id: String,

    /// Step description
    pub description: String,

    /// Action kind name (`tool_use`, `llm_call`, ...)
    pub action_type: String,

    /// Truncated rendering of the action parameters
    pub action_details: String,

    /// The subset of context this step's inputs resolve to
    pub resolved_context: Context,

    /// Planner-supplied message for the approver
    pub approval_message: Option<String>,

    /// Ready-to-display preview text
    pub preview: String,
}

/// The human's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    /// Run the step as-is
    Approve,
    /// Refuse the step; its dependents are skipped
    Reject,
    /// Stop the whole run immediately
    Abort,
    /// Run the step with modified parameters
    Modify,
}

/// A resolved approval decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalResult {
    /// The decision taken
    pub decision: ApprovalDecision,

    /// Optional explanation from the approver
    #[serde(default)]
    pub reason: Option<String>,

    /// Overrides shallow-merged into the step before execution when the
    /// decision is Modify
    #[serde(default)]
    pub modifications: Option<Context>,
}

impl ApprovalResult {
    /// Plain approval.
    pub fn approve() -> Self {
        Self {
            decision: ApprovalDecision::Approve,
            reason: None,
            modifications: None,
        }
    }

    /// Rejection with a reason.
    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            decision: ApprovalDecision::Reject,
            reason: Some(reason.into()),
            modifications: None,
        }
    }

    /// Abort the run.
    pub fn abort(reason: impl Into<String>) -> Self {
        Self {
            decision: ApprovalDecision::Abort,
            reason: Some(reason.into()),
            modifications: None,
        }
    }

    /// Approve with parameter overrides.
    pub fn modify(modifications: Context) -> Self {
        Self {
            decision: ApprovalDecision::Modify,
            reason: None,
            modifications: Some(modifications),
        }
    }
}

/// What an approval port returns: a resolved decision, or Pending when
/// the decision will arrive out of band (queue- or UI-backed ports).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ApprovalOutcome {
    /// The human decided
    Resolved(ApprovalResult),
    /// No decision yet; the executor pauses and checkpoints
    Pending,
}
