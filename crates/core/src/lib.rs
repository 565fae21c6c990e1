//! Cadence core data models.
//!
//! This crate defines the data structures shared by the plan-execution
//! engine: plans and steps, the status state machine, judgments,
//! approval messages, and checkpoint snapshots.

#![warn(missing_docs)]

// Core identities
mod id;

// Plan execution
mod plan;
mod step;

// Verdicts and worker results
mod judgment;
mod outcome;

// Boundaries
mod approval;
mod checkpoint;

// Shared helpers
mod error;
pub mod vars;

// Re-exports
pub use id::{GoalId, PlanId, RunId};

pub use plan::{CompletedStep, FailedStep, FeedbackContext, Plan};
pub use step::{Action, Step, StepStatus};

pub use judgment::{Judgment, JudgmentAction};
pub use outcome::StepOutcome;

pub use approval::{ApprovalDecision, ApprovalOutcome, ApprovalRequest, ApprovalResult};
pub use checkpoint::Checkpoint;

pub use error::PlanError;

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;

/// Key-value context accumulated as steps complete
pub type Context = serde_json::Map<String, serde_json::Value>;
