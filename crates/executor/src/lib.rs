//! Execution layer - the plan executor's control-flow state machine.
//!
//! Runs the closed loop:
//! ```text
//! Ready Step → Approval Gate → Worker → Judge → Apply Judgment → Checkpoint
//! ```

#![warn(missing_docs)]

pub mod audit;
pub mod executor;
pub mod result;

pub use audit::{AuditEvent, AuditSink, RecordingAudit, TracingAudit};
pub use executor::{ExecutorConfig, PlanExecutor};
pub use result::{ExecutionStatus, PlanExecutionResult};
