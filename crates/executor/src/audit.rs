//! Decision-audit sink.
//!
//! The run-history store itself lives outside this core; the executor
//! only speaks this four-call contract.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{error, info};

use cadence_core::{Judgment, PlanId, RunId};

/// Receives the audit trail of a run. Implementations must be
/// non-blocking and must not fail the run.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// A run is starting.
    async fn start_run(&self, run_id: RunId, plan_id: PlanId, goal: &str);

    /// The judge ruled on a step.
    async fn record_decision(&self, run_id: RunId, step_id: &str, judgment: &Judgment);

    /// Something went wrong that a human should see.
    async fn report_problem(&self, run_id: RunId, detail: &str);

    /// The run ended.
    async fn end_run(&self, run_id: RunId, success: bool);
}

/// Default sink: writes the audit trail to the tracing subscriber.
pub struct TracingAudit;

#[async_trait]
impl AuditSink for TracingAudit {
    async fn start_run(&self, run_id: RunId, plan_id: PlanId, goal: &str) {
        info!(run = %run_id, plan = %plan_id, goal, "run started");
    }

    async fn record_decision(&self, run_id: RunId, step_id: &str, judgment: &Judgment) {
        info!(
            run = %run_id,
            step = step_id,
            action = ?judgment.action,
            rule = judgment.matched_rule.as_deref().unwrap_or("-"),
            confidence = judgment.confidence,
            "judgment recorded"
        );
    }

    async fn report_problem(&self, run_id: RunId, detail: &str) {
        error!(run = %run_id, detail, "problem reported");
    }

    async fn end_run(&self, run_id: RunId, success: bool) {
        info!(run = %run_id, success, "run ended");
    }
}

/// One entry in a [`RecordingAudit`] trail.
#[derive(Debug, Clone, PartialEq)]
pub enum AuditEvent {
    /// start_run was called
    RunStarted,
    /// record_decision was called for the step
    Decision {
        /// Step the judgment was for
        step_id: String,
        /// Rule that matched, if any
        matched_rule: Option<String>,
    },
    /// report_problem was called
    Problem(String),
    /// end_run was called
    RunEnded {
        /// Whether the run succeeded
        success: bool,
    },
}

/// In-memory sink for tests and diagnostics.
pub struct RecordingAudit {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAudit {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot the recorded trail.
    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().await.clone()
    }
}

impl Default for RecordingAudit {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditSink for RecordingAudit {
    async fn start_run(&self, _run_id: RunId, _plan_id: PlanId, _goal: &str) {
        self.events.lock().await.push(AuditEvent::RunStarted);
    }

    async fn record_decision(&self, _run_id: RunId, step_id: &str, judgment: &Judgment) {
        self.events.lock().await.push(AuditEvent::Decision {
            step_id: step_id.to_string(),
            matched_rule: judgment.matched_rule.clone(),
        });
    }

    async fn report_problem(&self, _run_id: RunId, detail: &str) {
        self.events
            .lock()
            .await
            .push(AuditEvent::Problem(detail.to_string()));
    }

    async fn end_run(&self, _run_id: RunId, success: bool) {
        self.events.lock().await.push(AuditEvent::RunEnded { success });
    }
}
