//! The plan executor - the closed worker/judge loop.

use std::sync::Arc;

use anyhow::anyhow;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use cadence_approval::{build_request, ApprovalPort};
use cadence_checkpoint::CheckpointManager;
use cadence_core::{
    ApprovalDecision, ApprovalOutcome, Checkpoint, Context, JudgmentAction, Plan, PlanError, RunId,
    StepStatus,
};
use cadence_judge::{Judge, Rule};
use cadence_worker::{BuiltinWorker, NativeFn, Tool, Worker};

use crate::audit::{AuditSink, TracingAudit};
use crate::result::{ExecutionStatus, PlanExecutionResult};

/// Configuration for the plan executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Upper bound on worker executions in one run; exceeding it fails
    /// the run at the next loop check.
    pub max_total_steps: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_total_steps: 100,
        }
    }
}

/// Orchestrates one plan execution: ready-step selection, approval
/// gating, worker dispatch, judgment, and checkpointing.
///
/// The loop is single-threaded-cooperative: one step is in flight at a
/// time, and every call into the worker, judge, approval port, or
/// checkpoint manager is a suspension point. Among simultaneously-ready
/// steps it always takes the first in insertion order, so execution is
/// deterministic.
pub struct PlanExecutor {
    worker: Arc<dyn Worker>,
    builtin: Option<Arc<BuiltinWorker>>,
    judge: Judge,
    approvals: Option<Arc<dyn ApprovalPort>>,
    checkpoints: Option<CheckpointManager>,
    audit: Arc<dyn AuditSink>,
    config: ExecutorConfig,
}

/// Mutable per-run bookkeeping.
struct RunState {
    context: Context,
    completed: Vec<String>,
    steps_executed: usize,
    total_tokens: u64,
    total_latency_ms: u64,
    step_number: u64,
}

/// How the inner loop stopped.
enum LoopExit {
    Completed,
    NeedsReplan(String),
    Escalated(String),
    AwaitingApproval(String),
    Aborted(String),
    BudgetExhausted(String),
}

impl PlanExecutor {
    /// Create an executor around a built-in worker with empty
    /// registries.
    pub fn new() -> Self {
        let builtin = Arc::new(BuiltinWorker::new());
        Self {
            worker: builtin.clone(),
            builtin: Some(builtin),
            judge: Judge::new(),
            approvals: None,
            checkpoints: None,
            audit: Arc::new(TracingAudit),
            config: ExecutorConfig::default(),
        }
    }

    /// Replace the worker. Registration pass-throughs are disabled when
    /// the worker is not the built-in one.
    pub fn with_worker(mut self, worker: Arc<dyn Worker>) -> Self {
        self.builtin = None;
        self.worker = worker;
        self
    }

    /// Replace the judge.
    pub fn with_judge(mut self, judge: Judge) -> Self {
        self.judge = judge;
        self
    }

    /// Install an approval port. Without one, steps that require
    /// approval pause the run.
    pub fn with_approval_port(mut self, port: Arc<dyn ApprovalPort>) -> Self {
        self.approvals = Some(port);
        self
    }

    /// Install a checkpoint manager. Without one, nothing is persisted
    /// and runs cannot be resumed.
    pub fn with_checkpoints(mut self, manager: CheckpointManager) -> Self {
        self.checkpoints = Some(manager);
        self
    }

    /// Replace the audit sink.
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a tool on the built-in worker.
    pub fn register_tool(&self, tool: Arc<dyn Tool>) {
        match &self.builtin {
            Some(worker) => worker.register_tool(tool),
            None => warn!("register_tool ignored: executor uses a custom worker"),
        }
    }

    /// Register a native function on the built-in worker.
    pub fn register_function(&self, name: impl Into<String>, function: NativeFn) {
        match &self.builtin {
            Some(worker) => worker.register_function(name, function),
            None => warn!("register_function ignored: executor uses a custom worker"),
        }
    }

    /// Add an evaluation rule to the judge.
    pub fn add_evaluation_rule(&mut self, rule: Rule) {
        self.judge.add_rule(rule);
    }

    /// The judge, for inspection.
    pub fn judge(&self) -> &Judge {
        &self.judge
    }

    /// Execute the plan to one of the terminal statuses.
    ///
    /// The plan is validated up front; a structurally bad plan returns
    /// `Err` before anything runs. After that no error escapes: worker,
    /// judge, and checkpoint failures all resolve into the returned
    /// [`PlanExecutionResult`].
    pub async fn execute_plan(
        &self,
        plan: &mut Plan,
        goal: &str,
        context: Context,
        run_id: Option<RunId>,
        resume_from_checkpoint: bool,
    ) -> Result<PlanExecutionResult, PlanError> {
        plan.validate()?;

        let run_id = run_id.unwrap_or_default();
        let mut state = RunState {
            context,
            completed: Vec::new(),
            steps_executed: 0,
            total_tokens: 0,
            total_latency_ms: 0,
            step_number: 0,
        };

        if resume_from_checkpoint {
            self.restore(plan, run_id, &mut state).await;
        }

        self.audit.start_run(run_id, plan.id, goal).await;

        let exit = self.run_loop(plan, goal, run_id, &mut state).await;

        let (status, feedback, success, run_ended) = match exit {
            Ok(LoopExit::Completed) => (
                ExecutionStatus::Completed,
                Some("all steps reached a terminal state".to_string()),
                true,
                true,
            ),
            Ok(LoopExit::NeedsReplan(fb)) => (ExecutionStatus::NeedsReplan, Some(fb), false, true),
            Ok(LoopExit::Escalated(fb)) => {
                (ExecutionStatus::NeedsEscalation, Some(fb), false, true)
            }
            Ok(LoopExit::AwaitingApproval(fb)) => {
                (ExecutionStatus::AwaitingApproval, Some(fb), false, false)
            }
            Ok(LoopExit::Aborted(fb)) => (ExecutionStatus::Aborted, Some(fb), false, true),
            Ok(LoopExit::BudgetExhausted(fb)) => {
                self.audit.report_problem(run_id, &fb).await;
                (ExecutionStatus::Failed, Some(fb), false, true)
            }
            Err(e) => {
                let detail = format!("unhandled execution error: {e:#}");
                error!(run = %run_id, "{detail}");
                self.audit.report_problem(run_id, &detail).await;
                (ExecutionStatus::Failed, Some(detail), false, true)
            }
        };

        if run_ended {
            self.audit.end_run(run_id, success).await;
            if let Some(manager) = &self.checkpoints {
                let error = if success { None } else { feedback.as_deref() };
                if let Err(e) = manager.on_execution_complete(run_id, success, error).await {
                    warn!(run = %run_id, error = %e, "checkpoint finalization failed");
                }
            }
        }

        Ok(PlanExecutionResult {
            status,
            run_id,
            results: state.context,
            feedback,
            feedback_context: plan.feedback_context(),
            completed_steps: state.completed,
            steps_executed: state.steps_executed,
            total_tokens: state.total_tokens,
            total_latency_ms: state.total_latency_ms,
        })
    }

    /// Restore progress from the latest checkpoint, if one exists.
    /// Completed steps are marked Completed in the live plan so
    /// ready-step selection naturally skips them; nothing is
    /// re-executed. Steps parked on approval in the interrupted run are
    /// re-gated.
    async fn restore(&self, plan: &mut Plan, run_id: RunId, state: &mut RunState) {
        let Some(manager) = &self.checkpoints else {
            warn!(run = %run_id, "resume requested but no checkpoint manager configured");
            return;
        };

        match manager.load_latest(run_id).await {
            Ok(Some(checkpoint)) => {
                info!(
                    run = %run_id,
                    step_number = checkpoint.step_number,
                    completed = checkpoint.completed_steps.len(),
                    "resuming from checkpoint"
                );
                state.context = checkpoint.context;
                state.completed = checkpoint.completed_steps;
                state.total_tokens = checkpoint.total_tokens;
                state.total_latency_ms = checkpoint.total_latency_ms;
                state.step_number = checkpoint.step_number;

                for id in &state.completed {
                    if let Some(step) = plan.step_mut(id) {
                        step.status = StepStatus::Completed;
                    }
                }
                for step in &mut plan.steps {
                    if step.status == StepStatus::AwaitingApproval {
                        step.status = StepStatus::Pending;
                    }
                }
            }
            Ok(None) => {
                warn!(run = %run_id, "resume requested but no checkpoint found; starting fresh")
            }
            Err(e) => {
                warn!(run = %run_id, error = %e, "failed to load checkpoint; starting fresh")
            }
        }
    }

    async fn run_loop(
        &self,
        plan: &mut Plan,
        goal: &str,
        run_id: RunId,
        state: &mut RunState,
    ) -> Result<LoopExit, anyhow::Error> {
        loop {
            if state.steps_executed >= self.config.max_total_steps {
                return Ok(LoopExit::BudgetExhausted(format!(
                    "max_total_steps ({}) reached before plan completion",
                    self.config.max_total_steps
                )));
            }

            // Single-step dispatch: take the first ready step in
            // insertion order. Extension point: a parallel mode would
            // dispatch every ready step here instead of the first.
            let Some(step_id) = plan.ready_steps().first().map(|s| s.id.clone()) else {
                if plan.is_complete() {
                    return Ok(LoopExit::Completed);
                }
                return Ok(LoopExit::NeedsReplan(
                    "no executable steps but plan incomplete; check step dependencies".to_string(),
                ));
            };

            if let Some(exit) = self.gate(plan, &step_id, run_id, state).await? {
                match exit {
                    GateVerdict::Proceed => {}
                    GateVerdict::NextStep => continue,
                    GateVerdict::Stop(exit) => return Ok(exit),
                }
            }

            let snapshot = {
                let step = plan
                    .step_mut(&step_id)
                    .ok_or_else(|| anyhow!("ready step '{step_id}' disappeared from plan"))?;
                step.status = StepStatus::InProgress;
                step.attempts += 1;
                step.clone()
            };

            debug!(run = %run_id, step = %step_id, attempt = snapshot.attempts, "executing step");
            let outcome = self.worker.execute(&snapshot, &state.context).await?;
            state.total_tokens += outcome.tokens_used;
            state.total_latency_ms += outcome.latency_ms;
            state.steps_executed += 1;

            let judgment = self
                .judge
                .evaluate(&snapshot, &outcome, goal, &state.context)
                .await;
            self.audit.record_decision(run_id, &step_id, &judgment).await;

            match judgment.action {
                JudgmentAction::Accept => {
                    // Strict output contract: every expected key must be
                    // present; a single ambiguous key is never broadcast
                    // into multiple expected keys.
                    let missing: Vec<String> = snapshot
                        .expected_outputs
                        .iter()
                        .filter(|key| !outcome.outputs.contains_key(*key))
                        .cloned()
                        .collect();
                    if !missing.is_empty() {
                        let feedback = format!(
                            "step '{step_id}' was accepted but its result is missing expected outputs: {}",
                            missing.join(", ")
                        );
                        warn!(run = %run_id, step = %step_id, "{feedback}");
                        let step = plan
                            .step_mut(&step_id)
                            .ok_or_else(|| anyhow!("step '{step_id}' disappeared from plan"))?;
                        step.status = StepStatus::Failed;
                        step.error = Some(feedback.clone());
                        return Ok(LoopExit::NeedsReplan(feedback));
                    }

                    for (key, value) in &outcome.outputs {
                        state.context.insert(key.clone(), value.clone());
                    }
                    plan.context
                        .insert(step_id.clone(), Value::Object(outcome.outputs.clone()));
                    {
                        let step = plan
                            .step_mut(&step_id)
                            .ok_or_else(|| anyhow!("step '{step_id}' disappeared from plan"))?;
                        step.status = StepStatus::Completed;
                        step.result = Some(outcome.outputs.clone());
                        step.error = None;
                    }
                    state.completed.push(step_id.clone());
                    state.step_number += 1;
                    self.save_checkpoint(plan, run_id, state).await?;
                    info!(run = %run_id, step = %step_id, "step completed");
                }

                JudgmentAction::Retry => {
                    let feedback = judgment
                        .feedback
                        .clone()
                        .unwrap_or_else(|| judgment.reasoning.clone());
                    let step = plan
                        .step_mut(&step_id)
                        .ok_or_else(|| anyhow!("step '{step_id}' disappeared from plan"))?;
                    step.error = Some(feedback.clone());
                    if step.attempts < step.max_retries {
                        step.status = StepStatus::Pending;
                        debug!(
                            run = %run_id,
                            step = %step_id,
                            attempt = step.attempts,
                            max_retries = step.max_retries,
                            "step will be retried"
                        );
                    } else {
                        step.status = StepStatus::Failed;
                        let attempts = step.attempts;
                        return Ok(LoopExit::NeedsReplan(format!(
                            "step '{step_id}' exhausted its retry budget after {attempts} attempts: {feedback}"
                        )));
                    }
                }

                JudgmentAction::Replan => {
                    let feedback = judgment
                        .feedback
                        .clone()
                        .unwrap_or_else(|| judgment.reasoning.clone());
                    let step = plan
                        .step_mut(&step_id)
                        .ok_or_else(|| anyhow!("step '{step_id}' disappeared from plan"))?;
                    step.status = StepStatus::Failed;
                    step.error = Some(feedback.clone());
                    return Ok(LoopExit::NeedsReplan(feedback));
                }

                JudgmentAction::Escalate => {
                    // Plan state is deliberately left as-is; the step is
                    // not marked failed.
                    let feedback = judgment
                        .feedback
                        .unwrap_or_else(|| judgment.reasoning.clone());
                    return Ok(LoopExit::Escalated(feedback));
                }
            }
        }
    }

    /// Route a step through the approval gate if it requires one.
    async fn gate(
        &self,
        plan: &mut Plan,
        step_id: &str,
        run_id: RunId,
        state: &RunState,
    ) -> Result<Option<GateVerdict>, anyhow::Error> {
        let request = {
            let step = plan
                .step(step_id)
                .ok_or_else(|| anyhow!("ready step '{step_id}' disappeared from plan"))?;
            if !step.requires_approval {
                return Ok(None);
            }
            build_request(step, &state.context)
        };

        let outcome = match &self.approvals {
            None => ApprovalOutcome::Pending,
            Some(port) => port.request(request).await?,
        };

        match outcome {
            ApprovalOutcome::Pending => {
                if let Some(step) = plan.step_mut(step_id) {
                    step.status = StepStatus::AwaitingApproval;
                }
                self.save_checkpoint(plan, run_id, state).await?;
                if let Some(manager) = &self.checkpoints {
                    manager.on_pause(run_id).await;
                }
                info!(run = %run_id, step = %step_id, "pausing for human approval");
                Ok(Some(GateVerdict::Stop(LoopExit::AwaitingApproval(format!(
                    "awaiting human approval for step '{step_id}'"
                )))))
            }
            ApprovalOutcome::Resolved(result) => match result.decision {
                ApprovalDecision::Approve => Ok(Some(GateVerdict::Proceed)),
                ApprovalDecision::Modify => {
                    if let Some(step) = plan.step_mut(step_id) {
                        if let Some(overrides) = &result.modifications {
                            step.apply_modifications(overrides);
                        }
                    }
                    info!(run = %run_id, step = %step_id, "approved with modifications");
                    Ok(Some(GateVerdict::Proceed))
                }
                ApprovalDecision::Reject => {
                    let reason = result
                        .reason
                        .unwrap_or_else(|| "rejected by approver".to_string());
                    if let Some(step) = plan.step_mut(step_id) {
                        step.status = StepStatus::Rejected;
                        step.error = Some(reason.clone());
                    }
                    let skipped = plan.cascade_skip(step_id);
                    info!(
                        run = %run_id,
                        step = %step_id,
                        reason = %reason,
                        skipped = skipped.len(),
                        "step rejected; dependents skipped"
                    );
                    Ok(Some(GateVerdict::NextStep))
                }
                ApprovalDecision::Abort => {
                    let reason = result
                        .reason
                        .unwrap_or_else(|| format!("aborted at step '{step_id}'"));
                    self.save_checkpoint(plan, run_id, state).await?;
                    info!(run = %run_id, step = %step_id, reason = %reason, "run aborted by approver");
                    Ok(Some(GateVerdict::Stop(LoopExit::Aborted(reason))))
                }
            },
        }
    }

    async fn save_checkpoint(
        &self,
        plan: &Plan,
        run_id: RunId,
        state: &RunState,
    ) -> Result<(), anyhow::Error> {
        if let Some(manager) = &self.checkpoints {
            let checkpoint = Checkpoint::new(
                run_id,
                state.step_number,
                state.completed.clone(),
                state.context.clone(),
                plan.revision,
                state.total_tokens,
                state.total_latency_ms,
            );
            manager.save(&checkpoint).await?;
        }
        Ok(())
    }
}

impl Default for PlanExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of the approval gate for one step.
enum GateVerdict {
    /// Run the step
    Proceed,
    /// Step resolved without running; pick the next ready step
    NextStep,
    /// Stop the loop with this exit
    Stop(LoopExit),
}
