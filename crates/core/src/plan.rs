//! Plan model - a dependency-ordered collection of steps.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PlanError;
use crate::id::{GoalId, PlanId};
use crate::step::{Step, StepStatus};
use crate::Context;

/// A plan: an externally supplied sequence of steps with dependency
/// edges, plus the context accumulated as steps complete.
///
/// A plan is owned exclusively by one executor invocation and mutated
/// in place as steps complete. Among simultaneously-ready steps the
/// tie-break is insertion order, which makes execution order fully
/// deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Unique identifier
    pub id: PlanId,

    /// The goal this plan works toward
    pub goal_id: GoalId,

    /// Human-readable description
    pub description: String,

    /// Steps in insertion order
    pub steps: Vec<Step>,

    /// Per-step outputs, keyed by step id, written as steps complete
    #[serde(default)]
    pub context: Context,

    /// Revision counter, bumped by the external planner on each revise
    #[serde(default)]
    pub revision: u32,
}

impl Plan {
    /// Create an empty plan.
    pub fn new(goal_id: GoalId, description: impl Into<String>) -> Self {
        Self {
            id: PlanId::new(),
            goal_id,
            description: description.into(),
            steps: Vec::new(),
            context: Context::new(),
            revision: 0,
        }
    }

    /// Append a step, preserving insertion order.
    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Look up a step by id.
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Look up a step by id, mutably.
    pub fn step_mut(&mut self, id: &str) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.id == id)
    }

    /// Ids of all Completed steps.
    pub fn completed_ids(&self) -> HashSet<&str> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .map(|s| s.id.as_str())
            .collect()
    }

    /// Steps that are ready to run: Pending, with every dependency in
    /// the completed set. Returned in insertion order.
    pub fn ready_steps(&self) -> Vec<&Step> {
        let completed = self.completed_ids();
        self.steps
            .iter()
            .filter(|s| {
                s.status == StepStatus::Pending
                    && s.depends_on.iter().all(|d| completed.contains(d.as_str()))
            })
            .collect()
    }

    /// Whether every step is in a terminal state. Failed, Rejected, and
    /// Skipped all count as done here: a Failed step does not block
    /// completion detection, it blocks progress only by producing a
    /// replan result upstream.
    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.status.is_terminal())
    }

    /// Validate the plan before any execution: unique step ids, every
    /// dependency resolves to an existing step, no dependency cycle,
    /// and every action is well-formed for its kind.
    pub fn validate(&self) -> Result<(), PlanError> {
        let mut ids = HashSet::new();
        for step in &self.steps {
            if !ids.insert(step.id.as_str()) {
                return Err(PlanError::DuplicateStep(step.id.clone()));
            }
        }

        for step in &self.steps {
            for dep in &step.depends_on {
                if !ids.contains(dep.as_str()) {
                    return Err(PlanError::MissingStep {
                        step: step.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
            if let Err(detail) = step.action.validate() {
                return Err(PlanError::MalformedAction {
                    step: step.id.clone(),
                    detail,
                });
            }
        }

        self.check_cycles()
    }

    /// Depth-first cycle detection over the dependency edges, with an
    /// explicit stack and a recursion-path set.
    fn check_cycles(&self) -> Result<(), PlanError> {
        let deps: HashMap<&str, &[String]> = self
            .steps
            .iter()
            .map(|s| (s.id.as_str(), s.depends_on.as_slice()))
            .collect();

        let mut visited: HashSet<&str> = HashSet::new();

        for start in self.steps.iter().map(|s| s.id.as_str()) {
            if visited.contains(start) {
                continue;
            }

            // (node, next-dependency index) frames replace recursion.
            let mut stack: Vec<(&str, usize)> = vec![(start, 0)];
            let mut on_path: HashSet<&str> = HashSet::new();
            on_path.insert(start);

            while let Some((node, idx)) = stack.pop() {
                let node_deps = deps.get(node).copied().unwrap_or(&[]);
                if idx < node_deps.len() {
                    let next = node_deps[idx].as_str();
                    stack.push((node, idx + 1));
                    if on_path.contains(next) {
                        let mut path: Vec<String> =
                            stack.iter().map(|(n, _)| n.to_string()).collect();
                        path.push(next.to_string());
                        return Err(PlanError::Cycle(path));
                    }
                    if !visited.contains(next) {
                        on_path.insert(next);
                        stack.push((next, 0));
                    }
                } else {
                    on_path.remove(node);
                    visited.insert(node);
                }
            }
        }

        Ok(())
    }

    /// Mark every Pending step that transitively depends on `rejected`
    /// as Skipped. Iterative worklist rather than recursion, so an
    /// adversarial fan-out cannot exhaust the call stack. Returns the
    /// skipped step ids.
    pub fn cascade_skip(&mut self, rejected: &str) -> Vec<String> {
        let mut skipped = Vec::new();
        let mut worklist = vec![rejected.to_string()];

        while let Some(cause) = worklist.pop() {
            for step in &mut self.steps {
                if step.status == StepStatus::Pending
                    && step.depends_on.iter().any(|d| d == &cause)
                {
                    step.status = StepStatus::Skipped;
                    step.error = Some(format!("skipped: depends on rejected step '{rejected}'"));
                    skipped.push(step.id.clone());
                    worklist.push(step.id.clone());
                }
            }
        }

        skipped
    }

    /// Structured summary of completed and failed steps for the
    /// external planner.
    pub fn feedback_context(&self) -> FeedbackContext {
        let completed_steps = self
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .map(|s| CompletedStep {
                id: s.id.clone(),
                result: s.result.clone().map(Value::Object),
            })
            .collect();

        let failed_steps = self
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Failed)
            .map(|s| FailedStep {
                id: s.id.clone(),
                error: s.error.clone().unwrap_or_default(),
                attempts: s.attempts,
            })
            .collect();

        FeedbackContext {
            plan_id: self.id,
            completed_steps,
            failed_steps,
        }
    }
}

/// Summary of plan progress handed back to the external planner when
/// replanning or escalation is needed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackContext {
    /// The plan this summarizes
    pub plan_id: PlanId,

    /// Steps that completed, with their results
    pub completed_steps: Vec<CompletedStep>,

    /// Steps that failed, with their last error and attempt count
    pub failed_steps: Vec<FailedStep>,
}

/// A completed step summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedStep {
    /// Step id
    pub id: String,
    /// Accepted outputs
    pub result: Option<Value>,
}

/// A failed step summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedStep {
    /// Step id
    pub id: String,
    /// Last recorded error
    pub error: String,
    /// How many times the step was attempted
    pub attempts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::Action;

    fn tool_step(id: &str) -> Step {
        Step::new(
            id,
            format!("step {id}"),
            Action::ToolUse {
                tool: "noop".to_string(),
                args: Context::new(),
            },
        )
    }

    fn three_step_chain() -> Plan {
        Plan::new(GoalId::new(), "chain")
            .with_step(tool_step("a"))
            .with_step(tool_step("b").with_dependencies(["a"]))
            .with_step(tool_step("c").with_dependencies(["b"]))
    }

    #[test]
    fn test_ready_steps_respect_dependencies() {
        let mut plan = three_step_chain();
        let ready: Vec<_> = plan.ready_steps().iter().map(|s| s.id.clone()).collect();
        assert_eq!(ready, vec!["a"]);

        plan.step_mut("a").unwrap().status = StepStatus::Completed;
        let ready: Vec<_> = plan.ready_steps().iter().map(|s| s.id.clone()).collect();
        assert_eq!(ready, vec!["b"]);
    }

    #[test]
    fn test_ready_steps_never_return_non_pending() {
        let mut plan = Plan::new(GoalId::new(), "statuses")
            .with_step(tool_step("done"))
            .with_step(tool_step("failed"))
            .with_step(tool_step("skipped"))
            .with_step(tool_step("running"))
            .with_step(tool_step("open"));
        plan.step_mut("done").unwrap().status = StepStatus::Completed;
        plan.step_mut("failed").unwrap().status = StepStatus::Failed;
        plan.step_mut("skipped").unwrap().status = StepStatus::Skipped;
        plan.step_mut("running").unwrap().status = StepStatus::InProgress;

        let ready: Vec<_> = plan.ready_steps().iter().map(|s| s.id.clone()).collect();
        assert_eq!(ready, vec!["open"]);
    }

    #[test]
    fn test_ready_steps_keep_insertion_order() {
        let plan = Plan::new(GoalId::new(), "parallel")
            .with_step(tool_step("first"))
            .with_step(tool_step("second"))
            .with_step(tool_step("third"));
        let ready: Vec<_> = plan.ready_steps().iter().map(|s| s.id.clone()).collect();
        assert_eq!(ready, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_missing_dependency_fails_validation() {
        let plan = Plan::new(GoalId::new(), "dangling")
            .with_step(tool_step("a").with_dependencies(["ghost"]));
        let err = plan.validate().unwrap_err().to_string();
        assert!(err.contains("missing step"), "got: {err}");
    }

    #[test]
    fn test_cycle_fails_validation() {
        let plan = Plan::new(GoalId::new(), "cyclic")
            .with_step(tool_step("a").with_dependencies(["b"]))
            .with_step(tool_step("b").with_dependencies(["a"]));
        let err = plan.validate().unwrap_err().to_string();
        assert!(err.contains("cycle"), "got: {err}");
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let plan = Plan::new(GoalId::new(), "selfish")
            .with_step(tool_step("a").with_dependencies(["a"]));
        let err = plan.validate().unwrap_err().to_string();
        assert!(err.contains("cycle"), "got: {err}");
    }

    #[test]
    fn test_duplicate_step_id_fails_validation() {
        let plan = Plan::new(GoalId::new(), "dupes")
            .with_step(tool_step("a"))
            .with_step(tool_step("a"));
        assert!(matches!(
            plan.validate(),
            Err(PlanError::DuplicateStep(id)) if id == "a"
        ));
    }

    #[test]
    fn test_diamond_graph_passes_validation() {
        let plan = Plan::new(GoalId::new(), "diamond")
            .with_step(tool_step("root"))
            .with_step(tool_step("left").with_dependencies(["root"]))
            .with_step(tool_step("right").with_dependencies(["root"]))
            .with_step(tool_step("join").with_dependencies(["left", "right"]));
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn test_is_complete_counts_failed_and_skipped_as_done() {
        let mut plan = three_step_chain();
        plan.step_mut("a").unwrap().status = StepStatus::Completed;
        plan.step_mut("b").unwrap().status = StepStatus::Failed;
        plan.step_mut("c").unwrap().status = StepStatus::Skipped;
        assert!(plan.is_complete());

        plan.step_mut("c").unwrap().status = StepStatus::Pending;
        assert!(!plan.is_complete());
    }

    #[test]
    fn test_cascade_skip_reaches_transitive_dependents() {
        let mut plan = Plan::new(GoalId::new(), "cascade")
            .with_step(tool_step("gate"))
            .with_step(tool_step("child").with_dependencies(["gate"]))
            .with_step(tool_step("grandchild").with_dependencies(["child"]))
            .with_step(tool_step("bystander"));

        plan.step_mut("gate").unwrap().status = StepStatus::Rejected;
        let skipped = plan.cascade_skip("gate");

        assert_eq!(skipped, vec!["child", "grandchild"]);
        assert_eq!(plan.step("child").unwrap().status, StepStatus::Skipped);
        assert_eq!(plan.step("grandchild").unwrap().status, StepStatus::Skipped);
        assert_eq!(plan.step("bystander").unwrap().status, StepStatus::Pending);
        assert!(plan
            .step("grandchild")
            .unwrap()
            .error
            .as_deref()
            .unwrap()
            .contains("gate"));
    }

    #[test]
    fn test_feedback_context_shape() {
        let mut plan = three_step_chain();
        {
            let a = plan.step_mut("a").unwrap();
            a.status = StepStatus::Completed;
            let mut out = Context::new();
            out.insert("x".to_string(), serde_json::json!(1));
            a.result = Some(out);
        }
        {
            let b = plan.step_mut("b").unwrap();
            b.status = StepStatus::Failed;
            b.error = Some("boom".to_string());
            b.attempts = 3;
        }

        let fc = plan.feedback_context();
        assert_eq!(fc.completed_steps.len(), 1);
        assert_eq!(fc.completed_steps[0].id, "a");
        assert_eq!(fc.failed_steps.len(), 1);
        assert_eq!(fc.failed_steps[0].error, "boom");
        assert_eq!(fc.failed_steps[0].attempts, 3);
    }
}
