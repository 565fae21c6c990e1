//! Judgment - the judge's verdict on a step's execution result.

use serde::{Deserialize, Serialize};

/// Control-flow branch the executor takes after a step runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgmentAction {
    /// Merge outputs into context and move on
    Accept,
    /// Re-run the step if its retry budget allows
    Retry,
    /// Hand control back to the external planner
    Replan,
    /// Surface to a human without marking the step failed
    Escalate,
}

/// The judge's verdict on a single step execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Judgment {
    /// The branch to take
    pub action: JudgmentAction,

    /// Why this verdict was reached
    pub reasoning: String,

    /// Feedback for the step, the planner, or a human
    pub feedback: Option<String>,

    /// Id of the rule that produced this verdict, if any
    pub matched_rule: Option<String>,

    /// Confidence in the verdict, 0.0 to 1.0
    pub confidence: f32,
}

impl Judgment {
    fn with_action(action: JudgmentAction, reasoning: impl Into<String>) -> Self {
        Self {
            action,
            reasoning: reasoning.into(),
            feedback: None,
            matched_rule: None,
            confidence: 1.0,
        }
    }

    /// Accept verdict.
    pub fn accept(reasoning: impl Into<String>) -> Self {
        Self::with_action(JudgmentAction::Accept, reasoning)
    }

    /// Retry verdict.
    pub fn retry(reasoning: impl Into<String>) -> Self {
        Self::with_action(JudgmentAction::Retry, reasoning)
    }

    /// Replan verdict.
    pub fn replan(reasoning: impl Into<String>) -> Self {
        Self::with_action(JudgmentAction::Replan, reasoning)
    }

    /// Escalate verdict.
    pub fn escalate(reasoning: impl Into<String>) -> Self {
        Self::with_action(JudgmentAction::Escalate, reasoning)
    }

    /// Attach feedback text.
    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = Some(feedback.into());
        self
    }

    /// Record the rule that matched.
    pub fn with_matched_rule(mut self, rule_id: impl Into<String>) -> Self {
        self.matched_rule = Some(rule_id.into());
        self
    }

    /// Set the confidence.
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }
}
