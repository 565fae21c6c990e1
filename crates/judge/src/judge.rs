//! The judge: ordered rule evaluation with a fallback.

use async_trait::async_trait;
use tracing::{debug, warn};

use cadence_core::{Context, Judgment, Step, StepOutcome};

use crate::rule::Rule;

/// Fallback evaluator consulted when no rule matches. Implementations
/// may be model-backed; the judge never requires one.
#[async_trait]
pub trait FallbackEvaluator: Send + Sync {
    /// Produce a judgment for a step no rule covered.
    async fn evaluate(
        &self,
        step: &Step,
        outcome: &StepOutcome,
        goal: &str,
        context: &Context,
    ) -> Result<Judgment, anyhow::Error>;
}

/// Evaluates step results against an ordered rule collection.
///
/// Rules are owned by this instance and mutated only through
/// [`Judge::add_rule`] and [`Judge::remove_rule`]; there is no shared
/// registry between judges.
pub struct Judge {
    /// Kept sorted by priority, highest first; insertion order among
    /// equal priorities.
    rules: Vec<Rule>,
    fallback: Option<Box<dyn FallbackEvaluator>>,
}

impl Judge {
    /// Create a judge with no rules and no fallback.
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            fallback: None,
        }
    }

    /// Install a fallback evaluator.
    pub fn with_fallback(mut self, fallback: Box<dyn FallbackEvaluator>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Add a rule. Rules with higher priority are evaluated first; a
    /// rule with a priority equal to existing rules is placed after
    /// them, so equal-priority evaluation order is insertion order.
    pub fn add_rule(&mut self, rule: Rule) {
        let at = self.rules.partition_point(|r| r.priority >= rule.priority);
        self.rules.insert(at, rule);
    }

    /// Remove a rule by id. Returns whether a rule was removed.
    pub fn remove_rule(&mut self, id: &str) -> bool {
        let before = self.rules.len();
        self.rules.retain(|r| r.id != id);
        self.rules.len() < before
    }

    /// The rules in evaluation order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Evaluate a step result. The first rule whose condition holds
    /// produces the judgment; otherwise the fallback is consulted, and
    /// failing that a conservative default applies: success maps to
    /// Accept, failure to Escalate.
    pub async fn evaluate(
        &self,
        step: &Step,
        outcome: &StepOutcome,
        goal: &str,
        context: &Context,
    ) -> Judgment {
        for rule in &self.rules {
            if rule.condition.evaluate(step, outcome, goal, context) {
                debug!(step = %step.id, rule = %rule.id, "evaluation rule matched");
                let mut judgment = Judgment {
                    action: rule.action,
                    reasoning: rule.description.clone(),
                    feedback: rule.render_feedback(step, outcome),
                    matched_rule: Some(rule.id.clone()),
                    confidence: 1.0,
                };
                if judgment.feedback.is_none() {
                    judgment.feedback = outcome.error.clone();
                }
                return judgment;
            }
        }

        if let Some(fallback) = &self.fallback {
            match fallback.evaluate(step, outcome, goal, context).await {
                Ok(judgment) => return judgment,
                Err(e) => {
                    warn!(step = %step.id, error = %e, "fallback evaluator failed; using default");
                }
            }
        }

        self.default_judgment(outcome)
    }

    fn default_judgment(&self, outcome: &StepOutcome) -> Judgment {
        if outcome.success {
            Judgment::accept("no rule matched; worker reported success").with_confidence(0.5)
        } else {
            let mut judgment =
                Judgment::escalate("no rule matched; worker reported failure").with_confidence(0.5);
            judgment.feedback = outcome.error.clone();
            judgment
        }
    }
}

impl Default for Judge {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{Condition, Field};
    use cadence_core::{Action, JudgmentAction};
    use serde_json::json;

    fn step() -> Step {
        Step::new(
            "fetch",
            "fetch the data",
            Action::ToolUse {
                tool: "http_get".to_string(),
                args: Context::new(),
            },
        )
    }

    fn success_condition(value: bool) -> Condition {
        Condition::Equals {
            field: Field::ResultSuccess,
            value: json!(value),
        }
    }

    #[tokio::test]
    async fn test_highest_priority_rule_wins() {
        let mut judge = Judge::new();
        judge.add_rule(
            Rule::new("low", "low", success_condition(true), JudgmentAction::Retry)
                .with_priority(1),
        );
        judge.add_rule(
            Rule::new("high", "high", success_condition(true), JudgmentAction::Accept)
                .with_priority(10),
        );

        let judgment = judge
            .evaluate(&step(), &StepOutcome::success(Context::new()), "g", &Context::new())
            .await;
        assert_eq!(judgment.matched_rule.as_deref(), Some("high"));
        assert_eq!(judgment.action, JudgmentAction::Accept);
    }

    #[tokio::test]
    async fn test_equal_priority_rules_keep_insertion_order() {
        let mut judge = Judge::new();
        judge.add_rule(Rule::new(
            "first",
            "first",
            success_condition(true),
            JudgmentAction::Accept,
        ));
        judge.add_rule(Rule::new(
            "second",
            "second",
            success_condition(true),
            JudgmentAction::Retry,
        ));

        let judgment = judge
            .evaluate(&step(), &StepOutcome::success(Context::new()), "g", &Context::new())
            .await;
        assert_eq!(judgment.matched_rule.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_non_matching_rules_are_skipped() {
        let mut judge = Judge::new();
        judge.add_rule(Rule::new(
            "on-failure",
            "fires on failure",
            success_condition(false),
            JudgmentAction::Retry,
        ));
        judge.add_rule(Rule::new(
            "on-success",
            "fires on success",
            success_condition(true),
            JudgmentAction::Accept,
        ));

        let judgment = judge
            .evaluate(&step(), &StepOutcome::success(Context::new()), "g", &Context::new())
            .await;
        assert_eq!(judgment.matched_rule.as_deref(), Some("on-success"));
    }

    #[tokio::test]
    async fn test_default_accepts_success_and_escalates_failure() {
        let judge = Judge::new();

        let accept = judge
            .evaluate(&step(), &StepOutcome::success(Context::new()), "g", &Context::new())
            .await;
        assert_eq!(accept.action, JudgmentAction::Accept);
        assert!(accept.matched_rule.is_none());

        let escalate = judge
            .evaluate(&step(), &StepOutcome::failure("boom"), "g", &Context::new())
            .await;
        assert_eq!(escalate.action, JudgmentAction::Escalate);
        assert_eq!(escalate.feedback.as_deref(), Some("boom"));
    }

    struct AlwaysReplan;

    #[async_trait]
    impl FallbackEvaluator for AlwaysReplan {
        async fn evaluate(
            &self,
            _step: &Step,
            _outcome: &StepOutcome,
            _goal: &str,
            _context: &Context,
        ) -> Result<Judgment, anyhow::Error> {
            Ok(Judgment::replan("fallback says replan"))
        }
    }

    #[tokio::test]
    async fn test_fallback_consulted_when_no_rule_matches() {
        let judge = Judge::new().with_fallback(Box::new(AlwaysReplan));
        let judgment = judge
            .evaluate(&step(), &StepOutcome::success(Context::new()), "g", &Context::new())
            .await;
        assert_eq!(judgment.action, JudgmentAction::Replan);
    }

    struct BrokenFallback;

    #[async_trait]
    impl FallbackEvaluator for BrokenFallback {
        async fn evaluate(
            &self,
            _step: &Step,
            _outcome: &StepOutcome,
            _goal: &str,
            _context: &Context,
        ) -> Result<Judgment, anyhow::Error> {
            Err(anyhow::anyhow!("model unavailable"))
        }
    }

    #[tokio::test]
    async fn test_broken_fallback_falls_through_to_default() {
        let judge = Judge::new().with_fallback(Box::new(BrokenFallback));
        let judgment = judge
            .evaluate(&step(), &StepOutcome::failure("boom"), "g", &Context::new())
            .await;
        assert_eq!(judgment.action, JudgmentAction::Escalate);
    }

    #[tokio::test]
    async fn test_remove_rule() {
        let mut judge = Judge::new();
        judge.add_rule(Rule::new(
            "r1",
            "r1",
            success_condition(true),
            JudgmentAction::Accept,
        ));
        assert!(judge.remove_rule("r1"));
        assert!(!judge.remove_rule("r1"));
        assert!(judge.rules().is_empty());
    }
}
