//! Evaluation rules and their condition predicates.
//!
//! Conditions are a small closed predicate tree over named fields of
//! the evaluation scope, not free-form expressions: there is no
//! embedded interpreter, and everything a rule can test is enumerated
//! here.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use cadence_core::{Context, JudgmentAction, Step, StepOutcome};

/// A named field of the evaluation scope `{result, step, goal, context}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum Field {
    /// The worker's success flag
    ResultSuccess,
    /// The worker's error message (null when absent)
    ResultError,
    /// A named entry of the worker's outputs
    ResultOutput {
        /// Output key
        key: String,
    },
    /// The step id
    StepId,
    /// The step's attempt counter
    StepAttempts,
    /// The step's description
    StepDescription,
    /// The step's action kind name
    StepActionKind,
    /// The run's goal text
    Goal,
    /// A named entry of the live context
    ContextKey {
        /// Context key
        key: String,
    },
}

impl Field {
    /// Resolve this field against the evaluation scope.
    pub fn resolve(
        &self,
        step: &Step,
        outcome: &StepOutcome,
        goal: &str,
        context: &Context,
    ) -> Option<Value> {
        match self {
            Field::ResultSuccess => Some(Value::Bool(outcome.success)),
            Field::ResultError => Some(match &outcome.error {
                Some(e) => Value::String(e.clone()),
                None => Value::Null,
            }),
            Field::ResultOutput { key } => outcome.outputs.get(key).cloned(),
            Field::StepId => Some(Value::String(step.id.clone())),
            Field::StepAttempts => Some(Value::from(step.attempts)),
            Field::StepDescription => Some(Value::String(step.description.clone())),
            Field::StepActionKind => Some(Value::String(step.action.kind().to_string())),
            Field::Goal => Some(Value::String(goal.to_string())),
            Field::ContextKey { key } => context.get(key).cloned(),
        }
    }
}

/// A condition predicate over the evaluation scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    /// Field equals a literal value
    Equals {
        /// Field to test
        #[serde(flatten)]
        field: Field,
        /// Expected value
        value: Value,
    },

    /// Field is a number strictly greater than the threshold
    GreaterThan {
        /// Field to test
        #[serde(flatten)]
        field: Field,
        /// Threshold
        value: f64,
    },

    /// Field contains the needle: substring for strings, element for
    /// arrays, key for objects
    Contains {
        /// Field to test
        #[serde(flatten)]
        field: Field,
        /// What to look for
        needle: String,
    },

    /// Every sub-condition holds
    And {
        /// Sub-conditions
        conditions: Vec<Condition>,
    },

    /// At least one sub-condition holds
    Or {
        /// Sub-conditions
        conditions: Vec<Condition>,
    },

    /// The sub-condition does not hold
    Not {
        /// Negated condition
        condition: Box<Condition>,
    },
}

impl Condition {
    /// Conjunction of conditions.
    pub fn and(conditions: Vec<Condition>) -> Self {
        Condition::And { conditions }
    }

    /// Disjunction of conditions.
    pub fn or(conditions: Vec<Condition>) -> Self {
        Condition::Or { conditions }
    }

    /// Negation of a condition.
    pub fn not(condition: Condition) -> Self {
        Condition::Not {
            condition: Box::new(condition),
        }
    }

    /// Evaluate the predicate. An unresolvable field makes the leaf
    /// false rather than an error.
    pub fn evaluate(
        &self,
        step: &Step,
        outcome: &StepOutcome,
        goal: &str,
        context: &Context,
    ) -> bool {
        match self {
            Condition::Equals { field, value } => field
                .resolve(step, outcome, goal, context)
                .map_or(false, |v| &v == value),
            Condition::GreaterThan { field, value } => field
                .resolve(step, outcome, goal, context)
                .and_then(|v| v.as_f64())
                .map_or(false, |n| n > *value),
            Condition::Contains { field, needle } => {
                match field.resolve(step, outcome, goal, context) {
                    Some(Value::String(s)) => s.contains(needle),
                    Some(Value::Array(items)) => {
                        items.iter().any(|v| v.as_str() == Some(needle.as_str()))
                    }
                    Some(Value::Object(map)) => map.contains_key(needle),
                    _ => false,
                }
            }
            Condition::And { conditions } => conditions
                .iter()
                .all(|c| c.evaluate(step, outcome, goal, context)),
            Condition::Or { conditions } => conditions
                .iter()
                .any(|c| c.evaluate(step, outcome, goal, context)),
            Condition::Not { condition } => !condition.evaluate(step, outcome, goal, context),
        }
    }
}

/// A single evaluation rule: when its condition holds, the judge issues
/// the rule's action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Rule identifier, unique within one judge
    pub id: String,

    /// What the rule checks for
    pub description: String,

    /// When the rule fires
    pub condition: Condition,

    /// Verdict issued on match
    pub action: JudgmentAction,

    /// Feedback template; `$step_id`, `$error`, and `$attempts` are
    /// substituted at render time
    pub feedback: Option<String>,

    /// Higher fires first; equal priorities keep insertion order
    pub priority: i32,
}

impl Rule {
    /// Create a rule with priority 0 and no feedback.
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        condition: Condition,
        action: JudgmentAction,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            condition,
            action,
            feedback: None,
            priority: 0,
        }
    }

    /// Set the feedback template.
    pub fn with_feedback(mut self, template: impl Into<String>) -> Self {
        self.feedback = Some(template.into());
        self
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Render the feedback template for a concrete step and outcome.
    pub fn render_feedback(&self, step: &Step, outcome: &StepOutcome) -> Option<String> {
        self.feedback.as_ref().map(|template| {
            template
                .replace("$step_id", &step.id)
                .replace("$attempts", &step.attempts.to_string())
                .replace("$error", outcome.error.as_deref().unwrap_or(""))
        })
    }
}
