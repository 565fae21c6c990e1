//! Step model - the atomic unit of work in a plan.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Context;

/// A step is one unit of work inside a plan: an action to perform, the
/// steps it depends on, and the output keys it is required to produce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Identifier, unique within the owning plan
    pub id: String,

    /// Human-readable description
    pub description: String,

    /// What to execute
    pub action: Action,

    /// Ids of steps that must be Completed before this one runs
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Current status
    #[serde(default)]
    pub status: StepStatus,

    /// Number of execution attempts so far
    #[serde(default)]
    pub attempts: u32,

    /// Maximum number of attempts before the step fails for good
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Output keys the worker must produce for this step to be accepted
    #[serde(default)]
    pub expected_outputs: Vec<String>,

    /// Whether a human must approve this step before it runs
    #[serde(default)]
    pub requires_approval: bool,

    /// Message shown to the approver
    #[serde(default)]
    pub approval_message: Option<String>,

    /// Declared inputs; string values of the form `$key` are resolved
    /// against the live context before execution
    #[serde(default)]
    pub inputs: Context,

    /// Outputs from the accepted execution, if any
    #[serde(default)]
    pub result: Option<Context>,

    /// Last failure message, if any
    #[serde(default)]
    pub error: Option<String>,
}

fn default_max_retries() -> u32 {
    3
}

impl Step {
    /// Create a new pending step.
    pub fn new(id: impl Into<String>, description: impl Into<String>, action: Action) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            action,
            depends_on: Vec::new(),
            status: StepStatus::Pending,
            attempts: 0,
            max_retries: default_max_retries(),
            expected_outputs: Vec::new(),
            requires_approval: false,
            approval_message: None,
            inputs: Context::new(),
            result: None,
            error: None,
        }
    }

    /// Add dependency step ids.
    pub fn with_dependencies<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Declare the output keys this step must produce.
    pub fn with_expected_outputs<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expected_outputs.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Gate this step behind human approval.
    pub fn with_approval(mut self, message: impl Into<String>) -> Self {
        self.requires_approval = true;
        self.approval_message = Some(message.into());
        self
    }

    /// Set the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Declare an input value (may reference context via `$key`).
    pub fn with_input(mut self, name: impl Into<String>, value: Value) -> Self {
        self.inputs.insert(name.into(), value);
        self
    }

    /// Shallow-merge approval-time overrides into the action parameters
    /// and declared inputs.
    pub fn apply_modifications(&mut self, overrides: &Context) {
        self.action.merge_overrides(overrides);
        for (key, value) in overrides {
            if self.inputs.contains_key(key) {
                self.inputs.insert(key.clone(), value.clone());
            }
        }
    }
}

/// The action a step performs, tagged by kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// A prompt completion against a language model
    LlmCall {
        /// Prompt text
        prompt: String,
        /// Model override, if any
        #[serde(default)]
        model: Option<String>,
    },

    /// Invocation of a registered tool
    ToolUse {
        /// Tool name
        tool: String,
        /// Tool arguments
        #[serde(default)]
        args: Context,
    },

    /// Invocation of a registered native function
    Function {
        /// Function name
        function: String,
        /// Function arguments
        #[serde(default)]
        args: Context,
    },

    /// Execution of a code snippet
    CodeExecution {
        /// Source to run
        code: String,
        /// Language hint
        #[serde(default)]
        language: Option<String>,
    },

    /// Delegation of a sub-goal to a nested plan
    SubGraph {
        /// Goal for the sub-plan
        goal: String,
    },
}

impl Action {
    /// Kind name as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::LlmCall { .. } => "llm_call",
            Action::ToolUse { .. } => "tool_use",
            Action::Function { .. } => "function",
            Action::CodeExecution { .. } => "code_execution",
            Action::SubGraph { .. } => "sub_graph",
        }
    }

    /// Check that the fields this kind requires are present.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Action::LlmCall { prompt, .. } if prompt.trim().is_empty() => {
                Err("llm_call requires a non-empty prompt".to_string())
            }
            Action::ToolUse { tool, .. } if tool.trim().is_empty() => {
                Err("tool_use requires a tool name".to_string())
            }
            Action::Function { function, .. } if function.trim().is_empty() => {
                Err("function requires a function name".to_string())
            }
            Action::CodeExecution { code, .. } if code.trim().is_empty() => {
                Err("code_execution requires code".to_string())
            }
            Action::SubGraph { goal } if goal.trim().is_empty() => {
                Err("sub_graph requires a goal".to_string())
            }
            _ => Ok(()),
        }
    }

    /// Shallow-merge overrides into this action's parameters. Unknown
    /// keys are ignored for scalar-parameter kinds.
    pub fn merge_overrides(&mut self, overrides: &Context) {
        match self {
            Action::LlmCall { prompt, model } => {
                if let Some(p) = overrides.get("prompt").and_then(Value::as_str) {
                    *prompt = p.to_string();
                }
                if let Some(m) = overrides.get("model").and_then(Value::as_str) {
                    *model = Some(m.to_string());
                }
            }
            Action::ToolUse { args, .. } | Action::Function { args, .. } => {
                for (key, value) in overrides {
                    args.insert(key.clone(), value.clone());
                }
            }
            Action::CodeExecution { code, language } => {
                if let Some(c) = overrides.get("code").and_then(Value::as_str) {
                    *code = c.to_string();
                }
                if let Some(l) = overrides.get("language").and_then(Value::as_str) {
                    *language = Some(l.to_string());
                }
            }
            Action::SubGraph { goal } => {
                if let Some(g) = overrides.get("goal").and_then(Value::as_str) {
                    *goal = g.to_string();
                }
            }
        }
    }
}

/// Step status state machine.
///
/// `Pending → InProgress → {Completed | Failed | AwaitingApproval |
/// Rejected | Skipped}`; a retried step returns from InProgress to
/// Pending until its retry budget runs out. Terminal states are
/// Completed, Failed, Rejected, and Skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not yet started
    Pending,
    /// Currently executing
    InProgress,
    /// Finished and accepted
    Completed,
    /// Finished unsuccessfully with retry budget exhausted
    Failed,
    /// Waiting for a human decision
    AwaitingApproval,
    /// Declined by a human
    Rejected,
    /// Skipped because a dependency was rejected
    Skipped,
}

impl StepStatus {
    /// Whether the step is done for completion-detection purposes.
    /// Failed, Rejected, and Skipped all count as done here; a Failed
    /// step never blocks completion detection, it blocks progress only
    /// by producing a replan upstream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Rejected | StepStatus::Skipped
        )
    }
}

impl Default for StepStatus {
    fn default() -> Self {
        StepStatus::Pending
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::AwaitingApproval => "awaiting_approval",
            StepStatus::Rejected => "rejected",
            StepStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_terminal_statuses() {
        assert!(StepStatus::Completed.is_terminal());
        assert!(StepStatus::Failed.is_terminal());
        assert!(StepStatus::Rejected.is_terminal());
        assert!(StepStatus::Skipped.is_terminal());
        assert!(!StepStatus::Pending.is_terminal());
        assert!(!StepStatus::InProgress.is_terminal());
        assert!(!StepStatus::AwaitingApproval.is_terminal());
    }

    #[test]
    fn test_action_validation() {
        let bad = Action::ToolUse {
            tool: String::new(),
            args: Context::new(),
        };
        assert!(bad.validate().unwrap_err().contains("tool name"));

        let ok = Action::CodeExecution {
            code: "print(1)".to_string(),
            language: Some("python".to_string()),
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_merge_overrides_into_tool_args() {
        let mut action = Action::ToolUse {
            tool: "search".to_string(),
            args: Context::new(),
        };
        let mut overrides = Context::new();
        overrides.insert("query".to_string(), json!("rust"));
        action.merge_overrides(&overrides);

        match action {
            Action::ToolUse { args, .. } => assert_eq!(args.get("query"), Some(&json!("rust"))),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_step_deserializes_with_defaults() {
        let step: Step = serde_json::from_value(json!({
            "id": "fetch",
            "description": "fetch the data",
            "action": {"kind": "tool_use", "tool": "http_get"}
        }))
        .unwrap();
        assert_eq!(step.status, StepStatus::Pending);
        assert_eq!(step.attempts, 0);
        assert_eq!(step.max_retries, 3);
        assert!(!step.requires_approval);
    }
}
