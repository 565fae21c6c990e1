//! Worker-side trait seams.

use async_trait::async_trait;

use cadence_core::{Context, Step, StepOutcome};

/// Executes one step against the live context.
///
/// Step-level failures are reported inside the [`StepOutcome`] so the
/// judge can decide between retry, replan, and escalate; an `Err` means
/// the execution machinery itself broke and fails the whole run.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Execute the step and report what happened.
    async fn execute(&self, step: &Step, context: &Context) -> Result<StepOutcome, anyhow::Error>;
}

/// A tool the built-in worker can dispatch `tool_use` actions to.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name, matched against the action's `tool` field.
    fn name(&self) -> &str;

    /// What the tool does.
    fn description(&self) -> &str;

    /// Run the tool with already-resolved arguments.
    async fn execute(&self, args: &Context, context: &Context) -> Result<Context, anyhow::Error>;
}

/// A completion returned by a model port.
#[derive(Debug, Clone)]
pub struct Completion {
    /// The completion text
    pub text: String,
    /// Tokens the call consumed
    pub tokens_used: u64,
}

/// Port for `llm_call` actions. The concrete model client lives outside
/// this crate.
#[async_trait]
pub trait CompletionPort: Send + Sync {
    /// Complete a prompt.
    async fn complete(
        &self,
        prompt: &str,
        model: Option<&str>,
    ) -> Result<Completion, anyhow::Error>;
}

/// Port for `code_execution` actions.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    /// Run a code snippet and return its outputs.
    async fn run(&self, code: &str, language: Option<&str>) -> Result<Context, anyhow::Error>;
}

/// Port for `sub_graph` actions: delegates a sub-goal to a nested
/// plan-and-execute cycle owned by the caller.
#[async_trait]
pub trait SubPlanRunner: Send + Sync {
    /// Run a sub-plan for the goal and return its outputs.
    async fn run(&self, goal: &str, context: &Context) -> Result<Context, anyhow::Error>;
}
