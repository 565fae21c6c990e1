//! Built-in worker dispatching on action kind.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use cadence_core::{vars, Action, Context, Step, StepOutcome};

use crate::traits::{CodeRunner, CompletionPort, SubPlanRunner, Tool, Worker};

/// A native function callable from `function` actions.
pub type NativeFn = Arc<dyn Fn(&Context) -> Result<Context, anyhow::Error> + Send + Sync>;

/// The default worker: dispatches each action kind to a registered
/// tool, native function, or injected port.
///
/// Registries use interior mutability so tools and functions can be
/// registered through a shared handle after the executor owns it.
pub struct BuiltinWorker {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
    functions: RwLock<HashMap<String, NativeFn>>,
    completions: Option<Arc<dyn CompletionPort>>,
    code_runner: Option<Arc<dyn CodeRunner>>,
    sub_plans: Option<Arc<dyn SubPlanRunner>>,
}

impl BuiltinWorker {
    /// Create a worker with empty registries and no ports.
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            functions: RwLock::new(HashMap::new()),
            completions: None,
            code_runner: None,
            sub_plans: None,
        }
    }

    /// Inject the completion port used for `llm_call` actions.
    pub fn with_completions(mut self, port: Arc<dyn CompletionPort>) -> Self {
        self.completions = Some(port);
        self
    }

    /// Inject the code runner used for `code_execution` actions.
    pub fn with_code_runner(mut self, runner: Arc<dyn CodeRunner>) -> Self {
        self.code_runner = Some(runner);
        self
    }

    /// Inject the sub-plan runner used for `sub_graph` actions.
    pub fn with_sub_plan_runner(mut self, runner: Arc<dyn SubPlanRunner>) -> Self {
        self.sub_plans = Some(runner);
        self
    }

    /// Register a tool under its own name.
    pub fn register_tool(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.write().expect("tool registry poisoned").insert(name, tool);
    }

    /// Register a native function.
    pub fn register_function(&self, name: impl Into<String>, function: NativeFn) {
        self.functions
            .write()
            .expect("function registry poisoned")
            .insert(name.into(), function);
    }

    async fn dispatch(&self, step: &Step, context: &Context) -> Result<StepOutcome, anyhow::Error> {
        match &step.action {
            Action::ToolUse { tool, args } => {
                let handler = {
                    let registry = self.tools.read().expect("tool registry poisoned");
                    registry.get(tool).cloned()
                };
                let Some(handler) = handler else {
                    return Ok(StepOutcome::failure(format!("unknown tool '{tool}'")));
                };
                let resolved = vars::resolve_map(args, context);
                match handler.execute(&resolved, context).await {
                    Ok(outputs) => Ok(StepOutcome::success(outputs)),
                    Err(e) => Ok(StepOutcome::failure(format!("tool '{tool}' failed: {e}"))),
                }
            }

            Action::Function { function, args } => {
                let handler = {
                    let registry = self.functions.read().expect("function registry poisoned");
                    registry.get(function).cloned()
                };
                let Some(handler) = handler else {
                    return Ok(StepOutcome::failure(format!("unknown function '{function}'")));
                };
                let resolved = vars::resolve_map(args, context);
                match handler(&resolved) {
                    Ok(outputs) => Ok(StepOutcome::success(outputs)),
                    Err(e) => Ok(StepOutcome::failure(format!(
                        "function '{function}' failed: {e}"
                    ))),
                }
            }

            Action::LlmCall { prompt, model } => {
                let Some(port) = &self.completions else {
                    return Ok(StepOutcome::failure("no completion port configured"));
                };
                let rendered = match vars::resolve_value(&Value::String(prompt.clone()), context) {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                match port.complete(&rendered, model.as_deref()).await {
                    Ok(completion) => {
                        let mut outputs = Context::new();
                        outputs.insert("response".to_string(), Value::String(completion.text));
                        Ok(StepOutcome::success(outputs).with_tokens(completion.tokens_used))
                    }
                    Err(e) => Ok(StepOutcome::failure(format!("completion failed: {e}"))),
                }
            }

            Action::CodeExecution { code, language } => {
                let Some(runner) = &self.code_runner else {
                    return Ok(StepOutcome::failure("no code runner configured"));
                };
                match runner.run(code, language.as_deref()).await {
                    Ok(outputs) => Ok(StepOutcome::success(outputs)),
                    Err(e) => Ok(StepOutcome::failure(format!("code execution failed: {e}"))),
                }
            }

            Action::SubGraph { goal } => {
                let Some(runner) = &self.sub_plans else {
                    return Ok(StepOutcome::failure("no sub-plan runner configured"));
                };
                match runner.run(goal, context).await {
                    Ok(outputs) => Ok(StepOutcome::success(outputs)),
                    Err(e) => Ok(StepOutcome::failure(format!("sub-plan failed: {e}"))),
                }
            }
        }
    }
}

impl Default for BuiltinWorker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Worker for BuiltinWorker {
    async fn execute(&self, step: &Step, context: &Context) -> Result<StepOutcome, anyhow::Error> {
        debug!(step = %step.id, kind = step.action.kind(), "executing step");
        let started = Instant::now();
        let mut outcome = self.dispatch(step, context).await?;
        outcome.latency_ms = started.elapsed().as_millis() as u64;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Completion;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "returns its arguments"
        }

        async fn execute(
            &self,
            args: &Context,
            _context: &Context,
        ) -> Result<Context, anyhow::Error> {
            Ok(args.clone())
        }
    }

    fn tool_step(tool: &str, args: Context) -> Step {
        Step::new(
            "s1",
            "a step",
            Action::ToolUse {
                tool: tool.to_string(),
                args,
            },
        )
    }

    #[tokio::test]
    async fn test_tool_dispatch_resolves_variable_refs() {
        let worker = BuiltinWorker::new();
        worker.register_tool(Arc::new(EchoTool));

        let mut context = Context::new();
        context.insert("city".to_string(), json!("lisbon"));

        let mut args = Context::new();
        args.insert("where".to_string(), json!("$city"));

        let outcome = worker
            .execute(&tool_step("echo", args), &context)
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.outputs.get("where"), Some(&json!("lisbon")));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_a_step_failure_not_an_error() {
        let worker = BuiltinWorker::new();
        let outcome = worker
            .execute(&tool_step("missing", Context::new()), &Context::new())
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("unknown tool"));
    }

    #[tokio::test]
    async fn test_native_function_dispatch() {
        let worker = BuiltinWorker::new();
        worker.register_function(
            "double",
            Arc::new(|args: &Context| {
                let n = args.get("n").and_then(Value::as_i64).unwrap_or(0);
                let mut out = Context::new();
                out.insert("n".to_string(), json!(n * 2));
                Ok(out)
            }),
        );

        let mut args = Context::new();
        args.insert("n".to_string(), json!(21));
        let step = Step::new(
            "dbl",
            "double it",
            Action::Function {
                function: "double".to_string(),
                args,
            },
        );

        let outcome = worker.execute(&step, &Context::new()).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.outputs.get("n"), Some(&json!(42)));
    }

    struct FixedCompletion;

    #[async_trait]
    impl CompletionPort for FixedCompletion {
        async fn complete(
            &self,
            prompt: &str,
            _model: Option<&str>,
        ) -> Result<Completion, anyhow::Error> {
            Ok(Completion {
                text: format!("echo: {prompt}"),
                tokens_used: 7,
            })
        }
    }

    #[tokio::test]
    async fn test_llm_call_uses_completion_port_and_counts_tokens() {
        let worker = BuiltinWorker::new().with_completions(Arc::new(FixedCompletion));
        let step = Step::new(
            "ask",
            "ask the model",
            Action::LlmCall {
                prompt: "hello".to_string(),
                model: None,
            },
        );

        let outcome = worker.execute(&step, &Context::new()).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.outputs.get("response"), Some(&json!("echo: hello")));
        assert_eq!(outcome.tokens_used, 7);
    }

    #[tokio::test]
    async fn test_unconfigured_ports_fail_the_step() {
        let worker = BuiltinWorker::new();
        let step = Step::new(
            "sub",
            "nested goal",
            Action::SubGraph {
                goal: "do the thing".to_string(),
            },
        );
        let outcome = worker.execute(&step, &Context::new()).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("no sub-plan runner"));
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "flaky"
        }

        fn description(&self) -> &str {
            "always fails"
        }

        async fn execute(
            &self,
            _args: &Context,
            _context: &Context,
        ) -> Result<Context, anyhow::Error> {
            Err(anyhow::anyhow!("connection reset"))
        }
    }

    #[tokio::test]
    async fn test_tool_error_becomes_failed_outcome() {
        let worker = BuiltinWorker::new();
        worker.register_tool(Arc::new(FailingTool));
        let outcome = worker
            .execute(&tool_step("flaky", Context::new()), &Context::new())
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("connection reset"));
    }
}
